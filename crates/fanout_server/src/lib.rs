/* Copyright 2023- The Binedge, Lda team. All rights reserved.
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *     http://www.apache.org/licenses/LICENSE-2.0
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! A follower-fan-out event router: one sequenced event stream in, per-user
//! notification streams out.
//!
//! Two TCP listeners. The event source connects to one and pours in
//! newline-framed, sequence-numbered events in arbitrary order; clients
//! connect to the other, announce their UID, and receive the events that
//! concern them, strictly in sequence order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::process::exit;

use tokio::select;
use tokio::task::JoinSet;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use fanout_core::dispatch::Mutation;
use fanout_core::registry;

pub mod cli;
pub mod client;
pub mod error;
pub mod graceful_shutdown;
pub mod net;
pub mod settings;
pub mod source;

use error::ServerResult;

/// Reads the version defined in Cargo.toml at compile time in the format
/// `MAJOR.MINOR.PATCH`
#[macro_export]
macro_rules! cargo_crate_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

/// Main entry point for the router process
pub fn start(command: &cli::TopLevel) -> ServerResult {
    match &command.subcommand {
        None => serve(&cli::Serve::default())?,
        Some(cli::Command::Serve(serve_args)) => serve(serve_args)?,
        Some(cli::Command::Version(_)) => version()?,
    };

    Ok(())
}

/// Prints the fanout version to stdout
pub fn version() -> ServerResult {
    println!(cargo_crate_version!());

    Ok(())
}

// This in-between step appears pointless right now. However, synchronous
// code that we need before tokio::main should go here.
fn serve(args: &cli::Serve) -> ServerResult {
    start_server(args)
}

#[tokio::main]
async fn start_server(args: &cli::Serve) -> ServerResult {
    run_server(args).await
}

async fn run_server(args: &cli::Serve) -> ServerResult {
    let settings = settings::Settings::resolve(args);

    let event_listener = tokio::net::TcpListener::bind(&settings.events_addr)
        .await
        .unwrap_or_else(|err| {
            error!(
                "could not bind to TCP socket at {}: {err}",
                settings.events_addr
            );

            exit(1)
        });
    info!("listening for the event source on {}", settings.events_addr);

    let client_listener = tokio::net::TcpListener::bind(&settings.clients_addr)
        .await
        .unwrap_or_else(|err| {
            error!(
                "could not bind to TCP socket at {}: {err}",
                settings.clients_addr
            );

            exit(1)
        });
    info!("listening for clients on {}", settings.clients_addr);

    let (ingress, mut owner) = registry::spawn();
    let writers = TaskTracker::new();

    let mut listeners = JoinSet::new();
    {
        let ingress = ingress.clone();
        listeners.spawn(async move {
            net::listen(event_listener, move |stream| {
                source::run(stream, ingress.clone())
            })
            .await
        });
    }
    {
        let ingress = ingress.clone();
        let writers = writers.clone();
        listeners.spawn(async move {
            net::listen(client_listener, move |stream| {
                client::run(stream, ingress.clone(), writers.clone())
            })
            .await
        });
    }

    select! {
        joined = &mut owner => {
            joined?;
        }
        _ = graceful_shutdown::global_shutdown_starts() => {
            let _ = ingress.send(Mutation::Shutdown);
            owner.await?;
        }
        Some(joined) = listeners.join_next() => {
            match joined {
                Ok(Err(err)) => error!("listener failed: {err}"),
                Ok(Ok(())) => warn!("listener exited unexpectedly"),
                Err(err) => error!("listener task panicked: {err}"),
            }

            exit(1)
        }
    }

    // The registry has drained; let the writer tasks flush what it queued
    // before the runtime goes away.
    listeners.abort_all();
    writers.close();
    writers.wait().await;

    info!("registry has drained; exiting normally");

    Ok(())
}
