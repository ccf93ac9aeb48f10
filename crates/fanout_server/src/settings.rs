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

//! Listener addresses and socket constants.
//!
//! There are no configuration files; the two ports come from command-line
//! flags, falling back to environment variables, falling back to defaults.
//! An unusable environment value surfaces later as a bind failure, which is
//! fatal anyway.

use std::env;
use std::time::Duration;

use crate::cli;

/// Default port for the event source listener.
pub const DEFAULT_EVENTS_PORT: u16 = 9090;

/// Default port for the client listener.
pub const DEFAULT_CLIENTS_PORT: u16 = 9099;

/// Environment variable naming the event source port.
pub const EVENTS_PORT_VAR: &str = "eventListenerPort";

/// Environment variable naming the client port.
pub const CLIENTS_PORT_VAR: &str = "clientListenerPort";

/// TCP keepalive period applied to every accepted connection.
pub const TCP_KEEPALIVE_PERIOD: Duration = Duration::from_secs(10);

/// Upper bound on how long a client may take to send its handshake line.
pub const TCP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved listener addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Bind address of the event source listener.
    pub events_addr: String,

    /// Bind address of the client listener.
    pub clients_addr: String,
}

impl Settings {
    /// Resolves the listener addresses from flags, environment and defaults,
    /// in that order of precedence.
    pub fn resolve(args: &cli::Serve) -> Self {
        Settings {
            events_addr: bind_addr(args.events_port, EVENTS_PORT_VAR, DEFAULT_EVENTS_PORT),
            clients_addr: bind_addr(args.clients_port, CLIENTS_PORT_VAR, DEFAULT_CLIENTS_PORT),
        }
    }
}

fn bind_addr(flag: Option<u16>, var: &str, default: u16) -> String {
    match flag {
        Some(port) => format!("0.0.0.0:{port}"),
        None => match env::var(var) {
            Ok(port) if !port.is_empty() => format!("0.0.0.0:{port}"),
            _ => format!("0.0.0.0:{default}"),
        },
    }
}
