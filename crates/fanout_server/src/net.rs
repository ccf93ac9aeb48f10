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

//! The accept loop shared by both listeners.

use std::future::Future;
use std::io;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use crate::settings::TCP_KEEPALIVE_PERIOD;

/// Accepts connections forever, spawning `handler` on its own task for each.
///
/// Socket options are applied to every accepted stream; a stream that
/// rejects them is still served. Returns only when accepting itself fails,
/// which the caller treats as fatal.
pub async fn listen<H, F>(listener: TcpListener, handler: H) -> io::Result<()>
where
    H: Fn(TcpStream) -> F,
    F: Future<Output = ()> + Send + 'static,
{
    loop {
        let (stream, peer) = listener.accept().await?;

        if let Err(err) = configure(&stream) {
            warn!(%peer, "could not set socket options: {err}");
        }

        debug!(%peer, "accepted connection");
        tokio::spawn(handler(stream));
    }
}

/// Enables keepalive probing so half-dead peers get reaped by the TCP layer;
/// there is no application-level heartbeat.
fn configure(stream: &TcpStream) -> io::Result<()> {
    let keepalive = TcpKeepalive::new()
        .with_time(TCP_KEEPALIVE_PERIOD)
        .with_interval(TCP_KEEPALIVE_PERIOD);

    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}
