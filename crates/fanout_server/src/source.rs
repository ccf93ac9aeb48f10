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

//! Event source connections: framing, parsing and sequencing.
//!
//! Each connection gets its own [`Sequencer`]; simultaneous sources
//! interleave on the shared registry ingress at mutation granularity, each
//! already in its own internal order.

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use fanout_core::dispatch::Mutation;
use fanout_core::event::Event;
use fanout_core::sequencer::Sequencer;

/// Reads newline-terminated frames from an event source until EOF.
///
/// Malformed frames are dropped with a debug log and the stream continues.
/// A read error is logged and treated as EOF. EOF drains the sequencer's
/// contiguous prefix and emits [`Mutation::Shutdown`]: the stream is the
/// router's reason to exist, so its end winds the process down once the
/// registry has flushed.
pub async fn run<S>(stream: S, ingress: UnboundedSender<Mutation>)
where
    S: AsyncRead + Send + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut sequencer = Sequencer::new();
    let mut frame = Vec::new();

    loop {
        frame.clear();

        match reader.read_until(b'\n', &mut frame).await {
            Ok(0) => break,
            Ok(_) => {
                let raw = Bytes::copy_from_slice(&frame);

                match Event::parse(raw) {
                    Ok(event) => {
                        for mutation in sequencer.accept(event) {
                            if ingress.send(mutation).is_err() {
                                debug!("registry is shut down, dropping the event stream");
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let text = String::from_utf8_lossy(&frame);
                        debug!(frame = %text.trim_end(), "dropping malformed frame: {err}");
                    }
                }
            }
            Err(err) => {
                error!("event source read error: {err}");
                break;
            }
        }
    }

    for mutation in sequencer.finish() {
        if ingress.send(mutation).is_err() {
            return;
        }
    }

    info!("event source stream closed");
    let _ = ingress.send(Mutation::Shutdown);
}
