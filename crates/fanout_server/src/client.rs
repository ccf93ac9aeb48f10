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

//! Client connections: the one-line UID handshake, then a writer task that
//! pumps the user's outbound queue into the socket for the rest of the
//! connection's life.

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::debug;

use fanout_core::dispatch::Mutation;
use fanout_core::event::parse_uid;

use crate::settings::TCP_TIMEOUT;

/// Performs the handshake and hands the connection over to a writer task.
///
/// The handshake is a single line holding the client's decimal UID. A
/// handshake that cannot be read or parsed within the protocol timeout
/// drops the connection without registering anything.
///
/// The writer is spawned on `writers` so that shutdown can wait for queued
/// notifications to reach the sockets before the process exits.
pub async fn run<S>(stream: S, ingress: UnboundedSender<Mutation>, writers: TaskTracker)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    match timeout(TCP_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => {}
        Ok(Ok(_)) => {
            debug!("client disconnected before the handshake");
            return;
        }
        Ok(Err(err)) => {
            debug!("client handshake read error: {err}");
            return;
        }
        Err(_) => {
            debug!("client handshake timed out");
            return;
        }
    }

    let uid = match parse_uid(line.trim_end_matches(['\r', '\n'])) {
        Ok(uid) => uid,
        Err(err) => {
            debug!("client sent an unparsable handshake: {err}");
            return;
        }
    };

    let (outbound, queue) = unbounded_channel();
    writers.spawn(write_outbound(write_half, queue));

    if ingress.send(Mutation::Register { uid, outbound }).is_err() {
        // The registry is already gone; the writer sees its queue close and
        // drops the socket.
        debug!(uid, "registry is shut down, dropping client");
    }
}

/// Drains the outbound queue into the socket.
///
/// Returns when the queue closes upstream (unregistration or registry
/// teardown) or the peer stops accepting writes; dropping the socket halves
/// closes the connection either way.
async fn write_outbound<W>(mut sink: W, mut queue: UnboundedReceiver<Bytes>)
where
    W: AsyncWrite + Send + Unpin,
{
    while let Some(raw) = queue.recv().await {
        if let Err(err) = sink.write_all(&raw).await {
            debug!("dropping client connection: {err}");
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn handshake_registers_and_writer_delivers() {
        let (mut peer, served) = duplex(256);
        let (ingress, mut mutations) = mpsc::unbounded_channel();

        peer.write_all(b"42\n").await.unwrap();
        run(served, ingress, TaskTracker::new()).await;

        let outbound = match mutations.recv().await {
            Some(Mutation::Register { uid: 42, outbound }) => outbound,
            other => panic!("expected a registration for uid 42, got {other:?}"),
        };

        outbound.send(Bytes::from_static(b"1|B\n")).unwrap();
        outbound.send(Bytes::from_static(b"2|S|7\n")).unwrap();
        drop(outbound);

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"1|B\n2|S|7\n");
    }

    #[tokio::test]
    async fn crlf_handshakes_are_tolerated() {
        let (mut peer, served) = duplex(64);
        let (ingress, mut mutations) = mpsc::unbounded_channel();

        peer.write_all(b"7\r\n").await.unwrap();
        run(served, ingress, TaskTracker::new()).await;

        assert!(matches!(
            mutations.recv().await,
            Some(Mutation::Register { uid: 7, .. })
        ));
    }

    #[tokio::test]
    async fn bad_handshake_registers_nothing() {
        let (mut peer, served) = duplex(64);
        let (ingress, mut mutations) = mpsc::unbounded_channel();

        peer.write_all(b"not a uid\n").await.unwrap();
        run(served, ingress, TaskTracker::new()).await;
        drop(peer);

        assert!(mutations.recv().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_before_handshake_registers_nothing() {
        let (peer, served) = duplex(64);
        let (ingress, mut mutations) = mpsc::unbounded_channel();

        drop(peer);
        run(served, ingress, TaskTracker::new()).await;

        assert!(mutations.recv().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_waits_for_the_writer_to_flush() {
        let (mut peer, served) = duplex(256);
        let (ingress, mut mutations) = mpsc::unbounded_channel();
        let writers = TaskTracker::new();

        peer.write_all(b"42\n").await.unwrap();
        run(served, ingress, writers.clone()).await;

        let outbound = match mutations.recv().await {
            Some(Mutation::Register { outbound, .. }) => outbound,
            other => panic!("expected a registration, got {other:?}"),
        };

        outbound.send(Bytes::from_static(b"1|B\n")).unwrap();
        drop(outbound);

        writers.close();
        writers.wait().await;

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"1|B\n");
    }
}
