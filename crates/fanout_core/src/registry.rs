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

//! The client registry and its per-user session records.
//!
//! The registry is exclusively owned by the task started in [`spawn`]. Every
//! other task interacts with it by submitting [`Mutation`]s to that task's
//! ingress queue; the owner applies them one at a time to completion. That
//! serializes all graph mutations and notification enqueues without a single
//! lock, and gives a total order consistent with the event sequence.

use ahash::{AHashMap, AHashSet};
use bytes::Bytes;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dispatch::Mutation;
use crate::event::Uid;

/// Per-user record: an outbound frame queue while the user is connected, and
/// the set of users following them.
///
/// A session without an outbound queue is *inactive*. Inactive sessions
/// exist so that followers of a not-yet-connected user still accumulate.
#[derive(Debug, Default)]
pub struct Session {
    pub(crate) outbound: Option<UnboundedSender<Bytes>>,
    pub(crate) closed: bool,
    pub(crate) followers: AHashSet<Uid>,
}

impl Session {
    /// Whether this session has an open outbound queue.
    pub fn is_active(&self) -> bool {
        self.outbound.is_some() && !self.closed
    }

    /// Enqueues a raw frame for the session's writer task.
    ///
    /// Sending to an inactive session silently succeeds. An enqueue onto a
    /// torn-down queue marks the session closed and reports the failure so
    /// the caller can reclaim the slot.
    pub fn send(&mut self, raw: Bytes) -> Result<(), SendError<Bytes>> {
        match &self.outbound {
            Some(queue) if !self.closed => match queue.send(raw) {
                Ok(()) => Ok(()),
                Err(err) => {
                    self.closed = true;
                    Err(err)
                }
            },
            _ => {
                debug!("session is inactive, dropping the notification");
                Ok(())
            }
        }
    }

    /// The users following this session's owner.
    pub fn followers(&self) -> &AHashSet<Uid> {
        &self.followers
    }
}

/// The mapping of user IDs to sessions.
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) sessions: AHashMap<Uid, Session>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an outbound queue for `uid`.
    ///
    /// A reconnecting user keeps the followers accumulated under their UID;
    /// only the queue is replaced and the closed flag cleared.
    pub fn register(&mut self, uid: Uid, outbound: UnboundedSender<Bytes>) {
        let session = self.sessions.entry(uid).or_default();
        session.outbound = Some(outbound);
        session.closed = false;
    }

    /// Forgets `uid` entirely, follower set included.
    ///
    /// The outbound queue is not closed here beyond dropping the sender
    /// half; the writer task observes the closed queue and tears the
    /// connection down itself.
    pub fn unregister(&mut self, uid: Uid) {
        self.sessions.remove(&uid);
    }

    /// Whether `uid` is known, connected or not.
    pub fn exists(&self, uid: Uid) -> bool {
        self.sessions.contains_key(&uid)
    }

    /// The set of users following `uid`, if the user is known.
    pub fn followers_of(&self, uid: Uid) -> Option<&AHashSet<Uid>> {
        self.sessions.get(&uid).map(Session::followers)
    }

    /// Whether `uid` currently has an open outbound queue.
    pub fn is_active(&self, uid: Uid) -> bool {
        self.sessions.get(&uid).is_some_and(Session::is_active)
    }

    /// Drops every session, closing all outbound queues.
    pub fn tear_down(&mut self) {
        self.sessions.clear();
    }
}

/// Starts the registry owner task.
///
/// Returns the ingress queue for submitting [`Mutation`]s and the join
/// handle of the owner task. The task terminates once it sees
/// [`Mutation::Shutdown`] or the ingress queue closes, tearing down every
/// session on the way out; the orchestrator awaits the handle and exits.
pub fn spawn() -> (UnboundedSender<Mutation>, JoinHandle<()>) {
    let (ingress, queue) = mpsc::unbounded_channel();

    (ingress, tokio::spawn(run(queue)))
}

async fn run(mut ingress: UnboundedReceiver<Mutation>) {
    let mut registry = Registry::new();

    while let Some(mutation) = ingress.recv().await {
        if matches!(mutation, Mutation::Shutdown) {
            break;
        }

        registry.apply(mutation);
    }

    registry.tear_down();

    info!("every notification has been delivered");
}
