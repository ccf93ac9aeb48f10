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

//! Translation of parsed events into registry mutations, and the interpreter
//! that applies them.
//!
//! Each event kind becomes one [`Mutation`] variant; [`Registry::apply`] is
//! the single interpreter, run only by the registry owner task. An event's
//! graph effect and the notifications it causes therefore happen atomically
//! with respect to every other event.

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::event::{Event, EventKind, Uid};
use crate::registry::Registry;

/// A deferred action on the [`Registry`], executed by its owner task.
///
/// Events become mutations at the sequencer boundary; connection handlers
/// submit `Register` directly when a client finishes its handshake.
#[derive(Debug)]
pub enum Mutation {
    /// Attach an outbound queue for a connected client.
    Register {
        /// The user that connected.
        uid: Uid,
        /// Sender half of the client's outbound queue.
        outbound: UnboundedSender<Bytes>,
    },
    /// Forget a user entirely.
    Unregister {
        /// The user to drop.
        uid: Uid,
    },
    /// `from` follows `to`; `to` is notified.
    Follow {
        /// The new follower.
        from: Uid,
        /// The user being followed.
        to: Uid,
        /// The frame forwarded to `to`.
        raw: Bytes,
    },
    /// `from` unfollows `to`; nobody is notified.
    Unfollow {
        /// The follower leaving.
        from: Uid,
        /// The user being unfollowed.
        to: Uid,
    },
    /// Direct message; `to` is notified.
    PrivateMessage {
        /// The sender.
        from: Uid,
        /// The recipient.
        to: Uid,
        /// The frame forwarded to `to`.
        raw: Bytes,
    },
    /// Status update; every follower of `from` is notified.
    StatusUpdate {
        /// The user posting the update.
        from: Uid,
        /// The frame forwarded to the followers.
        raw: Bytes,
    },
    /// Everybody in the registry is notified.
    Broadcast {
        /// The frame forwarded to every user.
        raw: Bytes,
    },
    /// Drain and terminate the owner task.
    Shutdown,
}

impl Mutation {
    /// Maps a parsed event to the mutation that realizes it.
    pub fn for_event(event: Event) -> Self {
        let raw = event.raw();

        match event.kind() {
            EventKind::Follow { from, to } => Mutation::Follow { from, to, raw },
            EventKind::Unfollow { from, to } => Mutation::Unfollow { from, to },
            EventKind::PrivateMessage { from, to } => Mutation::PrivateMessage { from, to, raw },
            EventKind::StatusUpdate { from } => Mutation::StatusUpdate { from, raw },
            EventKind::Broadcast => Mutation::Broadcast { raw },
        }
    }
}

impl Registry {
    /// Applies one mutation to completion.
    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Register { uid, outbound } => self.register(uid, outbound),
            Mutation::Unregister { uid } => self.unregister(uid),
            Mutation::Follow { from, to, raw } => self.follow(from, to, raw),
            Mutation::Unfollow { from, to } => self.unfollow(from, to),
            Mutation::PrivateMessage { from, to, raw } => self.private_message(from, to, raw),
            Mutation::StatusUpdate { from, raw } => self.status_update(from, raw),
            Mutation::Broadcast { raw } => self.broadcast(raw),
            Mutation::Shutdown => self.tear_down(),
        }
    }

    /// Adds `from` to `to`'s follower set and notifies `to`.
    ///
    /// An unseen `to` gets an inactive session so its followers accumulate
    /// before it ever connects.
    fn follow(&mut self, from: Uid, to: Uid, raw: Bytes) {
        let session = self.sessions.entry(to).or_default();
        session.followers.insert(from);

        if session.send(raw).is_err() {
            debug!(uid = to, "follow target's queue is gone, unregistering");
            self.unregister(to);
        }
    }

    fn unfollow(&mut self, from: Uid, to: Uid) {
        match self.sessions.get_mut(&to) {
            Some(session) => {
                session.followers.remove(&from);
            }
            None => debug!(from, to, "unfollow of an unknown user, dropping"),
        }
    }

    fn private_message(&mut self, from: Uid, to: Uid, raw: Bytes) {
        match self.sessions.get_mut(&to) {
            Some(session) => {
                if session.send(raw).is_err() {
                    debug!(uid = to, "message target's queue is gone, unregistering");
                    self.unregister(to);
                }
            }
            None => debug!(from, to, "private message to an unknown user, dropping"),
        }
    }

    /// Notifies every follower of `from` that resolves to an active session.
    ///
    /// Followers whose records have disappeared are pruned from the set;
    /// followers with a torn-down queue are pruned and unregistered.
    fn status_update(&mut self, from: Uid, raw: Bytes) {
        let followers: Vec<Uid> = match self.sessions.get(&from) {
            Some(session) => session.followers().iter().copied().collect(),
            None => {
                debug!(uid = from, "status update from an unknown user, dropping");
                return;
            }
        };

        let mut dropped = Vec::new();
        for uid in followers {
            match self.sessions.get_mut(&uid) {
                Some(follower) => {
                    if follower.send(raw.clone()).is_err() {
                        debug!(uid, "follower's queue is gone, unregistering");
                        self.sessions.remove(&uid);
                        dropped.push(uid);
                    }
                }
                None => dropped.push(uid),
            }
        }

        if let Some(session) = self.sessions.get_mut(&from) {
            for uid in &dropped {
                session.followers.remove(uid);
            }
        }
    }

    /// Notifies every session in the registry, inactive ones included; the
    /// send is a no-op for those. Dead clients found along the way are
    /// dropped.
    fn broadcast(&mut self, raw: Bytes) {
        self.sessions.retain(|uid, session| {
            if session.send(raw.clone()).is_err() {
                debug!(uid = *uid, "client's queue is gone, unregistering");
                return false;
            }

            true
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ahash::AHashMap;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    const UIDS: [Uid; 5] = [15, 2, 92, 71, 87];

    fn raw(frame: &str) -> Bytes {
        Bytes::copy_from_slice(frame.as_bytes())
    }

    fn mutation(frame: &str) -> Mutation {
        Mutation::for_event(Event::parse(raw(frame)).expect(frame))
    }

    fn populated_registry() -> (Registry, AHashMap<Uid, UnboundedReceiver<Bytes>>) {
        let mut registry = Registry::new();
        let mut queues = AHashMap::new();

        for uid in UIDS {
            let (outbound, queue) = unbounded_channel();
            registry.register(uid, outbound);
            queues.insert(uid, queue);
        }

        (registry, queues)
    }

    fn assert_silent(queue: &mut UnboundedReceiver<Bytes>) {
        assert_eq!(queue.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn follow_notifies_the_target() {
        let (mut registry, mut queues) = populated_registry();

        registry.apply(mutation("123123|F|15|2\n"));

        assert_eq!(
            queues.get_mut(&2).unwrap().try_recv().unwrap(),
            raw("123123|F|15|2\n")
        );
        assert!(registry.followers_of(2).unwrap().contains(&15));
    }

    #[test]
    fn follow_creates_an_inactive_target() {
        let (mut registry, _queues) = populated_registry();

        registry.apply(mutation("123123|F|15|200\n"));

        assert!(registry.exists(200));
        assert!(!registry.is_active(200));
        assert!(registry.followers_of(200).unwrap().contains(&15));
    }

    #[test]
    fn self_follow_is_literal() {
        let (mut registry, mut queues) = populated_registry();

        registry.apply(mutation("1|F|15|15\n"));

        assert!(registry.followers_of(15).unwrap().contains(&15));
        assert_eq!(
            queues.get_mut(&15).unwrap().try_recv().unwrap(),
            raw("1|F|15|15\n")
        );
    }

    #[test]
    fn unfollow_removes_the_follower_without_notification() {
        let (mut registry, mut queues) = populated_registry();

        registry.apply(mutation("123123|F|15|2\n"));
        registry.apply(mutation("123124|U|15|2\n"));

        assert!(!registry.followers_of(2).unwrap().contains(&15));

        // Only the follow notification may be in the queue.
        let queue = queues.get_mut(&2).unwrap();
        queue.try_recv().unwrap();
        assert_silent(queue);
    }

    #[test]
    fn unfollow_of_an_unknown_user_is_a_noop() {
        let (mut registry, _queues) = populated_registry();

        registry.apply(mutation("7|U|15|999\n"));

        assert!(!registry.exists(999));
    }

    #[test]
    fn private_message_reaches_the_target() {
        let (mut registry, mut queues) = populated_registry();

        registry.apply(mutation("123123|P|15|2\n"));

        assert_eq!(
            queues.get_mut(&2).unwrap().try_recv().unwrap(),
            raw("123123|P|15|2\n")
        );
        assert_silent(queues.get_mut(&15).unwrap());
    }

    #[test]
    fn private_message_to_an_unknown_user_is_a_noop() {
        let (mut registry, mut queues) = populated_registry();

        registry.apply(mutation("1|P|15|999\n"));

        assert!(!registry.exists(999));
        for uid in UIDS {
            assert_silent(queues.get_mut(&uid).unwrap());
        }
    }

    #[test]
    fn broadcast_reaches_every_client() {
        let (mut registry, mut queues) = populated_registry();

        registry.apply(mutation("123123|B\n"));

        for uid in UIDS {
            let queue = queues.get_mut(&uid).unwrap();
            assert_eq!(queue.try_recv().unwrap(), raw("123123|B\n"), "uid {uid}");
            assert_silent(queue);
        }
    }

    #[test]
    fn broadcast_skips_inactive_sessions_silently() {
        let (mut registry, mut queues) = populated_registry();

        // 200 is known but never connected; the follow notification to it
        // is already a no-op.
        registry.apply(mutation("1|F|15|200\n"));
        registry.apply(mutation("2|B\n"));

        assert!(registry.exists(200));
        assert!(!registry.is_active(200));
        for uid in UIDS {
            let queue = queues.get_mut(&uid).unwrap();
            assert_eq!(queue.try_recv().unwrap(), raw("2|B\n"), "uid {uid}");
            assert_silent(queue);
        }
    }

    #[test]
    fn status_update_reaches_exactly_the_followers() {
        let (mut registry, mut queues) = populated_registry();

        let (target, followers) = (UIDS[0], &UIDS[1..]);
        for (k, uid) in followers.iter().enumerate() {
            registry.apply(mutation(&format!("{}|F|{uid}|{target}\n", k + 1)));
        }

        // Drain the follow notifications off the target's queue.
        let target_queue = queues.get_mut(&target).unwrap();
        for _ in followers {
            target_queue.try_recv().unwrap();
        }

        let status = format!("{}|S|{target}\n", followers.len() + 1);
        registry.apply(mutation(&status));

        for uid in followers {
            let queue = queues.get_mut(uid).unwrap();
            assert_eq!(queue.try_recv().unwrap(), raw(&status), "uid {uid}");
            assert_silent(queue);
        }

        assert_silent(queues.get_mut(&target).unwrap());
    }

    #[test]
    fn status_update_from_an_unknown_user_is_a_noop() {
        let (mut registry, mut queues) = populated_registry();

        registry.apply(mutation("1|S|999\n"));

        for uid in UIDS {
            assert_silent(queues.get_mut(&uid).unwrap());
        }
    }

    #[test]
    fn follow_reclaims_a_dead_target() {
        let (mut registry, mut queues) = populated_registry();

        // Simulate the writer task going away.
        queues.remove(&2);
        registry.apply(mutation("1|F|15|2\n"));

        assert!(!registry.exists(2));
    }

    #[test]
    fn private_message_reclaims_a_dead_target() {
        let (mut registry, mut queues) = populated_registry();

        queues.remove(&2);
        registry.apply(mutation("1|P|15|2\n"));

        assert!(!registry.exists(2));
    }

    #[test]
    fn status_update_reclaims_dead_followers() {
        let (mut registry, mut queues) = populated_registry();

        registry.apply(mutation("1|F|2|15\n"));
        registry.apply(mutation("2|F|92|15\n"));
        queues.get_mut(&15).unwrap().try_recv().unwrap();
        queues.get_mut(&15).unwrap().try_recv().unwrap();

        queues.remove(&2);
        registry.apply(mutation("3|S|15\n"));

        assert!(!registry.exists(2));
        assert!(!registry.followers_of(15).unwrap().contains(&2));
        assert_eq!(
            queues.get_mut(&92).unwrap().try_recv().unwrap(),
            raw("3|S|15\n")
        );
    }

    #[test]
    fn status_update_prunes_vanished_follower_records() {
        let (mut registry, mut queues) = populated_registry();

        registry.apply(mutation("1|F|2|15\n"));
        registry.apply(Mutation::Unregister { uid: 2 });
        registry.apply(mutation("2|S|15\n"));

        assert!(!registry.followers_of(15).unwrap().contains(&2));
        assert_silent(queues.get_mut(&92).unwrap());
    }

    #[test]
    fn broadcast_reclaims_dead_clients() {
        let (mut registry, mut queues) = populated_registry();

        queues.remove(&71);
        registry.apply(mutation("1|B\n"));

        assert!(!registry.exists(71));
        for uid in [15, 2, 92, 87] {
            assert_eq!(
                queues.get_mut(&uid).unwrap().try_recv().unwrap(),
                raw("1|B\n")
            );
        }
    }
}
