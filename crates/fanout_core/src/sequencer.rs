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

//! Reassembly of the out-of-order event stream into contiguous sequence
//! order.
//!
//! Each event source connection funnels its events through one [`Sequencer`].
//! Events go in, in whatever order the source produces them; mutations come
//! out in strictly ascending sequence order, contiguous from
//! [`FIRST_SEQUENCE`]. Anything already delivered or already buffered is
//! dropped, the earliest received copy winning.

use ahash::AHashMap;
use tracing::debug;

use crate::dispatch::Mutation;
use crate::event::Event;

/// The sequence number every source stream starts at.
pub const FIRST_SEQUENCE: u64 = 1;

/// Gap-tolerant reassembly buffer for one event-source stream.
///
/// Memory use is bounded only by the largest gap the source produces; a
/// sparse stream of far-future sequences buffers until the gap fills.
#[derive(Debug)]
pub struct Sequencer {
    next: u64,
    pending: AHashMap<u64, Mutation>,
}

impl Sequencer {
    /// Creates a sequencer expecting [`FIRST_SEQUENCE`] first.
    pub fn new() -> Self {
        Sequencer {
            next: FIRST_SEQUENCE,
            pending: AHashMap::new(),
        }
    }

    /// Accepts one parsed event and returns the mutations that became
    /// deliverable because of it, in sequence order.
    ///
    /// Stale sequences and duplicates of buffered ones are dropped.
    pub fn accept(&mut self, event: Event) -> Vec<Mutation> {
        let sequence = event.sequence();

        if sequence < self.next || self.pending.contains_key(&sequence) {
            debug!(sequence, "dropping stale or duplicate event");
            return Vec::new();
        }

        self.pending.insert(sequence, Mutation::for_event(event));

        self.drain()
    }

    /// Flushes the remaining contiguous prefix when the stream closes.
    ///
    /// Buffered events past the first gap can never be delivered in order
    /// and are discarded.
    pub fn finish(mut self) -> Vec<Mutation> {
        let ready = self.drain();

        if !self.pending.is_empty() {
            debug!(
                buffered = self.pending.len(),
                next = self.next,
                "discarding buffered events past the sequence gap"
            );
        }

        ready
    }

    /// How many events are buffered waiting for a gap to fill.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn drain(&mut self) -> Vec<Mutation> {
        let mut ready = Vec::new();

        while let Some(mutation) = self.pending.remove(&self.next) {
            ready.push(mutation);
            self.next += 1;
        }

        ready
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
