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

//! Transport-free core of the fanout event router.
//!
//! The pieces, in the order data flows through them: the wire parser
//! ([`event`]), the reassembly buffer that restores sequence order
//! ([`sequencer`]), the per-event fan-out semantics ([`dispatch`]), and the
//! single-owner client registry they all feed into ([`registry`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod event;
pub mod registry;
pub mod sequencer;
