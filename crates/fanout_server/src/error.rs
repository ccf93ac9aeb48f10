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

//! Fanout Error Handling

use std::io;

use fanout_core::event::ProtocolError;

/// Abstraction over all errors that we can handle in the server.
/// This allows using '?' error handling everywhere for all known error types.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// generic error represented by an error message
    #[error("{0}")]
    Generic(String),
    /// error from the wire protocol layer
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// error resulting from an IO error
    #[error(transparent)]
    Io(#[from] io::Error),
    /// error resulting from tokio::JoinError
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Result for main functions
pub type ServerResult = Result<(), ServerError>;
