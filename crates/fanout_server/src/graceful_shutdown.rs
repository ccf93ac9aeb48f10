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

//! Mechanisms for shutting down the router without losing queued
//! notifications.
//!
//! The normal shutdown trigger is the event stream's EOF. This module covers
//! the other one: an operator pressing `CTRL+C`, which should drain the
//! registry through the same path instead of killing the process mid-flush.

use tokio::signal;
use tokio::sync::OnceCell;
use tracing::warn;

static SHUTDOWN_INVOKED: OnceCell<()> = OnceCell::const_new();

/// Listens for signals that cause the application to shut down; namely, `CTRL+C`.
async fn signal_listener() {
    while signal::ctrl_c().await.is_err() { /* spin */ }

    warn!("shutdown has been invoked; draining the registry");
}

/// Resolves when a global shutdown has started.
///
/// All tasks **should** start gracefully exiting by this time.
pub async fn global_shutdown_starts() {
    SHUTDOWN_INVOKED.get_or_init(signal_listener).await;
}
