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

//! Command Line Interface
use once_cell::sync::Lazy;

/// The parsed command-line arguments provided to this program. Lazily initialized.
///
/// # Exits
///
/// Exits if [`argh::from_env`] would exit--for example, if the `--help` flag was provided or the
/// program arguments could not be parsed.
pub static PARSED_COMMANDS: Lazy<TopLevel> = Lazy::new(argh::from_env);

/// Toplevel CLI commands and options.
/// Subcommands are optional.
/// If no command is provided "serve" will be invoked with default options.
#[derive(argh::FromArgs, PartialEq, Debug)]
pub struct TopLevel {
    /// subcommands
    #[argh(subcommand)]
    pub subcommand: Option<Command>,
}

/// Subcommands
#[derive(argh::FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum Command {
    /// starts the router.
    Serve(Serve),

    /// prints the fanout version to stdout.
    Version(Version),
}

/// Starts the fanout router. This is the default command when no command is provided.
#[derive(argh::FromArgs, PartialEq, Debug, Default)]
#[argh(subcommand, name = "serve")]
pub struct Serve {
    /// if present, the port the event source listener binds;
    /// takes precedence over the `eventListenerPort` environment variable.
    #[argh(option, short = 'e')]
    pub events_port: Option<u16>,

    /// if present, the port the client listener binds;
    /// takes precedence over the `clientListenerPort` environment variable.
    #[argh(option, short = 'c')]
    pub clients_port: Option<u16>,
}

/// Prints the fanout version to stdout.
#[derive(argh::FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "version")]
pub struct Version {}
