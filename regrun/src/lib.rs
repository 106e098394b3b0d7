// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line surface for regrun, a parallel orchestrator for a language runtime's regression
//! suite.
//!
//! The runtime under test embeds regrun by calling [`main_with`] with its test framework. The same
//! binary serves as the command-line runner and, when started by a parallel run, as a worker.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
