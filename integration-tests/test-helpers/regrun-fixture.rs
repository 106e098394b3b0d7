// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! regrun, wired up to the fixture framework. Also acts as its own worker runtime.

use color_eyre::Result;
use integration_tests::fixture::FixtureFramework;

fn main() -> Result<()> {
    color_eyre::install()?;
    std::process::exit(regrun::main_with(&FixtureFramework))
}
