// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod fixture;
pub mod regrun_cli;
