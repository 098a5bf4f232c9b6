// SCDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! SCDB Common - Shared vocabulary for SCDB components
//!
//! This crate holds the handle types, opcode vocabulary, breakpoint types and logging
//! setup shared by the debugger engine and its front ends.

/// Handle newtypes and breakpoint types used throughout SCDB
pub mod types;

/// Whitespace normalization for user-authored expressions
pub mod expression;
/// Logging setup and utilities for consistent logging across SCDB components
pub mod logging;
/// Opt-in hard-stop assertions gated by the `SCDB_ASSERT` environment variable
pub mod macros;
/// The instruction vocabulary a script VM reports to the debugger
pub mod opcode;

pub use expression::*;
pub use logging::*;
pub use opcode::*;
pub use types::*;
