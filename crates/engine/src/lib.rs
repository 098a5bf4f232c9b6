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

//! Core of the SCDB embedded script debugger.
//!
//! A script VM reports every debug instruction to [`DebuggerCore::debug_info`]. The core
//! mirrors the VM's call stack, decides when to halt according to its current run state,
//! and while halted exchanges locations, call stacks, watch values and commands with a
//! [`DebuggerFrontEnd`].
//!
//! The VM is reached only through the [`ScriptVm`] trait and the front end only through
//! [`DebuggerFrontEnd`], so both can be replaced by test doubles (see the `test-utils`
//! feature).

pub mod breakpoints;
pub use breakpoints::*;

pub mod config;
pub use config::*;

pub mod core;
pub use core::*;

pub mod errors;
pub use errors::*;

pub mod frontend;
pub use frontend::*;

pub mod log_forward;
pub use log_forward::*;

pub mod stack;
pub use stack::*;

pub mod state;
pub use state::*;

pub mod vm;
pub use vm::*;

pub mod watch;
pub use watch::{
    ArrayIndexNode, DataWatch, UserWatch, WatchFlattener, WatchNode, WatchScope, WatchValue,
};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
