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

//! The front-end seam.
//!
//! A front end renders what the core pushes at it (location, call stack, watches, log)
//! and feeds user commands back. The transport behind it (in-process UI, IPC, socket) is
//! not the core's concern. While halted the core pulls commands through
//! [`DebuggerFrontEnd::poll`]; outside a halt the host forwards them to
//! [`crate::DebuggerCore::handle_command`] directly.

use auto_impl::auto_impl;
use eyre::{Context, Result};
use scdb_common::{Address, PropertyId, SourceLocation, WatchEntryId, WatchKind};
use serde::{Deserialize, Serialize};

/// Outbound interface of the debugger core.
#[auto_impl(&mut, Box)]
pub trait DebuggerFrontEnd {
    /// Report the current execution position
    fn notify_location(&mut self, location: &SourceLocation);

    /// Replace the displayed call stack; frames are listed top to bottom
    fn update_call_stack(&mut self, frames: &[String]);

    /// Start a batch of updates to one watch pane
    fn begin_watch_batch(&mut self, kind: WatchKind);

    /// Remove every entry of one watch pane
    fn clear_watch(&mut self, kind: WatchKind);

    /// Add one entry under `parent` (or at the root) and return its id
    fn add_watch_entry(
        &mut self,
        kind: WatchKind,
        parent: Option<WatchEntryId>,
        name: &str,
        value: &str,
    ) -> WatchEntryId;

    /// Finish a batch started with [`Self::begin_watch_batch`]
    fn end_watch_batch(&mut self, kind: WatchKind);

    /// Append a free-text diagnostic line
    fn append_log(&mut self, line: &str);

    /// Bring the debugger UI forward
    fn show(&mut self) {}

    /// Send the debugger UI to the background
    fn hide(&mut self) {}

    /// Service pending front-end work once, returning at most one command.
    ///
    /// Called repeatedly from the halt loop.
    fn poll(&mut self) -> PumpEvent;

    /// Whether the front end is connected
    fn is_connected(&self) -> bool {
        true
    }

    /// (Re)connect after an attach
    fn connect(&mut self) {}

    /// Close the connection
    fn close(&mut self) {}
}

/// Result of one [`DebuggerFrontEnd::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum PumpEvent {
    /// Nothing happened; the halt loop waits [`HALT_IDLE_INTERVAL`](crate::HALT_IDLE_INTERVAL)
    /// before polling again
    Idle,
    /// The user issued a command
    Command(FrontEndCommand),
    /// The front end went away; stop debugging and let the host exit
    Quit,
}

/// Run-control actions accepted while halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    /// Resume until the next breakpoint
    Go,
    /// Stop at the next distinguishable execution point
    StepInto,
    /// Stop at the next line of the current frame, stepping over calls
    StepOverStack,
    /// Stop once the current frame returns
    StepOut,
    /// Reserved: run to a source position
    RunToCursor,
    /// Request termination and detach
    Exit,
}

/// Every inbound operation a front end can issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum FrontEndCommand {
    /// Add a breakpoint
    SetBreakpoint {
        /// Owning class path
        class_path: String,
        /// Line
        line: u32,
    },
    /// Remove a breakpoint
    RemoveBreakpoint {
        /// Owning class path
        class_path: String,
        /// Line
        line: u32,
    },
    /// Add a user watch
    AddWatch {
        /// Expression
        text: String,
    },
    /// Remove a user watch
    RemoveWatch {
        /// Expression
        text: String,
    },
    /// Remove every user watch
    ClearWatches,
    /// Evaluate watches against another frame of the halted stack
    ChangeStack {
        /// 0 is the top frame
        index_from_top: usize,
    },
    /// Break when the value of an expression changes
    SetDataWatch {
        /// Expression
        text: String,
    },
    /// Drop the data watch
    ClearDataWatch,
    /// Write a value into live memory through the property's text import
    SetProperty {
        /// Property handle as displayed
        property: PropertyId,
        /// Address handle as displayed
        address: Address,
        /// New value
        value: String,
    },
    /// Halt when a null reference is accessed
    SetBreakOnUnhandledAccess {
        /// On or off
        enabled: bool,
    },
    /// Halt at the next instruction
    RequestImmediateBreak,
    /// Attach or detach the debugger
    Attach {
        /// Attach when true, detach otherwise
        attach: bool,
    },
    /// Run control
    Action {
        /// Requested action
        action: UserAction,
    },
    /// Exit and shut down the host
    Terminate,
}

impl FrontEndCommand {
    /// Decode a command sent as JSON, e.g. `{"command":"add_watch","text":"Health"}`.
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .with_context(|| format!("Failed to decode front-end command: {payload}"))
    }
}
