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

//! Error types of the debugger core.
//!
//! Neither kind ever escapes into the host: [`WatchError`] is rendered as the value of the
//! offending watch entry, and [`StackError`] triggers the shadow-stack reset.

use scdb_common::{DebugOpcode, FrameId};
use thiserror::Error;

fn elements(len: &usize) -> &'static str {
    if *len == 1 {
        "element"
    } else {
        "elements"
    }
}

/// User-facing failure to evaluate a watch expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    /// The expression text was empty
    #[error("Empty watch expression")]
    Empty,

    /// A segment named a member that does not exist in the applicable scope
    #[error("Member '{member}' couldn't be found in local or global scope '{scope}'")]
    MemberNotFound {
        /// Segment name
        member: String,
        /// Name of the struct or class searched
        scope: String,
    },

    /// An array index fell outside the array
    #[error("Index ({index}) out of bounds: {name} array only has {len} {}", elements(.len))]
    IndexOutOfBounds {
        /// Requested index
        index: i64,
        /// Array name
        name: String,
        /// Current number of elements
        len: usize,
    },

    /// A null reference was dereferenced mid-chain
    #[error("Expression could not be evaluated: Value of '{0}' is None")]
    ValueIsNone(String),

    /// No backing data exists for a struct value
    #[error("No data could be found for '{0}'")]
    MissingData(String),

    /// An index sub-expression did not yield an integer
    #[error("Invalid array index '{0}'")]
    InvalidIndex(String),

    /// A member access was applied to a value without members
    #[error("'{0}' has no members")]
    NotComposite(String),

    /// No frame is available to evaluate against
    #[error("Expression could not be evaluated: no execution context")]
    NoContext,

    /// The resolver met a null base address where live data was expected.
    ///
    /// Unlike the other variants this points at a bug in the watch engine or the VM.
    #[error("Corrupted data found while evaluating '{member}' in scope '{scope}'")]
    CorruptedData {
        /// Segment name
        member: String,
        /// Name of the struct or class being resolved
        scope: String,
    },
}

/// Shadow call stack desynchronization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StackError {
    /// The VM reported a frame handle it cannot describe
    #[error("unknown frame handle {0}")]
    UnknownFrame(FrameId),

    /// A leave arrived while the shadow stack was empty
    #[error("{opcode} received with an empty call stack (frame {frame}, line {line})")]
    LeaveWithEmptyStack {
        /// Opcode received
        opcode: DebugOpcode,
        /// Frame reported
        frame: FrameId,
        /// Line reported
        line: u32,
    },

    /// A statement arrived while the shadow stack was empty
    #[error("{opcode} received with an empty call stack (frame {frame}, line {line})")]
    StatementWithEmptyStack {
        /// Opcode received
        opcode: DebugOpcode,
        /// Frame reported
        frame: FrameId,
        /// Line reported
        line: u32,
    },

    /// A frame enter repeated the frame already on top
    #[error("received duplicate {opcode} for frame {frame} (line {line})")]
    DuplicateEnter {
        /// Opcode received
        opcode: DebugOpcode,
        /// Frame reported
        frame: FrameId,
        /// Line reported
        line: u32,
    },

    /// A latent transition arrived at a depth it is not valid for
    #[error("{opcode} received with stack depth {depth} (frame {frame}, line {line})")]
    UnexpectedDepth {
        /// Opcode received
        opcode: DebugOpcode,
        /// Shadow stack depth at the time
        depth: usize,
        /// Frame reported
        frame: FrameId,
        /// Line reported
        line: u32,
    },

    /// The reported frame does not match the top of the shadow stack
    #[error("call stack out of sync on {opcode}: top is {top}, received {frame} (line {line})")]
    OutOfSync {
        /// Opcode received
        opcode: DebugOpcode,
        /// Frame on top of the shadow stack
        top: FrameId,
        /// Frame reported
        frame: FrameId,
        /// Line reported
        line: u32,
    },
}
