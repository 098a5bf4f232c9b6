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

//! The shadow call stack.
//!
//! This module only holds the data; the synchronization protocol that keeps it aligned
//! with the VM lives in [`crate::DebuggerCore`], because applying a transition may ask the
//! current debugger state to evaluate (and halt) in the middle of it.

use std::collections::VecDeque;

use itertools::izip;
use scdb_common::{DebugOpcode, FrameId, ObjectId, StructId};

/// One active script invocation, as mirrored by the debugger.
#[derive(Debug, Clone)]
pub struct StackFrame {
    object: ObjectId,
    frame: FrameId,
    class: StructId,
    class_path: String,
    is_state: bool,
    // Parallel histories, one entry per notification that touched this frame.
    lines: Vec<u32>,
    positions: Vec<u32>,
    depths: Vec<usize>,
    opcodes: Vec<DebugOpcode>,
    breakpoint_mutex: u32,
}

impl StackFrame {
    /// Create a frame whose history starts at the entering instruction
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        object: ObjectId,
        frame: FrameId,
        class: StructId,
        class_path: String,
        is_state: bool,
        depth: usize,
        line: u32,
        pos: u32,
        opcode: DebugOpcode,
    ) -> Self {
        Self {
            object,
            frame,
            class,
            class_path,
            is_state,
            lines: vec![line],
            positions: vec![pos],
            depths: vec![depth],
            opcodes: vec![opcode],
            breakpoint_mutex: 0,
        }
    }

    /// Record a new instruction executed by this frame.
    ///
    /// Moving to another line re-arms the breakpoint mutex.
    pub fn update(&mut self, line: u32, pos: u32, opcode: DebugOpcode, depth: usize) {
        if self.breakpoint_mutex != 0 && self.breakpoint_mutex != line {
            self.breakpoint_mutex = 0;
        }
        self.lines.push(line);
        self.positions.push(pos);
        self.depths.push(depth);
        self.opcodes.push(opcode);
    }

    /// Executing object
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// VM frame record
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Class owning the executing code
    pub fn class(&self) -> StructId {
        self.class
    }

    /// `Package.Class` of the owning class
    pub fn class_path(&self) -> &str {
        &self.class_path
    }

    /// Whether the frame runs state code
    pub fn is_state(&self) -> bool {
        self.is_state
    }

    /// Current line
    pub fn line(&self) -> u32 {
        self.lines.last().copied().unwrap_or_default()
    }

    /// Current source position
    pub fn pos(&self) -> u32 {
        self.positions.last().copied().unwrap_or_default()
    }

    /// Last opcode executed
    pub fn opcode(&self) -> Option<DebugOpcode> {
        self.opcodes.last().copied()
    }

    /// Whether a breakpoint already fired on the current line
    pub fn has_breakpoint(&self) -> bool {
        self.breakpoint_mutex != 0
    }

    /// Remember that a breakpoint fired on `line`
    pub fn set_breakpoint(&mut self, line: u32) {
        self.breakpoint_mutex = line;
    }

    /// Full recorded history as `(line, position, depth, opcode)`
    pub fn history(&self) -> impl Iterator<Item = (u32, u32, usize, DebugOpcode)> + '_ {
        izip!(
            self.lines.iter().copied(),
            self.positions.iter().copied(),
            self.depths.iter().copied(),
            self.opcodes.iter().copied()
        )
    }
}

/// A frame transition that arrived before the shadow stack was ready for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackCommand {
    /// Executing object when the command was queued
    pub object: ObjectId,
    /// Frame the transition applies to
    pub frame: FrameId,
    /// Transition to replay
    pub opcode: DebugOpcode,
    /// Line reported with the transition; 0 means "use the top's line"
    pub line: u32,
}

/// The shadow call stack plus its queue of deferred transitions.
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<StackFrame>,
    queued: VecDeque<StackCommand>,
    pub(crate) draining: bool,
}

impl CallStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether the stack is empty
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at `index` (0 is the bottom)
    pub fn get(&self, index: usize) -> Option<&StackFrame> {
        self.frames.get(index)
    }

    /// Mutable frame at `index` (0 is the bottom)
    pub fn get_mut(&mut self, index: usize) -> Option<&mut StackFrame> {
        self.frames.get_mut(index)
    }

    /// Top frame
    pub fn top(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    /// Mutable top frame
    pub fn top_mut(&mut self) -> Option<&mut StackFrame> {
        self.frames.last_mut()
    }

    /// Index of the top frame
    pub fn top_index(&self) -> Option<usize> {
        self.frames.len().checked_sub(1)
    }

    /// Push a frame, returning its index
    pub fn push(&mut self, frame: StackFrame) -> usize {
        self.frames.push(frame);
        self.frames.len() - 1
    }

    /// Pop the top frame
    pub fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    /// Frames from bottom to top
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &StackFrame> {
        self.frames.iter()
    }

    /// Drop every frame and every queued command
    pub fn clear(&mut self) {
        self.frames.clear();
        self.queued.clear();
    }

    /// Queue a transition for later
    pub fn enqueue(&mut self, command: StackCommand) {
        self.queued.push_back(command);
    }

    /// Deferred transitions, oldest first
    pub fn queued(&self) -> &VecDeque<StackCommand> {
        &self.queued
    }

    pub(crate) fn queued_mut(&mut self) -> &mut VecDeque<StackCommand> {
        &mut self.queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(line: u32) -> StackFrame {
        StackFrame::new(
            ObjectId(1),
            FrameId(1),
            StructId(1),
            "Engine.Pawn".into(),
            false,
            1,
            line,
            0,
            DebugOpcode::FrameEnter,
        )
    }

    #[test]
    fn test_update_appends_history() {
        let mut f = frame(10);
        f.update(11, 4, DebugOpcode::Let, 1);
        f.update(11, 9, DebugOpcode::FunctionCall, 1);
        assert_eq!(f.line(), 11);
        assert_eq!(f.pos(), 9);
        assert_eq!(f.opcode(), Some(DebugOpcode::FunctionCall));
        assert_eq!(f.history().count(), 3);
    }

    #[test]
    fn test_breakpoint_mutex_clears_on_new_line() {
        let mut f = frame(10);
        f.set_breakpoint(10);
        f.update(10, 2, DebugOpcode::Let, 1);
        assert!(f.has_breakpoint());
        f.update(11, 3, DebugOpcode::Let, 1);
        assert!(!f.has_breakpoint());
    }

    #[test]
    fn test_clear_drops_queue() {
        let mut stack = CallStack::new();
        stack.push(frame(1));
        stack.enqueue(StackCommand {
            object: ObjectId(1),
            frame: FrameId(2),
            opcode: DebugOpcode::FrameLeave,
            line: 0,
        });
        stack.clear();
        assert_eq!(stack.depth(), 0);
        assert!(stack.queued().is_empty());
    }
}
