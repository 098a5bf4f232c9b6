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

//! Debugger run states.
//!
//! After every notification the core asks the current [`DebuggerState`] whether execution
//! should halt. Every state carries a [`StateCursor`]: the shadow-stack frame it considers
//! current plus the `(depth, line)` baseline captured when the state was created.
//!
//! [`StateMode::BreakOnDataChange`] decorates another state. It halts when its data watch
//! changes and otherwise delegates to the wrapped state, and it absorbs every new state
//! requested while it is active so the watch survives stepping.

use derive_more::Display;

use crate::{watch::DataWatch, BreakpointRegistry, CallStack, ScriptVm};

/// Stack depth and line observed when a state was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Baseline {
    /// Shadow-stack depth
    pub depth: usize,
    /// Line of the then-current frame, if there was one
    pub line: Option<u32>,
}

/// The frame a state tracks, and where it started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCursor {
    /// Index of the current frame in the shadow stack
    pub current: Option<usize>,
    /// Position when the state was created
    pub baseline: Baseline,
}

/// State discriminant, for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StateKind {
    /// Running, halting only on breakpoints
    Idle,
    /// Halted, waiting for the user
    WaitingForInput,
    /// Running until a breakpoint
    WaitingForCondition,
    /// Reserved run-to-cursor mode
    RunToCursor,
    /// Running until the current frame returns
    StepOut,
    /// Running until the next distinguishable position
    StepInto,
    /// Running until the next line of the current frame
    StepOverStack,
    /// Watching a value, decorating another state
    BreakOnDataChange,
}

/// What a state does.
#[derive(Debug, Clone)]
pub enum StateMode {
    /// See [`StateKind::Idle`]
    Idle,
    /// See [`StateKind::WaitingForInput`]
    WaitingForInput,
    /// See [`StateKind::WaitingForCondition`]
    WaitingForCondition,
    /// See [`StateKind::RunToCursor`]
    RunToCursor,
    /// See [`StateKind::StepOut`]
    StepOut,
    /// See [`StateKind::StepInto`]
    StepInto,
    /// See [`StateKind::StepOverStack`]
    StepOverStack,
    /// See [`StateKind::BreakOnDataChange`]
    BreakOnDataChange(Box<DataChange>),
}

/// The decorator half of [`StateMode::BreakOnDataChange`].
#[derive(Debug, Clone)]
pub struct DataChange {
    /// Watched value
    pub watch: DataWatch,
    /// Wrapped state
    pub sub_state: Option<DebuggerState>,
    /// Set when the last halt was caused by the watch
    pub data_break: bool,
    /// Adopt the state this one replaces as its sub-state
    adopt_current: bool,
}

/// Inputs to one break evaluation.
pub struct EvalContext<'a> {
    /// VM, for data watches
    pub vm: &'a dyn ScriptVm,
    /// Shadow stack; breakpoint mutexes are set through it
    pub stack: &'a mut CallStack,
    /// Breakpoints
    pub breakpoints: &'a BreakpointRegistry,
    /// The notification only marks a bookkeeping boundary
    pub optional: bool,
}

/// One debugger run state.
#[derive(Debug, Clone)]
pub struct DebuggerState {
    cursor: StateCursor,
    mode: StateMode,
}

impl DebuggerState {
    /// Create a state with the given baseline
    pub fn new(mode: StateMode, baseline: Baseline) -> Self {
        Self { cursor: StateCursor { current: None, baseline }, mode }
    }

    /// An idle state with no baseline
    pub fn idle() -> Self {
        Self::new(StateMode::Idle, Baseline::default())
    }

    /// A data-watch decorator that wraps whatever state it replaces
    pub fn break_on_data_change(watch: DataWatch, baseline: Baseline) -> Self {
        let change = DataChange { watch, sub_state: None, data_break: false, adopt_current: true };
        Self::new(StateMode::BreakOnDataChange(Box::new(change)), baseline)
    }

    /// Outer state kind
    pub fn kind(&self) -> StateKind {
        match &self.mode {
            StateMode::Idle => StateKind::Idle,
            StateMode::WaitingForInput => StateKind::WaitingForInput,
            StateMode::WaitingForCondition => StateKind::WaitingForCondition,
            StateMode::RunToCursor => StateKind::RunToCursor,
            StateMode::StepOut => StateKind::StepOut,
            StateMode::StepInto => StateKind::StepInto,
            StateMode::StepOverStack => StateKind::StepOverStack,
            StateMode::BreakOnDataChange(_) => StateKind::BreakOnDataChange,
        }
    }

    /// Kind of the innermost wrapped state
    pub fn innermost_kind(&self) -> StateKind {
        self.innermost().kind()
    }

    /// The innermost wrapped state
    pub fn innermost(&self) -> &Self {
        match &self.mode {
            StateMode::BreakOnDataChange(change) => {
                change.sub_state.as_ref().map_or(self, Self::innermost)
            }
            _ => self,
        }
    }

    /// Mode of this state
    pub fn mode(&self) -> &StateMode {
        &self.mode
    }

    /// Baseline of the innermost state
    pub fn baseline(&self) -> Baseline {
        self.innermost().cursor.baseline
    }

    /// The data-watch decorator, if this is one
    pub fn data_change(&self) -> Option<&DataChange> {
        match &self.mode {
            StateMode::BreakOnDataChange(change) => Some(change),
            _ => None,
        }
    }

    /// Mutable access to the data-watch decorator, if this is one
    pub fn data_change_mut(&mut self) -> Option<&mut DataChange> {
        match &mut self.mode {
            StateMode::BreakOnDataChange(change) => Some(change),
            _ => None,
        }
    }

    /// Whether the innermost state is halted waiting for the user
    pub fn is_waiting_for_input(&self) -> bool {
        self.innermost_kind() == StateKind::WaitingForInput
    }

    /// Current frame, forwarded to the innermost state
    pub fn current_node(&self) -> Option<usize> {
        match &self.mode {
            StateMode::BreakOnDataChange(change) => match &change.sub_state {
                Some(sub) => sub.current_node(),
                None => self.cursor.current,
            },
            _ => self.cursor.current,
        }
    }

    /// Set the current frame, forwarded to the innermost state
    pub fn set_current_node(&mut self, node: Option<usize>) {
        match &mut self.mode {
            StateMode::BreakOnDataChange(change) if change.sub_state.is_some() => {
                if let Some(sub) = &mut change.sub_state {
                    sub.set_current_node(node);
                }
            }
            _ => self.cursor.current = node,
        }
    }

    /// Clear the data-break flag at every decorator level
    pub fn clear_data_break(&mut self) {
        if let StateMode::BreakOnDataChange(change) = &mut self.mode {
            change.data_break = false;
            if let Some(sub) = &mut change.sub_state {
                sub.clear_data_break();
            }
        }
    }

    /// Offer a newly requested state to this one.
    ///
    /// Returns the state back when it was not absorbed. A data-watch decorator absorbs
    /// every state, replacing its previous sub-state unless that sub-state absorbs it.
    pub fn intercept_new_state(&mut self, new: Self) -> Option<Self> {
        let StateMode::BreakOnDataChange(change) = &mut self.mode else {
            return Some(new);
        };

        if let Some(sub) = &mut change.sub_state {
            match sub.intercept_new_state(new) {
                None => return None,
                Some(new) => *sub = new,
            }
        } else {
            change.sub_state = Some(new);
        }
        None
    }

    /// Offer the state being replaced to this, its replacement.
    ///
    /// Returns the old state back when it was not claimed and may be dropped.
    pub fn intercept_old_state(&mut self, old: Self) -> Option<Self> {
        match &mut self.mode {
            StateMode::BreakOnDataChange(change) if change.adopt_current => {
                change.adopt_current = false;
                self.cursor.current = old.current_node();
                change.sub_state = Some(old);
                None
            }
            _ => Some(old),
        }
    }

    /// Remove the data-watch decorator, returning the wrapped state
    pub fn unwrap_data_change(self) -> Result<Self, Self> {
        match self.mode {
            StateMode::BreakOnDataChange(change) => {
                let cursor = self.cursor;
                Ok(change.sub_state.unwrap_or_else(|| Self { cursor, mode: StateMode::Idle }))
            }
            mode => Err(Self { cursor: self.cursor, mode }),
        }
    }

    /// Whether execution should halt at the current notification.
    ///
    /// Only called with a non-empty stack and the debugger not closing.
    pub fn should_break(&mut self, cx: &mut EvalContext<'_>) -> bool {
        let depth = cx.stack.depth();
        let current = self.cursor.current;
        let line = current.and_then(|i| cx.stack.get(i)).map(|frame| frame.line());
        let baseline = self.cursor.baseline;
        // Frames at line 0 have not reached any code yet.
        let on_code = line.is_some_and(|line| line > 0);

        match &mut self.mode {
            StateMode::Idle => breakpoint_condition(current, cx),
            StateMode::WaitingForInput => false,
            StateMode::WaitingForCondition | StateMode::RunToCursor => {
                on_code && breakpoint_condition(current, cx)
            }
            StateMode::StepOut => {
                on_code && (depth < baseline.depth || breakpoint_condition(current, cx))
            }
            StateMode::StepInto => on_code && (depth != baseline.depth || line != baseline.line),
            StateMode::StepOverStack => {
                if !on_code || (depth == baseline.depth && line == baseline.line) {
                    return false;
                }
                match depth.cmp(&baseline.depth) {
                    std::cmp::Ordering::Less => true,
                    std::cmp::Ordering::Equal => !cx.optional,
                    std::cmp::Ordering::Greater => breakpoint_condition(current, cx),
                }
            }
            StateMode::BreakOnDataChange(change) => {
                let node = change.sub_state.as_ref().map_or(current, |sub| sub.current_node());
                let frame = node.and_then(|i| cx.stack.get(i));
                if change.watch.check(cx.vm, &*cx.stack, frame) {
                    change.data_break = true;
                    return true;
                }
                match &mut change.sub_state {
                    Some(sub) => sub.should_break(cx),
                    None => on_code && breakpoint_condition(current, cx),
                }
            }
        }
    }

    /// One-line description
    pub fn describe(&self) -> String {
        let cursor = &self.cursor;
        let mut text = format!(
            "{} (node: {:?}, baseline depth {}, line {:?})",
            self.kind(),
            cursor.current,
            cursor.baseline.depth,
            cursor.baseline.line
        );
        if let StateMode::BreakOnDataChange(change) = &self.mode {
            text.push_str(&format!(" watching '{}'", change.watch.text()));
            if let Some(sub) = &change.sub_state {
                text.push_str(&format!(" -> {}", sub.describe()));
            }
        }
        text
    }
}

/// Whether the frame at `node` sits on an enabled breakpoint that has not fired on this
/// line yet. Firing arms the frame's breakpoint mutex.
fn breakpoint_condition(node: Option<usize>, cx: &mut EvalContext<'_>) -> bool {
    let Some(frame) = node.and_then(|i| cx.stack.get_mut(i)) else {
        return false;
    };
    let line = frame.line();
    if frame.has_breakpoint() || !cx.breakpoints.query(frame.class_path(), line) {
        return false;
    }
    frame.set_breakpoint(line);
    true
}
