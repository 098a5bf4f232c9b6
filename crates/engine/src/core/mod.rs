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

//! The debugger core.
//!
//! [`DebuggerCore`] is driven entirely from the script thread. The VM calls
//! [`DebuggerCore::debug_info`] once per debug instruction; the core keeps its shadow call
//! stack in sync, asks the current run state whether to halt and, when it does, blocks in
//! a loop pumping the front end until the user resumes execution.
//!
//! # State changes
//!
//! New run states are staged as *pending* and applied at the next notification (or right
//! away for a halt). Applying a pending state first offers it to the current state, which
//! may absorb it (the data-watch decorator does); otherwise the pending state may claim
//! the current one before replacing it.
//!
//! # Example
//!
//! ```ignore
//! use scdb_engine::{DebugEvent, DebuggerConfig, DebuggerCore};
//!
//! let mut core = DebuggerCore::new(front_end, DebuggerConfig::load());
//! core.set_breakpoint("Game.Pawn", 42);
//!
//! // from the VM's instruction hook
//! core.debug_info(&mut vm, DebugEvent::new(object, frame, opcode, line, pos));
//! ```

mod interface;
mod tracker;

use std::{fmt::Write as _, thread, time::Duration};

use eyre::{Context, Result};
use scdb_common::{Address, DebugOpcode, FrameId, ObjectId, PropertyId};
use tracing::{debug, error, info, warn};

use crate::{
    state::{Baseline, StateKind, StateMode},
    vm::reflect,
    watch::{DataWatch, UserWatch},
    BreakpointRegistry, CallStack, DebuggerConfig, DebuggerFrontEnd, DebuggerState,
    FrameKind, FrontEndCommand, LogBuffer, PumpEvent, RecursionLimits, ScriptVm, StackFrame,
    UserAction,
};

/// Pause between halt-loop polls while the front end has nothing to deliver
pub const HALT_IDLE_INTERVAL: Duration = Duration::from_millis(10);

/// One debug instruction reported by the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugEvent {
    /// Executing object
    pub object: ObjectId,
    /// Frame record of the executing invocation
    pub frame: FrameId,
    /// Instruction kind
    pub opcode: DebugOpcode,
    /// Source line
    pub line: u32,
    /// Source position within the script
    pub pos: u32,
}

impl DebugEvent {
    /// Bundle the notification arguments
    pub fn new(object: ObjectId, frame: FrameId, opcode: DebugOpcode, line: u32, pos: u32) -> Self {
        Self { object, frame, opcode, line, pos }
    }
}

/// The script debugger.
pub struct DebuggerCore {
    front_end: Box<dyn DebuggerFrontEnd>,
    config: DebuggerConfig,
    breakpoints: BreakpointRegistry,
    stack: CallStack,
    state: DebuggerState,
    pending: Option<DebuggerState>,
    watches: Vec<UserWatch>,
    log_buffer: Option<LogBuffer>,

    /// Frame the watch panes are evaluated against
    current_stack_position: Option<usize>,

    attached: bool,
    closing: bool,
    /// Cleared by stack corruption and re-attach, set again at the next tick
    processing_enabled: bool,
    /// Set while a halt is in effect
    is_debugging: bool,
    /// Ends the halt loop
    resume: bool,
    exit_requested: bool,
    accessed_none: bool,
    break_asap: bool,
    tick_suspended: bool,
}

impl std::fmt::Debug for DebuggerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerCore")
            .field("state", &self.state.kind())
            .field("depth", &self.stack.depth())
            .field("attached", &self.attached)
            .field("closing", &self.closing)
            .finish_non_exhaustive()
    }
}

impl DebuggerCore {
    /// Create an attached core talking to `front_end`
    pub fn new(front_end: impl DebuggerFrontEnd + 'static, config: DebuggerConfig) -> Self {
        info!(
            break_on_unhandled_access = config.break_on_unhandled_access,
            "Creating script debugger"
        );
        Self {
            front_end: Box::new(front_end),
            config,
            breakpoints: BreakpointRegistry::new(),
            stack: CallStack::new(),
            state: DebuggerState::idle(),
            pending: None,
            watches: Vec::new(),
            log_buffer: None,
            current_stack_position: None,
            attached: true,
            closing: false,
            processing_enabled: true,
            is_debugging: false,
            resume: false,
            exit_requested: false,
            accessed_none: false,
            break_asap: false,
            tick_suspended: false,
        }
    }

    /// Forward log lines captured in `buffer` to the front end
    pub fn with_log_buffer(mut self, buffer: LogBuffer) -> Self {
        self.log_buffer = Some(buffer);
        self
    }

    /// Settings in effect
    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Display recursion limits
    pub fn recursion_limits(&self) -> RecursionLimits {
        self.config.recursion
    }

    /// Change the display recursion limits; saved with the configuration at teardown
    pub fn set_recursion_limits(&mut self, limits: RecursionLimits) {
        self.config.recursion = limits;
    }

    /// Breakpoints
    pub fn breakpoints(&self) -> &BreakpointRegistry {
        &self.breakpoints
    }

    /// Mutable breakpoints
    pub fn breakpoints_mut(&mut self) -> &mut BreakpointRegistry {
        &mut self.breakpoints
    }

    /// Add a breakpoint on `line` of `class_path` (`Package.Class`)
    pub fn set_breakpoint(&mut self, class_path: &str, line: u32) {
        self.breakpoints.set(class_path, line);
    }

    /// Remove a breakpoint
    pub fn remove_breakpoint(&mut self, class_path: &str, line: u32) {
        self.breakpoints.remove(class_path, line);
    }

    /// Shadow call stack
    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    /// Current run state
    pub fn state(&self) -> &DebuggerState {
        &self.state
    }

    /// State waiting to be applied at the next notification
    pub fn pending_state(&self) -> Option<&DebuggerState> {
        self.pending.as_ref()
    }

    /// User watches
    pub fn watches(&self) -> &[UserWatch] {
        &self.watches
    }

    /// Frame the watch panes are evaluated against
    pub fn current_stack_position(&self) -> Option<usize> {
        self.current_stack_position
    }

    /// Whether the debugger is attached
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Whether the debugger is detaching
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Whether notifications are processed
    pub fn is_processing_enabled(&self) -> bool {
        self.processing_enabled
    }

    /// Whether a halt is in effect
    pub fn is_debugging(&self) -> bool {
        self.is_debugging
    }

    /// Whether the user asked to exit
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    fn is_exiting(&self, vm: &dyn ScriptVm) -> bool {
        self.exit_requested || vm.is_shutting_down()
    }

    // ---------------------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------------------

    /// Attach or detach.
    ///
    /// Re-attaching suspends processing until the next tick so the shadow stack is only
    /// rebuilt from a clean frame boundary.
    pub fn attach(&mut self, attach: bool) {
        let was_attached = self.attached;
        self.attached = attach;

        if attach {
            self.closing = false;
            if !was_attached {
                self.processing_enabled = false;
            }
            if !self.front_end.is_connected() {
                self.front_end.connect();
            }
            info!(was_attached, "Debugger attached");
        } else if !self.closing {
            self.close(false);
        }
    }

    /// The host starts a new tick
    pub fn notify_begin_tick(&mut self) {
        self.processing_enabled = true;
    }

    /// Detach: drop the shadow stack and go idle. `unbind_front_end` also closes the front
    /// end connection.
    pub fn close(&mut self, unbind_front_end: bool) {
        if self.closing {
            if unbind_front_end && self.front_end.is_connected() {
                self.front_end.close();
            }
            return;
        }

        info!(depth = self.stack.depth(), "Detaching debugger");
        self.attached = false;
        self.closing = true;
        self.stack.clear();
        self.current_stack_position = None;
        for watch in &mut self.watches {
            watch.clear_scope();
        }
        self.state.set_current_node(None);
        self.force_idle();

        if unbind_front_end && self.front_end.is_connected() {
            self.front_end.close();
        }
    }

    /// Close everything and save the configuration
    pub fn teardown(&mut self) -> Result<()> {
        self.close(true);
        self.config.save().wrap_err("Failed to save debugger configuration")
    }

    // ---------------------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------------------

    /// Process one debug instruction.
    pub fn debug_info(&mut self, vm: &mut dyn ScriptVm, event: DebugEvent) {
        if self.tick_suspended {
            vm.set_tick_enabled(true);
            self.tick_suspended = false;
        }

        let Some(desc) = vm.frame(event.frame) else {
            warn!(frame = %event.frame, opcode = %event.opcode, "Notification for an unknown frame");
            return;
        };
        // Scripts without debug info only report state leaves, which keep the stack
        // balanced but never stop.
        let release = !vm.has_debug_info(desc.owner_class);
        if release && event.opcode != DebugOpcode::FrameLeaveViaStateChange {
            return;
        }

        if !self.processing_enabled || !self.attached {
            if !self.attached && self.front_end.is_connected() {
                self.front_end.close();
            }
            return;
        }

        if desc.kind == FrameKind::ClassScope {
            return;
        }

        self.process_pending_state();

        if self.is_exiting(vm) {
            self.close(false);
        }
        if self.closing {
            if self.front_end.is_connected() {
                self.front_end.close();
            }
            return;
        }

        let handled = self.update_stack(vm, &event);
        if handled || release {
            return;
        }
        let Some(top) = self.stack.top_index() else {
            return;
        };

        self.update_stack_info(vm, Some(top));
        if self.is_debugging && self.current_stack_position != Some(top) {
            self.stack_changed(vm, Some(top));
        }

        if (self.accessed_none && self.config.break_on_unhandled_access) || self.break_asap {
            self.break_now(vm);
        } else {
            self.process(vm, false);
            if self.is_exiting(vm) {
                self.close(false);
            }
        }
    }

    /// A script dereferenced a null reference
    pub fn notify_accessed_none(&mut self) {
        self.accessed_none = true;
    }

    /// A script assertion failed. Halts and returns whether execution should continue
    /// past the assertion.
    pub fn notify_assertion_failed(&mut self, vm: &mut dyn ScriptVm, line: u32) -> bool {
        if self.is_exiting(vm) || self.closing {
            return false;
        }
        warn!(line, "Script assertion failed");
        self.break_now(vm);
        !(self.is_exiting(vm) || self.closing)
    }

    /// The VM detected a runaway loop. Halts and returns whether execution should continue.
    pub fn notify_infinite_loop(&mut self, vm: &mut dyn ScriptVm) -> bool {
        if self.is_exiting(vm) || self.closing {
            return false;
        }
        warn!(depth = self.stack.depth(), "Runaway loop detected");
        self.break_now(vm);
        !(self.is_exiting(vm) || self.closing)
    }

    /// Halt on null-reference access
    pub fn set_break_on_unhandled_access(&mut self, enabled: bool) {
        info!(enabled, "Break on unhandled access");
        self.config.break_on_unhandled_access = enabled;
    }

    /// Halt at the next processed instruction
    pub fn request_immediate_break(&mut self) {
        self.break_asap = true;
    }

    // ---------------------------------------------------------------------------------
    // Run states
    // ---------------------------------------------------------------------------------

    fn baseline(&self) -> Baseline {
        let node = self.state.current_node().or(self.stack.top_index());
        Baseline {
            depth: self.stack.depth(),
            line: node.and_then(|i| self.stack.get(i)).map(StackFrame::line),
        }
    }

    fn new_state(&self, mode: StateMode) -> DebuggerState {
        DebuggerState::new(mode, self.baseline())
    }

    /// Stage `state`; it takes effect at the next notification
    pub fn change_state(&mut self, state: DebuggerState) {
        debug!(from = %self.state.kind(), to = %state.kind(), "Staging debugger state");
        self.is_debugging = state.kind() == StateKind::WaitingForInput;
        self.pending = Some(state);
    }

    fn change_state_now(&mut self, vm: &mut dyn ScriptVm, state: DebuggerState) {
        self.change_state(state);
        self.accessed_none = false;
        self.break_asap = false;

        let node = self.state.current_node();
        if let Some(pending) = &self.pending {
            if (self.is_debugging && node != pending.current_node()) || node.is_none() {
                self.stack_changed(vm, node);
                if node.is_none() {
                    self.is_debugging = false;
                }
            }
        }
        if let Some(pending) = &mut self.pending {
            pending.set_current_node(node);
        }

        self.process_pending_state();
        self.process(vm, false);
    }

    /// Apply the staged state, if any
    pub fn process_pending_state(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        let Some(mut pending) = self.state.intercept_new_state(pending) else {
            debug!(state = %self.state.describe(), "Pending state absorbed");
            return;
        };

        let old = std::mem::replace(&mut self.state, DebuggerState::idle());
        if let Some(dropped) = pending.intercept_old_state(old) {
            debug!(from = %dropped.kind(), to = %pending.kind(), "Debugger state changed");
        }
        self.state = pending;
    }

    /// Go idle immediately, dropping any staged state and bypassing interception
    fn force_idle(&mut self) {
        self.pending = None;
        self.state = DebuggerState::idle();
        self.is_debugging = false;
        self.current_stack_position = None;
    }

    /// Point the current state at `node`, refreshing the watch scopes when a halt moves
    /// to another frame or the stack empties.
    fn update_stack_info(&mut self, vm: &dyn ScriptVm, node: Option<usize>) {
        if (self.is_debugging && node != self.state.current_node()) || node.is_none() {
            self.stack_changed(vm, node);
            if node.is_none() {
                self.is_debugging = false;
            }
        }
        self.state.set_current_node(node);
    }

    /// Evaluate the current state, halting if it says so.
    fn process(&mut self, vm: &mut dyn ScriptVm, optional: bool) {
        if self.state.is_waiting_for_input() {
            self.halt(vm);
            return;
        }
        if self.closing || self.stack.is_empty() {
            return;
        }

        let mut cx = crate::EvalContext {
            vm: &*vm,
            stack: &mut self.stack,
            breakpoints: &self.breakpoints,
            optional,
        };
        if self.state.should_break(&mut cx) {
            self.break_now(vm);
        }
    }

    fn break_now(&mut self, vm: &mut dyn ScriptVm) {
        if let Some(frame) = self.stack.top() {
            info!(class = frame.class_path(), line = frame.line(), "Breaking");
        }
        let state = self.new_state(StateMode::WaitingForInput);
        self.change_state_now(vm, state);
    }

    /// Block in the front-end pump until the user resumes.
    fn halt(&mut self, vm: &mut dyn ScriptVm) {
        if self.closing {
            return;
        }

        self.accessed_none = false;
        self.break_asap = false;
        self.update_interface(vm);
        self.resume = false;
        self.front_end.show();

        vm.set_tick_enabled(false);
        self.tick_suspended = true;

        while !self.resume && !self.closing && !self.exit_requested {
            self.flush_log();
            match self.front_end.poll() {
                PumpEvent::Idle => thread::sleep(HALT_IDLE_INTERVAL),
                PumpEvent::Command(command) => self.handle_command(vm, command),
                PumpEvent::Quit => {
                    info!("Front end quit");
                    self.exit_requested = true;
                    self.resume = true;
                }
            }
        }
        self.flush_log();
        self.front_end.hide();
    }

    /// Run-control input while halted
    fn handle_input(&mut self, action: UserAction) {
        if !self.state.is_waiting_for_input() {
            debug!(?action, "Ignoring run control while not halted");
            return;
        }

        self.state.clear_data_break();
        let mode = match action {
            UserAction::Go => StateMode::Idle,
            UserAction::StepInto => StateMode::StepInto,
            UserAction::StepOverStack => StateMode::StepOverStack,
            UserAction::StepOut => StateMode::StepOut,
            UserAction::RunToCursor => StateMode::RunToCursor,
            UserAction::Exit => {
                info!("Exit requested");
                self.exit_requested = true;
                self.close(false);
                self.resume = true;
                return;
            }
        };
        debug!(?action, "Resuming");
        let state = self.new_state(mode);
        self.change_state(state);
        self.resume = true;
    }

    /// Apply one front-end command
    pub fn handle_command(&mut self, vm: &mut dyn ScriptVm, command: FrontEndCommand) {
        debug!(?command, "Front-end command");
        match command {
            FrontEndCommand::SetBreakpoint { class_path, line } => {
                self.set_breakpoint(&class_path, line)
            }
            FrontEndCommand::RemoveBreakpoint { class_path, line } => {
                self.remove_breakpoint(&class_path, line)
            }
            FrontEndCommand::AddWatch { text } => self.add_watch(vm, &text),
            FrontEndCommand::RemoveWatch { text } => {
                self.remove_watch(&text);
            }
            FrontEndCommand::ClearWatches => self.clear_watches(),
            FrontEndCommand::ChangeStack { index_from_top } => self.change_stack(vm, index_from_top),
            FrontEndCommand::SetDataWatch { text } => self.set_data_watch(vm, &text),
            FrontEndCommand::ClearDataWatch => self.clear_data_watch(),
            FrontEndCommand::SetProperty { property, address, value } => {
                if let Err(err) = self.set_property(vm, property, address, &value) {
                    error!(%err, "Failed to set property");
                }
            }
            FrontEndCommand::SetBreakOnUnhandledAccess { enabled } => {
                self.set_break_on_unhandled_access(enabled)
            }
            FrontEndCommand::RequestImmediateBreak => self.request_immediate_break(),
            FrontEndCommand::Attach { attach } => self.attach(attach),
            FrontEndCommand::Action { action } => self.handle_input(action),
            FrontEndCommand::Terminate => self.terminate(vm),
        }
    }

    fn terminate(&mut self, vm: &mut dyn ScriptVm) {
        info!("Terminating host");
        self.exit_requested = true;
        vm.request_shutdown();
        self.close(false);
        self.resume = true;
    }

    // ---------------------------------------------------------------------------------
    // Watches
    // ---------------------------------------------------------------------------------

    /// Remove the first user watch created from `text`. Returns whether one was removed.
    pub fn remove_watch(&mut self, text: &str) -> bool {
        match self.watches.iter().position(|watch| watch.matches(text)) {
            Some(index) => {
                self.watches.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every user watch
    pub fn clear_watches(&mut self) {
        self.watches.clear();
    }

    /// Break whenever the value of `text` changes.
    ///
    /// The data watch wraps the current state right away, so run control issued
    /// afterwards becomes its sub-state. Setting a new data watch replaces the old one.
    pub fn set_data_watch(&mut self, vm: &dyn ScriptVm, text: &str) {
        let node = self.state.current_node().or(self.stack.top_index());
        let frame = node.and_then(|i| self.stack.get(i));

        if let Some(change) = self.state.data_change_mut() {
            change.watch = DataWatch::new(text);
            change.data_break = false;
            change.watch.pin(vm, frame);
            return;
        }

        let mut watch = DataWatch::new(text);
        watch.pin(vm, frame);
        let mut state = DebuggerState::break_on_data_change(watch, self.baseline());
        let old = std::mem::replace(&mut self.state, DebuggerState::idle());
        if let Some(dropped) = state.intercept_old_state(old) {
            debug!(state = %dropped.kind(), "Data watch did not adopt the current state");
        }
        self.state = state;
        info!(text, "Data watch set");
    }

    /// Drop the data watch, restoring the state it wrapped
    pub fn clear_data_watch(&mut self) {
        let state = std::mem::replace(&mut self.state, DebuggerState::idle());
        self.state = match state.unwrap_data_change() {
            Ok(inner) => {
                info!(state = %inner.kind(), "Data watch cleared");
                inner
            }
            Err(state) => state,
        };
    }

    /// Write `value` into live memory through the property's text import
    pub fn set_property(
        &mut self,
        vm: &mut dyn ScriptVm,
        property: PropertyId,
        address: Address,
        value: &str,
    ) -> Result<()> {
        vm.import_text(property, address, value)
            .wrap_err_with(|| format!("Failed to import '{value}' into {property} at {address}"))?;
        info!(%property, %address, value, "Property updated");

        if self.is_debugging {
            let node = self.current_stack_position.or(self.stack.top_index());
            if let Some(node) = node {
                self.refresh_watch(vm, node);
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------
    // Diagnostics
    // ---------------------------------------------------------------------------------

    /// One-line summary of the debugger's condition
    pub fn describe(&self) -> String {
        let mut text = format!("state: {}", self.state.describe());
        if let Some(pending) = &self.pending {
            let _ = write!(text, "; pending: {}", pending.describe());
        }
        let _ = write!(
            text,
            "; depth {}; attached {}; closing {}; processing {}; debugging {}; {} breakpoint(s); {} watch(es)",
            self.stack.depth(),
            self.attached,
            self.closing,
            self.processing_enabled,
            self.is_debugging,
            self.breakpoints.len(),
            self.watches.len()
        );
        text
    }

    /// Log every frame of the shadow stack with its full history
    pub fn dump_stack(&self, vm: &dyn ScriptVm) {
        info!(depth = self.stack.depth(), queued = self.stack.queued().len(), "Call stack dump");
        for (index, frame) in self.stack.iter().enumerate() {
            let node = vm
                .frame(frame.frame())
                .map(|desc| reflect::struct_name(vm, desc.node))
                .unwrap_or_else(|| "NULL".to_string());
            info!(
                "{index}) Class '{}'  Object '{}'  Node '{node}'",
                frame.class_path(),
                vm.object_name(frame.object())
            );
            for (step, (line, pos, depth, opcode)) in frame.history().enumerate() {
                info!("   {step}) Line {line}  Pos {pos}  OpCode '{opcode}'  Depth {depth}");
            }
        }
    }
}
