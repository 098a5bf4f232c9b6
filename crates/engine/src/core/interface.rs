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

//! What the core pushes to the front end while halted.

use scdb_common::{DebugOpcode, SourceLocation, WatchKind};
use tracing::debug;

use super::DebuggerCore;
use crate::{
    vm::reflect,
    watch::{UserWatch, WatchFlattener, WatchScope},
    ScriptVm, StackFrame, StructKind,
};

/// `Function|State|Label Package.Class.Node`
fn describe_frame(vm: &dyn ScriptVm, frame: &StackFrame) -> String {
    let kind = match frame.history().next() {
        Some((_, _, _, DebugOpcode::LabelEnter)) => "Label",
        _ if frame.is_state() => "State",
        _ => "Function",
    };
    let node = vm
        .frame(frame.frame())
        .map(|desc| reflect::struct_name(vm, desc.node))
        .unwrap_or_else(|| "?".to_string());
    format!("{kind} {}.{node}", frame.class_path())
}

impl DebuggerCore {
    /// Watch panes follow `node`; user watches are re-scoped to it.
    pub(super) fn stack_changed(&mut self, vm: &dyn ScriptVm, node: Option<usize>) {
        self.current_stack_position = node;
        let frame = node.and_then(|i| self.stack.get(i));
        for watch in &mut self.watches {
            watch.refresh(vm, frame);
        }
    }

    /// Push location, watches and call stack for the top frame.
    pub(super) fn update_interface(&mut self, vm: &dyn ScriptVm) {
        if !self.is_debugging {
            return;
        }
        let Some(top) = self.stack.top_index() else {
            return;
        };

        self.notify_location(vm, top);
        self.refresh_watch(vm, top);

        let frames: Vec<String> =
            self.stack.iter().rev().map(|frame| describe_frame(vm, frame)).collect();
        self.front_end.update_call_stack(&frames);
        self.flush_log();
    }

    fn notify_location(&mut self, vm: &dyn ScriptVm, index: usize) {
        let Some(frame) = self.stack.get(index) else {
            return;
        };
        let location = SourceLocation {
            class_name: reflect::struct_name(vm, frame.class()),
            package_name: reflect::package_name(vm, frame.class()),
            line: frame.line(),
            opcode_label: frame.opcode().map(|op| op.label().to_string()).unwrap_or_default(),
            object_name: vm.object_name(frame.object()),
        };
        self.front_end.notify_location(&location);
    }

    /// Rebuild all three watch panes against the frame at `index`.
    pub(super) fn refresh_watch(&mut self, vm: &dyn ScriptVm, index: usize) {
        let Some(frame) = self.stack.get(index) else {
            return;
        };
        let scope = WatchScope::for_frame(vm, frame);
        let in_function = scope.as_ref().is_some_and(|scope| {
            vm.struct_desc(scope.function).is_some_and(|desc| desc.kind == StructKind::Function)
        });

        for kind in WatchKind::ALL {
            self.front_end.begin_watch_batch(kind);
            self.front_end.clear_watch(kind);
        }

        let limits = self.config.recursion;
        if let Some(scope) = &scope {
            if in_function {
                WatchFlattener::new(vm, &mut *self.front_end, limits, WatchKind::Local)
                    .locals(scope);
            }
            WatchFlattener::new(vm, &mut *self.front_end, limits, WatchKind::Global)
                .globals(scope);
        } else {
            debug!(index, "Frame is gone, leaving scope panes empty");
        }
        self.emit_user_watches(vm);

        for kind in WatchKind::ALL {
            self.front_end.end_watch_batch(kind);
        }
    }

    fn emit_user_watches(&mut self, vm: &dyn ScriptVm) {
        let mut flattener =
            WatchFlattener::new(vm, &mut *self.front_end, self.config.recursion, WatchKind::User);
        for watch in &mut self.watches {
            let value = watch.value(vm);
            flattener.user_watch(watch.text(), value);
        }
    }

    /// Show the frame `index_from_top` levels below the top; out of range is ignored.
    pub fn change_stack(&mut self, vm: &dyn ScriptVm, index_from_top: usize) {
        let depth = self.stack.depth();
        if index_from_top >= depth {
            debug!(index_from_top, depth, "Ignoring stack change out of range");
            return;
        }

        let index = depth - 1 - index_from_top;
        self.stack_changed(vm, Some(index));
        self.notify_location(vm, index);
        self.refresh_watch(vm, index);
    }

    /// Add a user watch, evaluating it immediately when halted
    pub fn add_watch(&mut self, vm: &dyn ScriptVm, text: &str) {
        let mut watch = UserWatch::new(text);
        if !self.is_debugging {
            self.watches.push(watch);
            return;
        }

        let node = self
            .current_stack_position
            .filter(|index| *index < self.stack.depth())
            .or(self.state.current_node());
        watch.refresh(vm, node.and_then(|index| self.stack.get(index)));
        self.watches.push(watch);

        self.front_end.begin_watch_batch(WatchKind::User);
        self.front_end.clear_watch(WatchKind::User);
        self.emit_user_watches(vm);
        self.front_end.end_watch_batch(WatchKind::User);
    }

    /// Forward buffered log lines to the front end
    pub(super) fn flush_log(&mut self) {
        let Some(buffer) = &self.log_buffer else {
            return;
        };
        for line in buffer.drain() {
            self.front_end.append_log(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{MockVm, RecordingFrontEnd},
        DebugEvent, DebuggerConfig, FrontEndCommand, LogBuffer, PropertyKind, UserAction,
    };

    fn halted_in_nested_call() -> (MockVm, RecordingFrontEnd, DebuggerCore) {
        let mut vm = MockVm::new();
        let class = vm.define_class("Pawn", "Game", None);
        let tick = vm.define_function("Tick", class);
        let count = vm.add_field(tick, "Count", "Int", PropertyKind::Scalar);
        let fire = vm.define_function("Fire", class);
        let pawn = vm.spawn(class, "Pawn_0");

        let front = RecordingFrontEnd::new();
        let mut core = DebuggerCore::new(front.clone(), DebuggerConfig::default());
        core.set_breakpoint("Game.Pawn", 31);

        let outer = vm.enter(pawn, tick);
        let addr = vm.local_addr(outer, count);
        vm.set_text(addr, "7");
        core.debug_info(&mut vm, DebugEvent::new(pawn, outer, DebugOpcode::FrameEnter, 10, 0));
        core.debug_info(&mut vm, DebugEvent::new(pawn, outer, DebugOpcode::FunctionCall, 12, 5));

        front.push_command(FrontEndCommand::ChangeStack { index_from_top: 1 });
        front.push_command(FrontEndCommand::AddWatch { text: "Count".into() });
        front.push_action(UserAction::Go);
        let inner = vm.enter(pawn, fire);
        core.debug_info(&mut vm, DebugEvent::new(pawn, inner, DebugOpcode::FrameEnter, 30, 0));
        core.debug_info(&mut vm, DebugEvent::new(pawn, inner, DebugOpcode::Let, 31, 2));
        (vm, front, core)
    }

    #[test]
    fn test_call_stack_lists_top_first() {
        let (_, front, _) = halted_in_nested_call();
        let frames = front.last_call_stack().unwrap();
        assert_eq!(frames, vec!["Function Game.Pawn.Fire", "Function Game.Pawn.Tick"]);
    }

    #[test]
    fn test_change_stack_rescopes_watches() {
        let (_, front, core) = halted_in_nested_call();
        let locations = front.locations();
        assert_eq!(locations.last().unwrap().line, 12);

        let count = front.find(WatchKind::User, "Count").unwrap();
        assert_eq!(count.value, "7");
        assert_eq!(core.watches().len(), 1);
        // Resumed: no halt in effect any more.
        assert!(!core.is_debugging());
    }

    #[test]
    fn test_watch_without_context() {
        let vm = MockVm::new();
        let front = RecordingFrontEnd::new();
        let mut core = DebuggerCore::new(front.clone(), DebuggerConfig::default());
        core.add_watch(&vm, "Health");
        assert!(front.entries(WatchKind::User).is_empty());
        assert_eq!(core.watches().len(), 1);

        core.change_stack(&vm, 3);
        assert!(front.locations().is_empty());
    }

    #[test]
    fn test_log_lines_reach_front_end() {
        let buffer = LogBuffer::new();
        let front = RecordingFrontEnd::new();
        let mut core =
            DebuggerCore::new(front.clone(), DebuggerConfig::default()).with_log_buffer(buffer.clone());
        buffer.push("[INFO] scdb: hello".into());
        core.flush_log();
        assert_eq!(front.log(), vec!["[INFO] scdb: hello".to_string()]);
        assert!(buffer.is_empty());
    }
}
