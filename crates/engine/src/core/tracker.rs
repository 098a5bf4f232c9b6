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

//! Shadow call stack synchronization.
//!
//! Every notification passes through [`DebuggerCore::update_stack`] before any break
//! evaluation. Frame transitions push, pop or defer; statements update the top frame in
//! place. The return value tells the caller whether break evaluation must be skipped for
//! this notification, which is the case for every transition (transitions evaluate the
//! state themselves) and for loop-initializer markers.
//!
//! Two frames are the same frame when their handles are equal, or when both are state
//! frames of the same object: the VM re-creates a state's frame record on every state
//! transition while the executing object stays the same.

use scdb_common::{scdb_debug_fail, DebugOpcode, FrameId, ObjectId};
use tracing::{debug, trace, warn};

use super::{DebugEvent, DebuggerCore};
use crate::{vm::reflect, FrameDesc, ScriptVm, StackCommand, StackError, StackFrame};

fn same_frame(top: &StackFrame, frame: FrameId, object: ObjectId, is_state: bool) -> bool {
    top.frame() == frame || (is_state && top.is_state() && top.object() == object)
}

fn frame_is_state(vm: &dyn ScriptVm, frame: FrameId) -> bool {
    vm.frame(frame).is_some_and(|desc| desc.is_state())
}

impl DebuggerCore {
    /// Apply one notification to the shadow stack.
    ///
    /// Returns `true` when break evaluation must be skipped for this notification.
    pub(super) fn update_stack(&mut self, vm: &mut dyn ScriptVm, event: &DebugEvent) -> bool {
        let desc = vm.frame(event.frame);
        let is_state = desc.as_ref().is_some_and(FrameDesc::is_state);
        trace!(
            opcode = %event.opcode,
            frame = %event.frame,
            line = event.line,
            depth = self.stack.depth(),
            "Updating call stack"
        );

        match event.opcode {
            DebugOpcode::FrameLeaveLatent => self.leave_latent(vm, event),
            DebugOpcode::FrameLeave => self.leave_frame(vm, event, desc.as_ref()),
            DebugOpcode::FrameLeaveViaStateChange if is_state => {
                self.leave_via_state_change(vm, event)
            }
            DebugOpcode::FrameEnterViaStateChange if is_state => {
                self.enter_via_state_change(vm, event)
            }
            DebugOpcode::FrameEnter => self.enter_frame(vm, event, desc.as_ref()),
            DebugOpcode::FrameEnterLatentResume => self.resume_latent(vm, event, desc.as_ref()),
            DebugOpcode::LabelEnter => self.enter_label(vm, event, desc.as_ref()),
            _ => self.statement(vm, event, is_state),
        }
    }

    fn leave_latent(&mut self, vm: &mut dyn ScriptVm, event: &DebugEvent) -> bool {
        let depth = self.stack.depth();
        if depth != 1 {
            return self.stack_corrupted(
                vm,
                StackError::UnexpectedDepth {
                    opcode: event.opcode,
                    depth,
                    frame: event.frame,
                    line: event.line,
                },
            );
        }

        // Flush the calling line so the suspended state shows where it stopped.
        let flush = DebugEvent { opcode: DebugOpcode::FunctionCall, ..*event };
        self.update_stack(vm, &flush);
        let top = self.stack.top_index();
        self.update_stack_info(vm, top);
        self.process(vm, false);

        self.stack.pop();
        self.update_stack_info(vm, None);
        true
    }

    fn leave_frame(
        &mut self,
        vm: &mut dyn ScriptVm,
        event: &DebugEvent,
        desc: Option<&FrameDesc>,
    ) -> bool {
        let is_state = desc.is_some_and(FrameDesc::is_state);
        let Some(top) = self.stack.top() else {
            return self.stack_corrupted(
                vm,
                StackError::LeaveWithEmptyStack {
                    opcode: event.opcode,
                    frame: event.frame,
                    line: event.line,
                },
            );
        };

        if !same_frame(top, event.frame, event.object, is_state) {
            // A state left while a function it called is still on top: apply the leave
            // once the function has returned.
            if !top.is_state() && is_state {
                if desc.is_some_and(|desc| desc.latent_pending) {
                    debug!(frame = %event.frame, "Dropping state leave with a latent action pending");
                } else {
                    debug!(frame = %event.frame, top = %top.frame(), "Deferring state leave");
                    self.stack.enqueue(StackCommand {
                        object: event.object,
                        frame: event.frame,
                        opcode: event.opcode,
                        line: event.line,
                    });
                }
                return true;
            }

            let top = top.frame();
            return self.stack_corrupted(
                vm,
                StackError::OutOfSync { opcode: event.opcode, top, frame: event.frame, line: event.line },
            );
        }

        self.stack.pop();
        match self.stack.top_index() {
            None => self.update_stack_info(vm, None),
            Some(top) => {
                self.update_stack_info(vm, Some(top));
                self.process(vm, true);
            }
        }

        self.drain_queue(vm, event);
        true
    }

    /// Replay deferred transitions once the stack is back in shape for them.
    fn drain_queue(&mut self, vm: &mut dyn ScriptVm, event: &DebugEvent) {
        if self.stack.draining || self.stack.queued().is_empty() {
            return;
        }

        if self.stack.is_empty() {
            drop_leading_leaves(self.stack.queued_mut(), usize::MAX);
        }
        let Some(first) = self.stack.queued().front().copied() else {
            return;
        };
        if let Some(top) = self.stack.top() {
            if !same_frame(top, first.frame, first.object, frame_is_state(vm, first.frame)) {
                return;
            }
        }

        self.stack.draining = true;
        let mut remaining = self.stack.queued().len();
        while remaining > 0 {
            remaining -= 1;
            let Some(command) = self.stack.queued_mut().pop_front() else {
                break;
            };

            let line = match (command.line, self.stack.top()) {
                (0, Some(top)) => top.line(),
                (line, _) => line,
            };
            debug!(opcode = %command.opcode, frame = %command.frame, line, "Replaying deferred transition");

            self.process_pending_state();
            let replay = DebugEvent {
                object: command.object,
                frame: command.frame,
                opcode: command.opcode,
                line,
                pos: event.pos,
            };
            self.update_stack(vm, &replay);

            if self.stack.is_empty() {
                remaining -= drop_leading_leaves(self.stack.queued_mut(), remaining);
            }
        }
        self.stack.draining = false;
    }

    fn leave_via_state_change(&mut self, vm: &mut dyn ScriptVm, event: &DebugEvent) -> bool {
        let found = self.stack.iter().any(|frame| same_frame(frame, event.frame, event.object, true));
        let Some(top) = self.stack.top().filter(|_| found) else {
            trace!(frame = %event.frame, "State leave for a frame not on the stack");
            return true;
        };

        let leave = if top.is_state() {
            DebugEvent {
                object: top.object(),
                frame: top.frame(),
                opcode: DebugOpcode::FrameLeave,
                line: top.line() + 1,
                pos: top.pos(),
            }
        } else {
            DebugEvent {
                opcode: DebugOpcode::FrameLeave,
                line: top.line(),
                pos: top.pos(),
                ..*event
            }
        };
        self.update_stack(vm, &leave);
        true
    }

    fn enter_via_state_change(&mut self, vm: &mut dyn ScriptVm, event: &DebugEvent) -> bool {
        if self.stack.top().is_some_and(|top| !top.is_state()) {
            debug!(frame = %event.frame, "Deferring state enter");
            self.stack.enqueue(StackCommand {
                object: event.object,
                frame: event.frame,
                opcode: DebugOpcode::FrameEnter,
                line: event.line,
            });
            return true;
        }

        let enter = DebugEvent { opcode: DebugOpcode::FrameEnter, ..*event };
        self.update_stack(vm, &enter);
        true
    }

    fn enter_frame(
        &mut self,
        vm: &mut dyn ScriptVm,
        event: &DebugEvent,
        desc: Option<&FrameDesc>,
    ) -> bool {
        if self.stack.top().is_some_and(|top| top.frame() == event.frame) {
            return self.stack_corrupted(
                vm,
                StackError::DuplicateEnter { opcode: event.opcode, frame: event.frame, line: event.line },
            );
        }
        self.push_frame(vm, event, desc)
    }

    fn resume_latent(
        &mut self,
        vm: &mut dyn ScriptVm,
        event: &DebugEvent,
        desc: Option<&FrameDesc>,
    ) -> bool {
        let depth = self.stack.depth();
        if depth == 0 {
            return self.push_frame(vm, event, desc);
        }

        // A redundant resume of the only frame is a plain update.
        if depth == 1 && desc.is_some_and(FrameDesc::is_state) {
            if let Some(top) = self.stack.top_mut().filter(|top| top.frame() == event.frame) {
                top.update(event.line, event.pos, event.opcode, depth);
                return false;
            }
        }

        self.stack_corrupted(
            vm,
            StackError::UnexpectedDepth {
                opcode: event.opcode,
                depth,
                frame: event.frame,
                line: event.line,
            },
        )
    }

    fn enter_label(
        &mut self,
        vm: &mut dyn ScriptVm,
        event: &DebugEvent,
        desc: Option<&FrameDesc>,
    ) -> bool {
        let depth = self.stack.depth();
        if depth == 0 {
            return self.push_frame(vm, event, desc);
        }
        if let Some(top) = self.stack.top_mut() {
            top.update(event.line, event.pos, event.opcode, depth);
        }
        false
    }

    fn statement(&mut self, vm: &mut dyn ScriptVm, event: &DebugEvent, is_state: bool) -> bool {
        let depth = self.stack.depth();
        if depth == 0 {
            return self.stack_corrupted(
                vm,
                StackError::StatementWithEmptyStack {
                    opcode: event.opcode,
                    frame: event.frame,
                    line: event.line,
                },
            );
        }

        let Some(top_frame) = self.stack.top().map(StackFrame::frame) else {
            return false;
        };
        if top_frame != event.frame {
            // State code resuming underneath a function call; the function's own
            // notifications keep the stack in sync.
            if is_state && self.stack.top().is_some_and(|top| !top.is_state()) {
                trace!(frame = %event.frame, "Ignoring state statement beneath a function frame");
                return true;
            }
            return self.stack_corrupted(
                vm,
                StackError::OutOfSync {
                    opcode: event.opcode,
                    top: top_frame,
                    frame: event.frame,
                    line: event.line,
                },
            );
        }

        if let Some(top) = self.stack.top_mut() {
            top.update(event.line, event.pos, event.opcode, depth);
        }
        event.opcode == DebugOpcode::LoopInitMarker
    }

    fn push_frame(
        &mut self,
        vm: &mut dyn ScriptVm,
        event: &DebugEvent,
        desc: Option<&FrameDesc>,
    ) -> bool {
        let Some(desc) = desc else {
            return self.stack_corrupted(vm, StackError::UnknownFrame(event.frame));
        };

        let frame = StackFrame::new(
            event.object,
            event.frame,
            desc.owner_class,
            reflect::class_path(&*vm, desc.owner_class),
            desc.is_state(),
            self.stack.depth(),
            event.line,
            event.pos,
            event.opcode,
        );
        let index = self.stack.push(frame);
        debug!(frame = %event.frame, depth = self.stack.depth(), line = event.line, "Pushed frame");

        self.update_stack_info(vm, Some(index));
        self.process(vm, false);
        true
    }

    /// Drop the shadow stack after a desynchronization and go idle until the next tick.
    fn stack_corrupted(&mut self, vm: &dyn ScriptVm, err: StackError) -> bool {
        warn!(error = %err, "Call stack out of sync, resetting the debugger");
        self.dump_stack(vm);
        scdb_debug_fail!("call stack corrupted: {err}");

        self.processing_enabled = false;
        self.force_idle();
        self.stack.clear();
        true
    }
}

/// Remove queued leaves from the front of the queue, looking at most `limit` commands.
/// Returns how many were removed.
fn drop_leading_leaves(
    queue: &mut std::collections::VecDeque<StackCommand>,
    limit: usize,
) -> usize {
    let mut dropped = 0;
    while dropped < limit && queue.front().is_some_and(|c| c.opcode == DebugOpcode::FrameLeave) {
        queue.pop_front();
        dropped += 1;
    }
    dropped
}
