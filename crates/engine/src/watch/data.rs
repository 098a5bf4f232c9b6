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

//! Data breakpoints.
//!
//! A [`DataWatch`] resolves its expression once, pins the resulting memory location and
//! compares the exported text of that location on every check. Until the expression
//! resolves the watch stays pending and every check retries the resolution.
//!
//! A location inside a frame's locals is only valid while that frame is on the shadow
//! stack. Once it leaves, the pin is dropped and the watch goes back to pending.

use scdb_common::FrameId;
use tracing::{debug, info};

use super::{UserWatch, WatchValue};
use crate::{CallStack, ScriptVm, StackFrame};

/// A watch that reports when its value changes.
#[derive(Debug, Clone)]
pub struct DataWatch {
    watch: UserWatch,
    pinned: Option<WatchValue>,
    // Frame whose locals hold the pinned location.
    owner: Option<FrameId>,
    sample: Option<String>,
}

impl DataWatch {
    /// Create a pending data watch for `text`
    pub fn new(text: &str) -> Self {
        Self { watch: UserWatch::new(text), pinned: None, owner: None, sample: None }
    }

    /// Expression text
    pub fn text(&self) -> &str {
        self.watch.text()
    }

    /// Location being sampled, once resolved
    pub fn pinned(&self) -> Option<WatchValue> {
        self.pinned
    }

    /// Frame owning the pinned location, when it is a local
    pub fn owner(&self) -> Option<FrameId> {
        self.owner
    }

    /// Last sampled value
    pub fn sample(&self) -> Option<&str> {
        self.sample.as_deref()
    }

    /// Try to resolve the expression in `frame` and take the first sample.
    ///
    /// Returns whether the watch is pinned afterwards.
    pub fn pin(&mut self, vm: &dyn ScriptVm, frame: Option<&StackFrame>) -> bool {
        if self.pinned.is_some() {
            return true;
        }

        self.watch.refresh(vm, frame);
        match self.watch.value(vm) {
            Ok(value) => {
                self.sample = vm.export_text(value.property, value.addr);
                self.pinned = Some(value);
                self.owner = frame.filter(|_| self.watch.is_frame_local()).map(StackFrame::frame);
                info!(watch = self.text(), addr = %value.addr, sample = ?self.sample, "Data watch pinned");
                true
            }
            Err(err) => {
                debug!(watch = self.text(), error = %err, "Data watch still pending");
                false
            }
        }
    }

    /// Compare the pinned location against the last sample, then resample.
    ///
    /// A pending watch retries its resolution in `frame` and never reports a change. A
    /// watch pinned to the locals of a frame no longer in `stack` becomes pending first.
    pub fn check(
        &mut self,
        vm: &dyn ScriptVm,
        stack: &CallStack,
        frame: Option<&StackFrame>,
    ) -> bool {
        if let Some(owner) = self.owner {
            if !stack.iter().any(|f| f.frame() == owner) {
                info!(watch = self.text(), %owner, "Data watch frame left, unpinning");
                self.unpin();
            }
        }

        let Some(value) = self.pinned else {
            self.pin(vm, frame);
            return false;
        };

        let current = vm.export_text(value.property, value.addr);
        if current == self.sample {
            return false;
        }

        info!(watch = self.text(), old = ?self.sample, new = ?current, "Data watch changed");
        self.sample = current;
        true
    }

    fn unpin(&mut self) {
        self.pinned = None;
        self.owner = None;
        self.sample = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_utils::MockVm, PropertyKind};
    use scdb_common::{DebugOpcode, ObjectId, PropertyId, StructId};

    fn world() -> (MockVm, StackFrame, ObjectId, PropertyId) {
        let mut vm = MockVm::new();
        let class = vm.define_class("Pawn", "Game", None);
        let health = vm.add_field(class, "Health", "Int", PropertyKind::Scalar);
        let tick = vm.define_function("Tick", class);
        let pawn = vm.spawn(class, "Pawn_0");
        vm.set_field(pawn, health, "100");
        let frame = enter(&mut vm, pawn, class, tick, 0);
        (vm, frame, pawn, health)
    }

    fn enter(
        vm: &mut MockVm,
        pawn: ObjectId,
        class: StructId,
        node: StructId,
        depth: usize,
    ) -> StackFrame {
        let frame_id = vm.enter(pawn, node);
        StackFrame::new(
            pawn,
            frame_id,
            class,
            "Game.Pawn".into(),
            false,
            depth,
            10,
            0,
            DebugOpcode::FrameEnter,
        )
    }

    fn stack_of(frames: &[&StackFrame]) -> CallStack {
        let mut stack = CallStack::new();
        for frame in frames {
            stack.push((*frame).clone());
        }
        stack
    }

    #[test]
    fn test_reports_each_change_once() {
        let (mut vm, frame, pawn, health) = world();
        let mut watch = DataWatch::new("Health");
        let stack = stack_of(&[&frame]);
        assert!(watch.pin(&vm, Some(&frame)));
        assert_eq!(watch.sample(), Some("100"));
        assert_eq!(watch.owner(), None);

        assert!(!watch.check(&vm, &stack, Some(&frame)));
        vm.set_field(pawn, health, "90");
        assert!(watch.check(&vm, &stack, Some(&frame)));
        assert!(!watch.check(&vm, &stack, Some(&frame)));
        assert_eq!(watch.sample(), Some("90"));
    }

    #[test]
    fn test_pending_until_resolvable() {
        let (vm, frame, _, _) = world();
        let mut watch = DataWatch::new("Health");
        assert!(!watch.pin(&vm, None));
        assert!(watch.pinned().is_none());

        // The first successful resolution only takes a sample.
        assert!(!watch.check(&vm, &stack_of(&[&frame]), Some(&frame)));
        assert!(watch.pinned().is_some());
    }

    #[test]
    fn test_local_unpinned_when_its_frame_leaves() {
        let (mut vm, outer, pawn, _) = world();
        let class = vm.object_class(pawn).unwrap();
        let reload = vm.define_function("Reload", class);
        let rounds = vm.add_field(reload, "Rounds", "Int", PropertyKind::Scalar);
        let inner = enter(&mut vm, pawn, class, reload, 1);
        let addr = vm.local_addr(inner.frame(), rounds);
        vm.set_text(addr, "3");

        let mut watch = DataWatch::new("Rounds");
        assert!(watch.pin(&vm, Some(&inner)));
        assert_eq!(watch.owner(), Some(inner.frame()));
        assert!(!watch.check(&vm, &stack_of(&[&outer, &inner]), Some(&inner)));

        // The caller has no `Rounds`; the old slot must not be sampled any more.
        vm.set_text(addr, "4");
        let stack = stack_of(&[&outer]);
        assert!(!watch.check(&vm, &stack, Some(&outer)));
        assert!(watch.pinned().is_none());
        assert!(watch.owner().is_none());
        assert!(!watch.check(&vm, &stack, Some(&outer)));
    }
}
