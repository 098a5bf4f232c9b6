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

//! Shadow call stack synchronization, driven through the debugger entry point

use scdb_common::DebugOpcode;
use scdb_engine::StateKind;
use scdb_integration_tests::test_utils::{drive::Session, init, world::PAWN};

#[test]
fn test_nested_calls_balance() {
    init::init_test_environment();
    let mut s = Session::new();

    let tick = s.enter(s.world.tick, 10);
    let fire = s.enter(s.world.fire, 20);
    let reload = s.enter(s.world.reload, 30);
    assert_eq!(s.depth(), 3);

    s.leave(reload, 31);
    assert_eq!(s.core.stack().top().unwrap().frame(), fire);
    s.leave(fire, 21);
    assert_eq!(s.core.stack().top().unwrap().frame(), tick);
    s.leave(tick, 11);
    assert_eq!(s.depth(), 0);
    assert!(s.core.is_processing_enabled());
    assert_eq!(s.halts(), 0);
}

#[test]
fn test_state_leave_waits_for_function_frame() {
    init::init_test_environment();
    let mut s = Session::new();

    let state = s.enter(s.world.walking, 5);
    let fire = s.enter(s.world.fire, 20);
    s.send(state, DebugOpcode::FrameLeaveViaStateChange, 6);
    assert_eq!(s.depth(), 2);
    assert_eq!(s.core.stack().queued().len(), 1);

    s.leave(fire, 21);
    assert_eq!(s.depth(), 0);
    assert!(s.core.stack().queued().is_empty());
    assert!(s.core.is_processing_enabled());
}

#[test]
fn test_state_switch_inside_function_replays_in_order() {
    init::init_test_environment();
    let mut s = Session::new();

    let old_state = s.enter(s.world.walking, 5);
    let fire = s.enter(s.world.fire, 20);
    let new_state = s.call(s.world.walking);
    s.send(old_state, DebugOpcode::FrameLeaveViaStateChange, 21);
    s.send(new_state, DebugOpcode::FrameEnterViaStateChange, 0);
    assert_eq!(s.core.stack().queued().len(), 2);

    s.leave(fire, 22);
    assert_eq!(s.depth(), 1);
    assert_eq!(s.core.stack().top().unwrap().frame(), new_state);
    assert!(s.core.stack().queued().is_empty());
}

#[test]
fn test_state_leave_for_unknown_frame_is_ignored() {
    init::init_test_environment();
    let mut s = Session::new();

    let tick = s.enter(s.world.tick, 10);
    let stranger = s.call(s.world.walking);
    s.send(stranger, DebugOpcode::FrameLeaveViaStateChange, 3);
    assert_eq!(s.depth(), 1);
    assert_eq!(s.core.stack().top().unwrap().frame(), tick);
}

#[test]
fn test_latent_suspend_and_resume() {
    init::init_test_environment();
    let mut s = Session::new();

    let state = s.enter(s.world.walking, 5);
    s.step(state, 6);
    s.send(state, DebugOpcode::FrameLeaveLatent, 6);
    assert_eq!(s.depth(), 0);

    s.send(state, DebugOpcode::FrameEnterLatentResume, 7);
    assert_eq!(s.depth(), 1);
    // A redundant resume updates in place.
    s.send(state, DebugOpcode::FrameEnterLatentResume, 7);
    assert_eq!(s.depth(), 1);
    assert!(s.core.is_processing_enabled());
}

#[test]
fn test_latent_leave_with_nested_frame_is_corruption() {
    init::init_test_environment();
    let mut s = Session::new();

    let state = s.enter(s.world.walking, 5);
    s.enter(s.world.fire, 20);
    s.send(state, DebugOpcode::FrameLeaveLatent, 6);
    assert_eq!(s.depth(), 0);
    assert!(!s.core.is_processing_enabled());
}

#[test]
fn test_label_enter_pushes_then_updates() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 41);

    let state = s.call(s.world.walking);
    s.send(state, DebugOpcode::LabelEnter, 40);
    assert_eq!(s.depth(), 1);
    s.send(state, DebugOpcode::LabelEnter, 41);
    assert_eq!(s.depth(), 1);

    assert_eq!(s.halts(), 1);
    assert_eq!(s.front.last_call_stack().unwrap(), vec!["Label Game.Pawn.Walking".to_string()]);
}

#[test]
fn test_loop_initializer_never_breaks() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 12);

    let tick = s.enter(s.world.tick, 10);
    s.send(tick, DebugOpcode::LoopInitMarker, 12);
    assert_eq!(s.halts(), 0);
    s.step(tick, 12);
    assert_eq!(s.halts(), 1);
}

#[test]
fn test_corruption_resets_until_next_tick() {
    init::init_test_environment();
    let mut s = Session::new();

    let fire = s.call(s.world.fire);
    s.leave(fire, 5);
    assert!(!s.core.is_processing_enabled());
    assert_eq!(s.core.state().kind(), StateKind::Idle);

    let tick = s.enter(s.world.tick, 10);
    assert_eq!(s.depth(), 0);

    s.core.notify_begin_tick();
    s.send(tick, DebugOpcode::FrameEnter, 10);
    assert_eq!(s.depth(), 1);
}

#[test]
fn test_leaving_a_buried_frame_clears_stack() {
    init::init_test_environment();
    let mut s = Session::new();

    let tick = s.enter(s.world.tick, 10);
    s.enter(s.world.fire, 20);
    s.send(tick, DebugOpcode::FrameLeave, 11);
    assert_eq!(s.depth(), 0);
    assert!(s.core.stack().queued().is_empty());
}

#[test]
fn test_scripts_without_debug_info() {
    init::init_test_environment();
    let mut s = Session::new();

    let state = s.enter(s.world.walking, 5);
    let pawn_class = s.world.pawn_class;
    s.world.vm.set_debug_info(pawn_class, false);

    s.enter(s.world.tick, 10);
    assert_eq!(s.depth(), 1);

    // State leaves are still tracked so the stack stays balanced.
    s.send(state, DebugOpcode::FrameLeaveViaStateChange, 6);
    assert_eq!(s.depth(), 0);
    assert_eq!(s.halts(), 0);
}

#[test]
fn test_class_scope_frames_are_ignored() {
    init::init_test_environment();
    let mut s = Session::new();

    let defaults = s.call(s.world.pawn_class);
    s.send(defaults, DebugOpcode::FrameEnter, 1);
    s.send(defaults, DebugOpcode::Let, 2);
    assert_eq!(s.depth(), 0);
    assert!(s.core.is_processing_enabled());
}
