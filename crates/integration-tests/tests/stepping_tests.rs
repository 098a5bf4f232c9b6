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

//! Breakpoints and run control across nested calls

use scdb_common::DebugOpcode;
use scdb_engine::{FrontEndCommand, StateKind, UserAction};
use scdb_integration_tests::test_utils::{drive::Session, init, world::PAWN};

#[test]
fn test_breakpoint_in_caller_after_callee_returns() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 11);

    let f1 = s.enter(s.world.tick, 10);
    let f2 = s.enter(s.world.fire, 20);
    s.leave(f2, 21);
    assert_eq!(s.halts(), 0);

    s.step(f1, 11);
    assert_eq!(s.halts(), 1);
    assert_eq!(s.halted_line(), Some(11));
    assert_eq!(s.front.last_call_stack().unwrap(), vec!["Function Game.Pawn.Tick".to_string()]);

    s.leave(f1, 12);
    assert_eq!(s.halts(), 1);
    assert_eq!(s.depth(), 0);
}

#[test]
fn test_breakpoint_fires_once_per_line_visit() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 11);

    let tick = s.enter(s.world.tick, 10);
    s.step(tick, 11);
    s.send(tick, DebugOpcode::FunctionCall, 11);
    s.send(tick, DebugOpcode::OperatorCall, 11);
    assert_eq!(s.halts(), 1);

    s.step(tick, 12);
    s.step(tick, 11);
    assert_eq!(s.halts(), 2);
}

#[test]
fn test_removed_breakpoint_no_longer_halts() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 11);
    s.core.remove_breakpoint(PAWN, 11);

    let tick = s.enter(s.world.tick, 10);
    s.step(tick, 11);
    assert_eq!(s.halts(), 0);
}

#[test]
fn test_step_into_stops_at_next_distinct_point() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 11);
    s.front.push_action(UserAction::StepInto);

    let tick = s.enter(s.world.tick, 10);
    s.step(tick, 11);
    assert_eq!(s.halts(), 1);

    // Same frame, same line: not a new point.
    s.send(tick, DebugOpcode::FunctionCall, 11);
    assert_eq!(s.halts(), 1);

    s.enter(s.world.fire, 20);
    assert_eq!(s.halts(), 2);
    assert_eq!(s.halted_line(), Some(20));
    assert_eq!(s.front.last_call_stack().unwrap().len(), 2);
}

#[test]
fn test_step_over_skips_callee() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 11);
    s.front.push_action(UserAction::StepOverStack);

    let tick = s.enter(s.world.tick, 10);
    s.step(tick, 11);
    assert_eq!(s.halts(), 1);

    let fire = s.enter(s.world.fire, 20);
    s.step(fire, 21);
    s.step(fire, 22);
    s.leave(fire, 23);
    assert_eq!(s.halts(), 1);

    s.step(tick, 12);
    assert_eq!(s.halts(), 2);
    assert_eq!(s.halted_line(), Some(12));
}

#[test]
fn test_step_over_still_honours_breakpoints_in_callee() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 11);
    s.core.set_breakpoint(PAWN, 21);
    s.front.push_action(UserAction::StepOverStack);

    let tick = s.enter(s.world.tick, 10);
    s.step(tick, 11);
    let fire = s.enter(s.world.fire, 20);
    assert_eq!(s.halts(), 1);
    s.step(fire, 21);
    assert_eq!(s.halts(), 2);
    assert_eq!(s.halted_line(), Some(21));
}

#[test]
fn test_step_out_returns_to_caller() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 21);
    s.front.push_action(UserAction::StepOut);

    let tick = s.enter(s.world.tick, 10);
    s.step(tick, 12);
    let fire = s.enter(s.world.fire, 20);
    s.step(fire, 21);
    assert_eq!(s.halts(), 1);

    s.step(fire, 22);
    let reload = s.enter(s.world.reload, 30);
    s.leave(reload, 31);
    assert_eq!(s.halts(), 1);

    s.leave(fire, 23);
    assert_eq!(s.halts(), 2);
    assert_eq!(s.halted_line(), Some(12));
    assert_eq!(s.depth(), 1);
}

#[test]
fn test_go_runs_to_next_breakpoint() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 11);
    s.core.set_breakpoint(PAWN, 14);

    let tick = s.enter(s.world.tick, 10);
    for line in 11..=15 {
        s.step(tick, line);
    }
    assert_eq!(s.halts(), 2);
    assert_eq!(s.halted_line(), Some(14));
    assert_eq!(s.core.state().kind(), StateKind::Idle);
}

#[test]
fn test_immediate_break_request() {
    init::init_test_environment();
    let mut s = Session::new();

    let tick = s.enter(s.world.tick, 10);
    s.core.handle_command(&mut s.world.vm, FrontEndCommand::RequestImmediateBreak);
    assert_eq!(s.halts(), 0);

    s.step(tick, 11);
    assert_eq!(s.halts(), 1);
    s.step(tick, 12);
    assert_eq!(s.halts(), 1);
}

#[test]
fn test_break_on_unhandled_access() {
    init::init_test_environment();
    let mut s = Session::new();

    let tick = s.enter(s.world.tick, 10);
    s.core.notify_accessed_none();
    s.step(tick, 11);
    assert_eq!(s.halts(), 0);

    s.core.set_break_on_unhandled_access(true);
    s.core.notify_accessed_none();
    s.step(tick, 12);
    assert_eq!(s.halts(), 1);
    // The access flag is consumed by the halt.
    s.step(tick, 13);
    assert_eq!(s.halts(), 1);
}

#[test]
fn test_assertion_and_runaway_loop_halt() {
    init::init_test_environment();
    let mut s = Session::new();

    s.enter(s.world.tick, 10);
    assert!(s.core.notify_assertion_failed(&mut s.world.vm, 10));
    assert_eq!(s.halts(), 1);

    s.front.push_action(UserAction::Exit);
    assert!(!s.core.notify_infinite_loop(&mut s.world.vm));
    assert_eq!(s.halts(), 2);
    assert!(s.core.exit_requested());
}
