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

//! Watch expressions evaluated against a halted session

use scdb_common::{DebugOpcode, WatchKind};
use scdb_engine::{
    ArrayIndexNode, DebuggerConfig, FrontEndCommand, RecursionLimit, ScriptVm, WatchNode,
};
use scdb_integration_tests::test_utils::{drive::Session, init, world::PAWN};

/// Halt at `Tick` line 11 with `commands` queued for the halt
fn halt_in_tick(s: &mut Session, commands: Vec<FrontEndCommand>) {
    s.core.set_breakpoint(PAWN, 11);
    for command in commands {
        s.front.push_command(command);
    }
    let tick = s.call(s.world.tick);
    let delta = s.world.vm.local_addr(tick, s.world.delta);
    s.world.vm.set_text(delta, "0.016");
    s.send(tick, DebugOpcode::FrameEnter, 10);
    s.step(tick, 11);
    assert_eq!(s.halts(), 1);
}

#[test]
fn test_parse_member_chain_with_index() {
    let root = WatchNode::parse("A.B[2].C").unwrap();
    assert_eq!(root.segment_names(), vec!["A", "B", "C"]);

    let b = root.next().unwrap();
    assert!(matches!(b.index(), Some(ArrayIndexNode::Literal(2))));
    assert!(root.index().is_none());
    assert!(b.next().unwrap().index().is_none());
}

#[test]
fn test_scope_panes_on_halt() {
    init::init_test_environment();
    let mut s = Session::new();
    halt_in_tick(&mut s, vec![]);

    let delta = s.front.find(WatchKind::Local, "Delta").unwrap();
    assert_eq!(delta.value, "0.016");
    let health = s.front.find(WatchKind::Global, "Health").unwrap();
    assert_eq!(health.value, "100");
    assert_eq!(health.parent, None);

    let actor = s.front.find(WatchKind::Global, "[[ Actor ]]").unwrap();
    let location = s.front.find(WatchKind::Global, "Location").unwrap();
    assert_eq!(location.parent, Some(actor.id));
}

#[test]
fn test_user_watches_on_halt() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.add_watch(&s.world.vm, "Weapon.Ammo");
    s.core.add_watch(&s.world.vm, "Weapon.Clip");
    halt_in_tick(&mut s, vec![]);

    let ammo = s.front.find(WatchKind::User, "Weapon.Ammo ( Int,").unwrap();
    assert_eq!(ammo.value, "30");
    let clip = s.front.find(WatchKind::User, "Weapon.Clip").unwrap();
    assert!(clip.value.contains("Clip"), "{}", clip.value);
}

#[test]
fn test_watch_added_while_halted_is_evaluated() {
    init::init_test_environment();
    let mut s = Session::new();
    halt_in_tick(&mut s, vec![FrontEndCommand::AddWatch { text: "Target . Health".into() }]);

    let health = s.front.find(WatchKind::User, "Target.Health").unwrap();
    assert_eq!(health.value, "100");
    assert_eq!(s.core.watches().len(), 1);
}

#[test]
fn test_remove_and_clear_watches() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.add_watch(&s.world.vm, "Health");
    s.core.add_watch(&s.world.vm, "Weapon.Ammo");
    s.core.add_watch(&s.world.vm, "Health");

    assert!(s.core.remove_watch("Health"));
    assert_eq!(s.core.watches().len(), 2);
    assert!(!s.core.remove_watch("Delta"));

    s.core.clear_watches();
    assert!(s.core.watches().is_empty());
}

#[test]
fn test_change_stack_shows_caller() {
    init::init_test_environment();
    let mut s = Session::new();
    s.core.set_breakpoint(PAWN, 21);
    s.front.push_command(FrontEndCommand::ChangeStack { index_from_top: 1 });

    let tick = s.call(s.world.tick);
    let delta = s.world.vm.local_addr(tick, s.world.delta);
    s.world.vm.set_text(delta, "0.5");
    s.send(tick, DebugOpcode::FrameEnter, 10);
    s.step(tick, 12);
    let fire = s.enter(s.world.fire, 20);
    s.step(fire, 21);
    assert_eq!(s.halts(), 1);

    assert_eq!(s.halted_line(), Some(12));
    let delta = s.front.find(WatchKind::Local, "Delta").unwrap();
    assert_eq!(delta.value, "0.5");
}

#[test]
fn test_change_stack_out_of_range_is_ignored() {
    init::init_test_environment();
    let mut s = Session::new();
    halt_in_tick(&mut s, vec![FrontEndCommand::ChangeStack { index_from_top: 5 }]);
    assert_eq!(s.front.locations().len(), 1);
}

#[test]
fn test_set_property_updates_memory_and_panes() {
    init::init_test_environment();
    let mut s = Session::new();
    let address = s.world.vm.field_addr(s.world.pawn, s.world.health);
    let property = s.world.health;
    halt_in_tick(
        &mut s,
        vec![FrontEndCommand::SetProperty { property, address, value: "75".into() }],
    );

    assert_eq!(s.world.vm.export_text(property, address).as_deref(), Some("75"));
    let health = s.front.find(WatchKind::Global, "Health").unwrap();
    assert_eq!(health.value, "75");
}

#[test]
fn test_set_property_rejects_composites() {
    init::init_test_environment();
    let mut s = Session::new();
    let address = s.world.vm.field_addr(s.world.pawn, s.world.weapon_field);
    let result = s.core.set_property(&mut s.world.vm, s.world.weapon_field, address, "None");
    assert!(result.is_err());
    assert_eq!(s.world.vm.read_object(address), Some(s.world.weapon));
}

fn count(s: &Session, prefix: &str) -> usize {
    s.front.entries(WatchKind::Global).iter().filter(|e| e.name.starts_with(prefix)).count()
}

#[test]
fn test_object_recursion_is_bounded() {
    init::init_test_environment();
    let mut s = Session::new();
    halt_in_tick(&mut s, vec![]);

    // Pawn.Target points back at the pawn and Weapon.Owner too; one hop only.
    assert_eq!(count(&s, "Ammo"), 1);
    let entries = s.front.entries(WatchKind::Global);
    for owner in entries.iter().filter(|e| e.name.starts_with("Owner")) {
        assert_eq!(owner.value, "Pawn_0");
        assert!(s.front.children(WatchKind::Global, owner.id).is_empty());
    }

    let target = s.front.find(WatchKind::Global, "Target").unwrap();
    let members = s.front.children(WatchKind::Global, target.id);
    assert!(members.iter().all(|e| !e.name.starts_with("Target")));
    let nested_weapon = members.iter().find(|e| e.name.starts_with("Weapon")).unwrap();
    assert!(s.front.children(WatchKind::Global, nested_weapon.id).is_empty());
}

#[test]
fn test_deeper_object_limit_expands_further() {
    init::init_test_environment();
    let mut config = DebuggerConfig::default();
    config.recursion.object_max = RecursionLimit::Max(2);
    let mut s = Session::with_config(config);
    halt_in_tick(&mut s, vec![]);

    assert_eq!(count(&s, "Ammo"), 2);
}
