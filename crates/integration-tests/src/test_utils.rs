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

//! Test utilities for integration tests

/// Initialization utilities for tests
pub mod init {
    /// Initialize console logging once per test process
    pub fn init_test_environment() {
        scdb_common::logging::ensure_test_logging(None);
    }
}

/// A small scripted game to debug
pub mod world {
    use scdb_common::{ObjectId, PropertyId, StructId};
    use scdb_engine::{test_utils::MockVm, PropertyKind};

    /// Class path of [`GameWorld::pawn_class`]
    pub const PAWN: &str = "Game.Pawn";

    /// Handles into a [`MockVm`] populated with:
    ///
    /// - `Engine.Actor` with a `Location` vector
    /// - `Game.Pawn : Actor` with `Health`, `Weapon` and a self-typed `Target`
    /// - `Game.Weapon` with `Ammo` and an `Owner` pawn reference
    /// - functions `Pawn.Tick(Delta)`, `Pawn.Fire`, `Pawn.Reload` and state `Pawn.Walking`
    #[derive(Debug)]
    pub struct GameWorld {
        /// The VM
        pub vm: MockVm,
        /// `Game.Pawn`
        pub pawn_class: StructId,
        /// `Game.Weapon`
        pub weapon_class: StructId,
        /// `Pawn.Tick`
        pub tick: StructId,
        /// `Pawn.Fire`
        pub fire: StructId,
        /// `Pawn.Reload`
        pub reload: StructId,
        /// `Pawn.Walking`
        pub walking: StructId,
        /// `Pawn.Health`
        pub health: PropertyId,
        /// `Pawn.Weapon`
        pub weapon_field: PropertyId,
        /// `Pawn.Target`
        pub target_field: PropertyId,
        /// `Weapon.Ammo`
        pub ammo: PropertyId,
        /// `Tick.Delta`
        pub delta: PropertyId,
        /// The pawn instance, `Pawn_0`
        pub pawn: ObjectId,
        /// Its weapon, `Weapon_0`
        pub weapon: ObjectId,
    }

    /// Build the world with `Health = 100`, `Ammo = 30` and the pawn targeting itself
    pub fn game_world() -> GameWorld {
        let mut vm = MockVm::new();
        let vector = vm.define_struct("Vector");
        for axis in ["X", "Y", "Z"] {
            vm.add_field(vector, axis, "Float", PropertyKind::Scalar);
        }

        let actor = vm.define_class("Actor", "Engine", None);
        vm.add_field(actor, "Location", "Vector", PropertyKind::Struct { struct_id: vector });

        let pawn_class = vm.define_class("Pawn", "Game", Some(actor));
        let weapon_class = vm.define_class("Weapon", "Game", None);

        let health = vm.add_field(pawn_class, "Health", "Int", PropertyKind::Scalar);
        let weapon_field =
            vm.add_field(pawn_class, "Weapon", "Object", PropertyKind::Object { class: weapon_class });
        let target_field =
            vm.add_field(pawn_class, "Target", "Object", PropertyKind::Object { class: pawn_class });
        let ammo = vm.add_field(weapon_class, "Ammo", "Int", PropertyKind::Scalar);
        let owner =
            vm.add_field(weapon_class, "Owner", "Object", PropertyKind::Object { class: pawn_class });

        let tick = vm.define_function("Tick", pawn_class);
        let delta = vm.add_field(tick, "Delta", "Float", PropertyKind::Scalar);
        let fire = vm.define_function("Fire", pawn_class);
        let reload = vm.define_function("Reload", pawn_class);
        let walking = vm.define_state("Walking", pawn_class);

        let pawn = vm.spawn(pawn_class, "Pawn_0");
        let weapon = vm.spawn(weapon_class, "Weapon_0");
        vm.set_field(pawn, health, "100");
        vm.set_object_field(pawn, weapon_field, Some(weapon));
        vm.set_object_field(pawn, target_field, Some(pawn));
        vm.set_field(weapon, ammo, "30");
        vm.set_object_field(weapon, owner, Some(pawn));

        GameWorld {
            vm,
            pawn_class,
            weapon_class,
            tick,
            fire,
            reload,
            walking,
            health,
            weapon_field,
            target_field,
            ammo,
            delta,
            pawn,
            weapon,
        }
    }
}

/// Feeding notifications into a debugger session
pub mod drive {
    use scdb_common::{DebugOpcode, FrameId, StructId};
    use scdb_engine::{
        test_utils::RecordingFrontEnd, DebugEvent, DebuggerConfig, DebuggerCore, LogBuffer,
    };

    use super::world::{game_world, GameWorld};

    /// A debugger attached to a [`GameWorld`], with the front end kept for inspection
    #[derive(Debug)]
    pub struct Session {
        /// The scripted world
        pub world: GameWorld,
        /// Front end handle shared with the core
        pub front: RecordingFrontEnd,
        /// The debugger
        pub core: DebuggerCore,
    }

    impl Default for Session {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Session {
        /// A session with the default configuration
        pub fn new() -> Self {
            Self::with_config(DebuggerConfig::default())
        }

        /// A session with `config`
        pub fn with_config(config: DebuggerConfig) -> Self {
            let front = RecordingFrontEnd::new();
            let core = DebuggerCore::new(front.clone(), config);
            Self { world: game_world(), front, core }
        }

        /// A session forwarding the log lines captured in `buffer`
        pub fn with_log_buffer(buffer: LogBuffer) -> Self {
            let front = RecordingFrontEnd::new();
            let core =
                DebuggerCore::new(front.clone(), DebuggerConfig::default()).with_log_buffer(buffer);
            Self { world: game_world(), front, core }
        }

        /// Create a VM frame for the pawn executing `node` without notifying
        pub fn call(&mut self, node: StructId) -> FrameId {
            self.world.vm.enter(self.world.pawn, node)
        }

        /// Deliver one notification for the pawn
        pub fn send(&mut self, frame: FrameId, opcode: DebugOpcode, line: u32) {
            let event = DebugEvent::new(self.world.pawn, frame, opcode, line, line * 100);
            self.core.debug_info(&mut self.world.vm, event);
        }

        /// Create a frame for `node` and report entering it at `line`
        pub fn enter(&mut self, node: StructId, line: u32) -> FrameId {
            let frame = self.call(node);
            self.send(frame, DebugOpcode::FrameEnter, line);
            frame
        }

        /// Report a statement of `frame` at `line`
        pub fn step(&mut self, frame: FrameId, line: u32) {
            self.send(frame, DebugOpcode::Let, line);
        }

        /// Report leaving `frame` at `line`
        pub fn leave(&mut self, frame: FrameId, line: u32) {
            self.send(frame, DebugOpcode::FrameLeave, line);
        }

        /// Shadow stack depth
        pub fn depth(&self) -> usize {
            self.core.stack().depth()
        }

        /// Number of halts so far
        pub fn halts(&self) -> usize {
            self.front.halts()
        }

        /// Line of the last reported location
        pub fn halted_line(&self) -> Option<u32> {
            self.front.last_location().map(|location| location.line)
        }
    }
}
