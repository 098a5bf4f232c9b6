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

use scdb_common::{SourceLocation, WatchEntryId, WatchKind};
use scdb_engine::{
    DebuggerConfig, DebuggerCore, DebuggerFrontEnd, PumpEvent, RecursionLimit, RecursionLimits,
};
use tracing::info;

/// Front end that never receives input
struct Headless;

impl DebuggerFrontEnd for Headless {
    fn notify_location(&mut self, _location: &SourceLocation) {}

    fn update_call_stack(&mut self, _frames: &[String]) {}

    fn begin_watch_batch(&mut self, _kind: WatchKind) {}

    fn clear_watch(&mut self, _kind: WatchKind) {}

    fn add_watch_entry(
        &mut self,
        _kind: WatchKind,
        _parent: Option<WatchEntryId>,
        _name: &str,
        _value: &str,
    ) -> WatchEntryId {
        WatchEntryId(0)
    }

    fn end_watch_batch(&mut self, _kind: WatchKind) {}

    fn append_log(&mut self, _line: &str) {}

    fn poll(&mut self) -> PumpEvent {
        PumpEvent::Idle
    }
}

#[test]
fn test_saved_file_layout() {
    scdb_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scdb.toml");

    let mut config = DebuggerConfig::default();
    config.recursion.static_array_max = RecursionLimit::Max(5);
    config.save_to(&path).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("break_on_unhandled_access = false"), "{content}");
    assert!(content.contains("[recursion]"), "{content}");
    assert!(content.contains("struct_max = -1"), "{content}");
    assert!(content.contains("static_array_max = 5"), "{content}");
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    scdb_common::logging::ensure_test_logging(None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scdb.toml");
    std::fs::write(&path, "[recursion]\nobject_max = \"unlimited\"\n").unwrap();

    let config = DebuggerConfig::load_from(&path);
    assert!(!config.break_on_unhandled_access);
    assert_eq!(config.recursion.object_max, RecursionLimit::Unlimited);
    assert_eq!(config.recursion.class_max, RecursionLimits::default().class_max);
}

#[test]
fn test_core_saves_changed_settings() {
    scdb_common::logging::ensure_test_logging(None);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scdb.toml");

    let mut core = DebuggerCore::new(Headless, DebuggerConfig::load_from(&path));
    assert_eq!(core.recursion_limits(), RecursionLimits::default());

    let limits = RecursionLimits { object_max: RecursionLimit::Max(3), ..Default::default() };
    core.set_recursion_limits(limits);
    core.set_break_on_unhandled_access(true);
    core.teardown().unwrap();
    assert!(core.is_closing());

    let reloaded = DebuggerConfig::load_from(&path);
    assert_eq!(reloaded.recursion, limits);
    assert!(reloaded.break_on_unhandled_access);
}

#[test]
fn test_unsaved_config_teardown_is_noop() {
    let mut core = DebuggerCore::new(Headless, DebuggerConfig::default());
    assert!(core.config().origin().is_none());
    core.teardown().unwrap();
}
