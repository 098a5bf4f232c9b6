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

use scdb_common::Breakpoint;
use tracing::debug;

/// The set of line breakpoints. Small enough that a linear scan is fine.
#[derive(Debug, Default, Clone)]
pub struct BreakpointRegistry {
    breakpoints: Vec<Breakpoint>,
}

impl BreakpointRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an enabled breakpoint exists at `(class_path, line)`
    pub fn query(&self, class_path: &str, line: u32) -> bool {
        self.find(class_path, line).is_some_and(|idx| self.breakpoints[idx].enabled)
    }

    /// Add a breakpoint; no-op if one already exists at that location
    pub fn set(&mut self, class_path: &str, line: u32) {
        if self.find(class_path, line).is_none() {
            debug!(class_path, line, "breakpoint added");
            self.breakpoints.push(Breakpoint::new(class_path, line));
        }
    }

    /// Remove the breakpoint at `(class_path, line)`, if any
    pub fn remove(&mut self, class_path: &str, line: u32) {
        if let Some(idx) = self.find(class_path, line) {
            debug!(class_path, line, "breakpoint removed");
            self.breakpoints.remove(idx);
        }
    }

    /// Enable or disable an existing breakpoint. Returns whether one was found.
    pub fn set_enabled(&mut self, class_path: &str, line: u32, enabled: bool) -> bool {
        match self.find(class_path, line) {
            Some(idx) => {
                self.breakpoints[idx].enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// All breakpoints in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter()
    }

    /// Number of breakpoints, enabled or not
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    fn find(&self, class_path: &str, line: u32) -> Option<usize> {
        self.breakpoints.iter().position(|bp| bp.location.matches(class_path, line))
    }
}
