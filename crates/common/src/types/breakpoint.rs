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

use std::{fmt::Display, str::FromStr};

use eyre::{bail, eyre, Error, Result};
use serde::{Deserialize, Serialize};

/// A source line inside a script class, identified by the class's full path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BreakpointLocation {
    /// Full path of the owning class, e.g. `Engine.Actor`
    pub class_path: String,
    /// Source line number (1-based)
    pub line: u32,
}

impl BreakpointLocation {
    /// Create a new location
    pub fn new(class_path: impl Into<String>, line: u32) -> Self {
        Self { class_path: class_path.into(), line }
    }

    /// Whether this location denotes `(class_path, line)`.
    ///
    /// Class paths are compared case-insensitively, as script names are.
    pub fn matches(&self, class_path: &str, line: u32) -> bool {
        self.line == line && self.class_path.eq_ignore_ascii_case(class_path)
    }
}

impl Display for BreakpointLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.class_path, self.line)
    }
}

impl FromStr for BreakpointLocation {
    type Err = Error;

    /// Parses a location in the format `<class path>:<line>`.
    fn from_str(s: &str) -> Result<Self> {
        let Some((class_path, line)) = s.trim().rsplit_once(':') else {
            bail!("Invalid breakpoint location format. Expected <class path>:<line>, got: {s}");
        };
        let class_path = class_path.trim();
        if class_path.is_empty() {
            bail!("Breakpoint location has an empty class path: {s}");
        }
        let line = line.trim().parse::<u32>().map_err(|e| eyre!("Invalid line number: {e}"))?;
        if line == 0 {
            bail!("Breakpoint line numbers start at 1");
        }

        Ok(Self::new(class_path, line))
    }
}

/// A breakpoint at a class source line.
///
/// Uniqueness is keyed on the location; the enabled flag lets a front end keep a
/// breakpoint around without it firing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Breakpoint {
    /// Where the breakpoint is set
    pub location: BreakpointLocation,
    /// Disabled breakpoints are kept but never fire
    pub enabled: bool,
}

impl Breakpoint {
    /// Create an enabled breakpoint
    pub fn new(class_path: impl Into<String>, line: u32) -> Self {
        Self { location: BreakpointLocation::new(class_path, line), enabled: true }
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.location)?;
        if !self.enabled {
            write!(f, " (disabled)")?;
        }
        Ok(())
    }
}

impl FromStr for Breakpoint {
    type Err = Error;

    /// Parses `@<class path>:<line>`; the leading `@` is optional.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let loc = trimmed.strip_prefix('@').unwrap_or(trimmed);
        Ok(Self { location: loc.parse()?, enabled: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_breakpoint() {
        let bp: Breakpoint = "@Engine.Pawn:42".parse().unwrap();
        assert_eq!(bp.location.class_path, "Engine.Pawn");
        assert_eq!(bp.location.line, 42);
        assert!(bp.enabled);
        assert_eq!(bp.to_string(), "@Engine.Pawn:42");
    }

    #[test]
    fn test_parse_breakpoint_without_marker() {
        let bp: Breakpoint = " Game.Weapon:7 ".parse().unwrap();
        assert_eq!(bp.location, BreakpointLocation::new("Game.Weapon", 7));
    }

    #[test]
    fn test_parse_breakpoint_errors() {
        assert!("Engine.Pawn".parse::<Breakpoint>().is_err());
        assert!("Engine.Pawn:abc".parse::<Breakpoint>().is_err());
        assert!(":12".parse::<Breakpoint>().is_err());
        assert!("Engine.Pawn:0".parse::<Breakpoint>().is_err());
    }

    #[test]
    fn test_location_matches_case_insensitively() {
        let loc = BreakpointLocation::new("Engine.Pawn", 10);
        assert!(loc.matches("engine.pawn", 10));
        assert!(!loc.matches("Engine.Pawn", 11));
    }

    #[test]
    fn test_disabled_display() {
        let mut bp = Breakpoint::new("Engine.Pawn", 3);
        bp.enabled = false;
        assert_eq!(bp.to_string(), "@Engine.Pawn:3 (disabled)");
    }
}
