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

//! Debugger configuration
//!
//! Persisted as TOML, by default in `~/.scdb.toml`:
//!
//! ```toml
//! break_on_unhandled_access = false
//!
//! [recursion]
//! object_max = 1
//! struct_max = -1          # or "unlimited"
//! class_max = 1
//! static_array_max = 2
//! dynamic_array_max = 1
//! ```
//!
//! Loading never fails: a missing file, an unreadable file or a malformed value all fall
//! back to the defaults, with a warning for anything that was present but unusable.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use eyre::{Context, Result};
use serde::{Serialize, Serializer};
use toml::{Table, Value};
use tracing::{debug, info, warn};

/// Maximum number of nested expansions of one composite kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursionLimit {
    /// Expand without bound
    Unlimited,
    /// Expand at most this many levels
    Max(u32),
}

impl RecursionLimit {
    /// Whether one more expansion is allowed when `depth` are already in progress
    pub fn allows(&self, depth: usize) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Max(max) => depth < *max as usize,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(-1) => Some(Self::Unlimited),
            Value::Integer(n) => u32::try_from(*n).ok().map(Self::Max),
            Value::String(s) if s.eq_ignore_ascii_case("unlimited") => Some(Self::Unlimited),
            _ => None,
        }
    }
}

impl fmt::Display for RecursionLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Max(max) => write!(f, "{max}"),
        }
    }
}

impl Serialize for RecursionLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unlimited => serializer.serialize_i64(-1),
            Self::Max(max) => serializer.serialize_i64(i64::from(*max)),
        }
    }
}

/// Per-kind recursion limits used when flattening values for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecursionLimits {
    /// Object references
    pub object_max: RecursionLimit,
    /// Struct values
    pub struct_max: RecursionLimit,
    /// Class references
    pub class_max: RecursionLimit,
    /// Fixed-size arrays
    pub static_array_max: RecursionLimit,
    /// Dynamic arrays
    pub dynamic_array_max: RecursionLimit,
}

impl Default for RecursionLimits {
    fn default() -> Self {
        Self {
            object_max: RecursionLimit::Max(1),
            struct_max: RecursionLimit::Unlimited,
            class_max: RecursionLimit::Max(1),
            static_array_max: RecursionLimit::Max(2),
            dynamic_array_max: RecursionLimit::Max(1),
        }
    }
}

impl RecursionLimits {
    fn from_table(table: &Table) -> Self {
        let defaults = Self::default();
        let read = |key: &str, default: RecursionLimit| match table.get(key) {
            None => default,
            Some(value) => RecursionLimit::from_value(value).unwrap_or_else(|| {
                warn!(key, %value, %default, "Malformed recursion limit, using default");
                default
            }),
        };

        Self {
            object_max: read("object_max", defaults.object_max),
            struct_max: read("struct_max", defaults.struct_max),
            class_max: read("class_max", defaults.class_max),
            static_array_max: read("static_array_max", defaults.static_array_max),
            dynamic_array_max: read("dynamic_array_max", defaults.dynamic_array_max),
        }
    }
}

/// Persistent debugger settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DebuggerConfig {
    /// Halt when a null reference is accessed
    pub break_on_unhandled_access: bool,
    /// Display recursion limits
    pub recursion: RecursionLimits,
    /// File this configuration was loaded from
    #[serde(skip)]
    origin: Option<PathBuf>,
}

impl DebuggerConfig {
    /// Default configuration file path (`~/.scdb.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".scdb.toml"))
    }

    /// Load from the default path, or defaults if there is no home directory
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No home directory found, using default debugger configuration");
                Self::default()
            }
        }
    }

    /// Load from `path`. Never fails; see the module docs.
    pub fn load_from(path: &Path) -> Self {
        let mut config = if !path.exists() {
            debug!(path = %path.display(), "No debugger configuration found, using defaults");
            Self::default()
        } else {
            match fs::read_to_string(path) {
                Ok(content) => Self::parse(&content, path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read debugger configuration");
                    Self::default()
                }
            }
        };
        config.origin = Some(path.to_path_buf());
        config
    }

    fn parse(content: &str, path: &Path) -> Self {
        let table = match toml::from_str::<Table>(content) {
            Ok(table) => table,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed debugger configuration, using defaults");
                return Self::default();
            }
        };

        let break_on_unhandled_access = match table.get("break_on_unhandled_access") {
            None => false,
            Some(Value::Boolean(b)) => *b,
            Some(other) => {
                warn!(value = %other, "Malformed break_on_unhandled_access, using default");
                false
            }
        };

        let recursion = match table.get("recursion") {
            None => RecursionLimits::default(),
            Some(Value::Table(recursion)) => RecursionLimits::from_table(recursion),
            Some(other) => {
                warn!(value = %other, "Malformed [recursion] section, using defaults");
                RecursionLimits::default()
            }
        };

        info!(path = %path.display(), "Loaded debugger configuration");
        Self { break_on_unhandled_access, recursion, origin: None }
    }

    /// Where this configuration was loaded from, if anywhere
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Write to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize debugger configuration")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Saved debugger configuration");
        Ok(())
    }

    /// Write back to the file this configuration was loaded from; no-op otherwise
    pub fn save(&self) -> Result<()> {
        match &self.origin {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = RecursionLimits::default();
        assert_eq!(limits.object_max, RecursionLimit::Max(1));
        assert_eq!(limits.struct_max, RecursionLimit::Unlimited);
        assert_eq!(limits.class_max, RecursionLimit::Max(1));
        assert_eq!(limits.static_array_max, RecursionLimit::Max(2));
        assert_eq!(limits.dynamic_array_max, RecursionLimit::Max(1));
    }

    #[test]
    fn test_limit_allows() {
        assert!(RecursionLimit::Max(1).allows(0));
        assert!(!RecursionLimit::Max(1).allows(1));
        assert!(!RecursionLimit::Max(0).allows(0));
        assert!(RecursionLimit::Unlimited.allows(10_000));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = DebuggerConfig::load_from(&path);
        assert_eq!(config.recursion, RecursionLimits::default());
        assert_eq!(config.origin(), Some(path.as_path()));
    }

    #[test]
    fn test_malformed_values_fall_back_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scdb.toml");
        fs::write(
            &path,
            r#"
break_on_unhandled_access = "yes"

[recursion]
object_max = 3
struct_max = "lots"
class_max = "unlimited"
static_array_max = -7
"#,
        )
        .unwrap();

        let config = DebuggerConfig::load_from(&path);
        assert!(!config.break_on_unhandled_access);
        assert_eq!(config.recursion.object_max, RecursionLimit::Max(3));
        assert_eq!(config.recursion.struct_max, RecursionLimit::Unlimited);
        assert_eq!(config.recursion.class_max, RecursionLimit::Unlimited);
        assert_eq!(config.recursion.static_array_max, RecursionLimit::Max(2));
        assert_eq!(config.recursion.dynamic_array_max, RecursionLimit::Max(1));
    }

    #[test]
    fn test_unparsable_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scdb.toml");
        fs::write(&path, "this is [not toml").unwrap();
        let config = DebuggerConfig::load_from(&path);
        assert_eq!(config.recursion, RecursionLimits::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scdb.toml");

        let mut config = DebuggerConfig::load_from(&path);
        config.break_on_unhandled_access = true;
        config.recursion.object_max = RecursionLimit::Max(4);
        config.recursion.dynamic_array_max = RecursionLimit::Unlimited;
        config.save().unwrap();

        let reloaded = DebuggerConfig::load_from(&path);
        assert!(reloaded.break_on_unhandled_access);
        assert_eq!(reloaded.recursion.object_max, RecursionLimit::Max(4));
        assert_eq!(reloaded.recursion.dynamic_array_max, RecursionLimit::Unlimited);
    }
}
