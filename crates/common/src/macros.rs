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

//! Path-based hard-stop assertions for SCDB
//!
//! The debugger core recovers from every fault it detects (stack desynchronization,
//! corrupted watch data) so the host keeps running. While developing the debugger itself
//! it is more useful to stop dead at the point of detection. These macros panic only for
//! module paths enabled through the `SCDB_ASSERT` environment variable:
//!
//! - `SCDB_ASSERT=*` or `SCDB_ASSERT=all` enables every module
//! - `SCDB_ASSERT=scdb_engine::stack` enables that module and its children
//! - comma-separated lists are accepted
//!
//! When `SCDB_ASSERT` is unset or empty every assertion is disabled.

use once_cell::sync::Lazy;
use std::env;

/// Assertion target patterns from the `SCDB_ASSERT` environment variable
static ASSERTION_TARGETS: Lazy<Vec<String>> = Lazy::new(|| match env::var("SCDB_ASSERT") {
    Ok(val) if !val.is_empty() => {
        val.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
    }
    _ => Vec::new(),
});

/// Check if assertions are enabled for the given module path
///
/// A target of `*` or `all` matches everything; otherwise a target matches every module
/// path it is a prefix of.
pub fn is_assertion_enabled(module_path: &str) -> bool {
    ASSERTION_TARGETS
        .iter()
        .any(|target| target == "*" || target == "all" || module_path.starts_with(target.as_str()))
}

/// Marks the assertion branch as unlikely.
#[cold]
#[inline(never)]
pub fn cold_path() {}

/// Assert a condition only when enabled via the `SCDB_ASSERT` environment variable.
///
/// ```ignore
/// use scdb_common::scdb_assert;
///
/// scdb_assert!(depth > 0, "leave with empty stack");
/// ```
#[macro_export]
macro_rules! scdb_assert {
    ($($arg:tt)*) => {
        if $crate::macros::is_assertion_enabled(module_path!()) {
            $crate::macros::cold_path();
            assert!($($arg)*);
        }
    };
}

/// Like [`scdb_assert!`], but compiled out of release builds.
#[macro_export]
macro_rules! scdb_debug_assert {
    ($($arg:tt)*) => {
        #[cfg(debug_assertions)]
        {
            $crate::scdb_assert!($($arg)*);
        }
    };
}

/// Panic with a message when assertions are enabled for this module, in debug builds only.
///
/// For faults that were detected on a path with no condition left to assert.
#[macro_export]
macro_rules! scdb_debug_fail {
    ($($arg:tt)*) => {
        #[cfg(debug_assertions)]
        {
            if $crate::macros::is_assertion_enabled(module_path!()) {
                $crate::macros::cold_path();
                panic!($($arg)*);
            }
        }
    };
}
