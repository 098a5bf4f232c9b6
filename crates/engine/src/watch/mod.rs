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

//! Watch expression engine.
//!
//! - [`parser`] turns text into a [`WatchNode`] chain
//! - [`resolve`] walks the chain against live memory to a [`WatchValue`]
//! - [`flatten`] renders a value (and its members, within the recursion limits) as
//!   named entries for the front end
//! - [`data`] samples a pinned value to implement data breakpoints

pub mod data;
pub mod flatten;
pub mod parser;
pub mod resolve;

pub use data::DataWatch;
pub use flatten::WatchFlattener;
pub use parser::{ArrayIndexNode, WatchNode};
pub use resolve::{WatchScope, WatchValue};

use scdb_common::compact_expression;

use crate::{ScriptVm, StackFrame, WatchError};

/// An expression added by the user, re-evaluated at every halt.
#[derive(Debug, Clone)]
pub struct UserWatch {
    text: String,
    root: Result<WatchNode, WatchError>,
    scope: Option<WatchScope>,
}

impl UserWatch {
    /// Parse `text`. A parse failure is kept and reported as the watch's value.
    pub fn new(text: &str) -> Self {
        Self { text: compact_expression(text), root: WatchNode::parse(text), scope: None }
    }

    /// Expression text, whitespace removed
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this watch was created from `text`
    pub fn matches(&self, text: &str) -> bool {
        self.text == compact_expression(text)
    }

    /// Re-point the watch at `frame`, dropping all cached resolutions
    pub fn refresh(&mut self, vm: &dyn ScriptVm, frame: Option<&StackFrame>) {
        self.scope = frame.and_then(|frame| WatchScope::for_frame(vm, frame));
        if let Ok(root) = &mut self.root {
            root.invalidate();
        }
    }

    /// Forget the scope; the watch reports no context until refreshed
    pub fn clear_scope(&mut self) {
        self.scope = None;
    }

    /// Whether the last resolution went through a local of the scoped frame
    pub fn is_frame_local(&self) -> bool {
        self.root.as_ref().is_ok_and(WatchNode::is_frame_local)
    }

    /// Resolve the watch in its current scope
    pub fn value(&mut self, vm: &dyn ScriptVm) -> Result<WatchValue, WatchError> {
        let root = self.root.as_mut().map_err(|e| e.clone())?;
        let scope = self.scope.as_ref().ok_or(WatchError::NoContext)?;
        root.evaluate(vm, scope)
    }
}
