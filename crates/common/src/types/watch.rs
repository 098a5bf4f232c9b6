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

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// The three watch panes the debugger fills while halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum WatchKind {
    /// Parameters and locals of the current function
    #[display("local")]
    Local,
    /// Fields of the current object
    #[display("global")]
    Global,
    /// Expressions added by the user
    #[display("user")]
    User,
}

impl WatchKind {
    /// All kinds, in the order the debugger refreshes them
    pub const ALL: [Self; 3] = [Self::Local, Self::Global, Self::User];
}

/// Current execution position reported to the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Name of the class owning the executing code
    pub class_name: String,
    /// Package containing that class
    pub package_name: String,
    /// Current line
    pub line: u32,
    /// Label of the last instruction executed on that line
    pub opcode_label: String,
    /// Name of the executing object
    pub object_name: String,
}
