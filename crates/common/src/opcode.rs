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

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of instrumented instruction a script VM reports to the debugger.
///
/// The first group describes frame transitions, which drive the shadow call stack.
/// Everything else is an ordinary statement marker that only moves the current line of
/// the frame on top of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebugOpcode {
    /// A function or label invocation begins
    FrameEnter,
    /// The current invocation ends
    FrameLeave,
    /// A state is entered explicitly (e.g. `GotoState`)
    FrameEnterViaStateChange,
    /// A state is left explicitly, independent of call/return
    FrameLeaveViaStateChange,
    /// A state frame is suspended pending a latent call
    FrameLeaveLatent,
    /// A latent call completed and state code resumes
    FrameEnterLatentResume,
    /// Execution enters a state label without a preceding call
    LabelEnter,
    /// Execution leaves a state label
    LabelLeave,
    /// A `for` loop initializer; never a break opportunity
    LoopInitMarker,
    /// Assignment
    Let,
    /// `if` statement
    SimpleIf,
    /// `switch` statement
    Switch,
    /// `while` loop condition
    While,
    /// `assert` statement
    Assert,
    /// `return <expr>`
    Return,
    /// `return`
    ReturnNothing,
    /// Function call expression
    FunctionCall,
    /// Operator call expression
    OperatorCall,
    /// Iterator call (`foreach`)
    IteratorCall,
    /// `for` loop condition
    ForEval,
    /// `for` loop increment
    ForInc,
    /// `break` out of a loop
    BreakLoop,
    /// `break` out of a `for`
    BreakFor,
    /// `break` out of a `foreach`
    BreakForEach,
    /// `break` out of a `switch`
    BreakSwitch,
    /// `continue` in a loop
    ContinueLoop,
    /// `continue` in a `foreach`
    ContinueForEach,
    /// `continue` in a `for`
    ContinueFor,
}

impl DebugOpcode {
    /// Upper-case label shown to the front end next to the current location.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FrameEnter => "FRAME ENTER",
            Self::FrameLeave => "FRAME LEAVE",
            Self::FrameEnterViaStateChange => "STATE ENTER",
            Self::FrameLeaveViaStateChange => "STATE LEAVE",
            Self::FrameLeaveLatent => "LATENT LEAVE",
            Self::FrameEnterLatentResume => "LATENT RESUME",
            Self::LabelEnter => "LABEL ENTER",
            Self::LabelLeave => "LABEL LEAVE",
            Self::LoopInitMarker => "FOR INIT",
            Self::Let => "LET",
            Self::SimpleIf => "SIMPLE IF",
            Self::Switch => "SWITCH",
            Self::While => "WHILE",
            Self::Assert => "ASSERT",
            Self::Return => "RETURN",
            Self::ReturnNothing => "RETURN NOTHING",
            Self::FunctionCall => "FUNCTION CALL",
            Self::OperatorCall => "OPERATOR CALL",
            Self::IteratorCall => "ITERATOR CALL",
            Self::ForEval => "FOR EVAL",
            Self::ForInc => "FOR INC",
            Self::BreakLoop => "BREAK LOOP",
            Self::BreakFor => "BREAK FOR",
            Self::BreakForEach => "BREAK FOREACH",
            Self::BreakSwitch => "BREAK SWITCH",
            Self::ContinueLoop => "CONTINUE LOOP",
            Self::ContinueForEach => "CONTINUE FOREACH",
            Self::ContinueFor => "CONTINUE FOR",
        }
    }

    /// Whether this opcode is handled by the stack synchronizer itself rather than as a
    /// plain in-place update of the top frame.
    pub fn is_frame_transition(&self) -> bool {
        matches!(
            self,
            Self::FrameEnter
                | Self::FrameLeave
                | Self::FrameEnterViaStateChange
                | Self::FrameLeaveViaStateChange
                | Self::FrameLeaveLatent
                | Self::FrameEnterLatentResume
                | Self::LabelEnter
        )
    }
}

impl fmt::Display for DebugOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_opcodes_are_not_transitions() {
        assert!(!DebugOpcode::Let.is_frame_transition());
        assert!(!DebugOpcode::LoopInitMarker.is_frame_transition());
        assert!(!DebugOpcode::LabelLeave.is_frame_transition());
        assert!(DebugOpcode::FrameLeaveLatent.is_frame_transition());
        assert!(DebugOpcode::LabelEnter.is_frame_transition());
    }

    #[test]
    fn test_display_uses_label() {
        assert_eq!(DebugOpcode::Let.to_string(), "LET");
        assert_eq!(DebugOpcode::FrameEnter.to_string(), "FRAME ENTER");
    }
}
