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

/// Normalize an expression by replacing any contiguous whitespace with a single space
pub fn normalize_expression(expr: &str) -> String {
    expr.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove all whitespace from a watch path, except inside single-quoted literal names.
///
/// Watch paths such as `Inventory [ Slot ] . Ammo` and `Inventory[Slot].Ammo` denote the
/// same value, so the debugger keys its watch list on the compacted form.
pub fn compact_expression(expr: &str) -> String {
    let mut in_literal = false;
    expr.chars()
        .filter(|c| {
            if *c == '\'' {
                in_literal = !in_literal;
            }
            in_literal || !c.is_whitespace()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_expression_mixed_whitespace() {
        assert_eq!(normalize_expression("a  \t\n  b \r\n c"), "a b c");
        assert_eq!(normalize_expression("  a b c  "), "a b c");
    }

    #[test]
    fn test_normalize_expression_only_whitespace() {
        assert_eq!(normalize_expression(""), "");
        assert_eq!(normalize_expression("\t\n\r"), "");
    }

    #[test]
    fn test_compact_expression_strips_whitespace() {
        assert_eq!(compact_expression(" Inventory [ Slot ] . Ammo "), "Inventory[Slot].Ammo");
    }

    #[test]
    fn test_compact_expression_keeps_quoted_names() {
        assert_eq!(
            compact_expression("Owner . 'My Package.Some Object' . Health"),
            "Owner.'My Package.Some Object'.Health"
        );
    }
}
