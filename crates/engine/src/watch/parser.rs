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

//! Watch expression parsing.
//!
//! `Inventory[WeaponIndex].Ammo` becomes a chain of two nodes, `Inventory` carrying an
//! index sub-expression and `Ammo`. Dots split segments only outside brackets and
//! outside single-quoted literal names. A segment written as a cast, `Pawn(Owner)`,
//! keeps only the text inside the parentheses.

use scdb_common::compact_expression;

use super::resolve::ResolvedMember;
use crate::WatchError;

/// One dot-separated segment of a watch expression.
#[derive(Debug, Clone)]
pub struct WatchNode {
    pub(crate) name: String,
    pub(crate) index: Option<ArrayIndexNode>,
    pub(crate) next: Option<Box<WatchNode>>,
    pub(crate) resolved: Option<ResolvedMember>,
}

/// The `[...]` part of a segment.
#[derive(Debug, Clone)]
pub enum ArrayIndexNode {
    /// A plain integer
    Literal(i64),
    /// A nested expression whose value is used as the index
    Expression(Box<WatchNode>),
}

impl WatchNode {
    /// Parse a full expression into its node chain
    pub fn parse(text: &str) -> Result<Self, WatchError> {
        let text = compact_expression(text);
        if text.is_empty() {
            return Err(WatchError::Empty);
        }

        let segments = split_segments(&text);
        let mut chain: Option<Box<Self>> = None;
        for segment in segments.into_iter().rev() {
            let (name, index) = split_index(&segment)?;
            if name.is_empty() {
                return Err(WatchError::MemberNotFound { member: segment, scope: text.clone() });
            }
            chain = Some(Box::new(Self { name, index, next: chain, resolved: None }));
        }

        chain.map(|node| *node).ok_or(WatchError::Empty)
    }

    /// Property name of this segment
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index attached to this segment, if any
    pub fn index(&self) -> Option<&ArrayIndexNode> {
        self.index.as_ref()
    }

    /// Next segment
    pub fn next(&self) -> Option<&Self> {
        self.next.as_deref()
    }

    /// This node followed by every later segment
    pub fn iter(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |node| node.next())
    }

    /// Segment names in order
    pub fn segment_names(&self) -> Vec<&str> {
        self.iter().map(Self::name).collect()
    }

    /// Drop cached resolutions in this chain and in every index sub-expression
    pub(crate) fn invalidate(&mut self) {
        self.resolved = None;
        if let Some(ArrayIndexNode::Expression(node)) = &mut self.index {
            node.invalidate();
        }
        if let Some(next) = &mut self.next {
            next.invalidate();
        }
    }
}

/// Split on top-level dots.
fn split_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut literal = false;
    // Set after a cast's closing parenthesis; the rest of the segment is ignored.
    let mut closed = false;

    for c in text.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '\'' if depth == 0 => literal = !literal,
            '(' if depth == 0 && !literal => {
                current.clear();
                closed = false;
                continue;
            }
            ')' if depth == 0 && !literal => {
                closed = true;
                continue;
            }
            '.' if depth == 0 && !literal => {
                segments.push(std::mem::take(&mut current));
                closed = false;
                continue;
            }
            _ => {}
        }
        if !closed {
            current.push(c);
        }
    }
    segments.push(current);
    segments
}

/// Split `Name[contents]` into the name and its parsed index.
fn split_index(segment: &str) -> Result<(String, Option<ArrayIndexNode>), WatchError> {
    let Some(open) = segment.find('[') else {
        return Ok((segment.to_string(), None));
    };

    let name = segment[..open].to_string();
    let rest = &segment[open + 1..];
    let contents = match rest.rfind(']') {
        Some(close) => &rest[..close],
        None => rest,
    };

    if contents.is_empty() {
        return Ok((name, None));
    }

    let index = match contents.parse::<i64>() {
        Ok(literal) => ArrayIndexNode::Literal(literal),
        Err(_) => ArrayIndexNode::Expression(Box::new(WatchNode::parse(contents)?)),
    };
    Ok((name, Some(index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted_indexed_path() {
        let node = WatchNode::parse("A.B[2].C").unwrap();
        assert_eq!(node.segment_names(), vec!["A", "B", "C"]);
        assert!(node.index().is_none());

        let b = node.next().unwrap();
        assert!(matches!(b.index(), Some(ArrayIndexNode::Literal(2))));
        assert!(b.next().unwrap().index().is_none());
    }

    #[test]
    fn test_parse_nested_index_expression() {
        let node = WatchNode::parse("Inventory[Slots[Current].Index].Ammo").unwrap();
        assert_eq!(node.segment_names(), vec!["Inventory", "Ammo"]);

        let Some(ArrayIndexNode::Expression(index)) = node.index() else {
            panic!("expected an index expression");
        };
        assert_eq!(index.segment_names(), vec!["Slots", "Index"]);
        let Some(ArrayIndexNode::Expression(inner)) = index.index() else {
            panic!("expected a nested index expression");
        };
        assert_eq!(inner.segment_names(), vec!["Current"]);
    }

    #[test]
    fn test_quoted_names_are_not_split() {
        let node = WatchNode::parse("'Pkg.Object'.Health").unwrap();
        assert_eq!(node.segment_names(), vec!["'Pkg.Object'", "Health"]);
    }

    #[test]
    fn test_cast_prefix_is_ignored() {
        let node = WatchNode::parse("Pawn(Owner).Health").unwrap();
        assert_eq!(node.segment_names(), vec!["Owner", "Health"]);
    }

    #[test]
    fn test_whitespace_is_ignored() {
        let node = WatchNode::parse(" Inventory [ 1 ] . Ammo ").unwrap();
        assert_eq!(node.segment_names(), vec!["Inventory", "Ammo"]);
        assert!(matches!(node.index(), Some(ArrayIndexNode::Literal(1))));
    }

    #[test]
    fn test_empty_expressions_are_rejected() {
        assert_eq!(WatchNode::parse("   ").unwrap_err(), WatchError::Empty);
        assert!(WatchNode::parse("A..B").is_err());
    }
}
