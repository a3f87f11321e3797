//! Conversions between engine types and the wire protocol.
//!
//! Wire positions are `{line, character}` objects, zero-based on both
//! axes, matching the engine's own positions.

use nix_lexer::{Position, Range};
use serde::{Deserialize, Serialize};

/// Position as it appears on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WirePosition {
    /// Zero-based line.
    pub line: u32,
    /// Zero-based character offset within the line.
    pub character: u32,
}

/// Range as it appears on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireRange {
    /// Inclusive start.
    pub start: WirePosition,
    /// Exclusive end.
    pub end: WirePosition,
}

impl From<Position> for WirePosition {
    fn from(pos: Position) -> Self {
        WirePosition { line: pos.line, character: pos.col }
    }
}

impl From<WirePosition> for Position {
    fn from(pos: WirePosition) -> Self {
        Position::new(pos.line, pos.character)
    }
}

impl From<Range> for WireRange {
    fn from(range: Range) -> Self {
        WireRange { start: range.start.into(), end: range.end.into() }
    }
}

impl From<WireRange> for Range {
    fn from(range: WireRange) -> Self {
        Range::new(range.start.into(), range.end.into())
    }
}

/// The whole-document replacement range used by formatting responses.
pub fn whole_document_wire_range() -> WireRange {
    WireRange {
        start: WirePosition { line: 0, character: 0 },
        end: WirePosition { line: 99999, character: 0 },
    }
}
