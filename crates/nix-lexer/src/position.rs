//! Line/column positions and half-open ranges.
//!
//! Positions are zero-based on both axes, matching the wire protocol. The
//! Nix grammar reports one-based positions; [`Position::display_one_based`]
//! and [`Position::from_one_based`] convert at that boundary.

use std::cmp::Ordering;
use std::fmt;

/// A zero-based line/column position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Zero-based line index.
    pub line: u32,
    /// Zero-based column index, counting bytes within the line.
    pub col: u32,
}

impl Position {
    /// Create a position from zero-based line and column.
    pub fn new(line: u32, col: u32) -> Self {
        Position { line, col }
    }

    /// Convert from the one-based coordinates the Nix grammar uses.
    pub fn from_one_based(line: u32, col: u32) -> Self {
        Position { line: line.saturating_sub(1), col: col.saturating_sub(1) }
    }

    /// One-based rendering for diagnostics, e.g. `(string):1:2`.
    ///
    /// `origin` is the document path, or `(string)` for pathless sources.
    pub fn display_one_based(&self, origin: &str) -> String {
        format!("{}:{}:{}", origin, self.line + 1, self.col + 1)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line.cmp(&other.line).then(self.col.cmp(&other.col))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A half-open `[start, end)` range of positions.
///
/// Ordered by start position, then end position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Range {
    /// Inclusive start.
    pub start: Position,
    /// Exclusive end.
    pub end: Position,
}

impl Range {
    /// Create a range from start and end positions.
    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }

    /// Half-open containment: `start <= p < end`.
    pub fn contains(&self, p: Position) -> bool {
        self.start <= p && p < self.end
    }

    /// Inclusive containment: `start <= p <= end`.
    ///
    /// The cursor-path locator uses this so a cursor sitting immediately
    /// after an expression still selects it.
    pub fn touches(&self, p: Position) -> bool {
        self.start <= p && p <= self.end
    }

    /// Whether `other` lies entirely within this range.
    pub fn encloses(&self, other: Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn position_ordering_is_line_major() {
        assert!(Position::new(0, 9) < Position::new(1, 0));
        assert!(Position::new(2, 3) < Position::new(2, 4));
        assert_eq!(Position::new(1, 1), Position::new(1, 1));
    }

    #[test]
    fn range_contains_is_half_open() {
        let r = Range::new(Position::new(0, 2), Position::new(0, 5));
        assert!(!r.contains(Position::new(0, 1)));
        assert!(r.contains(Position::new(0, 2)));
        assert!(r.contains(Position::new(0, 4)));
        assert!(!r.contains(Position::new(0, 5)));
    }

    #[test]
    fn range_touches_includes_the_end() {
        let r = Range::new(Position::new(0, 2), Position::new(0, 5));
        assert!(r.touches(Position::new(0, 5)));
        assert!(!r.touches(Position::new(0, 6)));
    }

    #[test]
    fn one_based_display() {
        let p = Position::new(0, 1);
        assert_eq!(p.display_one_based("(string)"), "(string):1:2");
    }
}
