//! small helpers shared by both grammars
use std::cell::Cell;

/// Position in the source, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    const START: Position = Position { line: 1, column: 1 };

    fn advance(mut self, text: &str) -> Self {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self
    }
}

/// Line and column of a cursor moving forward through `input`
///
/// Each lookup only scans from the previous offset, so walking the whole input costs one pass. Going back restarts
/// from the beginning.
#[derive(Debug)]
pub(crate) struct PositionTracker<'a> {
    input: &'a str,
    last: Cell<(usize, Position)>,
}

impl<'a> PositionTracker<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            last: Cell::new((0, Position::START)),
        }
    }

    /// Position of byte `offset`, which must be on a char boundary
    pub fn at(&self, offset: usize) -> Position {
        let (mut from, mut position) = self.last.get();
        if offset < from {
            (from, position) = (0, Position::START);
        }
        let position = position.advance(&self.input[from..offset]);
        self.last.set((offset, position));
        position
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Names of keys, constants and external variables
pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_'
}
