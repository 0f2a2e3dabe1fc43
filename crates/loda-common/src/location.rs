use std::fmt;

/// A 1-based line number in an assembly source file, used by `ParseError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Location {
    pub line: u32,
}

impl Location {
    pub fn new(line: u32) -> Self {
        Self { line }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.line)
    }
}
