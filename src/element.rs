//! Program element identity.

use serde::{Deserialize, Serialize};

/// A source location tracked for coverage: the enclosing class (or file)
/// name and a 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramElementKey {
    class_name: String,
    line: u32,
}

impl ProgramElementKey {
    pub fn new(class_name: impl Into<String>, line: u32) -> Self {
        Self {
            class_name: class_name.into(),
            line,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// A key is usable when it names a class and points at a real line.
    pub fn is_valid(&self) -> bool {
        !self.class_name.trim().is_empty() && self.line > 0
    }
}

impl std::fmt::Display for ProgramElementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.class_name, self.line)
    }
}
