//! Version-constraint grammar
//!
//! Pragma constraints are free-form text. The recognized clause grammar is:
//!
//! ```text
//! clause     := comparator? ws* number ws* '.' ws* number (ws* '.' ws* number)?
//! comparator := '^' | '>=' | '>' | '<=' | '<' | '='
//! ```
//!
//! A constraint string is scanned left to right; every position that does not
//! start a clause (quotes, `~`, `||`, stray words) is skipped. A single string
//! may therefore carry several clauses, e.g. `>=0.4.1 <0.5.0`.

use crate::error::ParseError;
use std::fmt;

/// Comparator prefix of a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// No comparator, or `=`
    Exact,
    /// `^`
    Caret,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<=`
    LessOrEqual,
    /// `<`
    Less,
}

impl Comparator {
    /// Source spelling of the comparator (empty for a bare version)
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "",
            Self::Caret => "^",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Less => "<",
        }
    }
}

/// One `[comparator] major.minor[.patch]` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Clause {
    /// Comparator prefix
    pub comparator: Comparator,
    /// Major component (carried, never consulted by resolution)
    pub major: u32,
    /// Minor component
    pub minor: u32,
    /// Patch component, if written
    pub patch: Option<u32>,
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}.{}", self.comparator.as_str(), self.major, self.minor)?;
        if let Some(patch) = self.patch {
            write!(f, ".{patch}")?;
        }
        Ok(())
    }
}

/// Parse every clause in a constraint string, in order
///
/// # Errors
/// - `ParseError::NoClause` if the text holds no clause at all
/// - `ParseError::ComponentOutOfRange` if a number does not fit in `u32`
pub fn parse_constraint(input: &str) -> Result<Vec<Clause>, ParseError> {
    let mut cursor = Cursor::new(input);
    let mut clauses = Vec::new();

    while !cursor.at_end() {
        let start = cursor.pos;
        if let Some(clause) = cursor.clause()? {
            clauses.push(clause);
        } else {
            cursor.pos = start + 1;
        }
    }

    if clauses.is_empty() {
        return Err(ParseError::NoClause {
            input: input.to_string(),
        });
    }
    Ok(clauses)
}

struct Cursor<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Try a clause at the current position; restores nothing on `None`
    fn clause(&mut self) -> Result<Option<Clause>, ParseError> {
        let comparator = self.comparator();
        self.skip_ws();

        let Some(major) = self.number()? else {
            return Ok(None);
        };
        let Some(minor) = self.dotted_number()? else {
            return Ok(None);
        };

        let before_patch = self.pos;
        let patch = self.dotted_number()?;
        if patch.is_none() {
            self.pos = before_patch;
        }

        Ok(Some(Clause {
            comparator,
            major,
            minor,
            patch,
        }))
    }

    fn comparator(&mut self) -> Comparator {
        match self.peek() {
            Some(b'^') => {
                self.pos += 1;
                Comparator::Caret
            }
            Some(b'>') => {
                self.pos += 1;
                if self.eat(b'=') {
                    Comparator::GreaterOrEqual
                } else {
                    Comparator::Greater
                }
            }
            Some(b'<') => {
                self.pos += 1;
                if self.eat(b'=') {
                    Comparator::LessOrEqual
                } else {
                    Comparator::Less
                }
            }
            Some(b'=') => {
                self.pos += 1;
                Comparator::Exact
            }
            _ => Comparator::Exact,
        }
    }

    /// `ws* '.' ws* number`
    fn dotted_number(&mut self) -> Result<Option<u32>, ParseError> {
        self.skip_ws();
        if !self.eat(b'.') {
            return Ok(None);
        }
        self.skip_ws();
        self.number()
    }

    fn number(&mut self) -> Result<Option<u32>, ParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }

        let digits = &self.input[start..self.pos];
        digits
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ParseError::ComponentOutOfRange {
                component: digits.to_string(),
                input: self.input.to_string(),
            })
    }
}
