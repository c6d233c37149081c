/// Diagnostic records produced by the resolution and type-checking passes.
///
/// Each pass accumulates its diagnostics into a `Vec<Diagnostic>` and keeps
/// going; the host decides whether to continue to the next pass. Operational
/// errors (lexer, parser, runtime) are separate `thiserror` enums in their
/// own modules.
use std::fmt;

use crate::source::SourceRegion;

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub message: String,
    pub site: SourceRegion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub site: SourceRegion,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>, site: SourceRegion) -> Self {
        Diagnostic {
            message: message.into(),
            site,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, message: impl Into<String>, site: SourceRegion) -> Self {
        self.notes.push(Note {
            message: message.into(),
            site,
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.message, self.site)?;
        for note in &self.notes {
            write!(f, "\n  note: {} [{}]", note.message, note.site)?;
        }
        Ok(())
    }
}
