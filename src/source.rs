use std::fmt;
use std::rc::Rc;

/// A half-open character range within a named source file.
///
/// Regions double as the identity tag of AST nodes in diagnostics: no two
/// grammar reductions produce the same node kind over the same region, so
/// `(kind, region)` is unique. Node *references* use arena handles; regions
/// are carried only so diagnostics can point back at source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRegion {
    pub file: Rc<str>,
    pub start: usize,
    pub end: usize,
}

impl SourceRegion {
    pub fn new(file: Rc<str>, start: usize, end: usize) -> Self {
        SourceRegion { file, start, end }
    }

    /// Region for synthesized nodes that have no source text.
    pub fn empty() -> Self {
        SourceRegion {
            file: Rc::from(""),
            start: 0,
            end: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_empty() && self.start == 0 && self.end == 0
    }

    /// Smallest region covering both `self` and `other`.
    ///
    /// An empty region is the identity; joining regions from different files
    /// keeps the left-hand file.
    pub fn to(&self, other: &SourceRegion) -> SourceRegion {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() || self.file != other.file {
            return self.clone();
        }
        SourceRegion {
            file: self.file.clone(),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for SourceRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}..{}", self.file, self.start, self.end)
        }
    }
}
