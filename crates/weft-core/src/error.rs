//! Error types for the weft template engine.
//!
//! The taxonomy distinguishes parse-time failures (tokenization, template
//! construction), render-time failures (undefined variables, missing files)
//! and usage failures (asynchronous work reached from a synchronous render).
//! Parse-time errors never partially apply: a document either parses
//! completely or not at all.

use std::fmt;

use thiserror::Error;

/// A position in template source, used to annotate parse errors.
///
/// Lines and columns are 1-based. `file` is the resolved template path when
/// the source came through the loader, or `None` for inline templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// The template file the source came from, if any.
    pub file: Option<String>,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub col: usize,
}

impl SourceLocation {
    /// Creates a location for an inline (non-file) template.
    pub const fn inline(line: usize, col: usize) -> Self {
        Self {
            file: None,
            line,
            col,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.col),
            None => write!(f, "line {}, col {}", self.line, self.col),
        }
    }
}

/// All errors produced by the weft template engine.
#[derive(Debug, Error)]
pub enum WeftError {
    /// Malformed directive syntax encountered while tokenizing. Always fatal,
    /// aborts the parse.
    #[error("tokenization error: {message} ({location})")]
    Tokenize {
        /// What went wrong.
        message: String,
        /// Where in the source it went wrong.
        location: SourceLocation,
    },

    /// A failure raised while constructing a template node, annotated with
    /// the offending token's location. Always fatal, aborts the parse.
    #[error("parse error: {message} ({location})")]
    Parse {
        /// What went wrong.
        message: String,
        /// The location of the token being parsed.
        location: SourceLocation,
    },

    /// A strict-mode variable lookup miss. Carries the undefined path prefix
    /// (e.g. `a.b.c`). Swallowed and treated as nil in lenient evaluation.
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    /// A tag name with no registered implementation, under `strict_tags`.
    #[error("tag \"{0}\" not found")]
    UnknownTag(String),

    /// A filter name with no registered implementation, under
    /// `strict_filters`.
    #[error("filter \"{0}\" not found")]
    UnknownFilter(String),

    /// The loader exhausted every candidate path without finding the file.
    #[error("template \"{name}\" not found, looked in {attempted:?}")]
    FileNotFound {
        /// The logical name that was requested.
        name: String,
        /// Every concrete path that was tried, in order.
        attempted: Vec<String>,
    },

    /// Genuinely asynchronous work was required while the caller demanded
    /// synchronous completion.
    #[error("synchronous render reached asynchronous work: {0}")]
    Async(String),

    /// A render-time failure not covered by a more specific variant.
    #[error("render error: {0}")]
    Render(String),

    /// An I/O failure from the filesystem adapter.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WeftError {
    /// Wraps any error into a [`WeftError::Parse`] at the given location,
    /// leaving errors that are already parse or tokenization failures intact.
    pub fn into_parse(self, location: SourceLocation) -> Self {
        match self {
            err @ (Self::Parse { .. } | Self::Tokenize { .. }) => err,
            other => Self::Parse {
                message: other.to_string(),
                location,
            },
        }
    }

    /// Returns `true` for the strict-mode undefined-variable failure, which
    /// lenient evaluation converts into nil.
    pub const fn is_undefined_variable(&self) -> bool {
        matches!(self, Self::UndefinedVariable(_))
    }
}
