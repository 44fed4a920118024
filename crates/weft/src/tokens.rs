//! Token types produced by the lexer.
//!
//! Tokens are immutable views over the source text: they carry a shared
//! [`Source`] plus a half-open byte span `[begin, end)` and never own a copy
//! of the text. Top-level tokens ([`TopLevelToken`]) partition a document
//! into HTML runs, output directives and tag directives; the remaining types
//! describe the primitive lexemes inside a directive's argument text.

use std::sync::Arc;

use weft_core::SourceLocation;

/// Shared, immutable template source text.
pub type Source = Arc<str>;

/// A byte span over a [`Source`], optionally annotated with the file it was
/// loaded from.
#[derive(Debug, Clone)]
pub struct Span {
    /// The full input the span indexes into.
    pub input: Source,
    /// The file the input came from, when loaded through the loader.
    pub file: Option<Arc<str>>,
    /// Inclusive start byte offset.
    pub begin: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

impl Span {
    /// Creates a span over `input[begin..end]`.
    pub fn new(input: Source, file: Option<Arc<str>>, begin: usize, end: usize) -> Self {
        Self {
            input,
            file,
            begin,
            end,
        }
    }

    /// The text this span covers.
    pub fn text(&self) -> &str {
        &self.input[self.begin..self.end]
    }

    /// Computes the 1-based line/column of the span start.
    pub fn location(&self) -> SourceLocation {
        let head = &self.input[..self.begin];
        let line = head.matches('\n').count() + 1;
        let col = self.begin - head.rfind('\n').map_or(0, |i| i + 1) + 1;
        SourceLocation {
            file: self.file.as_ref().map(|f| f.to_string()),
            line,
            col,
        }
    }
}

/// A run of literal document text between directives.
///
/// `trim_left`/`trim_right` are byte counts stripped from either side by
/// whitespace control; they start at zero and are adjusted when a
/// neighbouring directive carries trim flags.
#[derive(Debug, Clone)]
pub struct HtmlToken {
    /// Span over the full literal run, before trimming.
    pub span: Span,
    /// Bytes trimmed from the left edge.
    pub trim_left: usize,
    /// Bytes trimmed from the right edge.
    pub trim_right: usize,
}

impl HtmlToken {
    /// The text that survives whitespace trimming.
    pub fn content(&self) -> &str {
        let begin = self.span.begin + self.trim_left;
        let end = self.span.end.saturating_sub(self.trim_right);
        if begin >= end {
            ""
        } else {
            &self.span.input[begin..end]
        }
    }
}

/// A tag directive, e.g. `{% if user %}`.
#[derive(Debug, Clone)]
pub struct TagToken {
    /// Span over the whole directive including delimiters.
    pub span: Span,
    /// The tag name.
    pub name: String,
    /// Byte range of the argument text inside `span.input`.
    pub args_begin: usize,
    /// End of the argument text.
    pub args_end: usize,
    /// Trim whitespace to the left of the directive.
    pub trim_left: bool,
    /// Trim whitespace to the right of the directive.
    pub trim_right: bool,
}

impl TagToken {
    /// The raw argument text following the tag name.
    pub fn args(&self) -> &str {
        &self.span.input[self.args_begin..self.args_end]
    }
}

/// An output directive, e.g. `{{ user.name | escape }}`.
#[derive(Debug, Clone)]
pub struct OutputToken {
    /// Span over the whole directive including delimiters.
    pub span: Span,
    /// Byte range of the expression text inside `span.input`.
    pub content_begin: usize,
    /// End of the expression text.
    pub content_end: usize,
    /// Trim whitespace to the left of the directive.
    pub trim_left: bool,
    /// Trim whitespace to the right of the directive.
    pub trim_right: bool,
}

impl OutputToken {
    /// The expression text between the delimiters.
    pub fn content(&self) -> &str {
        &self.span.input[self.content_begin..self.content_end]
    }
}

/// One top-level token of a document: an HTML run or a directive.
#[derive(Debug, Clone)]
pub enum TopLevelToken {
    /// Literal document text.
    Html(HtmlToken),
    /// A `{% tag %}` directive.
    Tag(TagToken),
    /// A `{{ output }}` directive.
    Output(OutputToken),
}

impl TopLevelToken {
    /// The raw source text of the token, delimiters included. Used by the
    /// `raw` tag to reproduce input exactly.
    pub fn raw_text(&self) -> &str {
        self.span().text()
    }

    /// The underlying span.
    pub fn span(&self) -> &Span {
        match self {
            Self::Html(t) => &t.span,
            Self::Tag(t) => &t.span,
            Self::Output(t) => &t.span,
        }
    }

    /// Returns the tag token if this is a tag named `name`.
    pub fn as_tag_named(&self, name: &str) -> Option<&TagToken> {
        match self {
            Self::Tag(t) if t.name == name => Some(t),
            _ => None,
        }
    }
}

/// Keyword literals recognized inside expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    /// `nil` / `null`.
    Nil,
    /// `true`.
    True,
    /// `false`.
    False,
    /// `empty` — compares equal to zero-length strings and collections.
    Empty,
}

/// A numeric literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// An integer literal.
    Integer(i64),
    /// A floating point literal.
    Float(f64),
}

/// One segment of a property path.
#[derive(Debug, Clone)]
pub enum PathSeg {
    /// A named key: `.foo` or `["foo"]`.
    Key(String),
    /// A numeric index: `[2]` or `[-1]`.
    Index(i64),
    /// A bracketed sub-expression resolved at evaluation time: `[var]`.
    Dynamic(Box<ValueToken>),
}

/// A variable reference with a chain of property accesses, e.g.
/// `products[0].title`.
#[derive(Debug, Clone)]
pub struct PathToken {
    /// Span over the whole path.
    pub span: Span,
    /// The access chain; the first segment is always [`PathSeg::Key`].
    pub segments: Vec<PathSeg>,
}

/// A primitive value inside a directive: literal, quoted string, number,
/// variable path or range.
#[derive(Debug, Clone)]
pub enum ValueToken {
    /// A keyword literal.
    Literal(Literal, Span),
    /// A quoted string, span includes the quotes.
    Quoted(Span),
    /// A numeric literal.
    Number(Number, Span),
    /// A variable path.
    Path(PathToken),
    /// A range `(lhs..rhs)`, materialized to an integer sequence when
    /// evaluated.
    Range(Box<ValueToken>, Box<ValueToken>, Span),
}

impl ValueToken {
    /// The raw source text of the token.
    pub fn text(&self) -> &str {
        self.span().text()
    }

    /// The underlying span.
    pub fn span(&self) -> &Span {
        match self {
            Self::Literal(_, s) | Self::Quoted(s) | Self::Number(_, s) | Self::Range(_, _, s) => s,
            Self::Path(p) => &p.span,
        }
    }
}

/// One argument of a filter invocation.
#[derive(Debug, Clone)]
pub enum FilterArgToken {
    /// A positional argument.
    Positional(ValueToken),
    /// A `key: value` keyword argument.
    Keyword(String, ValueToken),
}

/// A parsed filter invocation: `name: arg, key: arg`.
#[derive(Debug, Clone)]
pub struct FilterToken {
    /// The filter name.
    pub name: String,
    /// Arguments in source order.
    pub args: Vec<FilterArgToken>,
}

/// A `key: value` (or bare `key`) entry in a tag's trailing hash arguments.
#[derive(Debug, Clone)]
pub struct HashToken {
    /// The hash key.
    pub name: String,
    /// The value; a bare key evaluates to `true`.
    pub value: Option<ValueToken>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(text: &str, begin: usize, end: usize) -> Span {
        Span::new(Arc::from(text), None, begin, end)
    }

    #[test]
    fn test_span_text() {
        let s = span("hello world", 6, 11);
        assert_eq!(s.text(), "world");
    }

    #[test]
    fn test_span_location_first_line() {
        let s = span("hello world", 6, 11);
        let loc = s.location();
        assert_eq!((loc.line, loc.col), (1, 7));
    }

    #[test]
    fn test_span_location_later_line() {
        let s = span("a\nbb\nccc", 5, 8);
        let loc = s.location();
        assert_eq!((loc.line, loc.col), (3, 1));
    }

    #[test]
    fn test_html_token_trimming() {
        let mut token = HtmlToken {
            span: span("  x  ", 0, 5),
            trim_left: 0,
            trim_right: 0,
        };
        assert_eq!(token.content(), "  x  ");
        token.trim_left = 2;
        token.trim_right = 2;
        assert_eq!(token.content(), "x");
        token.trim_right = 5;
        assert_eq!(token.content(), "");
    }
}
