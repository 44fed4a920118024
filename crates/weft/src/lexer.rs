//! The tokenizer.
//!
//! [`Tokenizer`] is a cursor over a shared source string. One pass
//! ([`Tokenizer::read_top_level_tokens`]) splits a document into HTML runs
//! and directives; the remaining readers are reused by tags to pick apart
//! directive argument text (values, expressions, filters, hash arguments).
//!
//! Scanning is byte-based. Every boundary the tokenizer slices at is an
//! ASCII delimiter or word character, so slices always fall on UTF-8
//! character boundaries.

use std::collections::HashMap;
use std::sync::Arc;

use weft_core::WeftError;

use crate::expression::Expression;
use crate::options::NormalizedOptions;
use crate::tokens::{
    FilterArgToken, FilterToken, HashToken, HtmlToken, Literal, Number, OutputToken, PathSeg,
    PathToken, Source, Span, TagToken, TopLevelToken, ValueToken,
};

const fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

const fn is_blank_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Prefix tree over operator spellings, used for longest-match operator
/// recognition inside expressions.
///
/// Word-like operators (`and`, `or`, `contains`) only match on a word
/// boundary, so `android` scans as an identifier rather than `and` + `roid`.
#[derive(Debug, Default)]
pub struct OperatorTrie {
    children: HashMap<u8, OperatorTrie>,
    terminal: Option<String>,
}

impl OperatorTrie {
    /// Builds a trie over the given operator spellings.
    pub fn new<'a>(operators: impl IntoIterator<Item = &'a str>) -> Self {
        let mut root = Self::default();
        for op in operators {
            root.insert(op);
        }
        root
    }

    fn insert(&mut self, op: &str) {
        let mut node = self;
        for &b in op.as_bytes() {
            node = node.children.entry(b).or_default();
        }
        node.terminal = Some(op.to_string());
    }

    /// Finds the longest operator starting at the head of `bytes`, honoring
    /// word boundaries for word-like operators.
    fn longest_match(&self, bytes: &[u8]) -> Option<(usize, &str)> {
        let mut node = self;
        let mut best: Option<(usize, &str)> = None;
        for (i, &b) in bytes.iter().enumerate() {
            let Some(next) = node.children.get(&b) else {
                break;
            };
            node = next;
            if let Some(op) = &node.terminal {
                let word_like = op.as_bytes().last().is_some_and(|b| b.is_ascii_alphabetic());
                let bounded =
                    !word_like || !bytes.get(i + 1).copied().is_some_and(is_word_byte);
                if bounded {
                    best = Some((i + 1, op.as_str()));
                }
            }
        }
        best
    }
}

/// A cursor over template source text.
pub struct Tokenizer<'t> {
    input: Source,
    file: Option<Arc<str>>,
    trie: &'t OperatorTrie,
    /// Current byte offset; tags rewind by saving and restoring this.
    pub pos: usize,
    end: usize,
}

impl<'t> Tokenizer<'t> {
    /// Creates a tokenizer over the full input.
    pub fn new(input: Source, trie: &'t OperatorTrie, file: Option<Arc<str>>) -> Self {
        let end = input.len();
        Self {
            input,
            file,
            trie,
            pos: 0,
            end,
        }
    }

    /// Creates a tokenizer over a sub-range of an existing source, used to
    /// pick apart a directive's argument text in place.
    pub fn new_at(
        input: Source,
        trie: &'t OperatorTrie,
        file: Option<Arc<str>>,
        begin: usize,
        end: usize,
    ) -> Self {
        Self {
            input,
            file,
            trie,
            pos: begin,
            end,
        }
    }

    /// True once the cursor passed the end of input.
    pub const fn end(&self) -> bool {
        self.pos >= self.end
    }

    fn bytes(&self) -> &[u8] {
        self.input.as_bytes()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.byte_at(self.pos)
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.byte_at(self.pos + offset)
    }

    fn byte_at(&self, i: usize) -> Option<u8> {
        (i < self.end).then(|| self.bytes()[i])
    }

    fn starts_with(&self, pattern: &str) -> bool {
        let p = pattern.as_bytes();
        self.pos + p.len() <= self.end && &self.bytes()[self.pos..self.pos + p.len()] == p
    }

    fn find(&self, pattern: &str) -> Option<usize> {
        let bytes = self.bytes();
        let p = pattern.as_bytes();
        (self.pos..=self.end.saturating_sub(p.len())).find(|&i| &bytes[i..i + p.len()] == p)
    }

    fn span(&self, begin: usize, end: usize) -> Span {
        Span::new(self.input.clone(), self.file.clone(), begin, end)
    }

    fn error(&self, message: impl Into<String>, at: usize) -> WeftError {
        WeftError::Tokenize {
            message: message.into(),
            location: self.span(at, at).location(),
        }
    }

    /// Skips spaces, tabs and newlines.
    pub fn skip_blank(&mut self) {
        while self.peek_byte().is_some_and(is_blank_byte) {
            self.pos += 1;
        }
    }

    /// Consumes the given byte when the cursor sits on it.
    pub fn accept(&mut self, byte: u8) -> bool {
        if self.peek_byte() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// The unconsumed remainder of the input range.
    pub fn remaining(&self) -> &str {
        &self.input[self.pos..self.end]
    }

    /// The source text between two byte offsets.
    pub fn source_slice(&self, begin: usize, end: usize) -> String {
        self.input[begin..end].to_string()
    }

    /// Reads a run of word characters; may be empty.
    pub fn read_identifier(&mut self) -> &str {
        let begin = self.pos;
        while self.peek_byte().is_some_and(is_word_byte) {
            self.pos += 1;
        }
        &self.input[begin..self.pos]
    }

    /// Reads a quoted string including its quotes, or `None` if the cursor
    /// is not at an opening quote or the string never closes.
    pub fn read_quoted(&mut self) -> Option<Span> {
        let quote = self.peek_byte()?;
        if quote != b'\'' && quote != b'"' {
            return None;
        }
        let begin = self.pos;
        let bytes = self.bytes();
        let mut i = begin + 1;
        while i < self.end {
            match bytes[i] {
                b'\\' => i += 2,
                b if b == quote => {
                    self.pos = i + 1;
                    return Some(self.span(begin, i + 1));
                }
                _ => i += 1,
            }
        }
        None
    }

    /// Reads a numeric literal, or `None` when the cursor is not at one.
    /// A number directly followed by a word character is not a number.
    pub fn read_number(&mut self) -> Option<(Number, Span)> {
        let begin = self.pos;
        let mut i = begin;
        if matches!(self.byte_at(i), Some(b'-' | b'+')) {
            i += 1;
        }
        let mut digits = false;
        let mut decimal = false;
        while let Some(b) = self.byte_at(i) {
            match b {
                b'0'..=b'9' => {
                    digits = true;
                    i += 1;
                }
                // a second dot starts a range, not a decimal part
                b'.' if !decimal && digits && self.byte_at(i + 1) != Some(b'.') => {
                    decimal = true;
                    i += 1;
                }
                _ => break,
            }
        }
        if !digits || self.byte_at(i).is_some_and(is_word_byte) {
            return None;
        }
        let text = &self.input[begin..i];
        let number = if decimal {
            Number::Float(text.parse().ok()?)
        } else {
            Number::Integer(text.parse().ok()?)
        };
        let span = self.span(begin, i);
        self.pos = i;
        Some((number, span))
    }

    /// Reads a variable path: identifier plus `.key` / `[expr]` accesses.
    pub fn read_path(&mut self) -> Result<Option<PathToken>, WeftError> {
        let begin = self.pos;
        let first = self.read_identifier().to_string();
        if first.is_empty() {
            self.pos = begin;
            return Ok(None);
        }
        let mut segments = vec![PathSeg::Key(first)];
        loop {
            match self.peek_byte() {
                Some(b'[') => {
                    self.pos += 1;
                    self.skip_blank();
                    let inner = self
                        .read_value()?
                        .ok_or_else(|| self.error("expected value inside \"[]\"", self.pos))?;
                    self.skip_blank();
                    if self.peek_byte() != Some(b']') {
                        return Err(self.error("expected \"]\"", self.pos));
                    }
                    self.pos += 1;
                    segments.push(match inner {
                        ValueToken::Quoted(span) => PathSeg::Key(unquote(span.text())),
                        ValueToken::Number(Number::Integer(i), _) => PathSeg::Index(i),
                        other => PathSeg::Dynamic(Box::new(other)),
                    });
                }
                Some(b'.') if self.peek_byte_at(1).is_some_and(is_word_byte) => {
                    self.pos += 1;
                    let key = self.read_identifier().to_string();
                    segments.push(PathSeg::Key(key));
                }
                _ => break,
            }
        }
        Ok(Some(PathToken {
            span: self.span(begin, self.pos),
            segments,
        }))
    }

    /// Reads one value: literal, quoted string, number, range or path.
    pub fn read_value(&mut self) -> Result<Option<ValueToken>, WeftError> {
        self.skip_blank();
        match self.peek_byte() {
            None => Ok(None),
            Some(b'\'' | b'"') => Ok(self.read_quoted().map(ValueToken::Quoted)),
            Some(b'(') => self.read_range().map(Some),
            Some(b'-' | b'+' | b'0'..=b'9') => {
                Ok(self.read_number().map(|(n, span)| ValueToken::Number(n, span)))
            }
            Some(_) => {
                let begin = self.pos;
                let word = self.read_identifier();
                let literal = match word {
                    "nil" | "null" => Some(Literal::Nil),
                    "true" => Some(Literal::True),
                    "false" => Some(Literal::False),
                    "empty" => Some(Literal::Empty),
                    _ => None,
                };
                if let Some(lit) = literal {
                    if !matches!(self.peek_byte(), Some(b'.' | b'[')) {
                        return Ok(Some(ValueToken::Literal(lit, self.span(begin, self.pos))));
                    }
                }
                self.pos = begin;
                Ok(self.read_path()?.map(ValueToken::Path))
            }
        }
    }

    fn read_range(&mut self) -> Result<ValueToken, WeftError> {
        let begin = self.pos;
        self.pos += 1;
        let lhs = self
            .read_value()?
            .ok_or_else(|| self.error("invalid range expression", begin))?;
        if !self.starts_with("..") {
            return Err(self.error("invalid range expression", begin));
        }
        self.pos += 2;
        let rhs = self
            .read_value()?
            .ok_or_else(|| self.error("invalid range expression", begin))?;
        self.skip_blank();
        if self.peek_byte() != Some(b')') {
            return Err(self.error("invalid range expression", begin));
        }
        self.pos += 1;
        Ok(ValueToken::Range(
            Box::new(lhs),
            Box::new(rhs),
            self.span(begin, self.pos),
        ))
    }

    /// Reads an operator chain expression: `value (operator value)*`.
    pub fn read_expression(&mut self) -> Result<Option<Expression>, WeftError> {
        let Some(init) = self.read_value()? else {
            return Ok(None);
        };
        let mut rest = Vec::new();
        loop {
            let save = self.pos;
            self.skip_blank();
            let Some(op) = self.read_operator() else {
                self.pos = save;
                break;
            };
            self.skip_blank();
            let Some(operand) = self.read_value()? else {
                self.pos = save;
                break;
            };
            rest.push((op, operand));
        }
        Ok(Some(Expression::new(init, rest)))
    }

    /// Reads the longest operator at the cursor, if any.
    pub fn read_operator(&mut self) -> Option<String> {
        let (len, op) = self.trie.longest_match(&self.bytes()[self.pos..self.end])?;
        let op = op.to_string();
        self.pos += len;
        Some(op)
    }

    /// Reads the trailing filter chain: `| name: arg, key: arg | name ...`.
    pub fn read_filters(&mut self) -> Result<Vec<FilterToken>, WeftError> {
        let mut filters = Vec::new();
        loop {
            self.skip_blank();
            if self.peek_byte() != Some(b'|') {
                break;
            }
            self.pos += 1;
            filters.push(self.read_filter()?);
        }
        Ok(filters)
    }

    fn read_filter(&mut self) -> Result<FilterToken, WeftError> {
        self.skip_blank();
        let name = self.read_identifier().to_string();
        if name.is_empty() {
            return Err(self.error("expected filter name", self.pos));
        }
        let mut args = Vec::new();
        self.skip_blank();
        if self.peek_byte() == Some(b':') {
            self.pos += 1;
            loop {
                self.skip_blank();
                let save = self.pos;
                let ident = self.read_identifier().to_string();
                let mut keyword = false;
                if !ident.is_empty() {
                    self.skip_blank();
                    if self.peek_byte() == Some(b':') {
                        self.pos += 1;
                        let value = self.read_value()?.ok_or_else(|| {
                            self.error(format!("expected value for argument \"{ident}\""), self.pos)
                        })?;
                        args.push(FilterArgToken::Keyword(ident, value));
                        keyword = true;
                    }
                }
                if !keyword {
                    self.pos = save;
                    let Some(value) = self.read_value()? else {
                        break;
                    };
                    args.push(FilterArgToken::Positional(value));
                }
                self.skip_blank();
                if self.peek_byte() == Some(b',') {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        Ok(FilterToken { name, args })
    }

    /// Reads `key: value` hash arguments until the input runs out. With
    /// `jekyll_style` the separator is `=` instead of `:`. Bare keys get no
    /// value and later evaluate to `true`.
    pub fn read_hashes(&mut self, jekyll_style: bool) -> Result<Vec<HashToken>, WeftError> {
        let sep = if jekyll_style { b'=' } else { b':' };
        let mut hashes = Vec::new();
        loop {
            while self
                .peek_byte()
                .is_some_and(|b| is_blank_byte(b) || b == b',')
            {
                self.pos += 1;
            }
            let name = self.read_identifier().to_string();
            if name.is_empty() {
                break;
            }
            let mut value = None;
            self.skip_blank();
            if self.peek_byte() == Some(sep) {
                self.pos += 1;
                value = Some(self.read_value()?.ok_or_else(|| {
                    self.error(format!("expected value for \"{name}\""), self.pos)
                })?);
            }
            hashes.push(HashToken { name, value });
        }
        Ok(hashes)
    }

    /// Splits the whole input into HTML runs and directives, then applies
    /// whitespace control.
    pub fn read_top_level_tokens(
        &mut self,
        options: &NormalizedOptions,
    ) -> Result<Vec<TopLevelToken>, WeftError> {
        let mut tokens = Vec::new();
        let mut html_begin = self.pos;
        while self.pos < self.end {
            let at_tag = self.starts_with(&options.tag_delimiter_left);
            let at_output = self.starts_with(&options.output_delimiter_left);
            // when one delimiter prefixes the other, the longer spelling wins
            let take_output = at_output
                && (!at_tag
                    || options.output_delimiter_left.len() >= options.tag_delimiter_left.len());
            if take_output || at_tag {
                if self.pos > html_begin {
                    tokens.push(self.html_token(html_begin, self.pos));
                }
                let token = if take_output {
                    self.read_output_token(options)?
                } else {
                    self.read_tag_token(options)?
                };
                tokens.push(token);
                html_begin = self.pos;
            } else {
                self.pos += 1;
            }
        }
        if self.pos > html_begin {
            tokens.push(self.html_token(html_begin, self.pos));
        }
        whitespace_ctrl(&mut tokens, options);
        Ok(tokens)
    }

    /// Reads a partial-name template: HTML and output directives up to the
    /// first blank or comma outside a directive. Used by partial tags when
    /// dynamic names are disabled.
    pub fn read_file_name_template(
        &mut self,
        options: &NormalizedOptions,
    ) -> Result<Vec<TopLevelToken>, WeftError> {
        let mut tokens = Vec::new();
        let mut html_begin = self.pos;
        while self.pos < self.end {
            if self.starts_with(&options.output_delimiter_left) {
                if self.pos > html_begin {
                    tokens.push(self.html_token(html_begin, self.pos));
                }
                tokens.push(self.read_output_token(options)?);
                html_begin = self.pos;
            } else if self
                .peek_byte()
                .is_some_and(|b| is_blank_byte(b) || b == b',')
            {
                break;
            } else {
                self.pos += 1;
            }
        }
        if self.pos > html_begin {
            tokens.push(self.html_token(html_begin, self.pos));
        }
        Ok(tokens)
    }

    fn html_token(&self, begin: usize, end: usize) -> TopLevelToken {
        TopLevelToken::Html(HtmlToken {
            span: self.span(begin, end),
            trim_left: 0,
            trim_right: 0,
        })
    }

    fn read_tag_token(&mut self, options: &NormalizedOptions) -> Result<TopLevelToken, WeftError> {
        let begin = self.pos;
        self.pos += options.tag_delimiter_left.len();
        let close = self
            .find(&options.tag_delimiter_right)
            .ok_or_else(|| self.error("tag not closed", begin))?;
        let (content_begin, content_end, marker_left, marker_right) =
            strip_trim_markers(self.bytes(), self.pos, close);

        let mut name_begin = content_begin;
        let bytes = self.bytes();
        while name_begin < content_end && is_blank_byte(bytes[name_begin]) {
            name_begin += 1;
        }
        let mut name_end = name_begin;
        while name_end < content_end && is_word_byte(bytes[name_end]) {
            name_end += 1;
        }
        if name_end == name_begin {
            return Err(self.error("illegal tag syntax", begin));
        }
        let name = self.input[name_begin..name_end].to_string();

        self.pos = close + options.tag_delimiter_right.len();
        Ok(TopLevelToken::Tag(TagToken {
            span: self.span(begin, self.pos),
            name,
            args_begin: name_end,
            args_end: content_end,
            trim_left: marker_left || options.trim_tag_left,
            trim_right: marker_right || options.trim_tag_right,
        }))
    }

    fn read_output_token(
        &mut self,
        options: &NormalizedOptions,
    ) -> Result<TopLevelToken, WeftError> {
        let begin = self.pos;
        self.pos += options.output_delimiter_left.len();
        let close = self
            .find(&options.output_delimiter_right)
            .ok_or_else(|| self.error("output not closed", begin))?;
        let (content_begin, content_end, marker_left, marker_right) =
            strip_trim_markers(self.bytes(), self.pos, close);
        self.pos = close + options.output_delimiter_right.len();
        Ok(TopLevelToken::Output(OutputToken {
            span: self.span(begin, self.pos),
            content_begin,
            content_end,
            trim_left: marker_left || options.trim_output_left,
            trim_right: marker_right || options.trim_output_right,
        }))
    }
}

/// Strips `-` whitespace-control markers from either end of a directive's
/// content range. Returns the trimmed range plus which markers were present.
fn strip_trim_markers(bytes: &[u8], begin: usize, end: usize) -> (usize, usize, bool, bool) {
    let mut b = begin;
    let mut e = end;
    let left = b < e && bytes[b] == b'-';
    if left {
        b += 1;
    }
    let right = b < e && bytes[e - 1] == b'-';
    if right {
        e -= 1;
    }
    (b, e, left, right)
}

/// Applies whitespace control across a token stream: a directive's trim
/// flags trim the neighbouring HTML runs. Trimming is suppressed between
/// `raw` and `endraw`.
fn whitespace_ctrl(tokens: &mut [TopLevelToken], options: &NormalizedOptions) {
    let mut in_raw = false;
    for i in 0..tokens.len() {
        let (is_directive, trim_left, trim_right, raw_toggle) = match &tokens[i] {
            TopLevelToken::Html(_) => (false, false, false, None),
            TopLevelToken::Tag(t) => (
                true,
                t.trim_left,
                t.trim_right,
                match t.name.as_str() {
                    "raw" => Some(true),
                    "endraw" => Some(false),
                    _ => None,
                },
            ),
            TopLevelToken::Output(t) => (true, t.trim_left, t.trim_right, None),
        };
        if !is_directive {
            continue;
        }
        if !in_raw && trim_left && i > 0 {
            if let TopLevelToken::Html(prev) = &mut tokens[i - 1] {
                trim_html_right(prev, options.greedy);
            }
        }
        if let Some(entering) = raw_toggle {
            in_raw = entering;
        }
        if !in_raw && trim_right && i + 1 < tokens.len() {
            if let TopLevelToken::Html(next) = &mut tokens[i + 1] {
                trim_html_left(next, options.greedy);
            }
        }
    }
}

/// Trims blanks off the left edge of an HTML run. Non-greedy trimming stops
/// after inline blanks plus at most one newline.
fn trim_html_left(token: &mut HtmlToken, greedy: bool) {
    let bytes = token.span.input.as_bytes();
    let mut i = token.span.begin + token.trim_left;
    let end = token.span.end;
    if greedy {
        while i < end && is_blank_byte(bytes[i]) {
            i += 1;
        }
    } else {
        while i < end && matches!(bytes[i], b' ' | b'\t' | b'\r') {
            i += 1;
        }
        if i < end && bytes[i] == b'\n' {
            i += 1;
        }
    }
    token.trim_left = i - token.span.begin;
}

/// Trims blanks off the right edge of an HTML run. Non-greedy trimming
/// removes inline blanks only, leaving the newline that ends the line.
fn trim_html_right(token: &mut HtmlToken, greedy: bool) {
    let bytes = token.span.input.as_bytes();
    let begin = token.span.begin;
    let mut i = token.span.end - token.trim_right;
    if greedy {
        while i > begin && is_blank_byte(bytes[i - 1]) {
            i -= 1;
        }
    } else {
        while i > begin && matches!(bytes[i - 1], b' ' | b'\t') {
            i -= 1;
        }
    }
    token.trim_right = token.span.end - i;
}

/// Removes the surrounding quotes from a quoted-string lexeme and resolves
/// escape sequences.
pub fn unquote(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
