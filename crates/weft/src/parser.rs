//! The parser: turns top-level tokens into template nodes.
//!
//! Parsing is a single pass over a [`TokenCursor`]. HTML runs pass through,
//! output directives become bound [`Value`]s, and tag directives dispatch
//! to their registered factory, which may consume further tokens from the
//! cursor (block tags do, up to their terminator). Any failure is wrapped
//! with the offending token's source location and aborts the parse.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use weft_core::WeftError;

use crate::engine::Engine;
use crate::tags::TagRenderer;
use crate::tokens::{HtmlToken, Source, TagToken, TopLevelToken};
use crate::value::Value;

/// A parsed template node.
pub enum Template {
    /// Literal output.
    Html(HtmlToken),
    /// An interpolation.
    Output(OutputNode),
    /// A tag invocation.
    Tag(TagNode),
}

// renderers are trait objects, so the node kind and name stand in for them
impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html(html) => f.debug_tuple("Html").field(&html.content()).finish(),
            Self::Output(_) => f.write_str("Output"),
            Self::Tag(tag) => f.debug_tuple("Tag").field(&tag.name).finish(),
        }
    }
}

/// A parsed output directive.
pub struct OutputNode {
    /// The value with its filter pipeline.
    pub value: Value,
    /// Apply the engine's output escaper; cleared when the pipeline
    /// carries the `raw` filter.
    pub escape: bool,
}

/// A parsed tag directive.
pub struct TagNode {
    /// The tag name as written.
    pub name: String,
    /// The renderer; `None` for an unknown tag in non-strict mode, which
    /// renders a placeholder comment.
    pub renderer: Option<Box<dyn TagRenderer>>,
}

/// A consumable stream of top-level tokens. Tag factories pull their block
/// bodies from it during parsing.
pub struct TokenCursor {
    tokens: VecDeque<TopLevelToken>,
}

impl TokenCursor {
    /// Wraps a token list.
    pub fn new(tokens: Vec<TopLevelToken>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }

    /// Takes the next token.
    pub fn next(&mut self) -> Option<TopLevelToken> {
        self.tokens.pop_front()
    }

    /// True when every token has been consumed.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Parses token streams against an engine's registries and options.
pub struct Parser<'e> {
    engine: &'e Engine,
}

impl<'e> Parser<'e> {
    /// Creates a parser bound to the engine.
    pub const fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Tokenizes and parses a full document.
    pub fn parse(&self, text: &str, file: Option<&str>) -> Result<Vec<Template>, WeftError> {
        let options = self.engine.options();
        let source: Source = Arc::from(text);
        let mut tokenizer = crate::lexer::Tokenizer::new(
            source,
            &options.operator_trie,
            file.map(Arc::from),
        );
        let tokens = tokenizer.read_top_level_tokens(options)?;
        let mut cursor = TokenCursor::new(tokens);
        self.parse_tokens(&mut cursor)
    }

    /// Parses every remaining token on the cursor.
    pub fn parse_tokens(&self, cursor: &mut TokenCursor) -> Result<Vec<Template>, WeftError> {
        let mut templates = Vec::new();
        while let Some(token) = cursor.next() {
            templates.push(self.parse_token(token, cursor)?);
        }
        Ok(templates)
    }

    /// Parses one token; tag factories may consume more from the cursor.
    pub fn parse_token(
        &self,
        token: TopLevelToken,
        cursor: &mut TokenCursor,
    ) -> Result<Template, WeftError> {
        match token {
            TopLevelToken::Html(html) => Ok(Template::Html(html)),
            TopLevelToken::Output(output) => {
                let location = output.span.location();
                let value = Value::parse(
                    output.content(),
                    self.engine.options(),
                    self.engine.filters(),
                )
                .map_err(|err| err.into_parse(location))?;
                let escape = self.engine.options().escaper.is_some() && !value.has_filter("raw");
                Ok(Template::Output(OutputNode { value, escape }))
            }
            TopLevelToken::Tag(tag) => self.parse_tag(&tag, cursor),
        }
    }

    fn parse_tag(
        &self,
        tag: &TagToken,
        cursor: &mut TokenCursor,
    ) -> Result<Template, WeftError> {
        let location = tag.span.location();
        match self.engine.tags().get(&tag.name) {
            Some(factory) => {
                let renderer = factory
                    .parse(tag, cursor, self.engine)
                    .map_err(|err| err.into_parse(location))?;
                Ok(Template::Tag(TagNode {
                    name: tag.name.clone(),
                    renderer: Some(renderer),
                }))
            }
            None if self.engine.options().strict_tags => {
                Err(WeftError::UnknownTag(tag.name.clone()).into_parse(location))
            }
            None => {
                tracing::warn!(tag = %tag.name, "unknown tag, rendering placeholder");
                Ok(Template::Tag(TagNode {
                    name: tag.name.clone(),
                    renderer: None,
                }))
            }
        }
    }

    /// Parses the body of a block tag up to one of the terminator tags.
    /// Returns the body and the terminating token. Running out of tokens
    /// fails, naming the unclosed opener.
    pub fn parse_until(
        &self,
        cursor: &mut TokenCursor,
        terminators: &[&str],
        opening: &TagToken,
    ) -> Result<(Vec<Template>, TagToken), WeftError> {
        let mut body = Vec::new();
        while let Some(token) = cursor.next() {
            if let TopLevelToken::Tag(tag) = &token {
                if terminators.contains(&tag.name.as_str()) {
                    return Ok((body, tag.clone()));
                }
            }
            body.push(self.parse_token(token, cursor)?);
        }
        Err(WeftError::Parse {
            message: format!("tag \"{}\" not closed", opening.name),
            location: opening.span.location(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;

    #[test]
    fn test_parse_document_shape() {
        let engine = Engine::new();
        let templates = Parser::new(&engine)
            .parse("a{{ x }}{% assign y = 1 %}", None)
            .unwrap();
        assert_eq!(templates.len(), 3);
        assert!(matches!(&templates[0], Template::Html(_)));
        assert!(matches!(&templates[1], Template::Output(_)));
        assert!(matches!(&templates[2], Template::Tag(t) if t.name == "assign"));
        assert_eq!(format!("{:?}", templates[2]), "Tag(\"assign\")");
    }

    #[test]
    fn test_unknown_tag_strict_fails_with_location() {
        let engine = Engine::with_options(EngineOptions {
            strict_tags: true,
            ..EngineOptions::default()
        })
        .unwrap();
        let err = Parser::new(&engine).parse("\n{% nope %}", None).unwrap_err();
        match err {
            WeftError::Parse { message, location } => {
                assert!(message.contains("nope"));
                assert_eq!(location.line, 2);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_lenient_keeps_placeholder() {
        let engine = Engine::new();
        let templates = Parser::new(&engine).parse("{% nope %}", None).unwrap();
        assert!(matches!(
            &templates[0],
            Template::Tag(t) if t.name == "nope" && t.renderer.is_none()
        ));
    }

    #[test]
    fn test_unclosed_block_fails() {
        let engine = Engine::new();
        let err = Parser::new(&engine).parse("{% if x %}body", None).unwrap_err();
        match err {
            WeftError::Parse { message, .. } => assert!(message.contains("not closed")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
