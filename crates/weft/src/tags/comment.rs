//! `{% comment %}...{% endcomment %}`
//!
//! The body is consumed at parse time and never rendered. Directives
//! inside a comment are not parsed, so a commented-out block may contain
//! broken tags.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::Context;
use crate::engine::Engine;
use crate::parser::TokenCursor;
use crate::render::Emitter;
use crate::tokens::{TagToken, TopLevelToken};

use super::{TagFactory, TagRenderer};

pub struct CommentTag;

impl TagFactory for CommentTag {
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        _engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        while let Some(next) = cursor.next() {
            if let TopLevelToken::Tag(tag) = &next {
                if tag.name == "endcomment" {
                    return Ok(Box::new(CommentRenderer));
                }
            }
        }
        Err(WeftError::Parse {
            message: "tag \"comment\" not closed".to_string(),
            location: token.span.location(),
        })
    }
}

struct CommentRenderer;

#[async_trait]
impl TagRenderer for CommentRenderer {
    async fn render(
        &self,
        _ctx: &mut Context,
        _emitter: &mut dyn Emitter,
        _engine: &Engine,
    ) -> Result<(), WeftError> {
        Ok(())
    }
}
