//! `{% raw %}...{% endraw %}`
//!
//! Reproduces the enclosed source exactly, delimiters included, with no
//! parsing and no whitespace trimming inside.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::Context;
use crate::engine::Engine;
use crate::parser::TokenCursor;
use crate::render::Emitter;
use crate::tokens::{TagToken, TopLevelToken};

use super::{TagFactory, TagRenderer};

pub struct RawTag;

impl TagFactory for RawTag {
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        _engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let mut text = String::new();
        while let Some(next) = cursor.next() {
            if let TopLevelToken::Tag(tag) = &next {
                if tag.name == "endraw" {
                    return Ok(Box::new(RawRenderer { text }));
                }
            }
            text.push_str(next.raw_text());
        }
        Err(WeftError::Parse {
            message: "tag \"raw\" not closed".to_string(),
            location: token.span.location(),
        })
    }
}

struct RawRenderer {
    text: String,
}

#[async_trait]
impl TagRenderer for RawRenderer {
    async fn render(
        &self,
        _ctx: &mut Context,
        emitter: &mut dyn Emitter,
        _engine: &Engine,
    ) -> Result<(), WeftError> {
        emitter.write(&self.text).await
    }
}
