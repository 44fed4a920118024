//! `{% capture name %}...{% endcapture %}`
//!
//! Renders its body to a string and assigns it like `assign` does.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::{Context, ContextValue};
use crate::engine::Engine;
use crate::lexer::unquote;
use crate::parser::{Parser, Template, TokenCursor};
use crate::render::{render_to_string, Emitter};
use crate::tokens::TagToken;

use super::{args_tokenizer, TagFactory, TagRenderer};

pub struct CaptureTag;

impl TagFactory for CaptureTag {
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let mut tokenizer = args_tokenizer(token, engine);
        tokenizer.skip_blank();
        let name = match tokenizer.read_quoted() {
            Some(span) => unquote(span.text()),
            None => tokenizer.read_identifier().to_string(),
        };
        if name.is_empty() {
            return Err(WeftError::Render("expected capture name".to_string()));
        }
        let (body, _) = Parser::new(engine).parse_until(cursor, &["endcapture"], token)?;
        Ok(Box::new(CaptureRenderer { name, body }))
    }
}

struct CaptureRenderer {
    name: String,
    body: Vec<Template>,
}

#[async_trait]
impl TagRenderer for CaptureRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        _emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        let html = render_to_string(engine, &self.body, ctx).await?;
        ctx.bottom_mut()
            .insert(self.name.clone(), ContextValue::Str(html));
        Ok(())
    }
}
