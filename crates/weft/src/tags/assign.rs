//! `{% assign name = value | filters %}`
//!
//! Writes to the outermost template scope, so an assignment inside a loop
//! body survives the loop.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::Context;
use crate::engine::Engine;
use crate::parser::TokenCursor;
use crate::render::Emitter;
use crate::tokens::TagToken;
use crate::value::Value;

use super::{args_tokenizer, TagFactory, TagRenderer};

pub struct AssignTag;

impl TagFactory for AssignTag {
    fn parse(
        &self,
        token: &TagToken,
        _cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let mut tokenizer = args_tokenizer(token, engine);
        tokenizer.skip_blank();
        let name = tokenizer.read_identifier().to_string();
        if name.is_empty() {
            return Err(WeftError::Render("expected variable name".to_string()));
        }
        tokenizer.skip_blank();
        if !tokenizer.remaining().starts_with('=') {
            return Err(WeftError::Render(format!(
                "expected \"=\" after \"{name}\""
            )));
        }
        tokenizer.pos += 1;
        let value = Value::parse(tokenizer.remaining(), engine.options(), engine.filters())?;
        Ok(Box::new(AssignRenderer { name, value }))
    }
}

struct AssignRenderer {
    name: String,
    value: Value,
}

#[async_trait]
impl TagRenderer for AssignRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        _emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        let value = self
            .value
            .evaluate(ctx, &engine.options().operators, false)
            .await?;
        ctx.bottom_mut().insert(self.name.clone(), value);
        Ok(())
    }
}
