//! `{% echo value | filters %}`
//!
//! Writes a value like an output directive. The engine's output escaper
//! does not apply; `echo` emits the display string as-is.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::Context;
use crate::engine::Engine;
use crate::parser::TokenCursor;
use crate::render::Emitter;
use crate::tokens::TagToken;
use crate::value::Value;

use super::{TagFactory, TagRenderer};

pub struct EchoTag;

impl TagFactory for EchoTag {
    fn parse(
        &self,
        token: &TagToken,
        _cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let args = token.args().trim();
        if args.is_empty() {
            return Ok(Box::new(EchoRenderer { value: None }));
        }
        let value = Value::parse(args, engine.options(), engine.filters())?;
        Ok(Box::new(EchoRenderer { value: Some(value) }))
    }
}

struct EchoRenderer {
    value: Option<Value>,
}

#[async_trait]
impl TagRenderer for EchoRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        if let Some(value) = &self.value {
            let out = value
                .evaluate(ctx, &engine.options().operators, false)
                .await?;
            emitter.write(&out.to_display_string()).await?;
        }
        Ok(())
    }
}
