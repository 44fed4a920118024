//! `{% increment name %}` and `{% decrement name %}`
//!
//! Stateful counters living in the render environments, shared across the
//! whole render rather than scoped like `assign`. `increment` emits the
//! current value then adds one (first emission is 0); `decrement` subtracts
//! first (first emission is -1).

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::{Context, ContextValue};
use crate::engine::Engine;
use crate::parser::TokenCursor;
use crate::render::Emitter;
use crate::tokens::TagToken;

use super::{args_tokenizer, TagFactory, TagRenderer};

fn parse_counter_name(token: &TagToken, engine: &Engine) -> Result<String, WeftError> {
    let mut tokenizer = args_tokenizer(token, engine);
    tokenizer.skip_blank();
    let name = tokenizer.read_identifier().to_string();
    if name.is_empty() {
        return Err(WeftError::Render("expected counter name".to_string()));
    }
    Ok(name)
}

fn counter_value(ctx: &mut Context, name: &str) -> i64 {
    ctx.environments_mut()
        .get(name)
        .and_then(ContextValue::as_integer)
        .unwrap_or(0)
}

pub struct IncrementTag;

impl TagFactory for IncrementTag {
    fn parse(
        &self,
        token: &TagToken,
        _cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        Ok(Box::new(IncrementRenderer {
            name: parse_counter_name(token, engine)?,
        }))
    }
}

struct IncrementRenderer {
    name: String,
}

#[async_trait]
impl TagRenderer for IncrementRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        _engine: &Engine,
    ) -> Result<(), WeftError> {
        let current = counter_value(ctx, &self.name);
        ctx.environments_mut()
            .insert(self.name.clone(), ContextValue::Integer(current + 1));
        emitter.write(&current.to_string()).await
    }
}

pub struct DecrementTag;

impl TagFactory for DecrementTag {
    fn parse(
        &self,
        token: &TagToken,
        _cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        Ok(Box::new(DecrementRenderer {
            name: parse_counter_name(token, engine)?,
        }))
    }
}

struct DecrementRenderer {
    name: String,
}

#[async_trait]
impl TagRenderer for DecrementRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        _engine: &Engine,
    ) -> Result<(), WeftError> {
        let next = counter_value(ctx, &self.name) - 1;
        ctx.environments_mut()
            .insert(self.name.clone(), ContextValue::Integer(next));
        emitter.write(&next.to_string()).await
    }
}
