//! `{% break %}` and `{% continue %}`
//!
//! Raise an interrupt in the registers; the interpreter stops walking
//! nodes until the nearest enclosing loop consumes it.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::{Context, Interrupt};
use crate::engine::Engine;
use crate::parser::TokenCursor;
use crate::render::Emitter;
use crate::tokens::TagToken;

use super::{TagFactory, TagRenderer};

pub struct BreakTag;

impl TagFactory for BreakTag {
    fn parse(
        &self,
        _token: &TagToken,
        _cursor: &mut TokenCursor,
        _engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        Ok(Box::new(InterruptRenderer(Interrupt::Break)))
    }
}

pub struct ContinueTag;

impl TagFactory for ContinueTag {
    fn parse(
        &self,
        _token: &TagToken,
        _cursor: &mut TokenCursor,
        _engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        Ok(Box::new(InterruptRenderer(Interrupt::Continue)))
    }
}

struct InterruptRenderer(Interrupt);

#[async_trait]
impl TagRenderer for InterruptRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        _emitter: &mut dyn Emitter,
        _engine: &Engine,
    ) -> Result<(), WeftError> {
        ctx.registers_mut().interrupt = Some(self.0);
        Ok(())
    }
}
