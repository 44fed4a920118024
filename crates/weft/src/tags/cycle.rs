//! `{% cycle 'a', 'b' %}` and `{% cycle group: 'a', 'b' %}`
//!
//! Emits the next candidate on every render, rotating through the list.
//! Rotation state lives in the context registers, keyed by the evaluated
//! group and the candidates' source text, so repeated tags with the same
//! spelling share one position.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::Context;
use crate::engine::Engine;
use crate::expression::eval_value_token;
use crate::parser::TokenCursor;
use crate::render::Emitter;
use crate::tokens::{TagToken, ValueToken};

use super::{args_tokenizer, TagFactory, TagRenderer};

pub struct CycleTag;

impl TagFactory for CycleTag {
    fn parse(
        &self,
        token: &TagToken,
        _cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let mut tokenizer = args_tokenizer(token, engine);
        tokenizer.skip_blank();
        let first = tokenizer
            .read_value()?
            .ok_or_else(|| WeftError::Render("expected cycle candidates".to_string()))?;

        let mut group = None;
        let mut candidates = Vec::new();
        tokenizer.skip_blank();
        if tokenizer.accept(b':') {
            group = Some(first);
        } else {
            candidates.push(first);
        }
        loop {
            tokenizer.skip_blank();
            tokenizer.accept(b',');
            tokenizer.skip_blank();
            match tokenizer.read_value()? {
                Some(candidate) => candidates.push(candidate),
                None => break,
            }
        }
        if candidates.is_empty() {
            return Err(WeftError::Render("expected cycle candidates".to_string()));
        }
        Ok(Box::new(CycleRenderer { group, candidates }))
    }
}

struct CycleRenderer {
    group: Option<ValueToken>,
    candidates: Vec<ValueToken>,
}

#[async_trait]
impl TagRenderer for CycleRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        _engine: &Engine,
    ) -> Result<(), WeftError> {
        let group = match &self.group {
            Some(token) => eval_value_token(token, ctx, false)?.to_display_string(),
            None => String::new(),
        };
        let spellings: Vec<&str> = self.candidates.iter().map(ValueToken::text).collect();
        let key = format!("cycle:{group}:{}", spellings.join(","));

        let slot = ctx.registers_mut().cycles.entry(key).or_insert(0);
        let index = *slot;
        *slot = (index + 1) % self.candidates.len();

        let value = eval_value_token(&self.candidates[index], ctx, false)?;
        emitter.write(&value.to_display_string()).await?;
        Ok(())
    }
}
