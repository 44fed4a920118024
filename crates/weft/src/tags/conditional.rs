//! `{% if %}` / `{% elsif %}` / `{% else %}` and `{% unless %}`
//!
//! Conditions are operator-chain expressions evaluated with template
//! truthiness. Under `lenient_if` an undefined variable in a condition is
//! nil rather than a strict-mode failure.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::Context;
use crate::engine::Engine;
use crate::expression::Expression;
use crate::parser::{Parser, Template, TokenCursor};
use crate::render::{render_templates, Emitter};
use crate::tokens::TagToken;

use super::{args_tokenizer, TagFactory, TagRenderer};

struct Branch {
    condition: Expression,
    body: Vec<Template>,
}

struct ConditionalRenderer {
    branches: Vec<Branch>,
    else_body: Option<Vec<Template>>,
    /// `unless` flips the first branch's test.
    negate_first: bool,
}

fn parse_conditional(
    token: &TagToken,
    cursor: &mut TokenCursor,
    engine: &Engine,
    end_tag: &str,
    negate_first: bool,
) -> Result<Box<dyn TagRenderer>, WeftError> {
    let parser = Parser::new(engine);
    let mut tokenizer = args_tokenizer(token, engine);
    let mut pending = Some(tokenizer.read_expression()?.ok_or_else(|| {
        WeftError::Render(format!("invalid \"{}\" condition", token.name))
    })?);
    let mut branches = Vec::new();
    let mut else_body = None;
    while let Some(condition) = pending.take() {
        let (body, closer) = parser.parse_until(cursor, &["elsif", "else", end_tag], token)?;
        branches.push(Branch { condition, body });
        match closer.name.as_str() {
            "elsif" => {
                let mut tokenizer = args_tokenizer(&closer, engine);
                pending = Some(tokenizer.read_expression()?.ok_or_else(|| {
                    WeftError::Render("invalid \"elsif\" condition".to_string())
                })?);
            }
            "else" => {
                let (body, _) = parser.parse_until(cursor, &[end_tag], token)?;
                else_body = Some(body);
            }
            _ => {}
        }
    }
    Ok(Box::new(ConditionalRenderer {
        branches,
        else_body,
        negate_first,
    }))
}

#[async_trait]
impl TagRenderer for ConditionalRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        let lenient = ctx.lenient_if;
        for (i, branch) in self.branches.iter().enumerate() {
            let value = branch
                .condition
                .evaluate(ctx, &engine.options().operators, lenient)?;
            let mut truthy = value.is_truthy();
            if i == 0 && self.negate_first {
                truthy = !truthy;
            }
            if truthy {
                return render_templates(engine, &branch.body, ctx, emitter).await;
            }
        }
        if let Some(body) = &self.else_body {
            return render_templates(engine, body, ctx, emitter).await;
        }
        Ok(())
    }
}

pub struct IfTag;

impl TagFactory for IfTag {
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        parse_conditional(token, cursor, engine, "endif", false)
    }
}

pub struct UnlessTag;

impl TagFactory for UnlessTag {
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        parse_conditional(token, cursor, engine, "endunless", true)
    }
}
