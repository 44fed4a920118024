//! `{% case %}` / `{% when %}` / `{% else %}` / `{% endcase %}`
//!
//! The first `when` branch carrying a value equal to the target renders;
//! `when` accepts multiple values separated by commas or `or`. Content
//! between `case` and the first `when` is discarded.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::Context;
use crate::engine::Engine;
use crate::expression::eval_value_token;
use crate::parser::{Parser, Template, TokenCursor};
use crate::render::{render_templates, Emitter};
use crate::tokens::{TagToken, ValueToken};
use crate::value::Value;

use super::{args_tokenizer, TagFactory, TagRenderer};

pub struct CaseTag;

struct WhenBranch {
    values: Vec<ValueToken>,
    body: Vec<Template>,
}

struct CaseRenderer {
    target: Value,
    branches: Vec<WhenBranch>,
    else_body: Option<Vec<Template>>,
}

impl TagFactory for CaseTag {
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let target = Value::parse(token.args().trim(), engine.options(), engine.filters())?;
        let parser = Parser::new(engine);
        let (_, mut closer) = parser.parse_until(cursor, &["when", "else", "endcase"], token)?;
        let mut branches = Vec::new();
        let mut else_body = None;
        while closer.name == "when" {
            let values = parse_when_values(&closer, engine)?;
            let (body, next) = parser.parse_until(cursor, &["when", "else", "endcase"], token)?;
            branches.push(WhenBranch { values, body });
            closer = next;
        }
        if closer.name == "else" {
            let (body, _) = parser.parse_until(cursor, &["endcase"], token)?;
            else_body = Some(body);
        }
        Ok(Box::new(CaseRenderer {
            target,
            branches,
            else_body,
        }))
    }
}

fn parse_when_values(token: &TagToken, engine: &Engine) -> Result<Vec<ValueToken>, WeftError> {
    let mut tokenizer = args_tokenizer(token, engine);
    let mut values = Vec::new();
    loop {
        let Some(value) = tokenizer.read_value()? else {
            break;
        };
        values.push(value);
        tokenizer.skip_blank();
        if tokenizer.remaining().starts_with(',') {
            tokenizer.pos += 1;
            continue;
        }
        let save = tokenizer.pos;
        if tokenizer.read_identifier() != "or" {
            tokenizer.pos = save;
            break;
        }
    }
    if values.is_empty() {
        return Err(WeftError::Render("\"when\" requires a value".to_string()));
    }
    Ok(values)
}

#[async_trait]
impl TagRenderer for CaseRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        let target = self
            .target
            .evaluate(ctx, &engine.options().operators, ctx.lenient_if)
            .await?;
        for branch in &self.branches {
            for value in &branch.values {
                if eval_value_token(value, ctx, ctx.lenient_if)? == target {
                    return render_templates(engine, &branch.body, ctx, emitter).await;
                }
            }
        }
        if let Some(body) = &self.else_body {
            return render_templates(engine, body, ctx, emitter).await;
        }
        Ok(())
    }
}
