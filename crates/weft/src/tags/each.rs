//! `{% each item in collection %}` ... `{% else %}` ... `{% endeach %}`
//!
//! Iterates arrays, object entries (as `[key, value]` pairs, key-sorted
//! for determinism) and ranges, exposing the metadata drop as `loop`.
//! The `else` branch renders for an empty collection, before modifiers
//! apply. Modifiers `offset`, `limit` and `reversed` reshape the
//! sequence; `offset: continue` resumes where the previous loop over the
//! same variable and collection text stopped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::{Context, ContextValue, DropObject, Interrupt, Scope};
use crate::engine::Engine;
use crate::expression::eval_value_token;
use crate::parser::{Parser, Template, TokenCursor};
use crate::render::{render_templates, Emitter};
use crate::tokens::{TagToken, ValueToken};

use super::{args_tokenizer, TagFactory, TagHash, TagRenderer};

/// The loop-metadata object, bound as `loop` inside `each` bodies and as
/// `forloop` inside `render ... for` partials.
#[derive(Debug)]
pub struct ForloopDrop {
    length: usize,
    index: AtomicUsize,
    name: String,
}

impl ForloopDrop {
    /// Creates the drop for a loop of `length` iterations.
    pub fn new(length: usize, name: String) -> Self {
        Self {
            length,
            index: AtomicUsize::new(0),
            name,
        }
    }

    /// Advances to the next iteration.
    pub fn next(&self) {
        self.index.fetch_add(1, Ordering::Relaxed);
    }

    fn i(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }
}

impl DropObject for ForloopDrop {
    fn get(&self, key: &str) -> Option<ContextValue> {
        let i = self.i();
        Some(match key {
            "index" => ContextValue::from(i + 1),
            "index0" => ContextValue::from(i),
            "rindex" => ContextValue::from(self.length.saturating_sub(i)),
            "rindex0" => ContextValue::from(self.length.saturating_sub(i + 1)),
            "first" => ContextValue::Bool(i == 0),
            "last" => ContextValue::Bool(i + 1 == self.length),
            "length" => ContextValue::from(self.length),
            "name" => ContextValue::from(self.name.clone()),
            _ => return None,
        })
    }
}

pub struct EachTag;

impl TagFactory for EachTag {
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let mut tokenizer = args_tokenizer(token, engine);
        tokenizer.skip_blank();
        let variable = tokenizer.read_identifier().to_string();
        if variable.is_empty() {
            return Err(WeftError::Render("expected loop variable".to_string()));
        }
        tokenizer.skip_blank();
        if tokenizer.read_identifier() != "in" {
            return Err(WeftError::Render(format!(
                "expected \"in\" after \"{variable}\""
            )));
        }
        let collection = tokenizer
            .read_value()?
            .ok_or_else(|| WeftError::Render("expected collection".to_string()))?;
        let collection_text = collection.text().to_string();
        let modifiers = TagHash::parse(&mut tokenizer, false)?;

        let parser = Parser::new(engine);
        let (body, closer) = parser.parse_until(cursor, &["else", "endeach"], token)?;
        let else_body = if closer.name == "else" {
            Some(parser.parse_until(cursor, &["endeach"], token)?.0)
        } else {
            None
        };
        Ok(Box::new(EachRenderer {
            variable,
            collection,
            collection_text,
            modifiers,
            body,
            else_body,
        }))
    }
}

struct EachRenderer {
    variable: String,
    collection: ValueToken,
    collection_text: String,
    modifiers: TagHash,
    body: Vec<Template>,
    else_body: Option<Vec<Template>>,
}

impl EachRenderer {
    fn continue_key(&self) -> String {
        format!("continue-{}-{}", self.variable, self.collection_text)
    }
}

#[async_trait]
impl TagRenderer for EachRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        let value = eval_value_token(&self.collection, ctx, ctx.lenient_if)?;
        let mut entries = to_enumerable(&value);

        // the else branch keys off the collection itself, not the
        // modifier-reshaped sequence
        if entries.is_empty() {
            if let Some(body) = &self.else_body {
                return render_templates(engine, body, ctx, emitter).await;
            }
            return Ok(());
        }

        let continue_key = self.continue_key();
        let resume_at = ctx
            .registers()
            .continues
            .get(&continue_key)
            .copied()
            .unwrap_or(0);

        // `offset: continue` resolves against this scope
        ctx.push(Scope::from([(
            "continue".to_string(),
            ContextValue::Integer(resume_at),
        )]));
        let hash = self.modifiers.evaluate(ctx);
        ctx.pop();
        let hash = hash?;

        let mut offset_used = 0usize;
        for modifier in self.modifier_order(engine) {
            match modifier {
                "offset" => {
                    if let Some(n) = hash.get("offset").and_then(ContextValue::as_integer) {
                        let n = usize::try_from(n.max(0)).unwrap_or(0);
                        offset_used = n;
                        entries.drain(..n.min(entries.len()));
                    }
                }
                "limit" => {
                    if let Some(n) = hash.get("limit").and_then(ContextValue::as_integer) {
                        entries.truncate(usize::try_from(n.max(0)).unwrap_or(0));
                    }
                }
                "reversed" => {
                    if hash.get("reversed").is_some_and(ContextValue::is_truthy) {
                        entries.reverse();
                    }
                }
                _ => {}
            }
        }
        ctx.registers_mut().continues.insert(
            continue_key,
            i64::try_from(offset_used + entries.len()).unwrap_or(i64::MAX),
        );

        if entries.is_empty() {
            return Ok(());
        }

        let forloop = Arc::new(ForloopDrop::new(
            entries.len(),
            format!("{}-{}", self.variable, self.collection_text),
        ));
        ctx.push(Scope::from([
            ("loop".to_string(), ContextValue::Drop(forloop.clone())),
            (self.variable.clone(), ContextValue::Nil),
        ]));
        let mut result = Ok(());
        for entry in entries {
            if emitter.closed() {
                break;
            }
            if let Some(scope) = ctx.last_mut() {
                scope.insert(self.variable.clone(), entry);
            }
            result = render_templates(engine, &self.body, ctx, emitter).await;
            if result.is_err() {
                break;
            }
            match ctx.registers_mut().interrupt.take() {
                Some(Interrupt::Break) => break,
                Some(Interrupt::Continue) | None => {}
            }
            forloop.next();
        }
        ctx.pop();
        result
    }
}

impl EachRenderer {
    /// Modifier application order: fixed offset, limit, reversed, or the
    /// hash's own order under `ordered_filter_parameters`.
    fn modifier_order(&self, engine: &Engine) -> Vec<&str> {
        if engine.options().ordered_filter_parameters {
            self.modifiers
                .names()
                .filter(|n| matches!(*n, "offset" | "limit" | "reversed"))
                .collect()
        } else {
            vec!["offset", "limit", "reversed"]
        }
    }
}

/// Coerces a value into the sequence a loop walks.
pub(crate) fn to_enumerable(value: &ContextValue) -> Vec<ContextValue> {
    match value {
        ContextValue::Array(items) => items.clone(),
        ContextValue::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|k| {
                    ContextValue::Array(vec![
                        ContextValue::Str(k.clone()),
                        map[k].clone(),
                    ])
                })
                .collect()
        }
        ContextValue::Str(s) if !s.is_empty() => vec![ContextValue::Str(s.clone())],
        _ => Vec::new(),
    }
}
