//! Partial rendering: `{% include %}` and `{% render %}`, plus the file
//! path grammar they share with `layout`.
//!
//! `include` renders the partial in the surrounding scope (with its hash
//! arguments pushed on top); `render` builds an isolated child context
//! that sees only engine globals and the explicitly passed bindings.
//!
//! With `dynamic_partials` a quoted name may itself be a template
//! (`"parts/{{ name }}"`), an unquoted name is a variable resolved at
//! render time, and the literal `none` means "no file". Without it the
//! whole argument up to the first blank is a filename template.

use std::sync::Arc;

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::{Context, ContextValue, Scope};
use crate::engine::Engine;
use crate::expression::eval_value_token;
use crate::lexer::{unquote, Tokenizer};
use crate::loader::LookupType;
use crate::parser::{Parser, Template, TokenCursor};
use crate::render::{render_templates, render_to_string, Emitter};
use crate::tokens::{TagToken, ValueToken};

use super::each::{to_enumerable, ForloopDrop};
use super::{args_tokenizer, TagFactory, TagHash, TagRenderer};

/// A parsed partial reference.
pub(crate) enum FilePath {
    /// A fixed name known at parse time.
    Literal(String),
    /// A variable resolved at render time.
    Dynamic(ValueToken),
    /// A filename template rendered at render time.
    Template(Vec<Template>),
    /// The literal `none`.
    None,
}

/// Parses a partial reference at the tokenizer's position.
pub(crate) fn parse_file_path(
    tokenizer: &mut Tokenizer<'_>,
    engine: &Engine,
) -> Result<FilePath, WeftError> {
    if engine.options().dynamic_partials {
        tokenizer.skip_blank();
        let value = tokenizer
            .read_value()?
            .ok_or_else(|| WeftError::Render("illegal file path".to_string()))?;
        if value.text() == "none" {
            return Ok(FilePath::None);
        }
        if let ValueToken::Quoted(span) = &value {
            let text = unquote(span.text());
            let templates = Parser::new(engine).parse(&text, None)?;
            return Ok(collapse_static(templates, &text));
        }
        return Ok(FilePath::Dynamic(value));
    }
    tokenizer.skip_blank();
    let begin = tokenizer.pos;
    let tokens = tokenizer.read_file_name_template(engine.options())?;
    let text = tokenizer.source_slice(begin, tokenizer.pos);
    let mut cursor = TokenCursor::new(tokens);
    let templates = Parser::new(engine).parse_tokens(&mut cursor)?;
    Ok(collapse_static(templates, &text))
}

/// A filename template with no interpolation is just a literal name.
fn collapse_static(templates: Vec<Template>, text: &str) -> FilePath {
    if templates.iter().all(|t| matches!(t, Template::Html(_))) {
        FilePath::Literal(text.to_string())
    } else {
        FilePath::Template(templates)
    }
}

/// Resolves a parsed reference to a concrete name, or `None` for the
/// `none` literal.
pub(crate) async fn render_file_path(
    path: &FilePath,
    ctx: &mut Context,
    engine: &Engine,
) -> Result<Option<String>, WeftError> {
    match path {
        FilePath::None => Ok(None),
        FilePath::Literal(name) => Ok(Some(name.clone())),
        FilePath::Dynamic(token) => Ok(Some(
            eval_value_token(token, ctx, false)?.to_display_string(),
        )),
        FilePath::Template(templates) => {
            Ok(Some(render_to_string(engine, templates, ctx).await?))
        }
    }
}

fn required_file_path(name: Option<String>) -> Result<String, WeftError> {
    match name {
        Some(name) if !name.is_empty() => Ok(name),
        Some(_) | None => Err(WeftError::Render("illegal file path".to_string())),
    }
}

pub struct IncludeTag;

impl TagFactory for IncludeTag {
    fn parse(
        &self,
        token: &TagToken,
        _cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let jekyll = engine.options().jekyll_include;
        let mut tokenizer = args_tokenizer(token, engine);
        let file = parse_file_path(&mut tokenizer, engine)?;
        let mut with_value = None;
        if !jekyll {
            tokenizer.skip_blank();
            let save = tokenizer.pos;
            if tokenizer.read_identifier() == "with" {
                tokenizer.skip_blank();
                if tokenizer.remaining().starts_with(':') {
                    tokenizer.pos = save;
                } else {
                    with_value = tokenizer.read_value()?;
                    if with_value.is_none() {
                        tokenizer.pos = save;
                    }
                }
            } else {
                tokenizer.pos = save;
            }
        }
        let hash = TagHash::parse(&mut tokenizer, jekyll)?;
        Ok(Box::new(IncludeRenderer {
            file,
            with_value,
            hash,
            current_file: token.span.file.as_ref().map(|f| f.to_string()),
        }))
    }
}

struct IncludeRenderer {
    file: FilePath,
    with_value: Option<ValueToken>,
    hash: TagHash,
    current_file: Option<String>,
}

#[async_trait]
impl TagRenderer for IncludeRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        let name = required_file_path(render_file_path(&self.file, ctx, engine).await?)?;
        let templates = engine
            .parse_file_with(
                &name,
                LookupType::Partials,
                ctx.sync,
                self.current_file.as_deref(),
            )
            .await?;

        // the partial gets fresh block state; ours comes back afterwards
        let saved_blocks = ctx.take_blocks();
        let result = async {
            let mut scope = self.hash.evaluate(ctx)?;
            if let Some(with) = &self.with_value {
                scope.insert(name.clone(), eval_value_token(with, ctx, false)?);
            }
            if engine.options().jekyll_include {
                scope = Scope::from([(
                    "include".to_string(),
                    ContextValue::Object(scope),
                )]);
            }
            ctx.push(scope);
            let rendered = render_templates(engine, &templates, ctx, emitter).await;
            ctx.pop();
            rendered
        }
        .await;
        ctx.restore_blocks(saved_blocks);
        result
    }
}

struct Binding {
    value: ValueToken,
    alias: Option<String>,
}

pub struct RenderTag;

impl TagFactory for RenderTag {
    fn parse(
        &self,
        token: &TagToken,
        _cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let mut tokenizer = args_tokenizer(token, engine);
        let file = parse_file_path(&mut tokenizer, engine)?;
        let mut with = None;
        let mut for_each = None;
        loop {
            tokenizer.skip_blank();
            let save = tokenizer.pos;
            let keyword = tokenizer.read_identifier().to_string();
            if (keyword == "with" || keyword == "for")
                && !tokenizer.remaining().trim_start().starts_with(':')
            {
                if let Some(value) = tokenizer.read_value()? {
                    tokenizer.skip_blank();
                    let save_as = tokenizer.pos;
                    let mut alias = None;
                    if tokenizer.read_identifier() == "as" {
                        tokenizer.skip_blank();
                        let name = tokenizer.read_identifier().to_string();
                        if name.is_empty() {
                            tokenizer.pos = save_as;
                        } else {
                            alias = Some(name);
                        }
                    } else {
                        tokenizer.pos = save_as;
                    }
                    let binding = Binding { value, alias };
                    if keyword == "with" {
                        with = Some(binding);
                    } else {
                        for_each = Some(binding);
                    }
                    tokenizer.skip_blank();
                    if tokenizer.remaining().starts_with(',') {
                        tokenizer.pos += 1;
                    }
                    continue;
                }
            }
            tokenizer.pos = save;
            break;
        }
        let hash = TagHash::parse(&mut tokenizer, false)?;
        Ok(Box::new(RenderRenderer {
            file,
            with,
            for_each,
            hash,
            current_file: token.span.file.as_ref().map(|f| f.to_string()),
        }))
    }
}

struct RenderRenderer {
    file: FilePath,
    with: Option<Binding>,
    for_each: Option<Binding>,
    hash: TagHash,
    current_file: Option<String>,
}

#[async_trait]
impl TagRenderer for RenderRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        let name = required_file_path(render_file_path(&self.file, ctx, engine).await?)?;
        let templates = engine
            .parse_file_with(
                &name,
                LookupType::Partials,
                ctx.sync,
                self.current_file.as_deref(),
            )
            .await?;

        // bindings evaluate against the caller; the child sees nothing else
        let mut scope = self.hash.evaluate(ctx)?;
        if let Some(with) = &self.with {
            let value = eval_value_token(&with.value, ctx, false)?;
            let key = with.alias.clone().unwrap_or_else(|| name.clone());
            scope.insert(key, value);
        }

        let mut child = Context::new(Scope::new(), ctx.globals().clone());
        child.sync = ctx.sync;
        child.strict_variables = ctx.strict_variables;
        child.own_property_only = ctx.own_property_only;
        child.lenient_if = ctx.lenient_if;

        if let Some(for_each) = &self.for_each {
            let entries = to_enumerable(&eval_value_token(&for_each.value, ctx, false)?);
            let variable = for_each.alias.clone().unwrap_or_else(|| name.clone());
            let forloop = Arc::new(ForloopDrop::new(entries.len(), variable.clone()));
            scope.insert("forloop".to_string(), ContextValue::Drop(forloop.clone()));
            child.push(scope);
            for entry in entries {
                if emitter.closed() {
                    break;
                }
                if let Some(top) = child.last_mut() {
                    top.insert(variable.clone(), entry);
                }
                render_templates(engine, &templates, &mut child, emitter).await?;
                forloop.next();
            }
            child.pop();
        } else {
            child.push(scope);
            render_templates(engine, &templates, &mut child, emitter).await?;
            child.pop();
        }
        Ok(())
    }
}
