//! `{% layout %}` and `{% block %}`
//!
//! `layout` consumes the rest of its document as content for the named
//! layout file: the content renders in store mode, where every `block`
//! captures its body into the block register instead of emitting, and the
//! non-block remainder becomes the anonymous block. The layout file then
//! renders in output mode, where each `block` emits the stored content or
//! falls back to its own body. `layout none` renders the content in place.

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::{BlockMode, Context};
use crate::engine::Engine;
use crate::loader::LookupType;
use crate::parser::{Parser, Template, TokenCursor};
use crate::render::{render_templates, render_to_string, Emitter};
use crate::tokens::TagToken;

use super::partial::{parse_file_path, render_file_path, FilePath};
use super::{args_tokenizer, TagFactory, TagHash, TagRenderer};

pub struct LayoutTag;

impl TagFactory for LayoutTag {
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let mut tokenizer = args_tokenizer(token, engine);
        let file = parse_file_path(&mut tokenizer, engine)?;
        let hash = TagHash::parse(&mut tokenizer, false)?;
        // everything after the layout tag belongs to it
        let body = Parser::new(engine).parse_tokens(cursor)?;
        Ok(Box::new(LayoutRenderer {
            file,
            hash,
            body,
            current_file: token.span.file.as_ref().map(|f| f.to_string()),
        }))
    }
}

struct LayoutRenderer {
    file: FilePath,
    hash: TagHash,
    body: Vec<Template>,
    current_file: Option<String>,
}

#[async_trait]
impl TagRenderer for LayoutRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        let name = match render_file_path(&self.file, ctx, engine).await? {
            None => {
                ctx.registers_mut().block_mode = BlockMode::Output;
                return render_templates(engine, &self.body, ctx, emitter).await;
            }
            Some(name) if name.is_empty() => {
                return Err(WeftError::Render("illegal file path".to_string()));
            }
            Some(name) => name,
        };
        let layout = engine
            .parse_file_with(
                &name,
                LookupType::Layouts,
                ctx.sync,
                self.current_file.as_deref(),
            )
            .await?;

        // capture pass: blocks store themselves, the rest becomes the
        // anonymous block unless the content defined one explicitly
        ctx.registers_mut().block_mode = BlockMode::Store;
        let html = render_to_string(engine, &self.body, ctx).await?;
        ctx.registers_mut()
            .blocks
            .entry(String::new())
            .or_insert(html);

        let scope = self.hash.evaluate(ctx)?;
        ctx.push(scope);
        ctx.registers_mut().block_mode = BlockMode::Output;
        let result = render_templates(engine, &layout, ctx, emitter).await;
        ctx.pop();
        result
    }
}

pub struct BlockTag;

impl TagFactory for BlockTag {
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError> {
        let mut tokenizer = args_tokenizer(token, engine);
        tokenizer.skip_blank();
        let name = tokenizer.read_identifier().to_string();
        let (body, _) = Parser::new(engine).parse_until(cursor, &["endblock"], token)?;
        Ok(Box::new(BlockRenderer { name, body }))
    }
}

struct BlockRenderer {
    /// Empty for the anonymous block.
    name: String,
    body: Vec<Template>,
}

#[async_trait]
impl TagRenderer for BlockRenderer {
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError> {
        let stored = ctx.registers().blocks.get(&self.name).cloned();
        match ctx.registers().block_mode {
            BlockMode::Store => {
                // content from an inner template wins over our own body
                let html = match stored {
                    Some(html) => html,
                    None => render_to_string(engine, &self.body, ctx).await?,
                };
                ctx.registers_mut().blocks.insert(self.name.clone(), html);
                Ok(())
            }
            BlockMode::Output => match stored {
                Some(html) => emitter.write(&html).await,
                None => render_templates(engine, &self.body, ctx, emitter).await,
            },
        }
    }
}
