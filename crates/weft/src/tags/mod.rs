//! The tag protocol and built-in tags.
//!
//! A tag contributes two halves: a [`TagFactory`] that parses the directive
//! (consuming block bodies from the token cursor where the tag has them)
//! and the [`TagRenderer`] it produces, invoked at render time. Factories
//! live in a per-engine [`TagRegistry`].

mod assign;
mod capture;
mod case;
mod comment;
mod conditional;
mod counter;
mod cycle;
mod each;
mod echo;
mod flow;
mod layout;
mod partial;
mod raw;

pub use each::ForloopDrop;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::{Context, ContextValue, Scope};
use crate::engine::Engine;
use crate::expression::eval_value_token;
use crate::lexer::Tokenizer;
use crate::parser::TokenCursor;
use crate::render::Emitter;
use crate::tokens::{HashToken, TagToken};

/// Parses a tag directive into its renderer.
pub trait TagFactory: Send + Sync {
    /// Parses the directive. Block tags consume their body from the cursor
    /// up to their terminator.
    fn parse(
        &self,
        token: &TagToken,
        cursor: &mut TokenCursor,
        engine: &Engine,
    ) -> Result<Box<dyn TagRenderer>, WeftError>;
}

/// Renders a parsed tag.
#[async_trait]
pub trait TagRenderer: Send + Sync {
    /// Renders the tag against the context, writing output to the emitter.
    async fn render(
        &self,
        ctx: &mut Context,
        emitter: &mut dyn Emitter,
        engine: &Engine,
    ) -> Result<(), WeftError>;
}

/// Per-engine tag registry.
pub struct TagRegistry {
    map: HashMap<String, Arc<dyn TagFactory>>,
}

impl TagRegistry {
    /// Creates a registry preloaded with the built-in tags.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            map: HashMap::new(),
        };
        registry.register("assign", Arc::new(assign::AssignTag));
        registry.register("capture", Arc::new(capture::CaptureTag));
        registry.register("case", Arc::new(case::CaseTag));
        registry.register("comment", Arc::new(comment::CommentTag));
        registry.register("cycle", Arc::new(cycle::CycleTag));
        registry.register("echo", Arc::new(echo::EchoTag));
        registry.register("each", Arc::new(each::EachTag));
        registry.register("if", Arc::new(conditional::IfTag));
        registry.register("unless", Arc::new(conditional::UnlessTag));
        registry.register("raw", Arc::new(raw::RawTag));
        registry.register("break", Arc::new(flow::BreakTag));
        registry.register("continue", Arc::new(flow::ContinueTag));
        registry.register("increment", Arc::new(counter::IncrementTag));
        registry.register("decrement", Arc::new(counter::DecrementTag));
        registry.register("include", Arc::new(partial::IncludeTag));
        registry.register("render", Arc::new(partial::RenderTag));
        registry.register("layout", Arc::new(layout::LayoutTag));
        registry.register("block", Arc::new(layout::BlockTag));
        registry
    }

    /// Registers or replaces a tag.
    pub fn register(&mut self, name: &str, factory: Arc<dyn TagFactory>) {
        self.map.insert(name.to_string(), factory);
    }

    /// Looks up a tag factory.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TagFactory>> {
        self.map.get(name).cloned()
    }
}

/// A tokenizer positioned over a tag's argument text, sharing the
/// directive's source so spans and error locations stay accurate.
pub(crate) fn args_tokenizer<'e>(token: &TagToken, engine: &'e Engine) -> Tokenizer<'e> {
    Tokenizer::new_at(
        token.span.input.clone(),
        &engine.options().operator_trie,
        token.span.file.clone(),
        token.args_begin,
        token.args_end,
    )
}

/// Parsed `key: value` hash arguments, evaluated to a scope at render time.
pub(crate) struct TagHash {
    entries: Vec<HashToken>,
}

impl TagHash {
    /// Reads hash arguments from the remainder of a tag's argument text.
    pub fn parse(tokenizer: &mut Tokenizer<'_>, jekyll_style: bool) -> Result<Self, WeftError> {
        Ok(Self {
            entries: tokenizer.read_hashes(jekyll_style)?,
        })
    }

    /// Evaluates every entry; bare keys become `true`.
    pub fn evaluate(&self, ctx: &Context) -> Result<Scope, WeftError> {
        let mut scope = Scope::new();
        for entry in &self.entries {
            let value = match &entry.value {
                Some(token) => eval_value_token(token, ctx, false)?,
                None => ContextValue::Bool(true),
            };
            scope.insert(entry.name.clone(), value);
        }
        Ok(scope)
    }

    /// The entry names in source order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Finds an entry's raw value token.
    pub fn get(&self, name: &str) -> Option<&HashToken> {
        self.entries.iter().find(|e| e.name == name)
    }
}
