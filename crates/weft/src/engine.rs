//! The engine: configuration, registries and the public render surface.
//!
//! An [`Engine`] owns the normalized options, the tag and filter
//! registries and the template loader. It is cheap to share by reference
//! and every render method takes `&self`, so one engine serves concurrent
//! renders. Each method comes in an async and a sync flavor; the sync
//! flavor drives the same future and fails with [`WeftError::Async`] if
//! anything in the pipeline actually suspends.

use std::sync::Arc;

use tokio::sync::{mpsc, OnceCell};
use weft_core::WeftError;

use crate::cache::CachedTemplates;
use crate::context::{Context, ContextValue, Scope};
use crate::filters::{FilterImpl, FilterRegistry, SyncFilterFn};
use crate::loader::{Loader, LookupType};
use crate::options::{EngineOptions, NormalizedOptions, RenderOptions};
use crate::parser::{Parser, Template};
use crate::render::{
    drive_sync, render_templates, render_to_string, ChannelEmitter, RenderStream,
};
use crate::tags::{TagFactory, TagRegistry};
use crate::value::Value;

/// The template engine.
pub struct Engine {
    options: Arc<NormalizedOptions>,
    loader: Loader,
    tags: TagRegistry,
    filters: FilterRegistry,
}

impl Engine {
    /// Creates an engine with default options.
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default()).expect("default configuration is valid")
    }

    /// Creates an engine from the given options. Fails when the options
    /// name an unknown output escaper.
    pub fn with_options(options: EngineOptions) -> Result<Self, WeftError> {
        let strict_filters = options.strict_filters;
        let options = Arc::new(options.normalize()?);
        Ok(Self {
            loader: Loader::new(options.clone()),
            tags: TagRegistry::with_builtins(),
            filters: FilterRegistry::with_builtins(strict_filters),
            options,
        })
    }

    /// The normalized engine configuration.
    pub fn options(&self) -> &NormalizedOptions {
        &self.options
    }

    /// The tag registry.
    pub const fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// The filter registry.
    pub const fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Registers a custom tag, replacing any existing tag of that name.
    pub fn register_tag(&mut self, name: &str, factory: Arc<dyn TagFactory>) {
        self.tags.register(name, factory);
    }

    /// Registers a custom filter, replacing any existing filter of that
    /// name.
    pub fn register_filter(&mut self, name: &str, filter: Arc<dyn FilterImpl>) {
        self.filters.register(name, filter);
    }

    /// Registers a plain-function filter.
    pub fn register_filter_fn(&mut self, name: &str, f: SyncFilterFn) {
        self.filters.register_fn(name, f);
    }

    /// Parses a template source into renderable nodes.
    pub fn parse(&self, text: &str) -> Result<Vec<Template>, WeftError> {
        Parser::new(self).parse(text, None)
    }

    /// Renders parsed templates to a string.
    pub async fn render(
        &self,
        templates: &[Template],
        scope: ContextValue,
    ) -> Result<String, WeftError> {
        self.render_with(templates, scope, &RenderOptions::default())
            .await
    }

    /// Renders parsed templates with per-render overrides.
    pub async fn render_with(
        &self,
        templates: &[Template],
        scope: ContextValue,
        opts: &RenderOptions,
    ) -> Result<String, WeftError> {
        self.render_internal(templates, scope, opts, false).await
    }

    /// Synchronous variant of [`Engine::render`].
    pub fn render_sync(
        &self,
        templates: &[Template],
        scope: ContextValue,
    ) -> Result<String, WeftError> {
        self.render_sync_with(templates, scope, &RenderOptions::default())
    }

    /// Synchronous variant of [`Engine::render_with`].
    pub fn render_sync_with(
        &self,
        templates: &[Template],
        scope: ContextValue,
        opts: &RenderOptions,
    ) -> Result<String, WeftError> {
        drive_sync(
            self.render_internal(templates, scope, opts, true),
            "render_sync",
        )
    }

    /// Parses and renders in one call.
    pub async fn parse_and_render(
        &self,
        text: &str,
        scope: ContextValue,
    ) -> Result<String, WeftError> {
        let templates = self.parse(text)?;
        self.render(&templates, scope).await
    }

    /// Synchronous variant of [`Engine::parse_and_render`].
    pub fn parse_and_render_sync(
        &self,
        text: &str,
        scope: ContextValue,
    ) -> Result<String, WeftError> {
        let templates = self.parse(text)?;
        self.render_sync(&templates, scope)
    }

    /// Looks up, reads and parses a template file, consulting the parse
    /// cache when one is configured.
    pub async fn parse_file(&self, file: &str) -> Result<Arc<Vec<Template>>, WeftError> {
        self.parse_file_with(file, LookupType::Root, false, None)
            .await
    }

    /// Synchronous variant of [`Engine::parse_file`].
    pub fn parse_file_sync(&self, file: &str) -> Result<Arc<Vec<Template>>, WeftError> {
        drive_sync(
            self.parse_file_with(file, LookupType::Root, true, None),
            "parse_file_sync",
        )
    }

    /// Renders a template file to a string.
    pub async fn render_file(
        &self,
        file: &str,
        scope: ContextValue,
    ) -> Result<String, WeftError> {
        self.render_file_with(file, scope, &RenderOptions::default())
            .await
    }

    /// Renders a template file with per-render overrides.
    pub async fn render_file_with(
        &self,
        file: &str,
        scope: ContextValue,
        opts: &RenderOptions,
    ) -> Result<String, WeftError> {
        let templates = self
            .parse_file_with(file, LookupType::Root, false, None)
            .await?;
        self.render_internal(&templates, scope, opts, false).await
    }

    /// Synchronous variant of [`Engine::render_file`].
    pub fn render_file_sync(
        &self,
        file: &str,
        scope: ContextValue,
    ) -> Result<String, WeftError> {
        drive_sync(
            async {
                let templates = self
                    .parse_file_with(file, LookupType::Root, true, None)
                    .await?;
                self.render_internal(&templates, scope, &RenderOptions::default(), true)
                    .await
            },
            "render_file_sync",
        )
    }

    /// Renders parsed templates as a stream of output chunks.
    ///
    /// The render runs only while the stream is polled; dropping the
    /// stream cancels it.
    pub fn render_stream<'a>(
        &'a self,
        templates: &'a [Template],
        scope: ContextValue,
    ) -> RenderStream<'a> {
        self.render_stream_with(templates, scope, &RenderOptions::default())
    }

    /// Streaming variant of [`Engine::render_with`].
    pub fn render_stream_with<'a>(
        &'a self,
        templates: &'a [Template],
        scope: ContextValue,
        opts: &RenderOptions,
    ) -> RenderStream<'a> {
        let (tx, rx) = mpsc::channel(RenderStream::CAPACITY);
        let mut ctx = self.context_for(scope, opts, false);
        let future = Box::pin(async move {
            let mut emitter = ChannelEmitter::new(tx);
            render_templates(self, templates, &mut ctx, &mut emitter).await
        });
        RenderStream::new(future, rx)
    }

    /// Streaming variant of [`Engine::render_file`].
    pub async fn render_file_stream(
        &self,
        file: &str,
        scope: ContextValue,
    ) -> Result<RenderStream<'_>, WeftError> {
        let templates = self
            .parse_file_with(file, LookupType::Root, false, None)
            .await?;
        let (tx, rx) = mpsc::channel(RenderStream::CAPACITY);
        let mut ctx = self.context_for(scope, &RenderOptions::default(), false);
        let future = Box::pin(async move {
            let mut emitter = ChannelEmitter::new(tx);
            render_templates(self, &templates, &mut ctx, &mut emitter).await
        });
        Ok(RenderStream::new(future, rx))
    }

    /// Evaluates a single value expression (with filters) against a scope.
    pub async fn eval_value(
        &self,
        input: &str,
        scope: ContextValue,
    ) -> Result<ContextValue, WeftError> {
        self.eval_value_internal(input, scope, false).await
    }

    /// Synchronous variant of [`Engine::eval_value`].
    pub fn eval_value_sync(
        &self,
        input: &str,
        scope: ContextValue,
    ) -> Result<ContextValue, WeftError> {
        drive_sync(
            self.eval_value_internal(input, scope, true),
            "eval_value_sync",
        )
    }

    async fn eval_value_internal(
        &self,
        input: &str,
        scope: ContextValue,
        sync: bool,
    ) -> Result<ContextValue, WeftError> {
        let value = Value::parse(input, &self.options, &self.filters)?;
        let ctx = self.context_for(scope, &RenderOptions::default(), sync);
        value.evaluate(&ctx, &self.options.operators, false).await
    }

    async fn render_internal(
        &self,
        templates: &[Template],
        scope: ContextValue,
        opts: &RenderOptions,
        sync: bool,
    ) -> Result<String, WeftError> {
        let mut ctx = self.context_for(scope, opts, sync);
        render_to_string(self, templates, &mut ctx).await
    }

    /// Builds the render context: environments from the scope, engine
    /// globals extended by per-render globals, flags resolved from the
    /// overrides.
    fn context_for(&self, scope: ContextValue, opts: &RenderOptions, sync: bool) -> Context {
        let environments = match scope {
            ContextValue::Object(map) => map,
            _ => Scope::new(),
        };
        let mut globals = self.options.globals.clone();
        if let Some(extra) = &opts.globals {
            globals.extend(extra.clone());
        }
        let mut ctx = Context::new(environments, globals);
        ctx.sync = sync;
        ctx.strict_variables = opts
            .strict_variables
            .unwrap_or(self.options.strict_variables);
        ctx.own_property_only = opts
            .own_property_only
            .unwrap_or(self.options.own_property_only);
        ctx.lenient_if = self.options.lenient_if;
        ctx
    }

    /// Resolves a file reference through the parse cache.
    ///
    /// Without a cache every reference parses fresh. With one, async
    /// renders share a single-flight cell per key so a file parses at most
    /// once however many renders reference it concurrently; the sync path
    /// reads resolved cells and installs pre-resolved ones, never awaiting
    /// another task. A failed parse is evicted so the next reference
    /// retries.
    pub(crate) async fn parse_file_with(
        &self,
        file: &str,
        lookup: LookupType,
        sync: bool,
        current_file: Option<&str>,
    ) -> Result<Arc<Vec<Template>>, WeftError> {
        let Some(cache) = &self.options.cache else {
            let templates = self
                .parse_file_fresh(file, lookup, sync, current_file)
                .await?;
            return Ok(Arc::new(templates));
        };
        let key = self.cache_key(file, lookup, current_file);

        if sync {
            if let Some(cell) = cache.read(&key) {
                if let Some(templates) = cell.get() {
                    tracing::debug!(key = %key, "parse cache hit");
                    return Ok(templates.clone());
                }
            }
            tracing::debug!(key = %key, "parse cache miss");
            match self.parse_file_fresh(file, lookup, sync, current_file).await {
                Ok(templates) => {
                    let templates = Arc::new(templates);
                    let cell = OnceCell::new();
                    // fresh cell, the set cannot collide
                    let _ = cell.set(templates.clone());
                    cache.write(&key, Arc::new(cell));
                    Ok(templates)
                }
                Err(err) => {
                    cache.remove(&key);
                    Err(err)
                }
            }
        } else {
            let cell: CachedTemplates = cache.read_or_insert(&key, Arc::new(OnceCell::new()));
            let result = cell
                .get_or_try_init(|| async {
                    tracing::debug!(key = %key, "parse cache miss");
                    let templates = self
                        .parse_file_fresh(file, lookup, sync, current_file)
                        .await?;
                    Ok(Arc::new(templates))
                })
                .await;
            match result {
                Ok(templates) => Ok(templates.clone()),
                Err(err) => {
                    cache.remove(&key);
                    Err(err)
                }
            }
        }
    }

    /// Relative references key on the referencing file so the same name
    /// caches separately per referrer; plain names key on the lookup kind.
    fn cache_key(&self, file: &str, lookup: LookupType, current_file: Option<&str>) -> String {
        if self.options.relative_reference && Loader::is_relative(file) {
            if let Some(current) = current_file {
                return format!("{current},{file}");
            }
        }
        format!("{lookup:?}:{file}")
    }

    async fn parse_file_fresh(
        &self,
        file: &str,
        lookup: LookupType,
        sync: bool,
        current_file: Option<&str>,
    ) -> Result<Vec<Template>, WeftError> {
        let path = if sync {
            self.loader.lookup_sync(file, lookup, current_file)?
        } else {
            self.loader.lookup(file, lookup, current_file).await?
        };
        let text = if sync {
            self.options.fs.read_file_sync(&path)?
        } else {
            self.options.fs.read_file(&path).await?
        };
        Parser::new(self).parse(&text, Some(&path))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;
    use crate::options::CacheOption;

    fn scope(pairs: &[(&str, ContextValue)]) -> ContextValue {
        ContextValue::Object(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_parse_and_render_sync() {
        let engine = Engine::new();
        let out = engine
            .parse_and_render_sync(
                "Hello {{ name | upcase }}!",
                scope(&[("name", ContextValue::from("weft"))]),
            )
            .unwrap();
        assert_eq!(out, "Hello WEFT!");
    }

    #[test]
    fn test_render_file_sync_uses_memory_fs() {
        let engine = Engine::with_options(EngineOptions {
            root: vec!["/t".to_string()],
            extname: ".liquid".to_string(),
            fs: Arc::new(MemoryFileSystem::with_files([(
                "/t/page.liquid",
                "n = {{ n }}",
            )])),
            ..EngineOptions::default()
        })
        .unwrap();
        let out = engine
            .render_file_sync("page", scope(&[("n", ContextValue::Integer(3))]))
            .unwrap();
        assert_eq!(out, "n = 3");
    }

    #[test]
    fn test_parse_cache_shares_parsed_templates() {
        let engine = Engine::with_options(EngineOptions {
            root: vec!["/t".to_string()],
            cache: CacheOption::Limit(8),
            fs: Arc::new(MemoryFileSystem::with_files([("/t/a", "A")])),
            ..EngineOptions::default()
        })
        .unwrap();
        let first = engine.parse_file_sync("a").unwrap();
        let second = engine.parse_file_sync("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_render_options_override_strict_variables() {
        let engine = Engine::new();
        let templates = engine.parse("{{ missing }}").unwrap();
        assert_eq!(
            engine
                .render_sync(&templates, scope(&[]))
                .unwrap(),
            ""
        );
        let err = engine
            .render_sync_with(
                &templates,
                scope(&[]),
                &RenderOptions {
                    strict_variables: Some(true),
                    ..RenderOptions::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, WeftError::UndefinedVariable(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_async_render_matches_sync() {
        let engine = Engine::new();
        let templates = engine.parse("{% if ok %}yes{% else %}no{% endif %}").unwrap();
        let out = engine
            .render(&templates, scope(&[("ok", ContextValue::Bool(true))]))
            .await
            .unwrap();
        assert_eq!(out, "yes");
        assert_eq!(
            engine
                .render_sync(&templates, scope(&[("ok", ContextValue::Bool(false))]))
                .unwrap(),
            "no"
        );
    }
}
