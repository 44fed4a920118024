//! # weft
//!
//! A Liquid-compatible template engine with an async core. Templates parse
//! once into a renderable tree and render through a single interpreter in
//! three flavors: buffered async, fully synchronous, and streaming with
//! backpressure.
//!
//! ## Modules
//!
//! - [`engine`] - The [`Engine`]: configuration, registries, render surface
//! - [`options`] - Engine and per-render configuration
//! - [`lexer`] / [`parser`] - Tokenizer and template parser
//! - [`context`] - Render scopes, values, and drop objects
//! - [`filters`] / [`tags`] - Built-in and custom filters and tags
//! - [`fs`] / [`loader`] / [`cache`] - Template lookup, filesystem
//!   adapters, and the parse cache
//! - [`render`] - Emitters, the sync driver, and the output stream
//!
//! ```no_run
//! use weft::{ContextValue, Engine};
//!
//! let engine = Engine::new();
//! let scope = ContextValue::from(
//!     [("name".to_string(), ContextValue::from("world"))]
//!         .into_iter()
//!         .collect::<weft::Scope>(),
//! );
//! let out = engine.parse_and_render_sync("Hello {{ name }}!", scope)?;
//! assert_eq!(out, "Hello world!");
//! # Ok::<(), weft::WeftError>(())
//! ```

pub mod cache;
pub mod context;
pub mod engine;
pub mod expression;
pub mod filters;
pub mod fs;
pub mod lexer;
pub mod loader;
pub mod options;
pub mod parser;
pub mod render;
pub mod tags;
pub mod tokens;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use cache::{CacheStore, CachedTemplates, Lru};
pub use context::{BlockMode, Context, ContextValue, DropObject, PathKey, Scope};
pub use engine::Engine;
pub use filters::{FilterImpl, FilterRegistry, SyncFilterFn};
pub use fs::{FileSystem, MemoryFileSystem, StdFileSystem};
pub use loader::{Loader, LookupType};
pub use options::{CacheOption, EngineOptions, Escaper, OutputEscape, RenderOptions};
pub use parser::{Parser, Template};
pub use render::{BufferedEmitter, Emitter, RenderStream};
pub use tags::{ForloopDrop, TagFactory, TagRegistry, TagRenderer};
pub use value::Value;
pub use weft_core::{SourceLocation, WeftError};
