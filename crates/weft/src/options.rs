//! Engine configuration.
//!
//! [`EngineOptions`] is the user-facing builder-style struct; calling
//! [`EngineOptions::normalize`] resolves defaults and derived state
//! (operator trie, escaper, cache store) into a [`NormalizedOptions`] the
//! engine holds for its lifetime. [`RenderOptions`] carries the small set
//! of per-call overrides.

use std::fmt;
use std::sync::Arc;

use weft_core::WeftError;

use crate::cache::{CacheStore, Lru};
use crate::context::{ContextValue, Scope};
use crate::expression::{default_operators, Operators};
use crate::filters::escape_html;
use crate::fs::{FileSystem, StdFileSystem};
use crate::lexer::OperatorTrie;

/// Parse-cache configuration.
#[derive(Clone, Default)]
pub enum CacheOption {
    /// No caching; every file reference parses fresh.
    #[default]
    Off,
    /// A bounded LRU holding at most this many parsed files. A zero
    /// capacity accepts writes and retains nothing.
    Limit(usize),
    /// A caller-provided store.
    Custom(Arc<dyn CacheStore>),
}

/// A function mapping an output value to its final string form.
pub type Escaper = Arc<dyn Fn(&ContextValue) -> String + Send + Sync>;

/// How output interpolations are escaped by default.
#[derive(Clone)]
pub enum OutputEscape {
    /// A named built-in escaper: `"escape"` or `"json"`.
    Name(String),
    /// A caller-provided escaper.
    Custom(Escaper),
}

/// User-facing engine configuration. All fields have usable defaults.
#[derive(Clone)]
pub struct EngineOptions {
    /// Directories searched for top-level templates.
    pub root: Vec<String>,
    /// Directories searched by `include`; defaults to `root`.
    pub partials: Option<Vec<String>>,
    /// Directories searched by `layout`; defaults to `root`.
    pub layouts: Option<Vec<String>>,
    /// Resolve `./` and `../` references against the including file.
    pub relative_reference: bool,
    /// Extension appended to extension-less template names.
    pub extname: String,
    /// Parse-cache configuration.
    pub cache: CacheOption,
    /// Jekyll-style `include`: `=` hash separator, hash wrapped under
    /// `include`.
    pub jekyll_include: bool,
    /// Allow computed partial names; defaults to the opposite of
    /// `jekyll_include`.
    pub dynamic_partials: Option<bool>,
    /// Unknown tags fail the parse instead of rendering a placeholder.
    pub strict_tags: bool,
    /// Unknown filters fail the parse instead of passing values through.
    pub strict_filters: bool,
    /// Undefined variables fail the render instead of resolving to nil.
    pub strict_variables: bool,
    /// Skip computed properties and drop fallbacks during property reads.
    pub own_property_only: bool,
    /// Conditions tolerate undefined variables even under strict mode.
    pub lenient_if: bool,
    /// Trim to the left of every tag directive.
    pub trim_tag_left: bool,
    /// Trim to the right of every tag directive.
    pub trim_tag_right: bool,
    /// Trim to the left of every output directive.
    pub trim_output_left: bool,
    /// Trim to the right of every output directive.
    pub trim_output_right: bool,
    /// Greedy trimming eats every blank; non-greedy stops at one line.
    pub greedy: bool,
    /// Opening tag delimiter.
    pub tag_delimiter_left: String,
    /// Closing tag delimiter.
    pub tag_delimiter_right: String,
    /// Opening output delimiter.
    pub output_delimiter_left: String,
    /// Closing output delimiter.
    pub output_delimiter_right: String,
    /// Escaping applied to every output interpolation unless suppressed by
    /// the `raw` filter.
    pub output_escape: Option<OutputEscape>,
    /// Engine-wide variables, resolved after render environments.
    pub globals: Scope,
    /// The operator table; custom entries become lexable automatically.
    pub operators: Operators,
    /// Honor hash-argument order for loop modifiers instead of the fixed
    /// offset, limit, reversed order.
    pub ordered_filter_parameters: bool,
    /// The filesystem adapter backing the loader.
    pub fs: Arc<dyn FileSystem>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            root: vec![".".to_string()],
            partials: None,
            layouts: None,
            relative_reference: true,
            extname: String::new(),
            cache: CacheOption::Off,
            jekyll_include: false,
            dynamic_partials: None,
            strict_tags: false,
            strict_filters: false,
            strict_variables: false,
            own_property_only: false,
            lenient_if: false,
            trim_tag_left: false,
            trim_tag_right: false,
            trim_output_left: false,
            trim_output_right: false,
            greedy: true,
            tag_delimiter_left: "{%".to_string(),
            tag_delimiter_right: "%}".to_string(),
            output_delimiter_left: "{{".to_string(),
            output_delimiter_right: "}}".to_string(),
            output_escape: None,
            globals: Scope::new(),
            operators: default_operators(),
            ordered_filter_parameters: false,
            fs: Arc::new(StdFileSystem::default()),
        }
    }
}

impl EngineOptions {
    /// Resolves defaults and derived state. Fails when `output_escape`
    /// names an unknown escaper.
    pub fn normalize(self) -> Result<NormalizedOptions, WeftError> {
        let escaper = match self.output_escape {
            None => None,
            Some(OutputEscape::Custom(f)) => Some(f),
            Some(OutputEscape::Name(name)) => Some(named_escaper(&name)?),
        };
        let cache = match self.cache {
            CacheOption::Off => None,
            CacheOption::Limit(n) => Some(Arc::new(Lru::new(n)) as Arc<dyn CacheStore>),
            CacheOption::Custom(store) => Some(store),
        };
        let operator_trie = OperatorTrie::new(self.operators.keys().map(String::as_str));
        Ok(NormalizedOptions {
            partials: self.partials.unwrap_or_else(|| self.root.clone()),
            layouts: self.layouts.unwrap_or_else(|| self.root.clone()),
            root: self.root,
            relative_reference: self.relative_reference,
            extname: self.extname,
            cache,
            jekyll_include: self.jekyll_include,
            dynamic_partials: self.dynamic_partials.unwrap_or(!self.jekyll_include),
            strict_tags: self.strict_tags,
            strict_filters: self.strict_filters,
            strict_variables: self.strict_variables,
            own_property_only: self.own_property_only,
            lenient_if: self.lenient_if,
            trim_tag_left: self.trim_tag_left,
            trim_tag_right: self.trim_tag_right,
            trim_output_left: self.trim_output_left,
            trim_output_right: self.trim_output_right,
            greedy: self.greedy,
            tag_delimiter_left: self.tag_delimiter_left,
            tag_delimiter_right: self.tag_delimiter_right,
            output_delimiter_left: self.output_delimiter_left,
            output_delimiter_right: self.output_delimiter_right,
            escaper,
            globals: self.globals,
            operators: self.operators,
            operator_trie,
            ordered_filter_parameters: self.ordered_filter_parameters,
            fs: self.fs,
        })
    }
}

fn named_escaper(name: &str) -> Result<Escaper, WeftError> {
    match name {
        "escape" => Ok(Arc::new(|v: &ContextValue| {
            escape_html(&v.to_display_string())
        })),
        "json" => Ok(Arc::new(|v: &ContextValue| v.to_json().to_string())),
        other => Err(WeftError::UnknownFilter(other.to_string())),
    }
}

/// Fully resolved engine configuration.
pub struct NormalizedOptions {
    /// Directories searched for top-level templates.
    pub root: Vec<String>,
    /// Directories searched by `include`.
    pub partials: Vec<String>,
    /// Directories searched by `layout`.
    pub layouts: Vec<String>,
    /// Resolve `./` and `../` references against the including file.
    pub relative_reference: bool,
    /// Extension appended to extension-less template names.
    pub extname: String,
    /// The parse-cache store, when caching is enabled.
    pub cache: Option<Arc<dyn CacheStore>>,
    /// Jekyll-style `include` argument handling.
    pub jekyll_include: bool,
    /// Allow computed partial names.
    pub dynamic_partials: bool,
    /// Unknown tags fail the parse.
    pub strict_tags: bool,
    /// Unknown filters fail the parse.
    pub strict_filters: bool,
    /// Undefined variables fail the render.
    pub strict_variables: bool,
    /// Skip computed properties and drop fallbacks.
    pub own_property_only: bool,
    /// Conditions tolerate undefined variables.
    pub lenient_if: bool,
    /// Trim to the left of every tag directive.
    pub trim_tag_left: bool,
    /// Trim to the right of every tag directive.
    pub trim_tag_right: bool,
    /// Trim to the left of every output directive.
    pub trim_output_left: bool,
    /// Trim to the right of every output directive.
    pub trim_output_right: bool,
    /// Greedy trimming eats every blank.
    pub greedy: bool,
    /// Opening tag delimiter.
    pub tag_delimiter_left: String,
    /// Closing tag delimiter.
    pub tag_delimiter_right: String,
    /// Opening output delimiter.
    pub output_delimiter_left: String,
    /// Closing output delimiter.
    pub output_delimiter_right: String,
    /// The resolved output escaper, if any.
    pub escaper: Option<Escaper>,
    /// Engine-wide variables.
    pub globals: Scope,
    /// The operator table.
    pub operators: Operators,
    /// Trie over the operator spellings, shared by every tokenizer.
    pub operator_trie: OperatorTrie,
    /// Honor hash-argument order for loop modifiers.
    pub ordered_filter_parameters: bool,
    /// The filesystem adapter backing the loader.
    pub fs: Arc<dyn FileSystem>,
}

// the escaper, cache store and fs adapter are opaque trait objects
impl fmt::Debug for NormalizedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedOptions")
            .field("root", &self.root)
            .field("partials", &self.partials)
            .field("layouts", &self.layouts)
            .field("extname", &self.extname)
            .field("strict_tags", &self.strict_tags)
            .field("strict_filters", &self.strict_filters)
            .field("strict_variables", &self.strict_variables)
            .finish_non_exhaustive()
    }
}

/// Per-render overrides layered over the engine configuration.
#[derive(Clone, Default)]
pub struct RenderOptions {
    /// Extra engine-wide variables for this render only.
    pub globals: Option<Scope>,
    /// Override the engine's `strict_variables` setting.
    pub strict_variables: Option<bool>,
    /// Override the engine's `own_property_only` setting.
    pub own_property_only: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partials_default_to_root() {
        let opts = EngineOptions {
            root: vec!["/site".to_string()],
            ..EngineOptions::default()
        }
        .normalize()
        .unwrap();
        assert_eq!(opts.partials, vec!["/site".to_string()]);
        assert_eq!(opts.layouts, vec!["/site".to_string()]);
        assert!(format!("{opts:?}").contains("/site"));
    }

    #[test]
    fn test_dynamic_partials_tracks_jekyll_include() {
        let opts = EngineOptions::default().normalize().unwrap();
        assert!(opts.dynamic_partials);
        let opts = EngineOptions {
            jekyll_include: true,
            ..EngineOptions::default()
        }
        .normalize()
        .unwrap();
        assert!(!opts.dynamic_partials);
    }

    #[test]
    fn test_unknown_escaper_name_fails() {
        let err = EngineOptions {
            output_escape: Some(OutputEscape::Name("nope".to_string())),
            ..EngineOptions::default()
        }
        .normalize()
        .unwrap_err();
        assert!(matches!(err, WeftError::UnknownFilter(name) if name == "nope"));
    }

    #[test]
    fn test_named_escaper_escapes_html() {
        let opts = EngineOptions {
            output_escape: Some(OutputEscape::Name("escape".to_string())),
            ..EngineOptions::default()
        }
        .normalize()
        .unwrap();
        let escaper = opts.escaper.unwrap();
        assert_eq!(escaper(&ContextValue::from("<b>")), "&lt;b&gt;");
    }
}
