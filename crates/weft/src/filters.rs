//! The filter protocol and built-in filters.
//!
//! Filters implement [`FilterImpl`], an async trait so host integrations
//! can do I/O; most built-ins are plain functions lifted through
//! [`SyncFilter`]. Filters are looked up in a per-engine [`FilterRegistry`]
//! when a value is parsed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use weft_core::WeftError;

use crate::context::ContextValue;

/// A filter implementation.
///
/// `input` is the piped value; `args` and `kwargs` are the evaluated
/// positional and keyword arguments.
#[async_trait]
pub trait FilterImpl: Send + Sync {
    /// Applies the filter.
    async fn call(
        &self,
        input: ContextValue,
        args: &[ContextValue],
        kwargs: &[(String, ContextValue)],
    ) -> Result<ContextValue, WeftError>;
}

/// A synchronous filter function.
pub type SyncFilterFn = fn(ContextValue, &[ContextValue]) -> Result<ContextValue, WeftError>;

/// Adapter lifting a [`SyncFilterFn`] into the async filter protocol.
/// Synchronous filters never suspend, so they are safe in sync renders.
pub struct SyncFilter(pub SyncFilterFn);

#[async_trait]
impl FilterImpl for SyncFilter {
    async fn call(
        &self,
        input: ContextValue,
        args: &[ContextValue],
        _kwargs: &[(String, ContextValue)],
    ) -> Result<ContextValue, WeftError> {
        (self.0)(input, args)
    }
}

/// Per-engine filter registry.
pub struct FilterRegistry {
    map: HashMap<String, Arc<dyn FilterImpl>>,
    strict: bool,
}

impl FilterRegistry {
    /// Creates a registry preloaded with the built-in filters.
    pub fn with_builtins(strict: bool) -> Self {
        let mut registry = Self {
            map: HashMap::new(),
            strict,
        };
        registry.register("raw", Arc::new(SyncFilter(|input, _| Ok(input))));
        registry.register("escape", Arc::new(SyncFilter(escape_filter)));
        registry.register("json", Arc::new(SyncFilter(json_filter)));
        registry.register("default", Arc::new(DefaultFilter));
        registry.register("upcase", Arc::new(SyncFilter(upcase_filter)));
        registry.register("downcase", Arc::new(SyncFilter(downcase_filter)));
        registry.register("strip", Arc::new(SyncFilter(strip_filter)));
        registry.register("append", Arc::new(SyncFilter(append_filter)));
        registry.register("prepend", Arc::new(SyncFilter(prepend_filter)));
        registry.register("size", Arc::new(SyncFilter(size_filter)));
        registry.register("first", Arc::new(SyncFilter(first_filter)));
        registry.register("last", Arc::new(SyncFilter(last_filter)));
        registry.register("join", Arc::new(SyncFilter(join_filter)));
        registry
    }

    /// Registers or replaces a filter.
    pub fn register(&mut self, name: &str, filter: Arc<dyn FilterImpl>) {
        self.map.insert(name.to_string(), filter);
    }

    /// Registers a synchronous filter function.
    pub fn register_fn(&mut self, name: &str, f: SyncFilterFn) {
        self.register(name, Arc::new(SyncFilter(f)));
    }

    /// Looks up a filter. Under strict filters a miss is an error;
    /// otherwise it is `None` and the caller passes values through.
    pub fn get(&self, name: &str) -> Result<Option<Arc<dyn FilterImpl>>, WeftError> {
        match self.map.get(name) {
            Some(f) => Ok(Some(f.clone())),
            None if self.strict => Err(WeftError::UnknownFilter(name.to_string())),
            None => Ok(None),
        }
    }
}

/// HTML-escapes `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn escape_filter(input: ContextValue, _args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    Ok(ContextValue::Str(escape_html(&input.to_display_string())))
}

fn json_filter(input: ContextValue, _args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    Ok(ContextValue::Str(input.to_json().to_string()))
}

fn upcase_filter(input: ContextValue, _args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    Ok(ContextValue::Str(input.to_display_string().to_uppercase()))
}

fn downcase_filter(input: ContextValue, _args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    Ok(ContextValue::Str(input.to_display_string().to_lowercase()))
}

fn strip_filter(input: ContextValue, _args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    Ok(ContextValue::Str(
        input.to_display_string().trim().to_string(),
    ))
}

fn append_filter(input: ContextValue, args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    let mut s = input.to_display_string();
    s.push_str(&args.first().map(ContextValue::to_display_string).unwrap_or_default());
    Ok(ContextValue::Str(s))
}

fn prepend_filter(input: ContextValue, args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    let mut s = args
        .first()
        .map(ContextValue::to_display_string)
        .unwrap_or_default();
    s.push_str(&input.to_display_string());
    Ok(ContextValue::Str(s))
}

fn size_filter(input: ContextValue, _args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    Ok(ContextValue::from(input.len().unwrap_or(0)))
}

fn first_filter(input: ContextValue, _args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    Ok(match input {
        ContextValue::Array(items) => items.into_iter().next().unwrap_or_default(),
        ContextValue::Str(s) => s.chars().next().map_or(ContextValue::Nil, |c| {
            ContextValue::Str(c.to_string())
        }),
        _ => ContextValue::Nil,
    })
}

fn last_filter(input: ContextValue, _args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    Ok(match input {
        ContextValue::Array(items) => items.into_iter().next_back().unwrap_or_default(),
        ContextValue::Str(s) => s.chars().next_back().map_or(ContextValue::Nil, |c| {
            ContextValue::Str(c.to_string())
        }),
        _ => ContextValue::Nil,
    })
}

fn join_filter(input: ContextValue, args: &[ContextValue]) -> Result<ContextValue, WeftError> {
    let sep = args
        .first()
        .map_or_else(|| " ".to_string(), ContextValue::to_display_string);
    Ok(match input {
        ContextValue::Array(items) => ContextValue::Str(
            items
                .iter()
                .map(ContextValue::to_display_string)
                .collect::<Vec<_>>()
                .join(&sep),
        ),
        other => other,
    })
}

/// The `default` filter: replaces nil, `false` and empty collections with
/// its first argument. `allow_false: true` keeps an explicit `false`.
struct DefaultFilter;

#[async_trait]
impl FilterImpl for DefaultFilter {
    async fn call(
        &self,
        input: ContextValue,
        args: &[ContextValue],
        kwargs: &[(String, ContextValue)],
    ) -> Result<ContextValue, WeftError> {
        let allow_false = kwargs
            .iter()
            .find(|(k, _)| k == "allow_false")
            .is_some_and(|(_, v)| v.is_truthy());
        let fallback = || args.first().cloned().unwrap_or_default();
        Ok(match input {
            ContextValue::Nil | ContextValue::Empty => fallback(),
            ContextValue::Bool(false) if !allow_false => fallback(),
            other if other.is_empty_collection() => fallback(),
            other => other,
        })
    }
}
