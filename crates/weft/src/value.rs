//! A value with its filter pipeline, as written between output delimiters
//! or after `assign`.
//!
//! Filters are bound to registered implementations when the value is
//! parsed; an unknown name fails the parse under strict filters and
//! otherwise degrades to a pass-through. The `default` filter as first
//! stage makes the initial expression lenient when `lenient_if` is set, so
//! a strict-variables render can still write `{{ missing | default: "x" }}`.

use std::sync::Arc;

use weft_core::WeftError;

use crate::context::{Context, ContextValue};
use crate::expression::{eval_value_token, Expression, Operators};
use crate::filters::{FilterImpl, FilterRegistry};
use crate::lexer::Tokenizer;
use crate::tokens::{FilterArgToken, Source};

/// One bound filter stage.
pub struct FilterCall {
    /// The filter name as written.
    pub name: String,
    /// The bound implementation; `None` passes values through.
    implementation: Option<Arc<dyn FilterImpl>>,
    args: Vec<FilterArgToken>,
}

/// A parsed value: initial expression plus filter pipeline.
pub struct Value {
    initial: Expression,
    filters: Vec<FilterCall>,
}

impl Value {
    /// Parses `input` (e.g. `user.name | escape | default: "guest"`) and
    /// binds its filters against the registry.
    pub fn parse(
        input: &str,
        options: &crate::options::NormalizedOptions,
        registry: &FilterRegistry,
    ) -> Result<Self, WeftError> {
        let source: Source = Arc::from(input);
        let mut tz = Tokenizer::new(source, &options.operator_trie, None);
        let initial = tz.read_expression()?.ok_or_else(|| WeftError::Render(
            format!("invalid value expression: \"{input}\""),
        ))?;
        let tokens = tz.read_filters()?;
        let mut filters = Vec::with_capacity(tokens.len());
        for token in tokens {
            let implementation = registry.get(&token.name)?;
            if implementation.is_none() {
                tracing::warn!(filter = %token.name, "unknown filter, passing value through");
            }
            filters.push(FilterCall {
                name: token.name,
                implementation,
                args: token.args,
            });
        }
        Ok(Self { initial, filters })
    }

    /// True when the pipeline contains a filter with this name.
    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f.name == name)
    }

    /// Evaluates the initial expression and runs it through the pipeline.
    pub async fn evaluate(
        &self,
        ctx: &Context,
        operators: &Operators,
        lenient: bool,
    ) -> Result<ContextValue, WeftError> {
        let lenient = lenient
            || (ctx.lenient_if && self.filters.first().is_some_and(|f| f.name == "default"));
        let mut value = self.initial.evaluate(ctx, operators, lenient)?;
        for filter in &self.filters {
            let Some(implementation) = &filter.implementation else {
                continue;
            };
            let mut args = Vec::new();
            let mut kwargs = Vec::new();
            for arg in &filter.args {
                match arg {
                    FilterArgToken::Positional(token) => {
                        args.push(eval_value_token(token, ctx, false)?);
                    }
                    FilterArgToken::Keyword(key, token) => {
                        kwargs.push((key.clone(), eval_value_token(token, ctx, false)?));
                    }
                }
            }
            value = implementation.call(value, &args, &kwargs).await?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Scope;
    use crate::options::EngineOptions;

    fn options() -> crate::options::NormalizedOptions {
        EngineOptions::default().normalize().unwrap()
    }

    fn eval(input: &str, scope: Scope) -> Result<ContextValue, WeftError> {
        let opts = options();
        let registry = FilterRegistry::with_builtins(false);
        let value = Value::parse(input, &opts, &registry)?;
        let ctx = Context::new(scope, Scope::new());
        futures::executor::block_on(value.evaluate(&ctx, &opts.operators, false))
    }

    #[test]
    fn test_pipeline_runs_in_order() {
        let scope = Scope::from([("name".to_string(), ContextValue::from("<b>"))]);
        assert_eq!(
            eval("name | escape | append: '!'", scope).unwrap(),
            ContextValue::from("&lt;b&gt;!")
        );
    }

    #[test]
    fn test_unknown_filter_passes_through() {
        let scope = Scope::from([("x".to_string(), ContextValue::from("v"))]);
        assert_eq!(eval("x | nope", scope).unwrap(), ContextValue::from("v"));
    }

    #[test]
    fn test_strict_filters_fail_at_parse() {
        let opts = options();
        let registry = FilterRegistry::with_builtins(true);
        assert!(matches!(
            Value::parse("x | nope", &opts, &registry),
            Err(WeftError::UnknownFilter(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_lenient_if_covers_default_first_stage() {
        let opts = options();
        let registry = FilterRegistry::with_builtins(false);
        let value = Value::parse("missing | default: 'fallback'", &opts, &registry).unwrap();
        let mut ctx = Context::new(Scope::new(), Scope::new());
        ctx.strict_variables = true;
        ctx.lenient_if = true;
        let out =
            futures::executor::block_on(value.evaluate(&ctx, &opts.operators, false)).unwrap();
        assert_eq!(out, ContextValue::from("fallback"));
    }

    #[test]
    fn test_strict_variables_still_fail_without_default() {
        let opts = options();
        let registry = FilterRegistry::with_builtins(false);
        let value = Value::parse("missing | escape", &opts, &registry).unwrap();
        let mut ctx = Context::new(Scope::new(), Scope::new());
        ctx.strict_variables = true;
        ctx.lenient_if = true;
        let err =
            futures::executor::block_on(value.evaluate(&ctx, &opts.operators, false)).unwrap_err();
        assert!(err.is_undefined_variable());
    }

    #[test]
    fn test_has_filter() {
        let opts = options();
        let registry = FilterRegistry::with_builtins(false);
        let value = Value::parse("x | raw", &opts, &registry).unwrap();
        assert!(value.has_filter("raw"));
        assert!(!value.has_filter("escape"));
    }
}
