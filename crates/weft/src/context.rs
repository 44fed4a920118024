//! Render-time state: the value model, the scope stack and the register
//! store.
//!
//! [`ContextValue`] is the engine's dynamic value type; it mirrors JSON plus
//! two engine-specific cases, the `empty` literal and host-backed
//! [`DropObject`]s. [`Context`] carries the nested scopes a render walks,
//! the per-render registers that tags communicate through, and the strictness
//! flags resolved from engine and per-render options.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use weft_core::WeftError;

/// A single scope frame: names bound to values.
pub type Scope = HashMap<String, ContextValue>;

/// A host object exposed to templates through dynamic dispatch.
///
/// Property reads consult [`DropObject::get`] first and fall back to
/// [`DropObject::method_missing`], unless the render runs with
/// `own_property_only` in which case the fallback is skipped.
pub trait DropObject: Send + Sync + fmt::Debug {
    /// Direct property access, consulted before any fallback.
    fn get(&self, key: &str) -> Option<ContextValue> {
        let _ = key;
        None
    }

    /// Fallback consulted when [`DropObject::get`] returns `None`.
    fn method_missing(&self, key: &str) -> Option<ContextValue> {
        let _ = key;
        None
    }

    /// String form used when the drop reaches output position.
    fn render(&self) -> String {
        String::new()
    }
}

/// A dynamic value flowing through evaluation and rendering.
#[derive(Debug, Clone, Default)]
pub enum ContextValue {
    /// Absent or undefined.
    #[default]
    Nil,
    /// The `empty` literal; equal to any zero-length string or collection.
    Empty,
    /// A boolean.
    Bool(bool),
    /// A 64-bit integer.
    Integer(i64),
    /// A 64-bit float.
    Float(f64),
    /// A string.
    Str(String),
    /// An array of values.
    Array(Vec<ContextValue>),
    /// A string-keyed map.
    Object(HashMap<String, ContextValue>),
    /// A host-backed object.
    Drop(Arc<dyn DropObject>),
}

impl ContextValue {
    /// Truthiness per template semantics: only nil, `false` and `empty` are
    /// falsy. Zero and the empty string are truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Empty | Self::Bool(false))
    }

    /// Returns `true` for nil and for the `empty` literal.
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Length of a string (in characters) or collection, `None` otherwise.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Str(s) => Some(s.chars().count()),
            Self::Array(a) => Some(a.len()),
            Self::Object(o) => Some(o.len()),
            _ => None,
        }
    }

    /// Returns `true` when the value is a zero-length string or collection.
    pub fn is_empty_collection(&self) -> bool {
        self.len() == Some(0)
    }

    /// Coerces to an integer where the value is numeric or a numeric string.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) => Some(*f as i64),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Coerces to a float where the value is numeric or a numeric string.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => {
                #[allow(clippy::cast_precision_loss)]
                Some(*n as f64)
            }
            Self::Float(f) => Some(*f),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The string form used at output position and for string coercion.
    ///
    /// Nil and `empty` render as nothing; arrays render their elements
    /// joined (nested nils vanish); objects render as JSON.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Nil | Self::Empty => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::Array(items) => items
                .iter()
                .map(Self::to_display_string)
                .collect::<Vec<_>>()
                .join(""),
            Self::Object(_) => self.to_json().to_string(),
            Self::Drop(d) => d.render(),
        }
    }

    /// Converts to a `serde_json::Value`. Drops serialize via their rendered
    /// string form; `empty` serializes as null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Nil | Self::Empty => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Drop(d) => serde_json::Value::String(d.render()),
        }
    }
}

impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) | (Self::Empty, Self::Empty) => true,
            (Self::Empty, other) | (other, Self::Empty) => other.is_empty_collection(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (a, b) => match (a.strictly_numeric(), b.strictly_numeric()) {
                (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
                _ => false,
            },
        }
    }
}

impl ContextValue {
    // Numeric view used only for equality; strings do not coerce here.
    fn strictly_numeric(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => {
                #[allow(clippy::cast_precision_loss)]
                Some(*n as f64)
            }
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ContextValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<usize> for ContextValue {
    fn from(value: usize) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<ContextValue>> From<Vec<T>> for ContextValue {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ContextValue>> From<HashMap<String, T>> for ContextValue {
    fn from(value: HashMap<String, T>) -> Self {
        Self::Object(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<ContextValue>> From<Option<T>> for ContextValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Nil,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || Self::Float(n.as_f64().unwrap_or(0.0)),
                Self::Integer,
            ),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// One resolved step of a property path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathKey {
    /// A named key.
    Key(String),
    /// A numeric index; negative counts from the end of an array.
    Index(i64),
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Whether block tags write their content to output or capture it into the
/// block register for a surrounding layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockMode {
    /// Block content goes straight to the output stream.
    #[default]
    Output,
    /// Block content is stored under the block's name for later substitution.
    Store,
}

/// A control-flow interrupt raised by `break` or `continue` and consumed by
/// the nearest enclosing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Terminate the loop.
    Break,
    /// Skip to the next iteration.
    Continue,
}

/// Per-render shared state that tags communicate through.
#[derive(Debug, Default)]
pub struct Registers {
    /// How block tags dispose of their content.
    pub block_mode: BlockMode,
    /// Captured block bodies, keyed by block name (anonymous blocks use "").
    pub blocks: HashMap<String, String>,
    /// Loop resume offsets keyed by loop identity, for `offset: continue`.
    pub continues: HashMap<String, i64>,
    /// Next candidate index per `cycle` rotation.
    pub cycles: HashMap<String, usize>,
    /// Pending control-flow interrupt, if any.
    pub interrupt: Option<Interrupt>,
}

/// The full render-time state: scope stack, environments, globals and
/// registers.
///
/// Variable resolution walks inner scopes outward, then the render
/// environments, then the engine globals. A frame that contains the key
/// wins even when the stored value is nil.
#[derive(Debug)]
pub struct Context {
    scopes: Vec<Scope>,
    environments: Scope,
    globals: Scope,
    registers: Registers,
    /// Render must complete without suspending.
    pub sync: bool,
    /// Undefined variables fail the render instead of resolving to nil.
    pub strict_variables: bool,
    /// Skip computed properties and drop fallbacks during property reads.
    pub own_property_only: bool,
    /// Conditions swallow undefined-variable errors even under strict mode.
    pub lenient_if: bool,
}

impl Context {
    /// Creates a context over the given render environments and engine
    /// globals.
    pub fn new(environments: Scope, globals: Scope) -> Self {
        Self {
            // the base frame outlives every block scope
            scopes: vec![Scope::new()],
            environments,
            globals,
            registers: Registers::default(),
            sync: false,
            strict_variables: false,
            own_property_only: false,
            lenient_if: false,
        }
    }

    /// Pushes a scope frame. Inner frames shadow outer ones.
    pub fn push(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    /// Pops the innermost scope frame.
    pub fn pop(&mut self) -> Option<Scope> {
        self.scopes.pop()
    }

    /// The outermost template scope, where `assign` and `capture` write.
    pub fn bottom_mut(&mut self) -> &mut Scope {
        if self.scopes.is_empty() {
            self.scopes.push(Scope::new());
        }
        &mut self.scopes[0]
    }

    /// The innermost scope frame, if any.
    pub fn last_mut(&mut self) -> Option<&mut Scope> {
        self.scopes.last_mut()
    }

    /// The render environments, where `increment` and `decrement` write.
    pub fn environments_mut(&mut self) -> &mut Scope {
        &mut self.environments
    }

    /// The engine globals this render resolves against.
    pub const fn globals(&self) -> &Scope {
        &self.globals
    }

    /// Read-only register access.
    pub const fn registers(&self) -> &Registers {
        &self.registers
    }

    /// Mutable register access.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Detaches the block-capture state, leaving defaults behind. Paired
    /// with [`Context::restore_blocks`] around partial renders.
    pub fn take_blocks(&mut self) -> (BlockMode, HashMap<String, String>) {
        (
            std::mem::take(&mut self.registers.block_mode),
            std::mem::take(&mut self.registers.blocks),
        )
    }

    /// Restores block-capture state detached by [`Context::take_blocks`].
    pub fn restore_blocks(&mut self, saved: (BlockMode, HashMap<String, String>)) {
        self.registers.block_mode = saved.0;
        self.registers.blocks = saved.1;
    }

    /// Resolves a property path against the scope chain.
    ///
    /// The first segment picks the owning frame by key presence, innermost
    /// first, then environments, then globals; remaining segments are
    /// property reads on the resulting value. Under `strict_variables` a nil
    /// result at any step fails with the dot-joined path prefix walked so
    /// far.
    pub fn get(&self, path: &[PathKey]) -> Result<ContextValue, WeftError> {
        let Some(first) = path.first() else {
            return Ok(ContextValue::Nil);
        };
        let mut current = match first {
            PathKey::Key(name) => self.find_frame(name).get(name).cloned().unwrap_or_default(),
            PathKey::Index(_) => ContextValue::Nil,
        };
        if self.strict_variables && current.is_nil() {
            return Err(WeftError::UndefinedVariable(join_path(&path[..1])));
        }
        for (i, key) in path.iter().enumerate().skip(1) {
            current = read_property(&current, key, self.own_property_only);
            if self.strict_variables && current.is_nil() {
                return Err(WeftError::UndefinedVariable(join_path(&path[..=i])));
            }
        }
        Ok(current)
    }

    /// Finds the frame owning `name` by key presence, falling back to the
    /// globals when no frame defines it.
    fn find_frame(&self, name: &str) -> &Scope {
        for scope in self.scopes.iter().rev() {
            if scope.contains_key(name) {
                return scope;
            }
        }
        if self.environments.contains_key(name) {
            return &self.environments;
        }
        &self.globals
    }
}

fn join_path(path: &[PathKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Reads one property off a value.
///
/// Arrays support negative indexing and the computed `size`, `first` and
/// `last` properties; strings support `size`. Computed properties and drop
/// fallbacks are skipped when `own_only` is set. Missing properties resolve
/// to nil.
pub fn read_property(value: &ContextValue, key: &PathKey, own_only: bool) -> ContextValue {
    match (value, key) {
        (ContextValue::Drop(drop), PathKey::Key(k)) => {
            let direct = drop.get(k);
            if own_only {
                direct.unwrap_or_default()
            } else {
                direct
                    .or_else(|| drop.method_missing(k))
                    .unwrap_or_default()
            }
        }
        (ContextValue::Array(items), PathKey::Index(i)) => index_array(items, *i),
        (ContextValue::Array(items), PathKey::Key(k)) => {
            if let Ok(i) = k.parse::<i64>() {
                return index_array(items, i);
            }
            if own_only {
                return ContextValue::Nil;
            }
            match k.as_str() {
                "size" => ContextValue::from(items.len()),
                "first" => items.first().cloned().unwrap_or_default(),
                "last" => items.last().cloned().unwrap_or_default(),
                _ => ContextValue::Nil,
            }
        }
        (ContextValue::Str(s), PathKey::Key(k)) => {
            if !own_only && k == "size" {
                ContextValue::from(s.chars().count())
            } else {
                ContextValue::Nil
            }
        }
        (ContextValue::Object(map), PathKey::Key(k)) => match map.get(k) {
            Some(v) => v.clone(),
            None if !own_only && k == "size" => ContextValue::from(map.len()),
            None => ContextValue::Nil,
        },
        _ => ContextValue::Nil,
    }
}

fn index_array(items: &[ContextValue], index: i64) -> ContextValue {
    let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let effective = if index < 0 { index + len } else { index };
    usize::try_from(effective)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .unwrap_or_default()
}
