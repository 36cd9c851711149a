//! Named, precedence-resolvable argument slots.
//!
//! An [`Argument`] is declared while a module defines its inputs and is set
//! exactly once, by the resolver, before command generation. "Unset" and
//! "set to null" are distinct states: a default of `Value::Null` is a
//! deliberate absence that still counts as resolved.

use indexmap::IndexMap;
use serde_json::Value;

use crate::core::error::ModuleError;

/// Resolution state of an argument value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ArgValue {
    #[default]
    Unset,
    Set(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    name: String,
    value: ArgValue,
    resource: bool,
    mandatory: bool,
    default: Option<Value>,
}

impl Argument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: ArgValue::Unset,
            resource: false,
            mandatory: false,
            default: None,
        }
    }

    /// Mark the argument as required for the module to run.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Mark the argument as a resource looked up through the resource catalog.
    pub fn resource(mut self) -> Self {
        self.resource = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_resource(&self) -> bool {
        self.resource
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_set(&self) -> bool {
        matches!(self.value, ArgValue::Set(_))
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn state(&self) -> &ArgValue {
        &self.value
    }

    /// Resolved value, `None` while unset.
    pub fn value(&self) -> Option<&Value> {
        match &self.value {
            ArgValue::Set(value) => Some(value),
            ArgValue::Unset => None,
        }
    }

    pub(crate) fn set(&mut self, value: Value) {
        self.value = ArgValue::Set(value);
    }
}

/// Arguments of one module, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentSet {
    args: IndexMap<String, Argument>,
}

impl ArgumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an argument. A second declaration of the same name is a
    /// contract error of the declaring module.
    pub fn add(&mut self, module_id: &str, argument: Argument) -> Result<(), ModuleError> {
        if self.args.contains_key(argument.name()) {
            return Err(ModuleError::invalid_argument(
                module_id,
                argument.name(),
                "declared more than once",
            ));
        }
        self.args.insert(argument.name.clone(), argument);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.args.get(name)
    }

    /// Resolved value of `name`; `None` if undeclared or unset.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.args.get(name).and_then(Argument::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Argument> {
        self.args.values_mut()
    }
}

/// Render a scalar argument value the way it appears on a command line.
///
/// Strings are emitted without quotes; other values use their JSON form.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten a "value or list of values" argument into its rendered items.
/// `null` yields no items.
pub fn value_items(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(display_value).collect(),
        other => vec![display_value(other)],
    }
}

/// Read a non-negative integer from a JSON number or a numeric string.
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
