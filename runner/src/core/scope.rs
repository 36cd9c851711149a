//! Scoped input sources consulted during argument resolution.
//!
//! Plain arguments are looked up in a fixed precedence order: module, node,
//! sample, config. Resource arguments go through the resource catalog
//! instead (see [`crate::core::resolver`]).

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key → value lookup for one scope.
pub type ScopeMap = BTreeMap<String, Value>;

/// One of the four ordered input sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Module,
    Node,
    Sample,
    Config,
}

impl Scope {
    /// Resolution order for plain arguments; first hit wins.
    pub const PRECEDENCE: [Scope; 4] = [Scope::Module, Scope::Node, Scope::Sample, Scope::Config];
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => f.write_str("module"),
            Self::Node => f.write_str("node"),
            Self::Sample => f.write_str("sample"),
            Self::Config => f.write_str("config"),
        }
    }
}

/// A named file or tool dependency owned by the resource catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub name: String,
    pub path: PathBuf,
}

impl ResourceRef {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Resource catalog: argument key → (resource name → resource).
pub type ResourceCatalog = BTreeMap<String, BTreeMap<String, ResourceRef>>;

/// The four scoped sources plus the resource catalog for one Worker run.
///
/// Any source may be absent; an absent source never matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedInputs {
    module: Option<ScopeMap>,
    node: Option<ScopeMap>,
    sample: Option<ScopeMap>,
    config: Option<ScopeMap>,
    resources: Option<ResourceCatalog>,
}

impl ScopedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: Scope, values: ScopeMap) -> Self {
        *self.slot_mut(scope) = Some(values);
        self
    }

    pub fn with_resources(mut self, resources: ResourceCatalog) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Insert one value into a scope, creating the scope if absent.
    pub fn insert(&mut self, scope: Scope, key: impl Into<String>, value: impl Into<Value>) {
        self.slot_mut(scope)
            .get_or_insert_with(ScopeMap::new)
            .insert(key.into(), value.into());
    }

    /// Register a resource under `key`, creating the catalog if absent.
    pub fn insert_resource(&mut self, key: impl Into<String>, resource: ResourceRef) {
        self.resources
            .get_or_insert_with(ResourceCatalog::new)
            .entry(key.into())
            .or_default()
            .insert(resource.name.clone(), resource);
    }

    pub fn scope(&self, scope: Scope) -> Option<&ScopeMap> {
        match scope {
            Scope::Module => self.module.as_ref(),
            Scope::Node => self.node.as_ref(),
            Scope::Sample => self.sample.as_ref(),
            Scope::Config => self.config.as_ref(),
        }
    }

    pub fn resources(&self) -> Option<&ResourceCatalog> {
        self.resources.as_ref()
    }

    /// Sources in precedence order, absent ones included as `None`.
    pub fn ordered(&self) -> impl Iterator<Item = (Scope, Option<&ScopeMap>)> {
        Scope::PRECEDENCE
            .into_iter()
            .map(move |scope| (scope, self.scope(scope)))
    }

    /// First value for `key` in precedence order, with the scope it came from.
    pub fn lookup(&self, key: &str) -> Option<(Scope, &Value)> {
        self.ordered()
            .find_map(|(scope, map)| map.and_then(|m| m.get(key)).map(|v| (scope, v)))
    }

    /// Every key any source can provide, resource keys included.
    pub fn provided_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .ordered()
            .filter_map(|(_, map)| map)
            .flat_map(|m| m.keys().map(String::as_str))
            .chain(
                self.resources
                    .iter()
                    .flat_map(|r| r.keys().map(String::as_str)),
            )
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    fn slot_mut(&mut self, scope: Scope) -> &mut Option<ScopeMap> {
        match scope {
            Scope::Module => &mut self.module,
            Scope::Node => &mut self.node,
            Scope::Sample => &mut self.sample,
            Scope::Config => &mut self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_follows_precedence() {
        let mut inputs = ScopedInputs::new();
        inputs.insert(Scope::Config, "mem", 4);
        inputs.insert(Scope::Sample, "mem", 8);
        assert_eq!(inputs.lookup("mem"), Some((Scope::Sample, &json!(8))));

        inputs.insert(Scope::Module, "mem", 16);
        assert_eq!(inputs.lookup("mem"), Some((Scope::Module, &json!(16))));
        assert_eq!(inputs.lookup("absent"), None);
    }

    #[test]
    fn ordered_reports_absent_scopes() {
        let inputs = ScopedInputs::new().with_scope(Scope::Node, ScopeMap::new());
        let order: Vec<(Scope, bool)> = inputs
            .ordered()
            .map(|(scope, map)| (scope, map.is_some()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Scope::Module, false),
                (Scope::Node, true),
                (Scope::Sample, false),
                (Scope::Config, false),
            ]
        );
    }

    #[test]
    fn provided_keys_are_sorted_and_unique() {
        let mut inputs = ScopedInputs::new();
        inputs.insert(Scope::Sample, "bam", "a.bam");
        inputs.insert(Scope::Config, "bam", "b.bam");
        inputs.insert_resource("ref", ResourceRef::new("hg38", "/ref/hg38.fa"));
        assert_eq!(inputs.provided_keys(), vec!["bam", "ref"]);
    }
}
