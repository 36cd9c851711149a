//! Argument resolution across scoped inputs.
//!
//! Resolution order for one argument:
//! 1. Resource arguments: the config scope names a resource, which is fetched
//!    from the catalog under the argument key. Without a config entry the
//!    catalog is used directly when it holds exactly one resource for the key.
//! 2. Plain arguments: first hit in module → node → sample → config.
//! 3. Default value. `nr_cpus`/`mem` with default `"max"` take the platform
//!    capacity.
//! 4. Still unset and mandatory: [`ModuleError::UnresolvedArgument`].

use std::fmt;

use serde_json::Value;
use tracing::{debug, error};

use crate::core::argument::{Argument, ArgumentSet};
use crate::core::error::ModuleError;
use crate::core::platform::PlatformInfo;
use crate::core::scope::{Scope, ScopedInputs};

/// Token that asks for the platform's full capacity.
pub const MAX_SENTINEL: &str = "max";

/// Where an argument's value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFrom {
    Scope(Scope),
    /// Resource named by the config scope.
    ConfigResource { resource: String },
    /// Sole resource registered for the key.
    CatalogResource { resource: String },
    Default,
    /// `"max"` default replaced by platform capacity.
    PlatformCapacity,
    /// Optional argument left unset.
    Unset,
}

impl fmt::Display for ResolvedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scope(scope) => write!(f, "{scope} scope"),
            Self::ConfigResource { resource } => write!(f, "resource '{resource}' named by config"),
            Self::CatalogResource { resource } => write!(f, "sole resource '{resource}'"),
            Self::Default => f.write_str("default"),
            Self::PlatformCapacity => f.write_str("platform capacity"),
            Self::Unset => f.write_str("unset"),
        }
    }
}

/// Resolution record for one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub argument: String,
    pub from: ResolvedFrom,
}

/// Resolve every argument in declaration order, stopping at the first
/// mandatory argument that cannot be set.
pub fn resolve_arguments(
    module_id: &str,
    arguments: &mut ArgumentSet,
    inputs: &ScopedInputs,
    platform: &dyn PlatformInfo,
) -> Result<Vec<Resolution>, ModuleError> {
    let mut resolutions = Vec::with_capacity(arguments.len());
    for argument in arguments.iter_mut() {
        let from = resolve_argument(module_id, argument, inputs, platform)?;
        debug!(module = module_id, argument = argument.name(), from = %from, "argument resolved");
        resolutions.push(Resolution {
            argument: argument.name().to_string(),
            from,
        });
    }
    Ok(resolutions)
}

/// Resolve a single argument in place.
pub fn resolve_argument(
    module_id: &str,
    argument: &mut Argument,
    inputs: &ScopedInputs,
    platform: &dyn PlatformInfo,
) -> Result<ResolvedFrom, ModuleError> {
    let found = if argument.is_resource() {
        lookup_resource(module_id, argument.name(), inputs)?
    } else {
        inputs
            .lookup(argument.name())
            .map(|(scope, value)| (ResolvedFrom::Scope(scope), value.clone()))
    };

    if let Some((from, value)) = found {
        argument.set(value);
        return Ok(from);
    }

    if let Some(default) = argument.default().cloned() {
        let from = match capacity_sentinel(argument.name(), &default, platform) {
            Some(capacity) => {
                argument.set(Value::from(capacity));
                ResolvedFrom::PlatformCapacity
            }
            None => {
                argument.set(default);
                ResolvedFrom::Default
            }
        };
        return Ok(from);
    }

    if argument.is_mandatory() {
        error!(module = module_id, argument = argument.name(), "required argument could not be set");
        let detail = if argument.is_resource() {
            "no resource in config or catalog, and no default"
        } else {
            "not found in module, node, sample or config scope, and no default"
        };
        return Err(ModuleError::UnresolvedArgument {
            module: module_id.to_string(),
            argument: argument.name().to_string(),
            detail: detail.to_string(),
        });
    }

    Ok(ResolvedFrom::Unset)
}

fn lookup_resource(
    module_id: &str,
    key: &str,
    inputs: &ScopedInputs,
) -> Result<Option<(ResolvedFrom, Value)>, ModuleError> {
    let catalog_entry = inputs.resources().and_then(|catalog| catalog.get(key));

    if let Some(named) = inputs.scope(Scope::Config).and_then(|config| config.get(key)) {
        let unresolved = |detail: String| ModuleError::UnresolvedArgument {
            module: module_id.to_string(),
            argument: key.to_string(),
            detail,
        };
        let Value::String(resource_name) = named else {
            return Err(unresolved(format!(
                "config scope must name a resource, got {named}"
            )));
        };
        let resource = catalog_entry
            .and_then(|by_name| by_name.get(resource_name))
            .ok_or_else(|| {
                unresolved(format!(
                    "config names resource '{resource_name}' which is not in the resource catalog"
                ))
            })?;
        return Ok(Some((
            ResolvedFrom::ConfigResource {
                resource: resource.name.clone(),
            },
            path_value(&resource.path),
        )));
    }

    match catalog_entry {
        Some(by_name) if by_name.len() == 1 => {
            let resource = by_name.values().next().map(|r| {
                (
                    ResolvedFrom::CatalogResource {
                        resource: r.name.clone(),
                    },
                    path_value(&r.path),
                )
            });
            Ok(resource)
        }
        Some(by_name) => {
            debug!(
                module = module_id,
                argument = key,
                candidates = by_name.len(),
                "resource is ambiguous without a config selection"
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

fn capacity_sentinel(name: &str, default: &Value, platform: &dyn PlatformInfo) -> Option<u64> {
    let Value::String(token) = default else {
        return None;
    };
    if !token.eq_ignore_ascii_case(MAX_SENTINEL) {
        return None;
    }
    match name {
        "nr_cpus" => Some(platform.max_cpus()),
        "mem" => Some(platform.max_mem()),
        _ => None,
    }
}

fn path_value(path: &std::path::Path) -> Value {
    Value::String(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scope::ResourceRef;
    use crate::test_support::test_platform;
    use serde_json::json;

    fn resolve(argument: &mut Argument, inputs: &ScopedInputs) -> Result<ResolvedFrom, ModuleError> {
        resolve_argument("mod1", argument, inputs, &test_platform())
    }

    #[test]
    fn module_scope_beats_sample_scope() {
        let mut inputs = ScopedInputs::new();
        inputs.insert(Scope::Sample, "bam", "sample.bam");
        inputs.insert(Scope::Module, "bam", "module.bam");
        let mut arg = Argument::new("bam").mandatory();

        let from = resolve(&mut arg, &inputs).expect("resolve");
        assert_eq!(from, ResolvedFrom::Scope(Scope::Module));
        assert_eq!(arg.value(), Some(&json!("module.bam")));
    }

    #[test]
    fn scans_every_scope_in_order() {
        let mut inputs = ScopedInputs::new();
        inputs.insert(Scope::Config, "k", "config");
        let mut arg = Argument::new("k");
        assert_eq!(resolve(&mut arg, &inputs).unwrap(), ResolvedFrom::Scope(Scope::Config));

        inputs.insert(Scope::Sample, "k", "sample");
        let mut arg = Argument::new("k");
        assert_eq!(resolve(&mut arg, &inputs).unwrap(), ResolvedFrom::Scope(Scope::Sample));

        inputs.insert(Scope::Node, "k", "node");
        let mut arg = Argument::new("k");
        assert_eq!(resolve(&mut arg, &inputs).unwrap(), ResolvedFrom::Scope(Scope::Node));
        assert_eq!(arg.value(), Some(&json!("node")));
    }

    #[test]
    fn scope_hit_beats_default() {
        let mut inputs = ScopedInputs::new();
        inputs.insert(Scope::Config, "mem", 4);
        let mut arg = Argument::new("mem").default_value(MAX_SENTINEL);
        assert_eq!(resolve(&mut arg, &inputs).unwrap(), ResolvedFrom::Scope(Scope::Config));
        assert_eq!(arg.value(), Some(&json!(4)));
    }

    #[test]
    fn max_sentinel_uses_platform_capacity() {
        let platform = test_platform();
        let inputs = ScopedInputs::new();

        let mut cpus = Argument::new("nr_cpus").mandatory().default_value("max");
        let from = resolve(&mut cpus, &inputs).expect("cpus");
        assert_eq!(from, ResolvedFrom::PlatformCapacity);
        assert_eq!(cpus.value(), Some(&json!(platform.max_cpus())));

        let mut mem = Argument::new("mem").mandatory().default_value("MAX");
        resolve(&mut mem, &inputs).expect("mem");
        assert_eq!(mem.value(), Some(&json!(platform.max_mem())));
    }

    #[test]
    fn max_token_is_literal_for_other_arguments() {
        let mut arg = Argument::new("threads").default_value("max");
        assert_eq!(resolve(&mut arg, &ScopedInputs::new()).unwrap(), ResolvedFrom::Default);
        assert_eq!(arg.value(), Some(&json!("max")));
    }

    #[test]
    fn null_default_resolves_to_null() {
        let mut arg = Argument::new("note").default_value(Value::Null);
        assert_eq!(resolve(&mut arg, &ScopedInputs::new()).unwrap(), ResolvedFrom::Default);
        assert!(arg.is_set());
    }

    #[test]
    fn optional_without_default_stays_unset() {
        let mut arg = Argument::new("location");
        assert_eq!(resolve(&mut arg, &ScopedInputs::new()).unwrap(), ResolvedFrom::Unset);
        assert!(!arg.is_set());
    }

    #[test]
    fn mandatory_without_value_fails_with_module_and_name() {
        let mut arg = Argument::new("bam").mandatory();
        let err = resolve(&mut arg, &ScopedInputs::new()).unwrap_err();
        match err {
            ModuleError::UnresolvedArgument { module, argument, .. } => {
                assert_eq!(module, "mod1");
                assert_eq!(argument, "bam");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn config_names_resource_in_catalog() {
        let mut inputs = ScopedInputs::new();
        inputs.insert(Scope::Config, "ref", "hg19");
        inputs.insert_resource("ref", ResourceRef::new("hg38", "/ref/hg38.fa"));
        inputs.insert_resource("ref", ResourceRef::new("hg19", "/ref/hg19.fa"));
        let mut arg = Argument::new("ref").resource().mandatory();

        let from = resolve(&mut arg, &inputs).expect("resolve");
        assert_eq!(
            from,
            ResolvedFrom::ConfigResource {
                resource: "hg19".to_string()
            }
        );
        assert_eq!(arg.value(), Some(&json!("/ref/hg19.fa")));
    }

    #[test]
    fn resource_ignores_module_scope() {
        let mut inputs = ScopedInputs::new();
        inputs.insert(Scope::Module, "ref", "/module/ref.fa");
        inputs.insert_resource("ref", ResourceRef::new("hg38", "/ref/hg38.fa"));
        let mut arg = Argument::new("ref").resource();

        resolve(&mut arg, &inputs).expect("resolve");
        assert_eq!(arg.value(), Some(&json!("/ref/hg38.fa")));
    }

    #[test]
    fn single_catalog_resource_is_used_directly() {
        let mut inputs = ScopedInputs::new();
        inputs.insert_resource("gatk", ResourceRef::new("gatk4", "/opt/gatk.jar"));
        let mut arg = Argument::new("gatk").resource().mandatory();

        let from = resolve(&mut arg, &inputs).expect("resolve");
        assert_eq!(
            from,
            ResolvedFrom::CatalogResource {
                resource: "gatk4".to_string()
            }
        );
    }

    #[test]
    fn ambiguous_catalog_without_config_is_unresolved() {
        let mut inputs = ScopedInputs::new();
        inputs.insert_resource("ref", ResourceRef::new("hg38", "/ref/hg38.fa"));
        inputs.insert_resource("ref", ResourceRef::new("hg19", "/ref/hg19.fa"));
        let mut arg = Argument::new("ref").resource().mandatory();

        let err = resolve(&mut arg, &inputs).unwrap_err();
        assert!(matches!(err, ModuleError::UnresolvedArgument { .. }));
    }

    #[test]
    fn config_naming_unknown_resource_fails() {
        let mut inputs = ScopedInputs::new();
        inputs.insert(Scope::Config, "ref", "mm10");
        inputs.insert_resource("ref", ResourceRef::new("hg38", "/ref/hg38.fa"));
        let mut arg = Argument::new("ref").resource();

        let err = resolve(&mut arg, &inputs).unwrap_err();
        assert!(err.to_string().contains("mm10"), "got: {err}");
    }

    #[test]
    fn resolve_arguments_stops_at_first_failure() {
        let mut args = ArgumentSet::new();
        args.add("mod1", Argument::new("a").default_value(1)).unwrap();
        args.add("mod1", Argument::new("b").mandatory()).unwrap();
        args.add("mod1", Argument::new("c").default_value(3)).unwrap();

        let err = resolve_arguments("mod1", &mut args, &ScopedInputs::new(), &test_platform())
            .unwrap_err();
        assert!(matches!(err, ModuleError::UnresolvedArgument { ref argument, .. } if argument == "b"));
        assert!(args.get("a").unwrap().is_set());
        assert!(!args.get("c").unwrap().is_set());
    }
}
