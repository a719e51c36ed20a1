//! Serializer registry
//!
//! Registration happens on a mutable [`RegistryBuilder`] while the process
//! starts up. [`RegistryBuilder::freeze`] applies the enable/disable
//! settings, validates dependencies and computes the application order,
//! producing an immutable [`SerializerRegistry`] that is shared behind an
//! `Arc`. A settings reload builds a fresh frozen registry via
//! [`SerializerRegistry::reload`]; the live one is never mutated.

use crate::data::DataContainer;
use crate::errors::{Result, SnapshotError};
use crate::identifier::{Dependency, Identifier};
use crate::serializer::{builtin_serializers, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Enable/disable overrides keyed by identifier
///
/// Keys are either the full `namespace:key` or, for built-ins, the bare key
/// (`inventory = true`).
pub type FeatureToggles = BTreeMap<String, bool>;

struct Registration {
    identifier: Identifier,
    serializer: Arc<dyn Serializer>,
}

/// Mutable registration phase
#[derive(Default)]
pub struct RegistryBuilder {
    registrations: BTreeMap<String, Registration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder with every built-in feature registered
    pub fn with_builtins() -> Self {
        let mut builder = Self::new();
        for (identifier, serializer) in builtin_serializers() {
            builder.registrations.insert(
                identifier.as_key(),
                Registration {
                    identifier,
                    serializer,
                },
            );
        }
        builder
    }

    /// Register a serializer for an identifier
    ///
    /// `dependencies` are merged into those the identifier already declares.
    ///
    /// # Errors
    ///
    /// `DuplicateIdentifier` if the identifier is already registered
    /// (built-ins included); registration never overrides.
    pub fn register(
        &mut self,
        identifier: Identifier,
        serializer: Arc<dyn Serializer>,
        dependencies: impl IntoIterator<Item = Dependency>,
    ) -> Result<()> {
        let key = identifier.as_key();
        if self.registrations.contains_key(&key) {
            return Err(SnapshotError::DuplicateIdentifier { key });
        }
        let mut identifier = identifier;
        identifier.add_dependencies(dependencies);
        tracing::debug!(identifier = %key, "registered serializer");
        self.registrations.insert(
            key,
            Registration {
                identifier,
                serializer,
            },
        );
        Ok(())
    }

    pub fn is_registered(&self, identifier: &Identifier) -> bool {
        self.registrations.contains_key(&identifier.as_key())
    }

    /// Validate and freeze
    ///
    /// # Errors
    ///
    /// `UnmetDependency` naming the first enabled identifier whose required
    /// dependency is missing or disabled, or `DependencyCycle`.
    pub fn freeze(self, toggles: &FeatureToggles) -> Result<SerializerRegistry> {
        SerializerRegistry::build(self.registrations.into_values().collect(), toggles)
    }
}

/// One frozen registry entry
#[derive(Clone)]
pub struct RegisteredSerializer {
    identifier: Identifier,
    serializer: Arc<dyn Serializer>,
    enabled: bool,
}

impl RegisteredSerializer {
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl std::fmt::Debug for RegisteredSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredSerializer")
            .field("identifier", &self.identifier.as_key())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Immutable, dependency-ordered codec table
#[derive(Debug, Clone)]
pub struct SerializerRegistry {
    ordered: Vec<RegisteredSerializer>,
    index: HashMap<String, usize>,
}

impl SerializerRegistry {
    fn build(registrations: Vec<Registration>, toggles: &FeatureToggles) -> Result<Self> {
        let entries: BTreeMap<String, RegisteredSerializer> = registrations
            .into_iter()
            .map(|r| {
                let enabled = resolve_enabled(&r.identifier, toggles);
                (
                    r.identifier.as_key(),
                    RegisteredSerializer {
                        identifier: r.identifier,
                        serializer: r.serializer,
                        enabled,
                    },
                )
            })
            .collect();

        validate_dependencies(&entries)?;
        let order = topological_order(&entries)?;

        let mut entries = entries;
        let ordered: Vec<RegisteredSerializer> = order
            .iter()
            .filter_map(|key| entries.remove(key))
            .collect();
        let index = ordered
            .iter()
            .enumerate()
            .map(|(i, e)| (e.identifier.as_key(), i))
            .collect();

        tracing::info!(
            registered = ordered.len(),
            enabled = ordered.iter().filter(|e| e.enabled).count(),
            "serializer registry frozen"
        );
        Ok(Self { ordered, index })
    }

    /// Every registered serializer, dependencies before dependents
    pub fn serializers(&self) -> impl Iterator<Item = &RegisteredSerializer> {
        self.ordered.iter()
    }

    /// Enabled serializers only, in dependency order
    pub fn enabled(&self) -> impl Iterator<Item = &RegisteredSerializer> {
        self.ordered.iter().filter(|e| e.enabled)
    }

    /// Look up by full `namespace:key`
    pub fn get(&self, key: &str) -> Option<&RegisteredSerializer> {
        self.index.get(key).map(|&i| &self.ordered[i])
    }

    pub fn is_enabled(&self, identifier: &Identifier) -> bool {
        self.get(&identifier.as_key()).is_some_and(|e| e.enabled)
    }

    /// Position in the application order, if registered
    pub fn position(&self, identifier: &Identifier) -> Option<usize> {
        self.index.get(&identifier.as_key()).copied()
    }

    pub fn serialize(&self, identifier: &Identifier, container: &DataContainer) -> Result<Vec<u8>> {
        self.require(identifier)?.serializer.serialize(container)
    }

    pub fn deserialize(&self, identifier: &Identifier, bytes: &[u8]) -> Result<DataContainer> {
        self.require(identifier)?.serializer.deserialize(bytes)
    }

    fn require(&self, identifier: &Identifier) -> Result<&RegisteredSerializer> {
        self.get(&identifier.as_key())
            .ok_or_else(|| SnapshotError::MissingSerializer {
                key: identifier.as_key(),
            })
    }

    /// Re-apply toggles to the same registrations and re-validate
    ///
    /// # Errors
    ///
    /// Same as [`RegistryBuilder::freeze`]; on error the caller keeps using
    /// the current registry.
    pub fn reload(&self, toggles: &FeatureToggles) -> Result<SerializerRegistry> {
        let registrations = self
            .ordered
            .iter()
            .map(|e| Registration {
                identifier: e.identifier.clone(),
                serializer: e.serializer.clone(),
            })
            .collect();
        Self::build(registrations, toggles)
    }
}

fn resolve_enabled(identifier: &Identifier, toggles: &FeatureToggles) -> bool {
    toggles
        .get(&identifier.as_key())
        .or_else(|| {
            identifier
                .is_builtin()
                .then(|| toggles.get(identifier.key()))
                .flatten()
        })
        .copied()
        .unwrap_or(identifier.is_enabled_by_default())
}

fn validate_dependencies(entries: &BTreeMap<String, RegisteredSerializer>) -> Result<()> {
    for (key, entry) in entries.iter().filter(|(_, e)| e.enabled) {
        for dependency in entry.identifier.dependencies().filter(|d| d.is_required()) {
            let satisfied = entries
                .get(dependency.key())
                .is_some_and(|dep| dep.enabled);
            if !satisfied {
                return Err(SnapshotError::UnmetDependency {
                    identifier: key.clone(),
                    dependency: dependency.key().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm; ties are broken by key so the order is stable across
/// processes.
fn topological_order(entries: &BTreeMap<String, RegisteredSerializer>) -> Result<Vec<String>> {
    let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (key, entry) in entries {
        let deps: BTreeSet<&str> = entry
            .identifier
            .dependencies()
            .map(|d| d.key())
            .filter(|dep| entries.contains_key(*dep))
            .collect();
        pending.insert(key.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(key.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut order = Vec::with_capacity(entries.len());

    while let Some(key) = ready.pop_first() {
        order.push(key.to_string());
        pending.remove(key);
        for &dependent in dependents.get(key).map(Vec::as_slice).unwrap_or_default() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if !pending.is_empty() {
        return Err(SnapshotError::DependencyCycle {
            members: pending.keys().map(|k| k.to_string()).collect(),
        });
    }
    Ok(order)
}
