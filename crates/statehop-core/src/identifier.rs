//! Namespaced feature identifiers
//!
//! An [`Identifier`] names one syncable feature (`statehop:inventory`,
//! `myplugin:quests`, ...). Two identifiers are equal when their
//! `namespace:key` strings are equal; the enabled default and dependency set
//! are declaration data and do not take part in equality.

use crate::errors::{Result, SnapshotError};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Namespace reserved for the built-in features
pub const BUILTIN_NAMESPACE: &str = "statehop";

/// A declared dependency on another identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dependency {
    key: String,
    required: bool,
}

impl Dependency {
    /// The dependent feature cannot be enabled unless `on` is enabled
    pub fn required(on: &Identifier) -> Self {
        Self {
            key: on.as_key(),
            required: true,
        }
    }

    /// Only affects application order when `on` is present
    pub fn optional(on: &Identifier) -> Self {
        Self {
            key: on.as_key(),
            required: false,
        }
    }

    /// Full `namespace:key` of the identifier depended upon
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// A namespaced key naming a syncable feature
#[derive(Debug, Clone)]
pub struct Identifier {
    namespace: String,
    key: String,
    enabled_by_default: bool,
    dependencies: BTreeSet<Dependency>,
}

impl Identifier {
    /// Build an identifier outside the built-in namespace
    ///
    /// # Errors
    ///
    /// Fails if either part is not lowercase `[a-z0-9_.-]+`, or if the
    /// namespace is the reserved built-in one.
    pub fn custom(namespace: &str, key: &str) -> Result<Self> {
        if namespace == BUILTIN_NAMESPACE {
            return Err(SnapshotError::ReservedNamespace {
                key: format!("{}:{}", namespace, key),
            });
        }
        Self::checked(namespace, key)
    }

    /// Parse `namespace:key`
    ///
    /// Built-in keys resolve to the declared built-in identifier so that the
    /// result carries its defaults and dependencies.
    pub fn parse(full: &str) -> Result<Self> {
        let (namespace, key) = full.split_once(':').ok_or_else(|| SnapshotError::InvalidSnapshot {
            reason: format!("identifier '{}' is not of the form namespace:key", full),
        })?;
        if namespace == BUILTIN_NAMESPACE {
            return BuiltinFeature::from_key(key)
                .map(|feature| feature.identifier())
                .ok_or_else(|| SnapshotError::InvalidSnapshot {
                    reason: format!("unknown built-in identifier '{}'", full),
                });
        }
        Self::checked(namespace, key)
    }

    fn checked(namespace: &str, key: &str) -> Result<Self> {
        for part in [namespace, key] {
            let valid = !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_.-".contains(c));
            if !valid {
                return Err(SnapshotError::InvalidSnapshot {
                    reason: format!("invalid identifier part '{}' in {}:{}", part, namespace, key),
                });
            }
        }
        Ok(Self::unchecked(namespace, key))
    }

    fn unchecked(namespace: &str, key: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
            enabled_by_default: true,
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_by_default = enabled;
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.insert(dependency);
        self
    }

    pub(crate) fn add_dependencies(&mut self, dependencies: impl IntoIterator<Item = Dependency>) {
        self.dependencies.extend(dependencies);
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `namespace:key`
    pub fn as_key(&self) -> String {
        format!("{}:{}", self.namespace, self.key)
    }

    pub fn is_builtin(&self) -> bool {
        self.namespace == BUILTIN_NAMESPACE
    }

    pub fn is_enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter()
    }

    pub fn depends_on(&self, other: &Identifier) -> bool {
        let key = other.as_key();
        self.dependencies.iter().any(|d| d.key == key)
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.key == other.key
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.key.hash(state);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.namespace, &self.key).cmp(&(&other.namespace, &other.key))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.key)
    }
}

/// The closed set of built-in features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinFeature {
    Inventory,
    EnderChest,
    PotionEffects,
    Advancements,
    Location,
    Statistics,
    Health,
    Food,
    Experience,
    GameMode,
    PersistentData,
}

impl BuiltinFeature {
    pub const ALL: [BuiltinFeature; 11] = [
        BuiltinFeature::Inventory,
        BuiltinFeature::EnderChest,
        BuiltinFeature::PotionEffects,
        BuiltinFeature::Advancements,
        BuiltinFeature::Location,
        BuiltinFeature::Statistics,
        BuiltinFeature::Health,
        BuiltinFeature::Food,
        BuiltinFeature::Experience,
        BuiltinFeature::GameMode,
        BuiltinFeature::PersistentData,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            BuiltinFeature::Inventory => "inventory",
            BuiltinFeature::EnderChest => "ender_chest",
            BuiltinFeature::PotionEffects => "potion_effects",
            BuiltinFeature::Advancements => "advancements",
            BuiltinFeature::Location => "location",
            BuiltinFeature::Statistics => "statistics",
            BuiltinFeature::Health => "health",
            BuiltinFeature::Food => "food",
            BuiltinFeature::Experience => "experience",
            BuiltinFeature::GameMode => "game_mode",
            BuiltinFeature::PersistentData => "persistent_data",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    /// The declared identifier, with its enabled default and dependencies
    pub fn identifier(&self) -> Identifier {
        let id = Identifier::unchecked(BUILTIN_NAMESPACE, self.key());
        match self {
            // Teleporting players between worlds is opt-in
            BuiltinFeature::Location => id
                .with_enabled_by_default(false)
                .with_dependency(Self::dep(BuiltinFeature::PotionEffects))
                .with_dependency(Self::dep(BuiltinFeature::GameMode)),
            BuiltinFeature::Health => id.with_dependency(Self::dep(BuiltinFeature::PotionEffects)),
            BuiltinFeature::Food => id.with_dependency(Self::dep(BuiltinFeature::Health)),
            BuiltinFeature::Experience => {
                id.with_dependency(Self::dep(BuiltinFeature::Advancements))
            }
            _ => id,
        }
    }

    fn dep(on: BuiltinFeature) -> Dependency {
        Dependency {
            key: format!("{}:{}", BUILTIN_NAMESPACE, on.key()),
            required: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_declaration_data() {
        let a = Identifier::custom("quests", "progress").unwrap();
        let b = Identifier::custom("quests", "progress")
            .unwrap()
            .with_enabled_by_default(false)
            .with_dependency(Dependency::required(&BuiltinFeature::Inventory.identifier()));
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_rejects_builtin_namespace() {
        let err = Identifier::custom(BUILTIN_NAMESPACE, "inventory").unwrap_err();
        assert!(matches!(err, SnapshotError::ReservedNamespace { .. }));
    }

    #[test]
    fn test_custom_rejects_bad_characters() {
        assert!(Identifier::custom("Quests", "progress").is_err());
        assert!(Identifier::custom("quests", "").is_err());
        assert!(Identifier::custom("quests", "a:b").is_err());
    }

    #[test]
    fn test_parse_builtin_keeps_defaults() {
        let location = Identifier::parse("statehop:location").unwrap();
        assert!(!location.is_enabled_by_default());
        assert!(location.depends_on(&BuiltinFeature::PotionEffects.identifier()));
        assert!(Identifier::parse("statehop:nonsense").is_err());
        assert!(Identifier::parse("no-colon").is_err());
    }

    #[test]
    fn test_builtin_keys_round_trip() {
        for feature in BuiltinFeature::ALL {
            assert_eq!(BuiltinFeature::from_key(feature.key()), Some(feature));
            assert!(feature.identifier().is_builtin());
        }
    }

    #[test]
    fn test_builtins_have_no_required_dependencies() {
        for feature in BuiltinFeature::ALL {
            assert!(feature.identifier().dependencies().all(|d| !d.is_required()));
        }
    }
}
