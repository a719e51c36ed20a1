//! Per-feature data containers
//!
//! Built-in features are a closed enum so every consumer matches them
//! exhaustively; third-party features travel through [`DataContainer::Custom`]
//! and are decoded by whatever serializer was registered for their
//! identifier.

pub mod owner;

use crate::errors::{Result, SnapshotError};
use crate::identifier::{BuiltinFeature, Identifier};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub use owner::DataOwner;

/// One stack of items in a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub material: String,
    pub amount: u32,
    /// Opaque engine-side item metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Value>,
}

impl ItemStack {
    pub fn new(material: impl Into<String>, amount: u32) -> Self {
        Self {
            material: material.into(),
            amount,
            tags: BTreeMap::new(),
        }
    }
}

/// Fixed-size slot array; `None` is an empty slot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Items {
    pub slots: Vec<Option<ItemStack>>,
}

impl Items {
    pub fn with_size(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    pub fn occupied(&self) -> impl Iterator<Item = (usize, &ItemStack)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|stack| (i, stack)))
    }

    fn preview(&self) -> Value {
        let stacks: Vec<Value> = self
            .occupied()
            .map(|(slot, stack)| json!({ "slot": slot, "material": stack.material, "amount": stack.amount }))
            .collect();
        json!({ "size": self.slots.len(), "occupied": stacks.len(), "stacks": stacks })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Items,
    pub held_slot: u8,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnderChest {
    pub items: Items,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotionEffect {
    pub kind: String,
    pub amplifier: u8,
    pub duration_ticks: i32,
    #[serde(default)]
    pub ambient: bool,
    #[serde(default = "default_true")]
    pub show_particles: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PotionEffects {
    pub effects: Vec<PotionEffect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advancement {
    pub key: String,
    /// Criterion name to completion time (epoch millis)
    pub criteria: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Advancements {
    pub completed: Vec<Advancement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub generic: BTreeMap<String, i64>,
    /// Statistic name to per-block counts
    #[serde(default)]
    pub blocks: BTreeMap<String, BTreeMap<String, i64>>,
    #[serde(default)]
    pub items: BTreeMap<String, BTreeMap<String, i64>>,
    #[serde(default)]
    pub entities: BTreeMap<String, BTreeMap<String, i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub health: f64,
    pub health_scale: f64,
    #[serde(default)]
    pub health_scaled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub food_level: i32,
    pub saturation: f32,
    pub exhaustion: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub total: i32,
    pub level: i32,
    pub progress: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMode {
    pub mode: String,
    #[serde(default)]
    pub allow_flight: bool,
    #[serde(default)]
    pub flying: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistentData {
    pub tags: BTreeMap<String, Value>,
}

/// Data for a feature registered outside the built-in namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    pub value: Value,
}

/// One feature's data
#[derive(Debug, Clone, PartialEq)]
pub enum DataContainer {
    Inventory(Inventory),
    EnderChest(EnderChest),
    PotionEffects(PotionEffects),
    Advancements(Advancements),
    Location(Location),
    Statistics(Statistics),
    Health(Health),
    Food(Food),
    Experience(Experience),
    GameMode(GameMode),
    PersistentData(PersistentData),
    Custom(CustomData),
}

impl DataContainer {
    /// The built-in feature this container belongs to, if any
    pub fn builtin(&self) -> Option<BuiltinFeature> {
        Some(match self {
            DataContainer::Inventory(_) => BuiltinFeature::Inventory,
            DataContainer::EnderChest(_) => BuiltinFeature::EnderChest,
            DataContainer::PotionEffects(_) => BuiltinFeature::PotionEffects,
            DataContainer::Advancements(_) => BuiltinFeature::Advancements,
            DataContainer::Location(_) => BuiltinFeature::Location,
            DataContainer::Statistics(_) => BuiltinFeature::Statistics,
            DataContainer::Health(_) => BuiltinFeature::Health,
            DataContainer::Food(_) => BuiltinFeature::Food,
            DataContainer::Experience(_) => BuiltinFeature::Experience,
            DataContainer::GameMode(_) => BuiltinFeature::GameMode,
            DataContainer::PersistentData(_) => BuiltinFeature::PersistentData,
            DataContainer::Custom(_) => return None,
        })
    }

    /// Whether this container may be stored under `identifier`
    pub fn fits(&self, identifier: &Identifier) -> bool {
        match self.builtin() {
            Some(feature) => *identifier == feature.identifier(),
            None => !identifier.is_builtin(),
        }
    }

    /// Overwrite the owner's live state for this feature
    pub fn apply(&self, identifier: &Identifier, owner: &mut dyn DataOwner) -> Result<()> {
        if !self.fits(identifier) {
            return Err(SnapshotError::InvalidSnapshot {
                reason: format!("container does not belong to {}", identifier),
            });
        }
        match self {
            DataContainer::Inventory(data) => owner.apply_inventory(data),
            DataContainer::EnderChest(data) => owner.apply_ender_chest(data),
            DataContainer::PotionEffects(data) => owner.apply_potion_effects(data),
            DataContainer::Advancements(data) => owner.apply_advancements(data),
            DataContainer::Location(data) => owner.apply_location(data),
            DataContainer::Statistics(data) => owner.apply_statistics(data),
            DataContainer::Health(data) => owner.apply_health(data),
            DataContainer::Food(data) => owner.apply_food(data),
            DataContainer::Experience(data) => owner.apply_experience(data),
            DataContainer::GameMode(data) => owner.apply_game_mode(data),
            DataContainer::PersistentData(data) => owner.apply_persistent_data(data),
            DataContainer::Custom(data) => owner.apply_custom(identifier, data),
        }
    }

    /// Read-only projection for diagnostics
    pub fn preview(&self) -> Value {
        match self {
            DataContainer::Inventory(inv) => {
                let mut value = inv.items.preview();
                value["held_slot"] = json!(inv.held_slot);
                value
            }
            DataContainer::EnderChest(chest) => chest.items.preview(),
            DataContainer::PotionEffects(p) => json!(p
                .effects
                .iter()
                .map(|e| format!("{} {} ({} ticks)", e.kind, u16::from(e.amplifier) + 1, e.duration_ticks))
                .collect::<Vec<_>>()),
            DataContainer::Advancements(a) => json!({
                "completed": a.completed.len(),
                "keys": a.completed.iter().map(|adv| adv.key.as_str()).collect::<Vec<_>>(),
            }),
            DataContainer::Location(l) => json!({
                "world": l.world,
                "position": format!("{:.1}, {:.1}, {:.1}", l.x, l.y, l.z),
            }),
            DataContainer::Statistics(s) => json!({
                "generic": s.generic,
                "block_stats": s.blocks.len(),
                "item_stats": s.items.len(),
                "entity_stats": s.entities.len(),
            }),
            DataContainer::Health(h) => json!({ "health": h.health, "scale": h.health_scale }),
            DataContainer::Food(f) => json!({ "food_level": f.food_level, "saturation": f.saturation }),
            DataContainer::Experience(e) => json!({ "level": e.level, "total": e.total }),
            DataContainer::GameMode(g) => json!({ "mode": g.mode, "flying": g.flying }),
            DataContainer::PersistentData(p) => json!({ "tags": p.tags.keys().collect::<Vec<_>>() }),
            DataContainer::Custom(c) => c.value.clone(),
        }
    }
}
