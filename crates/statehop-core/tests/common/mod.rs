use serde_json::json;
use statehop_core::data::{
    Advancement, Advancements, CustomData, EnderChest, Experience, Food, GameMode, Health,
    Inventory, ItemStack, Items, Location, PersistentData, PotionEffect, PotionEffects,
    Statistics,
};
use statehop_core::identifier::BuiltinFeature;
use statehop_core::snapshot::{FormatContext, HostVersion};
use statehop_core::{DataContainer, DataOwner, Identifier, Result};
use std::collections::BTreeMap;

#[allow(dead_code)]
pub fn test_context() -> FormatContext {
    FormatContext::new(HostVersion::new(1, 20, 4), "paper", "lobby-1")
}

/// One populated container per built-in feature
#[allow(dead_code)]
pub fn sample_builtin(feature: BuiltinFeature) -> DataContainer {
    match feature {
        BuiltinFeature::Inventory => {
            let mut items = Items::with_size(41);
            items.slots[0] = Some(ItemStack::new("diamond_sword", 1));
            let mut pick = ItemStack::new("iron_pickaxe", 1);
            pick.tags.insert("damage".to_string(), json!(17));
            items.slots[1] = Some(pick);
            DataContainer::Inventory(Inventory { items, held_slot: 1 })
        }
        BuiltinFeature::EnderChest => {
            let mut items = Items::with_size(27);
            items.slots[26] = Some(ItemStack::new("shulker_box", 1));
            DataContainer::EnderChest(EnderChest { items })
        }
        BuiltinFeature::PotionEffects => DataContainer::PotionEffects(PotionEffects {
            effects: vec![PotionEffect {
                kind: "speed".to_string(),
                amplifier: 1,
                duration_ticks: 600,
                ambient: false,
                show_particles: true,
            }],
        }),
        BuiltinFeature::Advancements => DataContainer::Advancements(Advancements {
            completed: vec![Advancement {
                key: "story/mine_stone".to_string(),
                criteria: BTreeMap::from([("get_stone".to_string(), 1_700_000_000_000)]),
            }],
        }),
        BuiltinFeature::Location => DataContainer::Location(Location {
            world: "world".to_string(),
            x: 10.5,
            y: 64.0,
            z: -3.25,
            yaw: 90.0,
            pitch: 0.0,
        }),
        BuiltinFeature::Statistics => DataContainer::Statistics(Statistics {
            generic: BTreeMap::from([("jump".to_string(), 42)]),
            blocks: BTreeMap::from([(
                "mine_block".to_string(),
                BTreeMap::from([("stone".to_string(), 7)]),
            )]),
            ..Statistics::default()
        }),
        BuiltinFeature::Health => DataContainer::Health(Health {
            health: 17.5,
            health_scale: 20.0,
            health_scaled: false,
        }),
        BuiltinFeature::Food => DataContainer::Food(Food {
            food_level: 18,
            saturation: 3.5,
            exhaustion: 0.75,
        }),
        BuiltinFeature::Experience => DataContainer::Experience(Experience {
            total: 315,
            level: 15,
            progress: 0.5,
        }),
        BuiltinFeature::GameMode => DataContainer::GameMode(GameMode {
            mode: "survival".to_string(),
            allow_flight: false,
            flying: false,
        }),
        BuiltinFeature::PersistentData => DataContainer::PersistentData(PersistentData {
            tags: BTreeMap::from([("plugin:rank".to_string(), json!("gold"))]),
        }),
    }
}

/// Data owner backed by a map, recording every apply call in order
#[derive(Default)]
#[allow(dead_code)]
pub struct MockOwner {
    pub live: BTreeMap<Identifier, DataContainer>,
    pub applied: Vec<String>,
    pub fail_on: Option<String>,
}

impl MockOwner {
    #[allow(dead_code)]
    pub fn with_all_builtins() -> Self {
        let live = BuiltinFeature::ALL
            .into_iter()
            .map(|f| (f.identifier(), sample_builtin(f)))
            .collect();
        Self {
            live,
            ..Self::default()
        }
    }

    fn record(&mut self, identifier: Identifier, container: DataContainer) -> Result<()> {
        let key = identifier.as_key();
        if self.fail_on.as_deref() == Some(key.as_str()) {
            return Err(statehop_core::SnapshotError::Owner {
                identifier: key,
                reason: "refused".to_string(),
            });
        }
        self.applied.push(key);
        self.live.insert(identifier, container);
        Ok(())
    }
}

impl DataOwner for MockOwner {
    fn produce(&self, identifier: &Identifier) -> Result<Option<DataContainer>> {
        Ok(self.live.get(identifier).cloned())
    }

    fn apply_inventory(&mut self, data: &Inventory) -> Result<()> {
        self.record(BuiltinFeature::Inventory.identifier(), DataContainer::Inventory(data.clone()))
    }

    fn apply_ender_chest(&mut self, data: &EnderChest) -> Result<()> {
        self.record(BuiltinFeature::EnderChest.identifier(), DataContainer::EnderChest(data.clone()))
    }

    fn apply_potion_effects(&mut self, data: &PotionEffects) -> Result<()> {
        self.record(
            BuiltinFeature::PotionEffects.identifier(),
            DataContainer::PotionEffects(data.clone()),
        )
    }

    fn apply_advancements(&mut self, data: &Advancements) -> Result<()> {
        self.record(
            BuiltinFeature::Advancements.identifier(),
            DataContainer::Advancements(data.clone()),
        )
    }

    fn apply_location(&mut self, data: &Location) -> Result<()> {
        self.record(BuiltinFeature::Location.identifier(), DataContainer::Location(data.clone()))
    }

    fn apply_statistics(&mut self, data: &Statistics) -> Result<()> {
        self.record(BuiltinFeature::Statistics.identifier(), DataContainer::Statistics(data.clone()))
    }

    fn apply_health(&mut self, data: &Health) -> Result<()> {
        self.record(BuiltinFeature::Health.identifier(), DataContainer::Health(data.clone()))
    }

    fn apply_food(&mut self, data: &Food) -> Result<()> {
        self.record(BuiltinFeature::Food.identifier(), DataContainer::Food(data.clone()))
    }

    fn apply_experience(&mut self, data: &Experience) -> Result<()> {
        self.record(BuiltinFeature::Experience.identifier(), DataContainer::Experience(data.clone()))
    }

    fn apply_game_mode(&mut self, data: &GameMode) -> Result<()> {
        self.record(BuiltinFeature::GameMode.identifier(), DataContainer::GameMode(data.clone()))
    }

    fn apply_persistent_data(&mut self, data: &PersistentData) -> Result<()> {
        self.record(
            BuiltinFeature::PersistentData.identifier(),
            DataContainer::PersistentData(data.clone()),
        )
    }

    fn apply_custom(&mut self, identifier: &Identifier, data: &CustomData) -> Result<()> {
        self.record(identifier.clone(), DataContainer::Custom(data.clone()))
    }
}
