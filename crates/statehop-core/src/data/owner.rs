//! The boundary to live engine state
//!
//! A `DataOwner` is implemented by the host platform for one online user.
//! The sync engine only ever calls it from the simulation thread.

use super::{
    Advancements, CustomData, DataContainer, EnderChest, Experience, Food, GameMode, Health,
    Inventory, Location, PersistentData, PotionEffects, Statistics,
};
use crate::errors::Result;
use crate::identifier::Identifier;

/// Reads and overwrites one user's live feature state
///
/// Every `apply_*` call is a full overwrite of that feature, so applying the
/// same data twice leaves the same state as applying it once.
pub trait DataOwner: Send {
    /// Capture the live state of one feature
    ///
    /// Returns `Ok(None)` when the owner has nothing to record for it.
    fn produce(&self, identifier: &Identifier) -> Result<Option<DataContainer>>;

    fn apply_inventory(&mut self, data: &Inventory) -> Result<()>;
    fn apply_ender_chest(&mut self, data: &EnderChest) -> Result<()>;
    fn apply_potion_effects(&mut self, data: &PotionEffects) -> Result<()>;
    fn apply_advancements(&mut self, data: &Advancements) -> Result<()>;
    fn apply_location(&mut self, data: &Location) -> Result<()>;
    fn apply_statistics(&mut self, data: &Statistics) -> Result<()>;
    fn apply_health(&mut self, data: &Health) -> Result<()>;
    fn apply_food(&mut self, data: &Food) -> Result<()>;
    fn apply_experience(&mut self, data: &Experience) -> Result<()>;
    fn apply_game_mode(&mut self, data: &GameMode) -> Result<()>;
    fn apply_persistent_data(&mut self, data: &PersistentData) -> Result<()>;

    /// Apply a feature registered by a third party
    fn apply_custom(&mut self, identifier: &Identifier, data: &CustomData) -> Result<()>;
}
