//! Inventory views returned by state-inspection queries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Category;

/// Why a state-inspection query has no data. Local to the query.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RuntimeViewError {
    #[error("byte position {0} is outside the simulated range")]
    OutOfRange(u32),
    #[error("the game crashed before this step")]
    Crashed,
    #[error("no save named {0:?}")]
    SaveNotFound(String),
    #[error("no data available at this step")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PouchItem {
    pub actor_name: String,
    pub category: Category,
    pub value: i32,
    pub is_equipped: bool,
    pub tab_idx: i32,
    pub tab_slot: i32,
}

/// Visible inventory (pouch) at a step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PouchList {
    /// Item count as tracked by the game, which may disagree with `items`.
    pub count: i32,
    pub items: Vec<PouchItem>,
    pub are_tabs_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GdtItem {
    pub actor_name: String,
    pub value: i32,
    pub is_equipped: bool,
}

/// Inventory as recorded in the game data table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GdtInventory {
    pub items: Vec<GdtItem>,
    pub rupees: i32,
    pub max_hearts: i32,
    pub max_stamina: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverworldItemKind {
    Equipped,
    Held,
    GroundEquipment,
    GroundItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverworldItem {
    pub actor_name: String,
    pub kind: OverworldItemKind,
    pub value: i32,
}

/// Items present in the overworld at a step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverworldItems {
    pub items: Vec<OverworldItem>,
}
