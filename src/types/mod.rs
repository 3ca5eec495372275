//! Data types that cross the engine boundary.
//!
//! Everything here is plain data: the bridge never interprets it beyond
//! routing it back to the host. All types serialize with serde so a host
//! can forward them over its own transport unchanged.

mod parser;
mod runtime;
mod view;

pub use parser::{Category, ErrorReport, MetaValue, ParserError};
pub use runtime::{
    MaybeAborted, RuntimeError, RuntimeInitError, RuntimeInitOutput, RuntimeInitParams,
};
pub use view::{
    GdtInventory, GdtItem, OverworldItem, OverworldItemKind, OverworldItems, PouchItem,
    PouchList, RuntimeViewError,
};

use serde::{Deserialize, Serialize};

/// One candidate returned by item identifier search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSearchResult {
    /// Internal actor name of the item.
    pub actor: String,
    pub category: Category,
    /// Cook effect id, 0 when the item carries none.
    #[serde(default)]
    pub cook_effect: i32,
    /// Match score; higher is a better match.
    pub score: f32,
}
