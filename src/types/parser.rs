//! Parser diagnostics and the value types they reference.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Item category as understood by the script parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Weapon,
    Bow,
    Shield,
    Armor,
    ArmorHead,
    ArmorUpper,
    ArmorLower,
    Material,
    Food,
    KeyItem,
}

impl Category {
    pub const fn is_armor(self) -> bool {
        matches!(
            self,
            Self::Armor | Self::ArmorHead | Self::ArmorUpper | Self::ArmorLower
        )
    }

    pub const fn is_equipment(self) -> bool {
        matches!(self, Self::Weapon | Self::Bow | Self::Shield)
    }
}

/// Value attached to a metadata key in a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Words(String),
    Quoted(String),
    Angled(String),
}

impl std::fmt::Display for MetaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Words(s) => write!(f, "{s}"),
            Self::Quoted(s) => write!(f, "\"{s}\""),
            Self::Angled(s) => write!(f, "<{s}>"),
        }
    }
}

/// A diagnostic anchored to a byte range of the script.
///
/// Reports are data: they arrive inside a successful result and never
/// affect the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport<E> {
    /// Byte range `[start, end)` in the script source.
    pub span: (u32, u32),
    pub is_warning: bool,
    pub error: E,
}

impl<E> ErrorReport<E> {
    pub fn error(span: (u32, u32), error: E) -> Self {
        Self { span, is_warning: false, error }
    }

    pub fn warning(span: (u32, u32), error: E) -> Self {
        Self { span, is_warning: true, error }
    }
}

/// Errors reported by the script parser.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ParserError {
    #[error("unexpected: {0}")]
    Unexpected(String),
    #[error("unexpected token")]
    SyntaxUnexpected,
    #[error("unexpected end of input")]
    SyntaxUnexpectedEof,
    #[error("invalid item: {0}")]
    InvalidItem(String),
    #[error("empty item name")]
    InvalidEmptyItem,
    #[error("invalid item amount")]
    InvalidItemAmount,
    #[error("invalid integer: {0}")]
    IntFormat(String),
    #[error("integer out of range: {0}")]
    IntRange(String),
    #[error("invalid float: {0}")]
    FloatFormat(String),
    #[error("unused meta key: {0}")]
    UnusedMetaKey(String),
    #[error("invalid meta value: {0:?}")]
    InvalidMetaValue((String, MetaValue)),
    #[error("meta key {0} requires a value")]
    RequiredMetaValue(String),
    #[error("invalid weapon modifier: {0}")]
    InvalidWeaponModifier(String),
    #[error("invalid cook effect: {0}")]
    InvalidCookEffect(String),
    #[error("too many ingredients")]
    TooManyIngredients,
    #[error("invalid armor star number: {0}")]
    InvalidArmorStarNum(u32),
    #[error("invalid slot: {0}")]
    InvalidSlot(i32),
    #[error("invalid times clause: {0}")]
    InvalidTimesClause(i32),
    #[error("invalid trial: {0}")]
    InvalidTrial(String),
    #[error("invalid category: {0:?}")]
    InvalidCategory(Category),
    #[error("invalid category name: {0}")]
    InvalidCategoryName(String),
    #[error("invalid inventory row: {0}")]
    InvalidInventoryRow(i32),
    #[error("invalid inventory column: {0}")]
    InvalidInventoryCol(i32),
    #[error("item position is not used here")]
    UnusedItemPosition,
    #[error("invalid string length: {0}")]
    InvalidStringLength(u32),
    #[error("flag type is not set")]
    GdtTypeNotSet,
    #[error("conflicting flag types")]
    GdtTypeConflict,
    #[error("invalid flag index: {0}")]
    GdtInvalidIndex(i32),
    #[error("missing vector component")]
    GdtMissingVecComp,
    #[error("invalid equipment slot: {0:?}")]
    InvalidEquipmentSlotNum((Category, i32)),
}
