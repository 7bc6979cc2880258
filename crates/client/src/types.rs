//! Domain types for the ordering client.
//!
//! These types form the local projection of server state. Per-line pricing
//! always comes from the order service's authoritative responses; catalog
//! data is overlaid onto lines only for display (see [`crate::catalog`]).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tableside_core::{CartId, CategoryId, MenuItemId, Money, UserId};

/// Customization schema for a menu item: option name to allowed values.
pub type CustomizationOptions = BTreeMap<String, Vec<String>>;

/// Customization choices on a cart line: option name to chosen value.
pub type CustomizationChoices = BTreeMap<String, String>;

// =============================================================================
// Catalog Types
// =============================================================================

/// A menu category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Category ID.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Whether the category is currently offered.
    pub is_active: bool,
}

/// A menu item as served by the catalog service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Menu item ID.
    pub id: MenuItemId,
    /// Owning category.
    pub category_id: CategoryId,
    /// Display name.
    pub name: String,
    /// Description shown on the menu.
    pub description: String,
    /// Current catalog price. Display only once an item is in the cart -
    /// line pricing comes from the order service.
    pub price: Decimal,
    /// Image reference, if any.
    pub image_url: Option<String>,
    /// Customization schema (option name to allowed values).
    #[serde(default)]
    pub customization_options: CustomizationOptions,
    /// Whether the item is currently orderable.
    pub is_active: bool,
    /// Dietary flags.
    pub is_vegetarian: bool,
    pub is_vegan: bool,
    pub is_gluten_free: bool,
    /// Spice level, 0-5.
    pub spice_level: u8,
    /// Average rating derived from submitted ratings.
    pub average_rating: f64,
    /// Number of ratings behind the average.
    pub rating_count: i64,
}

// =============================================================================
// Cart Types
// =============================================================================

/// Derived totals for a cart. Only [`crate::pricing::reconcile`] produces
/// these - no other component sets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Totals {
    /// Sum of line subtotals.
    pub subtotal: Decimal,
    /// `round(subtotal * TAX_RATE, 2)`, applied once to the aggregate.
    pub tax: Decimal,
    /// `subtotal + tax`.
    pub total: Decimal,
}

/// Display data overlaid onto a cart line from the catalog snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDisplay {
    /// Current catalog name.
    pub name: String,
    /// Current catalog description.
    pub description: String,
    /// Image reference, if any.
    pub image_url: Option<String>,
    /// The catalog's *current* price. May drift from the line's
    /// `unit_price`; totals always follow the server.
    pub catalog_price: Money,
    /// Customization schema for the item.
    pub customization_options: CustomizationOptions,
    /// Average rating for the item.
    pub average_rating: f64,
}

impl LineDisplay {
    /// Placeholder for a line whose catalog item is no longer listed.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            name: "Unavailable item".to_string(),
            description: String::new(),
            image_url: None,
            catalog_price: Money::ZERO,
            customization_options: CustomizationOptions::new(),
            average_rating: 0.0,
        }
    }
}

/// A confirmed cart line.
///
/// Lines only enter the projection from authoritative server responses, so
/// `id` is always server-assigned. `subtotal` is recomputed locally from
/// `unit_price * quantity` and never trusted from a stale source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Server-assigned line ID.
    pub id: tableside_core::LineId,
    /// Catalog item this line refers to.
    pub menu_item_id: MenuItemId,
    /// Quantity, always >= 1.
    pub quantity: u32,
    /// Chosen customization values, keyed by option name.
    #[serde(default)]
    pub customizations: CustomizationChoices,
    /// Unit price captured from the server response.
    pub unit_price: Decimal,
    /// `unit_price * quantity`, recomputed on every merge.
    pub subtotal: Decimal,
    /// Catalog overlay for display. Absent when enrichment was skipped or
    /// the catalog was unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<LineDisplay>,
}

/// The local cart projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Server-side cart ID, once known.
    pub id: Option<CartId>,
    /// Owning user, once a session exists.
    pub user_id: Option<UserId>,
    /// Lines in display order (insertion order from the server).
    pub lines: Vec<CartLine>,
    /// Derived totals for the current line set.
    pub totals: Totals,
    /// Server timestamp of the last confirmed change, if reported.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cart {
    /// The empty invariant state: no lines, all totals zero.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            id: None,
            user_id: None,
            lines: Vec::new(),
            totals: Totals::default(),
            updated_at: None,
        }
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total item count across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}
