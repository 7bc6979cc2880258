//! Order service client.
//!
//! Every mutating call answers with the full authoritative cart (line list
//! plus per-line pricing); the engine merges that response wholesale. The
//! only exception is `fetch_totals`, which returns derived numbers for
//! display contexts that do not need the line list.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tableside_core::{CartId, LineId, MenuItemId, UserId};
use tracing::instrument;

use crate::api::{ApiError, HttpClient};
use crate::pricing;
use crate::types::{CartLine, CustomizationChoices, Totals};

/// The authoritative cart state carried in an order-service response.
#[derive(Debug, Clone, PartialEq)]
pub struct CartSnapshot {
    /// Server-side cart ID.
    pub id: CartId,
    /// Owning user.
    pub user_id: UserId,
    /// Confirmed lines in server order. Subtotals are already recomputed
    /// from the server's unit prices.
    pub lines: Vec<CartLine>,
    /// Server timestamp of the last change, if reported.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request body for adding a line.
#[derive(Debug, Clone, Serialize)]
pub struct AddLineRequest {
    /// Catalog item to add.
    pub menu_item_id: MenuItemId,
    /// Quantity, >= 1.
    pub quantity: u32,
    /// Chosen customization values.
    pub customization_choices: CustomizationChoices,
}

/// Request body for updating a line.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateLineRequest {
    /// New quantity, >= 1.
    pub quantity: u32,
    /// Replacement customization values, if changing them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customization_choices: Option<CustomizationChoices>,
}

/// Remote order service operations.
#[async_trait]
pub trait OrderApi: Send + Sync {
    /// Fetch the current cart.
    async fn fetch_cart(&self) -> Result<CartSnapshot, ApiError>;

    /// Add a line. The service merges repeated adds of the same catalog item
    /// into one line.
    async fn add_line(&self, req: AddLineRequest) -> Result<CartSnapshot, ApiError>;

    /// Update an existing line's quantity and/or customizations.
    async fn update_line(
        &self,
        line_id: LineId,
        req: UpdateLineRequest,
    ) -> Result<CartSnapshot, ApiError>;

    /// Remove a line.
    async fn remove_line(&self, line_id: LineId) -> Result<CartSnapshot, ApiError>;

    /// Remove every line.
    async fn clear_cart(&self) -> Result<(), ApiError>;

    /// Fetch derived totals without the line list.
    async fn fetch_totals(&self) -> Result<Totals, ApiError>;
}

// =============================================================================
// Wire Types
// =============================================================================

// Monetary amounts travel as decimal strings to preserve precision.

#[derive(Debug, Deserialize)]
struct CartItemPayload {
    id: i32,
    menu_item_id: i32,
    quantity: u32,
    #[serde(default)]
    customization_choices: CustomizationChoices,
    unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct CartPayload {
    id: i32,
    user_id: i32,
    items: Vec<CartItemPayload>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TotalsPayload {
    subtotal: Decimal,
    tax: Decimal,
    total: Decimal,
}

impl From<CartItemPayload> for CartLine {
    fn from(item: CartItemPayload) -> Self {
        Self {
            id: LineId::new(item.id),
            menu_item_id: MenuItemId::new(item.menu_item_id),
            quantity: item.quantity,
            customizations: item.customization_choices,
            unit_price: item.unit_price,
            // Recomputed here; a subtotal from the wire is never trusted.
            subtotal: pricing::line_subtotal(item.unit_price, item.quantity),
            display: None,
        }
    }
}

impl From<CartPayload> for CartSnapshot {
    fn from(cart: CartPayload) -> Self {
        Self {
            id: CartId::new(cart.id),
            user_id: UserId::new(cart.user_id),
            lines: cart.items.into_iter().map(CartLine::from).collect(),
            updated_at: cart.updated_at,
        }
    }
}

impl From<TotalsPayload> for Totals {
    fn from(totals: TotalsPayload) -> Self {
        Self {
            subtotal: totals.subtotal,
            tax: totals.tax,
            total: totals.total,
        }
    }
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// Order service client backed by the shared [`HttpClient`].
#[derive(Clone)]
pub struct HttpOrderApi {
    http: HttpClient,
}

impl HttpOrderApi {
    /// Create a new order service client.
    #[must_use]
    pub const fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<CartSnapshot, ApiError> {
        let payload: CartPayload = self.http.get("/api/cart").await?;
        Ok(payload.into())
    }

    #[instrument(skip(self, req), fields(menu_item_id = %req.menu_item_id))]
    async fn add_line(&self, req: AddLineRequest) -> Result<CartSnapshot, ApiError> {
        let payload: CartPayload = self.http.post("/api/cart/items", &req).await?;
        Ok(payload.into())
    }

    #[instrument(skip(self, req), fields(line_id = %line_id))]
    async fn update_line(
        &self,
        line_id: LineId,
        req: UpdateLineRequest,
    ) -> Result<CartSnapshot, ApiError> {
        let payload: CartPayload = self
            .http
            .put(&format!("/api/cart/items/{line_id}"), &req)
            .await?;
        Ok(payload.into())
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn remove_line(&self, line_id: LineId) -> Result<CartSnapshot, ApiError> {
        let payload: CartPayload = self
            .http
            .delete(&format!("/api/cart/items/{line_id}"))
            .await?;
        Ok(payload.into())
    }

    #[instrument(skip(self))]
    async fn clear_cart(&self) -> Result<(), ApiError> {
        self.http.delete_no_content("/api/cart").await
    }

    #[instrument(skip(self))]
    async fn fetch_totals(&self) -> Result<Totals, ApiError> {
        let payload: TotalsPayload = self.http.get("/api/cart/total").await?;
        Ok(payload.into())
    }
}
