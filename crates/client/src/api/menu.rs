//! Catalog (menu) service client.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tableside_core::{CategoryId, MenuItemId};
use tracing::instrument;

use crate::api::{ApiError, HttpClient};
use crate::types::{Category, CustomizationOptions, MenuItem};

/// Remote catalog service operations.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Fetch the active menu item list.
    async fn list_items(&self) -> Result<Vec<MenuItem>, ApiError>;

    /// Fetch a single menu item.
    async fn get_item(&self, id: MenuItemId) -> Result<MenuItem, ApiError>;

    /// Fetch the category list.
    async fn list_categories(&self) -> Result<Vec<Category>, ApiError>;
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct MenuItemPayload {
    id: i32,
    category_id: i32,
    name: String,
    #[serde(default)]
    description: String,
    price: Decimal,
    image_url: Option<String>,
    #[serde(default)]
    customization_options: CustomizationOptions,
    is_active: bool,
    #[serde(default)]
    is_vegetarian: bool,
    #[serde(default)]
    is_vegan: bool,
    #[serde(default)]
    is_gluten_free: bool,
    #[serde(default)]
    spice_level: u8,
    #[serde(default)]
    average_rating: f64,
    #[serde(default)]
    rating_count: i64,
}

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    id: i32,
    name: String,
    description: Option<String>,
    is_active: bool,
}

impl From<MenuItemPayload> for MenuItem {
    fn from(item: MenuItemPayload) -> Self {
        Self {
            id: MenuItemId::new(item.id),
            category_id: CategoryId::new(item.category_id),
            name: item.name,
            description: item.description,
            price: item.price,
            image_url: item.image_url,
            customization_options: item.customization_options,
            is_active: item.is_active,
            is_vegetarian: item.is_vegetarian,
            is_vegan: item.is_vegan,
            is_gluten_free: item.is_gluten_free,
            spice_level: item.spice_level,
            average_rating: item.average_rating,
            rating_count: item.rating_count,
        }
    }
}

impl From<CategoryPayload> for Category {
    fn from(category: CategoryPayload) -> Self {
        Self {
            id: CategoryId::new(category.id),
            name: category.name,
            description: category.description,
            is_active: category.is_active,
        }
    }
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// Catalog service client backed by the shared [`HttpClient`].
#[derive(Clone)]
pub struct HttpCatalogApi {
    http: HttpClient,
}

impl HttpCatalogApi {
    /// Create a new catalog client.
    #[must_use]
    pub const fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogApi {
    #[instrument(skip(self))]
    async fn list_items(&self) -> Result<Vec<MenuItem>, ApiError> {
        let items: Vec<MenuItemPayload> =
            self.http.get("/api/menu/items?active_only=true").await?;
        Ok(items.into_iter().map(MenuItem::from).collect())
    }

    #[instrument(skip(self), fields(item_id = %id))]
    async fn get_item(&self, id: MenuItemId) -> Result<MenuItem, ApiError> {
        let item: MenuItemPayload = self.http.get(&format!("/api/menu/items/{id}")).await?;
        Ok(item.into())
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        let categories: Vec<CategoryPayload> =
            self.http.get("/api/menu/categories?active_only=true").await?;
        Ok(categories.into_iter().map(Category::from).collect())
    }
}
