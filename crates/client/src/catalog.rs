//! Catalog snapshot cache and cart-line enrichment.
//!
//! The cart engine stores only identity and pricing per line; names, images,
//! and customization schemas come from the catalog. [`CatalogResolver`]
//! caches one menu snapshot with a short TTL and overlays it onto cart lines
//! best-effort: a missing or unreachable catalog never blocks a cart merge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tableside_core::{Money, MenuItemId};
use tracing::{debug, instrument, warn};

use crate::api::{ApiError, CatalogApi};
use crate::retry::RetryPolicy;
use crate::types::{Category, CartLine, LineDisplay, MenuItem};

/// How long a fetched menu snapshot stays fresh.
const SNAPSHOT_TTL: Duration = Duration::from_secs(300);

/// A fetched menu, indexed for line lookup.
#[derive(Debug)]
struct MenuSnapshot {
    /// Items in the service's display order.
    items: Vec<MenuItem>,
    /// Index into `items` by item ID.
    by_id: HashMap<MenuItemId, usize>,
}

impl MenuSnapshot {
    fn new(items: Vec<MenuItem>) -> Self {
        let by_id = items
            .iter()
            .enumerate()
            .map(|(idx, item)| (item.id, idx))
            .collect();
        Self { items, by_id }
    }

    fn get(&self, id: MenuItemId) -> Option<&MenuItem> {
        self.by_id.get(&id).map(|&idx| &self.items[idx])
    }
}

/// Cached view over the catalog service.
#[derive(Clone)]
pub struct CatalogResolver {
    api: Arc<dyn CatalogApi>,
    retry: RetryPolicy,
    menu: Cache<&'static str, Arc<MenuSnapshot>>,
    categories: Cache<&'static str, Arc<Vec<Category>>>,
}

impl CatalogResolver {
    /// Create a resolver over the given catalog service.
    #[must_use]
    pub fn new(api: Arc<dyn CatalogApi>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            menu: Cache::builder()
                .max_capacity(1)
                .time_to_live(SNAPSHOT_TTL)
                .build(),
            categories: Cache::builder()
                .max_capacity(1)
                .time_to_live(SNAPSHOT_TTL)
                .build(),
        }
    }

    /// The current menu, from cache or a fresh fetch.
    ///
    /// # Errors
    ///
    /// Returns the catalog service error when no cached snapshot exists and
    /// the fetch fails after retries.
    #[instrument(skip(self))]
    pub async fn menu(&self) -> Result<Vec<MenuItem>, ApiError> {
        Ok(self.snapshot().await?.items.clone())
    }

    /// A single menu item from the cached snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for an unknown ID, or the fetch error
    /// when no snapshot could be obtained.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn item(&self, id: MenuItemId) -> Result<MenuItem, ApiError> {
        let snapshot = self.snapshot().await?;
        snapshot
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("menu item {id}")))
    }

    /// The current category list, from cache or a fresh fetch.
    ///
    /// # Errors
    ///
    /// Returns the catalog service error when no cached list exists and the
    /// fetch fails after retries.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        if let Some(cached) = self.categories.get("categories").await {
            return Ok(cached.as_ref().clone());
        }
        let api = &self.api;
        let fetched = self.retry.run(|| api.list_categories()).await?;
        self.categories
            .insert("categories", Arc::new(fetched.clone()))
            .await;
        Ok(fetched)
    }

    /// Drop all cached snapshots; the next read refetches.
    pub async fn invalidate(&self) {
        self.menu.invalidate_all();
        self.categories.invalidate_all();
        debug!("catalog caches invalidated");
    }

    /// Overlay catalog display data onto `lines`, best-effort.
    ///
    /// When the catalog is unreachable every `display` is left untouched;
    /// when an item is missing from the snapshot the line gets the
    /// unavailable placeholder. Pricing fields are never modified here.
    pub async fn enrich_all(&self, lines: &mut [CartLine]) {
        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "catalog unavailable, skipping line enrichment");
                return;
            }
        };
        for line in lines {
            line.display = Some(
                snapshot
                    .get(line.menu_item_id)
                    .map_or_else(LineDisplay::unavailable, Self::display_for),
            );
        }
    }

    fn display_for(item: &MenuItem) -> LineDisplay {
        LineDisplay {
            name: item.name.clone(),
            description: item.description.clone(),
            image_url: item.image_url.clone(),
            catalog_price: Money::new(item.price),
            customization_options: item.customization_options.clone(),
            average_rating: item.average_rating,
        }
    }

    async fn snapshot(&self) -> Result<Arc<MenuSnapshot>, ApiError> {
        if let Some(cached) = self.menu.get("menu").await {
            return Ok(cached);
        }
        let api = &self.api;
        let items = self.retry.run(|| api.list_items()).await?;
        debug!(items = items.len(), "fetched menu snapshot");
        let snapshot = Arc::new(MenuSnapshot::new(items));
        self.menu.insert("menu", Arc::clone(&snapshot)).await;
        Ok(snapshot)
    }
}
