//! Ratings and feedback service client.
//!
//! Thin typed calls for submitting menu-item ratings and restaurant
//! feedback. Not part of the cart engine; surfaced on [`crate::Client`] for
//! the feedback screens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tableside_core::MenuItemId;
use tracing::instrument;

use crate::api::{ApiError, HttpClient};

/// Aggregate rating for a menu item.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ItemRating {
    /// Average score, 1.0-5.0.
    pub average_rating: f64,
    /// Number of submitted ratings.
    pub rating_count: i64,
}

/// Restaurant feedback submission.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRequest {
    /// Overall score, 1-5.
    pub rating: u8,
    /// Free-text comments.
    pub feedback_text: String,
    /// Feedback category (e.g., "service", "food").
    pub category: String,
}

/// Aggregate restaurant feedback statistics.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FeedbackStats {
    /// Average score across all feedback.
    pub average_rating: f64,
    /// Total feedback entries.
    pub total_feedback: i64,
}

/// A submitted feedback entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackEntry {
    /// Overall score, 1-5.
    pub rating: u8,
    /// Free-text comments.
    pub feedback_text: String,
    /// Feedback category.
    pub category: String,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

/// Remote ratings service operations.
#[async_trait]
pub trait RatingsApi: Send + Sync {
    /// Submit a 1-5 score for a menu item, returning the new aggregate.
    async fn rate_item(&self, id: MenuItemId, score: u8) -> Result<ItemRating, ApiError>;

    /// Submit restaurant feedback.
    async fn submit_feedback(&self, req: FeedbackRequest) -> Result<(), ApiError>;

    /// Fetch aggregate feedback statistics.
    async fn feedback_stats(&self) -> Result<FeedbackStats, ApiError>;

    /// Fetch the most recent feedback entries.
    async fn recent_feedback(&self) -> Result<Vec<FeedbackEntry>, ApiError>;
}

#[derive(Debug, Serialize)]
struct RateRequest {
    rating: u8,
}

/// Ratings service client backed by the shared [`HttpClient`].
#[derive(Clone)]
pub struct HttpRatingsApi {
    http: HttpClient,
}

impl HttpRatingsApi {
    /// Create a new ratings client.
    #[must_use]
    pub const fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl RatingsApi for HttpRatingsApi {
    #[instrument(skip(self), fields(item_id = %id, score))]
    async fn rate_item(&self, id: MenuItemId, score: u8) -> Result<ItemRating, ApiError> {
        self.http
            .post(
                &format!("/api/ratings/menu-items/{id}"),
                &RateRequest { rating: score },
            )
            .await
    }

    #[instrument(skip(self, req))]
    async fn submit_feedback(&self, req: FeedbackRequest) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .http
            .post("/api/ratings/restaurant-feedback", &req)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn feedback_stats(&self) -> Result<FeedbackStats, ApiError> {
        self.http.get("/api/ratings/restaurant-feedback/stats").await
    }

    #[instrument(skip(self))]
    async fn recent_feedback(&self) -> Result<Vec<FeedbackEntry>, ApiError> {
        self.http
            .get("/api/ratings/restaurant-feedback/recent")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_request_serializes_expected_shape() {
        let req = FeedbackRequest {
            rating: 4,
            feedback_text: "Great service".to_string(),
            category: "service".to_string(),
        };
        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "rating": 4,
                "feedback_text": "Great service",
                "category": "service"
            })
        );
    }

    #[test]
    fn stats_payload_deserializes() {
        let stats: FeedbackStats =
            serde_json::from_str(r#"{"average_rating": 4.2, "total_feedback": 37}"#)
                .expect("payload");
        assert_eq!(stats.total_feedback, 37);
    }
}
