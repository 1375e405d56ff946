//! Represents a catalog product and the payloads used to create, change and
//! query it.

use super::object::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MAX_RATING: f64 = 5.0;

/// A product record as persisted in the `products` table.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Product {
    /// Unique identifier generated at creation.
    pub id: Uuid,

    pub name: String,

    pub description: String,

    pub category: String,

    /// Non-negative price.
    pub price: f64,

    /// Rating in `[0, 5]`.
    pub rating: f64,

    /// `false` once the product has been soft-deleted.
    pub is_active: bool,

    /// Weak reference to the product image in the content store.
    pub image_object_id: Option<ObjectId>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Attributes of a product to be created.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub rating: Option<f64>,
}

/// Partial attribute changes; `None` leaves the stored value untouched.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub rating: Option<f64>,
}

/// Conjunctive filter over active products. Every bound is inclusive.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
}
