//! Defines routes for product and product-image operations.
//!
//! ## Structure
//! - **Collection endpoints**
//!   - `GET    /products` — list active products (category, minPrice, maxPrice, minRating)
//!   - `POST   /products` — create product (multipart, optional `image` part)
//!   - `GET    /products/search` — text search over name and description
//!
//! - **Product endpoints**
//!   - `GET    /products/{id}` — fetch product (`?includeInactive=true` for removed ones)
//!   - `PUT    /products/{id}` — partial update (multipart, optional replacement `image`)
//!   - `DELETE /products/{id}` — soft-delete product and its image
//!   - `GET    /products/{id}/image` — stream the product image

use crate::handlers::{
    AppState,
    health_handlers::{healthz, readyz},
    product_handlers::{
        create_product, delete_product, get_product, get_product_image, list_products,
        search_products, update_product,
    },
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};

/// Build and return the router for all catalog routes.
///
/// The router carries shared state (`AppState`) to all handlers. Request
/// bodies, including streamed image uploads, are capped at `max_upload_bytes`.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Collection-level routes
        .route("/products", get(list_products).post(create_product))
        .route("/products/search", get(search_products))
        // Product-level routes
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/{id}/image", get(get_product_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
