pub mod health_handlers;
pub mod product_handlers;

use crate::services::catalog_service::CatalogService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,

    /// `max-age` (seconds) advertised on image responses.
    pub image_max_age: u64,
}
