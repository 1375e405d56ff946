//! src/services/catalog_service.rs
//!
//! CatalogService — keeps each product's image reference consistent with the
//! content store. The repository treats `image_object_id` as an opaque value;
//! this service is the only place that links, swaps and releases it.
//!
//! Every operation writes before it links and links before it deletes. A
//! crash part way through can leave an object nobody points at, but never a
//! product pointing at a missing object.

use super::{
    content_store::{ContentError, ContentStore, ObjectStream},
    product_repository::{ProductRepository, ProductUpdate, RepositoryError},
};
use crate::models::{
    object::ObjectId,
    product::{MAX_RATING, NewProduct, Product, ProductChanges, ProductFilter},
};
use bytes::Bytes;
use futures::{Stream, StreamExt, stream::BoxStream};
use std::{fmt, io};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Content(ContentError),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<ContentError> for CatalogError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::NotFound(id) => CatalogError::NotFound(format!("object `{}`", id)),
            other => CatalogError::Content(other),
        }
    }
}

impl From<RepositoryError> for CatalogError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => CatalogError::NotFound(format!("product `{}`", id)),
            other => CatalogError::Repository(other),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// An image supplied alongside a create or update call.
pub struct ImageUpload<'a> {
    pub original_name: String,
    pub content_type: Option<String>,
    pub body: BoxStream<'a, io::Result<Bytes>>,
}

impl<'a> ImageUpload<'a> {
    pub fn new<S>(original_name: impl Into<String>, content_type: Option<String>, body: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'a,
    {
        Self {
            original_name: original_name.into(),
            content_type,
            body: body.boxed(),
        }
    }
}

/// A servable product image.
pub struct ImageDownload {
    pub content_type: String,
    pub length: i64,
    pub stream: ObjectStream,
}

#[derive(Clone)]
pub struct CatalogService {
    store: ContentStore,
    products: ProductRepository,
}

impl CatalogService {
    pub fn new(store: ContentStore, products: ProductRepository) -> Self {
        Self { store, products }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Create a product, storing its image first when one is given.
    ///
    /// If the insert fails after the upload, the object is left orphaned.
    pub async fn create(
        &self,
        product: NewProduct,
        image: Option<ImageUpload<'_>>,
    ) -> CatalogResult<Product> {
        let product = validate_new(product)?;

        let image_object_id = match image {
            Some(upload) => Some(self.store_image(upload).await?),
            None => None,
        };

        let created = self
            .products
            .insert(&product, image_object_id)
            .await
            .inspect_err(|err| note_orphan(image_object_id, err))?;

        info!(
            "created product {} ({}) image={:?}",
            created.id, created.name, created.image_object_id
        );
        Ok(created)
    }

    /// Apply attribute changes and optionally swap the product image.
    ///
    /// The new object is written first, then linked in a single record
    /// update, and only then is the superseded object deleted. Failing to
    /// delete the old object is logged and does not fail the update.
    pub async fn update(
        &self,
        id: Uuid,
        changes: ProductChanges,
        image: Option<ImageUpload<'_>>,
    ) -> CatalogResult<Product> {
        let changes = validate_changes(changes)?;

        let (new_image, previous_image) = match image {
            Some(upload) => {
                let new_image = self.store_image(upload).await?;
                let current = self
                    .products
                    .find_by_id(id, false)
                    .await
                    .inspect_err(|err| note_orphan(Some(new_image), err))?;
                (Some(new_image), current.image_object_id)
            }
            None => (None, None),
        };

        let update = ProductUpdate {
            changes,
            image_object_id: new_image,
        };
        let updated = self
            .products
            .update_by_id(id, &update)
            .await
            .inspect_err(|err| note_orphan(new_image, err))?;

        if let Some(previous) = previous_image.filter(|old| Some(*old) != new_image) {
            self.release_superseded(id, previous).await;
        }

        info!("updated product {} image={:?}", updated.id, updated.image_object_id);
        Ok(updated)
    }

    /// Soft-delete a product: delete its image, then deactivate the record.
    ///
    /// An image that is already gone does not block deactivation.
    pub async fn remove(&self, id: Uuid) -> CatalogResult<Product> {
        let product = self.products.find_by_id(id, false).await?;

        if let Some(object_id) = product.image_object_id {
            match self.store.delete(object_id).await {
                Ok(()) => {}
                Err(ContentError::NotFound(_)) => {
                    warn!("image {} of product {} was already absent", object_id, id);
                }
                Err(err) => return Err(err.into()),
            }
        }

        let removed = self.products.set_active(id, false).await?;
        info!("deactivated product {}", id);
        Ok(removed)
    }

    /// Resolve a product's image into a byte stream with its metadata.
    pub async fn get_image(&self, id: Uuid) -> CatalogResult<ImageDownload> {
        let product = self.products.find_by_id(id, false).await?;
        let object_id = product
            .image_object_id
            .ok_or_else(|| CatalogError::NotFound(format!("image of product `{}`", id)))?;

        let meta = self.store.stat(object_id).await?;
        let stream = self.store.get(object_id).await?;
        Ok(ImageDownload {
            content_type: meta.content_type,
            length: meta.length,
            stream,
        })
    }

    pub async fn find_one(&self, id: Uuid) -> CatalogResult<Product> {
        Ok(self.products.find_by_id(id, false).await?)
    }

    /// Look a product up regardless of whether it has been removed.
    pub async fn find_any(&self, id: Uuid) -> CatalogResult<Product> {
        Ok(self.products.find_by_id(id, true).await?)
    }

    pub async fn find_all(&self, filter: &ProductFilter) -> CatalogResult<Vec<Product>> {
        Ok(self.products.find_all(filter).await?)
    }

    pub async fn search(&self, query: &str) -> CatalogResult<Vec<Product>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CatalogError::Validation("search query must not be empty".into()));
        }
        Ok(self.products.search(query).await?)
    }

    async fn store_image(&self, upload: ImageUpload<'_>) -> CatalogResult<ObjectId> {
        let object = self
            .store
            .put(
                upload.body,
                &upload.original_name,
                upload.content_type.as_deref(),
            )
            .await?;
        Ok(object.id)
    }

    /// Best-effort delete of an image no product references any more.
    async fn release_superseded(&self, product_id: Uuid, object_id: ObjectId) {
        match self.store.delete(object_id).await {
            Ok(()) => debug!("released image {} of product {}", object_id, product_id),
            Err(ContentError::NotFound(_)) => {
                debug!("superseded image {} already gone", object_id);
            }
            Err(err) => warn!(
                "failed to delete superseded image {} of product {}: {}",
                object_id, product_id, err
            ),
        }
    }
}

fn note_orphan(object_id: Option<ObjectId>, err: &dyn fmt::Display) {
    if let Some(object_id) = object_id {
        warn!("object {} left orphaned: {}", object_id, err);
    }
}

fn required_text(field: &str, value: String) -> CatalogResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn check_price(price: f64) -> CatalogResult<f64> {
    if !price.is_finite() || price < 0.0 {
        return Err(CatalogError::Validation(
            "price must be a number >= 0".into(),
        ));
    }
    Ok(price)
}

fn check_rating(rating: f64) -> CatalogResult<f64> {
    if !(0.0..=MAX_RATING).contains(&rating) {
        return Err(CatalogError::Validation(format!(
            "rating must be between 0 and {}",
            MAX_RATING
        )));
    }
    Ok(rating)
}

fn validate_new(product: NewProduct) -> CatalogResult<NewProduct> {
    Ok(NewProduct {
        name: required_text("name", product.name)?,
        description: required_text("description", product.description)?,
        category: required_text("category", product.category)?,
        price: check_price(product.price)?,
        rating: product.rating.map(check_rating).transpose()?,
    })
}

fn validate_changes(changes: ProductChanges) -> CatalogResult<ProductChanges> {
    Ok(ProductChanges {
        name: changes.name.map(|v| required_text("name", v)).transpose()?,
        description: changes
            .description
            .map(|v| required_text("description", v))
            .transpose()?,
        category: changes
            .category
            .map(|v| required_text("category", v))
            .transpose()?,
        price: changes.price.map(check_price).transpose()?,
        rating: changes.rating.map(check_rating).transpose()?,
    })
}
