//! src/services/product_repository.rs
//!
//! ProductRepository — CRUD over the `products` table. It knows nothing about
//! binary content: `image_object_id` is stored as an opaque value and never
//! checked against the content store.

use crate::models::{
    object::ObjectId,
    product::{NewProduct, Product, ProductChanges, ProductFilter},
};
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("product `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

const PRODUCT_COLUMNS: &str = "id, name, description, category, price, rating, is_active, \
                               image_object_id, created_at, updated_at";

/// Attribute merge applied by [`ProductRepository::update_by_id`].
///
/// Unset fields keep their stored value. There is no way to clear an image
/// reference through an update; only deactivation releases it.
#[derive(Clone, Debug, Default)]
pub struct ProductUpdate {
    pub changes: ProductChanges,
    pub image_object_id: Option<ObjectId>,
}

#[derive(Clone)]
pub struct ProductRepository {
    db: SqlitePool,
}

impl ProductRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a new active product. Attributes are stored as given; callers
    /// validate them first.
    pub async fn insert(
        &self,
        product: &NewProduct,
        image_object_id: Option<ObjectId>,
    ) -> RepositoryResult<Product> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products (
                id, name, description, category, price, rating, is_active,
                image_object_id, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.rating.unwrap_or(0.0))
        .bind(image_object_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(record)
    }

    /// Fetch a product by id. Inactive products are only returned when
    /// `include_inactive` is set.
    pub async fn find_by_id(&self, id: Uuid, include_inactive: bool) -> RepositoryResult<Product> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = "));
        builder.push_bind(id);
        if !include_inactive {
            builder.push(" AND is_active = 1");
        }

        builder
            .build_query_as::<Product>()
            .fetch_optional(&self.db)
            .await?
            .ok_or(RepositoryError::NotFound(id))
    }

    /// List active products matching every bound set in `filter`.
    pub async fn find_all(&self, filter: &ProductFilter) -> RepositoryResult<Vec<Product>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1"
        ));

        if let Some(category) = &filter.category {
            builder.push(" AND category = ");
            builder.push_bind(category.clone());
        }
        if let Some(min_price) = filter.min_price {
            builder.push(" AND price >= ");
            builder.push_bind(min_price);
        }
        if let Some(max_price) = filter.max_price {
            builder.push(" AND price <= ");
            builder.push_bind(max_price);
        }
        if let Some(min_rating) = filter.min_rating {
            builder.push(" AND rating >= ");
            builder.push_bind(min_rating);
        }
        builder.push(" ORDER BY created_at ASC, name ASC");

        Ok(builder.build_query_as().fetch_all(&self.db).await?)
    }

    /// Case-insensitive substring search over name and description of
    /// active products.
    pub async fn search(&self, query: &str) -> RepositoryResult<Vec<Product>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE is_active = 1
               AND (lower(name) LIKE ?1 ESCAPE '\\' OR lower(description) LIKE ?1 ESCAPE '\\')
             ORDER BY created_at ASC, name ASC"
        ))
        .bind(pattern)
        .fetch_all(&self.db)
        .await?;

        Ok(products)
    }

    /// Merge `update` into an active product in a single statement and
    /// return the stored result.
    pub async fn update_by_id(&self, id: Uuid, update: &ProductUpdate) -> RepositoryResult<Product> {
        let changes = &update.changes;
        sqlx::query_as::<_, Product>(&format!(
            "UPDATE products SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                category = COALESCE(?, category),
                price = COALESCE(?, price),
                rating = COALESCE(?, rating),
                image_object_id = COALESCE(?, image_object_id),
                updated_at = ?
             WHERE id = ? AND is_active = 1
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(changes.name.as_deref())
        .bind(changes.description.as_deref())
        .bind(changes.category.as_deref())
        .bind(changes.price)
        .bind(changes.rating)
        .bind(update.image_object_id)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(RepositoryError::NotFound(id))
    }

    /// Flip `is_active`. Deactivating also drops the image reference so an
    /// inactive product never points at an object.
    pub async fn set_active(&self, id: Uuid, active: bool) -> RepositoryResult<Product> {
        sqlx::query_as::<_, Product>(&format!(
            "UPDATE products SET
                is_active = ?1,
                image_object_id = CASE WHEN ?1 THEN image_object_id ELSE NULL END,
                updated_at = ?2
             WHERE id = ?3
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(active)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(RepositoryError::NotFound(id))
    }
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;

    fn product(name: &str, category: &str, price: f64, rating: Option<f64>) -> NewProduct {
        NewProduct {
            name: name.into(),
            description: format!("{} description", name),
            category: category.into(),
            price,
            rating,
        }
    }

    async fn repository() -> ProductRepository {
        ProductRepository::new(memory_pool().await)
    }

    #[tokio::test]
    async fn insert_applies_defaults() {
        let repo = repository().await;
        let created = repo
            .insert(&product("Widget", "tools", 9.99, None), None)
            .await
            .unwrap();

        assert!(created.is_active);
        assert_eq!(created.rating, 0.0);
        assert_eq!(created.image_object_id, None);
        assert_eq!(repo.find_by_id(created.id, false).await.unwrap(), created);
    }

    #[tokio::test]
    async fn filters_combine_conjunctively() {
        let repo = repository().await;
        let a = repo.insert(&product("A", "a", 10.0, Some(4.0)), None).await.unwrap();
        let b = repo.insert(&product("B", "b", 20.0, Some(2.0)), None).await.unwrap();

        let by_category = ProductFilter {
            category: Some("a".into()),
            ..Default::default()
        };
        let ids: Vec<Uuid> = repo.find_all(&by_category).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a.id]);

        let by_price = ProductFilter {
            min_price: Some(15.0),
            ..Default::default()
        };
        let ids: Vec<Uuid> = repo.find_all(&by_price).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![b.id]);

        let inclusive = ProductFilter {
            min_price: Some(10.0),
            max_price: Some(20.0),
            min_rating: Some(2.0),
            ..Default::default()
        };
        assert_eq!(repo.find_all(&inclusive).await.unwrap().len(), 2);

        let disjoint = ProductFilter {
            category: Some("a".into()),
            min_price: Some(15.0),
            ..Default::default()
        };
        assert!(repo.find_all(&disjoint).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_merges_only_given_fields() {
        let repo = repository().await;
        let created = repo.insert(&product("Lamp", "home", 30.0, Some(3.0)), None).await.unwrap();
        let image = ObjectId::generate();

        let update = ProductUpdate {
            changes: ProductChanges {
                price: Some(25.0),
                ..Default::default()
            },
            image_object_id: Some(image),
        };
        let updated = repo.update_by_id(created.id, &update).await.unwrap();

        assert_eq!(updated.price, 25.0);
        assert_eq!(updated.name, "Lamp");
        assert_eq!(updated.rating, 3.0);
        assert_eq!(updated.image_object_id, Some(image));
        assert!(updated.updated_at >= created.updated_at);

        let missing = repo.update_by_id(Uuid::new_v4(), &update).await;
        assert!(matches!(missing, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn deactivated_products_drop_out_of_default_lookups() {
        let repo = repository().await;
        let image = ObjectId::generate();
        let created = repo
            .insert(&product("Chair", "home", 50.0, None), Some(image))
            .await
            .unwrap();

        let inactive = repo.set_active(created.id, false).await.unwrap();
        assert!(!inactive.is_active);
        assert_eq!(inactive.image_object_id, None);

        assert!(matches!(
            repo.find_by_id(created.id, false).await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(!repo.find_by_id(created.id, true).await.unwrap().is_active);
        assert!(repo.find_all(&ProductFilter::default()).await.unwrap().is_empty());

        let missing = repo.update_by_id(created.id, &ProductUpdate::default()).await;
        assert!(matches!(missing, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn search_matches_name_or_description_case_insensitively() {
        let repo = repository().await;
        let desk = repo.insert(&product("Standing Desk", "office", 300.0, None), None).await.unwrap();
        let mut pen = product("Pen", "office", 2.0, None);
        pen.description = "Writes on any desk".into();
        let pen = repo.insert(&pen, None).await.unwrap();
        repo.insert(&product("Mug", "kitchen", 8.0, None), None).await.unwrap();

        let ids: Vec<Uuid> = repo.search("DESK").await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&desk.id) && ids.contains(&pen.id));
        assert!(repo.search("100%").await.unwrap().is_empty());
    }
}
