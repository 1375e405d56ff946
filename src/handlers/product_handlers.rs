//! HTTP handlers for product and product-image operations.
//! Image parts of multipart forms are streamed straight into the content
//! store, and image downloads are streamed back chunk by chunk.

use super::AppState;
use crate::{
    errors::AppError,
    models::{
        object::DEFAULT_CONTENT_TYPE,
        product::{NewProduct, ProductChanges, ProductFilter},
    },
    services::catalog_service::ImageUpload,
};
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, Query, State,
        multipart::Field,
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tracing::debug;
use uuid::Uuid;

/// Name of the multipart part carrying the image file.
const IMAGE_FIELD: &str = "image";

/// Query params accepted by `GET /products/{id}`.
#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    #[serde(rename = "includeInactive")]
    pub include_inactive: Option<bool>,
}

/// Query params accepted by `GET /products/search`.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// Text parts of a product form, collected until the image part arrives.
#[derive(Debug, Default)]
struct ProductForm {
    name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    price: Option<f64>,
    rating: Option<f64>,
}

impl ProductForm {
    fn set(&mut self, field: &str, value: String) -> Result<(), AppError> {
        match field {
            "name" => self.name = Some(value),
            "description" => self.description = Some(value),
            "category" => self.category = Some(value),
            "price" => self.price = parse_number(field, &value)?,
            "rating" => self.rating = parse_number(field, &value)?,
            other => debug!("ignoring form field `{}`", other),
        }
        Ok(())
    }

    fn into_new_product(self) -> Result<NewProduct, AppError> {
        let price = self
            .price
            .ok_or_else(|| AppError::bad_request("price is required"))?;
        Ok(NewProduct {
            name: self.name.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            price,
            rating: self.rating,
        })
    }

    fn into_changes(self) -> ProductChanges {
        ProductChanges {
            name: self.name,
            description: self.description,
            category: self.category,
            price: self.price,
            rating: self.rating,
        }
    }
}

/// Empty numeric parts count as absent.
fn parse_number(field: &str, value: &str) -> Result<Option<f64>, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| AppError::bad_request(format!("{} must be a number", field)))
}

/// Browsers send the file part with an empty filename when no file was
/// chosen; such a part means "no image".
fn carries_file(field: &Field<'_>) -> bool {
    field.file_name().is_some_and(|name| !name.is_empty())
}

/// The multipart error stays inside the `io::Error` so its status (413 for
/// an oversize body) survives the trip through the content store.
fn image_upload(field: Field<'_>) -> ImageUpload<'_> {
    let original_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_owned);
    ImageUpload::new(
        original_name,
        content_type,
        field.map(|chunk| chunk.map_err(io::Error::other)),
    )
}

/// `POST /products` — multipart form with an optional trailing `image` part.
pub async fn create_product(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = ProductForm::default();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if name == IMAGE_FIELD {
            if !carries_file(&field) {
                debug!("skipping `{}` part without a filename", IMAGE_FIELD);
                continue;
            }
            let product = form.into_new_product()?;
            let created = state
                .catalog
                .create(product, Some(image_upload(field)))
                .await?;
            return Ok((StatusCode::CREATED, Json(created)));
        }
        form.set(&name, field.text().await?)?;
    }

    let created = state.catalog.create(form.into_new_product()?, None).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /products/{id}` — partial multipart update with optional new image.
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = ProductForm::default();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if name == IMAGE_FIELD {
            if !carries_file(&field) {
                debug!("skipping `{}` part without a filename", IMAGE_FIELD);
                continue;
            }
            let changes = form.into_changes();
            let updated = state
                .catalog
                .update(id, changes, Some(image_upload(field)))
                .await?;
            return Ok(Json(updated));
        }
        form.set(&name, field.text().await?)?;
    }

    let updated = state.catalog.update(id, form.into_changes(), None).await?;
    Ok(Json(updated))
}

/// `GET /products` — active products, supports ?category=&minPrice=&maxPrice=&minRating=
pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog.find_all(&filter).await?))
}

/// `GET /products/search?q=` — match name or description.
pub async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog.search(&query.q).await?))
}

/// `GET /products/{id}` — active product, or any with `?includeInactive=true`.
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LookupQuery>,
) -> Result<impl IntoResponse, AppError> {
    let product = if query.include_inactive.unwrap_or(false) {
        state.catalog.find_any(id).await?
    } else {
        state.catalog.find_one(id).await?
    };
    Ok(Json(product))
}

/// `DELETE /products/{id}` — soft delete; returns the deactivated product.
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog.remove(id).await?))
}

/// `GET /products/{id}/image` — stream the product image.
pub async fn get_product_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let image = state.catalog.get_image(id).await?;

    let mut response = Response::new(Body::from_stream(image.stream));
    *response.status_mut() = StatusCode::OK;
    set_image_headers(
        response.headers_mut(),
        &image.content_type,
        image.length,
        state.image_max_age,
    );
    Ok(response)
}

fn set_image_headers(headers: &mut HeaderMap, content_type: &str, length: i64, max_age: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length.max(0)));
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", max_age)) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}
