//! Core data models for the catalog service.
//!
//! Products and stored objects live in separate tables and are related only
//! by the opaque [`object::ObjectId`] a product carries. Both map to rows via
//! `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod object;
pub mod product;
