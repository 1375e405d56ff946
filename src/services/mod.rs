pub mod catalog_service;
pub mod content_store;
pub mod product_repository;
