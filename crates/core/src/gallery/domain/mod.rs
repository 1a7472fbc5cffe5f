pub mod encoding_store;
pub mod gallery_repository;
