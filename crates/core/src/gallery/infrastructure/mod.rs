pub mod json_gallery_repository;
