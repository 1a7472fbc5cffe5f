pub mod bounding_box;
pub mod constants;
pub mod face_encoding;
pub mod model_resolver;
pub mod photo;
