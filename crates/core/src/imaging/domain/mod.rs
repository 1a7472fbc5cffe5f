pub mod crop_writer;
pub mod photo_reader;
