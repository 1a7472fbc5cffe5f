pub mod image_file_crop_writer;
pub mod image_file_photo_reader;
