//! Patient metadata for tagged photographs.

mod filename;

pub use filename::{parse_filename, rename_to_standard, standard_filename, Eye, ImageMetadata};
