//! Persisting tagged images: CSV log, JSON sidecars and DICOM copies.

mod csv_log;
mod dicom;
mod error;
mod record;
mod sidecar;

pub use csv_log::{CsvLog, CSV_HEADER};
pub use dicom::{
    dicom_path, generate_uid, write_dicom, DicomDataset, Element, Tag, Vr,
    EXPLICIT_VR_LITTLE_ENDIAN, OPHTHALMIC_PHOTOGRAPHY_8BIT,
};
pub use error::ExportError;
pub use record::TaggingRecord;
pub use sidecar::{read_sidecar, sidecar_path, write_sidecar};
