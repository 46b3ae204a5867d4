//! Minimal DICOM Part 10 writer for tagged photographs.
//!
//! Files use the Ophthalmic Photography 8 Bit Image storage class and the
//! explicit VR little endian transfer syntax. When the image is calibrated,
//! PixelSpacing carries `1 / pixels_per_mm` millimeters per pixel on both
//! axes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use uuid::Uuid;

use super::error::ExportError;
use super::record::TaggingRecord;

/// Ophthalmic Photography 8 Bit Image Storage.
pub const OPHTHALMIC_PHOTOGRAPHY_8BIT: &str = "1.2.840.10008.5.1.4.1.1.77.1.5.1";
/// Explicit VR Little Endian.
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
const IMPLEMENTATION_CLASS_UID: &str = "2.25.302418436295232512364327393415460271049";
const IMPLEMENTATION_VERSION: &str = "RETINA_TAGGER";

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

/// A (group, element) attribute tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub const FILE_META_GROUP_LENGTH: Tag = Tag(0x0002, 0x0000);
    pub const FILE_META_VERSION: Tag = Tag(0x0002, 0x0001);
    pub const MEDIA_STORAGE_SOP_CLASS_UID: Tag = Tag(0x0002, 0x0002);
    pub const MEDIA_STORAGE_SOP_INSTANCE_UID: Tag = Tag(0x0002, 0x0003);
    pub const TRANSFER_SYNTAX_UID: Tag = Tag(0x0002, 0x0010);
    pub const IMPLEMENTATION_CLASS_UID: Tag = Tag(0x0002, 0x0012);
    pub const IMPLEMENTATION_VERSION_NAME: Tag = Tag(0x0002, 0x0013);
    pub const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
    pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
    pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
    pub const MODALITY: Tag = Tag(0x0008, 0x0060);
    pub const MANUFACTURER_MODEL_NAME: Tag = Tag(0x0008, 0x1090);
    pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
    pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
    pub const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
    pub const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
    pub const IMAGE_LATERALITY: Tag = Tag(0x0020, 0x0062);
    pub const IMAGE_COMMENTS: Tag = Tag(0x0020, 0x4000);
    pub const SAMPLES_PER_PIXEL: Tag = Tag(0x0028, 0x0002);
    pub const PHOTOMETRIC_INTERPRETATION: Tag = Tag(0x0028, 0x0004);
    pub const PLANAR_CONFIGURATION: Tag = Tag(0x0028, 0x0006);
    pub const ROWS: Tag = Tag(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag(0x0028, 0x0011);
    pub const PIXEL_SPACING: Tag = Tag(0x0028, 0x0030);
    pub const BITS_ALLOCATED: Tag = Tag(0x0028, 0x0100);
    pub const BITS_STORED: Tag = Tag(0x0028, 0x0101);
    pub const HIGH_BIT: Tag = Tag(0x0028, 0x0102);
    pub const PIXEL_REPRESENTATION: Tag = Tag(0x0028, 0x0103);
    pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

/// Value representations used by this writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vr {
    CS,
    DA,
    DS,
    LO,
    LT,
    OB,
    PN,
    SH,
    UI,
    UL,
    US,
}

impl Vr {
    fn code(&self) -> &'static [u8; 2] {
        match self {
            Vr::CS => b"CS",
            Vr::DA => b"DA",
            Vr::DS => b"DS",
            Vr::LO => b"LO",
            Vr::LT => b"LT",
            Vr::OB => b"OB",
            Vr::PN => b"PN",
            Vr::SH => b"SH",
            Vr::UI => b"UI",
            Vr::UL => b"UL",
            Vr::US => b"US",
        }
    }

    /// OB uses a 4-byte length preceded by two reserved bytes.
    fn has_long_length(&self) -> bool {
        matches!(self, Vr::OB)
    }

    /// Maximum bytes per value for string VRs.
    fn max_value_len(&self) -> Option<usize> {
        match self {
            Vr::CS | Vr::DS | Vr::SH => Some(16),
            Vr::DA => Some(8),
            Vr::LO | Vr::PN | Vr::UI => Some(64),
            Vr::LT => Some(10_240),
            Vr::OB | Vr::UL | Vr::US => None,
        }
    }

    fn padding(&self) -> u8 {
        match self {
            Vr::UI | Vr::OB => 0,
            _ => b' ',
        }
    }
}

/// One encoded attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub vr: Vr,
    pub value: Vec<u8>,
}

impl Element {
    fn new(tag: Tag, vr: Vr, mut value: Vec<u8>) -> Self {
        if value.len() % 2 == 1 {
            value.push(vr.padding());
        }
        Self { tag, vr, value }
    }

    /// String value, rejected when it exceeds the VR limit. `\` separates
    /// values except in LT.
    fn text(tag: Tag, vr: Vr, text: &str) -> Result<Self, ExportError> {
        let max = vr.max_value_len().unwrap_or(u16::MAX as usize - 1);
        let longest = if vr == Vr::LT {
            text.len()
        } else {
            text.split('\\').map(str::len).max().unwrap_or(0)
        };
        if longest > max || text.len() >= u16::MAX as usize {
            return Err(ExportError::ValueTooLong {
                tag: tag.to_string(),
                len: longest.max(text.len()),
                max,
            });
        }
        Ok(Self::new(tag, vr, text.as_bytes().to_vec()))
    }

    fn us(tag: Tag, value: u16) -> Self {
        Self::new(tag, Vr::US, value.to_le_bytes().to_vec())
    }

    /// Value as text with padding removed.
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.value)
            .trim_end_matches(['\0', ' '])
            .to_string()
    }

    fn encoded_len(&self) -> usize {
        let header = if self.vr.has_long_length() { 12 } else { 8 };
        header + self.value.len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tag.0.to_le_bytes());
        out.extend_from_slice(&self.tag.1.to_le_bytes());
        out.extend_from_slice(self.vr.code());
        if self.vr.has_long_length() {
            out.extend_from_slice(&[0, 0]);
            out.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        } else {
            out.extend_from_slice(&(self.value.len() as u16).to_le_bytes());
        }
        out.extend_from_slice(&self.value);
    }
}

/// A new globally unique UID under the `2.25` (UUID-derived) root.
pub fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

/// Format a decimal string that fits the 16 byte DS limit.
fn format_ds(value: f64) -> String {
    for precision in (0..=10).rev() {
        let s = format!("{:.*}", precision, value);
        let s = if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s
        };
        if s.len() <= 16 {
            return s;
        }
    }
    format!("{:.0}", value)
}

/// The attributes of one DICOM file, sorted by tag.
#[derive(Debug, Clone)]
pub struct DicomDataset {
    meta: Vec<Element>,
    elements: Vec<Element>,
}

impl DicomDataset {
    /// Build the dataset for a tagged image.
    pub fn from_record(record: &TaggingRecord, image: &DynamicImage) -> Result<Self, ExportError> {
        let (width, height) = (image.width(), image.height());
        let (Ok(rows), Ok(columns)) = (u16::try_from(height), u16::try_from(width)) else {
            return Err(ExportError::ImageTooLarge { width, height });
        };

        let color = image.color().has_color();
        let pixel_data = if color {
            image.to_rgb8().into_raw()
        } else {
            image.to_luma8().into_raw()
        };
        if u32::try_from(pixel_data.len()).is_err() {
            return Err(ExportError::ImageTooLarge { width, height });
        }

        let sop_instance_uid = generate_uid();

        let meta = vec![
            Element::new(Tag::FILE_META_VERSION, Vr::OB, vec![0x00, 0x01]),
            Element::text(Tag::MEDIA_STORAGE_SOP_CLASS_UID, Vr::UI, OPHTHALMIC_PHOTOGRAPHY_8BIT)?,
            Element::text(Tag::MEDIA_STORAGE_SOP_INSTANCE_UID, Vr::UI, &sop_instance_uid)?,
            Element::text(Tag::TRANSFER_SYNTAX_UID, Vr::UI, EXPLICIT_VR_LITTLE_ENDIAN)?,
            Element::text(Tag::IMPLEMENTATION_CLASS_UID, Vr::UI, IMPLEMENTATION_CLASS_UID)?,
            Element::text(Tag::IMPLEMENTATION_VERSION_NAME, Vr::SH, IMPLEMENTATION_VERSION)?,
        ];

        let mut elements = vec![
            Element::text(Tag::SOP_CLASS_UID, Vr::UI, OPHTHALMIC_PHOTOGRAPHY_8BIT)?,
            Element::text(Tag::SOP_INSTANCE_UID, Vr::UI, &sop_instance_uid)?,
            Element::text(Tag::MODALITY, Vr::CS, "OP")?,
            Element::text(Tag::MANUFACTURER_MODEL_NAME, Vr::LO, &record.device)?,
            Element::text(Tag::PATIENT_NAME, Vr::PN, &record.patient_id)?,
            Element::text(Tag::PATIENT_ID, Vr::LO, &record.patient_id)?,
            Element::text(Tag::STUDY_INSTANCE_UID, Vr::UI, &generate_uid())?,
            Element::text(Tag::SERIES_INSTANCE_UID, Vr::UI, &generate_uid())?,
            Element::us(Tag::SAMPLES_PER_PIXEL, if color { 3 } else { 1 }),
            Element::text(
                Tag::PHOTOMETRIC_INTERPRETATION,
                Vr::CS,
                if color { "RGB" } else { "MONOCHROME2" },
            )?,
            Element::us(Tag::ROWS, rows),
            Element::us(Tag::COLUMNS, columns),
            Element::us(Tag::BITS_ALLOCATED, 8),
            Element::us(Tag::BITS_STORED, 8),
            Element::us(Tag::HIGH_BIT, 7),
            Element::us(Tag::PIXEL_REPRESENTATION, 0),
            Element::new(Tag::PIXEL_DATA, Vr::OB, pixel_data),
        ];

        if color {
            elements.push(Element::us(Tag::PLANAR_CONFIGURATION, 0));
        }
        if let Some(date) = record.capture_date.as_deref().and_then(study_date) {
            elements.push(Element::text(Tag::STUDY_DATE, Vr::DA, &date)?);
        }
        if let Some(eye) = record.eye {
            elements.push(Element::text(Tag::IMAGE_LATERALITY, Vr::CS, eye.laterality())?);
        }
        if !record.diagnosis_tags.is_empty() {
            elements.push(Element::text(Tag::IMAGE_COMMENTS, Vr::LT, &record.diagnosis_tags)?);
        }
        if let Some(ppm) = record.pixels_per_mm.filter(|p| p.is_finite() && *p > 0.0) {
            let spacing = format_ds(1.0 / ppm);
            elements.push(Element::text(
                Tag::PIXEL_SPACING,
                Vr::DS,
                &format!("{}\\{}", spacing, spacing),
            )?);
        }

        elements.sort_by_key(|e| e.tag);
        Ok(Self { meta, elements })
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.meta
            .iter()
            .chain(self.elements.iter())
            .find(|e| e.tag == tag)
    }

    /// Serialize as a Part 10 file: preamble, magic, file meta group, dataset.
    pub fn encode(&self) -> Vec<u8> {
        let meta_len: usize = self.meta.iter().map(Element::encoded_len).sum();
        let body_len: usize = self.elements.iter().map(Element::encoded_len).sum();

        let mut out = Vec::with_capacity(PREAMBLE_LEN + MAGIC.len() + 12 + meta_len + body_len);
        out.resize(PREAMBLE_LEN, 0);
        out.extend_from_slice(MAGIC);

        Element::new(
            Tag::FILE_META_GROUP_LENGTH,
            Vr::UL,
            (meta_len as u32).to_le_bytes().to_vec(),
        )
        .encode_into(&mut out);
        for element in &self.meta {
            element.encode_into(&mut out);
        }
        for element in &self.elements {
            element.encode_into(&mut out);
        }
        out
    }
}

/// `YYYY-MM-DD` to DICOM `YYYYMMDD`; other formats are dropped.
fn study_date(date: &str) -> Option<String> {
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y%m%d").to_string())
}

/// `scan.jpg` -> `scan.dcm` in the same folder.
pub fn dicom_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("dcm")
}

/// Write a DICOM copy of the image next to it. Returns the file written.
pub fn write_dicom(record: &TaggingRecord, image: &DynamicImage, image_path: &Path) -> Result<PathBuf, ExportError> {
    let path = dicom_path(image_path);
    let bytes = DicomDataset::from_record(record, image)?.encode();
    fs::write(&path, bytes).map_err(ExportError::io(&path))?;
    tracing::info!("Saved DICOM to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Eye;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn record(pixels_per_mm: Option<f64>) -> TaggingRecord {
        TaggingRecord {
            record_id: "r".to_string(),
            filename: "PAT1_OD_20250405.jpg".to_string(),
            full_path: String::new(),
            patient_id: "PAT1".to_string(),
            eye: Some(Eye::OD),
            capture_date: Some("2025-04-05".to_string()),
            diagnosis_tags: "Normal".to_string(),
            notes: String::new(),
            device: "TOPCON TRC-NW6S".to_string(),
            fov_deg: 45,
            image_width: 3,
            image_height: 2,
            pixels_per_mm,
            calibration_method: pixels_per_mm.map(|_| "manual".to_string()),
            measurements_mm: vec![],
            processed_at: String::new(),
        }
    }

    /// Walk an encoded explicit VR little endian stream after the magic.
    fn parse(bytes: &[u8]) -> Vec<(Tag, [u8; 2], Vec<u8>)> {
        let mut out = Vec::new();
        let mut i = PREAMBLE_LEN + 4;
        while i < bytes.len() {
            let group = u16::from_le_bytes([bytes[i], bytes[i + 1]]);
            let elem = u16::from_le_bytes([bytes[i + 2], bytes[i + 3]]);
            let vr = [bytes[i + 4], bytes[i + 5]];
            let (len, header) = if &vr == b"OB" {
                let len = u32::from_le_bytes([bytes[i + 8], bytes[i + 9], bytes[i + 10], bytes[i + 11]]);
                (len as usize, 12)
            } else {
                (u16::from_le_bytes([bytes[i + 6], bytes[i + 7]]) as usize, 8)
            };
            let start = i + header;
            out.push((Tag(group, elem), vr, bytes[start..start + len].to_vec()));
            i = start + len;
        }
        out
    }

    #[test]
    fn test_format_ds() {
        assert_eq!(format_ds(0.1), "0.1");
        assert_eq!(format_ds(0.0125), "0.0125");
        assert_eq!(format_ds(2.0), "2");
        assert!(format_ds(1.0 / 3.0).len() <= 16);
    }

    #[test]
    fn test_encoded_layout() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])));
        let bytes = DicomDataset::from_record(&record(Some(10.0)), &image)
            .unwrap()
            .encode();

        assert!(bytes[..PREAMBLE_LEN].iter().all(|&b| b == 0));
        assert_eq!(&bytes[PREAMBLE_LEN..PREAMBLE_LEN + 4], MAGIC);

        let elements = parse(&bytes);
        assert_eq!(elements[0].0, Tag::FILE_META_GROUP_LENGTH);
        let meta_len = u32::from_le_bytes(elements[0].2.clone().try_into().unwrap()) as usize;
        let meta_actual: usize = elements
            .iter()
            .skip(1)
            .take_while(|(t, _, _)| t.0 == 0x0002)
            .map(|(_, vr, v)| v.len() + if vr == b"OB" { 12 } else { 8 })
            .sum();
        assert_eq!(meta_len, meta_actual);

        let body: Vec<_> = elements.iter().filter(|(t, _, _)| t.0 != 0x0002).collect();
        assert!(body.windows(2).all(|w| w[0].0 < w[1].0), "dataset must be tag-sorted");
        assert!(elements.iter().all(|(_, _, v)| v.len() % 2 == 0));

        let spacing = elements.iter().find(|(t, _, _)| *t == Tag::PIXEL_SPACING).unwrap();
        assert_eq!(&spacing.1, b"DS");
        assert_eq!(String::from_utf8_lossy(&spacing.2).trim_end(), "0.1\\0.1");

        let pixels = elements.iter().find(|(t, _, _)| *t == Tag::PIXEL_DATA).unwrap();
        assert_eq!(pixels.2.len(), 3 * 2 * 3);
    }

    #[test]
    fn test_attributes() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 4, Luma([9])));
        let dataset = DicomDataset::from_record(&record(Some(80.0)), &image).unwrap();

        assert_eq!(dataset.get(Tag::PATIENT_ID).unwrap().as_text(), "PAT1");
        assert_eq!(dataset.get(Tag::STUDY_DATE).unwrap().as_text(), "20250405");
        assert_eq!(dataset.get(Tag::IMAGE_LATERALITY).unwrap().as_text(), "R");
        assert_eq!(dataset.get(Tag::PHOTOMETRIC_INTERPRETATION).unwrap().as_text(), "MONOCHROME2");
        assert_eq!(dataset.get(Tag::ROWS).unwrap().value, 4u16.to_le_bytes().to_vec());
        assert_eq!(dataset.get(Tag::COLUMNS).unwrap().value, 5u16.to_le_bytes().to_vec());
        assert_eq!(dataset.get(Tag::PIXEL_SPACING).unwrap().as_text(), "0.0125\\0.0125");
        assert!(dataset.get(Tag::PLANAR_CONFIGURATION).is_none());
        // Odd-length pixel data is padded to even.
        assert_eq!(dataset.get(Tag::PIXEL_DATA).unwrap().value.len(), 20);

        let sop = dataset.get(Tag::SOP_INSTANCE_UID).unwrap().as_text();
        assert!(sop.starts_with("2.25."));
        assert!(sop.len() <= 64);
        assert_eq!(dataset.get(Tag::MEDIA_STORAGE_SOP_INSTANCE_UID).unwrap().as_text(), sop);
    }

    #[test]
    fn test_overlong_text_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));

        let mut long_id = record(None);
        long_id.patient_id = "P".repeat(70_000);
        assert!(matches!(
            DicomDataset::from_record(&long_id, &image),
            Err(ExportError::ValueTooLong { ref tag, max: 64, .. }) if tag == "(0010,0010)"
        ));

        let mut long_tags = record(None);
        long_tags.diagnosis_tags = "x".repeat(10_241);
        assert!(matches!(
            DicomDataset::from_record(&long_tags, &image),
            Err(ExportError::ValueTooLong { ref tag, len: 10_241, max: 10_240 }) if tag == "(0020,4000)"
        ));

        let mut many_values = record(None);
        many_values.patient_id = vec!["AB"; 30_000].join("\\");
        assert!(matches!(
            DicomDataset::from_record(&many_values, &image),
            Err(ExportError::ValueTooLong { .. })
        ));
    }

    #[test]
    fn test_text_at_limit_accepted() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let mut rec = record(None);
        rec.patient_id = "P".repeat(64);
        rec.diagnosis_tags = "x".repeat(10_240);
        let dataset = DicomDataset::from_record(&rec, &image).unwrap();
        assert_eq!(dataset.get(Tag::PATIENT_ID).unwrap().as_text().len(), 64);
        assert_eq!(dataset.get(Tag::IMAGE_COMMENTS).unwrap().value.len(), 10_240);
        assert_eq!(Tag::PATIENT_ID.to_string(), "(0010,0020)");
    }

    #[test]
    fn test_no_spacing_when_uncalibrated() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let dataset = DicomDataset::from_record(&record(None), &image).unwrap();
        assert!(dataset.get(Tag::PIXEL_SPACING).is_none());
    }

    #[test]
    fn test_write_dicom_file() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("PAT1_OD_20250405.jpg");
        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));

        let written = write_dicom(&record(Some(10.0)), &image, &image_path).unwrap();
        assert_eq!(written, dir.path().join("PAT1_OD_20250405.dcm"));
        let bytes = fs::read(&written).unwrap();
        assert_eq!(&bytes[PREAMBLE_LEN..PREAMBLE_LEN + 4], b"DICM");
    }
}
