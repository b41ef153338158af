//! # FITS Images
//!
//! The image-format collaborator the client relies on. It only has to turn
//! a FITS file into a pixel grid and a header lookup; the client never looks
//! inside the pixel encoding. Decoding is done by cfitsio through `fitsio`.
//!
//! The image comes from the first HDU that holds pixel data, so files with an
//! empty primary HDU and the image in an extension (compressed or
//! multi-extension files) decode as well. Header values always come from the
//! primary HDU. For data cubes the first plane is returned.

mod convert;

pub use convert::{convert, convert_file};

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::ImageType;
use fitsio::FitsFile;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Keywords copied into [`FitsHeader`] when a file is opened.
const HEADER_KEYWORDS: &[&str] = &[
    "OBSID", "RA", "DEC", "MJD-OBS", "RADIUS", "EXPTIME", "OBJECT", "DATE-OBS", "TELESCOP",
    "INSTRUME",
];

/// Tile-compressed HDUs decompress to more bytes than they occupy on disk.
const MAX_COMPRESSION_RATIO: u64 = 16;

#[derive(Error, Debug)]
pub enum FitsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FITS error: {0}")]
    Fits(#[from] fitsio::errors::Error),

    #[error("Invalid FITS format: {0}")]
    InvalidFormat(String),

    #[error("Missing required keyword: {0}")]
    MissingKeyword(String),

    #[error("Unsupported conversion: {0}")]
    Unsupported(String),

    #[error("Image encoding failed: {0}")]
    Image(String),
}

/// Primary header values, keyword → value text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader(BTreeMap<String, String>);

impl FitsHeader {
    fn from_hdu(hdu: &FitsHdu, fptr: &mut FitsFile) -> Self {
        let values = HEADER_KEYWORDS
            .iter()
            .filter_map(|&key| {
                hdu.read_key::<String>(fptr, key)
                    .ok()
                    .map(|value| (key.to_string(), value.trim().to_string()))
            })
            .collect();
        Self(values)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|value| value.parse().ok())
    }
}

/// Pixel grid plus header of a decoded image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    /// Row-major, first row is the bottom of the image as FITS stores it.
    /// `BZERO`/`BSCALE` already applied.
    pub pixels: Vec<f64>,
    pub header: FitsHeader,
}

/// Turns raw image data into pixels and header values.
pub trait ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, FitsError>;

    fn decode_file(&self, path: &Path) -> Result<DecodedImage, FitsError> {
        let bytes = std::fs::read(path)?;
        self.decode(&bytes)
    }
}

/// Decoder for FITS files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FitsDecoder;

impl ImageDecoder for FitsDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, FitsError> {
        // cfitsio reads from files only
        let mut file = tempfile::Builder::new().suffix(".fits").tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        read_image(file.path())
    }

    fn decode_file(&self, path: &Path) -> Result<DecodedImage, FitsError> {
        read_image(path)
    }
}

/// Read a FITS file from disk. Files without a `.fits`/`.fit`/`.fts`
/// extension are refused before they are opened.
pub fn read_fits(path: &Path) -> Result<DecodedImage, FitsError> {
    check_extension(path)?;
    read_image(path)
}

/// Read only the primary header of a FITS file.
pub fn read_header(path: &Path) -> Result<FitsHeader, FitsError> {
    check_extension(path)?;
    let mut fptr = FitsFile::open(path)?;
    let primary = fptr.primary_hdu()?;
    Ok(FitsHeader::from_hdu(&primary, &mut fptr))
}

fn check_extension(path: &Path) -> Result<(), FitsError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    if matches!(extension.as_deref(), Some("fits" | "fit" | "fts")) {
        Ok(())
    } else {
        Err(FitsError::InvalidFormat(format!(
            "{} is not a FITS file",
            path.display()
        )))
    }
}

fn read_image(path: &Path) -> Result<DecodedImage, FitsError> {
    let file_len = std::fs::metadata(path)?.len();
    let mut fptr = FitsFile::open(path)?;

    let primary = fptr.primary_hdu()?;
    let header = FitsHeader::from_hdu(&primary, &mut fptr);

    let hdu_count = fptr.iter().count();
    let mut image_hdu = None;
    for index in 0..hdu_count {
        let hdu = fptr.hdu(index)?;
        let image = match &hdu.info {
            HduInfo::ImageInfo { shape, image_type }
                if !shape.is_empty() && shape.iter().all(|&d| d > 0) =>
            {
                Some((shape.clone(), image_type.clone()))
            }
            _ => None,
        };
        if let Some((shape, image_type)) = image {
            image_hdu = Some((hdu, shape, image_type));
            break;
        }
    }

    let Some((hdu, shape, image_type)) = image_hdu else {
        return Err(FitsError::InvalidFormat("no image data in file".to_string()));
    };

    // shape is [.., NAXIS2, NAXIS1]
    let (width, height) = match shape.as_slice() {
        [width] => (*width, 1),
        [height, width] => (*width, *height),
        [_, height, width] => (*width, *height),
        other => {
            return Err(FitsError::InvalidFormat(format!(
                "unsupported NAXIS={}",
                other.len()
            )))
        }
    };

    check_data_size(&shape, image_type, file_len)?;

    let mut pixels: Vec<f64> = hdu.read_image(&mut fptr)?;
    pixels.truncate(width * height);

    Ok(DecodedImage {
        width,
        height,
        pixels,
        header,
    })
}

/// Rejects headers that claim more data than the file can hold, before any
/// pixel buffer is allocated.
fn check_data_size(shape: &[usize], image_type: ImageType, file_len: u64) -> Result<(), FitsError> {
    let too_large =
        || FitsError::InvalidFormat(format!("image of shape {:?} is too large", shape));

    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(too_large)?;
    // decoded pixels are f64
    count
        .checked_mul(std::mem::size_of::<f64>())
        .ok_or_else(too_large)?;

    let stored = u64::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(bytes_per_pixel(image_type)))
        .ok_or_else(too_large)?;
    if stored > file_len.saturating_mul(MAX_COMPRESSION_RATIO) {
        return Err(FitsError::InvalidFormat(format!(
            "header claims {} bytes of pixel data but the file has {}",
            stored, file_len
        )));
    }
    Ok(())
}

fn bytes_per_pixel(image_type: ImageType) -> u64 {
    match image_type {
        ImageType::UnsignedByte | ImageType::Byte => 1,
        ImageType::Short | ImageType::UnsignedShort => 2,
        ImageType::Long | ImageType::UnsignedLong | ImageType::Float => 4,
        ImageType::LongLong | ImageType::Double => 8,
    }
}

/// Observation metadata pulled from the primary header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderData {
    pub obs_id: String,
    pub ra: String,
    pub dec: String,
    /// Modified Julian Date of the observation
    pub mjd: f64,
    pub radius: f64,
    /// Seconds
    pub exposure_time: f64,
}

impl HeaderData {
    pub fn from_header(header: &FitsHeader) -> Result<Self, FitsError> {
        Ok(Self {
            obs_id: text(header, "OBSID")?,
            ra: text(header, "RA")?,
            dec: text(header, "DEC")?,
            mjd: float(header, "MJD-OBS")?,
            radius: float(header, "RADIUS")?,
            exposure_time: float(header, "EXPTIME")?,
        })
    }
}

fn text(header: &FitsHeader, key: &str) -> Result<String, FitsError> {
    header
        .get(key)
        .map(str::to_string)
        .ok_or_else(|| FitsError::MissingKeyword(key.to_string()))
}

fn float(header: &FitsHeader, key: &str) -> Result<f64, FitsError> {
    header
        .get_float(key)
        .ok_or_else(|| FitsError::MissingKeyword(key.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fitsio::images::ImageDescription;
    use std::path::PathBuf;

    /// 3x2 16-bit image with BZERO=10 and observation keywords.
    pub(crate) fn write_gradient(dir: &Path) -> PathBuf {
        let path = dir.join("gradient.fits");
        let description = ImageDescription {
            data_type: ImageType::Short,
            dimensions: &[2, 3],
        };
        let mut fptr = FitsFile::create(&path)
            .with_custom_primary(&description)
            .open()
            .unwrap();
        let hdu = fptr.primary_hdu().unwrap();
        hdu.write_image(&mut fptr, &[0i32, 100, 200, 300, 400, 500])
            .unwrap();
        hdu.write_key(&mut fptr, "BZERO", 10.0).unwrap();
        hdu.write_key(&mut fptr, "OBSID", "obs-0042").unwrap();
        hdu.write_key(&mut fptr, "RA", "10:45:03.6").unwrap();
        hdu.write_key(&mut fptr, "DEC", "-59:41:04").unwrap();
        hdu.write_key(&mut fptr, "MJD-OBS", 60123.5).unwrap();
        hdu.write_key(&mut fptr, "RADIUS", 2.5).unwrap();
        hdu.write_key(&mut fptr, "EXPTIME", 30.0).unwrap();
        path
    }

    /// Hand-built header cards, for headers cfitsio refuses to write.
    fn raw_fits(cards: &[&str]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for card in cards.iter().chain(std::iter::once(&"END")) {
            bytes.extend_from_slice(format!("{:<80}", card).as_bytes());
        }
        bytes.resize(2880, b' ');
        bytes
    }

    #[test]
    fn test_decode_16bit_with_bzero() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gradient(dir.path());

        let image = FitsDecoder.decode_file(&path).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(image.pixels, vec![10.0, 110.0, 210.0, 310.0, 410.0, 510.0]);

        let from_bytes = FitsDecoder.decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(from_bytes.pixels, image.pixels);
    }

    #[test]
    fn test_image_in_extension_hdu() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extension.fits");
        {
            let mut fptr = FitsFile::create(&path).open().unwrap();
            let primary = fptr.primary_hdu().unwrap();
            primary.write_key(&mut fptr, "OBSID", "ext-1").unwrap();
            let description = ImageDescription {
                data_type: ImageType::Float,
                dimensions: &[1, 2],
            };
            let hdu = fptr.create_image("SCI", &description).unwrap();
            hdu.write_image(&mut fptr, &[1.5f32, -2.25]).unwrap();
        }

        let image = read_fits(&path).unwrap();
        assert_eq!((image.width, image.height), (2, 1));
        assert_eq!(image.pixels, vec![1.5, -2.25]);
        assert_eq!(image.header.get("OBSID"), Some("ext-1"));
    }

    #[test]
    fn test_header_data_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gradient(dir.path());

        let data = HeaderData::from_header(&read_header(&path).unwrap()).unwrap();
        assert_eq!(data.obs_id, "obs-0042");
        assert_eq!(data.ra, "10:45:03.6");
        assert_eq!(data.dec, "-59:41:04");
        assert!((data.mjd - 60123.5).abs() < 1e-6);
        assert!((data.radius - 2.5).abs() < 1e-9);
        assert!((data.exposure_time - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_keyword() {
        let mut header = FitsHeader::default();
        header.0.insert("OBSID".into(), "x".into());
        assert!(matches!(
            HeaderData::from_header(&header),
            Err(FitsError::MissingKeyword(k)) if k == "RA"
        ));
    }

    #[test]
    fn test_oversized_header_is_an_error() {
        assert!(matches!(
            check_data_size(&[1, 4_611_686_018_427_387_904], ImageType::LongLong, 2880),
            Err(FitsError::InvalidFormat(_))
        ));
        assert!(matches!(
            check_data_size(&[1_000_000, 1_000_000], ImageType::UnsignedByte, 2880),
            Err(FitsError::InvalidFormat(_))
        ));
        assert!(check_data_size(&[2, 3], ImageType::Short, 5760).is_ok());

        let bytes = raw_fits(&[
            "SIMPLE  =                    T",
            "BITPIX  =                   64",
            "NAXIS   =                    2",
            "NAXIS1  =  4611686018427387904",
            "NAXIS2  =                    1",
        ]);
        assert!(FitsDecoder.decode(&bytes).is_err());
    }

    #[test]
    fn test_not_fits() {
        assert!(FitsDecoder.decode(&[b'x'; 2880]).is_err());
        assert!(matches!(
            read_fits(Path::new("picture.png")),
            Err(FitsError::InvalidFormat(_))
        ));
    }
}
