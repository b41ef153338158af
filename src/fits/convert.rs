use image::{imageops, GrayImage};
use log::info;
use std::path::Path;

use super::{read_fits, DecodedImage, FitsError};

/// Write `image` as an 8-bit grayscale PNG or JPEG, chosen by the extension
/// of `output`.
///
/// Pixel values are stretched linearly between the image minimum and maximum.
/// Rows are flipped so the picture is not upside down: FITS stores the bottom
/// row first.
pub fn convert(image: &DecodedImage, output: &Path) -> Result<(), FitsError> {
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "png" | "jpeg" | "jpg" => {}
        "fits" | "fit" | "fts" => {
            return Err(FitsError::Unsupported(
                "FITS output needs no conversion".to_string(),
            ))
        }
        other => {
            return Err(FitsError::Unsupported(format!(
                "unsupported output format '{}'",
                other
            )))
        }
    }

    if image.width == 0 || image.height == 0 {
        return Err(FitsError::InvalidFormat("no image data to convert".to_string()));
    }

    let gray = GrayImage::from_raw(
        u32::try_from(image.width).map_err(|_| FitsError::Unsupported("image too wide".into()))?,
        u32::try_from(image.height).map_err(|_| FitsError::Unsupported("image too tall".into()))?,
        stretch(&image.pixels),
    )
    .ok_or_else(|| FitsError::InvalidFormat("pixel count does not match dimensions".to_string()))?;

    imageops::flip_vertical(&gray)
        .save(output)
        .map_err(|e| FitsError::Image(e.to_string()))?;

    info!("🖼️  Wrote {}", output.display());
    Ok(())
}

/// Read a FITS file and convert it, see [`convert`].
pub fn convert_file(input: &Path, output: &Path) -> Result<(), FitsError> {
    let image = read_fits(input)?;
    convert(&image, output)
}

fn stretch(pixels: &[f64]) -> Vec<u8> {
    let (min, max) = pixels
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let range = max - min;
    pixels
        .iter()
        .map(|&v| {
            if !v.is_finite() || range <= 0.0 {
                0
            } else {
                (((v - min) / range) * 255.0).round() as u8
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::tests::write_gradient;

    #[test]
    fn test_stretch_spans_full_range() {
        assert_eq!(stretch(&[10.0, 20.0, 30.0]), vec![0, 128, 255]);
        assert_eq!(stretch(&[5.0, 5.0]), vec![0, 0]);
        assert_eq!(stretch(&[f64::NAN, 1.0, 3.0]), vec![0, 0, 255]);
    }

    #[test]
    fn test_convert_writes_flipped_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gradient(dir.path());
        let output = dir.path().join("gradient.png");

        convert_file(&input, &output).unwrap();

        let written = image::open(&output).unwrap().to_luma8();
        assert_eq!(written.dimensions(), (3, 2));
        // brightest FITS row (stored last) ends up on top
        assert_eq!(written.get_pixel(2, 0).0[0], 255);
        assert_eq!(written.get_pixel(0, 1).0[0], 0);
    }

    #[test]
    fn test_convert_rejects_other_formats() {
        let dir = tempfile::tempdir().unwrap();
        let image = read_fits(&write_gradient(dir.path())).unwrap();
        assert!(matches!(
            convert(&image, Path::new("out.fits")),
            Err(FitsError::Unsupported(_))
        ));
        assert!(matches!(
            convert(&image, Path::new("out.bmp")),
            Err(FitsError::Unsupported(_))
        ));
    }
}
