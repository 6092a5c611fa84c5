//! Sample loading: one image and its label mask, decoded and ready for
//! batching.

use std::path::Path;

use image::imageops::FilterType;
use image::ImageReader;
use serde::{Deserialize, Serialize};

use seg_core::{Error, Result};

/// A single segmentation sample ready for batching.
///
/// The image is stored as a flattened CHW float array in [0, 1]; the mask is
/// a row-major H×W array of class ids with 255 reserved as the ignore id.
/// Immutable once loaded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegItem {
    pub id: String,
    /// Image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Label mask as flattened row-major array [H * W]
    pub mask: Vec<i64>,
    pub height: usize,
    pub width: usize,
}

impl SegItem {
    /// Loads and decodes an (image, mask) pair from disk.
    ///
    /// With `crop_size` set, both are resized to a square of that size: the
    /// image with triangle filtering, the mask with nearest-neighbor so class
    /// ids stay exact. Without it, native dimensions are kept (validation).
    pub fn load(
        id: &str,
        image_path: &Path,
        mask_path: &Path,
        crop_size: Option<usize>,
    ) -> Result<Self> {
        let image = ImageReader::open(image_path)
            .map_err(|e| {
                Error::Image(format!("failed to open {}: {e}", image_path.display()))
            })?
            .decode()
            .map_err(|e| {
                Error::Image(format!("failed to decode {}: {e}", image_path.display()))
            })?;

        let mask = ImageReader::open(mask_path)
            .map_err(|e| Error::Image(format!("failed to open {}: {e}", mask_path.display())))?
            .decode()
            .map_err(|e| {
                Error::Image(format!("failed to decode {}: {e}", mask_path.display()))
            })?;

        let (image, mask) = match crop_size {
            Some(size) => {
                let size = size as u32;
                (
                    image.resize_exact(size, size, FilterType::Triangle),
                    mask.resize_exact(size, size, FilterType::Nearest),
                )
            }
            None => (image, mask),
        };

        let rgb = image.to_rgb8();
        let luma = mask.to_luma8();

        if rgb.dimensions() != luma.dimensions() {
            return Err(Error::Dataset(format!(
                "image/mask dimension mismatch for {id}: {:?} vs {:?}",
                rgb.dimensions(),
                luma.dimensions()
            )));
        }

        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        let mut data = vec![0.0f32; 3 * height * width];

        // Convert to CHW format and normalize to [0, 1]
        for y in 0..height {
            for x in 0..width {
                let pixel = rgb.get_pixel(x as u32, y as u32);
                data[y * width + x] = pixel[0] as f32 / 255.0;
                data[height * width + y * width + x] = pixel[1] as f32 / 255.0;
                data[2 * height * width + y * width + x] = pixel[2] as f32 / 255.0;
            }
        }

        let mask_data: Vec<i64> = luma.as_raw().iter().map(|&v| v as i64).collect();

        Ok(Self {
            id: id.to_string(),
            image: data,
            mask: mask_data,
            height,
            width,
        })
    }

    /// Create from pre-loaded data, mainly for tests and synthetic sets.
    pub fn from_data(id: &str, image: Vec<f32>, mask: Vec<i64>, height: usize, width: usize) -> Self {
        Self {
            id: id.to_string(),
            image,
            mask,
            height,
            width,
        }
    }

    pub fn num_pixels(&self) -> usize {
        self.height * self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_test_pair(dir: &Path, id: &str, width: u32, height: u32) -> (PathBuf, PathBuf) {
        let image_path = dir.join(format!("{id}.jpg"));
        let mask_path = dir.join(format!("{id}.png"));

        let image = image::ImageBuffer::from_fn(width, height, |_, _| image::Rgb([255u8, 0, 0]));
        image.save(&image_path).unwrap();

        let mask = image::ImageBuffer::from_fn(width, height, |x, _| {
            image::Luma([if x < width / 2 { 1u8 } else { 255 }])
        });
        mask.save(&mask_path).unwrap();

        (image_path, mask_path)
    }

    #[test]
    fn test_load_native_size() {
        let dir = tempfile::tempdir().unwrap();
        let (image_path, mask_path) = write_test_pair(dir.path(), "sample", 8, 6);

        let item = SegItem::load("sample", &image_path, &mask_path, None).unwrap();
        assert_eq!(item.width, 8);
        assert_eq!(item.height, 6);
        assert_eq!(item.image.len(), 3 * 8 * 6);
        assert_eq!(item.mask.len(), 8 * 6);
        // Left half of each row labeled 1, right half is the ignore id.
        assert_eq!(item.mask[0], 1);
        assert_eq!(item.mask[7], 255);
    }

    #[test]
    fn test_load_resized() {
        let dir = tempfile::tempdir().unwrap();
        let (image_path, mask_path) = write_test_pair(dir.path(), "sample", 16, 16);

        let item = SegItem::load("sample", &image_path, &mask_path, Some(8)).unwrap();
        assert_eq!(item.width, 8);
        assert_eq!(item.height, 8);
        // Nearest-neighbor resize must not invent new class ids.
        assert!(item.mask.iter().all(|&v| v == 1 || v == 255));
    }

    #[test]
    fn test_load_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mask_path) = write_test_pair(dir.path(), "sample", 4, 4);

        let result = SegItem::load("sample", &dir.path().join("missing.jpg"), &mask_path, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_red_channel_first_in_chw() {
        let dir = tempfile::tempdir().unwrap();
        let (image_path, mask_path) = write_test_pair(dir.path(), "sample", 4, 4);

        let item = SegItem::load("sample", &image_path, &mask_path, None).unwrap();
        // Solid red image: channel 0 saturated, channels 1 and 2 near zero.
        assert!(item.image[0] > 0.9);
        assert!(item.image[16] < 0.1);
        assert!(item.image[32] < 0.1);
    }
}
