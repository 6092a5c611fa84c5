//! Dataset assembly: turning id lists into loadable sample collections.
//!
//! Each supported benchmark shares one `SegSampleSet` implementation and
//! differs only in its on-disk layout, resolved once at startup from
//! [`layout`]. In semi-supervised mode the set is the concatenation of the
//! labeled ids (ground-truth masks) and the unlabeled ids, whose masks are
//! read from the externally generated pseudo-mask directory as if they were
//! ground truth.

use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;

use seg_core::{DatasetKind, Error, Result};

use crate::sample::SegItem;

/// On-disk layout of a benchmark dataset relative to its root directory.
#[derive(Debug, Clone, Copy)]
pub struct DatasetLayout {
    pub image_dir: &'static str,
    pub image_ext: &'static str,
    pub mask_dir: &'static str,
    pub mask_ext: &'static str,
}

const PASCAL_LAYOUT: DatasetLayout = DatasetLayout {
    image_dir: "JPEGImages",
    image_ext: "jpg",
    mask_dir: "SegmentationClass",
    mask_ext: "png",
};

const CITYSCAPES_LAYOUT: DatasetLayout = DatasetLayout {
    image_dir: "leftImg8bit",
    image_ext: "png",
    mask_dir: "gtFine",
    mask_ext: "png",
};

const COCO_LAYOUT: DatasetLayout = DatasetLayout {
    image_dir: "images",
    image_ext: "jpg",
    mask_dir: "masks",
    mask_ext: "png",
};

/// Resolves the on-disk layout for a dataset kind.
pub fn layout(kind: DatasetKind) -> &'static DatasetLayout {
    match kind {
        DatasetKind::Pascal => &PASCAL_LAYOUT,
        DatasetKind::Cityscapes => &CITYSCAPES_LAYOUT,
        DatasetKind::Coco => &COCO_LAYOUT,
    }
}

/// Where a sample's label mask comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaskSource {
    /// Ground-truth annotation under the dataset's mask directory.
    GroundTruth,
    /// Externally generated pseudo mask, consumed as if it were ground truth.
    Pseudo,
}

#[derive(Debug, Clone)]
struct SampleRef {
    id: String,
    mask: MaskSource,
}

/// A collection of segmentation samples backed by the filesystem.
#[derive(Debug, Clone)]
pub struct SegSampleSet {
    root: PathBuf,
    layout: &'static DatasetLayout,
    refs: Vec<SampleRef>,
    pseudo_mask_dir: Option<PathBuf>,
    crop_size: Option<usize>,
}

impl SegSampleSet {
    /// Fully supervised training set: every id carries a ground-truth mask.
    pub fn supervised(
        kind: DatasetKind,
        root: impl Into<PathBuf>,
        ids: Vec<String>,
        crop_size: usize,
    ) -> Self {
        let refs = ids
            .into_iter()
            .map(|id| SampleRef {
                id,
                mask: MaskSource::GroundTruth,
            })
            .collect();

        Self {
            root: root.into(),
            layout: layout(kind),
            refs,
            pseudo_mask_dir: None,
            crop_size: Some(crop_size),
        }
    }

    /// Semi-supervised training set: labeled ids followed by unlabeled ids
    /// whose masks are read from `pseudo_mask_dir`.
    pub fn semi_supervised(
        kind: DatasetKind,
        root: impl Into<PathBuf>,
        labeled_ids: Vec<String>,
        unlabeled_ids: Vec<String>,
        pseudo_mask_dir: impl Into<PathBuf>,
        crop_size: usize,
    ) -> Self {
        let mut refs: Vec<SampleRef> = labeled_ids
            .into_iter()
            .map(|id| SampleRef {
                id,
                mask: MaskSource::GroundTruth,
            })
            .collect();
        refs.extend(unlabeled_ids.into_iter().map(|id| SampleRef {
            id,
            mask: MaskSource::Pseudo,
        }));

        Self {
            root: root.into(),
            layout: layout(kind),
            refs,
            pseudo_mask_dir: Some(pseudo_mask_dir.into()),
            crop_size: Some(crop_size),
        }
    }

    /// Validation set: ground-truth masks, native image sizes.
    pub fn validation(kind: DatasetKind, root: impl Into<PathBuf>, ids: Vec<String>) -> Self {
        let refs = ids
            .into_iter()
            .map(|id| SampleRef {
                id,
                mask: MaskSource::GroundTruth,
            })
            .collect();

        Self {
            root: root.into(),
            layout: layout(kind),
            refs,
            pseudo_mask_dir: None,
            crop_size: None,
        }
    }

    pub fn num_labeled(&self) -> usize {
        self.refs
            .iter()
            .filter(|r| r.mask == MaskSource::GroundTruth)
            .count()
    }

    pub fn num_pseudo_labeled(&self) -> usize {
        self.refs.len() - self.num_labeled()
    }

    fn image_path(&self, id: &str) -> PathBuf {
        self.root
            .join(self.layout.image_dir)
            .join(format!("{id}.{}", self.layout.image_ext))
    }

    fn mask_path(&self, sample: &SampleRef) -> Result<PathBuf> {
        match sample.mask {
            MaskSource::GroundTruth => Ok(self
                .root
                .join(self.layout.mask_dir)
                .join(format!("{}.{}", sample.id, self.layout.mask_ext))),
            MaskSource::Pseudo => {
                let dir = self.pseudo_mask_dir.as_deref().ok_or_else(|| {
                    Error::Dataset("pseudo-labeled sample without a pseudo mask directory".into())
                })?;
                Ok(dir.join(format!("{}.png", sample.id)))
            }
        }
    }

    /// Loads the sample at `index`, surfacing decode and IO failures.
    pub fn load(&self, index: usize) -> Result<SegItem> {
        let sample = self.refs.get(index).ok_or_else(|| {
            Error::Dataset(format!(
                "sample index {index} out of range ({} samples)",
                self.refs.len()
            ))
        })?;

        let image_path = self.image_path(&sample.id);
        let mask_path = self.mask_path(sample)?;
        SegItem::load(&sample.id, &image_path, &mask_path, self.crop_size)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Dataset<SegItem> for SegSampleSet {
    fn get(&self, index: usize) -> Option<SegItem> {
        self.load(index).ok()
    }

    fn len(&self) -> usize {
        self.refs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn write_pair(root: &Path, layout: &DatasetLayout, id: &str, label: u8) {
        let image_dir = root.join(layout.image_dir);
        let mask_dir = root.join(layout.mask_dir);
        fs::create_dir_all(&image_dir).unwrap();
        fs::create_dir_all(&mask_dir).unwrap();

        let image = image::ImageBuffer::from_fn(4, 4, |_, _| image::Rgb([128u8, 128, 128]));
        image
            .save(image_dir.join(format!("{id}.{}", layout.image_ext)))
            .unwrap();

        let mask = image::ImageBuffer::from_fn(4, 4, |_, _| image::Luma([label]));
        mask.save(mask_dir.join(format!("{id}.{}", layout.mask_ext)))
            .unwrap();
    }

    #[test]
    fn test_layout_registry() {
        assert_eq!(layout(DatasetKind::Pascal).image_dir, "JPEGImages");
        assert_eq!(layout(DatasetKind::Cityscapes).image_dir, "leftImg8bit");
        assert_eq!(layout(DatasetKind::Coco).mask_dir, "masks");
    }

    #[test]
    fn test_supervised_set_loads_ground_truth() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(DatasetKind::Pascal);
        write_pair(dir.path(), layout, "a", 3);
        write_pair(dir.path(), layout, "b", 5);

        let set =
            SegSampleSet::supervised(DatasetKind::Pascal, dir.path(), ids(&["a", "b"]), 4);
        assert_eq!(set.len(), 2);
        assert_eq!(set.num_labeled(), 2);
        assert_eq!(set.num_pseudo_labeled(), 0);

        let item = set.load(0).unwrap();
        assert_eq!(item.id, "a");
        assert!(item.mask.iter().all(|&v| v == 3));
    }

    #[test]
    fn test_semi_supervised_reads_pseudo_masks() {
        let dir = tempfile::tempdir().unwrap();
        let pseudo_dir = tempfile::tempdir().unwrap();
        let layout = layout(DatasetKind::Pascal);
        write_pair(dir.path(), layout, "labeled", 2);

        // Unlabeled sample: image only under the dataset root, mask in the
        // pseudo directory.
        let image_dir = dir.path().join(layout.image_dir);
        fs::create_dir_all(&image_dir).unwrap();
        let image = image::ImageBuffer::from_fn(4, 4, |_, _| image::Rgb([64u8, 64, 64]));
        image.save(image_dir.join("unlabeled.jpg")).unwrap();
        let pseudo = image::ImageBuffer::from_fn(4, 4, |_, _| image::Luma([7u8]));
        pseudo.save(pseudo_dir.path().join("unlabeled.png")).unwrap();

        let set = SegSampleSet::semi_supervised(
            DatasetKind::Pascal,
            dir.path(),
            ids(&["labeled"]),
            ids(&["unlabeled"]),
            pseudo_dir.path(),
            4,
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.num_labeled(), 1);
        assert_eq!(set.num_pseudo_labeled(), 1);

        let labeled = set.load(0).unwrap();
        assert!(labeled.mask.iter().all(|&v| v == 2));
        let pseudo_labeled = set.load(1).unwrap();
        assert!(pseudo_labeled.mask.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_validation_keeps_native_size() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout(DatasetKind::Pascal);
        write_pair(dir.path(), layout, "a", 1);

        let set = SegSampleSet::validation(DatasetKind::Pascal, dir.path(), ids(&["a"]));
        let item = set.load(0).unwrap();
        assert_eq!((item.width, item.height), (4, 4));
    }

    #[test]
    fn test_load_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let set = SegSampleSet::validation(DatasetKind::Pascal, dir.path(), ids(&["a"]));
        assert!(set.load(5).is_err());
    }

    #[test]
    fn test_dataset_trait_get_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let set = SegSampleSet::validation(DatasetKind::Pascal, dir.path(), ids(&["ghost"]));
        assert!(set.get(0).is_none());
        assert!(set.load(0).is_err());
    }
}
