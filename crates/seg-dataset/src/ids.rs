//! Sample id list handling.
//!
//! Id lists are plain text files with one sample identifier per line. The
//! identifiers are opaque to this crate; the per-dataset layout turns them
//! into image and mask paths.

use std::fs;
use std::path::Path;

use seg_core::{Error, Result};

/// Labeled id lists shorter than this are oversampled once before training.
const OVERSAMPLE_THRESHOLD: usize = 200;

/// Reads a sample id list, one id per line. Blank lines are skipped.
pub fn read_id_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Dataset(format!("failed to read id list {}: {e}", path.display()))
    })?;

    let ids: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if ids.is_empty() {
        return Err(Error::Dataset(format!(
            "id list {} contains no ids",
            path.display()
        )));
    }

    Ok(ids)
}

/// Doubles an id list that falls in the extremely scarce-data regime.
///
/// Applied once to the labeled list in fully-supervised mode, before the
/// loaders are constructed. A pure transform: lists of 200 or more ids pass
/// through unchanged.
pub fn oversample_small(ids: Vec<String>) -> Vec<String> {
    if ids.len() < OVERSAMPLE_THRESHOLD {
        let mut doubled = ids.clone();
        doubled.extend(ids);
        doubled
    } else {
        ids
    }
}
