//! Demo catalog of photos with precomputed cutouts.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use anyhow::Result;
use log::{info, warn};
use regex::Regex;

use crate::fs_utils::collect_images;

pub const DEFAULT_SAMPLE_DELAY: Duration = Duration::from_millis(3000);

static RESULT_STEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<stem>.+?)[-_]result$").expect("sample regex is valid"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub thumbnail: PathBuf,
    pub result: PathBuf,
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

/// Pairs `name.ext` with `name-result.ext` (or `name_result.ext`) in `dir`.
/// Photos without a precomputed result are skipped.
pub fn load_catalog(dir: &Path, recursive: bool) -> Result<Vec<Sample>> {
    let files = collect_images(dir, recursive)?;

    let mut results: HashMap<(PathBuf, String), PathBuf> = HashMap::new();
    let mut photos = Vec::new();
    for path in files {
        let Some(stem) = file_stem(&path) else { continue };
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        match RESULT_STEM.captures(&stem) {
            Some(caps) => {
                results.insert((parent, caps["stem"].to_string()), path);
            }
            None => photos.push((parent, stem, path)),
        }
    }

    let mut catalog = Vec::new();
    for (parent, stem, path) in photos {
        match results.remove(&(parent, stem.clone())) {
            Some(result) => catalog.push(Sample {
                name: stem,
                thumbnail: path,
                result,
            }),
            None => warn!("Sample {} has no precomputed result", path.display()),
        }
    }
    info!("Loaded {} samples from {}", catalog.len(), dir.display());
    Ok(catalog)
}
