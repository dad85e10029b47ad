use std::{
    ffi::OsStr,
    fs::{self, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use walkdir::WalkDir;

/// Suffix of partially written downloads.
pub const TEMP_SUFFIX: &str = ".part";
pub const DOWNLOAD_NAME: &str = "image_with_background.png";

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "gif", "webp", "tiff", "tif", "ico",
];

pub fn collect_images(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(anyhow!("{} does not exist", root.display()));
    }
    if !root.is_dir() {
        return Err(anyhow!("{} is not a directory", root.display()));
    }

    let mut files = Vec::new();
    if recursive {
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && is_supported_image(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    } else {
        for entry in fs::read_dir(root).with_context(|| format!("Unable to read directory {}", root.display()))? {
            let entry = entry.with_context(|| format!("Unable to read entry in {}", root.display()))?;
            let path = entry.path();
            if path.is_file() && is_supported_image(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

pub fn is_supported_image(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|s| s.to_ascii_lowercase()),
        Some(ref ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str())
    )
}

pub fn prepare_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Unable to create {}", dir.display()))?;
    Ok(dir.to_path_buf())
}

pub fn unique_destination(dir: &Path, file_name: &OsStr) -> PathBuf {
    let (stem, ext) = split_name(file_name);
    let mut idx = 0;
    loop {
        let candidate = dir.join(numbered_name(&stem, ext.as_deref(), idx));
        if !candidate.exists() {
            return candidate;
        }
        idx += 1;
    }
}

pub fn split_name(file_name: &OsStr) -> (String, Option<String>) {
    let name = file_name.to_string_lossy();
    if let Some((stem, ext)) = name.rsplit_once('.') {
        (stem.to_string(), Some(ext.to_string()))
    } else {
        (name.to_string(), None)
    }
}

/// `stem.ext` for `idx == 0`, `stem-idx.ext` after that.
fn numbered_name(stem: &str, ext: Option<&str>, idx: usize) -> String {
    match (idx, ext) {
        (0, Some(ext)) => format!("{stem}.{ext}"),
        (0, None) => stem.to_string(),
        (_, Some(ext)) => format!("{stem}-{idx}.{ext}"),
        (_, None) => format!("{stem}-{idx}"),
    }
}

/// Creates the first free `file_name` variant in `dir`. Creation fails if the
/// file exists, so concurrent callers never receive the same path.
fn claim_name(dir: &Path, file_name: &OsStr) -> Result<PathBuf> {
    let (stem, ext) = split_name(file_name);
    let mut idx = 0;
    loop {
        let candidate = dir.join(numbered_name(&stem, ext.as_deref(), idx));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => idx += 1,
            Err(err) => {
                return Err(err).with_context(|| format!("Unable to create {}", candidate.display()))
            }
        }
    }
}

/// Writes `bytes` to a free `file_name` in `dir` and returns the final path.
/// Existing files are never replaced; collisions get a `-N` suffix.
pub fn write_unique(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let dir = prepare_dir(dir)?;
    let temp_path = dir.join(format!(".{file_name}.{:08x}{TEMP_SUFFIX}", rand::random::<u32>()));
    fs::write(&temp_path, bytes)
        .with_context(|| format!("Unable to write {}", temp_path.display()))?;

    let destination = match claim_name(&dir, OsStr::new(file_name)) {
        Ok(destination) => destination,
        Err(err) => {
            let _ = fs::remove_file(&temp_path);
            return Err(err);
        }
    };
    // Replaces the empty placeholder claimed above.
    if let Err(err) = fs::rename(&temp_path, &destination) {
        let _ = fs::remove_file(&temp_path);
        let _ = fs::remove_file(&destination);
        return Err(err).with_context(|| {
            format!(
                "Unable to move {} to {}",
                temp_path.display(),
                destination.display()
            )
        });
    }
    Ok(destination)
}
