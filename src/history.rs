use image::RgbaImage;

use crate::loader::ImageSource;

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub source: ImageSource,
    pub thumbnail: Option<RgbaImage>,
}

impl HistoryEntry {
    pub const RESTORE_HINT: &'static str = "Click to restore this image";
}

/// Ordered, de-duplicated list of composited results.
///
/// Entries keep their blob storage alive; clearing the history drops those
/// handles.
#[derive(Clone, Debug, Default)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `source` unless an entry with the same reference exists.
    pub fn add(&mut self, source: ImageSource, thumbnail: Option<RgbaImage>) -> bool {
        if source.key().is_empty() || self.contains(&source) {
            return false;
        }
        self.entries.push(HistoryEntry { source, thumbnail });
        true
    }

    pub fn contains(&self, source: &ImageSource) -> bool {
        self.entries.iter().any(|entry| entry.source == *source)
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }
}
