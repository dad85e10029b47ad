use std::collections::{HashMap, HashSet};

use eframe::egui;

/// GPU textures keyed by image reference. Textures not drawn during a frame
/// are released at the end of it.
#[derive(Default)]
pub struct TextureCache {
    textures: HashMap<String, Option<egui::TextureHandle>>,
    touched: HashSet<String>,
}

impl TextureCache {
    pub fn begin_frame(&mut self) {
        self.touched.clear();
    }

    pub fn end_frame(&mut self) {
        let touched = &self.touched;
        self.textures.retain(|key, _| touched.contains(key));
    }

    /// Returns the cached texture for `key`, calling `load` on first use.
    /// A failed load is remembered so it is not retried every frame.
    pub fn get_or_load(
        &mut self,
        ctx: &egui::Context,
        key: &str,
        load: impl FnOnce() -> Option<egui::ColorImage>,
    ) -> Option<egui::TextureHandle> {
        self.touched.insert(key.to_string());
        if let Some(cached) = self.textures.get(key) {
            return cached.clone();
        }
        let texture = load().map(|image| ctx.load_texture(key, image, egui::TextureOptions::LINEAR));
        self.textures.insert(key.to_string(), texture.clone());
        texture
    }
}
