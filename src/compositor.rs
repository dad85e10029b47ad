//! Layer compositing: an optional background (image or flat color) with the
//! foreground cutout drawn on top, encoded to PNG and stored as a blob.

use image::{imageops, DynamicImage, GenericImageView, RgbaImage};
use log::{debug, warn};

use crate::{
    background::Background,
    blob_store::BlobRef,
    color::Color,
    image_utils::{encode_png, resize_rgba, PNG_MIME},
    loader::{ImageLoader, ImageSource},
};

/// Output of a successful composite.
#[derive(Clone, Debug)]
pub struct Composited {
    pub blob: BlobRef,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug)]
pub struct Compositor {
    loader: ImageLoader,
}

impl Compositor {
    pub fn new(loader: ImageLoader) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    /// Draws `foreground` over `background`, or over full transparency when
    /// no background is active or it fails to load. Returns `None` only if
    /// the foreground cannot be loaded or the result cannot be encoded.
    pub fn composite(
        &self,
        foreground: &ImageSource,
        background: Option<&ImageSource>,
    ) -> Option<Composited> {
        let fg = self.loader.load(foreground)?;
        let (width, height) = fg.dimensions();

        let backdrop = background
            .and_then(|source| {
                let loaded = self.loader.load(source);
                if loaded.is_none() {
                    debug!("Background {source:?} unavailable; clearing canvas");
                }
                loaded
            })
            .and_then(|bg| match resize_rgba(&bg, width, height) {
                Ok(stretched) => Some(stretched),
                Err(err) => {
                    warn!("Failed to scale background: {err:#}");
                    None
                }
            });

        let canvas = match backdrop {
            Some(mut canvas) => {
                draw_foreground(&mut canvas, &fg);
                canvas
            }
            // Drawing onto a cleared canvas leaves the foreground unchanged.
            None => fg.to_rgba8(),
        };
        self.finish(canvas)
    }

    /// Fills the canvas with `color` and draws `foreground` on top.
    pub fn composite_with_color(&self, color: &Color, foreground: &ImageSource) -> Option<Composited> {
        let fg = self.loader.load(foreground)?;
        let (width, height) = fg.dimensions();
        let mut canvas = RgbaImage::from_pixel(width, height, color.rgba());
        draw_foreground(&mut canvas, &fg);
        self.finish(canvas)
    }

    /// Dispatches on the background slot.
    pub fn render(&self, foreground: &ImageSource, background: Option<&Background>) -> Option<Composited> {
        match background {
            Some(Background::Color(color)) => self.composite_with_color(color, foreground),
            Some(Background::Image(source)) => self.composite(foreground, Some(source)),
            None => self.composite(foreground, None),
        }
    }

    fn finish(&self, canvas: RgbaImage) -> Option<Composited> {
        let (width, height) = canvas.dimensions();
        match encode_png(canvas) {
            Ok(bytes) => Some(Composited {
                blob: self.loader.store().create(bytes, PNG_MIME),
                width,
                height,
            }),
            Err(err) => {
                warn!("{err:#}");
                None
            }
        }
    }
}

/// Source-over blend of the foreground at the canvas origin. The canvas is
/// always the foreground's size, so the foreground covers it fully.
fn draw_foreground(canvas: &mut RgbaImage, fg: &DynamicImage) {
    let fg = fg.to_rgba8();
    imageops::overlay(canvas, &fg, 0, 0);
}
