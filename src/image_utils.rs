use anyhow::{anyhow, Context, Result};
use eframe::egui;
use fast_image_resize::images::Image;
use fast_image_resize::{PixelType, ResizeOptions, Resizer};
use image::{codecs::png::PngEncoder, DynamicImage, RgbaImage};

pub const PNG_MIME: &str = "image/png";

/// Longest edge of history thumbnails, in pixels.
pub const THUMBNAIL_EDGE: u32 = 96;

pub fn to_color_image(img: &DynamicImage) -> egui::ColorImage {
    let rgba = img.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    let pixels = rgba.into_raw();
    egui::ColorImage::from_rgba_unmultiplied(size, &pixels)
}

pub fn rgba_to_color_image(rgba: &RgbaImage) -> egui::ColorImage {
    let size = [rgba.width() as usize, rgba.height() as usize];
    egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw())
}

/// Scales `image` to exactly `width` x `height`, ignoring aspect ratio.
pub fn resize_rgba(image: &DynamicImage, width: u32, height: u32) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(anyhow!("cannot resize to {width}x{height}"));
    }
    if image.width() == width && image.height() == height {
        return Ok(image.to_rgba8());
    }

    let src_image = match image {
        DynamicImage::ImageRgba8(rgba) => Image::from_vec_u8(
            rgba.width(),
            rgba.height(),
            rgba.as_raw().clone(),
            PixelType::U8x4,
        ),
        _ => {
            let rgba = image.to_rgba8();
            Image::from_vec_u8(rgba.width(), rgba.height(), rgba.into_raw(), PixelType::U8x4)
        }
    }
    .context("Unable to wrap source pixels for resizing")?;

    let mut dst_image = Image::new(width, height, PixelType::U8x4);
    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &ResizeOptions::default())
        .context("Resize failed")?;

    RgbaImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| anyhow!("Resized buffer does not match {width}x{height}"))
}

/// Size that fits `(width, height)` into a `max_edge` square, keeping the aspect ratio.
pub fn thumbnail_size(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width.max(1), height.max(1));
    }
    let ratio = width as f64 / height.max(1) as f64;
    if ratio >= 1.0 {
        (max_edge, ((max_edge as f64 / ratio).round() as u32).max(1))
    } else {
        (((max_edge as f64 * ratio).round() as u32).max(1), max_edge)
    }
}

pub fn thumbnail(image: &DynamicImage) -> Result<RgbaImage> {
    let (width, height) = thumbnail_size(image.width(), image.height(), THUMBNAIL_EDGE);
    resize_rgba(image, width, height)
}

pub fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_with_encoder(PngEncoder::new(&mut bytes))
        .context("PNG encoding failed")?;
    Ok(bytes)
}
