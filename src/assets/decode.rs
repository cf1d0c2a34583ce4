use std::sync::Arc;

use anyhow::Context;
use image::RgbaImage;
use image::imageops::FilterType;

use crate::error::PosterResult;

/// A decoded raster held as straight-alpha RGBA8.
///
/// Alpha stays straight so masking and resampling stay correct;
/// premultiplication happens once, when a compositor surface is built.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8: Arc<Vec<u8>>,
}

impl PreparedImage {
    fn from_rgba(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        PreparedImage {
            width,
            height,
            rgba8: Arc::new(img.into_raw()),
        }
    }

    fn to_rgba(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.rgba8.as_ref().clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Premultiplied copy of the pixel data, for compositor upload.
    pub fn premultiplied(&self) -> Vec<u8> {
        let mut px = self.rgba8.as_ref().clone();
        premultiply_rgba8_in_place(&mut px);
        px
    }
}

pub fn decode_image(bytes: &[u8]) -> PosterResult<PreparedImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    Ok(PreparedImage::from_rgba(dyn_img.to_rgba8()))
}

/// Scale then center-crop so the image covers `width` x `height` exactly.
pub fn resize_cover(src: &PreparedImage, width: u32, height: u32) -> PreparedImage {
    if width == 0 || height == 0 || src.width == 0 || src.height == 0 {
        return PreparedImage::from_rgba(RgbaImage::new(width, height));
    }
    let scale = f64::max(
        width as f64 / src.width as f64,
        height as f64 / src.height as f64,
    );
    let scaled_w = (src.width as f64 * scale).ceil().max(1.0) as u32;
    let scaled_h = (src.height as f64 * scale).ceil().max(1.0) as u32;

    let scaled = image::imageops::resize(&src.to_rgba(), scaled_w, scaled_h, FilterType::Lanczos3);
    let x = (scaled_w.saturating_sub(width)) / 2;
    let y = (scaled_h.saturating_sub(height)) / 2;
    let cropped = image::imageops::crop_imm(&scaled, x, y, width, height).to_image();
    PreparedImage::from_rgba(cropped)
}

/// Cover-crop to a square of `diameter`, then zero alpha outside the
/// inscribed circle. Edge softness comes from the resampler alone.
pub fn circle_crop(src: &PreparedImage, diameter: u32) -> PreparedImage {
    let mut img = resize_cover(src, diameter, diameter).to_rgba();
    let r = diameter as f64 / 2.0;
    for (x, y, px) in img.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - r;
        let dy = y as f64 + 0.5 - r;
        if dx * dx + dy * dy > r * r {
            px.0 = [0, 0, 0, 0];
        }
    }
    PreparedImage::from_rgba(img)
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> PreparedImage {
        let img = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        PreparedImage::from_rgba(img)
    }

    #[test]
    fn decode_image_png_dimensions() {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let prepared = decode_image(&buf).unwrap();
        assert_eq!((prepared.width, prepared.height), (3, 2));
    }

    #[test]
    fn decode_image_rejects_garbage() {
        assert!(decode_image(b"not an image").is_err());
    }

    #[test]
    fn resize_cover_hits_exact_target() {
        let src = solid(400, 100, [255, 0, 0, 255]);
        let out = resize_cover(&src, 120, 160);
        assert_eq!((out.width, out.height), (120, 160));
    }

    #[test]
    fn circle_crop_clears_corners_keeps_center() {
        let src = solid(64, 64, [0, 255, 0, 255]);
        let out = circle_crop(&src, 64);
        let px = |x: u32, y: u32| {
            let i = ((y * out.width + x) * 4) as usize;
            out.rgba8[i + 3]
        };
        assert_eq!(px(0, 0), 0);
        assert_eq!(px(63, 63), 0);
        assert_eq!(px(32, 32), 255);
    }

    #[test]
    fn premultiplied_scales_color_by_alpha() {
        let src = solid(1, 1, [100, 50, 200, 128]);
        let px = src.premultiplied();
        assert_eq!(
            px,
            vec![
                ((100u16 * 128 + 127) / 255) as u8,
                ((50u16 * 128 + 127) / 255) as u8,
                ((200u16 * 128 + 127) / 255) as u8,
                128
            ]
        );
    }
}
