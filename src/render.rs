//! CPU poster compositing. Pure transformation from a layout plan plus
//! prepared pixels to an encoded PNG; storage happens elsewhere.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::Context;
use kurbo::Shape;
use serde::{Deserialize, Serialize};

use crate::assets::decode::{PreparedImage, circle_crop};
use crate::error::{PosterError, PosterResult};
use crate::layout::{LayoutPlan, TextAlign, TextMeasure, TextRole, TilePlan};
use crate::model::{ImageFormat, Poster, PosterKind};
use crate::text::{TextBrushRgba8, TextShaper};

/// Brand colors applied to every poster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub primary: [u8; 4],
    pub secondary: [u8; 4],
    pub accent: [u8; 4],
    pub background: [u8; 4],
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            primary: [0x2C, 0x3E, 0x50, 0xFF],
            secondary: [0x34, 0x98, 0xDB, 0xFF],
            accent: [0xE7, 0x4C, 0x3C, 0xFF],
            background: [0xFF, 0xFF, 0xFF, 0xFF],
        }
    }
}

/// Pixels and labels one render job consumes.
#[derive(Clone, Debug, Default)]
pub struct RenderInputs {
    pub landmark: Option<PreparedImage>,
    pub overlay: Option<PreparedImage>,
    /// Parallel to `speakers`; `None` renders the placeholder disc.
    pub speaker_photos: Vec<Option<PreparedImage>>,
    pub speakers: Vec<String>,
}

/// Opacity of the white panel that keeps text legible over the backdrop.
const SCRIM_ALPHA: u8 = 216;

/// Composite one poster and encode it as PNG.
#[tracing::instrument(skip_all, fields(kind = kind.as_str()))]
pub fn render_poster(
    plan: &LayoutPlan,
    inputs: &RenderInputs,
    palette: &Palette,
    shaper: &mut TextShaper,
    kind: PosterKind,
    speaker_name: Option<&str>,
) -> PosterResult<Poster> {
    let width: u16 = plan
        .canvas
        .width
        .try_into()
        .map_err(|_| PosterError::render("canvas width exceeds u16"))?;
    let height: u16 = plan
        .canvas
        .height
        .try_into()
        .map_err(|_| PosterError::render("canvas height exceeds u16"))?;

    let w = f64::from(plan.canvas.width);
    let h = f64::from(plan.canvas.height);
    let mut ctx = vello_cpu::RenderContext::new(width, height);
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

    // Backdrop: background fill, landmark cover (or brand color), scrim.
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(color(palette.background));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));

    match &inputs.landmark {
        Some(img) => draw_cover(&mut ctx, img, w, h)?,
        None => {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(color(palette.primary));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
        }
    }

    let [sr, sg, sb, _] = palette.background;
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(sr, sg, sb, SCRIM_ALPHA));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.23 * h, w, h));

    if let Some(overlay) = &inputs.overlay {
        draw_stretched(&mut ctx, overlay, w, h)?;
    }

    for tile in &plan.tiles {
        draw_tile(&mut ctx, tile, inputs, palette, shaper)?;
    }

    for block in &plan.text_blocks {
        let brush = match block.role {
            TextRole::Title => brush_from(palette.background),
            TextRole::Summary | TextRole::Details => brush_from(palette.primary),
            TextRole::Cta => brush_from(palette.accent),
        };
        let line_h = shaper.line_height(block.font_px);
        for (i, line) in block.lines.iter().enumerate() {
            let x = match block.align {
                TextAlign::Left => block.rect.x0,
                TextAlign::Center => {
                    let line_w = shaper.line_width(line, block.font_px);
                    block.rect.x0 + (block.rect.width() - line_w).max(0.0) / 2.0
                }
            };
            let y = block.rect.y0 + i as f64 * line_h;
            draw_line(&mut ctx, shaper, line, block.font_px, brush, x, y)?;
        }
    }

    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(width, height);
    ctx.render_to_pixmap(&mut pixmap);

    let mut data = pixmap.data_as_u8_slice().to_vec();
    unpremultiply_rgba8_in_place(&mut data);
    let bytes = encode_png(&data, plan.canvas.width, plan.canvas.height)?;

    Ok(Poster {
        kind,
        speaker_name: speaker_name.map(str::to_string),
        width: plan.canvas.width,
        height: plan.canvas.height,
        format: ImageFormat::Png,
        byte_size: bytes.len(),
        bytes: Arc::new(bytes),
        url: None,
    })
}

fn draw_tile(
    ctx: &mut vello_cpu::RenderContext,
    tile: &TilePlan,
    inputs: &RenderInputs,
    palette: &Palette,
    shaper: &mut TextShaper,
) -> PosterResult<()> {
    let Some(index) = tile.speaker_index else {
        // Theme panel.
        let [r, g, b, _] = palette.primary;
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, 235));
        ctx.fill_rect(&rect_to_cpu(&tile.rect));
        return Ok(());
    };

    let diameter = tile.rect.width();
    let photo = inputs.speaker_photos.get(index).and_then(Option::as_ref);
    match photo {
        Some(img) => {
            let cropped = circle_crop(img, diameter.round().max(1.0) as u32);
            let paint = image_paint(&cropped)?;
            ctx.set_transform(vello_cpu::kurbo::Affine::translate((
                tile.rect.x0,
                tile.rect.y0,
            )));
            ctx.set_paint(paint);
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(cropped.width),
                f64::from(cropped.height),
            ));
        }
        None => {
            let circle = kurbo::Circle::new(
                ((tile.rect.x0 + tile.rect.x1) / 2.0, (tile.rect.y0 + tile.rect.y1) / 2.0),
                diameter / 2.0,
            );
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(color(palette.secondary));
            ctx.fill_path(&bezpath_to_cpu(&circle.to_path(0.1)));

            if let Some(name) = inputs.speakers.get(index) {
                let size = (diameter * 0.35) as f32;
                let text = initials(name);
                let width = shaper.line_width(&text, size);
                let x = circle.center.x - width / 2.0;
                let y = circle.center.y - shaper.line_height(size) / 2.0;
                draw_line(ctx, shaper, &text, size, brush_from(palette.background), x, y)?;
            }
        }
    }

    // Caption under the circle, sized to the tile.
    if let Some(name) = inputs.speakers.get(index) {
        let size = (diameter * 0.11).clamp(12.0, 28.0) as f32;
        let width = shaper.line_width(name, size);
        if width <= diameter * 1.4 {
            let x = (tile.rect.x0 + tile.rect.x1) / 2.0 - width / 2.0;
            draw_line(
                ctx,
                shaper,
                name,
                size,
                brush_from(palette.primary),
                x,
                tile.rect.y1 + 2.0,
            )?;
        }
    }
    Ok(())
}

fn draw_line(
    ctx: &mut vello_cpu::RenderContext,
    shaper: &mut TextShaper,
    text: &str,
    size_px: f32,
    brush: TextBrushRgba8,
    x: f64,
    y: f64,
) -> PosterResult<()> {
    let layout = shaper.layout_line(text, size_px, brush)?;
    let font = shaper.font_data();
    ctx.set_transform(vello_cpu::kurbo::Affine::translate((x, y)));

    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };
            let brush = run.style().brush;
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));
            let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            ctx.glyph_run(&font)
                .font_size(run.run().font_size())
                .fill_glyphs(glyphs);
        }
    }
    Ok(())
}

/// Scale so the image covers the whole canvas, centered; overhang clips.
fn draw_cover(
    ctx: &mut vello_cpu::RenderContext,
    img: &PreparedImage,
    w: f64,
    h: f64,
) -> PosterResult<()> {
    if img.width == 0 || img.height == 0 {
        return Err(PosterError::render("backdrop image has zero area"));
    }
    let iw = f64::from(img.width);
    let ih = f64::from(img.height);
    let scale = f64::max(w / iw, h / ih);
    let tx = (w - iw * scale) / 2.0;
    let ty = (h - ih * scale) / 2.0;

    ctx.set_transform(
        vello_cpu::kurbo::Affine::translate((tx, ty))
            * vello_cpu::kurbo::Affine::scale(scale),
    );
    ctx.set_paint(image_paint(img)?);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, iw, ih));
    Ok(())
}

fn draw_stretched(
    ctx: &mut vello_cpu::RenderContext,
    img: &PreparedImage,
    w: f64,
    h: f64,
) -> PosterResult<()> {
    if img.width == 0 || img.height == 0 {
        return Err(PosterError::render("overlay image has zero area"));
    }
    let iw = f64::from(img.width);
    let ih = f64::from(img.height);
    ctx.set_transform(vello_cpu::kurbo::Affine::scale_non_uniform(w / iw, h / ih));
    ctx.set_paint(image_paint(img)?);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, iw, ih));
    Ok(())
}

fn image_paint(img: &PreparedImage) -> PosterResult<vello_cpu::Image> {
    let w: u16 = img
        .width
        .try_into()
        .map_err(|_| PosterError::render("image width exceeds u16"))?;
    let h: u16 = img
        .height
        .try_into()
        .map_err(|_| PosterError::render("image height exceeds u16"))?;

    let premul = img.premultiplied();
    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(img.width as usize * img.height as usize);
    for px in premul.chunks_exact(4) {
        may_have_opacities |= px[3] != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8 {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        });
    }

    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(
            vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, may_have_opacities),
        )),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

fn color(rgba: [u8; 4]) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3])
}

fn brush_from(rgba: [u8; 4]) -> TextBrushRgba8 {
    TextBrushRgba8 {
        r: rgba[0],
        g: rgba[1],
        b: rgba[2],
        a: rgba[3],
    }
}

fn rect_to_cpu(rect: &kurbo::Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(rect.x0, rect.y0, rect.x1, rect.y1)
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let point = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point(p)),
            PathEl::LineTo(p) => out.line_to(point(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point(p1), point(p2)),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(point(p1), point(p2), point(p3)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

/// First letter of the first and last name tokens.
fn initials(name: &str) -> String {
    let mut words = name.split_whitespace().filter(|w| !w.is_empty());
    let first = words.next();
    let last = words.last();
    [first, last]
        .into_iter()
        .flatten()
        .filter_map(|w| w.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}

fn encode_png(rgba: &[u8], width: u32, height: u32) -> PosterResult<Vec<u8>> {
    let img = image::RgbaImage::from_raw(width, height, rgba.to_vec())
        .ok_or_else(|| PosterError::render("surface byte length mismatch"))?;
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .context("encode poster png")?;
    Ok(buf)
}
