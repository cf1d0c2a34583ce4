//! Parley-backed text shaping: measurement for the layout solver and
//! positioned glyph runs for the renderer.

use std::sync::Arc;

use crate::error::{PosterError, PosterResult};
use crate::layout::TextMeasure;

/// RGBA8 brush color carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrushRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Stateful shaper bound to one font file.
///
/// Not `Sync`; each render worker owns its own shaper.
pub struct TextShaper {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    family_name: String,
    font_bytes: Arc<Vec<u8>>,
}

impl TextShaper {
    /// Register `font_bytes` and bind the shaper to its first family.
    pub fn new(font_bytes: Arc<Vec<u8>>) -> PosterResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.as_ref().clone()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| PosterError::render("no font families registered from font bytes"))?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| PosterError::render("registered font family has no name"))?
            .to_string();

        Ok(TextShaper {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family_name,
            font_bytes,
        })
    }

    pub fn family_name(&self) -> &str {
        &self.family_name
    }

    /// Font handle for glyph fills on a compositor context.
    pub fn font_data(&self) -> vello_cpu::peniko::FontData {
        vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(self.font_bytes.as_ref().clone()),
            0,
        )
    }

    /// Shape one pre-wrapped line without further breaking.
    pub fn layout_line(
        &mut self,
        text: &str,
        size_px: f32,
        brush: TextBrushRgba8,
    ) -> PosterResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(PosterError::render("text size must be finite and > 0"));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family_name.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}

impl TextMeasure for TextShaper {
    fn line_width(&mut self, text: &str, font_px: f32) -> f64 {
        if text.is_empty() {
            return 0.0;
        }
        match self.layout_line(text, font_px, TextBrushRgba8::default()) {
            Ok(layout) => layout
                .lines()
                .map(|line| f64::from(line.metrics().advance))
                .fold(0.0, f64::max),
            Err(_) => 0.0,
        }
    }

    fn line_height(&mut self, font_px: f32) -> f64 {
        match self.layout_line("Ag", font_px, TextBrushRgba8::default()) {
            Ok(layout) => layout
                .lines()
                .next()
                .map(|line| {
                    let m = line.metrics();
                    f64::from(m.ascent + m.descent + m.leading)
                })
                .unwrap_or(f64::from(font_px) * 1.2),
            Err(_) => f64::from(font_px) * 1.2,
        }
    }
}
