//! Deterministic poster geometry: band placement, speaker tile grids, and
//! font-size search. No I/O; text measurement is injected through
//! [`TextMeasure`] so the solver can be driven by a fake in tests.

use kurbo::Rect;
use serde::{Deserialize, Serialize};

use crate::error::{PosterError, PosterResult};
use crate::model::PosterKind;

/// Output surface in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

/// One circular speaker slot (or the theme panel when `speaker_index`
/// is `None`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TilePlan {
    pub rect: Rect,
    pub speaker_index: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextRole {
    Title,
    Summary,
    Details,
    Cta,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    Center,
}

/// Text the caller wants placed, before fitting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextContent {
    pub role: TextRole,
    pub text: String,
}

/// A fitted block: chosen size and pre-wrapped lines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextBlockPlan {
    pub role: TextRole,
    pub rect: Rect,
    pub font_px: f32,
    pub align: TextAlign,
    pub lines: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutPlan {
    pub canvas: Canvas,
    pub tiles: Vec<TilePlan>,
    pub text_blocks: Vec<TextBlockPlan>,
}

/// Width and height of text at a given size. Implementations must be
/// deterministic for the plan to be reproducible.
pub trait TextMeasure {
    fn line_width(&mut self, text: &str, font_px: f32) -> f64;
    fn line_height(&mut self, font_px: f32) -> f64;
}

/// Search floor as a fraction of each block's maximum size.
const MIN_SIZE_RATIO: f32 = 0.6;
/// Descending search step in pixels.
const SIZE_STEP: f32 = 2.0;
/// Inset between a grid cell and the circle inscribed in it.
const TILE_GAP: f64 = 12.0;

/// Grid shape (columns, rows) for a speaker count.
pub fn grid_shape(n: usize) -> (usize, usize) {
    match n {
        0 => (0, 0),
        1 | 2 => (n, 1),
        3 | 4 => (2, 2),
        5 | 6 => (3, 2),
        _ => {
            let cols = (n as f64).sqrt().ceil() as usize;
            let rows = n.div_ceil(cols);
            (cols, rows)
        }
    }
}

struct Bands {
    title: Rect,
    summary: Rect,
    grid: Rect,
    details: Rect,
    cta: Rect,
}

fn bands(canvas: Canvas) -> Bands {
    let w = canvas.width as f64;
    let h = canvas.height as f64;
    let margin = 0.05 * w;
    let band = |top: f64, bottom: f64| Rect::new(margin, top * h, w - margin, bottom * h);
    Bands {
        title: band(0.05, 0.22),
        summary: band(0.23, 0.36),
        grid: band(0.375, 0.72),
        details: band(0.75, 0.87),
        cta: band(0.88, 0.95),
    }
}

/// Compute the full poster geometry for one render job.
///
/// Pure and deterministic: the same inputs always produce the same plan.
pub fn compute_layout(
    canvas: Canvas,
    kind: PosterKind,
    speaker_count: usize,
    texts: &[TextContent],
    measure: &mut dyn TextMeasure,
) -> PosterResult<LayoutPlan> {
    if canvas.width == 0 || canvas.height == 0 {
        return Err(PosterError::layout("canvas has zero area"));
    }

    let bands = bands(canvas);
    let tiles = match kind {
        PosterKind::General => grid_tiles(bands.grid, speaker_count),
        PosterKind::Speaker => row_tiles(bands.grid, speaker_count),
        PosterKind::Theme => vec![TilePlan {
            rect: centered_panel(bands.grid),
            speaker_index: None,
        }],
    };

    let h = canvas.height as f64;
    let mut text_blocks = Vec::new();
    for content in texts {
        let (rect, max_px, align) = match content.role {
            TextRole::Title => (bands.title, 0.060 * h, TextAlign::Center),
            TextRole::Summary => (bands.summary, 0.033 * h, TextAlign::Left),
            TextRole::Details => (bands.details, 0.030 * h, TextAlign::Left),
            TextRole::Cta => (bands.cta, 0.035 * h, TextAlign::Center),
        };
        let (font_px, lines) = fit_block(&content.text, rect, max_px as f32, measure);
        text_blocks.push(TextBlockPlan {
            role: content.role,
            rect,
            font_px,
            align,
            lines,
        });
    }

    Ok(LayoutPlan {
        canvas,
        tiles,
        text_blocks,
    })
}

fn grid_tiles(region: Rect, count: usize) -> Vec<TilePlan> {
    let (cols, rows) = grid_shape(count);
    if cols == 0 {
        return Vec::new();
    }
    let cell_w = region.width() / cols as f64;
    let cell_h = region.height() / rows as f64;
    let diameter = (cell_w.min(cell_h) - 2.0 * TILE_GAP).max(1.0);

    // Row-major fill; a partial trailing row stays left-aligned.
    (0..count)
        .map(|i| {
            let col = i % cols;
            let row = i / cols;
            let cx = region.x0 + cell_w * (col as f64 + 0.5);
            let cy = region.y0 + cell_h * (row as f64 + 0.5);
            TilePlan {
                rect: Rect::new(
                    cx - diameter / 2.0,
                    cy - diameter / 2.0,
                    cx + diameter / 2.0,
                    cy + diameter / 2.0,
                ),
                speaker_index: Some(i),
            }
        })
        .collect()
}

/// Single-row enlarged tiles for the speaker poster kind.
fn row_tiles(region: Rect, count: usize) -> Vec<TilePlan> {
    if count == 0 {
        return Vec::new();
    }
    let cell_w = region.width() / count as f64;
    let diameter = (cell_w.min(region.height()) - TILE_GAP).max(1.0);
    (0..count)
        .map(|i| {
            let cx = region.x0 + cell_w * (i as f64 + 0.5);
            let cy = region.y0 + region.height() / 2.0;
            TilePlan {
                rect: Rect::new(
                    cx - diameter / 2.0,
                    cy - diameter / 2.0,
                    cx + diameter / 2.0,
                    cy + diameter / 2.0,
                ),
                speaker_index: Some(i),
            }
        })
        .collect()
}

fn centered_panel(region: Rect) -> Rect {
    let w = region.width() * 0.6;
    let cx = (region.x0 + region.x1) / 2.0;
    Rect::new(cx - w / 2.0, region.y0, cx + w / 2.0, region.y1)
}

/// Find the largest size in `[0.6 * max, max]` (2 px steps) whose wrapped
/// lines fit the block, then truncate at the floor if nothing fits.
fn fit_block(
    text: &str,
    rect: Rect,
    max_px: f32,
    measure: &mut dyn TextMeasure,
) -> (f32, Vec<String>) {
    let min_px = max_px * MIN_SIZE_RATIO;
    let mut size = max_px;
    while size > min_px {
        let lines = wrap_text(text, rect.width(), size, measure);
        if block_fits(&lines, rect, size, measure) {
            return (size, lines);
        }
        size -= SIZE_STEP;
    }

    let mut lines = wrap_text(text, rect.width(), min_px, measure);
    if block_fits(&lines, rect, min_px, measure) {
        return (min_px, lines);
    }

    // Floor reached: drop trailing words until the block fits.
    let mut words: Vec<&str> = text.split_whitespace().collect();
    while words.len() > 1 {
        words.pop();
        let truncated = format!("{}…", words.join(" "));
        lines = wrap_text(&truncated, rect.width(), min_px, measure);
        if block_fits(&lines, rect, min_px, measure) {
            return (min_px, lines);
        }
    }
    (min_px, wrap_text("…", rect.width(), min_px, measure))
}

fn block_fits(lines: &[String], rect: Rect, size: f32, measure: &mut dyn TextMeasure) -> bool {
    let total_h = lines.len() as f64 * measure.line_height(size);
    total_h <= rect.height()
        && lines
            .iter()
            .all(|l| measure.line_width(l, size) <= rect.width())
}

/// Greedy word wrap. A single word wider than the block gets its own line
/// and is reported oversize by [`block_fits`].
fn wrap_text(text: &str, width: f64, size: f32, measure: &mut dyn TextMeasure) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if measure.line_width(&candidate, size) <= width || current.is_empty() {
            current = candidate;
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
