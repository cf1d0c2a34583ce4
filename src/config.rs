use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assets::resolve::ResolverConfig;
use crate::layout::Canvas;
use crate::render::Palette;

/// Engine tunables with conservative defaults. Durations are stored as
/// whole seconds so the struct deserializes from flat config files.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub deadline_secs: u64,
    pub repository_page_size: u32,
    pub landmark_ttl_secs: u64,
    pub photo_ttl_secs: u64,
    pub summary_max_chars: usize,
    pub cta_text: String,
    pub palette: Palette,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            canvas_width: 1200,
            canvas_height: 1600,
            deadline_secs: 25,
            repository_page_size: 50,
            landmark_ttl_secs: 30 * 24 * 3600,
            photo_ttl_secs: 7 * 24 * 3600,
            summary_max_chars: 200,
            cta_text: "Scan to register".to_string(),
            palette: Palette::default(),
        }
    }
}

impl EngineConfig {
    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.canvas_width,
            height: self.canvas_height,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            page_size: self.repository_page_size,
            landmark_ttl: Duration::from_secs(self.landmark_ttl_secs),
            photo_ttl: Duration::from_secs(self.photo_ttl_secs),
        }
    }
}
