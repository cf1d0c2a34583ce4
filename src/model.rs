use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assets::key::AssetKey;
use crate::fingerprint::Fingerprint;

/// Structured description of the event being promoted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventDetails {
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub venue: String,
    /// Canonical city; derived from venue and title when absent.
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub registration_url: Option<String>,
}

/// One speaker as submitted by the caller.
///
/// The name may be absent when the caller only has a bio paragraph; the
/// extractor then mines the bio for a proper-cased name.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Speaker {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Poster variants a run can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PosterKind {
    General,
    Speaker,
    Theme,
}

impl PosterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PosterKind::General => "general",
            PosterKind::Speaker => "speaker",
            PosterKind::Theme => "theme",
        }
    }
}

/// Everything one composition run needs; owned by that run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PosterRequest {
    pub event: EventDetails,
    #[serde(default)]
    pub speakers: Vec<Speaker>,
    /// Free-text speaker bios, mined when the structured list is empty.
    #[serde(default)]
    pub speakers_text: Option<String>,
    #[serde(default)]
    pub community_leader: Option<String>,
    pub kinds: BTreeSet<PosterKind>,
}

/// Outcome of resolving one asset key against the repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// A matching repository item was found by this batch.
    Found,
    /// No matching item exists, or the repository was unreachable.
    Missing,
    /// Served from the TTL cache without contacting the repository.
    StaleCacheHit,
}

/// Immutable resolution record, shared across runs via the cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedAsset {
    pub key: AssetKey,
    pub status: ResolutionStatus,
    pub url: Option<String>,
    /// Failure detail when the repository could not be consulted.
    pub detail: Option<String>,
    /// Content fingerprint of the matched item; the key's own fingerprint
    /// when nothing matched.
    pub fingerprint: Fingerprint,
}

impl ResolvedAsset {
    pub fn is_found(&self) -> bool {
        matches!(
            self.status,
            ResolutionStatus::Found | ResolutionStatus::StaleCacheHit
        ) && self.url.is_some()
    }
}

/// Per-run asset availability report. Informational; never blocks a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Serialized as a sequence because asset keys are structured values.
    #[serde(with = "entries_as_seq")]
    pub entries: BTreeMap<AssetKey, ResolvedAsset>,
    pub warnings: Vec<String>,
}

mod entries_as_seq {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        entries: &BTreeMap<AssetKey, ResolvedAsset>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.collect_seq(entries.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<BTreeMap<AssetKey, ResolvedAsset>, D::Error> {
        let items = Vec::<ResolvedAsset>::deserialize(de)?;
        Ok(items.into_iter().map(|r| (r.key.clone(), r)).collect())
    }
}

impl ValidationReport {
    pub fn all_present(&self) -> bool {
        self.entries.values().all(ResolvedAsset::is_found)
    }

    pub fn missing_keys(&self) -> Vec<&AssetKey> {
        self.entries
            .values()
            .filter(|r| !r.is_found())
            .map(|r| &r.key)
            .collect()
    }
}

/// One finished poster image.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Poster {
    pub kind: PosterKind,
    /// Set for `speaker` posters, one per speaker.
    pub speaker_name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub byte_size: usize,
    #[serde(skip)]
    pub bytes: Arc<Vec<u8>>,
    /// Storage URL once uploaded; `None` when upload failed.
    pub url: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
}

/// Terminal outcome of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Timeout,
}

/// Caller-facing structured result of one composition run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub event_id: String,
    pub posters: Vec<Poster>,
    pub validation: ValidationReport,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}
