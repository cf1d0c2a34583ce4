//! Prerequisite validation: resolve everything a request will need in one
//! batch and report availability. Validation informs; it never blocks.

use std::collections::BTreeSet;

use crate::assets::key::AssetKey;
use crate::assets::resolve::AssetResolver;
use crate::extract::Location;
use crate::model::ValidationReport;

/// Build the set of asset keys a request requires.
///
/// An unknown location contributes a warning instead of a landmark key.
pub fn required_keys(
    location: Option<&Location>,
    speaker_names: &[String],
) -> (BTreeSet<AssetKey>, Vec<String>) {
    let mut keys = BTreeSet::new();
    let mut warnings = Vec::new();

    match location {
        Some(loc) => {
            keys.insert(AssetKey::Landmark {
                city: loc.city.clone(),
                country: loc.country.clone(),
            });
        }
        None => warnings.push(
            "event location could not be determined; landmark backdrop skipped".to_string(),
        ),
    }

    keys.insert(AssetKey::Overlay);

    for name in speaker_names {
        keys.insert(AssetKey::SpeakerPhoto { name: name.clone() });
    }

    (keys, warnings)
}

/// Resolve all required keys in one batch and summarize availability.
#[tracing::instrument(skip_all, fields(speakers = speaker_names.len()))]
pub async fn validate(
    resolver: &AssetResolver,
    location: Option<&Location>,
    speaker_names: &[String],
) -> ValidationReport {
    let (keys, mut warnings) = required_keys(location, speaker_names);
    let entries = resolver.resolve_batch(&keys).await;

    for resolved in entries.values() {
        if !resolved.is_found() {
            let detail = resolved
                .detail
                .as_deref()
                .unwrap_or("no matching repository item");
            warnings.push(format!("asset '{}' unavailable: {detail}", resolved.key));
        }
    }

    ValidationReport { entries, warnings }
}
