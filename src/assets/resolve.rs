use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::future::Cache;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::assets::key::{AssetKey, fold_ascii};
use crate::model::{ResolutionStatus, ResolvedAsset};
use crate::services::{AssetRepository, MediaItem};

/// Tunables for batched resolution.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Items requested per repository listing call.
    pub page_size: u32,
    /// Lifetime for landmark and overlay resolutions.
    pub landmark_ttl: Duration,
    /// Lifetime for speaker photo resolutions.
    pub photo_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            page_size: 50,
            landmark_ttl: Duration::from_secs(30 * 24 * 3600),
            photo_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

type InflightRx = watch::Receiver<Option<ResolvedAsset>>;

/// Removes a claimed in-flight entry when the claim ends, published or not.
/// A cancelled run must not leave a dead channel other batches would join.
struct ClaimGuard {
    map: Arc<DashMap<String, InflightRx>>,
    fp: String,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.map.remove(&self.fp);
    }
}

struct Claim {
    key: AssetKey,
    tx: watch::Sender<Option<ResolvedAsset>>,
    _guard: ClaimGuard,
}

/// Resolves asset keys to repository URLs with TTL caching and
/// single-flight coalescing across concurrent batches.
pub struct AssetResolver {
    repo: Arc<dyn AssetRepository>,
    config: ResolverConfig,
    landmark_cache: Cache<String, ResolvedAsset>,
    photo_cache: Cache<String, ResolvedAsset>,
    inflight: Arc<DashMap<String, InflightRx>>,
}

impl AssetResolver {
    pub fn new(repo: Arc<dyn AssetRepository>, config: ResolverConfig) -> Self {
        let landmark_cache = Cache::builder()
            .time_to_live(config.landmark_ttl)
            .build();
        let photo_cache = Cache::builder().time_to_live(config.photo_ttl).build();
        AssetResolver {
            repo,
            config,
            landmark_cache,
            photo_cache,
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Resolve every key in the batch.
    ///
    /// Cache hits are answered locally and marked [`ResolutionStatus::StaleCacheHit`].
    /// All remaining keys claimed by this batch share exactly one repository
    /// listing call; keys already claimed by a concurrent batch are joined,
    /// not re-requested. Never fails: an unreachable repository degrades
    /// every claimed key to `Missing` with the failure detail retained.
    #[tracing::instrument(skip_all, fields(keys = keys.len()))]
    pub async fn resolve_batch(
        &self,
        keys: &BTreeSet<AssetKey>,
    ) -> BTreeMap<AssetKey, ResolvedAsset> {
        let mut out = BTreeMap::new();
        let mut claimed: Vec<Claim> = Vec::new();
        let mut joined: Vec<(AssetKey, InflightRx)> = Vec::new();

        for key in keys {
            let fp = key.fingerprint().to_string();
            if let Some(mut hit) = self.cache_for(key).get(&fp).await {
                hit.status = ResolutionStatus::StaleCacheHit;
                debug!(key = %key, "cache hit");
                out.insert(key.clone(), hit);
                continue;
            }
            match self.inflight.entry(fp.clone()) {
                dashmap::Entry::Occupied(entry) => {
                    joined.push((key.clone(), entry.get().clone()));
                }
                dashmap::Entry::Vacant(entry) => {
                    let (tx, rx) = watch::channel(None);
                    entry.insert(rx);
                    claimed.push(Claim {
                        key: key.clone(),
                        tx,
                        _guard: ClaimGuard {
                            map: Arc::clone(&self.inflight),
                            fp,
                        },
                    });
                }
            }
        }

        if !claimed.is_empty() {
            self.resolve_claimed(&mut out, claimed).await;
        }

        for (key, mut rx) in joined {
            let resolved = match rx.wait_for(Option::is_some).await {
                Ok(value) => value.clone().unwrap_or_else(|| missing(&key, None)),
                // The claiming batch was cancelled before publishing.
                Err(_) => missing(&key, Some("resolution cancelled".into())),
            };
            out.insert(key, resolved);
        }

        out
    }

    async fn resolve_claimed(&self, out: &mut BTreeMap<AssetKey, ResolvedAsset>, claimed: Vec<Claim>) {
        let listing = self.repo.list("", self.config.page_size).await;

        for claim in claimed {
            let key = &claim.key;
            let resolved = match &listing {
                Ok(items) => match find_match(key, items) {
                    Some(item) => {
                        let found = ResolvedAsset {
                            key: key.clone(),
                            status: ResolutionStatus::Found,
                            url: Some(item.url.clone()),
                            detail: None,
                            fingerprint: item.fingerprint,
                        };
                        self.cache_for(key)
                            .insert(key.fingerprint().to_string(), found.clone())
                            .await;
                        found
                    }
                    None => missing(key, None),
                },
                // Only confirmed listings populate the cache; a transient
                // outage must not poison a multi-day TTL.
                Err(err) => {
                    warn!(key = %key, error = %err, "repository listing failed");
                    missing(key, Some(err.to_string()))
                }
            };

            // Publish before the guard drops and clears the claim, so
            // joiners observe the value rather than a closed channel.
            let _ = claim.tx.send(Some(resolved.clone()));
            out.insert(claim.key.clone(), resolved);
        }
    }

    fn cache_for(&self, key: &AssetKey) -> &Cache<String, ResolvedAsset> {
        match key {
            AssetKey::Landmark { .. } | AssetKey::Overlay => &self.landmark_cache,
            AssetKey::SpeakerPhoto { .. } => &self.photo_cache,
        }
    }
}

fn missing(key: &AssetKey, detail: Option<String>) -> ResolvedAsset {
    ResolvedAsset {
        key: key.clone(),
        status: ResolutionStatus::Missing,
        url: None,
        detail,
        fingerprint: key.fingerprint(),
    }
}

fn find_match<'a>(key: &AssetKey, items: &'a [MediaItem]) -> Option<&'a MediaItem> {
    let variants = key.name_variants();
    items.iter().find(|item| {
        // Both sides of the match get the same normalization, so stored
        // names carrying diacritics or separator drift still line up.
        let name = fold_ascii(&item.name);
        let stem = fold_ascii(url_file_stem(&item.url));
        variants
            .iter()
            .any(|v| name.contains(v.as_str()) || stem.contains(v.as_str()))
    })
}

fn url_file_stem(url: &str) -> &str {
    let file = url.rsplit('/').next().unwrap_or(url);
    file.rsplit_once('.').map_or(file, |(stem, _)| stem)
}
