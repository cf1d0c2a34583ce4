//! Resolver behavior across batches: caching, single-flight, degradation.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use posterforge::assets::key::AssetKey;
use posterforge::assets::resolve::{AssetResolver, ResolverConfig};
use posterforge::error::{PosterError, PosterResult};
use posterforge::model::ResolutionStatus;
use posterforge::services::{AssetRepository, MediaItem};

struct CountingRepo {
    items: Vec<MediaItem>,
    list_calls: AtomicUsize,
    fail: AtomicBool,
    list_delay: Duration,
}

impl CountingRepo {
    fn new(items: Vec<MediaItem>) -> Self {
        CountingRepo {
            items,
            list_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            list_delay: Duration::ZERO,
        }
    }

    fn calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetRepository for CountingRepo {
    async fn list(&self, _query: &str, _page_size: u32) -> PosterResult<Vec<MediaItem>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PosterError::repository("connection refused"));
        }
        Ok(self.items.clone())
    }

    async fn fetch(&self, _url: &str) -> PosterResult<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn upload(&self, _name: &str, _ct: &str, _bytes: Vec<u8>) -> PosterResult<String> {
        Ok("https://cdn.example/uploaded.png".to_string())
    }
}

fn stock_items() -> Vec<MediaItem> {
    vec![
        MediaItem::new("brand-overlay", "https://cdn.example/brand-overlay.png"),
        MediaItem::new(
            "kuala-lumpur-malaysia skyline",
            "https://cdn.example/skyline.jpg",
        ),
        MediaItem::new("Joel Pannikot", "https://cdn.example/joel-pannikot.jpg"),
    ]
}

fn keys(keys: &[AssetKey]) -> BTreeSet<AssetKey> {
    keys.iter().cloned().collect()
}

fn resolver(repo: Arc<CountingRepo>) -> AssetResolver {
    AssetResolver::new(repo, ResolverConfig::default())
}

#[tokio::test]
async fn one_listing_call_covers_a_whole_batch() {
    let repo = Arc::new(CountingRepo::new(stock_items()));
    let resolver = resolver(Arc::clone(&repo));

    let batch = keys(&[
        AssetKey::Overlay,
        AssetKey::Landmark {
            city: "Kuala Lumpur".into(),
            country: "Malaysia".into(),
        },
        AssetKey::SpeakerPhoto {
            name: "Joel Pannikot".into(),
        },
    ]);
    let results = resolver.resolve_batch(&batch).await;

    assert_eq!(repo.calls(), 1);
    assert_eq!(results.len(), 3);
    assert!(results.values().all(|r| r.status == ResolutionStatus::Found));
    assert_eq!(
        results[&AssetKey::Overlay].url.as_deref(),
        Some("https://cdn.example/brand-overlay.png")
    );
    // Found entries carry the stored item's content fingerprint, not the
    // key's own identity.
    assert_eq!(
        results[&AssetKey::Overlay].fingerprint,
        stock_items()[0].fingerprint
    );
    assert_ne!(
        results[&AssetKey::Overlay].fingerprint,
        AssetKey::Overlay.fingerprint()
    );
}

#[tokio::test]
async fn concurrent_batches_share_one_listing_call() {
    let mut repo = CountingRepo::new(stock_items());
    repo.list_delay = Duration::from_millis(30);
    let repo = Arc::new(repo);
    let resolver = Arc::new(resolver(Arc::clone(&repo)));

    let batch = keys(&[AssetKey::SpeakerPhoto {
        name: "Joel Pannikot".into(),
    }]);
    let (a, b) = tokio::join!(
        resolver.resolve_batch(&batch),
        resolver.resolve_batch(&batch),
    );

    assert_eq!(repo.calls(), 1);
    for results in [a, b] {
        let resolved = results.values().next().unwrap();
        assert!(resolved.is_found());
    }
}

#[tokio::test]
async fn second_batch_is_served_from_cache() {
    let repo = Arc::new(CountingRepo::new(stock_items()));
    let resolver = resolver(Arc::clone(&repo));
    let batch = keys(&[AssetKey::Overlay]);

    let first = resolver.resolve_batch(&batch).await;
    assert_eq!(first[&AssetKey::Overlay].status, ResolutionStatus::Found);

    let second = resolver.resolve_batch(&batch).await;
    assert_eq!(
        second[&AssetKey::Overlay].status,
        ResolutionStatus::StaleCacheHit
    );
    assert_eq!(repo.calls(), 1);
}

#[tokio::test]
async fn unreachable_repository_degrades_without_caching() {
    let repo = Arc::new(CountingRepo::new(stock_items()));
    repo.fail.store(true, Ordering::SeqCst);
    let resolver = resolver(Arc::clone(&repo));
    let batch = keys(&[AssetKey::Overlay]);

    let degraded = resolver.resolve_batch(&batch).await;
    let resolved = &degraded[&AssetKey::Overlay];
    assert_eq!(resolved.status, ResolutionStatus::Missing);
    assert!(resolved.detail.as_deref().unwrap().contains("connection refused"));

    // Recovery is visible on the next batch because failures are not cached.
    repo.fail.store(false, Ordering::SeqCst);
    let recovered = resolver.resolve_batch(&batch).await;
    assert_eq!(recovered[&AssetKey::Overlay].status, ResolutionStatus::Found);
    assert_eq!(repo.calls(), 2);
}

#[tokio::test]
async fn absent_asset_resolves_missing_without_detail() {
    let repo = Arc::new(CountingRepo::new(stock_items()));
    let resolver = resolver(Arc::clone(&repo));
    let batch = keys(&[AssetKey::SpeakerPhoto {
        name: "Nobody Here".into(),
    }]);

    let results = resolver.resolve_batch(&batch).await;
    let resolved = results.values().next().unwrap();
    assert_eq!(resolved.status, ResolutionStatus::Missing);
    assert_eq!(resolved.detail, None);
}
