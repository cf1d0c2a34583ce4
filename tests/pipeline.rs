//! End-to-end pipeline scenarios with mock collaborators.

use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeZone;
use posterforge::error::{PosterError, PosterResult};
use posterforge::model::{EventDetails, PosterKind, PosterRequest, RunStatus};
use posterforge::pipeline::PosterPipeline;
use posterforge::services::{AssetRepository, MediaItem, RateLimiter, TextSummarizer};
use posterforge::EngineConfig;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn system_font() -> Option<Arc<Vec<u8>>> {
    let candidates = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ];
    for path in candidates {
        if let Ok(bytes) = std::fs::read(path) {
            return Some(Arc::new(bytes));
        }
    }
    None
}

fn tiny_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([120, 140, 160, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

struct StubRepo {
    items: Vec<MediaItem>,
    list_delay: Duration,
    fail_uploads: AtomicBool,
}

impl StubRepo {
    fn with_items(items: Vec<MediaItem>) -> Self {
        StubRepo {
            items,
            list_delay: Duration::ZERO,
            fail_uploads: AtomicBool::new(false),
        }
    }

    fn empty() -> Self {
        Self::with_items(Vec::new())
    }
}

#[async_trait]
impl AssetRepository for StubRepo {
    async fn list(&self, _query: &str, _page_size: u32) -> PosterResult<Vec<MediaItem>> {
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        Ok(self.items.clone())
    }

    async fn fetch(&self, _url: &str) -> PosterResult<Vec<u8>> {
        Ok(tiny_png())
    }

    async fn upload(&self, name: &str, _ct: &str, _bytes: Vec<u8>) -> PosterResult<String> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(PosterError::repository("storage rejected the upload"));
        }
        Ok(format!("https://cdn.example/{name}"))
    }
}

struct EchoSummarizer;

#[async_trait]
impl TextSummarizer for EchoSummarizer {
    async fn summarize(&self, text: &str, max_chars: usize) -> PosterResult<String> {
        Ok(text.chars().take(max_chars).collect())
    }
}

struct FailingSummarizer;

#[async_trait]
impl TextSummarizer for FailingSummarizer {
    async fn summarize(&self, _text: &str, _max_chars: usize) -> PosterResult<String> {
        Err(PosterError::summarizer("model endpoint is down"))
    }
}

struct FixedLimiter(bool);

#[async_trait]
impl RateLimiter for FixedLimiter {
    async fn allow(&self, _identity: &str) -> PosterResult<bool> {
        Ok(self.0)
    }
}

struct BrokenLimiter;

#[async_trait]
impl RateLimiter for BrokenLimiter {
    async fn allow(&self, _identity: &str) -> PosterResult<bool> {
        Err(PosterError::repository("limiter backend unreachable"))
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
        MediaItem::new("yohan_singh", "https://cdn.example/ys.jpg"),
    ]
}

fn request() -> PosterRequest {
    PosterRequest {
        event: EventDetails {
            title: "KL Fintech Evening".into(),
            description: "An evening of talks on payments, infrastructure, and \
                          regional fintech regulation, followed by networking."
                .into(),
            starts_at: chrono::Utc.with_ymd_and_hms(2026, 9, 10, 18, 30, 0).unwrap(),
            venue: "wework chambers, kuala lumpur, malaysia".into(),
            city: None,
            country: None,
            theme: None,
            registration_url: Some("https://example.org/register".into()),
        },
        speakers: Vec::new(),
        speakers_text: Some(
            "Joel Pannikot, the Managing Director of the Chartered Institute for \
             Securities and Investment, will open the evening."
                .into(),
        ),
        community_leader: Some("Yohan Singh".into()),
        kinds: BTreeSet::from([PosterKind::General, PosterKind::Speaker]),
    }
}

fn small_config() -> EngineConfig {
    EngineConfig {
        canvas_width: 600,
        canvas_height: 800,
        deadline_secs: 20,
        ..EngineConfig::default()
    }
}

fn pipeline(repo: StubRepo, config: EngineConfig, font: Arc<Vec<u8>>) -> PosterPipeline {
    PosterPipeline::new(
        Arc::new(repo),
        Arc::new(EchoSummarizer),
        Arc::new(FixedLimiter(true)),
        font,
        config,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_run_produces_uploaded_posters() {
    init_tracing();
    let Some(font) = system_font() else {
        eprintln!("no system font found; skipping");
        return;
    };
    let pipeline = pipeline(StubRepo::with_items(stock_items()), small_config(), font);

    let report = pipeline.run("203.0.113.7", request()).await.unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.event_id.len(), 12);
    assert!(report.validation.all_present());
    // One general poster plus one speaker poster per extracted speaker.
    assert_eq!(report.posters.len(), 3);
    for poster in &report.posters {
        assert_eq!((poster.width, poster.height), (600, 800));
        assert!(poster.byte_size > 0);
        let url = poster.url.as_deref().unwrap();
        assert!(url.contains("kuala-lumpur-malaysia"), "{url}");
        assert!(url.contains(&report.event_id), "{url}");
        let decoded = image::load_from_memory(&poster.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (600, 800));
    }

    let speaker_names: Vec<_> = report
        .posters
        .iter()
        .filter_map(|p| p.speaker_name.as_deref())
        .collect();
    assert_eq!(speaker_names, vec!["Yohan Singh", "Joel Pannikot"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_assets_degrade_to_partial_success_with_placeholders() {
    init_tracing();
    let Some(font) = system_font() else {
        eprintln!("no system font found; skipping");
        return;
    };
    let pipeline = pipeline(StubRepo::empty(), small_config(), font);

    let report = pipeline.run("203.0.113.7", request()).await.unwrap();

    assert_eq!(report.status, RunStatus::PartialSuccess);
    assert!(!report.validation.all_present());
    assert_eq!(report.posters.len(), 3);
    for poster in &report.posters {
        assert!(poster.url.is_some());
        assert!(poster.byte_size > 0);
    }
    assert!(report.warnings.iter().any(|w| w.contains("unavailable")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn theme_poster_renders_the_centered_panel() {
    let Some(font) = system_font() else {
        eprintln!("no system font found; skipping");
        return;
    };
    let pipeline = pipeline(StubRepo::with_items(stock_items()), small_config(), font);
    let mut req = request();
    req.event.theme = Some("The Future of Payments".into());
    req.kinds = BTreeSet::from([PosterKind::Theme]);

    let report = pipeline.run("203.0.113.7", req).await.unwrap();

    assert_eq!(report.posters.len(), 1);
    let poster = &report.posters[0];
    assert_eq!(poster.kind, PosterKind::Theme);
    assert!(poster.speaker_name.is_none());
    let decoded = image::load_from_memory(&poster.bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (600, 800));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deadline_expiry_yields_timeout_report() {
    init_tracing();
    let Some(font) = system_font() else {
        eprintln!("no system font found; skipping");
        return;
    };
    let mut repo = StubRepo::with_items(stock_items());
    repo.list_delay = Duration::from_secs(3);
    let config = EngineConfig {
        deadline_secs: 1,
        ..small_config()
    };
    let pipeline = pipeline(repo, config, font);

    let report = pipeline.run("203.0.113.7", request()).await.unwrap();

    assert_eq!(report.status, RunStatus::Timeout);
    assert!(report.posters.is_empty());
    assert!(report.warnings.iter().any(|w| w.contains("deadline")));
}

#[tokio::test]
async fn denied_identity_is_rejected_before_any_work() {
    let Some(font) = system_font() else {
        eprintln!("no system font found; skipping");
        return;
    };
    let pipeline = PosterPipeline::new(
        Arc::new(StubRepo::with_items(stock_items())),
        Arc::new(EchoSummarizer),
        Arc::new(FixedLimiter(false)),
        font,
        small_config(),
    );

    let err = pipeline.run("203.0.113.7", request()).await.unwrap_err();
    assert!(matches!(err, PosterError::RateLimited(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_limiter_fails_open() {
    let Some(font) = system_font() else {
        eprintln!("no system font found; skipping");
        return;
    };
    let pipeline = PosterPipeline::new(
        Arc::new(StubRepo::with_items(stock_items())),
        Arc::new(EchoSummarizer),
        Arc::new(BrokenLimiter),
        font,
        small_config(),
    );

    let report = pipeline.run("203.0.113.7", request()).await.unwrap();
    assert_eq!(report.status, RunStatus::Success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn summarizer_failure_falls_back_to_description() {
    let Some(font) = system_font() else {
        eprintln!("no system font found; skipping");
        return;
    };
    let pipeline = PosterPipeline::new(
        Arc::new(StubRepo::with_items(stock_items())),
        Arc::new(FailingSummarizer),
        Arc::new(FixedLimiter(true)),
        font,
        small_config(),
    );

    let report = pipeline.run("203.0.113.7", request()).await.unwrap();
    // Degraded summary is a warning, not a failure.
    assert_ne!(report.status, RunStatus::Timeout);
    assert!(!report.posters.is_empty());
    assert!(report.warnings.iter().any(|w| w.contains("summarizer")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_failure_downgrades_to_partial_success() {
    let Some(font) = system_font() else {
        eprintln!("no system font found; skipping");
        return;
    };
    let repo = StubRepo::with_items(stock_items());
    repo.fail_uploads.store(true, Ordering::SeqCst);
    let pipeline = pipeline(repo, small_config(), font);

    let report = pipeline.run("203.0.113.7", request()).await.unwrap();

    assert_eq!(report.status, RunStatus::PartialSuccess);
    assert!(report.posters.iter().all(|p| p.url.is_none()));
    assert!(report.warnings.iter().any(|w| w.contains("upload")));
}

#[tokio::test]
async fn empty_kind_set_is_rejected() {
    let Some(font) = system_font() else {
        eprintln!("no system font found; skipping");
        return;
    };
    let pipeline = pipeline(StubRepo::empty(), small_config(), font);
    let mut req = request();
    req.kinds = BTreeSet::new();

    let err = pipeline.run("203.0.113.7", req).await.unwrap_err();
    assert!(matches!(err, PosterError::Validation(_)));
}
