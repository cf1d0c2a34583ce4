//! Composition orchestrator: one request in, one structured report out,
//! the whole run bounded by a single wall-clock deadline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::assets::decode::{PreparedImage, decode_image};
use crate::assets::key::AssetKey;
use crate::assets::resolve::AssetResolver;
use crate::config::EngineConfig;
use crate::error::{PosterError, PosterResult};
use crate::extract::{self, Location};
use crate::fingerprint::Fingerprint;
use crate::layout::{TextContent, TextRole, compute_layout};
use crate::model::{
    EventDetails, Poster, PosterKind, PosterRequest, RunReport, RunStatus, ValidationReport,
};
use crate::render::{Palette, RenderInputs, render_poster};
use crate::services::{AssetRepository, RateLimiter, TextSummarizer};
use crate::services::summarizer::clamp_to_chars;
use crate::text::TextShaper;
use crate::validate;

/// The full engine wired to its collaborators. Cheap to share; one
/// instance serves concurrent runs and they share the resolution cache.
pub struct PosterPipeline {
    repo: Arc<dyn AssetRepository>,
    resolver: Arc<AssetResolver>,
    summarizer: Arc<dyn TextSummarizer>,
    limiter: Arc<dyn RateLimiter>,
    font_bytes: Arc<Vec<u8>>,
    config: EngineConfig,
}

/// One poster to composite: everything a blocking worker needs, owned.
struct RenderJob {
    kind: PosterKind,
    speaker_name: Option<String>,
    speaker_count: usize,
    texts: Vec<TextContent>,
    inputs: RenderInputs,
}

impl PosterPipeline {
    pub fn new(
        repo: Arc<dyn AssetRepository>,
        summarizer: Arc<dyn TextSummarizer>,
        limiter: Arc<dyn RateLimiter>,
        font_bytes: Arc<Vec<u8>>,
        config: EngineConfig,
    ) -> Self {
        let resolver = Arc::new(AssetResolver::new(Arc::clone(&repo), config.resolver()));
        PosterPipeline {
            repo,
            resolver,
            summarizer,
            limiter,
            font_bytes,
            config,
        }
    }

    pub fn resolver(&self) -> &AssetResolver {
        &self.resolver
    }

    /// Run the whole pipeline for one request.
    ///
    /// Returns `Err` only for rejected requests (validation, rate limit);
    /// everything past admission degrades into the report instead.
    #[tracing::instrument(skip_all, fields(identity = %identity, title = %request.event.title))]
    pub async fn run(&self, identity: &str, request: PosterRequest) -> PosterResult<RunReport> {
        let started = Instant::now();
        if request.kinds.is_empty() {
            return Err(PosterError::validation("no poster kinds requested"));
        }

        // Fail open: a broken limiter backend must not block poster runs.
        match self.limiter.allow(identity).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(PosterError::rate_limited(format!(
                    "identity '{identity}' exceeded its request allowance"
                )));
            }
            Err(err) => warn!(error = %err, "rate limiter unavailable; admitting request"),
        }

        let event_id = event_id(&request.event);
        match tokio::time::timeout(self.config.deadline(), self.run_inner(&request)).await {
            Ok(outcome) => {
                let (posters, validation, warnings, clean) = outcome?;
                let status = if clean && validation.all_present() {
                    RunStatus::Success
                } else {
                    RunStatus::PartialSuccess
                };
                Ok(RunReport {
                    status,
                    event_id,
                    posters,
                    validation,
                    warnings,
                    elapsed: started.elapsed(),
                })
            }
            Err(_) => {
                let err = PosterError::DeadlineExceeded(self.config.deadline());
                warn!(event_id = %event_id, error = %err, "run exceeded deadline");
                Ok(RunReport {
                    status: RunStatus::Timeout,
                    event_id,
                    posters: Vec::new(),
                    validation: ValidationReport::default(),
                    warnings: vec![format!("{err}; no posters were produced")],
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    async fn run_inner(
        &self,
        request: &PosterRequest,
    ) -> PosterResult<(Vec<Poster>, ValidationReport, Vec<String>, bool)> {
        let mut warnings = Vec::new();
        let mut clean = true;

        // Extracted.
        let location = request_location(&request.event);
        let speaker_names = speaker_names(request);
        debug!(
            speakers = speaker_names.len(),
            location = location.is_some(),
            "entities extracted"
        );

        // Validated: one resolution batch covers the whole run.
        let validation = validate::validate(&self.resolver, location.as_ref(), &speaker_names).await;
        warnings.extend(validation.warnings.iter().cloned());

        // Resolved: summarize while assets are already known.
        let summary = match self
            .summarizer
            .summarize(&request.event.description, self.config.summary_max_chars)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "summarizer failed; using original description");
                warnings.push(format!("summarizer unavailable: {err}"));
                clamp_to_chars(&request.event.description, self.config.summary_max_chars)
            }
        };

        let pixels = self
            .fetch_pixels(&validation.entries, &mut warnings)
            .await;

        // LaidOut + Rendered: one blocking worker per poster.
        let jobs = self.build_jobs(request, &location, &speaker_names, &summary, &pixels, &mut warnings);
        let canvas = self.config.canvas();
        let palette = self.config.palette;
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let font_bytes = Arc::clone(&self.font_bytes);
                tokio::task::spawn_blocking(move || run_job(job, canvas, palette, font_bytes))
            })
            .collect();

        let mut posters = Vec::new();
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(poster)) => posters.push(poster),
                Ok(Err(err)) => {
                    warn!(error = %err, "poster render failed");
                    warnings.push(format!("poster render failed: {err}"));
                    clean = false;
                }
                Err(err) => {
                    warn!(error = %err, "render worker panicked");
                    warnings.push("render worker panicked".to_string());
                    clean = false;
                }
            }
        }

        // Stored.
        let event_id = event_id(&request.event);
        for poster in &mut posters {
            let name = upload_name(poster, &location, &event_id);
            match self
                .repo
                .upload(&name, "image/png", poster.bytes.as_ref().clone())
                .await
            {
                Ok(url) => poster.url = Some(url),
                Err(err) => {
                    warn!(error = %err, name, "poster upload failed");
                    warnings.push(format!("upload of '{name}' failed: {err}"));
                    clean = false;
                }
            }
        }

        Ok((posters, validation, warnings, clean))
    }

    async fn fetch_pixels(
        &self,
        entries: &BTreeMap<AssetKey, crate::model::ResolvedAsset>,
        warnings: &mut Vec<String>,
    ) -> BTreeMap<AssetKey, PreparedImage> {
        let fetches = entries.values().filter_map(|resolved| {
            let url = resolved.url.clone()?;
            let key = resolved.key.clone();
            Some(async move { (key, self.repo.fetch(&url).await) })
        });

        let mut pixels = BTreeMap::new();
        for (key, fetched) in join_all(fetches).await {
            match fetched.and_then(|bytes| decode_image(&bytes)) {
                Ok(img) => {
                    pixels.insert(key, img);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "asset fetch failed; using placeholder");
                    warnings.push(format!("asset '{key}' could not be loaded: {err}"));
                }
            }
        }
        pixels
    }

    fn build_jobs(
        &self,
        request: &PosterRequest,
        location: &Option<Location>,
        speaker_names: &[String],
        summary: &str,
        pixels: &BTreeMap<AssetKey, PreparedImage>,
        warnings: &mut Vec<String>,
    ) -> Vec<RenderJob> {
        let landmark = location.as_ref().and_then(|loc| {
            pixels
                .get(&AssetKey::Landmark {
                    city: loc.city.clone(),
                    country: loc.country.clone(),
                })
                .cloned()
        });
        let overlay = pixels.get(&AssetKey::Overlay).cloned();
        let photo_of = |name: &String| {
            pixels
                .get(&AssetKey::SpeakerPhoto { name: name.clone() })
                .cloned()
        };

        let mut jobs = Vec::new();
        for kind in &request.kinds {
            match kind {
                PosterKind::General => jobs.push(RenderJob {
                    kind: *kind,
                    speaker_name: None,
                    speaker_count: speaker_names.len(),
                    texts: poster_texts(&request.event, summary, &self.config, *kind),
                    inputs: RenderInputs {
                        landmark: landmark.clone(),
                        overlay: overlay.clone(),
                        speaker_photos: speaker_names.iter().map(photo_of).collect(),
                        speakers: speaker_names.to_vec(),
                    },
                }),
                PosterKind::Theme => jobs.push(RenderJob {
                    kind: *kind,
                    speaker_name: None,
                    speaker_count: speaker_names.len(),
                    texts: poster_texts(&request.event, summary, &self.config, *kind),
                    inputs: RenderInputs {
                        landmark: landmark.clone(),
                        overlay: overlay.clone(),
                        speaker_photos: Vec::new(),
                        speakers: Vec::new(),
                    },
                }),
                PosterKind::Speaker => {
                    if speaker_names.is_empty() {
                        warnings.push(
                            "speaker posters requested but no speakers were found".to_string(),
                        );
                        continue;
                    }
                    for name in speaker_names {
                        jobs.push(RenderJob {
                            kind: *kind,
                            speaker_name: Some(name.clone()),
                            speaker_count: 1,
                            texts: poster_texts(&request.event, summary, &self.config, *kind),
                            inputs: RenderInputs {
                                landmark: landmark.clone(),
                                overlay: overlay.clone(),
                                speaker_photos: vec![photo_of(name)],
                                speakers: vec![name.clone()],
                            },
                        });
                    }
                }
            }
        }
        jobs
    }
}

fn run_job(
    job: RenderJob,
    canvas: crate::layout::Canvas,
    palette: Palette,
    font_bytes: Arc<Vec<u8>>,
) -> PosterResult<Poster> {
    let mut shaper = TextShaper::new(font_bytes)?;
    let plan = compute_layout(canvas, job.kind, job.speaker_count, &job.texts, &mut shaper)?;
    render_poster(
        &plan,
        &job.inputs,
        &palette,
        &mut shaper,
        job.kind,
        job.speaker_name.as_deref(),
    )
}

/// Stable short identifier derived from the event's identity fields.
pub fn event_id(event: &EventDetails) -> String {
    Fingerprint::of_fields([
        event.title.as_str(),
        &event.starts_at.to_rfc3339(),
        event.venue.as_str(),
    ])
    .short()
}

fn request_location(event: &EventDetails) -> Option<Location> {
    match (&event.city, &event.country) {
        (Some(city), Some(country)) => Some(Location {
            city: city.clone(),
            country: country.clone(),
        }),
        _ => extract::extract_location(&event.venue, &event.title),
    }
}

fn speaker_names(request: &PosterRequest) -> Vec<String> {
    if !request.speakers.is_empty() {
        let mut names = Vec::new();
        for speaker in &request.speakers {
            let name = speaker
                .name
                .as_deref()
                .map(extract::proper_case)
                .or_else(|| speaker.bio.as_deref().and_then(extract::extract_name_from_bio));
            match name {
                Some(name) if !names.iter().any(|n: &String| n.eq_ignore_ascii_case(&name)) => {
                    names.push(name);
                }
                _ => {}
            }
        }
        return names;
    }

    match &request.speakers_text {
        Some(text) => extract::extract_speakers(text, request.community_leader.as_deref()),
        None => request
            .community_leader
            .as_deref()
            .map(|leader| vec![extract::proper_case(leader)])
            .unwrap_or_default(),
    }
}

fn poster_texts(
    event: &EventDetails,
    summary: &str,
    config: &EngineConfig,
    kind: PosterKind,
) -> Vec<TextContent> {
    let title = match kind {
        PosterKind::Theme => event.theme.clone().unwrap_or_else(|| event.title.clone()),
        _ => event.title.clone(),
    };
    let mut details = format!(
        "{} | {}",
        event.starts_at.format("%A, %B %e, %Y at %H:%M"),
        event.venue
    );
    if let Some(url) = &event.registration_url {
        details.push_str(&format!(" | {url}"));
    }

    vec![
        TextContent {
            role: TextRole::Title,
            text: title,
        },
        TextContent {
            role: TextRole::Summary,
            text: summary.to_string(),
        },
        TextContent {
            role: TextRole::Details,
            text: details,
        },
        TextContent {
            role: TextRole::Cta,
            text: config.cta_text.clone(),
        },
    ]
}

fn upload_name(poster: &Poster, location: &Option<Location>, event_id: &str) -> String {
    let (city, country) = location
        .as_ref()
        .map(|loc| {
            (
                crate::assets::key::fold_ascii(&loc.city).replace(' ', "-"),
                crate::assets::key::fold_ascii(&loc.country).replace(' ', "-"),
            )
        })
        .unwrap_or_else(|| ("unknown".to_string(), "unknown".to_string()));

    match &poster.speaker_name {
        Some(name) => format!(
            "poster-{city}-{country}-{}-{}-{event_id}.png",
            poster.kind.as_str(),
            crate::assets::key::fold_ascii(name).replace(' ', "-"),
        ),
        None => format!("poster-{city}-{country}-{}-{event_id}.png", poster.kind.as_str()),
    }
}
