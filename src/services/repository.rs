use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{PosterError, PosterResult};
use crate::fingerprint::Fingerprint;
use crate::services::{AssetRepository, MediaItem};

/// Media storage backed by the WordPress REST media API.
pub struct WordPressMediaRepository {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

#[derive(Deserialize)]
struct WpMediaItem {
    id: u64,
    title: WpRendered,
    source_url: String,
}

#[derive(Deserialize)]
struct WpRendered {
    rendered: String,
}

impl WordPressMediaRepository {
    /// `base_url` is the site root, e.g. `https://example.org`.
    /// Uploads require application-password credentials; listing and
    /// fetching work anonymously on public sites.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Option<(String, String)>,
    ) -> Self {
        WordPressMediaRepository {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn media_endpoint(&self) -> String {
        format!("{}/wp-json/wp/v2/media", self.base_url)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, password)) => req.basic_auth(user, Some(password)),
            None => req,
        }
    }
}

#[async_trait]
impl AssetRepository for WordPressMediaRepository {
    async fn list(&self, query: &str, page_size: u32) -> PosterResult<Vec<MediaItem>> {
        let req = self
            .client
            .get(self.media_endpoint())
            .query(&[
                ("search", query),
                ("media_type", "image"),
                ("per_page", &page_size.to_string()),
            ]);
        let resp = self
            .with_auth(req)
            .send()
            .await
            .map_err(|e| PosterError::repository(format!("media listing request: {e}")))?;
        if !resp.status().is_success() {
            return Err(PosterError::repository(format!(
                "media listing returned {}",
                resp.status()
            )));
        }

        let items: Vec<WpMediaItem> = resp
            .json()
            .await
            .map_err(|e| PosterError::repository(format!("media listing body: {e}")))?;
        Ok(items
            .into_iter()
            .map(|item| {
                let id = item.id.to_string();
                let fingerprint = Fingerprint::of_fields([
                    "wp-media",
                    id.as_str(),
                    item.source_url.as_str(),
                ]);
                MediaItem {
                    name: item.title.rendered,
                    fingerprint,
                    url: item.source_url,
                }
            })
            .collect())
    }

    async fn fetch(&self, url: &str) -> PosterResult<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PosterError::repository(format!("asset download request: {e}")))?;
        if !resp.status().is_success() {
            return Err(PosterError::repository(format!(
                "asset download returned {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PosterError::repository(format!("asset download body: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> PosterResult<String> {
        let req = self
            .client
            .post(self.media_endpoint())
            .header(
                reqwest::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            )
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        let resp = self
            .with_auth(req)
            .send()
            .await
            .map_err(|e| PosterError::repository(format!("media upload request: {e}")))?;
        if !resp.status().is_success() {
            return Err(PosterError::repository(format!(
                "media upload returned {}",
                resp.status()
            )));
        }

        #[derive(Deserialize)]
        struct Uploaded {
            source_url: String,
        }
        let uploaded: Uploaded = resp
            .json()
            .await
            .map_err(|e| PosterError::repository(format!("media upload body: {e}")))?;
        Ok(uploaded.source_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let repo = WordPressMediaRepository::new(
            reqwest::Client::new(),
            "https://example.org/",
            None,
        );
        assert_eq!(repo.media_endpoint(), "https://example.org/wp-json/wp/v2/media");
    }

    #[test]
    fn listing_payload_shape_deserializes() {
        let body = r#"[{"title":{"rendered":"Joel Pannikot"},"source_url":"https://cdn/x.jpg","id":7}]"#;
        let items: Vec<WpMediaItem> = serde_json::from_str(body).unwrap();
        assert_eq!(items[0].id, 7);
        assert_eq!(items[0].title.rendered, "Joel Pannikot");
        assert_eq!(items[0].source_url, "https://cdn/x.jpg");
    }
}
