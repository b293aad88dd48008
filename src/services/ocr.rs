//! OCR helper for captcha images.
//!
//! Thin client for an OCR server exposing `POST /ocr/base64`. Every failure
//! yields an empty string; there are no retries and no caching.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use reqwest::header::{COOKIE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Image to recognise: either a URL to download or an already encoded image.
#[derive(Debug, Clone, Default)]
pub struct CaptchaRequest {
    pub image_url: Option<String>,
    pub image_b64: Option<String>,
    /// Cookie header used when downloading `image_url`
    pub cookie: Option<String>,
    /// User agent used when downloading `image_url`
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    image_b64: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    res: Option<String>,
}

pub struct OcrClient {
    endpoint: Option<String>,
    client: Client,
}

impl OcrClient {
    /// Client for the OCR server at `host`; `None` or an empty host disables it.
    pub fn new(host: Option<&str>) -> Self {
        let endpoint = host
            .map(|h| h.trim().trim_end_matches('/'))
            .filter(|h| !h.is_empty())
            .map(|h| format!("{h}/ocr/base64"));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { endpoint, client }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Recognised captcha text, or an empty string.
    pub async fn captcha_text(&self, request: &CaptchaRequest) -> String {
        let Some(endpoint) = &self.endpoint else {
            return String::new();
        };

        let mut image_b64 = request.image_b64.clone().filter(|b| !b.is_empty());
        if let Some(url) = request.image_url.as_deref().filter(|u| !u.is_empty()) {
            match self.download(url, request).await {
                Some(bytes) if !bytes.is_empty() => image_b64 = Some(BASE64.encode(bytes)),
                Some(_) => return String::new(),
                None => {}
            }
        }
        let Some(image_b64) = image_b64 else {
            return String::new();
        };

        let resp = match self
            .client
            .post(endpoint)
            .json(&OcrRequest {
                image_b64: &image_b64,
            })
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "OCR server returned an error");
                return String::new();
            }
            Err(e) => {
                warn!(error = %e, "OCR request failed");
                return String::new();
            }
        };

        match resp.json::<OcrResponse>().await {
            Ok(body) => body.res.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "OCR server returned an unreadable response");
                String::new()
            }
        }
    }

    async fn download(&self, url: &str, request: &CaptchaRequest) -> Option<Vec<u8>> {
        let mut builder = self.client.get(url);
        if let Some(cookie) = &request.cookie {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(ua) = &request.user_agent {
            builder = builder.header(USER_AGENT, ua);
        }

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(error = %e, url = %url, "Captcha image download failed");
                return None;
            }
        };
        resp.bytes().await.ok().map(|b| b.to_vec())
    }
}
