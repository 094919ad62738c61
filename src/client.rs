//! Stateless REST client for the Helix HTTP API.
//!
//! Every call is fire-once and fail-fast: no retries, no caching. Responses
//! are returned as [`serde_json::Value`] because the service does not publish
//! a schema; callers pick the fields they need.

use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{trim_trailing_slash, HelixConfig};
use crate::error::{HelixError, Result};
use crate::events::CRITICAL_HARMONY;

/// Default `context` for the Eye of Consciousness lookup.
pub const DEFAULT_EYE_CONTEXT: &str = "meditation";
/// Default ritual length.
pub const DEFAULT_RITUAL_STEPS: u32 = 108;

/// Body of `POST /mandelbrot/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinateRequest {
    pub real: f64,
    pub imag: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Body of `POST /api/music/generate`.
///
/// Absent fields are omitted from the serialized JSON body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MusicRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

/// Harmony observed by [`HelixClient::measure_harmony`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonyReading {
    pub harmony: f64,
    pub threshold: f64,
}

impl HarmonyReading {
    pub fn is_healthy(&self) -> bool {
        self.harmony >= self.threshold
    }
}

/// REST client. Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct HelixClient {
    base_url: String,
    http: reqwest::Client,
}

impl HelixClient {
    /// Client for `base_url` with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        HelixClientBuilder::new(base_url).build()
    }

    pub fn from_config(config: &HelixConfig) -> Self {
        HelixClientBuilder::new(config.base_url.clone())
            .connect_timeout(config.connect_timeout)
            .request_timeout(config.request_timeout)
            .build()
    }

    pub fn builder(base_url: impl Into<String>) -> HelixClientBuilder {
        HelixClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build `base_url/seg1/seg2...`, percent-encoding each segment.
    ///
    /// # Errors
    /// [`HelixError::Config`] when the base URL cannot be parsed or cannot
    /// carry a path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| HelixError::Config(format!("invalid base url '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| HelixError::Config(format!("base url '{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// System status including UCF metrics and agent information.
    pub async fn get_status(&self) -> Result<Value> {
        self.get(self.endpoint(&["status"])?, &[]).await
    }

    /// Current Universal Coherence Field metrics.
    pub async fn get_ucf(&self) -> Result<Value> {
        self.get(self.endpoint(&["ucf"])?, &[]).await
    }

    /// All agents with their status.
    pub async fn get_agents(&self) -> Result<Value> {
        self.get(self.endpoint(&["agents"])?, &[]).await
    }

    /// Discovery manifest at `/.well-known/helix.json`.
    pub async fn get_manifest(&self) -> Result<Value> {
        self.get(self.endpoint(&[".well-known", "helix.json"])?, &[]).await
    }

    /// UCF state at the Eye of Consciousness coordinate.
    pub async fn get_eye_of_consciousness(&self, context: &str) -> Result<Value> {
        self.get(self.endpoint(&["mandelbrot", "eye"])?, &[("context", context.to_string())])
            .await
    }

    /// All sacred Mandelbrot coordinates.
    pub async fn get_sacred_points(&self) -> Result<Value> {
        self.get(self.endpoint(&["mandelbrot", "sacred"])?, &[]).await
    }

    /// UCF state at one named sacred coordinate.
    pub async fn get_sacred_point(&self, point_name: &str, context: Option<&str>) -> Result<Value> {
        let query: Vec<(&str, String)> = context
            .map(|c| vec![("context", c.to_string())])
            .unwrap_or_default();
        self.get(self.endpoint(&["mandelbrot", "sacred", point_name])?, &query)
            .await
    }

    /// UCF state for step `step` of a `total_steps` ritual.
    pub async fn get_ritual_step(&self, step: u32, total_steps: u32) -> Result<Value> {
        let step = step.to_string();
        self.get(
            self.endpoint(&["mandelbrot", "ritual", &step])?,
            &[("total_steps", total_steps.to_string())],
        )
        .await
    }

    /// UCF state generated from an arbitrary coordinate.
    pub async fn generate_ucf_from_coordinate(
        &self,
        real: f64,
        imag: f64,
        context: Option<&str>,
    ) -> Result<Value> {
        let body = CoordinateRequest {
            real,
            imag,
            context: context.map(str::to_string),
        };
        self.post(self.endpoint(&["mandelbrot", "generate"])?, Some(&body)).await
    }

    /// Generate music from a text prompt.
    pub async fn generate_music(&self, request: &MusicRequest) -> Result<Value> {
        self.post(self.endpoint(&["api", "music", "generate"])?, Some(request)).await
    }

    /// Fire the Zapier webhook with arbitrary data.
    pub async fn trigger_zapier(&self, data: &Value) -> Result<Value> {
        self.post(self.endpoint(&["api", "trigger-zapier"])?, Some(data)).await
    }

    /// Push the current UCF telemetry to Zapier.
    pub async fn send_telemetry_to_zapier(&self) -> Result<Value> {
        self.post::<Value>(self.endpoint(&["api", "zapier", "telemetry"])?, None)
            .await
    }

    /// `Ok(false)` when harmony is below `critical_threshold`.
    ///
    /// A response without a numeric `harmony` counts as fully harmonious.
    pub async fn check_harmony_threshold(&self, critical_threshold: f64) -> Result<bool> {
        Ok(self.measure_harmony(critical_threshold).await?.is_healthy())
    }

    /// Fetch the UCF once and compare its harmony against `critical_threshold`.
    pub async fn measure_harmony(&self, critical_threshold: f64) -> Result<HarmonyReading> {
        let ucf = self.get_ucf().await?;
        let reading = HarmonyReading {
            harmony: harmony_of(&ucf),
            threshold: critical_threshold,
        };
        if !reading.is_healthy() {
            warn!(
                harmony = reading.harmony,
                critical_threshold, "Harmony below critical threshold"
            );
        }
        Ok(reading)
    }

    async fn get(&self, url: Url, query: &[(&str, String)]) -> Result<Value> {
        debug!(url = %url, "GET");
        let mut request = self.http.get(url.clone());
        if !query.is_empty() {
            request = request.query(query);
        }
        let resp = request.send().await.map_err(|e| HelixError::Connect {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        read_json(resp, url).await
    }

    async fn post<B: Serialize + ?Sized>(&self, url: Url, body: Option<&B>) -> Result<Value> {
        debug!(url = %url, "POST");
        let mut request = self.http.post(url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await.map_err(|e| HelixError::Connect {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        read_json(resp, url).await
    }
}

async fn read_json(resp: reqwest::Response, url: Url) -> Result<Value> {
    if !resp.status().is_success() {
        return Err(HelixError::Http {
            status: resp.status().as_u16(),
            url: url.to_string(),
        });
    }

    let bytes = resp.bytes().await.map_err(|e| HelixError::Json {
        field: "body".into(),
        detail: e.to_string(),
    })?;

    serde_json::from_slice(&bytes).map_err(|e| HelixError::Json {
        field: "body".into(),
        detail: e.to_string(),
    })
}

/// `harmony` from a UCF response, defaulting to 1.0.
pub fn harmony_of(ucf: &Value) -> f64 {
    ucf.get("harmony").and_then(Value::as_f64).unwrap_or(1.0)
}

/// Whether `harmony` is below the default critical threshold.
pub fn is_harmony_critical(harmony: f64) -> bool {
    harmony < CRITICAL_HARMONY
}

/// Builder for [`HelixClient`].
pub struct HelixClientBuilder {
    base_url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl HelixClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(&base_url.into()),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Override the TCP connect timeout (default 3 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the per-request timeout (default 10 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> HelixClient {
        // reqwest::Client::builder() can fail in extreme environments;
        // fall back to a default client instead of panicking.
        let http = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .unwrap_or_default();

        HelixClient {
            base_url: self.base_url,
            http,
        }
    }
}
