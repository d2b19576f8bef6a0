//! Typed records for the Stable Horde v2 wire schema.
//!
//! Request records are written by this crate, so they reject unknown fields
//! and omit every unset optional field when encoded. Response records mark
//! each field as either required (absence is a decode error) or defaulted
//! (the default is stated on the field). Fields the schema does not name are
//! kept in `extra` rather than dropped.

use std::collections::BTreeMap;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ── Requests ────────────────────────────────────────────────────────

/// An image generation request for `POST /generate/async`.
///
/// # Example
/// ```
/// use stablehorde_rs::{GenerationParams, GenerationRequest};
///
/// let request = GenerationRequest::new("a lighthouse in a storm")
///     .params(GenerationParams::new().size(512, 768).steps(30))
///     .models(["stable_diffusion"])
///     .link_mode(true);
///
/// assert!(request.is_link_mode());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<GenerationParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfw: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_workers: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub censor_nsfw: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_processing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mask: Option<String>,
    /// Link-mode: finished images come back as download URLs instead of
    /// inline base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2: Option<bool>,
}

impl GenerationRequest {
    /// Create a request with only a prompt set.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            params: None,
            nsfw: None,
            trusted_workers: None,
            censor_nsfw: None,
            workers: None,
            models: None,
            source_image: None,
            source_processing: None,
            source_mask: None,
            r2: None,
        }
    }

    pub fn params(mut self, params: GenerationParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn nsfw(mut self, enabled: bool) -> Self {
        self.nsfw = Some(enabled);
        self
    }

    pub fn trusted_workers(mut self, enabled: bool) -> Self {
        self.trusted_workers = Some(enabled);
        self
    }

    pub fn censor_nsfw(mut self, enabled: bool) -> Self {
        self.censor_nsfw = Some(enabled);
        self
    }

    /// Restrict the job to the given worker ids.
    pub fn workers<I, S>(mut self, workers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workers = Some(workers.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict the job to the given model names.
    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Set a base64-encoded source image for img2img.
    pub fn source_image(mut self, image_b64: impl Into<String>) -> Self {
        self.source_image = Some(image_b64.into());
        self
    }

    /// Set the source processing mode ("img2img", "inpainting", "outpainting").
    pub fn source_processing(mut self, mode: impl Into<String>) -> Self {
        self.source_processing = Some(mode.into());
        self
    }

    pub fn source_mask(mut self, mask_b64: impl Into<String>) -> Self {
        self.source_mask = Some(mask_b64.into());
        self
    }

    /// Ask for download links instead of inline base64 images.
    pub fn link_mode(mut self, enabled: bool) -> Self {
        self.r2 = Some(enabled);
        self
    }

    /// Whether finished images will be returned as links.
    pub fn is_link_mode(&self) -> bool {
        self.r2.unwrap_or(false)
    }
}

/// Sampling parameters nested under `params`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampler_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denoising_strength: Option<f64>,
    /// Seeds are strings on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_variation: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_processing: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub karras: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    /// Number of images to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loras: Option<Vec<LoraAdjustment>>,
}

impl GenerationParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampler (e.g. "k_euler", "k_dpmpp_2m").
    pub fn sampler(mut self, sampler: impl Into<String>) -> Self {
        self.sampler_name = Some(sampler.into());
        self
    }

    pub fn cfg_scale(mut self, cfg: f64) -> Self {
        self.cfg_scale = Some(cfg);
        self
    }

    pub fn denoising_strength(mut self, strength: f64) -> Self {
        self.denoising_strength = Some(strength);
        self
    }

    pub fn seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Set output dimensions.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn seed_variation(mut self, variation: u32) -> Self {
        self.seed_variation = Some(variation);
        self
    }

    /// Append a post-processor (e.g. "GFPGAN", "RealESRGAN_x4plus").
    pub fn post_processor(mut self, name: impl Into<String>) -> Self {
        self.post_processing
            .get_or_insert_with(Vec::new)
            .push(name.into());
        self
    }

    pub fn karras(mut self, enabled: bool) -> Self {
        self.karras = Some(enabled);
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Set the number of images to generate.
    pub fn count(mut self, n: u32) -> Self {
        self.n = Some(n);
        self
    }

    /// Append a LoRA adjustment.
    pub fn lora(mut self, lora: LoraAdjustment) -> Self {
        self.loras.get_or_insert_with(Vec::new).push(lora);
        self
    }
}

/// A LoRA applied on top of the base model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoraAdjustment {
    pub name: String,
    /// Strength applied to the model weights.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<f64>,
    /// Strength applied to the CLIP weights.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip: Option<f64>,
    /// Trigger word to inject into the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_trigger: Option<String>,
}

impl LoraAdjustment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: None,
            clip: None,
            inject_trigger: None,
        }
    }

    pub fn model_strength(mut self, strength: f64) -> Self {
        self.model = Some(strength);
        self
    }

    pub fn clip_strength(mut self, strength: f64) -> Self {
        self.clip = Some(strength);
        self
    }

    pub fn inject_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.inject_trigger = Some(trigger.into());
        self
    }
}

/// Input accepted by [`HordeClient::generate`](crate::HordeClient::generate).
#[derive(Debug, Clone, PartialEq)]
pub enum PromptInput {
    /// A bare prompt; every other field is left to the horde's defaults.
    Raw(String),
    Structured(GenerationRequest),
}

impl PromptInput {
    /// Resolve into the request that will be submitted.
    pub fn into_request(self) -> GenerationRequest {
        match self {
            PromptInput::Raw(prompt) => GenerationRequest::new(prompt),
            PromptInput::Structured(request) => request,
        }
    }
}

impl From<&str> for PromptInput {
    fn from(prompt: &str) -> Self {
        PromptInput::Raw(prompt.to_string())
    }
}

impl From<String> for PromptInput {
    fn from(prompt: String) -> Self {
        PromptInput::Raw(prompt)
    }
}

impl From<GenerationRequest> for PromptInput {
    fn from(request: GenerationRequest) -> Self {
        PromptInput::Structured(request)
    }
}

// ── Responses ───────────────────────────────────────────────────────

/// Handle for a job accepted by `POST /generate/async` (HTTP 202).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueuedJob {
    /// Required.
    pub id: String,
    /// Estimated cost. Defaults to 0.0 when absent.
    #[serde(default)]
    pub kudos: f64,
    /// Optional warning from the horde.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lightweight progress snapshot from `GET /generate/check/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobStatus {
    /// Required.
    pub finished: u32,
    /// Required.
    pub processing: u32,
    /// Required.
    pub restarted: u32,
    /// Required.
    pub waiting: u32,
    /// Required. Accepts `true`/`false` or `1`/`0`.
    #[serde(deserialize_with = "flag")]
    pub done: bool,
    /// Required. Accepts `true`/`false` or `1`/`0`.
    #[serde(deserialize_with = "flag")]
    pub faulted: bool,
    /// Suggested seconds before the next check. `None` when absent.
    #[serde(default)]
    pub wait_time: Option<u64>,
    /// Defaults to 0 when absent.
    #[serde(default)]
    pub queue_position: u32,
    /// Defaults to 0.0 when absent.
    #[serde(default)]
    pub kudos: f64,
    /// Whether any worker can serve the job. Defaults to `true` when absent.
    #[serde(default = "default_true")]
    pub is_possible: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full result from `GET /generate/status/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobResult {
    #[serde(flatten)]
    pub status: JobStatus,
    /// Ordered as the horde returns them. Defaults to empty when absent.
    #[serde(default)]
    pub generations: Vec<Generation>,
}

/// One finished image.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Generation {
    /// Required.
    pub worker_id: String,
    /// Required.
    pub worker_name: String,
    /// Required.
    pub model: String,
    /// Required. Base64 webp, or a download URL in link-mode.
    pub img: String,
    /// Required. A string on the wire.
    pub seed: String,
    /// Generation id. `None` when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Defaults to `false` when absent.
    #[serde(default)]
    pub censored: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Account metadata from `GET /find_user`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserDetails {
    /// Required.
    pub username: String,
    /// Defaults to 0 when absent.
    #[serde(default)]
    pub id: u64,
    /// Defaults to 0.0 when absent.
    #[serde(default)]
    pub kudos: f64,
    /// Defaults to 0 when absent.
    #[serde(default)]
    pub concurrency: u32,
    /// Defaults to 0 when absent.
    #[serde(default)]
    pub worker_count: u32,
    /// Defaults to `false` when absent.
    #[serde(default)]
    pub trusted: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Availability of one model from `GET /status/models`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActiveModel {
    /// Required.
    pub name: String,
    /// Workers serving the model. Defaults to 0 when absent.
    #[serde(default)]
    pub count: u32,
    /// Defaults to 0.0 when absent.
    #[serde(default)]
    pub performance: f64,
    /// Queued megapixelsteps. Defaults to 0.0 when absent.
    #[serde(default)]
    pub queued: f64,
    /// Estimated seconds to clear the queue. Defaults to 0 when absent.
    #[serde(default)]
    pub eta: u64,
    /// "image" or "text". `None` when absent.
    #[serde(default, rename = "type")]
    pub model_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Generic error body (`{"message": ...}`) for 401, 429, 503.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestError {
    /// Required.
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Validation error body for HTTP 400.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestValidationError {
    /// Required.
    pub message: String,
    /// Field path to message. Defaults to empty when absent.
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestValidationError {
    pub(crate) fn from_message(message: String) -> Self {
        Self {
            message,
            errors: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Booleans, plus the integers 0 and 1. Anything else is an error.
fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(u64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(n) => Err(de::Error::custom(format!(
            "expected a boolean or 0/1, got {}",
            n
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_input_from_str() {
        let input: PromptInput = "a red fox".into();
        assert_eq!(input, PromptInput::Raw("a red fox".to_string()));
        assert_eq!(input.into_request(), GenerationRequest::new("a red fox"));
    }

    #[test]
    fn test_prompt_input_structured() {
        let request = GenerationRequest::new("a red fox").nsfw(false);
        let input = PromptInput::from(request.clone());
        assert_eq!(input.into_request(), request);
    }

    #[test]
    fn test_link_mode_defaults_off() {
        assert!(!GenerationRequest::new("x").is_link_mode());
        assert!(GenerationRequest::new("x").link_mode(true).is_link_mode());
        assert!(!GenerationRequest::new("x").link_mode(false).is_link_mode());
    }

    #[test]
    fn test_params_builders_accumulate_lists() {
        let params = GenerationParams::new()
            .post_processor("GFPGAN")
            .post_processor("RealESRGAN_x4plus")
            .lora(LoraAdjustment::new("detail").model_strength(0.8))
            .lora(LoraAdjustment::new("style"));
        assert_eq!(
            params.post_processing,
            Some(vec!["GFPGAN".to_string(), "RealESRGAN_x4plus".to_string()])
        );
        assert_eq!(params.loras.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_job_status_accepts_integer_flags() {
        let status: JobStatus = serde_json::from_str(
            r#"{"finished":0,"processing":1,"restarted":0,"waiting":0,
                "done":0,"faulted":0,"wait_time":3}"#,
        )
        .unwrap();
        assert!(!status.done);
        assert!(!status.faulted);
        assert_eq!(status.wait_time, Some(3));
        assert_eq!(status.queue_position, 0);
        assert!(status.is_possible);
    }

    #[test]
    fn test_job_status_rejects_other_integers() {
        let result = serde_json::from_str::<JobStatus>(
            r#"{"finished":0,"processing":0,"restarted":0,"waiting":0,
                "done":2,"faulted":false}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_job_status_requires_done() {
        let result = serde_json::from_str::<JobStatus>(
            r#"{"finished":0,"processing":0,"restarted":0,"waiting":0,"faulted":false}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_job_status_keeps_unknown_fields() {
        let status: JobStatus = serde_json::from_str(
            r#"{"finished":1,"processing":0,"restarted":0,"waiting":0,
                "done":true,"faulted":false,"shared":true}"#,
        )
        .unwrap();
        assert_eq!(status.extra.get("shared"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_job_result_generations() {
        let result: JobResult = serde_json::from_str(
            r#"{
            "finished": 1, "processing": 0, "restarted": 0, "waiting": 0,
            "done": true, "faulted": false, "wait_time": 0,
            "queue_position": 0, "kudos": 10.0, "is_possible": true,
            "generations": [{
                "worker_id": "w-1", "worker_name": "alpha",
                "model": "stable_diffusion", "img": "AA==", "seed": "1234",
                "id": "gen-1", "censored": false, "state": "ok"
            }]
        }"#,
        )
        .unwrap();
        assert!(result.status.done);
        assert_eq!(result.status.kudos, 10.0);
        assert_eq!(result.generations.len(), 1);
        let generation = &result.generations[0];
        assert_eq!(generation.worker_name, "alpha");
        assert_eq!(generation.seed, "1234");
        assert_eq!(generation.id.as_deref(), Some("gen-1"));
        assert_eq!(generation.extra.get("state"), Some(&Value::from("ok")));
        assert!(result.status.extra.is_empty());
    }

    #[test]
    fn test_generation_requires_string_seed() {
        let result = serde_json::from_str::<Generation>(
            r#"{"worker_id":"w","worker_name":"n","model":"m","img":"","seed":42}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_active_model_type_rename() {
        let model: ActiveModel = serde_json::from_str(
            r#"{"name":"Deliberate","count":12,"performance":1.5,"queued":0,"eta":4,"type":"image"}"#,
        )
        .unwrap();
        assert_eq!(model.name, "Deliberate");
        assert_eq!(model.count, 12);
        assert_eq!(model.model_type.as_deref(), Some("image"));
        assert!(model.extra.is_empty());
    }
}
