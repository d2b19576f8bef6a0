use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::codec::{self, WireRecord};
use crate::config::HordeConfig;
use crate::error::{self, ErrorKind, HordeError, Result};
use crate::output::OutputNaming;
use crate::poll::{PollOptions, PollOutcome};
use crate::transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
use crate::types::*;

/// Async client for the Stable Horde API.
///
/// Cheap to clone; clones share the transport and its connection pool, so
/// one client can drive many job pipelines concurrently.
///
/// # Example
/// ```no_run
/// use stablehorde_rs::{HordeClient, OutputNaming};
///
/// # async fn example() -> stablehorde_rs::Result<()> {
/// let client = HordeClient::new("your-api-key");
/// let output = client
///     .generate("a lighthouse in a storm", &OutputNaming::new("lighthouse"))
///     .await?;
/// println!("Saved {:?}", output.files);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HordeClient {
    transport: Arc<dyn Transport>,
    config: HordeConfig,
}

/// Everything produced by one [`HordeClient::generate`] call.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub job: QueuedJob,
    pub result: JobResult,
    /// One file per generation, in order.
    pub files: Vec<PathBuf>,
}

impl HordeClient {
    /// Create a client for the public horde with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(HordeConfig::with_api_key(api_key))
    }

    /// Create a client from a full config, using the default transport.
    pub fn with_config(config: HordeConfig) -> Self {
        let transport = ReqwestTransport::new(config.request_timeout);
        Self {
            transport: Arc::new(transport),
            config,
        }
    }

    /// Reuse a `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        let transport = ReqwestTransport::new(self.config.request_timeout).with_http_client(client);
        self.transport = Arc::new(transport);
        self
    }

    /// Replace the transport entirely.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Override the API root.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config = self.config.base_url(url);
        self
    }

    /// Returns the configured API root.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn config(&self) -> &HordeConfig {
        &self.config
    }

    // ── Plumbing ────────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn authed(&self, request: TransportRequest) -> TransportRequest {
        request.header("apikey", self.config.api_key.as_str())
    }

    pub(crate) async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let request = request.header("Client-Agent", self.config.client_agent.as_str());
        debug!(
            method = request.method.as_str(),
            url = %request.url,
            body = ?request.body,
            "Requesting horde"
        );
        let resp = self.transport.request(request).await?;
        debug!(status = resp.status, bytes = resp.body.len(), "Horde responded");
        Ok(resp)
    }

    async fn get_record<T>(
        &self,
        request: TransportRequest,
        errors: &[(u16, ErrorKind)],
        subject: &str,
    ) -> Result<T>
    where
        T: DeserializeOwned + WireRecord,
    {
        let resp = self.send(request).await?;
        if !resp.is_success() {
            return Err(error::status_error(errors, resp.status, &resp.body, subject));
        }
        codec::decode_record(&resp.body)
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Submit a generation request. Returns the queued job handle.
    ///
    /// Not retried: any failure is returned to the caller as-is.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<QueuedJob> {
        let body = codec::encode(request)?;
        let req = self.authed(TransportRequest::post(self.url("/generate/async"), body));
        let resp = self.send(req).await?;

        if resp.status != 202 {
            return Err(error::status_error(
                error::SUBMIT_ERRORS,
                resp.status,
                &resp.body,
                &request.prompt,
            ));
        }

        let job: QueuedJob = codec::decode_record(&resp.body)?;
        info!(job = %job.id, kudos = job.kudos, "Generation queued");
        if let Some(message) = &job.message {
            info!(job = %job.id, "Horde says: {}", message);
        }
        Ok(job)
    }

    // ── Job lookups ─────────────────────────────────────────────────

    /// Lightweight status check for a job. Carries no image data.
    pub async fn check(&self, job_id: &str) -> Result<JobStatus> {
        let req = TransportRequest::get(self.url(&format!("/generate/check/{}", job_id)));
        self.get_record(req, error::JOB_LOOKUP_ERRORS, job_id).await
    }

    /// Fetch the finished result for a job, including its generations.
    ///
    /// The horde rate-limits this endpoint separately from
    /// [`check`](Self::check); call it once per completed job.
    pub async fn fetch_result(&self, job_id: &str) -> Result<JobResult> {
        let req = TransportRequest::get(self.url(&format!("/generate/status/{}", job_id)));
        let result: JobResult = self.get_record(req, error::JOB_LOOKUP_ERRORS, job_id).await?;
        info!(
            job = job_id,
            generations = result.generations.len(),
            "Fetched job result"
        );
        Ok(result)
    }

    // ── Account & models ────────────────────────────────────────────

    /// Look up the account that owns the configured API key.
    pub async fn find_user(&self) -> Result<UserDetails> {
        let req = self.authed(TransportRequest::get(self.url("/find_user")));
        self.get_record(req, error::ACCOUNT_ERRORS, "").await
    }

    /// List models currently served by at least one worker.
    pub async fn models(&self) -> Result<Vec<ActiveModel>> {
        let req = TransportRequest::get(self.url("/status/models"));
        self.get_record(req, error::PUBLIC_ERRORS, "").await
    }

    // ── Full pipeline ───────────────────────────────────────────────

    /// Submit, wait for completion, fetch, and save every generation.
    pub async fn generate(
        &self,
        input: impl Into<PromptInput>,
        naming: &OutputNaming,
    ) -> Result<GenerationOutput> {
        self.generate_with(input, naming, &PollOptions::default()).await
    }

    /// [`generate`](Self::generate) with explicit cancellation and timeout.
    pub async fn generate_with(
        &self,
        input: impl Into<PromptInput>,
        naming: &OutputNaming,
        options: &PollOptions,
    ) -> Result<GenerationOutput> {
        let request = input.into().into_request();
        let link_mode = request.is_link_mode();

        if options.is_cancelled() {
            return Err(HordeError::Cancelled);
        }
        let job = self.submit(&request).await?;

        match self.wait_for_completion(&job.id, options).await? {
            PollOutcome::Done(_) => {}
            PollOutcome::Faulted(_) => return Err(HordeError::Faulted(job.id)),
        }

        if options.is_cancelled() {
            return Err(HordeError::Cancelled);
        }
        let result = self.fetch_result(&job.id).await?;
        let files = self
            .save_generations(&result, link_mode, naming, options.cancellation())
            .await?;

        Ok(GenerationOutput { job, result, files })
    }
}
