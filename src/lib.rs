//! # stablehorde-rs
//!
//! Async Rust client for [Stable Horde](https://stablehorde.net), the
//! crowdsourced Stable Diffusion cluster.
//!
//! Covers the full lifecycle of an image job: submission, status polling
//! that honours the horde's suggested wait, result retrieval, and decoding
//! finished images (inline base64 or download links) to files. HTTP goes
//! through a pluggable [`Transport`], so one client and its connection pool
//! can be shared by many concurrent jobs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stablehorde_rs::{
//!     GenerationParams, GenerationRequest, HordeClient, OutputNaming, PollOptions,
//! };
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> stablehorde_rs::Result<()> {
//! let client = HordeClient::new("your-api-key");
//!
//! let request = GenerationRequest::new("futuristic cyberpunk landscape, 8k")
//!     .params(GenerationParams::new().size(512, 512).steps(30));
//!
//! let cancel = CancellationToken::new();
//! let options = PollOptions::new()
//!     .with_cancellation(cancel.clone())
//!     .with_timeout(Duration::from_secs(600));
//!
//! let output = client
//!     .generate_with(request, &OutputNaming::new("cyberpunk"), &options)
//!     .await?;
//! for path in &output.files {
//!     println!("Saved {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Step by step
//!
//! ```no_run
//! use stablehorde_rs::{HordeClient, GenerationRequest, OutputNaming, PollOptions, PollOutcome};
//!
//! # async fn example() -> stablehorde_rs::Result<()> {
//! let client = HordeClient::new("your-api-key");
//! let request = GenerationRequest::new("a quiet harbour at dawn").link_mode(true);
//!
//! let job = client.submit(&request).await?;
//! match client.wait_for_completion(&job.id, &PollOptions::default()).await? {
//!     PollOutcome::Done(_) => {
//!         let result = client.fetch_result(&job.id).await?;
//!         let naming = OutputNaming::new("harbour");
//!         client.save_generations(&result, true, &naming, None).await?;
//!     }
//!     PollOutcome::Faulted(_) => eprintln!("job {} faulted", job.id),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod output;
pub mod poll;
pub mod transport;
pub mod types;

pub use client::{GenerationOutput, HordeClient};
pub use config::HordeConfig;
pub use error::{HordeError, Result};
pub use output::OutputNaming;
pub use poll::{JobState, PollOptions, PollOutcome};
pub use transport::{Method, ReqwestTransport, Transport, TransportRequest, TransportResponse};
pub use types::{
    ActiveModel, Generation, GenerationParams, GenerationRequest, JobResult, JobStatus,
    LoraAdjustment, PromptInput, QueuedJob, UserDetails,
};
