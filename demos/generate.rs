//! Generate an image on Stable Horde and save it next to the working directory.
//!
//! Reads the API key from `STABLE_HORDE_API_KEY` (anonymous if unset).
//! Ctrl-C cancels the wait cleanly.
//!
//! ```sh
//! RUST_LOG=stablehorde_rs=debug cargo run --example generate -- "a cat wearing a tiny hat"
//! ```

use std::time::Duration;

use stablehorde_rs::{
    GenerationParams, GenerationRequest, HordeClient, HordeConfig, OutputNaming, PollOptions,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Futuristic cyberpunk landscape, 8k, hyper realistic, cinematic".into());

    let client = HordeClient::with_config(HordeConfig::from_env()?);

    match client.find_user().await {
        Ok(user) => println!("Logged in as {} ({} kudos)", user.username, user.kudos),
        Err(e) => eprintln!("Could not look up account: {}", e),
    }

    let models = client.models().await?;
    println!("{} models online", models.len());

    let request = GenerationRequest::new(prompt)
        .params(GenerationParams::new().size(512, 512).steps(25).count(2));

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let options = PollOptions::new()
        .with_cancellation(cancel)
        .with_timeout(Duration::from_secs(900));
    let output = client
        .generate_with(request, &OutputNaming::timestamped("."), &options)
        .await?;

    println!("Job {} cost {} kudos", output.job.id, output.job.kudos);
    for (generation, path) in output.result.generations.iter().zip(&output.files) {
        println!(
            "Saved {} (model {}, seed {}, worker {})",
            path.display(),
            generation.model,
            generation.seed,
            generation.worker_name
        );
    }

    Ok(())
}
