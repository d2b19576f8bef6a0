//! Waiting for a queued job to finish.
//!
//! The loop honours the horde's `wait_time` hint between checks. The horde
//! throttles status polling, so the hint is never shortened; the configured
//! default is used only when the hint is absent or zero.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::HordeClient;
use crate::error::{HordeError, Result};
use crate::types::JobStatus;

/// Lifecycle of a job as seen by the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Polling,
    Done,
    Faulted,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Faulted)
    }

    /// The state a check result moves the job into. `faulted` wins over `done`.
    pub fn after(status: &JobStatus) -> Self {
        if status.faulted {
            JobState::Faulted
        } else if status.done {
            JobState::Done
        } else {
            JobState::Polling
        }
    }
}

/// Terminal outcome of [`HordeClient::wait_for_completion`].
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// All generations finished. Holds the final check.
    Done(JobStatus),
    /// The horde gave up on the job. Holds the check that reported it.
    Faulted(JobStatus),
}

impl PollOutcome {
    pub fn state(&self) -> JobState {
        match self {
            PollOutcome::Done(_) => JobState::Done,
            PollOutcome::Faulted(_) => JobState::Faulted,
        }
    }

    pub fn status(&self) -> &JobStatus {
        match self {
            PollOutcome::Done(s) | PollOutcome::Faulted(s) => s,
        }
    }
}

/// Cancellation and deadline for one wait.
#[derive(Debug, Clone, Default)]
pub struct PollOptions {
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
    default_wait: Option<Duration>,
}

impl PollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop polling when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Give up with [`HordeError::TimedOut`] after `timeout`. Overrides the
    /// client's configured timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait used when the horde omits `wait_time`. Overrides the client's
    /// configured default.
    pub fn with_default_wait(mut self, wait: Duration) -> Self {
        self.default_wait = Some(wait);
        self
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|c| c.is_cancelled())
            .unwrap_or(false)
    }
}

/// Stand-in for "no wake-up" when a wait or deadline overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + span`, or `None` when that is past what the clock can represent.
fn instant_after(span: Duration) -> Option<Instant> {
    Instant::now().checked_add(span)
}

/// Seconds to wait after a non-terminal check.
fn next_wait(status: &JobStatus, default_wait: Duration) -> Duration {
    match status.wait_time {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => default_wait,
    }
}

impl HordeClient {
    /// Poll `/generate/check` until the job is done or faulted.
    ///
    /// There is no iteration cap. Cancellation and the deadline are checked
    /// before every status check and before every wait, and interrupt a
    /// wait in progress. A 404 fails with [`HordeError::JobNotFound`] and is
    /// not retried.
    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        options: &PollOptions,
    ) -> Result<PollOutcome> {
        self.wait_for_completion_with(job_id, options, |_| {}).await
    }

    /// Like [`wait_for_completion`](Self::wait_for_completion), calling
    /// `on_status` with every check result.
    pub async fn wait_for_completion_with<F>(
        &self,
        job_id: &str,
        options: &PollOptions,
        mut on_status: F,
    ) -> Result<PollOutcome>
    where
        F: FnMut(&JobStatus),
    {
        let never = CancellationToken::new();
        let cancel = options.cancel.as_ref().unwrap_or(&never);
        let deadline = options
            .timeout
            .or(self.config().timeout)
            .and_then(instant_after);
        let default_wait = options.default_wait.unwrap_or(self.config().default_wait);

        let mut state = JobState::Submitted;
        let mut checks: u32 = 0;
        let mut warned_unservable = false;

        loop {
            guard(cancel, deadline, job_id)?;

            let status = self.check(job_id).await?;
            checks += 1;
            on_status(&status);

            let next = JobState::after(&status);
            if next != state {
                info!(job = job_id, from = ?state, to = ?next, checks, "Job state changed");
                state = next;
            }

            match state {
                JobState::Faulted => {
                    warn!(job = job_id, checks, "Job faulted");
                    return Ok(PollOutcome::Faulted(status));
                }
                JobState::Done => return Ok(PollOutcome::Done(status)),
                JobState::Submitted | JobState::Polling => {}
            }

            if !status.is_possible && !warned_unservable {
                warn!(
                    job = job_id,
                    "No worker can currently serve this job; it will wait until one appears"
                );
                warned_unservable = true;
            }

            let wait = next_wait(&status, default_wait);
            debug!(
                job = job_id,
                finished = status.finished,
                processing = status.processing,
                waiting = status.waiting,
                queue_position = status.queue_position,
                wait_secs = wait.as_secs_f64(),
                "Job still running"
            );

            guard(cancel, deadline, job_id)?;
            pause(wait, cancel, deadline, job_id).await?;
        }
    }
}

fn guard(cancel: &CancellationToken, deadline: Option<Instant>, job_id: &str) -> Result<()> {
    if cancel.is_cancelled() {
        info!(job = job_id, "Polling cancelled");
        return Err(HordeError::Cancelled);
    }
    if deadline.is_some_and(|d| Instant::now() >= d) {
        warn!(job = job_id, "Polling timed out");
        return Err(HordeError::TimedOut);
    }
    Ok(())
}

/// Sleep for `wait`, cut short by cancellation or the deadline.
async fn pause(
    wait: Duration,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    job_id: &str,
) -> Result<()> {
    let wake = instant_after(wait.min(FAR_FUTURE)).unwrap_or_else(Instant::now);
    let (until, hits_deadline) = match deadline {
        Some(d) if d < wake => (d, true),
        _ => (wake, false),
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            info!(job = job_id, "Polling cancelled");
            Err(HordeError::Cancelled)
        }
        _ = tokio::time::sleep_until(until) => {
            if hits_deadline {
                warn!(job = job_id, "Polling timed out");
                Err(HordeError::TimedOut)
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn status(done: bool, faulted: bool, wait_time: Option<u64>) -> JobStatus {
        JobStatus {
            finished: 0,
            processing: 1,
            restarted: 0,
            waiting: 0,
            done,
            faulted,
            wait_time,
            queue_position: 0,
            kudos: 0.0,
            is_possible: true,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_faulted_wins_over_done() {
        assert_eq!(JobState::after(&status(true, true, None)), JobState::Faulted);
        assert_eq!(JobState::after(&status(true, false, None)), JobState::Done);
        assert_eq!(JobState::after(&status(false, false, None)), JobState::Polling);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Faulted.is_terminal());
        assert!(!JobState::Polling.is_terminal());
        assert!(!JobState::Submitted.is_terminal());
    }

    #[test]
    fn test_next_wait_uses_hint() {
        let default = Duration::from_secs(1);
        assert_eq!(next_wait(&status(false, false, Some(5)), default), Duration::from_secs(5));
        assert_eq!(next_wait(&status(false, false, None), default), default);
        assert_eq!(next_wait(&status(false, false, Some(0)), default), default);
    }

    #[test]
    fn test_poll_options() {
        let token = CancellationToken::new();
        let options = PollOptions::new()
            .with_cancellation(token.clone())
            .with_timeout(Duration::from_secs(60));
        assert!(!options.is_cancelled());
        token.cancel();
        assert!(options.is_cancelled());
        assert!(!PollOptions::default().is_cancelled());
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = PollOutcome::Faulted(status(false, true, None));
        assert_eq!(outcome.state(), JobState::Faulted);
        assert!(outcome.status().faulted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_times_out_at_deadline() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let deadline = Some(start + Duration::from_secs(2));
        let result = pause(Duration::from_secs(10), &cancel, deadline, "j").await;
        assert!(matches!(result, Err(HordeError::TimedOut)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_returns_after_wait() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        pause(Duration::from_secs(3), &cancel, None, "j").await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_huge_wait_still_meets_deadline() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let deadline = Some(start + Duration::from_secs(1));
        let result = pause(Duration::MAX, &cancel, deadline, "j").await;
        assert!(matches!(result, Err(HordeError::TimedOut)));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[test]
    fn test_overflowing_span_is_no_instant() {
        assert!(instant_after(Duration::MAX).is_none());
        assert!(instant_after(Duration::from_secs(1)).is_some());
    }

    #[tokio::test]
    async fn test_pause_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pause(Duration::from_secs(3600), &cancel, None, "j").await;
        assert!(matches!(result, Err(HordeError::Cancelled)));
    }
}
