use tracing::{debug, info, warn};

use super::{ImageTaskApi, TaskId, TaskStatus};
use crate::config::PollPolicy;
use crate::errors::ClientError;

/// Polls `task_id` until it reaches a terminal state or the attempt budget
/// runs out, and returns the result image URL.
///
/// Queries are strictly sequential: query, wait `policy.interval`, query.
/// Every successful query reports its progress (clamped to `[0, 1]`, never
/// decreasing) through `on_progress`. `FAILED` ends the loop at once.
/// Retryable query errors are absorbed and retried on the same interval,
/// except on the final allowed attempt where they propagate. API envelope
/// errors count as transient unless the status is 999, which fails at once.
///
/// Dropping the returned future stops polling at the next suspension point.
pub async fn poll_image(
    api: &dyn ImageTaskApi,
    task_id: &TaskId,
    policy: &PollPolicy,
    mut on_progress: impl FnMut(f64),
) -> Result<String, ClientError> {
    let mut reported = 0.0_f64;
    for attempt in 1..=policy.max_attempts {
        let last_attempt = attempt == policy.max_attempts;
        match api.query(task_id).await {
            Ok(job) => {
                reported = reported.max(job.progress.clamp(0.0, 1.0));
                on_progress(reported);
                match job.status {
                    TaskStatus::Success => {
                        info!(%task_id, attempt, "image job succeeded");
                        return job.result_url.ok_or_else(|| ClientError::MissingResult {
                            task_id: task_id.to_string(),
                        });
                    }
                    TaskStatus::Failed => {
                        warn!(%task_id, attempt, "image job failed");
                        return Err(ClientError::GenerationFailed {
                            task_id: task_id.to_string(),
                        });
                    }
                    status => {
                        debug!(%task_id, attempt, ?status, progress = reported, "image job pending");
                    }
                }
            }
            Err(err) if err.is_retryable() && !last_attempt => {
                warn!(%task_id, attempt, error = %err, "image status query failed, retrying");
            }
            Err(err) => return Err(err),
        }
        if !last_attempt {
            tokio::time::sleep(policy.interval).await;
        }
    }
    warn!(%task_id, attempts = policy.max_attempts, "image job timed out");
    Err(ClientError::Timeout {
        attempts: policy.max_attempts,
    })
}
