use crate::model::{Outcome, RequestPlan};
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Barrier};
use tracing::warn;

/// One of N identical sending loops. Blocks on the start barrier, then
/// fires requests back to back until the aggregator closes the channel.
///
/// Transport failures (timeout, refused connection, DNS) are logged and
/// retried immediately without producing an Outcome; responses with a
/// non-2xx status count as failed Outcomes.
pub async fn worker(
    client: Client,
    plan: RequestPlan,
    barrier: Arc<Barrier>,
    tx: mpsc::Sender<Outcome>,
) {
    barrier.wait().await;

    loop {
        let mut request = client.request(plan.method.clone(), plan.url.as_str());
        if let Some(body) = &plan.body {
            request = request.body(body.clone());
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("request failed: {err}");
                continue;
            }
        };
        let latency = start.elapsed();

        let outcome = Outcome {
            success: response.status().is_success(),
            latency,
        };
        // the receiver goes away once the target count is reached
        if tx.send(outcome).await.is_err() {
            return;
        }
    }
}
