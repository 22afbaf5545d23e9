use crate::error::Error;
use crate::model::{Outcome, RequestPlan, RunConfig, RunStatistics};
use crate::worker;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Barrier};
use tokio::task::JoinSet;
use tracing::{info, warn};

const OUTCOME_CHANNEL_CAPACITY: usize = 100;

/// Runs one complete load test: validates the config into a request
/// plan, spawns the aggregator and then the workers, releases the start
/// barrier, and waits for the aggregator to report the final counts.
///
/// Returning drops the worker JoinSet, which aborts whatever requests
/// are still in flight; they are abandoned, not drained.
pub async fn execute(config: &RunConfig) -> Result<RunStatistics, Error> {
    let plan = RequestPlan::from_config(config)?;
    let client = Client::builder()
        .timeout(config.request_timeout())
        .default_headers(config.header_map()?)
        .build()
        .map_err(Error::BuildClient)?;

    let (tx, rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
    // one party per worker, one for the aggregator, one for our own
    // wait below, which doubles as the release
    let barrier = Arc::new(Barrier::new(config.workers + 2));

    // consumer first, so no outcome is ever dropped
    let aggregator = tokio::spawn(aggregate(
        rx,
        config.request_number,
        Arc::clone(&barrier),
    ));

    let mut workers = JoinSet::new();
    for _ in 0..config.workers {
        workers.spawn(worker::worker(
            client.clone(),
            plan.clone(),
            Arc::clone(&barrier),
            tx.clone(),
        ));
    }
    drop(tx);

    barrier.wait().await;
    info!(
        "released {} workers against {}, stopping after {} requests",
        config.workers, config.url, config.request_number
    );

    aggregator.await.map_err(Error::Aggregator)
}

/// Sole consumer of the outcome channel. Waits on the same barrier the
/// workers do, so the run clock starts at the synchronized release, and
/// stops exactly when the target count is reached.
async fn aggregate(
    mut rx: mpsc::Receiver<Outcome>,
    target: usize,
    barrier: Arc<Barrier>,
) -> RunStatistics {
    barrier.wait().await;
    let started = Instant::now();

    let sty = ProgressStyle::with_template("{spinner} {elapsed_precise} {bar:40} {pos}/{len}")
        .unwrap();
    let pb = ProgressBar::new(target as u64);
    pb.set_style(sty);

    let mut stats = RunStatistics::new();
    while stats.total() < target {
        let Some(outcome) = rx.recv().await else {
            warn!(
                "outcome channel closed after {} of {} requests",
                stats.total(),
                target
            );
            break;
        };
        stats.record(outcome);
        pb.inc(1);
    }
    pb.finish_and_clear();

    stats.set_run_duration(started.elapsed());
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_status_server(status_line: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0_u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {}
                        }
                        let response =
                            format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\n\r\n");
                        if stream.write_all(response.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        addr
    }

    /// Closes the first `drop_first` connections without responding,
    /// then serves 200s. Returns the address and the connection count.
    async fn spawn_flaky_server(drop_first: usize) -> (std::net::SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                if seen.fetch_add(1, Ordering::SeqCst) < drop_first {
                    drop(stream);
                    continue;
                }
                tokio::spawn(async move {
                    let mut buf = [0_u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(_) => {}
                        }
                        let response = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n";
                        if stream.write_all(response.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        (addr, connections)
    }

    fn test_config(url: String) -> RunConfig {
        RunConfig {
            request_number: 40,
            workers: 8,
            timeout: 5,
            method: "GET".to_owned(),
            url,
            headers: BTreeMap::new(),
            data: BTreeMap::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn a_healthy_target_yields_only_successes() {
        let addr = spawn_status_server("200 OK").await;
        let config = test_config(format!("http://{addr}/"));

        let stats = execute(&config).await.unwrap();

        assert_eq!(stats.total(), 40);
        assert_eq!(stats.successes(), 40);
        assert_eq!(stats.failures(), 0);
        let mean = stats.mean_latency().unwrap();
        assert!(stats.min_latency().unwrap() <= mean);
        assert!(mean <= stats.max_latency().unwrap());
        assert!(stats.run_duration() > Duration::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn a_failing_target_still_reaches_the_count() {
        let addr = spawn_status_server("500 Internal Server Error").await;
        let config = test_config(format!("http://{addr}/"));

        let stats = execute(&config).await.unwrap();

        assert_eq!(stats.total(), 40);
        assert_eq!(stats.successes(), 0);
        assert_eq!(stats.failures(), 40);
        assert_eq!(stats.mean_latency(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn transport_errors_are_retried_and_never_counted() {
        let (addr, connections) = spawn_flaky_server(5).await;
        let config = test_config(format!("http://{addr}/"));

        let stats = execute(&config).await.unwrap();

        // dropped connections are retried, not recorded as failures
        assert_eq!(stats.total(), 40);
        assert_eq!(stats.successes(), 40);
        assert_eq!(stats.failures(), 0);
        assert!(connections.load(Ordering::SeqCst) > 5);
    }

    #[tokio::test]
    async fn a_closed_channel_ends_aggregation_early() {
        let (tx, rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        let barrier = Arc::new(Barrier::new(2));
        let task = tokio::spawn(aggregate(rx, 10, Arc::clone(&barrier)));
        barrier.wait().await;

        for _ in 0..3 {
            tx.send(Outcome {
                success: true,
                latency: Duration::from_millis(1),
            })
            .await
            .unwrap();
        }
        drop(tx);

        let stats = task.await.unwrap();
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.successes(), 3);
    }

    #[tokio::test]
    async fn an_unsupported_content_type_aborts_before_sending() {
        let mut config = test_config("http://127.0.0.1:9/".to_owned());
        config.method = "PATCH".to_owned();
        config
            .headers
            .insert("Content-Type".to_owned(), "text/plain".to_owned());
        config.data.insert("a".to_owned(), "1".to_owned());

        let err = execute(&config).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedContentType { .. }));
    }
}
