use crate::error::Error;
use crate::request;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Run parameters, loaded once from a JSON file and shared read-only
/// by every worker.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub request_number: usize,
    pub workers: usize,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| Error::ParseConfig {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.request_number == 0 {
            return Err(Error::NonPositive {
                field: "request_number",
            });
        }
        if self.workers == 0 {
            return Err(Error::NonPositive { field: "workers" });
        }
        if self.timeout == 0 {
            return Err(Error::NonPositive { field: "timeout" });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn method(&self) -> Result<Method, Error> {
        self.method
            .parse()
            .map_err(|_| Error::InvalidMethod(self.method.clone()))
    }

    pub fn header_map(&self) -> Result<HeaderMap, Error> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidHeader { name: name.clone() })?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::InvalidHeader { name: name.clone() })?;
            map.insert(header, value);
        }
        Ok(map)
    }
}

/// The validated, ready-to-send form of a RunConfig. Built exactly once
/// before any worker spawns, so an unsupported content type aborts the
/// run before a single request goes out.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

impl RequestPlan {
    pub fn from_config(config: &RunConfig) -> Result<Self, Error> {
        let method = config.method()?;
        let body = request::build_body(&method, &config.headers, &config.data)?;
        Ok(Self {
            method,
            url: config.url.clone(),
            body,
        })
    }
}

/// One worker's record of a completed request attempt. The latency is
/// only meaningful when success is true.
#[derive(Debug)]
pub struct Outcome {
    pub success: bool,
    pub latency: Duration,
}

/// Accumulated counts and latencies, owned exclusively by the
/// aggregator task. Latency figures cover successful attempts only.
#[derive(Debug)]
pub struct RunStatistics {
    successes: usize,
    failures: usize,
    max_latency: Duration,
    // sentinel until the first success replaces it
    min_latency: Duration,
    total_latency: Duration,
    run_duration: Duration,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            successes: 0,
            failures: 0,
            max_latency: Duration::ZERO,
            min_latency: Duration::MAX,
            total_latency: Duration::ZERO,
            run_duration: Duration::ZERO,
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        if outcome.success {
            self.successes += 1;
            self.total_latency += outcome.latency;
            self.max_latency = self.max_latency.max(outcome.latency);
            self.min_latency = self.min_latency.min(outcome.latency);
        } else {
            self.failures += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.successes + self.failures
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn max_latency(&self) -> Option<Duration> {
        (self.successes > 0).then_some(self.max_latency)
    }

    pub fn min_latency(&self) -> Option<Duration> {
        (self.successes > 0).then_some(self.min_latency)
    }

    /// None when no attempt succeeded; the summary reports that case
    /// instead of dividing by zero.
    pub fn mean_latency(&self) -> Option<Duration> {
        let successes = u32::try_from(self.successes).ok().filter(|&n| n > 0)?;
        Some(self.total_latency / successes)
    }

    pub fn run_duration(&self) -> Duration {
        self.run_duration
    }

    pub fn set_run_duration(&mut self, elapsed: Duration) {
        self.run_duration = elapsed;
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "    total requests: {}", self.total())?;
        writeln!(f, "    successful:     {}", self.successes)?;
        writeln!(f, "    failed:         {}", self.failures)?;
        match (self.max_latency(), self.min_latency(), self.mean_latency()) {
            (Some(max), Some(min), Some(mean)) => {
                writeln!(f, "    max latency:    {max:?}")?;
                writeln!(f, "    min latency:    {min:?}")?;
                writeln!(f, "    mean latency:   {mean:?}")?;
            }
            _ => {
                writeln!(f, "    latency:        n/a (no successful requests)")?;
            }
        }
        write!(f, "    run duration:   {:?}", self.run_duration)
    }
}
