//! Bounded-time reachability check for remote resources.
//!
//! The probe issues a single GET and collapses every failure mode (DNS, TCP,
//! TLS, HTTP status, timeout) into [`Reachability::Unreachable`].  It never
//! returns an error and never blocks past its timeout.

use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};

/// Default upper bound for a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Some tile servers reject requests without a browser-like User-Agent.
pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Outcome of a reachability probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn is_reachable(self) -> bool {
        matches!(self, Reachability::Reachable)
    }
}

/// Connectivity check against a remote URL.
///
/// Implementations must return within `timeout` (plus scheduling slack) and
/// must not panic; the pipeline calls this at most once per batch run.
pub trait ReachabilityProbe: Send + Sync {
    fn probe(&self, url: &str, timeout: Duration) -> Reachability;
}

/// Probe backed by a blocking `reqwest` client.
#[derive(Clone, Debug, Default)]
pub struct HttpProbe;

impl HttpProbe {
    pub fn new() -> Self {
        Self
    }
}

impl ReachabilityProbe for HttpProbe {
    fn probe(&self, url: &str, timeout: Duration) -> Reachability {
        let started = Instant::now();

        let client = match reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                debug!("Probe client for {} could not be built: {}", url, err);
                return Reachability::Unreachable;
            }
        };

        let outcome = client.get(url).send();
        let elapsed = started.elapsed();

        match outcome {
            Ok(response) if response.status().is_success() && elapsed < timeout => {
                debug!("Probe {} reachable in {:?}", url, elapsed);
                Reachability::Reachable
            }
            Ok(response) => {
                debug!(
                    "Probe {} answered {} after {:?}; treating as unreachable",
                    url,
                    response.status(),
                    elapsed
                );
                Reachability::Unreachable
            }
            Err(err) => {
                debug!("Probe {} failed after {:?}: {}", url, elapsed, err);
                Reachability::Unreachable
            }
        }
    }
}
