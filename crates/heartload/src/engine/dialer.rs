//! Randomized client traffic.
//!
//! Each tick starts one trial. A trial either abandons its fresh connection
//! ("bad dial") or answers every request with `PONG` until its randomly drawn
//! TTL runs out.

use crate::engine::classify::{classify, ErrorClass};
use crate::engine::deadline::{read_before, write_before};
use crate::error::{Result, SimError};
use crate::metrics::{MetricsSink, DIAL_FAILURES, TOTAL_DIALS};
use heartload_common::DialerConfig;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

pub const RESPONSE_PAYLOAD: &[u8] = b"PONG";
pub const REQUEST_BUF_LEN: usize = 16;

/// How a trial that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    /// The connection was opened and left alone.
    Abandoned,
    /// The exchange ran until the TTL deadline passed.
    Expired,
}

pub struct RandomDialer {
    target: Arc<str>,
    delay: Duration,
    min_ttl_ms: u64,
    max_ttl_ms: u64,
    bad_dial_chance: f64,
    abandon_linger: Duration,
    sink: Arc<dyn MetricsSink>,
    tracker: TaskTracker,
}

impl RandomDialer {
    pub fn new(config: &DialerConfig, sink: Arc<dyn MetricsSink>, tracker: TaskTracker) -> Self {
        Self {
            target: Arc::from(config.target_address.as_str()),
            delay: config.dial_interval(),
            min_ttl_ms: config.min_ttl_ms.min(config.max_ttl_ms),
            max_ttl_ms: config.max_ttl_ms.max(config.min_ttl_ms),
            bad_dial_chance: if config.bad_dial_chance.is_nan() {
                0.0
            } else {
                config.bad_dial_chance.clamp(0.0, 1.0)
            },
            abandon_linger: config.abandon_linger(),
            sink,
            tracker,
        }
    }

    /// Draws the parameters of the next trial.
    pub fn next_trial(&self) -> DialTrial {
        let mut rng = rand::thread_rng();
        let ttl = if rng.gen_bool(self.bad_dial_chance) {
            None
        } else {
            Some(Duration::from_millis(
                rng.gen_range(self.min_ttl_ms..=self.max_ttl_ms),
            ))
        };

        DialTrial {
            target: Arc::clone(&self.target),
            ttl,
            abandon_linger: self.abandon_linger,
            tracker: self.tracker.clone(),
        }
    }

    /// Starts one trial per tick until `cancel` fires.
    ///
    /// Trials already running are left to finish on their own.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.delay, self.delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Dialer shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    let trial = self.next_trial();
                    let kind = if trial.is_bad() { "bad" } else { "good" };
                    self.sink.inc_labeled(TOTAL_DIALS, kind);

                    let sink = Arc::clone(&self.sink);
                    self.tracker.spawn(async move {
                        if let Err(e) = trial.run().await {
                            sink.inc_counter(DIAL_FAILURES);
                            error!(error = %e, "Can't dial");
                        }
                    });
                }
            }
        }
    }
}

/// One randomized dial attempt.
pub struct DialTrial {
    target: Arc<str>,
    /// `None` marks a bad dial.
    ttl: Option<Duration>,
    abandon_linger: Duration,
    tracker: TaskTracker,
}

impl DialTrial {
    pub fn new(
        target: &str,
        ttl: Option<Duration>,
        abandon_linger: Duration,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            target: Arc::from(target),
            ttl,
            abandon_linger,
            tracker,
        }
    }

    pub fn is_bad(&self) -> bool {
        self.ttl.is_none()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Dials the target and plays the trial out.
    ///
    /// A timeout is the normal end of a good trial and is not an error.
    pub async fn run(self) -> Result<TrialOutcome> {
        let mut conn = TcpStream::connect(&*self.target)
            .await
            .map_err(|source| SimError::Dial {
                addr: self.target.to_string(),
                source,
            })?;

        let Some(ttl) = self.ttl else {
            self.abandon(conn);
            return Ok(TrialOutcome::Abandoned);
        };

        let err = exchange(&mut conn, ttl).await;
        drop(conn);

        match classify(&err) {
            ErrorClass::Timeout => {
                debug!(target_addr = %self.target, ttl_ms = ttl.as_millis() as u64, "Trial expired");
                Ok(TrialOutcome::Expired)
            }
            ErrorClass::Unknown => Err(err),
        }
    }

    /// Keeps the socket open and unread for a while, then drops it.
    fn abandon(&self, conn: TcpStream) {
        let linger = self.abandon_linger;
        self.tracker.spawn(async move {
            tokio::time::sleep(linger).await;
            drop(conn);
        });
    }
}

/// Answers requests with `PONG` until a read or write fails, and returns that failure.
async fn exchange(conn: &mut TcpStream, ttl: Duration) -> SimError {
    let deadline = Instant::now() + ttl;
    let mut chunk = [0u8; REQUEST_BUF_LEN];

    loop {
        let n = match read_before(conn, &mut chunk, deadline).await {
            Ok(0) => return SimError::PeerClosed,
            Ok(n) => n,
            Err(e) => return SimError::Exchange(e),
        };

        debug!(request = %String::from_utf8_lossy(&chunk[..n]), "Request received");

        if let Err(e) = write_before(conn, RESPONSE_PAYLOAD, deadline).await {
            return SimError::Exchange(e);
        }
    }
}
