//! Heartbeat supervision of one accepted connection.
//!
//! Every heartbeat interval the server writes `PING` and waits, until the same
//! interval has elapsed, for the peer's answer. A peer that closes cleanly
//! ends the connection with `success`; anything else ends it with the
//! classified error. A peer that stops answering is dropped one interval
//! after the PING it ignored.

use crate::engine::admission::AdmissionToken;
use crate::engine::classify::{classify, ErrorClass};
use crate::engine::deadline::{read_before, write_before};
use crate::error::{Result, SimError};
use crate::metrics::{MetricsSink, ACTIVE_CONNECTIONS, STATUS_SUCCESS, TOTAL_DISCONNECTIONS};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub const HEARTBEAT_PAYLOAD: &[u8] = b"PING";
pub const RESPONSE_BUF_LEN: usize = 16;

/// How a supervised connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    Success,
    Timeout,
    UnknownError,
}

impl Disconnect {
    pub fn as_label(self) -> &'static str {
        match self {
            Disconnect::Success => STATUS_SUCCESS,
            Disconnect::Timeout => ErrorClass::Timeout.as_label(),
            Disconnect::UnknownError => ErrorClass::Unknown.as_label(),
        }
    }

    fn from_error(err: &SimError) -> Self {
        if matches!(err, SimError::PeerClosed) {
            return Disconnect::Success;
        }
        match classify(err) {
            ErrorClass::Timeout => Disconnect::Timeout,
            ErrorClass::Unknown => Disconnect::UnknownError,
        }
    }
}

pub struct ConnectionSupervisor {
    heartbeat: Duration,
    sink: Arc<dyn MetricsSink>,
}

impl ConnectionSupervisor {
    pub fn new(heartbeat: Duration, sink: Arc<dyn MetricsSink>) -> Self {
        Self { heartbeat, sink }
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Runs the heartbeat loop until the connection fails or `cancel` fires.
    ///
    /// Returns the recorded outcome, or `None` when stopped by cancellation.
    /// In both cases the connection is closed and `token` goes back to its
    /// pool; counters are only touched when an outcome is recorded.
    pub async fn supervise<S>(
        &self,
        mut conn: S,
        peer: String,
        mut token: AdmissionToken,
        cancel: CancellationToken,
    ) -> Option<Disconnect>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        token.admit();
        let mut ticker = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(client = %peer, "Supervisor cancelled, closing connection");
                    drop(conn);
                    drop(token);
                    return None;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.ping(&mut conn, &peer).await {
                        let outcome = Disconnect::from_error(&e);
                        match outcome {
                            Disconnect::Success => debug!(client = %peer, "Successfully disconnected"),
                            _ => error!(client = %peer, error = %e, "Can't ping"),
                        }
                        break outcome;
                    }
                }
            }
        };

        self.sink.inc_labeled(TOTAL_DISCONNECTIONS, outcome.as_label());
        drop(conn);
        self.sink.add_gauge(ACTIVE_CONNECTIONS, -1);
        drop(token);

        Some(outcome)
    }

    async fn ping<S>(&self, conn: &mut S, peer: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let deadline = Instant::now() + self.heartbeat;
        write_before(conn, HEARTBEAT_PAYLOAD, deadline)
            .await
            .map_err(SimError::Ping)?;

        let mut chunk = [0u8; RESPONSE_BUF_LEN];
        let n = read_before(conn, &mut chunk, deadline)
            .await
            .map_err(SimError::Ping)?;
        if n == 0 {
            return Err(SimError::PeerClosed);
        }

        debug!(
            client = %peer,
            answer = %String::from_utf8_lossy(&chunk[..n]),
            "Ping request answered"
        );
        Ok(())
    }
}
