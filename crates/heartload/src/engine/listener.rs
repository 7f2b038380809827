use crate::engine::admission::AdmissionPool;
use crate::engine::supervisor::ConnectionSupervisor;
use crate::error::SimError;
use crate::metrics::{MetricsSink, ACTIVE_CONNECTIONS, TOTAL_CONNECTIONS};
use heartload_common::ListenerConfig;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Source of inbound connections.
pub trait Acceptor: Send + 'static {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Waits for the next connection and returns it with a printable peer identity.
    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Conn, String)>> + Send;
}

impl Acceptor for TcpListener {
    type Conn = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, addr) = TcpListener::accept(self).await?;
        Ok((stream, addr.to_string()))
    }
}

/// Admission-controlled accept loop.
///
/// A connection is only accepted once a token has been withdrawn from the
/// pool; the token travels with the connection into its supervisor. While
/// waiting in `accept` the token is only reserved, so `AdmissionPool::in_flight`
/// reports exactly the supervised connections.
pub struct Listener<A: Acceptor> {
    acceptor: A,
    pool: AdmissionPool,
    supervisor: Arc<ConnectionSupervisor>,
    sink: Arc<dyn MetricsSink>,
    tracker: TaskTracker,
}

impl<A: Acceptor> Listener<A> {
    pub fn new(
        acceptor: A,
        config: &ListenerConfig,
        sink: Arc<dyn MetricsSink>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            acceptor,
            pool: AdmissionPool::new(config.max_conns),
            supervisor: Arc::new(ConnectionSupervisor::new(
                config.heartbeat_interval(),
                Arc::clone(&sink),
            )),
            sink,
            tracker,
        }
    }

    pub fn pool(&self) -> &AdmissionPool {
        &self.pool
    }

    /// Accepts connections until `cancel` fires.
    ///
    /// Supervisors already spawned keep running; they observe the same
    /// signal on their own.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let token = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Listener shutting down");
                    return;
                }
                token = self.pool.withdraw() => match token {
                    Some(token) => token,
                    None => {
                        warn!("Admission pool closed, listener stopping");
                        return;
                    }
                },
            };

            let accepted = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Listener shutting down");
                    return;
                }
                res = self.acceptor.accept() => res,
            };

            match accepted {
                Ok((conn, peer)) => {
                    let mut token = token;
                    token.admit();
                    self.sink.inc_counter(TOTAL_CONNECTIONS);
                    self.sink.add_gauge(ACTIVE_CONNECTIONS, 1);
                    debug!(
                        client = %peer,
                        in_flight = self.pool.in_flight(),
                        "Connection admitted"
                    );

                    let supervisor = Arc::clone(&self.supervisor);
                    let cancel = cancel.clone();
                    self.tracker.spawn(async move {
                        supervisor.supervise(conn, peer, token, cancel).await;
                    });
                }
                Err(e) => {
                    let err = SimError::Accept(e);
                    error!(error = %err, "Can't process connection token");
                    drop(token);
                }
            }
        }
    }
}
