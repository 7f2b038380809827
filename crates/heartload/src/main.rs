use heartload::engine::dialer::RandomDialer;
use heartload::engine::listener::Listener;
use heartload::metrics::{MetricsSink, PrometheusSink};
use heartload_common::Config;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::convert::Infallible;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config/heartload_config.yaml";

fn init_production_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();

    info!("Production structured logging initialized (JSON)");
}

fn metrics_response(req: &Request<Body>, sink: &PrometheusSink) -> Response<Body> {
    match req.uri().path() {
        "/health" => Response::new(Body::from("OK")),
        "/metrics" => Response::new(Body::from(sink.render())),
        _ => {
            let mut not_found = Response::new(Body::from("Not Found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            not_found
        }
    }
}

async fn run_metrics_server(port: u16, sink: Arc<PrometheusSink>) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let make_svc = make_service_fn(move |_conn| {
        let sink = Arc::clone(&sink);
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let response = metrics_response(&req, &sink);
                async move { Ok::<_, Infallible>(response) }
            }))
        }
    });

    let server = Server::bind(&addr).serve(make_svc);

    info!(port = port, "Observability server online");

    if let Err(e) = server.await {
        error!(error = %e, "Observability server failed");
    }
}

/// Logs a control loop that ended by panicking or being aborted.
/// Returns whether the loop returned normally.
fn report_loop_exit(name: &str, joined: Result<(), JoinError>) -> bool {
    match joined {
        Ok(()) => true,
        Err(e) => {
            error!(task = name, error = %e, "Control loop failed");
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_production_logging();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config_data = fs::read_to_string(&config_path)?;
    let config: Config = serde_yaml::from_str(&config_data)?;
    config.validate()?;

    let master_token = CancellationToken::new();
    let tracker = TaskTracker::new();
    let prometheus = Arc::new(PrometheusSink::new());
    let sink: Arc<dyn MetricsSink> = prometheus.clone();

    if config.metrics.enabled {
        let port = config.metrics.port;
        tokio::spawn(async move {
            run_metrics_server(port, prometheus).await;
        });
    }

    let socket = TcpListener::bind(&config.listener.listen_address).await?;
    info!(
        listen_addr = %config.listener.listen_address,
        max_conns = config.listener.max_conns,
        heartbeat_ms = config.listener.heartbeat_interval_ms,
        "Heartload listener started"
    );

    let listener = Listener::new(socket, &config.listener, Arc::clone(&sink), tracker.clone());
    let listener_token = master_token.clone();
    let listener_task = tokio::spawn(listener.run(listener_token));

    let dialer = RandomDialer::new(&config.dialer, Arc::clone(&sink), tracker.clone());
    let dialer_token = master_token.clone();
    let dialer_task = tokio::spawn(dialer.run(dialer_token));
    info!(target_addr = %config.dialer.target_address, "Random dialer started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    master_token.cancel();
    tracker.close();

    report_loop_exit("listener", listener_task.await);
    report_loop_exit("dialer", dialer_task.await);
    info!(outstanding = tracker.len(), "Control loops stopped");

    Ok(())
}
