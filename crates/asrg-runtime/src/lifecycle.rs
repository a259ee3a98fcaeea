//! Process lifecycle: startup ordering, listener binding, and graceful
//! shutdown (spec §4.9).
//!
//! Startup order: validate configuration, construct and warm up the
//! Inference Worker, start the Scheduler, bind both listeners, mark ready.
//! Shutdown: a SIGINT/SIGTERM handler stops admitting new connections,
//! stops the Scheduler, and waits for outstanding sessions to flush, up to
//! `shutdown_deadline_s`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use asrg_core::GatewayConfig;
use asrg_scheduler::{InferenceWorker, MicroBatchScheduler};
use asrg_wire::grpc;
use asrg_wire::{AppState, GatewayState};
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs the gateway to completion: binds both listeners, serves until a
/// shutdown signal arrives, then drains and exits.
///
/// Mirrors the bind-then-report, spawn-then-await-signal shape used
/// elsewhere in this codebase for standalone server processes.
pub async fn run(config: GatewayConfig, worker: Arc<dyn InferenceWorker>) -> Result<()> {
    config.validate().context("invalid configuration")?;

    warm_up(worker.as_ref()).context("inference worker warm-up failed")?;

    let scheduler = Arc::new(MicroBatchScheduler::new(
        config.queue_maxsize(),
        config.window_ms,
        config.max_batch,
    ));
    scheduler.start(Arc::clone(&worker));

    let config = Arc::new(config);
    let state: AppState = Arc::new(GatewayState::new(Arc::clone(&config), Arc::clone(&scheduler)));

    let ws_addr: SocketAddr = format!("{}:{}", config.host, config.ws_port)
        .parse()
        .context("invalid ws bind address")?;
    let ws_listener = TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("failed to bind ws listener on {ws_addr}"))?;
    let ws_addr = ws_listener.local_addr()?;

    let grpc_addr: SocketAddr = format!("{}:{}", config.host, config.grpc_port)
        .parse()
        .context("invalid grpc bind address")?;

    let shutdown = CancellationToken::new();

    let ws_router = asrg_wire::ws::router(Arc::clone(&state));
    let ws_shutdown = shutdown.clone();
    let ws_task = tokio::spawn(async move {
        axum::serve(ws_listener, ws_router)
            .with_graceful_shutdown(async move { ws_shutdown.cancelled().await })
            .await
    });

    let grpc_service = grpc::service(Arc::clone(&state));
    let grpc_shutdown = shutdown.clone();
    let grpc_task = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(grpc_service)
            .serve_with_shutdown(grpc_addr, async move { grpc_shutdown.cancelled().await })
            .await
    });

    info!(%ws_addr, %grpc_addr, model_id = %config.model_id, "gateway ready");

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining in-flight sessions");
    shutdown.cancel();

    let deadline = Duration::from_secs_f64(config.shutdown_deadline_s);
    match tokio::time::timeout(deadline, async {
        let _ = ws_task.await;
        let _ = grpc_task.await;
    })
    .await
    {
        Ok(()) => info!("listeners stopped cleanly"),
        Err(_) => warn!(deadline_s = config.shutdown_deadline_s, "shutdown deadline elapsed, exiting anyway"),
    }

    scheduler.stop().await;
    info!("gateway shut down");
    Ok(())
}

/// Runs a short synthetic batch through the Worker before the process is
/// marked ready, so a broken model load surfaces as a startup error rather
/// than as the first request's failure.
fn warm_up(worker: &dyn InferenceWorker) -> Result<()> {
    let silence = vec![0.0_f32; 1_600];
    worker
        .run_batch(&[silence], &[16_000])
        .map_err(|e| anyhow::anyhow!(e))
        .context("worker warm-up batch failed")?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
