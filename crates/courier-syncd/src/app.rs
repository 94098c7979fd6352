//! Daemon wiring: the webhook listener plus the three queue drain loops.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use apply_worker::{ApplyConfig, ApplyPass};
use courier_client::CourierClient;
use export_worker::{BuilderConfig, BuilderPass, DispatchConfig, DispatchPass};
use order_store::{MemoryOrderStore, OrderStore};
use sync_config::{Config, Paths};
use sync_database::Database;
use tracing::{info, warn};
use webhook_intake::{router, IntakeState};

pub async fn run(config: Config, paths: Paths, db_path: PathBuf) -> anyhow::Result<()> {
    paths.ensure_dirs()?;

    info!(
        environment = config.environment.as_str(),
        database = %db_path.display(),
        "starting courier sync daemon"
    );

    let db = Arc::new(Database::open(&db_path)?);

    // Local-mode order store. A deployment against the real ERP swaps in
    // its OrderStore implementation here.
    let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());

    let credentials = config.active_credentials();
    let client = CourierClient::new(&credentials.base_url, &credentials.api_key);

    let builder = BuilderPass::new(
        db.clone(),
        store.clone(),
        BuilderConfig {
            batch_size: config.build_batch_size,
            preferred_carrier: config.preferred_carrier.clone(),
            swap_return_locations: config.swap_return_locations,
        },
    );
    let dispatcher = DispatchPass::new(
        db.clone(),
        client,
        store.clone(),
        DispatchConfig {
            batch_size: config.dispatch_batch_size,
            ..Default::default()
        },
    );
    let apply = ApplyPass::new(
        db.clone(),
        store.clone(),
        ApplyConfig {
            batch_size: config.apply_batch_size,
            tracking_base_url: config.tracking_base_url.clone(),
            ..Default::default()
        },
    );

    let intake = router(IntakeState {
        db: db.clone(),
        api_key: config.webhook_secret.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "webhook listener bound");

    let build_interval = Duration::from_secs(config.build_interval_secs);
    let build_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(build_interval);
        loop {
            interval.tick().await;
            match builder.run_pass() {
                Ok(claimed) if claimed > 0 => {
                    info!(claimed, "builder pass finished");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "builder pass failed"),
            }
        }
    });

    let dispatch_interval = Duration::from_secs(config.dispatch_interval_secs);
    let dispatch_batch = config.dispatch_batch_size;
    let dispatch_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(dispatch_interval);
        loop {
            interval.tick().await;
            // A full batch means backlog: drain again immediately.
            loop {
                match dispatcher.run_pass().await {
                    Ok(picked) if picked >= dispatch_batch => {
                        info!(picked, "dispatch batch full, draining again");
                    }
                    Ok(picked) => {
                        if picked > 0 {
                            info!(picked, "dispatch pass finished");
                        }
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "dispatch pass failed");
                        break;
                    }
                }
            }
        }
    });

    let apply_interval = Duration::from_secs(config.apply_interval_secs);
    let apply_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(apply_interval);
        loop {
            interval.tick().await;
            match apply.run_pass().await {
                Ok(picked) if picked > 0 => {
                    info!(picked, "apply pass finished");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "apply pass failed"),
            }
        }
    });

    tokio::select! {
        result = axum::serve(listener, intake) => {
            result.context("webhook server exited")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    build_loop.abort();
    dispatch_loop.abort();
    apply_loop.abort();
    Ok(())
}
