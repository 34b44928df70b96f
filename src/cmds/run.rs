// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! `run` subcommand (§6): loads configuration, opens the database, and
//! serves the pipeline's WebSocket monitor endpoint until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use bpaf::Bpaf;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use base::clock::{Clocks, RealClocks};
use base::Error;

use crate::annotate;
use crate::config::Config;
use crate::detector::{Detector, NullDetector};
use crate::hub::SubscriberHub;
use crate::pipeline::{PipelineDeps, PipelineManager};
use crate::snapshot::{FilesystemSnapshotWriter, SnapshotWriter};
use crate::source::{GstOpener, SourceOpener};
use crate::violation::ViolationTracker;
use crate::web;

/// Runs the compliance pipeline and its monitor WebSocket server.
#[derive(Bpaf, Debug)]
#[bpaf(command("run"))]
pub struct Args {
    /// Path to the TOML configuration file.
    #[bpaf(long("config"), argument("PATH"))]
    config: PathBuf,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let config = Config::load(&args.config)?;

    // Touch the database once up front so a missing/unmigratable schema
    // fails fast, before any camera threads start.
    db::schema::open(&config.db_path)?;

    let font = annotate::load_font(&config.annotation_font_path)?;
    let detector: Arc<dyn Detector> = Arc::new(NullDetector::default());
    let snapshot_writer: Arc<dyn SnapshotWriter> = Arc::new(FilesystemSnapshotWriter::new(
        config.snapshot_root.clone(),
        config.snapshot_base_url.clone(),
    ));
    let hub = SubscriberHub::new();
    let violations = Arc::new(ViolationTracker::new(
        config.tuneables.violation_persistence(),
        config.tuneables.violation_cooldown(),
        config.tuneables.stale_threshold(),
    ));
    let open_source: Arc<dyn SourceOpener> = Arc::new(GstOpener);
    let clocks: Arc<dyn Clocks> = Arc::new(RealClocks::default());

    let deps = PipelineDeps {
        db_path: config.db_path.clone(),
        clocks,
        detector,
        snapshot_writer,
        font,
        hub: Arc::clone(&hub),
        violations,
        tuneables: config.tuneables,
        outbound_jpeg_quality: config.detector.jpeg_quality,
        open_source,
    };
    let pipeline = PipelineManager::new(deps);

    let addr: std::net::SocketAddr = config
        .http_addr
        .parse()
        .map_err(|e| base::err!(InvalidArgument, msg("invalid http_addr {}: {e}", config.http_addr)))?;
    let svc = web::Service::new(config.db_path.clone(), Arc::clone(&pipeline));

    let rt = tokio::runtime::Runtime::new().map_err(Error::from)?;
    rt.block_on(async move {
        let (shutdown_tx, shutdown_rx) = base::shutdown::channel();
        let server = tokio::spawn(web::serve(addr, svc, shutdown_rx));

        let mut int = signal(SignalKind::interrupt()).map_err(Error::from)?;
        let mut term = signal(SignalKind::terminate()).map_err(Error::from)?;
        tokio::select! {
            _ = int.recv() => info!("received SIGINT"),
            _ = term.recv() => info!("received SIGTERM"),
        }

        info!("shutting down");
        drop(shutdown_tx);
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "HTTP server exited with error"),
            Err(join_err) => warn!(%join_err, "HTTP server task panicked"),
        }
        Ok::<(), Error>(())
    })?;

    info!("exiting");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bpaf_invariants() {
        args().check_invariants(false);
    }
}
