use crate::{controller::load_intent, log, Controller, LogFormat, LogRuleEngine};
use anyhow::{Context, Result};
use clap::Parser;
use netmaster_core::MemStore;
use netmaster_state::StateConfig;
use prometheus_client::registry::Registry;
use std::{path::PathBuf, sync::Arc};
use tokio::time;
use tracing::{info, info_span};

#[derive(Debug, Parser)]
#[clap(name = "netmaster", about = "A container network control plane")]
pub struct Args {
    #[clap(long, default_value = "netmaster=info,warn", env = "NETMASTER_LOG")]
    log_level: String,

    #[clap(
        long,
        value_enum,
        default_value = "plain",
        env = "NETMASTER_LOG_FORMAT"
    )]
    log_format: LogFormat,

    /// Desired configuration, as JSON. Re-read before every pass.
    #[clap(long, env = "NETMASTER_INTENT")]
    intent: PathBuf,

    /// Loads the state store from this file at startup and saves it after
    /// every pass.
    #[clap(long, env = "NETMASTER_STATE_SNAPSHOT")]
    state_snapshot: Option<PathBuf>,

    /// Gives every endpoint group on a VLAN network its own VLAN.
    #[clap(long, env = "NETMASTER_FABRIC_MODE")]
    fabric_mode: bool,

    #[clap(long, default_value = "10", env = "NETMASTER_RECONCILE_INTERVAL_SECS")]
    reconcile_interval_secs: u64,

    /// Runs a single pass and exits.
    #[clap(long, env = "NETMASTER_ONCE")]
    once: bool,

    /// Writes metrics to stdout after every pass.
    #[clap(long, env = "NETMASTER_PRINT_METRICS")]
    print_metrics: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            intent,
            state_snapshot,
            fabric_mode,
            reconcile_interval_secs,
            once,
            print_metrics,
        } = self;

        log::init(&log_level, log_format)?;

        let store = match state_snapshot.as_deref().filter(|p| p.exists()) {
            Some(path) => {
                let store = MemStore::load_snapshot(path)?;
                info!(path = %path.display(), records = store.len(), "Loaded state snapshot");
                Arc::new(store)
            }
            None => Arc::new(MemStore::new()),
        };

        let mut prom = Registry::with_prefix("netmaster");
        let controller = Controller::new(
            store.clone(),
            StateConfig { fabric_mode },
            Arc::new(LogRuleEngine::default()),
            &mut prom,
        );
        match controller.restore() {
            Ok(0) => {}
            Ok(n) => info!(attachments = n, "Restored policy attachments"),
            Err(error) => tracing::error!(%error, "Failed to restore policy attachments"),
        }

        let period = time::Duration::from_secs(reconcile_interval_secs.max(1));
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }

            let _span = info_span!("reconcile").entered();
            match load_intent(&intent) {
                Ok(config) => match controller.apply(&config) {
                    Ok(()) => info!("Reconciled"),
                    Err(error) => tracing::warn!(%error, "Reconciled with failures"),
                },
                Err(error) => {
                    tracing::error!(error = %format!("{error:#}"), "Failed to load intent")
                }
            }

            if let Some(path) = state_snapshot.as_deref() {
                store
                    .save_snapshot(path)
                    .with_context(|| format!("failed to save snapshot to {}", path.display()))?;
            }
            if print_metrics {
                let mut out = String::new();
                prometheus_client::encoding::text::encode(&mut out, &prom)?;
                print!("{out}");
            }

            if once {
                break;
            }
        }

        Ok(())
    }
}
