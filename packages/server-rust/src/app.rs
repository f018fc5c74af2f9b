//! Application assembly: the stock registries plus the GUID and system
//! services and the statistics handler.

use std::sync::Arc;

use tracing::info;

use crate::config::{AppConfig, ServerConfig, StatsConfig};
use crate::counter::{BackgroundWorker, CounterStore, ExpirySweep, KeySpace, MemoryCounterStore};
use crate::dispatch::{Dispatcher, Registries};
use crate::handlers::StatsHandler;
use crate::services::{GuidService, PingService, SystemService};
use crate::traits::{Handler, Service};

/// A fully wired application.
pub struct App {
    pub dispatcher: Arc<Dispatcher>,
    /// Backing store of the statistics handler, when statistics are enabled.
    pub store: Option<Arc<MemoryCounterStore>>,
    pub stats: Option<Arc<StatsHandler>>,
}

impl App {
    /// Builds the registries and dispatcher from `config`.
    #[must_use]
    pub fn build(config: &ServerConfig) -> Self {
        let (store, stats) = build_stats(&config.stats);
        let registries = build_registries(&config.app, stats.clone());
        info!(
            services = ?registries.services.names().collect::<Vec<_>>(),
            handlers = ?registries.handlers.names().collect::<Vec<_>>(),
            "registries assembled"
        );
        Self {
            dispatcher: Arc::new(Dispatcher::new(registries, config.dispatch.clone())),
            store,
            stats,
        }
    }

    /// Starts purging expired counters every `config.sweep_interval`.
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start_sweeper(&self, config: &StatsConfig) -> Option<BackgroundWorker<ExpirySweep>> {
        self.store.as_ref().map(|store| {
            BackgroundWorker::start(ExpirySweep::new(Arc::clone(store)), config.sweep_interval)
        })
    }
}

fn build_stats(config: &StatsConfig) -> (Option<Arc<MemoryCounterStore>>, Option<Arc<StatsHandler>>) {
    if !config.enabled {
        return (None, None);
    }
    let store = Arc::new(MemoryCounterStore::new());
    let handler = StatsHandler::new(
        Some(Arc::clone(&store) as Arc<dyn CounterStore>),
        KeySpace::new(config.prefix.clone(), config.delimiter.clone()),
        config.lookback_hours,
    );
    (Some(store), Some(Arc::new(handler)))
}

/// Stock registries with the application's additions: `guid` (also the
/// fallback service), `system`, and `stats` prepended so it runs before the
/// business call.
#[must_use]
pub fn build_registries(config: &AppConfig, stats: Option<Arc<StatsHandler>>) -> Registries {
    let mut registries = Registries::stock();

    let ping: Arc<dyn Service> = Arc::new(PingService::default());
    let guid: Arc<dyn Service> = Arc::new(GuidService::new(config.guid_salt.clone()));
    let system: Arc<dyn Service> = Arc::new(SystemService::new(
        format!("{}: {}", config.server_name, config.version),
        stats.clone(),
        config.reset_secret.clone(),
    ));

    registries
        .services
        .add_instance("ping", ping, false)
        .add_instance("", Arc::clone(&guid), false)
        .add_instance("guid", guid, false)
        .add_instance("system", system, false);

    if let Some(stats) = stats {
        registries
            .handlers
            .add_instance("stats", stats as Arc<dyn Handler>, true);
    }
    registries
}
