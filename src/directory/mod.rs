//! Directory service: input registry plus routing orchestration
//!
//! Two background tasks run next to the HTTP API: the pruner drops inputs
//! that stopped registering and hands them to the orchestrator, which also
//! reconciles the registry against output hosts on its own interval.

pub mod control;
pub mod orchestrator;
pub mod outputs;
pub mod registry;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::DirectoryConfig;

pub use control::{HttpOutputControl, OutputControl};
pub use orchestrator::{ReconcileSummary, RoutingOrchestrator};
pub use outputs::OutputDirectory;
pub use registry::{InputKey, InputRecord, InputRegistry, Route};

/// Registry and orchestrator with their background tasks
pub struct DirectoryService {
    registry: Arc<InputRegistry>,
    orchestrator: Arc<RoutingOrchestrator>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl DirectoryService {
    /// Build the service and spawn its tasks on the current runtime
    pub fn spawn(config: &DirectoryConfig, control: Arc<dyn OutputControl>) -> Self {
        let outputs = Arc::new(OutputDirectory::from_config(&config.outputs));
        let registry = Arc::new(InputRegistry::new(outputs, config.input_timeout()));
        let orchestrator = Arc::new(RoutingOrchestrator::new(registry.clone(), control));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (pruned_tx, pruned_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            tokio::spawn(run_pruner(
                registry.clone(),
                config.prune_interval(),
                pruned_tx,
                shutdown_rx.clone(),
            )),
            tokio::spawn(orchestrator.clone().run(
                config.reconcile_interval(),
                pruned_rx,
                shutdown_rx,
            )),
        ];

        tracing::info!(
            "Directory service started with {} outputs",
            registry.outputs().len()
        );

        Self {
            registry,
            orchestrator,
            shutdown_tx,
            tasks,
        }
    }

    pub fn registry(&self) -> &Arc<InputRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Arc<RoutingOrchestrator> {
        &self.orchestrator
    }

    /// Stop the background tasks and wait for them
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Directory task failed: {}", e);
            }
        }
    }
}

/// Periodically prune the registry and forward the removed records
pub async fn run_pruner(
    registry: Arc<InputRegistry>,
    interval: Duration,
    pruned_tx: mpsc::UnboundedSender<Vec<InputRecord>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pruned = registry.prune(Instant::now());
                if !pruned.is_empty() && pruned_tx.send(pruned).is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
