//! Routing orchestrator
//!
//! Reconciles the registry against the receivers running on output hosts.
//! Remote failures are logged and retried on the next pass; they never abort
//! a pass or hold up other inputs.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::directory::control::OutputControl;
use crate::directory::registry::{InputRecord, InputRegistry, PlanOutcome, Route, RoutePlan};
use crate::protocol::StreamEndpoint;

/// Calls made by one reconciliation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub started: usize,
    pub stopped: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

pub struct RoutingOrchestrator {
    registry: Arc<InputRegistry>,
    control: Arc<dyn OutputControl>,
}

impl RoutingOrchestrator {
    pub fn new(registry: Arc<InputRegistry>, control: Arc<dyn OutputControl>) -> Self {
        Self { registry, control }
    }

    /// One pass over every input that is not activated
    pub async fn reconcile(&self) -> ReconcileSummary {
        let plans = self.registry.pending_plans();
        let outcomes = join_all(plans.into_iter().map(|plan| self.execute(plan))).await;

        outcomes.into_iter().fold(ReconcileSummary::default(), |mut total, s| {
            total.started += s.started;
            total.stopped += s.stopped;
            total.failed += s.failed;
            total
        })
    }

    async fn execute(&self, plan: RoutePlan) -> ReconcileSummary {
        let mut outcome = PlanOutcome::default();

        for route in &plan.stops {
            if self.stop_route(route).await {
                outcome.stopped.push(route.clone());
            } else {
                outcome.failed += 1;
            }
        }
        for output in &plan.starts {
            if self.start_output(output, &plan.input).await {
                outcome.started.push(output.clone());
            } else {
                outcome.failed += 1;
            }
        }

        let summary = ReconcileSummary {
            started: outcome.started.len(),
            stopped: outcome.stopped.len(),
            failed: outcome.failed,
        };

        for route in self.registry.apply(&plan, outcome) {
            tracing::info!("Input {} vanished during routing, closing {}", plan.key, route.output);
            self.stop_route(&route).await;
        }
        summary
    }

    /// Stop every route a pruned input still holds open.
    ///
    /// Returns how many stop calls were issued.
    pub async fn retire(&self, record: &InputRecord) -> usize {
        let routes = record.open_routes();
        for route in &routes {
            self.stop_route(route).await;
        }
        routes.len()
    }

    /// Start `output` on every host behind it. True when all of them accepted.
    async fn start_output(&self, output: &str, input: &StreamEndpoint) -> bool {
        let Some(hosts) = self.registry.outputs().hosts(output) else {
            tracing::warn!("Output {} is not configured", output);
            return false;
        };

        let results = join_all(hosts.iter().map(|host| self.control.start(host, input))).await;
        let mut ok = true;
        for (host, result) in hosts.iter().zip(results) {
            match result {
                Ok(()) => tracing::info!("Output {} ({}) streaming from {}", output, host, input),
                Err(e) => {
                    tracing::warn!("Start of {} on {} failed: {}", output, host, e);
                    ok = false;
                }
            }
        }
        ok
    }

    async fn stop_route(&self, route: &Route) -> bool {
        let Some(hosts) = self.registry.outputs().hosts(&route.output) else {
            tracing::warn!("Output {} is not configured", route.output);
            return false;
        };

        let results = join_all(hosts.iter().map(|host| self.control.stop(host, &route.input))).await;
        let mut ok = true;
        for (host, result) in hosts.iter().zip(results) {
            match result {
                Ok(()) => tracing::info!("Output {} ({}) stopped {}", route.output, host, route.input),
                Err(e) => {
                    tracing::warn!("Stop of {} on {} failed: {}", route.output, host, e);
                    ok = false;
                }
            }
        }
        ok
    }

    /// Reconcile every `interval` and retire pruned inputs as they arrive
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        mut pruned: mpsc::UnboundedReceiver<Vec<InputRecord>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.reconcile().await;
                    if !summary.is_idle() {
                        tracing::debug!("Reconciled: {:?}", summary);
                    }
                }
                Some(records) = pruned.recv() => {
                    for record in &records {
                        self.retire(record).await;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::debug!("Routing orchestrator stopped");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::directory::outputs::OutputDirectory;
    use crate::error::ControlError;
    use crate::protocol::InputAnnouncement;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Start { host: StreamEndpoint, input: StreamEndpoint },
        Stop { host: StreamEndpoint, input: StreamEndpoint },
    }

    /// Records every call; hosts in `down` fail
    #[derive(Default)]
    pub(crate) struct RecordingControl {
        pub calls: Mutex<Vec<Call>>,
        pub down: Mutex<HashSet<StreamEndpoint>>,
    }

    impl RecordingControl {
        pub fn starts(&self) -> usize {
            self.calls.lock().iter().filter(|c| matches!(c, Call::Start { .. })).count()
        }

        pub fn stops(&self) -> usize {
            self.calls.lock().iter().filter(|c| matches!(c, Call::Stop { .. })).count()
        }

        fn check(&self, host: &StreamEndpoint) -> Result<(), ControlError> {
            if self.down.lock().contains(host) {
                Err(ControlError::Unreachable(host.to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl OutputControl for RecordingControl {
        async fn start(&self, host: &StreamEndpoint, input: &StreamEndpoint) -> Result<(), ControlError> {
            self.calls.lock().push(Call::Start {
                host: host.clone(),
                input: input.clone(),
            });
            self.check(host)
        }

        async fn stop(&self, host: &StreamEndpoint, input: &StreamEndpoint) -> Result<(), ControlError> {
            self.calls.lock().push(Call::Stop {
                host: host.clone(),
                input: input.clone(),
            });
            self.check(host)
        }
    }

    fn host(last: u8) -> StreamEndpoint {
        StreamEndpoint::new(format!("10.0.0.{}", last), 5000)
    }

    fn input(port: u16) -> StreamEndpoint {
        StreamEndpoint::new("10.0.0.1", port)
    }

    fn setup() -> (Arc<InputRegistry>, Arc<RecordingControl>, RoutingOrchestrator) {
        let mut outputs = OutputDirectory::new();
        outputs.insert("o1", vec![host(10)]);
        outputs.insert("o2", vec![host(11)]);
        outputs.insert("hall", vec![host(20), host(21)]);

        let registry = Arc::new(InputRegistry::new(Arc::new(outputs), Duration::from_secs(5)));
        let control = Arc::new(RecordingControl::default());
        let orchestrator = RoutingOrchestrator::new(registry.clone(), control.clone());
        (registry, control, orchestrator)
    }

    fn announce(port: u16, outputs: &[&str]) -> InputAnnouncement {
        InputAnnouncement::new(input(port), outputs.iter().map(|o| o.to_string()).collect())
    }

    #[tokio::test]
    async fn test_single_start_per_registration() {
        let (registry, control, orchestrator) = setup();
        let t0 = Instant::now();

        registry.register(&[announce(6000, &["o1"])], t0);
        let summary = orchestrator.reconcile().await;
        assert_eq!(summary.started, 1);
        assert_eq!(
            *control.calls.lock(),
            vec![Call::Start {
                host: host(10),
                input: input(6000)
            }]
        );

        registry.register(&[announce(6000, &["o1"])], t0 + Duration::from_secs(1));
        assert!(orchestrator.reconcile().await.is_idle());
        assert_eq!(control.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_pruned_input_stops_each_started_output_once() {
        let (registry, control, orchestrator) = setup();
        let t0 = Instant::now();

        registry.register(&[announce(6000, &["o1", "o2"])], t0);
        orchestrator.reconcile().await;
        assert_eq!(control.starts(), 2);

        let pruned = registry.prune(t0 + Duration::from_secs(6));
        assert_eq!(pruned.len(), 1);
        assert_eq!(orchestrator.retire(&pruned[0]).await, 2);
        assert_eq!(control.stops(), 2);
        assert!(registry.list(t0).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_output_does_not_block_others() {
        let (registry, control, orchestrator) = setup();
        let t0 = Instant::now();
        control.down.lock().insert(host(10));

        registry.register(&[announce(6000, &["o1"]), announce(6001, &["o2"])], t0);
        let summary = orchestrator.reconcile().await;
        assert_eq!(summary, ReconcileSummary { started: 1, stopped: 0, failed: 1 });

        // the failed start is retried, the successful one is not
        control.down.lock().clear();
        let summary = orchestrator.reconcile().await;
        assert_eq!(summary.started, 1);
        assert_eq!(control.starts(), 3);
        assert!(registry.pending_plans().is_empty());
    }

    #[tokio::test]
    async fn test_group_fans_out_to_every_host() {
        let (registry, control, orchestrator) = setup();
        registry.register(&[announce(6000, &["hall"])], Instant::now());

        orchestrator.reconcile().await;
        let calls = control.calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&Call::Start { host: host(20), input: input(6000) }));
        assert!(calls.contains(&Call::Start { host: host(21), input: input(6000) }));
    }

    #[tokio::test]
    async fn test_moved_input_stops_old_route() {
        let (registry, control, orchestrator) = setup();
        let t0 = Instant::now();
        registry.register(&[announce(6000, &["o1"]).with_id("mic")], t0);
        orchestrator.reconcile().await;

        registry.register(&[announce(6100, &["o1"]).with_id("mic")], t0);
        orchestrator.reconcile().await;

        let calls = control.calls.lock().clone();
        assert_eq!(
            calls[1..],
            [
                Call::Stop { host: host(10), input: input(6000) },
                Call::Start { host: host(10), input: input(6100) },
            ]
        );
    }

    /// Prunes the registry from inside every stop call
    struct PruneDuringStop {
        calls: RecordingControl,
        registry: Arc<InputRegistry>,
        at: Instant,
        pruned: Mutex<Vec<InputRecord>>,
    }

    #[async_trait]
    impl OutputControl for PruneDuringStop {
        async fn start(&self, host: &StreamEndpoint, input: &StreamEndpoint) -> Result<(), ControlError> {
            self.calls.start(host, input).await
        }

        async fn stop(&self, host: &StreamEndpoint, input: &StreamEndpoint) -> Result<(), ControlError> {
            self.pruned.lock().extend(self.registry.prune(self.at));
            self.calls.stop(host, input).await
        }
    }

    #[tokio::test]
    async fn test_prune_during_stop_does_not_stop_twice() {
        let (registry, _, _) = setup();
        let t0 = Instant::now();
        let control = Arc::new(PruneDuringStop {
            calls: RecordingControl::default(),
            registry: registry.clone(),
            at: t0 + Duration::from_secs(6),
            pruned: Mutex::new(Vec::new()),
        });
        let orchestrator = RoutingOrchestrator::new(registry.clone(), control.clone());

        registry.register(&[announce(6000, &["o1", "o2"])], t0);
        orchestrator.reconcile().await;
        registry.register(&[announce(6000, &["o2"])], t0);
        orchestrator.reconcile().await;

        let pruned = std::mem::take(&mut *control.pruned.lock());
        assert_eq!(pruned.len(), 1);
        assert_eq!(orchestrator.retire(&pruned[0]).await, 1);

        let stops: Vec<Call> = control
            .calls
            .calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Stop { .. }))
            .cloned()
            .collect();
        assert_eq!(
            stops,
            vec![
                Call::Stop { host: host(10), input: input(6000) },
                Call::Stop { host: host(11), input: input(6000) },
            ]
        );
    }

    #[tokio::test]
    async fn test_run_loop_retires_pruned_records() {
        let (registry, control, orchestrator) = setup();
        let orchestrator = Arc::new(orchestrator);
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(orchestrator.run(Duration::from_millis(20), rx, shutdown_rx));

        let t0 = Instant::now();
        registry.register(&[announce(6000, &["o1"])], t0);
        for _ in 0..100 {
            if control.starts() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(control.starts(), 1);

        tx.send(registry.prune(t0 + Duration::from_secs(6))).unwrap();
        for _ in 0..100 {
            if control.stops() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(control.stops(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
