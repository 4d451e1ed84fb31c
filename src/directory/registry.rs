//! Input registry
//!
//! Live inputs keyed by explicit id, or by endpoint when an input has no id.
//! Registration pushes upsert records; a periodic prune drops records that
//! stopped registering. The routing orchestrator reads pending work with
//! [`InputRegistry::pending_plans`] and writes results back with
//! [`InputRegistry::apply`]. One table-wide lock serialises all of it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::directory::outputs::OutputDirectory;
use crate::error::RegistryError;
use crate::protocol::{InputAnnouncement, InputStatus, StreamEndpoint};

/// Identity of an input in the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputKey {
    Id(String),
    Endpoint(StreamEndpoint),
}

impl InputKey {
    pub fn of(announcement: &InputAnnouncement) -> Self {
        match &announcement.id {
            Some(id) => InputKey::Id(id.clone()),
            None => InputKey::Endpoint(announcement.endpoint.clone()),
        }
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKey::Id(id) => f.write_str(id),
            InputKey::Endpoint(endpoint) => write!(f, "{}", endpoint),
        }
    }
}

/// An output streaming from an input endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Route {
    pub output: String,
    pub input: StreamEndpoint,
}

impl Route {
    pub fn new(output: impl Into<String>, input: StreamEndpoint) -> Self {
        Self {
            output: output.into(),
            input,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputRecord {
    pub key: InputKey,
    pub name: Option<String>,
    pub endpoint: StreamEndpoint,
    /// Outputs the input asks for
    pub outputs: BTreeSet<String>,
    /// Outputs currently streaming from `endpoint`
    pub started: BTreeSet<String>,
    /// Outputs still streaming from an endpoint the input has left
    pub retired: Vec<Route>,
    pub activated: bool,
    pub registered_at: Instant,
    pub first_seen: DateTime<Utc>,
    revision: u64,
}

impl InputRecord {
    fn new(key: InputKey, announcement: &InputAnnouncement, outputs: BTreeSet<String>, now: Instant) -> Self {
        Self {
            key,
            name: announcement.name.clone(),
            endpoint: announcement.endpoint.clone(),
            outputs,
            started: BTreeSet::new(),
            retired: Vec::new(),
            activated: false,
            registered_at: now,
            first_seen: Utc::now(),
            revision: 0,
        }
    }

    fn refresh(&mut self, announcement: &InputAnnouncement, outputs: BTreeSet<String>, now: Instant) {
        self.registered_at = now;
        if announcement.name.is_some() {
            self.name = announcement.name.clone();
        }

        if self.endpoint != announcement.endpoint {
            tracing::info!(
                "Input {} moved from {} to {}",
                self.key,
                self.endpoint,
                announcement.endpoint
            );
            let old = std::mem::replace(&mut self.endpoint, announcement.endpoint.clone());
            let moved = std::mem::take(&mut self.started);
            self.retired
                .extend(moved.into_iter().map(|output| Route::new(output, old.clone())));

            // routes still streaming from the endpoint we moved back to are live again
            let current = self.endpoint.clone();
            let (live, retired): (Vec<_>, Vec<_>) =
                self.retired.drain(..).partition(|route| route.input == current);
            self.retired = retired;
            self.started.extend(live.into_iter().map(|route| route.output));

            self.activated = false;
            self.revision += 1;
        }

        if self.outputs != outputs {
            tracing::info!("Input {} now targets {:?}", self.key, outputs);
            self.outputs = outputs;
            self.activated = false;
            self.revision += 1;
        }
    }

    /// Every route this input still holds open on output hosts
    pub fn open_routes(&self) -> Vec<Route> {
        self.started
            .iter()
            .map(|output| Route::new(output.clone(), self.endpoint.clone()))
            .chain(self.retired.iter().cloned())
            .collect()
    }

    fn plan(&self) -> RoutePlan {
        let starts = self.outputs.difference(&self.started).cloned().collect();
        let stops = self
            .started
            .difference(&self.outputs)
            .map(|output| Route::new(output.clone(), self.endpoint.clone()))
            .chain(self.retired.iter().cloned())
            .collect();

        RoutePlan {
            key: self.key.clone(),
            input: self.endpoint.clone(),
            starts,
            stops,
            revision: self.revision,
        }
    }

    /// Drop `routes` from the open set; they are owned by an in-flight plan
    fn release(&mut self, routes: &[Route]) {
        for route in routes {
            self.retired.retain(|r| r != route);
            if route.input == self.endpoint {
                self.started.remove(&route.output);
            }
        }
    }

    fn status(&self, now: Instant) -> InputStatus {
        InputStatus {
            key: self.key.to_string(),
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            outputs: self.outputs.iter().cloned().collect(),
            activated: self.activated,
            first_seen: self.first_seen,
            age_ms: now.saturating_duration_since(self.registered_at).as_millis() as u64,
        }
    }
}

/// Remote calls needed to bring one input in line with its declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub key: InputKey,
    /// Endpoint the starts aim at
    pub input: StreamEndpoint,
    pub starts: Vec<String>,
    pub stops: Vec<Route>,
    revision: u64,
}

/// What the orchestrator achieved for one [`RoutePlan`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Outputs that started successfully
    pub started: Vec<String>,
    /// Routes that stopped successfully
    pub stopped: Vec<Route>,
    pub failed: usize,
}

pub struct InputRegistry {
    outputs: Arc<OutputDirectory>,
    timeout: Duration,
    inputs: RwLock<HashMap<InputKey, InputRecord>>,
}

impl InputRegistry {
    pub fn new(outputs: Arc<OutputDirectory>, timeout: Duration) -> Self {
        Self {
            outputs,
            timeout,
            inputs: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert a batch of announcements. Entries are accepted or rejected
    /// individually; a rejected entry leaves any existing record untouched.
    pub fn register(
        &self,
        batch: &[InputAnnouncement],
        now: Instant,
    ) -> Vec<Result<InputKey, RegistryError>> {
        let mut inputs = self.inputs.write();
        batch
            .iter()
            .map(|announcement| self.upsert(&mut inputs, announcement, now))
            .collect()
    }

    fn upsert(
        &self,
        inputs: &mut HashMap<InputKey, InputRecord>,
        announcement: &InputAnnouncement,
        now: Instant,
    ) -> Result<InputKey, RegistryError> {
        if let Some(unknown) = announcement.outputs.iter().find(|o| !self.outputs.contains(o)) {
            return Err(RegistryError::UnknownOutput(unknown.clone()));
        }

        let key = InputKey::of(announcement);
        // stale owners count until pruned, so their stop calls cannot hit the newcomer
        if let Some(owner) = inputs
            .values()
            .find(|r| r.key != key && r.endpoint == announcement.endpoint)
        {
            return Err(RegistryError::EndpointConflict {
                endpoint: announcement.endpoint.to_string(),
                owner: owner.key.to_string(),
            });
        }

        let outputs: BTreeSet<String> = announcement.outputs.iter().cloned().collect();
        match inputs.get_mut(&key) {
            Some(record) => record.refresh(announcement, outputs, now),
            None => {
                tracing::info!("Input {} registered at {}", key, announcement.endpoint);
                inputs.insert(key.clone(), InputRecord::new(key.clone(), announcement, outputs, now));
            }
        }

        Ok(key)
    }

    /// Remove and return records not refreshed for longer than the input timeout
    pub fn prune(&self, now: Instant) -> Vec<InputRecord> {
        let mut inputs = self.inputs.write();
        let stale: Vec<InputKey> = inputs
            .values()
            .filter(|r| now.saturating_duration_since(r.registered_at) > self.timeout)
            .map(|r| r.key.clone())
            .collect();

        stale
            .iter()
            .filter_map(|key| inputs.remove(key))
            .inspect(|r| tracing::info!("Input {} timed out", r.key))
            .collect()
    }

    /// Plans for every record that is not activated.
    ///
    /// A plan's stop routes leave the record with it: until `apply` hands
    /// back the failures, a prune of the record cannot stop them again.
    pub fn pending_plans(&self) -> Vec<RoutePlan> {
        let mut inputs = self.inputs.write();
        let mut plans: Vec<_> = inputs
            .values_mut()
            .filter(|r| !r.activated)
            .map(|record| {
                let plan = record.plan();
                record.release(&plan.stops);
                plan
            })
            .collect();
        plans.sort_by(|a, b| a.key.cmp(&b.key));
        plans
    }

    /// Record the outcome of a plan.
    ///
    /// Returns routes left open by a record that was pruned while the calls
    /// were in flight; the caller must stop them.
    pub fn apply(&self, plan: &RoutePlan, outcome: PlanOutcome) -> Vec<Route> {
        let failed_stops: Vec<Route> = plan
            .stops
            .iter()
            .filter(|route| !outcome.stopped.contains(route))
            .cloned()
            .collect();

        let mut inputs = self.inputs.write();
        let Some(record) = inputs.get_mut(&plan.key) else {
            return outcome
                .started
                .into_iter()
                .map(|output| Route::new(output, plan.input.clone()))
                .chain(failed_stops)
                .collect();
        };

        // failed stops are retried on the next pass
        for route in failed_stops {
            if route.input == record.endpoint {
                record.started.insert(route.output);
            } else if !record.retired.contains(&route) {
                record.retired.push(route);
            }
        }

        if record.endpoint == plan.input {
            record.started.extend(outcome.started);
        } else {
            // the input moved mid-pass; these streams aim at the old endpoint
            record.retired.extend(
                outcome
                    .started
                    .into_iter()
                    .map(|output| Route::new(output, plan.input.clone())),
            );
        }

        record.activated = outcome.failed == 0 && record.revision == plan.revision;
        if record.activated {
            tracing::info!("Input {} routed to {:?}", record.key, record.started);
        }
        Vec::new()
    }

    pub fn get(&self, key: &InputKey) -> Option<InputRecord> {
        self.inputs.read().get(key).cloned()
    }

    /// Live inputs ordered by key
    pub fn list(&self, now: Instant) -> Vec<InputStatus> {
        let inputs = self.inputs.read();
        let mut records: Vec<_> = inputs.values().collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records.into_iter().map(|r| r.status(now)).collect()
    }

    /// Output menu offered to input hosts
    pub fn list_outputs(&self) -> Vec<String> {
        self.outputs.names()
    }

    pub fn outputs(&self) -> &Arc<OutputDirectory> {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.inputs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.read().is_empty()
    }
}
