//! Trigger dispatch
//!
//! A trigger is a named set of independent actions. Firing it runs every
//! action; a failing action is logged and does not stop the others.

use chrono::{DateTime, Utc};
use futures_util::future::{join_all, BoxFuture};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{TriggerCommand, TriggerConfig};
use crate::error::TriggerError;

/// One action run by a trigger
pub type Action = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Wrap an async closure as an [`Action`]
pub fn action<F, Fut>(f: F) -> Action
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), String>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as BoxFuture<'static, Result<(), String>>)
}

/// Action issuing a GET request that must answer with a success status
pub fn http_get_action(client: reqwest::Client, url: String) -> Action {
    action(move || {
        let client = client.clone();
        let url = url.clone();
        async move {
            let response = client.get(&url).send().await.map_err(|e| e.to_string())?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(format!("{} answered {}", url, response.status()))
            }
        }
    })
}

#[derive(Default)]
struct Trigger {
    actions: BTreeMap<String, Action>,
    last_fired: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerState {
    Idle,
    /// Fired within the display window
    Fired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerStatus {
    pub last_fired: Option<DateTime<Utc>>,
    pub state: TriggerState,
}

/// Result of one `fire`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireReport {
    pub ran: usize,
    pub failed: usize,
}

pub struct TriggerHandler {
    triggers: RwLock<BTreeMap<String, Trigger>>,
    display_window: Duration,
}

impl TriggerHandler {
    pub fn new(display_window: Duration) -> Self {
        Self {
            triggers: RwLock::new(BTreeMap::new()),
            display_window,
        }
    }

    /// Build triggers and their `http_get` actions from configuration
    pub fn from_config(
        configs: &[TriggerConfig],
        client: reqwest::Client,
        display_window: Duration,
    ) -> Result<Self, TriggerError> {
        let handler = Self::new(display_window);
        for config in configs {
            handler.add(&config.id)?;
            for action_config in &config.actions {
                let action = match &action_config.command {
                    TriggerCommand::HttpGet { url } => http_get_action(client.clone(), url.clone()),
                };
                handler.add_action(&config.id, &action_config.id, action)?;
            }
        }
        Ok(handler)
    }

    pub fn add(&self, id: &str) -> Result<(), TriggerError> {
        let mut triggers = self.triggers.write();
        if triggers.contains_key(id) {
            return Err(TriggerError::AlreadyExists(id.to_string()));
        }
        triggers.insert(id.to_string(), Trigger::default());
        tracing::info!("Trigger {} created", id);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<(), TriggerError> {
        self.triggers
            .write()
            .remove(id)
            .map(|_| tracing::info!("Trigger {} removed", id))
            .ok_or_else(|| TriggerError::NotFound(id.to_string()))
    }

    pub fn add_action(&self, trigger: &str, action_id: &str, action: Action) -> Result<(), TriggerError> {
        let mut triggers = self.triggers.write();
        let entry = triggers
            .get_mut(trigger)
            .ok_or_else(|| TriggerError::NotFound(trigger.to_string()))?;
        if entry.actions.contains_key(action_id) {
            return Err(TriggerError::AlreadyExists(format!("{}/{}", trigger, action_id)));
        }
        entry.actions.insert(action_id.to_string(), action);
        tracing::debug!("Action {} added to trigger {}", action_id, trigger);
        Ok(())
    }

    pub fn remove_action(&self, trigger: &str, action_id: &str) -> Result<(), TriggerError> {
        let mut triggers = self.triggers.write();
        let entry = triggers
            .get_mut(trigger)
            .ok_or_else(|| TriggerError::NotFound(trigger.to_string()))?;
        entry
            .actions
            .remove(action_id)
            .map(|_| ())
            .ok_or_else(|| TriggerError::ActionNotFound {
                trigger: trigger.to_string(),
                action: action_id.to_string(),
            })
    }

    pub fn action_ids(&self, trigger: &str) -> Result<Vec<String>, TriggerError> {
        self.triggers
            .read()
            .get(trigger)
            .map(|t| t.actions.keys().cloned().collect())
            .ok_or_else(|| TriggerError::NotFound(trigger.to_string()))
    }

    /// Run every action of `id` concurrently
    pub async fn fire(&self, id: &str) -> Result<FireReport, TriggerError> {
        let actions: Vec<(String, Action)> = {
            let triggers = self.triggers.read();
            let trigger = triggers
                .get(id)
                .ok_or_else(|| TriggerError::NotFound(id.to_string()))?;
            trigger
                .actions
                .iter()
                .map(|(name, action)| (name.clone(), action.clone()))
                .collect()
        };

        tracing::info!("Trigger {} firing {} actions", id, actions.len());
        let results = join_all(actions.iter().map(|(_, action)| action())).await;

        let mut report = FireReport {
            ran: actions.len(),
            failed: 0,
        };
        for ((name, _), result) in actions.iter().zip(results) {
            if let Err(e) = result {
                tracing::error!("Action {} of trigger {} failed: {}", name, id, e);
                report.failed += 1;
            }
        }

        if let Some(trigger) = self.triggers.write().get_mut(id) {
            trigger.last_fired = Some(Utc::now());
        }
        Ok(report)
    }

    pub fn statuses(&self) -> BTreeMap<String, TriggerStatus> {
        self.statuses_at(Utc::now())
    }

    pub fn statuses_at(&self, now: DateTime<Utc>) -> BTreeMap<String, TriggerStatus> {
        let window = chrono::Duration::from_std(self.display_window).unwrap_or(chrono::Duration::zero());
        self.triggers
            .read()
            .iter()
            .map(|(id, trigger)| {
                let state = match trigger.last_fired {
                    Some(at) if now - at <= window => TriggerState::Fired,
                    _ => TriggerState::Idle,
                };
                let status = TriggerStatus {
                    last_fired: trigger.last_fired,
                    state,
                };
                (id.clone(), status)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.triggers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.read().is_empty()
    }
}
