//! Input host: stream senders plus registration with the directory
//!
//! Every running input is announced to the directory on a fixed interval.
//! The result of the latest push drives the connected flag, and each
//! successful push also refreshes the menu of outputs inputs may target.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::ApiResponse;
use crate::audio::SourceFactory;
use crate::config::{InputHostConfig, NetworkConfig};
use crate::error::{ControlError, Error, NetworkError};
use crate::network::{udp, StreamSender, StreamState};
use crate::protocol::{InputAnnouncement, RegistrationResult, StreamEndpoint};

struct InputEntry {
    name: String,
    outputs: Vec<String>,
    sender: Arc<StreamSender>,
}

/// Snapshot of one input for display
#[derive(Debug, Clone, serde::Serialize)]
pub struct InputInfo {
    pub id: String,
    pub name: String,
    pub outputs: Vec<String>,
    pub state: StreamState,
    pub port: Option<u16>,
    pub members: usize,
}

pub struct InputHost {
    inputs: Mutex<BTreeMap<String, InputEntry>>,
    directory: RwLock<StreamEndpoint>,
    available_outputs: RwLock<Vec<String>>,
    connected: AtomicBool,
    bind_ip: IpAddr,
    advertise_ip: String,
    network: NetworkConfig,
    interval: Duration,
    client: reqwest::Client,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InputHost {
    /// Senders bind every interface and are advertised with the configured
    /// IP, or the address of the default route.
    pub fn new(config: &InputHostConfig, network: NetworkConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.registration_timeout())
            .build()
            .map_err(|e| NetworkError::Http(e.to_string()))?;
        let advertise_ip = config
            .advertise_ip
            .clone()
            .unwrap_or_else(|| udp::local_ip().to_string());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            inputs: Mutex::new(BTreeMap::new()),
            directory: RwLock::new(config.directory.clone()),
            available_outputs: RwLock::new(Vec::new()),
            connected: AtomicBool::new(false),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertise_ip,
            network,
            interval: config.registration_interval(),
            client,
            shutdown_tx,
            task: Mutex::new(None),
        })
    }

    /// Bind senders to `ip` only
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Add a stopped input. Returns its id, generated when `id` is `None`.
    pub fn add(
        &self,
        id: Option<String>,
        name: impl Into<String>,
        source: Arc<dyn SourceFactory>,
        outputs: Vec<String>,
    ) -> Result<String, ControlError> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut inputs = self.inputs.lock();
        if inputs.contains_key(&id) {
            return Err(ControlError::AlreadyExists(id));
        }

        let name = name.into();
        let sender = Arc::new(StreamSender::new(
            name.clone(),
            SocketAddr::new(self.bind_ip, 0),
            source,
            self.network.clone(),
        ));
        inputs.insert(id.clone(), InputEntry { name, outputs, sender });
        tracing::info!("Input {} added", id);
        Ok(id)
    }

    fn sender(&self, id: &str) -> Result<Arc<StreamSender>, ControlError> {
        self.inputs
            .lock()
            .get(id)
            .map(|entry| entry.sender.clone())
            .ok_or_else(|| ControlError::NotFound(id.to_string()))
    }

    /// Start streaming `id`; returns the sender's address.
    ///
    /// Blocks until the capture device is open, without holding the input table.
    pub fn start(&self, id: &str) -> Result<SocketAddr, Error> {
        self.sender(id)?.start()
    }

    pub fn stop(&self, id: &str) -> Result<(), ControlError> {
        self.sender(id)?.stop();
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Result<(), ControlError> {
        let entry = self
            .inputs
            .lock()
            .remove(id)
            .ok_or_else(|| ControlError::NotFound(id.to_string()))?;
        entry.sender.stop();
        tracing::info!("Input {} removed", id);
        Ok(())
    }

    /// Bound port of `id`, known once it has started
    pub fn port(&self, id: &str) -> Result<Option<u16>, ControlError> {
        self.inputs
            .lock()
            .get(id)
            .map(|entry| entry.sender.local_addr().map(|addr| addr.port()))
            .ok_or_else(|| ControlError::NotFound(id.to_string()))
    }

    pub fn set_outputs(&self, id: &str, outputs: Vec<String>) -> Result<(), ControlError> {
        let mut inputs = self.inputs.lock();
        let entry = inputs
            .get_mut(id)
            .ok_or_else(|| ControlError::NotFound(id.to_string()))?;
        entry.outputs = outputs;
        Ok(())
    }

    pub fn inputs(&self) -> Vec<InputInfo> {
        self.inputs
            .lock()
            .iter()
            .map(|(id, entry)| InputInfo {
                id: id.clone(),
                name: entry.name.clone(),
                outputs: entry.outputs.clone(),
                state: entry.sender.state(),
                port: entry.sender.local_addr().map(|addr| addr.port()),
                members: entry.sender.members().len(),
            })
            .collect()
    }

    /// Registration batch: every running input at its advertised endpoint
    pub fn announcements(&self) -> Vec<InputAnnouncement> {
        self.inputs
            .lock()
            .iter()
            .filter(|(_, entry)| entry.sender.is_running())
            .filter_map(|(id, entry)| {
                let port = entry.sender.local_addr()?.port();
                let endpoint = StreamEndpoint::new(self.advertise_ip.clone(), port);
                Some(
                    InputAnnouncement::new(endpoint, entry.outputs.clone())
                        .with_id(id.clone())
                        .with_name(entry.name.clone()),
                )
            })
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Output names last offered by the directory
    pub fn available_outputs(&self) -> Vec<String> {
        self.available_outputs.read().clone()
    }

    pub fn directory(&self) -> StreamEndpoint {
        self.directory.read().clone()
    }

    /// Point registration at another directory; takes effect on the next push
    pub fn set_directory(&self, directory: StreamEndpoint) {
        tracing::info!("Directory set to {}", directory);
        *self.directory.write() = directory;
    }

    /// Push one registration and refresh the output menu.
    ///
    /// Returns the new connected state.
    pub async fn register_once(&self) -> bool {
        let connected = match self.push_registration().await {
            Ok(()) => {
                if let Err(e) = self.refresh_outputs().await {
                    tracing::debug!("Output menu refresh failed: {}", e);
                }
                true
            }
            Err(e) => {
                tracing::warn!("Registration with {} failed: {}", self.directory(), e);
                false
            }
        };

        if self.connected.swap(connected, Ordering::Relaxed) != connected {
            tracing::info!(
                "Directory {} {}",
                self.directory(),
                if connected { "connected" } else { "disconnected" }
            );
        }
        connected
    }

    async fn push_registration(&self) -> Result<(), NetworkError> {
        let batch = self.announcements();
        let url = format!("http://{}/api/streamingcontrol/input", self.directory());
        let response = self
            .client
            .post(&url)
            .json(&batch)
            .send()
            .await
            .map_err(|e| NetworkError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NetworkError::Http(format!("{} answered {}", url, response.status())));
        }

        let body: ApiResponse<Vec<RegistrationResult>> =
            response.json().await.map_err(|e| NetworkError::Http(e.to_string()))?;
        for (announcement, result) in batch.iter().zip(body.data.unwrap_or_default()) {
            if let Some(error) = result.error {
                tracing::warn!("Directory rejected {}: {}", announcement.endpoint, error);
            }
        }
        Ok(())
    }

    async fn refresh_outputs(&self) -> Result<(), NetworkError> {
        let url = format!("http://{}/api/streamingcontrol/info/outputs", self.directory());
        let body: ApiResponse<Vec<String>> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| NetworkError::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| NetworkError::Http(e.to_string()))?;

        if let Some(outputs) = body.data {
            *self.available_outputs.write() = outputs;
        }
        Ok(())
    }

    /// Spawn the periodic registration task. A no-op if it is already running.
    pub fn spawn_registration(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let host = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(host.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        host.register_once().await;
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    /// Stop registration, then every sender
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let senders: Vec<Arc<StreamSender>> = self.inputs.lock().values().map(|e| e.sender.clone()).collect();
        for sender in senders {
            sender.stop();
        }
        tracing::info!("Input host stopped");
    }
}
