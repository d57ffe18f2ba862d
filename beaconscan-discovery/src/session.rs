//! Scan and connection orchestration over a registry.
//!
//! A session is owned by one task. Host events and connect results are fed
//! to it from that task only, so the registry needs no locking.

use std::sync::Arc;

use tracing::{debug, error, info};

use beaconscan_domain::{
    event::HostEvent,
    peripheral::PeripheralPatch,
    registry::PeripheralRegistry,
    snapshot::Snapshot,
};

use crate::{BleStack, ScanOptions, error::StackResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Connect,
    Disconnect,
}

/// Everything an event loop feeds a session, applied in arrival order.
#[derive(Debug)]
pub enum SessionInput {
    Host(HostEvent),
    ConnectFinished { id: String, result: StackResult<()> },
}

pub struct Session<S: BleStack + ?Sized> {
    stack: Arc<S>,
    options: ScanOptions,
    registry: PeripheralRegistry,
    scanning: bool,
}

impl<S: BleStack + ?Sized> Session<S> {
    pub fn new(stack: Arc<S>, options: ScanOptions) -> Self {
        Session {
            stack,
            options,
            registry: PeripheralRegistry::default(),
            scanning: false,
        }
    }

    pub fn stack(&self) -> Arc<S> {
        self.stack.clone()
    }

    pub fn registry(&self) -> &PeripheralRegistry {
        &self.registry
    }

    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Asks the stack to scan unless a scan is already running. Returns
    /// whether a scan was started; failures are logged.
    pub async fn start_scan(&mut self) -> bool {
        if self.scanning {
            debug!("scan already running");
            return false;
        }
        info!("Scanning...");
        match self.stack.scan(&self.options).await {
            Ok(()) => {
                self.scanning = true;
                true
            }
            Err(e) => {
                error!("scan failed: {e}");
                false
            }
        }
    }

    pub fn handle_event(&mut self, event: &HostEvent) {
        match event {
            HostEvent::Discovered(discovery) => {
                debug!("Got ble peripheral {discovery:?}");
                self.registry.discover(discovery);
            }
            HostEvent::ScanStopped => {
                self.scanning = false;
                info!("Scan is stopped");
            }
            HostEvent::Disconnected { peripheral } => {
                if self.registry.get(peripheral).is_some() {
                    self.registry
                        .merge(peripheral, PeripheralPatch::disconnected());
                }
                info!("Disconnected from {peripheral}");
            }
            HostEvent::CharacteristicUpdated {
                peripheral,
                characteristic,
                value,
            } => {
                info!("Received data from {peripheral} characteristic {characteristic}: {value:?}");
            }
        }
    }

    pub fn apply(&mut self, input: SessionInput) {
        match input {
            SessionInput::Host(event) => self.handle_event(&event),
            SessionInput::ConnectFinished { id, result } => self.finish_connect(&id, result),
        }
    }

    pub fn toggle_target(&self, id: &str) -> Toggle {
        match self.registry.get(id) {
            Some(record) if record.connected => Toggle::Disconnect,
            _ => Toggle::Connect,
        }
    }

    pub fn begin_connect(&mut self, id: &str) {
        self.registry.merge(id, PeripheralPatch::connect_started());
    }

    /// A failed attempt is only logged; `connecting` stays set.
    pub fn finish_connect(&mut self, id: &str, result: StackResult<()>) {
        match result {
            Ok(()) => {
                self.registry.merge(id, PeripheralPatch::connect_succeeded());
                info!("Connected to {id}");
            }
            Err(e) => error!("Connection error {id}: {e}"),
        }
    }

    pub async fn connect(&mut self, id: &str) {
        self.begin_connect(id);
        let result = self.stack.connect(id).await;
        self.finish_connect(id, result);
    }

    /// The registry is updated once the stack reports the disconnect.
    pub async fn disconnect(&mut self, id: &str) {
        if let Err(e) = self.stack.disconnect(id).await {
            error!("Disconnect error {id}: {e}");
        }
    }

    pub async fn toggle_connection(&mut self, id: &str) -> Toggle {
        let toggle = self.toggle_target(id);
        match toggle {
            Toggle::Disconnect => self.disconnect(id).await,
            Toggle::Connect => self.connect(id).await,
        }
        toggle
    }
}
