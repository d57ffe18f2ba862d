//! In-memory stand in for the host stack.

use std::{
    collections::HashSet,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tracing::info;

use beaconscan_domain::event::HostEvent;

use crate::{
    BleStack, ScanOptions, StartOptions,
    error::{StackError, StackResult},
    hub::EventHub,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(StartOptions),
    Scan(ScanOptions),
    Connect(String),
    Disconnect(String),
}

#[derive(Default)]
pub struct MockStack {
    hub: EventHub,
    calls: Mutex<Vec<Call>>,
    started: AtomicBool,
    fail_scans: AtomicBool,
    failing_connects: Mutex<HashSet<String>>,
}

impl MockStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    pub fn fail_connect(&self, id: &str) {
        self.failing_connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
    }

    pub fn inject(&self, event: HostEvent) -> usize {
        self.hub.publish(event)
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn ensure_started(&self) -> StackResult<()> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StackError::NotStarted)
        }
    }
}

#[async_trait]
impl BleStack for MockStack {
    async fn start(&self, options: StartOptions) -> StackResult<()> {
        self.record(Call::Start(options));
        self.started.store(true, Ordering::SeqCst);
        info!("MockStack: started");
        Ok(())
    }

    async fn scan(&self, options: &ScanOptions) -> StackResult<()> {
        self.ensure_started()?;
        self.record(Call::Scan(options.clone()));
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(StackError::Other("scan refused".to_string()));
        }
        Ok(())
    }

    async fn connect(&self, id: &str) -> StackResult<()> {
        self.ensure_started()?;
        self.record(Call::Connect(id.to_string()));
        let failing = self
            .failing_connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id);
        if failing {
            Err(StackError::Other(format!("could not connect to {id}")))
        } else {
            Ok(())
        }
    }

    async fn disconnect(&self, id: &str) -> StackResult<()> {
        self.ensure_started()?;
        self.record(Call::Disconnect(id.to_string()));
        self.hub.publish(HostEvent::Disconnected {
            peripheral: id.to_string(),
        });
        Ok(())
    }

    fn events(&self) -> &EventHub {
        &self.hub
    }
}
