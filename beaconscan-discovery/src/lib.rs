pub mod error;
pub mod hub;
pub mod local;
pub mod mock;
pub mod permission;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::StackResult, hub::EventHub};

pub const SECONDS_TO_SCAN_FOR: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// only report peripherals advertising one of these; empty means all
    pub service_uuids: Vec<Uuid>,
    /// how long the stack scans before reporting the scan stopped
    pub duration: Duration,
    /// report every advertisement rather than the first per peripheral
    pub allow_duplicates: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            service_uuids: vec![],
            duration: Duration::from_secs(SECONDS_TO_SCAN_FOR),
            allow_duplicates: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub show_alert: bool,
}

/// The host BLE stack as seen by a session. `start` has to succeed before
/// any of the other operations; results of `scan` and `disconnect` arrive
/// later as events on [`BleStack::events`].
#[async_trait]
pub trait BleStack: Send + Sync {
    async fn start(&self, options: StartOptions) -> StackResult<()>;
    async fn scan(&self, options: &ScanOptions) -> StackResult<()>;
    async fn connect(&self, id: &str) -> StackResult<()>;
    async fn disconnect(&self, id: &str) -> StackResult<()>;
    fn events(&self) -> &EventHub;
}
