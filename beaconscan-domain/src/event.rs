use serde::{Deserialize, Serialize};

use crate::peripheral::Advertising;

/// Payload of a discovery event as reported by the host stack.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct DiscoveryEvent {
    pub id: String,
    pub name: Option<String>,
    pub rssi: i16,
    pub advertising: Option<Advertising>,
}

impl DiscoveryEvent {
    #[must_use]
    pub fn new(id: impl Into<String>, name: Option<String>, rssi: i16) -> DiscoveryEvent {
        DiscoveryEvent {
            id: id.into(),
            name,
            rssi,
            advertising: None,
        }
    }

    #[must_use]
    pub fn with_advertising(mut self, advertising: Advertising) -> DiscoveryEvent {
        self.advertising = Some(advertising);
        self
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Discovered,
    ScanStopped,
    Disconnected,
    CharacteristicUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Discovered,
        EventKind::ScanStopped,
        EventKind::Disconnected,
        EventKind::CharacteristicUpdated,
    ];
}

/// Everything the host stack can tell us about.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Discovered(DiscoveryEvent),
    ScanStopped,
    Disconnected {
        peripheral: String,
    },
    CharacteristicUpdated {
        peripheral: String,
        characteristic: String,
        value: Vec<u8>,
    },
}

impl HostEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::Discovered(_) => EventKind::Discovered,
            HostEvent::ScanStopped => EventKind::ScanStopped,
            HostEvent::Disconnected { .. } => EventKind::Disconnected,
            HostEvent::CharacteristicUpdated { .. } => EventKind::CharacteristicUpdated,
        }
    }
}
