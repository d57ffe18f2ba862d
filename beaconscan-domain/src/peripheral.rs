use serde::{Deserialize, Serialize};

use crate::event::DiscoveryEvent;

/// Name given to peripherals that advertise without one.
pub const NO_NAME: &str = "NO NAME";

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct ManufacturerData {
    /// base64 encoded manufacturer specific bytes
    pub data: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Advertising {
    pub manufacturer_data: Option<ManufacturerData>,
}

impl Advertising {
    pub fn with_manufacturer_data(data: impl Into<String>) -> Self {
        Self {
            manufacturer_data: Some(ManufacturerData {
                data: Some(data.into()),
            }),
        }
    }

    pub fn manufacturer_data(&self) -> Option<&str> {
        self.manufacturer_data
            .as_ref()
            .and_then(|m| m.data.as_deref())
    }
}

/// One observed peripheral, as shown in the device list.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct PeripheralRecord {
    pub id: String,
    pub name: String,
    pub rssi: i16,
    pub connected: bool,
    pub connecting: bool,
    pub advertising: Option<Advertising>,
}

impl PeripheralRecord {
    /// A record holding only `id`, every other field at its default.
    #[must_use]
    pub fn new(id: impl Into<String>) -> PeripheralRecord {
        PeripheralRecord {
            id: id.into(),
            name: NO_NAME.to_string(),
            rssi: 0,
            connected: false,
            connecting: false,
            advertising: None,
        }
    }

    /// Builds the record a discovery event stands for. Connection flags are
    /// not part of a discovery payload and start out cleared.
    #[must_use]
    pub fn from_discovery(event: &DiscoveryEvent) -> PeripheralRecord {
        PeripheralRecord {
            id: event.id.clone(),
            name: event
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| NO_NAME.to_string()),
            rssi: event.rssi,
            connected: false,
            connecting: false,
            advertising: event.advertising.clone(),
        }
    }

    /// Shallow merge: only fields present in `patch` are touched.
    pub fn apply(&mut self, patch: &PeripheralPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(rssi) = patch.rssi {
            self.rssi = rssi;
        }
        if let Some(connected) = patch.connected {
            self.connected = connected;
        }
        if let Some(connecting) = patch.connecting {
            self.connecting = connecting;
        }
        if let Some(advertising) = &patch.advertising {
            self.advertising = Some(advertising.clone());
        }
    }

    pub fn manufacturer_data(&self) -> Option<&str> {
        self.advertising
            .as_ref()
            .and_then(Advertising::manufacturer_data)
    }
}

/// Partial update for an existing (or not yet seen) peripheral.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct PeripheralPatch {
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub connected: Option<bool>,
    pub connecting: Option<bool>,
    pub advertising: Option<Advertising>,
}

impl PeripheralPatch {
    #[must_use]
    pub fn connect_started() -> Self {
        Self::default().with_connecting(true)
    }

    #[must_use]
    pub fn connect_succeeded() -> Self {
        Self::default().with_connecting(false).with_connected(true)
    }

    #[must_use]
    pub fn disconnected() -> Self {
        Self::default().with_connected(false)
    }

    #[must_use]
    pub fn with_connecting(mut self, connecting: bool) -> Self {
        self.connecting = Some(connecting);
        self
    }

    #[must_use]
    pub fn with_connected(mut self, connected: bool) -> Self {
        self.connected = Some(connected);
        self
    }
}
