use std::collections::{HashMap, HashSet};
use std::sync::{
    Arc, Mutex, OnceLock, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use futures::StreamExt;
use tokio::time;
use tracing::{debug, error, trace, warn};

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};

use beaconscan_domain::advertising::encode_manufacturer_data;
use beaconscan_domain::event::{DiscoveryEvent, HostEvent};
use beaconscan_domain::peripheral::Advertising;

use crate::error::{StackError, StackResult};
use crate::hub::EventHub;
use crate::{BleStack, ScanOptions, StartOptions};
use async_trait::async_trait;

type Peripherals = Arc<Mutex<HashMap<String, Peripheral>>>;

/// Host stack backed by the first local Bluetooth adapter.
#[derive(Default)]
pub struct LocalStack {
    hub: EventHub,
    adapter: OnceLock<Adapter>,
    peripherals: Peripherals,
    duplicates: Arc<DuplicateFilter>,
}

/// Decides which discoveries of one scan get published. Without
/// `allow_duplicates` only the first sighting of each id passes.
#[derive(Default)]
struct DuplicateFilter {
    seen: Mutex<HashSet<String>>,
    allow: AtomicBool,
}

impl DuplicateFilter {
    fn reset(&self, allow_duplicates: bool) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.allow.store(allow_duplicates, Ordering::SeqCst);
    }

    fn admit(&self, id: &str) -> bool {
        if self.allow.load(Ordering::SeqCst) {
            return true;
        }
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string())
    }
}

impl LocalStack {
    pub fn new() -> LocalStack {
        LocalStack::default()
    }

    fn adapter(&self) -> StackResult<&Adapter> {
        self.adapter.get().ok_or(StackError::NotStarted)
    }

    fn peripheral(&self, id: &str) -> StackResult<Peripheral> {
        self.adapter()?;
        self.peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| StackError::UnknownPeripheral(id.to_string()))
    }

    async fn watch_notifications(&self, id: &str, peripheral: &Peripheral) -> StackResult<()> {
        peripheral.discover_services().await?;
        let mut subscribed = 0;
        for characteristic in peripheral.characteristics() {
            if characteristic.properties.contains(CharPropFlags::NOTIFY) {
                peripheral.subscribe(&characteristic).await?;
                subscribed += 1;
            }
        }
        if subscribed == 0 {
            trace!("[LocalStack] {id} has no notifying characteristics");
            return Ok(());
        }
        let mut notifications = peripheral.notifications().await?;
        let hub = self.hub.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                hub.publish(HostEvent::CharacteristicUpdated {
                    peripheral: id.clone(),
                    characteristic: notification.uuid.to_string(),
                    value: notification.value,
                });
            }
            trace!("[LocalStack] notifications from {id} ended");
        });
        Ok(())
    }
}

#[async_trait]
impl BleStack for LocalStack {
    async fn start(&self, options: StartOptions) -> StackResult<()> {
        if self.adapter.get().is_some() {
            debug!("[LocalStack] already started");
            return Ok(());
        }
        let manager = Manager::new().await?;
        let Some(adapter) = manager.adapters().await?.into_iter().next() else {
            if options.show_alert {
                error!("Bluetooth is unavailable, no adapters found");
            }
            return Err(StackError::NoAdapter);
        };
        let mut events = adapter.events().await?;
        if self.adapter.set(adapter.clone()).is_err() {
            debug!("[LocalStack] started concurrently, keeping first adapter");
            return Ok(());
        }

        let pump = EventPump {
            adapter,
            hub: self.hub.clone(),
            peripherals: self.peripherals.clone(),
            duplicates: self.duplicates.clone(),
        };
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                pump.handle(event).await;
            }
            trace!("[LocalStack] adapter event stream ended");
        });
        Ok(())
    }

    async fn scan(&self, options: &ScanOptions) -> StackResult<()> {
        let adapter = self.adapter()?.clone();
        self.duplicates.reset(options.allow_duplicates);

        trace!("[LocalStack] starting scan for {:?}", options.duration);
        adapter
            .start_scan(ScanFilter {
                services: options.service_uuids.clone(),
            })
            .await?;

        let hub = self.hub.clone();
        let duration = options.duration;
        tokio::spawn(async move {
            time::sleep(duration).await;
            if let Err(e) = adapter.stop_scan().await {
                error!("[LocalStack] failed to stop scan: {e}");
            }
            hub.publish(HostEvent::ScanStopped);
        });
        Ok(())
    }

    async fn connect(&self, id: &str) -> StackResult<()> {
        let peripheral = self.peripheral(id)?;
        peripheral.connect().await?;
        if let Err(e) = self.watch_notifications(id, &peripheral).await {
            warn!("[LocalStack] connected to {id} but could not watch notifications: {e}");
        }
        Ok(())
    }

    async fn disconnect(&self, id: &str) -> StackResult<()> {
        let peripheral = self.peripheral(id)?;
        peripheral.disconnect().await?;
        Ok(())
    }

    fn events(&self) -> &EventHub {
        &self.hub
    }
}

struct EventPump {
    adapter: Adapter,
    hub: EventHub,
    peripherals: Peripherals,
    duplicates: Arc<DuplicateFilter>,
}

impl EventPump {
    async fn handle(&self, event: CentralEvent) {
        match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ManufacturerDataAdvertisement { id, .. } => self.discovered(&id).await,
            CentralEvent::DeviceDisconnected(id) => {
                self.hub.publish(HostEvent::Disconnected {
                    peripheral: id.to_string(),
                });
            }
            _ => {}
        }
    }

    async fn discovered(&self, id: &PeripheralId) {
        let peripheral = match self.adapter.peripheral(id).await {
            Ok(peripheral) => peripheral,
            Err(e) => {
                warn!("[LocalStack] lost track of {id}: {e}");
                return;
            }
        };
        let properties = match peripheral.properties().await {
            Ok(Some(properties)) => properties,
            Ok(None) => return,
            Err(e) => {
                warn!("[LocalStack] no properties for {id}: {e}");
                return;
            }
        };
        let key = id.to_string();
        let Some(event) = discovery_event(&key, &properties) else {
            trace!("[LocalStack] {key} has no rssi yet");
            return;
        };
        self.peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), peripheral);

        if !self.duplicates.admit(&key) {
            return;
        }
        self.hub.publish(HostEvent::Discovered(event));
    }
}

fn discovery_event(id: &str, properties: &PeripheralProperties) -> Option<DiscoveryEvent> {
    let rssi = properties.rssi?;
    let mut event = DiscoveryEvent::new(id, properties.local_name.clone(), rssi);
    if let Some(advertising) = advertising(&properties.manufacturer_data) {
        event = event.with_advertising(advertising);
    }
    Some(event)
}

/// Peripherals advertising several manufacturers are reported under the
/// lowest company id.
fn advertising(manufacturer_data: &HashMap<u16, Vec<u8>>) -> Option<Advertising> {
    manufacturer_data
        .iter()
        .min_by_key(|(company_id, _)| **company_id)
        .map(|(company_id, payload)| {
            Advertising::with_manufacturer_data(encode_manufacturer_data(*company_id, payload))
        })
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use btleplug::api::PeripheralProperties;

    use beaconscan_domain::advertising::decode_beacon_fields;

    use super::{DuplicateFilter, advertising, discovery_event};

    #[test]
    fn no_manufacturer_data() {
        assert_eq!(advertising(&HashMap::new()), None);
    }

    #[test]
    fn lowest_company_id_wins() {
        let mut payload = vec![0x02, 0x15];
        payload.extend_from_slice(&[0u8; 16]);
        payload.extend_from_slice(&[0x00, 0x07, 0x00, 0x2A, 0xC5]);
        let data = HashMap::from([(0x004C, payload), (0x0100, vec![1, 2, 3])]);

        let advertising = advertising(&data).unwrap();
        let fields = decode_beacon_fields(advertising.manufacturer_data());
        assert_eq!(fields.major, Some(7));
        assert_eq!(fields.minor, Some(42));
    }

    #[test]
    fn needs_rssi() {
        let mut properties = PeripheralProperties::default();
        assert_eq!(discovery_event("AA:BB", &properties), None);

        properties.rssi = Some(-61);
        properties.local_name = Some("Beacon1".to_string());
        let event = discovery_event("AA:BB", &properties).unwrap();
        assert_eq!(event.id, "AA:BB");
        assert_eq!(event.name.as_deref(), Some("Beacon1"));
        assert_eq!(event.rssi, -61);
        assert_eq!(event.advertising, None);
    }

    #[test]
    fn repeat_sighting_is_suppressed() {
        let filter = DuplicateFilter::default();
        filter.reset(false);
        assert!(filter.admit("AA:BB"));
        assert!(!filter.admit("AA:BB"));
        assert!(filter.admit("CC:DD"));
    }

    #[test]
    fn new_scan_admits_repeat_again() {
        let filter = DuplicateFilter::default();
        filter.reset(false);
        assert!(filter.admit("AA:BB"));
        filter.reset(false);
        assert!(filter.admit("AA:BB"));
        assert!(!filter.admit("AA:BB"));
    }

    #[test]
    fn allow_duplicates_admits_everything() {
        let filter = DuplicateFilter::default();
        filter.reset(true);
        assert!(filter.admit("AA:BB"));
        assert!(filter.admit("AA:BB"));
        assert!(filter.admit("AA:BB"));
    }
}
