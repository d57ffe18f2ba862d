use crate::{
    advertising::{BeaconFields, decode_beacon_fields},
    peripheral::PeripheralRecord,
};

#[derive(PartialEq, Debug, Default, Clone)]
pub struct Snapshot(pub Vec<PeripheralRecord>);

/// What a render pass shows for one peripheral.
#[derive(PartialEq, Debug, Clone)]
pub struct PeripheralRow<'a> {
    pub record: &'a PeripheralRecord,
    pub beacon: BeaconFields,
}

impl PeripheralRow<'_> {
    /// Stable row key.
    pub fn key(&self) -> &str {
        &self.record.id
    }

    pub fn title(&self) -> String {
        if self.record.connecting {
            format!("{} Connecting...", self.record.name)
        } else {
            self.record.name.clone()
        }
    }

    pub fn major(&self) -> String {
        field(self.beacon.major)
    }

    pub fn minor(&self) -> String {
        field(self.beacon.minor)
    }
}

fn field(value: Option<u8>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl Snapshot {
    pub fn rows(&self) -> Vec<PeripheralRow<'_>> {
        self.0
            .iter()
            .map(|record| PeripheralRow {
                record,
                beacon: decode_beacon_fields(record.manufacturer_data()),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn connected(&self) -> usize {
        self.0.iter().filter(|r| r.connected).count()
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in self.rows() {
            writeln!(
                f,
                "{:<38} {:<32} {:>4} {:>5} {:>5}{}",
                row.key(),
                row.title(),
                row.record.rssi,
                row.major(),
                row.minor(),
                if row.record.connected { " *" } else { "" }
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use base64::{Engine, prelude::BASE64_STANDARD};

    use crate::{
        advertising::BeaconFields,
        event::DiscoveryEvent,
        peripheral::{Advertising, PeripheralPatch},
        registry::PeripheralRegistry,
    };

    #[test]
    fn rows_decode_beacon_fields() {
        let mut bytes = vec![0u8; 24];
        bytes[21] = 3;
        bytes[23] = 4;
        let mut registry = PeripheralRegistry::default();
        registry.discover(
            &DiscoveryEvent::new("B", Some("Beacon".to_string()), -50)
                .with_advertising(Advertising::with_manufacturer_data(BASE64_STANDARD.encode(&bytes))),
        );
        registry.discover(&DiscoveryEvent::new("P", None, -70));

        let snapshot = registry.snapshot();
        let rows = snapshot.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key(), "B");
        assert_eq!(
            rows[0].beacon,
            BeaconFields {
                major: Some(3),
                minor: Some(4)
            }
        );
        assert_eq!(rows[0].major(), "3");
        assert_eq!(rows[1].beacon, BeaconFields::default());
        assert_eq!(rows[1].minor(), "");
    }

    #[test]
    fn connecting_title() {
        let mut registry = PeripheralRegistry::default();
        registry.discover(&DiscoveryEvent::new("B", Some("Beacon".to_string()), -50));
        registry.merge("B", PeripheralPatch::connect_started());
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.rows()[0].title(), "Beacon Connecting...");
    }

    #[test]
    fn display_marks_connected() {
        let mut registry = PeripheralRegistry::default();
        registry.discover(&DiscoveryEvent::new("B", Some("Beacon".to_string()), -50));
        registry.merge("B", PeripheralPatch::connect_succeeded());
        let text = registry.snapshot().to_string();
        assert!(text.starts_with("B "));
        assert!(text.trim_end().ends_with('*'));
        assert_eq!(registry.snapshot().connected(), 1);
    }
}
