use std::collections::HashMap;

use crate::{
    event::DiscoveryEvent,
    peripheral::{PeripheralPatch, PeripheralRecord},
    snapshot::Snapshot,
};

pub enum PeripheralUpdate {
    /// Fresh discovery payload, replaces whatever was stored.
    Discovered(PeripheralRecord),
    /// State change, merged into what was stored.
    Patch(PeripheralPatch),
}

/// Known peripherals keyed by id, kept in order of first sighting.
#[derive(Default, Debug, Clone)]
pub struct PeripheralRegistry {
    index: HashMap<String, usize>,
    records: Vec<PeripheralRecord>,
}

impl PeripheralRegistry {
    pub fn upsert(&mut self, id: &str, update: PeripheralUpdate) -> &PeripheralRecord {
        if let Some(&slot) = self.index.get(id) {
            let record = &mut self.records[slot];
            match update {
                PeripheralUpdate::Discovered(mut replacement) => {
                    replacement.id = id.to_string();
                    *record = replacement;
                }
                PeripheralUpdate::Patch(patch) => record.apply(&patch),
            }
            return &self.records[slot];
        }

        let record = match update {
            PeripheralUpdate::Discovered(mut record) => {
                record.id = id.to_string();
                record
            }
            PeripheralUpdate::Patch(patch) => {
                let mut record = PeripheralRecord::new(id);
                record.apply(&patch);
                record
            }
        };
        let slot = self.records.len();
        self.index.insert(id.to_string(), slot);
        self.records.push(record);
        &self.records[slot]
    }

    pub fn discover(&mut self, event: &DiscoveryEvent) -> &PeripheralRecord {
        self.upsert(
            &event.id,
            PeripheralUpdate::Discovered(PeripheralRecord::from_discovery(event)),
        )
    }

    pub fn merge(&mut self, id: &str, patch: PeripheralPatch) -> &PeripheralRecord {
        self.upsert(id, PeripheralUpdate::Patch(patch))
    }

    pub fn get(&self, id: &str) -> Option<&PeripheralRecord> {
        self.index.get(id).map(|&slot| &self.records[slot])
    }

    pub fn values(&self) -> &[PeripheralRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.records.clone())
    }
}
