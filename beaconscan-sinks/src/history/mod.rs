pub mod jsonl;
pub mod noop;

use std::{
    error::Error,
    ffi::OsStr,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use beaconscan_domain::event::HostEvent;

use crate::history::jsonl::JsonLinesEventSink;

/// A host event together with the moment it was delivered.
#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct RecordedEvent {
    pub date_time: DateTime<Utc>,
    #[serde(flatten)]
    pub event: HostEvent,
}

impl RecordedEvent {
    pub fn new(date_time: DateTime<Utc>, event: HostEvent) -> RecordedEvent {
        RecordedEvent { date_time, event }
    }

    pub fn now(event: HostEvent) -> RecordedEvent {
        RecordedEvent::new(Utc::now(), event)
    }
}

#[derive(PartialEq, Debug)]
pub enum EventSinkFormat {
    JsonLines(PathBuf),
}

impl EventSinkFormat {
    pub fn create_from_file<P>(path_arg: P) -> Result<EventSinkFormat, Box<dyn Error>>
    where
        P: AsRef<Path>,
    {
        let path = path_arg.as_ref();
        match path.extension().and_then(OsStr::to_str) {
            Some("jsonl" | "ndjson") => Ok(EventSinkFormat::JsonLines(path.to_path_buf())),
            _ => Err(format!("unknown type: {}", path.display()).into()),
        }
    }

    pub fn to_sink(&self) -> Result<Box<dyn EventSink>, Box<dyn Error>> {
        match self {
            EventSinkFormat::JsonLines(path) => {
                let file = File::create(path)?;
                Ok(Box::new(JsonLinesEventSink::create_from_writer(
                    BufWriter::new(file),
                )))
            }
        }
    }
}

#[async_trait]
pub trait EventSink: Send {
    async fn save(&mut self, events: &[RecordedEvent]) -> Result<(), Box<dyn Error>>;
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>>;
}

#[cfg(test)]
mod test {
    use super::EventSinkFormat;

    #[test]
    fn jsonl_format_matching() {
        for valid in ["events.jsonl", "out/events.ndjson"] {
            assert_eq!(
                EventSinkFormat::create_from_file(valid).unwrap(),
                EventSinkFormat::JsonLines(valid.into())
            );
        }
    }

    #[test]
    fn format_not_matching() {
        let invalid = vec!["foop.json", "farp", "feep.sqlite"];

        for i in invalid {
            assert!(EventSinkFormat::create_from_file(i).is_err());
        }
    }
}
