use std::{error::Error, io::Write};

use async_trait::async_trait;

use super::{EventSink, RecordedEvent};

pub struct JsonLinesEventSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesEventSink<W> {
    pub fn create_from_writer(writer: W) -> JsonLinesEventSink<W> {
        JsonLinesEventSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for JsonLinesEventSink<W> {
    async fn save(&mut self, events: &[RecordedEvent]) -> Result<(), Box<dyn Error>> {
        for event in events {
            serde_json::to_writer(&mut self.writer, event)?;
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>> {
        self.writer.flush()?;
        Ok(())
    }
}
