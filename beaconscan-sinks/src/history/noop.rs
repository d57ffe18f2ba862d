use std::error::Error;

use async_trait::async_trait;

use super::{EventSink, RecordedEvent};

#[derive(Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn save(&mut self, _: &[RecordedEvent]) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}
