use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("no Bluetooth adapters found")]
    NoAdapter,

    #[error("stack not started")]
    NotStarted,

    #[error("unknown peripheral: {0}")]
    UnknownPeripheral(String),

    #[error("bluetooth error: {0}")]
    Btle(#[from] btleplug::Error),

    #[error("event channel closed")]
    ChannelClosed,

    #[error("{0}")]
    Other(String),
}

pub type StackResult<T> = std::result::Result<T, StackError>;
