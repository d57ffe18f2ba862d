pub mod advertising;
pub mod event;
pub mod peripheral;
pub mod registry;
pub mod snapshot;
