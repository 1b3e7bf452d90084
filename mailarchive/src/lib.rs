pub mod controller;

pub use controller::{Archive, ArchiveConfig, CONFIG_ENV, CONFIG_LOCATIONS, SHUTDOWN_BROADCAST};
