pub mod classifier;
pub mod delivery;
pub mod notifier;
pub mod registry;
pub mod scanner;
pub mod upload_events;
