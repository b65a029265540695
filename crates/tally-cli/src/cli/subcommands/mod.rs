pub mod enrich;
pub mod entity;
pub mod export;

pub use enrich::EnrichCommands;
pub use entity::EntityCommands;
pub use export::ExportCommands;
