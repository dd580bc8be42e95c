pub mod broadcast;
pub mod capability;
pub mod directory;
pub mod endpoint;
pub mod settings;
pub mod snapshot;
