pub mod config;
pub mod format;
pub mod monitor;
pub mod shutdown;
pub mod system;
