pub mod command;
pub mod config;
pub mod filter;
pub mod language;
pub mod params;
pub mod toolchain;
pub mod watcher;
