pub mod config;
pub mod logging;
pub mod paths;
pub mod settings;
pub mod state;
