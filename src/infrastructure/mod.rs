pub mod capture;
pub mod config;
pub mod device;
pub mod input;
pub mod logging;
pub mod sources;
