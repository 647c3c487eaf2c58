pub mod error;
pub mod dimensions;
pub mod atmosphere;
pub mod context;
pub mod units;
pub mod species;
pub mod jacobian;
pub mod config;
pub mod logging;
