pub mod clobberer;
pub mod config;
pub mod errors;
pub mod introspection;
pub mod logging;
