pub mod config;
pub mod constants;
pub mod env;
pub mod errors;
pub mod logging;
pub mod model;
pub mod namespace;
pub mod workitem;
