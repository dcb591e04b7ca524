pub mod cancel;
pub mod config;
mod de;
pub mod domain;
pub mod errors;
pub mod experiment;
pub mod factory;
pub mod objects;
pub mod runners;
pub mod task;
pub mod traits;
