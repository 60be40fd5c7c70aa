pub mod config;
pub mod executor;
pub mod gcp;
pub mod harvest;
pub mod input;
pub mod job;
pub mod model;
pub mod providers;
pub mod secrets;
pub mod sink;
pub mod storage;
pub mod traits;

// Re-export common types for convenience
pub use executor::*;
pub use model::*;
pub use traits::*;
