pub mod db;
pub mod env;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod rl;

// Re-export commonly used types for convenience
pub use db::NetlistDb;
pub use env::{EnvConfig, Observation, PlaceEnv, StepResult};
pub use error::PlaceError;
pub use graph::ConnectivityGraph;
pub use rl::{ActorCritic, PpoConfig, PpoTrainer, TrainConfig};
