//! Reinforcement-learning macro placement.
//!
//! The pipeline turns a netlist into tensors and trains a PPO agent that
//! places one macro per step onto a discrete grid:
//!
//! ```text
//! NetlistDb -> ConnectivityGraph -> GraphEncoder  \
//!                                                  +-> ActorCritic -> PpoTrainer
//! PlaceEnv  -> occupancy grid    -> SpatialEncoder /
//! ```
//!
//! [`GraphEncoder`] embeds each macro from netlist connectivity alone,
//! [`SpatialEncoder`] embeds the current occupancy image, and
//! [`ActorCritic`] reads per-cell logits and a state value off the joint
//! feature. [`PpoTrainer`] drives episodes through a frozen copy of the
//! network and optimizes the two heads with the clipped surrogate
//! objective.

pub mod gcn;
pub mod policy;
pub mod spatial;
pub mod train;

pub use gcn::{GraphEncoder, GraphTensors};
pub use policy::{ActorCritic, PpoConfig, RolloutBuffer};
pub use spatial::SpatialEncoder;
pub use train::{PpoTrainer, TrainConfig};
