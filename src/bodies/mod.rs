pub mod body;
pub mod registry;

pub use body::BodyState;
pub use registry::{BodyRegistry, PopulationChange, SpawnSettings};
