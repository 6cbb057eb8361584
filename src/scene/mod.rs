//! Shared scene buffer bookkeeping: per-object records and the sub-scene pool.

pub mod object;
pub mod pool;

pub use object::Instance;
pub use pool::{DrawArgs, ScenePool, SubSceneId};
