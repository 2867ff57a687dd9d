pub mod types;
pub mod models;
pub mod registry;
pub mod tracker;
pub mod manager;

pub use types::*;
pub use models::*;
pub use registry::TaskRegistry;
pub use tracker::{ByteProgress, LineSignal, ProgressTracker};
pub use manager::{StartedTask, TaskManager};
