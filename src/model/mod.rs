//! Feature-extraction model loading.

mod cache;
mod loader;

pub use cache::{CacheEntry, ModelCache};
pub use loader::{
    FeatureModel, FeatureModelLoader, GraphModel, GraphRuntime, LoadStatus, ModelDefinition,
    ModelError, WeightGroup, WeightSpec, DEFAULT_INPUT_SIZE, MODEL_PATH, READY_STATUS,
};
