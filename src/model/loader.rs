//! Feature-extraction network loader.
//!
//! Downloads the TF.js graph-model definition served with the application,
//! hands it to a [`GraphRuntime`] and runs one warm-up inference so the
//! first real scan does not pay the initialisation cost.

use std::time::Duration;

use futures_util::StreamExt;
use ndarray::{Array4, ArrayD, ArrayView4};
use serde::{Deserialize, Serialize};

use super::cache::ModelCache;
use crate::detect::with_trailing_slash;

/// Path of the MobileNet v3 definition, relative to the site base URL.
pub const MODEL_PATH: &str = "assets/tfjs-savedmodel/mobilenet_v3_large_1.0_224/model.json";

/// Default network input width and height.
pub const DEFAULT_INPUT_SIZE: usize = 224;

/// Status reported once the model is ready.
pub const READY_STATUS: &str = "Ready to scan..";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Model server error: {0}")]
    ApiError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed model definition: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid model definition: {0}")]
    InvalidDefinition(String),

    #[error("Inference failed: {0}")]
    InferenceError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WeightSpec {
    pub name: String,
    #[serde(default)]
    pub shape: Vec<usize>,
    pub dtype: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WeightGroup {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub weights: Vec<WeightSpec>,
}

/// A TF.js `model.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub generated_by: Option<String>,
    #[serde(default)]
    pub converted_by: Option<String>,
    #[serde(default)]
    pub model_topology: serde_json::Value,
    #[serde(default)]
    pub weights_manifest: Vec<WeightGroup>,
}

impl ModelDefinition {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelError> {
        let definition: ModelDefinition = serde_json::from_slice(bytes)?;
        definition.validate()?;
        Ok(definition)
    }

    /// A graph model needs a topology; a declared format must be `graph-model`.
    pub fn validate(&self) -> Result<(), ModelError> {
        if let Some(format) = &self.format {
            if format != "graph-model" {
                return Err(ModelError::InvalidDefinition(format!(
                    "expected graph-model, got '{}'",
                    format
                )));
            }
        }
        if self.model_topology.is_null() {
            return Err(ModelError::InvalidDefinition(
                "missing modelTopology".to_string(),
            ));
        }
        Ok(())
    }

    pub fn weight_count(&self) -> usize {
        self.weights_manifest.iter().map(|g| g.weights.len()).sum()
    }

    /// Total number of scalar parameters across all weights.
    pub fn parameter_count(&self) -> usize {
        self.weights_manifest
            .iter()
            .flat_map(|g| &g.weights)
            .map(|w| w.shape.iter().product::<usize>())
            .sum()
    }

    /// Shard files, relative to the definition's URL.
    pub fn weight_files(&self) -> Vec<&str> {
        self.weights_manifest
            .iter()
            .flat_map(|g| g.paths.iter().map(String::as_str))
            .collect()
    }
}

/// `{statusMessage}` reported once loading finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatus {
    pub status_message: String,
}

/// Executes a loaded graph.
pub trait GraphModel: Send + Sync {
    /// Run the network on an NHWC batch.
    fn predict(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, ModelError>;
}

/// Builds executable graphs from definitions.
///
/// The crate ships no inference backend. Embedders supply one to
/// [`FeatureModelLoader::load`]; the CLI only fetches and describes the
/// definition.
pub trait GraphRuntime: Send + Sync {
    /// `model_url` is where the definition came from; weight shards are
    /// resolved relative to it.
    fn load(
        &self,
        definition: &ModelDefinition,
        model_url: &str,
    ) -> Result<Box<dyn GraphModel>, ModelError>;
}

/// A ready feature-extraction network.
pub struct FeatureModel {
    definition: ModelDefinition,
    graph: Box<dyn GraphModel>,
    input_width: usize,
    input_height: usize,
}

impl std::fmt::Debug for FeatureModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureModel")
            .field("input_width", &self.input_width)
            .field("input_height", &self.input_height)
            .field("weights", &self.definition.weight_count())
            .finish_non_exhaustive()
    }
}

impl FeatureModel {
    pub fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    /// Input shape `[1, height, width, 3]`.
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.input_height, self.input_width, 3]
    }

    /// Run the network. The batch must match [`FeatureModel::input_shape`]
    /// apart from the batch size.
    pub fn predict(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, ModelError> {
        let shape = input.shape();
        if shape[1] != self.input_height || shape[2] != self.input_width || shape[3] != 3 {
            return Err(ModelError::InferenceError(format!(
                "expected input [N, {}, {}, 3], got {:?}",
                self.input_height, self.input_width, shape
            )));
        }
        self.graph.predict(input)
    }

    /// Run a single inference on zeros and discard the output.
    fn warm_up(&self) -> Result<(), ModelError> {
        let zeros = Array4::<f32>::zeros((1, self.input_height, self.input_width, 3));
        let output = self.predict(zeros.view())?;
        log::debug!("Warm-up inference produced shape {:?}", output.shape());
        Ok(())
    }

    pub fn status(&self) -> LoadStatus {
        LoadStatus {
            status_message: READY_STATUS.to_string(),
        }
    }
}

/// Fetches the model definition and prepares the network.
pub struct FeatureModelLoader {
    base_url: String,
    http_client: reqwest::Client,
    cache: Option<ModelCache>,
    input_width: usize,
    input_height: usize,
}

impl FeatureModelLoader {
    /// Loader for the model served under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ModelError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: with_trailing_slash(&base_url.into()),
            http_client,
            cache: None,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
        })
    }

    pub fn with_cache(mut self, cache: ModelCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_input_size(mut self, width: usize, height: usize) -> Self {
        self.input_width = width;
        self.input_height = height;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model_url(&self) -> String {
        format!("{}{}", self.base_url, MODEL_PATH)
    }

    /// Get the model definition, from the cache when possible.
    pub async fn fetch_definition(&self) -> Result<ModelDefinition, ModelError> {
        let url = self.model_url();

        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&url)) {
            match std::fs::read(&cached)
                .map_err(ModelError::from)
                .and_then(|bytes| ModelDefinition::from_slice(&bytes))
            {
                Ok(definition) => {
                    log::debug!("Using cached model definition {:?}", cached);
                    return Ok(definition);
                }
                Err(e) => log::warn!("Ignoring unusable cached model {:?}: {}", cached, e),
            }
        }

        let bytes = self.download(&url).await?;
        let definition = ModelDefinition::from_slice(&bytes)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&url, &bytes) {
                log::warn!("Failed to cache model definition: {}", e);
            }
        }

        Ok(definition)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ModelError> {
        log::info!("Downloading model definition from {}", url);
        let response = self.http_client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ModelError::ApiError(format!(
                "GET {} failed with status {}: {}",
                url, status, error_text
            )));
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes)
    }

    /// Fetch the definition, build the graph and warm it up once.
    pub async fn load(&self, runtime: &dyn GraphRuntime) -> Result<FeatureModel, ModelError> {
        let definition = self.fetch_definition().await?;
        let graph = runtime.load(&definition, &self.model_url())?;

        let model = FeatureModel {
            definition,
            graph,
            input_width: self.input_width,
            input_height: self.input_height,
        };
        model.warm_up()?;
        log::info!("{}", READY_STATUS);
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "format": "graph-model",
            "generatedBy": "2.9.1",
            "convertedBy": "TensorFlow.js Converter v3.18.0",
            "modelTopology": {"node": []},
            "weightsManifest": [{
                "paths": ["group1-shard1of2.bin", "group1-shard2of2.bin"],
                "weights": [
                    {"name": "conv/kernel", "shape": [3, 3, 3, 16], "dtype": "float32"},
                    {"name": "conv/bias", "shape": [16], "dtype": "float32"}
                ]
            }]
        })
    }

    #[test]
    fn test_parse_definition() {
        let bytes = serde_json::to_vec(&sample()).unwrap();
        let def = ModelDefinition::from_slice(&bytes).unwrap();
        assert_eq!(def.format.as_deref(), Some("graph-model"));
        assert_eq!(def.weight_count(), 2);
        assert_eq!(def.parameter_count(), 3 * 3 * 3 * 16 + 16);
        assert_eq!(
            def.weight_files(),
            vec!["group1-shard1of2.bin", "group1-shard2of2.bin"]
        );
    }

    #[test]
    fn test_layers_model_rejected() {
        let mut json = sample();
        json["format"] = serde_json::json!("layers-model");
        let err = ModelDefinition::from_slice(&serde_json::to_vec(&json).unwrap()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidDefinition(_)));
    }

    #[test]
    fn test_missing_topology_rejected() {
        let err = ModelDefinition::from_slice(br#"{"format": "graph-model"}"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidDefinition(_)));
    }

    #[test]
    fn test_model_url() {
        let loader = FeatureModelLoader::new("http://localhost:8000").unwrap();
        assert_eq!(
            loader.model_url(),
            "http://localhost:8000/assets/tfjs-savedmodel/mobilenet_v3_large_1.0_224/model.json"
        );
    }

    #[test]
    fn test_load_status_json() {
        let status = LoadStatus {
            status_message: READY_STATUS.to_string(),
        };
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            serde_json::json!({"statusMessage": "Ready to scan.."})
        );
    }
}
