//! Inference adapters – the black box between input and output vectors.
//!
//! Every adapter implements [`InferenceAdapter`].  Two are provided:
//!
//! - [`LinearTanhModel`] – deterministic `tanh(W · x)` with a weight matrix
//!   loaded once from a JSON model artifact.
//! - [`StandInModel`] – pseudo-random outputs in `[0, 1)` for environments
//!   without a trained model.
//!
//! [`select_adapter`] picks one at start-up: the artifact at the configured
//! path when it loads and matches the configured shape, the stand-in
//! otherwise.
//!
//! # Model artifact
//!
//! ```json
//! {
//!   "name": "corridor-follower",
//!   "version": "1",
//!   "trained_on": "corridor-2024-05",
//!   "accuracy": 0.91,
//!   "input_size": 3,
//!   "output_size": 2,
//!   "weights": [[0.1, 0.2, 0.3], [0.0, -1.0, 0.5]]
//! }
//! ```
//!
//! `name`, `version`, `trained_on` and `accuracy` are optional and only
//! reported; inference uses the shape and weights alone.

use std::fmt;
use std::fs;
use std::path::Path;

use neurobridge_types::{InputVector, NeuralError, OutputVector};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Adapter trait
// ─────────────────────────────────────────────────────────────────────────────

/// Which kind of adapter is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceBackend {
    /// Same input always yields the same output.
    Deterministic,
    /// Outputs are random; a trained model is not available.
    StandIn,
}

impl fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceBackend::Deterministic => write!(f, "deterministic"),
            InferenceBackend::StandIn => write!(f, "stand-in"),
        }
    }
}

/// Maps an [`InputVector`] to an [`OutputVector`].
///
/// Implementations must not mutate their parameters while inferring; the
/// runtime checks the returned length against the configured output size.
pub trait InferenceAdapter: Send + Sync {
    /// The kind of adapter, reported in the pipeline status.
    fn backend(&self) -> InferenceBackend;

    /// `false` when the adapter cannot serve inference yet.
    fn is_ready(&self) -> bool {
        true
    }

    /// Validation accuracy recorded with the model, if any.
    fn accuracy(&self) -> Option<f32> {
        None
    }

    /// Run inference on one input vector.
    fn infer(&self, input: &InputVector) -> Result<OutputVector, NeuralError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Deterministic model
// ─────────────────────────────────────────────────────────────────────────────

/// On-disk representation of a [`LinearTanhModel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Free-form description of the training data.
    #[serde(default)]
    pub trained_on: Option<String>,
    #[serde(default)]
    pub accuracy: Option<f32>,
    pub input_size: usize,
    pub output_size: usize,
    /// `output_size` rows of `input_size` weights.
    pub weights: Vec<Vec<f32>>,
}

/// Deterministic single-layer model: `output[j] = tanh(Σᵢ W[j][i] · x[i])`.
#[derive(Debug, Clone)]
pub struct LinearTanhModel {
    input_size: usize,
    output_size: usize,
    /// Row-major `output_size × input_size`.
    weights: Vec<f32>,
    name: Option<String>,
    version: Option<String>,
    trained_on: Option<String>,
    accuracy: Option<f32>,
}

impl LinearTanhModel {
    /// Build a model from weight rows (one row per output).
    ///
    /// # Errors
    ///
    /// Returns [`NeuralError::InvalidConfig`] when there are no rows, a row
    /// is empty or ragged, or a weight is not finite.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, NeuralError> {
        let output_size = rows.len();
        let input_size = rows.first().map(Vec::len).unwrap_or(0);
        if output_size == 0 || input_size == 0 {
            return Err(NeuralError::InvalidConfig(
                "weight matrix must have at least one row and one column".to_string(),
            ));
        }
        if let Some((j, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != input_size) {
            return Err(NeuralError::InvalidConfig(format!(
                "weight row {j} has {} columns, expected {input_size}",
                row.len()
            )));
        }
        let weights: Vec<f32> = rows.into_iter().flatten().collect();
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(NeuralError::InvalidConfig("weight matrix contains a non-finite value".to_string()));
        }
        Ok(Self {
            input_size,
            output_size,
            weights,
            name: None,
            version: None,
            trained_on: None,
            accuracy: None,
        })
    }

    /// Build a model from a parsed artifact, checking its declared shape.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, NeuralError> {
        let ModelArtifact {
            name,
            version,
            trained_on,
            accuracy,
            input_size,
            output_size,
            weights,
        } = artifact;
        let mut model = Self::from_rows(weights)?;
        if model.input_size != input_size || model.output_size != output_size {
            return Err(NeuralError::ShapeMismatch {
                stage: "model artifact".to_string(),
                expected: input_size * output_size,
                actual: model.input_size * model.output_size,
            });
        }
        model.name = name;
        model.version = version;
        model.trained_on = trained_on;
        model.accuracy = accuracy;
        Ok(model)
    }

    /// Read and parse the JSON artifact at `path`.
    ///
    /// Every failure is reported as [`NeuralError::ModelLoad`].
    pub fn load(path: &Path) -> Result<Self, NeuralError> {
        let load_err = |details: String| NeuralError::ModelLoad {
            path: path.display().to_string(),
            details,
        };
        let raw = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let artifact: ModelArtifact = serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))?;
        Self::from_artifact(artifact).map_err(|e| load_err(e.to_string()))
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn trained_on(&self) -> Option<&str> {
        self.trained_on.as_deref()
    }
}

impl InferenceAdapter for LinearTanhModel {
    fn backend(&self) -> InferenceBackend {
        InferenceBackend::Deterministic
    }

    fn accuracy(&self) -> Option<f32> {
        self.accuracy
    }

    fn infer(&self, input: &InputVector) -> Result<OutputVector, NeuralError> {
        if input.len() != self.input_size {
            return Err(NeuralError::ShapeMismatch {
                stage: "inference input".to_string(),
                expected: self.input_size,
                actual: input.len(),
            });
        }
        let x = input.as_slice();
        let output = self
            .weights
            .chunks_exact(self.input_size)
            .map(|row| row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f32>().tanh())
            .collect();
        Ok(OutputVector::from_vec(output))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stand-in model
// ─────────────────────────────────────────────────────────────────────────────

/// Produces a fresh pseudo-random vector in `[0, 1)` on every call.
#[derive(Debug, Clone, Copy)]
pub struct StandInModel {
    output_size: usize,
}

impl StandInModel {
    pub fn new(output_size: usize) -> Self {
        Self { output_size }
    }
}

impl InferenceAdapter for StandInModel {
    fn backend(&self) -> InferenceBackend {
        InferenceBackend::StandIn
    }

    fn infer(&self, _input: &InputVector) -> Result<OutputVector, NeuralError> {
        let mut rng = rand::thread_rng();
        let output = (0..self.output_size).map(|_| rng.gen_range(0.0f32..1.0)).collect();
        Ok(OutputVector::from_vec(output))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────────────

/// Choose the adapter for a pipeline of the given shape.
///
/// Loads the artifact at `model_path` when one is configured.  A missing,
/// unreadable, malformed or wrongly-shaped artifact is logged and replaced by
/// a [`StandInModel`]; this never fails.
pub fn select_adapter(
    model_path: Option<&Path>,
    input_size: usize,
    output_size: usize,
) -> Box<dyn InferenceAdapter> {
    let Some(path) = model_path else {
        info!(input_size, output_size, "no model path configured; using stand-in inference");
        return Box::new(StandInModel::new(output_size));
    };

    let loaded = LinearTanhModel::load(path).and_then(|model| {
        if model.input_size() != input_size || model.output_size() != output_size {
            return Err(NeuralError::ModelLoad {
                path: path.display().to_string(),
                details: format!(
                    "model is {}x{}, pipeline expects {}x{}",
                    model.output_size(),
                    model.input_size(),
                    output_size,
                    input_size
                ),
            });
        }
        Ok(model)
    });

    match loaded {
        Ok(model) => {
            info!(
                path = %path.display(),
                name = model.name().unwrap_or("(unnamed)"),
                version = model.version().unwrap_or("(unversioned)"),
                trained_on = model.trained_on().unwrap_or("(unknown)"),
                accuracy = ?model.accuracy(),
                input_size,
                output_size,
                "loaded deterministic model"
            );
            Box::new(model)
        }
        Err(e) => {
            warn!(error = %e, "failed to load model; using stand-in inference");
            Box::new(StandInModel::new(output_size))
        }
    }
}
