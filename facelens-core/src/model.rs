use std::{fmt::Write, path::Path};

use anyhow::{Context, Result};
use log::{debug, warn};
use tract_onnx::prelude::{
    DatumExt, Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact,
    TypedOp, tvec,
};

use crate::device::ComputeDevice;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A loaded, runnable ONNX graph.
///
/// Both facelens models go through this wrapper: it parses the graph with `tract-onnx`, pins the
/// input shape when one is given, and optimizes the plan once at load time. The plan is
/// immutable afterwards, so a single instance can serve concurrent callers.
#[derive(Debug)]
pub struct OnnxModel {
    runnable: RunnableModel,
    name: &'static str,
    device: ComputeDevice,
}

impl OnnxModel {
    /// Load and optimize an ONNX graph.
    ///
    /// # Arguments
    ///
    /// * `model_path` - The ONNX file to load.
    /// * `name` - Short label used in logs and error messages.
    /// * `input_shape` - Optional fixed `[N, C, H, W]` f32 input shape.
    /// * `device` - The compute device resolved at startup.
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        name: &'static str,
        input_shape: Option<[usize; 4]>,
        device: ComputeDevice,
    ) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(path.exists(), "model file not found: {}", path.display());

        let runnable = match load_runnable_model(path, input_shape, true) {
            Ok(model) => {
                debug!(
                    "{name} model {} optimized successfully for {}",
                    path.display(),
                    device.label()
                );
                model
            }
            Err(opt_err) => {
                let optimize_msg = format!("{opt_err}");
                let mut chain_msg = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "{name} model {} failed optimized load ({}); falling back to decluttered graph.\nError chain:\n{}",
                    path.display(),
                    optimize_msg,
                    chain_msg.trim_end()
                );
                load_runnable_model(path, input_shape, false).with_context(|| {
                    format!(
                        "fallback to decluttered {name} graph failed after optimize error: {optimize_msg}"
                    )
                })?
            }
        };

        Ok(Self {
            runnable,
            name,
            device,
        })
    }

    /// Run the graph on a single input tensor and return every output in graph order.
    pub fn run(&self, input: Tensor) -> Result<Vec<Tensor>> {
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| anyhow::anyhow!("{} execution failed: {e}", self.name))?;
        Ok(outputs
            .into_iter()
            .map(|value| value.into_tensor())
            .collect())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }
}

fn load_runnable_model(
    path: &Path,
    input_shape: Option<[usize; 4]>,
    optimized: bool,
) -> Result<RunnableModel> {
    let mut model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?;

    // Exported graphs often carry a symbolic batch dimension; pinning it lets tract optimize.
    if let Some(shape) = input_shape {
        model = model
            .with_input_fact(0, f32::fact(shape).into())
            .map_err(|e| anyhow::anyhow!("unable to pin input shape {shape:?}: {e}"))?;
    }

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loading_missing_model_fails() {
        let err = OnnxModel::load("missing.onnx", "classifier", None, ComputeDevice::Cpu)
            .expect_err("missing file should fail");
        assert!(format!("{err}").contains("model file not found"));
    }

    #[test]
    fn invalid_model_produces_useful_error() {
        let mut temp = NamedTempFile::new().expect("temp file");
        temp.write_all(b"not a real onnx file")
            .expect("write mock model");

        let err = OnnxModel::load(
            temp.path(),
            "classifier",
            Some([1, 3, 224, 224]),
            ComputeDevice::Cpu,
        )
        .expect_err("invalid ONNX should fail");
        let message = format!("{err:#}");
        assert!(
            message.contains("failed to parse ONNX") || message.contains("unable to optimize"),
            "Unexpected error message: {message}"
        );
    }
}
