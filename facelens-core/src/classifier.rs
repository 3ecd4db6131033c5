//! Age and gender classification.

use std::path::Path;

use anyhow::Result;
use log::debug;
use tract_onnx::prelude::Tensor;

use crate::device::ComputeDevice;
use crate::face_crop::FACE_INPUT_SIZE;
use crate::labels::{NUM_AGE_CLASSES, NUM_GENDER_CLASSES};
use crate::model::OnnxModel;
use facelens_utils::timing_guard;

/// Raw scores from the two classifier heads.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierLogits {
    /// One score per gender class.
    pub gender: Vec<f32>,
    /// One score per age bucket.
    pub age: Vec<f32>,
}

impl ClassifierLogits {
    pub fn gender_class(&self) -> Option<usize> {
        argmax(&self.gender)
    }

    pub fn age_class(&self) -> Option<usize> {
        argmax(&self.age)
    }
}

/// Scores a normalized `[1, 3, 224, 224]` face tensor.
pub trait AgeGenderClassifier: Send + Sync + std::fmt::Debug {
    fn classify(&self, input: Tensor) -> Result<ClassifierLogits>;
}

/// Index of the largest value.
///
/// The lowest index wins ties and NaN never wins. Returns `None` when no value is comparable.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

/// ResNet-50 backbone with gender and age heads, exported to ONNX.
#[derive(Debug)]
pub struct ResNetClassifier {
    model: OnnxModel,
}

impl ResNetClassifier {
    pub fn load<P: AsRef<Path>>(model_path: P, device: ComputeDevice) -> Result<Self> {
        let side = FACE_INPUT_SIZE as usize;
        let model = OnnxModel::load(model_path, "classifier", Some([1, 3, side, side]), device)?;
        debug!("Classifier ready on {}", model.device());
        Ok(Self { model })
    }
}

impl AgeGenderClassifier for ResNetClassifier {
    fn classify(&self, input: Tensor) -> Result<ClassifierLogits> {
        let _guard = timing_guard("facelens_core::classify", log::Level::Debug);
        let outputs = self.model.run(input)?;
        logits_from_outputs(&outputs)
    }
}

/// Split graph outputs into gender and age scores, validating their sizes.
fn logits_from_outputs(outputs: &[Tensor]) -> Result<ClassifierLogits> {
    anyhow::ensure!(
        outputs.len() == 2,
        "classifier must produce 2 outputs (gender, age), got {}",
        outputs.len()
    );
    let head = |tensor: &Tensor, name: &str, expected: usize| -> Result<Vec<f32>> {
        let values = tensor
            .as_slice::<f32>()
            .map_err(|e| anyhow::anyhow!("{name} logits are not f32: {e}"))?;
        anyhow::ensure!(
            values.len() == expected,
            "{name} head must produce {expected} logits, got {}",
            values.len()
        );
        Ok(values.to_vec())
    };

    Ok(ClassifierLogits {
        gender: head(&outputs[0], "gender", NUM_GENDER_CLASSES)?,
        age: head(&outputs[1], "age", NUM_AGE_CLASSES)?,
    })
}
