use std::{fmt, io, path::Path, sync::OnceLock};

use log::{debug, info};
use ndarray::Axis;
use serde::{Deserialize, Serialize};

use super::{decode::decode_rgb, labels};
use crate::{
    ProtoErr, Result,
    runtime::{Feed, Tensor},
    store::{DEFAULT_SIGNATURE, DEFAULT_TAG, ModelHandle, ModelStore},
};

/// Detections scoring this much or less are dropped.
pub const DETECTION_THRESHOLD: f32 = 0.3;

// Names of the detection function's input and outputs.
pub const INPUT_TENSOR: &str = "input_tensor";
pub const NUM_DETECTIONS: &str = "num_detections";
pub const DETECTION_SCORES: &str = "detection_scores";
pub const DETECTION_BOXES: &str = "detection_boxes";
pub const DETECTION_CLASSES: &str = "detection_classes";

/// A detected object: its COCO class and its normalized box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub class_index: usize,
    pub y_min: f32,
    pub x_min: f32,
    pub y_max: f32,
    pub x_max: f32,
}

impl DetectionBox {
    /// Returns the COCO label of the detected class.
    pub fn label(&self) -> Option<&'static str> {
        labels::label(self.class_index)
    }
}

impl fmt::Display for DetectionBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:.3}, {:.3}, {:.3}, {:.3}]",
            self.class_index, self.y_min, self.x_min, self.y_max, self.x_max
        )
    }
}

/// The stages a single detection call goes through, always in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectStage {
    Decoding,
    Reshaping,
    Inferring,
    Filtering,
    Done,
    Failed,
}

impl DetectStage {
    /// Returns the stage following this one, terminal stages stay where they are.
    pub fn next(self) -> Self {
        match self {
            Self::Decoding => Self::Reshaping,
            Self::Reshaping => Self::Inferring,
            Self::Inferring => Self::Filtering,
            Self::Filtering => Self::Done,
            Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Tracks the stage of one detection call.
#[derive(Debug)]
struct Pipeline {
    stage: DetectStage,
}

impl Pipeline {
    fn start() -> Self {
        debug!("detection stage {:?}", DetectStage::Decoding);
        Self {
            stage: DetectStage::Decoding,
        }
    }

    fn advance(&mut self) {
        self.stage = self.stage.next();
        debug!("detection stage {:?}", self.stage);
    }

    fn fail(&mut self, err: &ProtoErr) {
        debug!("detection failed while {:?}: {err}", self.stage);
        self.stage = DetectStage::Failed;
    }
}

/// Finds objects in images with a loaded detection model.
///
/// The model's default function must take a `(1, height, width, 3)` byte tensor under
/// `input_tensor` and return `num_detections`, `detection_scores`, `detection_boxes` and
/// `detection_classes`, batch first.
#[derive(Debug)]
pub struct ObjectDetector {
    model: OnceLock<ModelHandle>,
    threshold: f32,
}

impl Default for ObjectDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectDetector {
    /// Creates a detector without a model, every call fails until `load` succeeds.
    pub fn new() -> Self {
        Self {
            model: OnceLock::new(),
            threshold: DETECTION_THRESHOLD,
        }
    }

    /// Creates a detector over an already loaded model.
    pub fn with_model(model: ModelHandle) -> Self {
        Self {
            model: OnceLock::from(model),
            threshold: DETECTION_THRESHOLD,
        }
    }

    /// Loads the detection model at `path`.
    ///
    /// # Returns
    /// An error if the store fails to load it or if a model was already set.
    pub fn load<S: ModelStore>(&self, store: &S, path: &Path) -> Result<()> {
        let model = store.load(path, DEFAULT_TAG)?;
        self.model
            .set(model)
            .map_err(|_| ProtoErr::model_load(path, "the detector already has a model"))?;

        info!("detection model functions: {:?}", self.model.get().map(ModelHandle::signatures));
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Detects the objects of an encoded image.
    ///
    /// The detections are kept in the order the model returned them.
    ///
    /// # Arguments
    /// * `image` - A PNG, JPEG, GIF or BMP image.
    ///
    /// # Returns
    /// Every detection scoring strictly more than the threshold, possibly none. On any failure no
    /// detection at all is returned.
    pub fn detect(&self, image: &[u8]) -> Result<Vec<DetectionBox>> {
        let model = self.model.get().ok_or(ProtoErr::ModelNotLoaded)?;

        let mut pipeline = Pipeline::start();
        let result = self.run_pipeline(model, image, &mut pipeline);
        if let Err(e) = &result {
            pipeline.fail(e);
        }

        result
    }

    /// Same as `detect`, serializing the detections as a JSON array.
    pub fn detect_bytes(&self, image: &[u8]) -> Result<Vec<u8>> {
        let boxes = self.detect(image)?;
        let json = serde_json::to_vec(&boxes).map_err(io::Error::from)?;

        info!("detection data: {}", String::from_utf8_lossy(&json));
        Ok(json)
    }

    fn run_pipeline(
        &self,
        model: &ModelHandle,
        image: &[u8],
        pipeline: &mut Pipeline,
    ) -> Result<Vec<DetectionBox>> {
        let pixels = decode_rgb(image)?;
        pipeline.advance();

        let batch = pixels.insert_axis(Axis(0));
        pipeline.advance();

        let feed = Feed::from([(INPUT_TENSOR.to_string(), Tensor::from(batch))]);
        let outputs = model.call(DEFAULT_SIGNATURE, feed)?;
        pipeline.advance();

        let boxes = self.filter(&outputs)?;
        pipeline.advance();

        Ok(boxes)
    }

    fn filter(&self, outputs: &Feed) -> Result<Vec<DetectionBox>> {
        let count = floats(outputs, NUM_DETECTIONS)?
            .first()
            .map(|n| n.max(0.).floor() as usize)
            .unwrap_or_default();

        let scores = floats(outputs, DETECTION_SCORES)?;
        let coords = floats(outputs, DETECTION_BOXES)?;
        let classes = floats(outputs, DETECTION_CLASSES)?;

        let available = scores.len().min(coords.len() / 4).min(classes.len());
        if count > available {
            return Err(ProtoErr::ShapeMismatch {
                what: "detections",
                got: available,
                expected: count,
            });
        }

        let mut boxes = Vec::new();
        for n in 0..count {
            if scores[n] <= self.threshold || scores[n].is_nan() {
                continue;
            }

            let class = classes[n].trunc();
            if !(0. ..labels::NUM_LABELS as f32).contains(&class) {
                return Err(ProtoErr::UnknownClassIndex {
                    index: class as i64,
                });
            }

            let corners = &coords[4 * n..4 * n + 4];
            if let Some(bad) = corners.iter().position(|c| !c.is_finite()) {
                return Err(ProtoErr::InvalidDetection {
                    index: n,
                    reason: format!("box coordinate {bad} is {}", corners[bad]),
                });
            }

            let [y_min, x_min, y_max, x_max] = [0, 1, 2, 3].map(|i| corners[i].clamp(0., 1.));
            let detection = DetectionBox {
                class_index: class as usize,
                y_min,
                x_min,
                y_max,
                x_max,
            };

            info!(
                "detected {detection}, label {}, score {}",
                detection.label().unwrap_or_default(),
                scores[n]
            );
            boxes.push(detection);
        }

        Ok(boxes)
    }
}

/// Flattens a float output of the detection function.
fn floats(outputs: &Feed, name: &str) -> Result<Vec<f32>> {
    let tensor = outputs
        .get(name)
        .ok_or_else(|| ProtoErr::ModelOutputMissing {
            name: name.to_string(),
        })?;

    let values = tensor.as_f32().ok_or(ProtoErr::ShapeMismatch {
        what: "detection output",
        got: 0,
        expected: tensor.shape().iter().product(),
    })?;

    Ok(values.iter().copied().collect())
}
