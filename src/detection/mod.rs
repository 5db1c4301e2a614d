//! Object detection over images with a loaded COCO detection model.

mod decode;
mod detector;
mod labels;

pub use decode::decode_rgb;
pub use detector::{
    DETECTION_BOXES, DETECTION_CLASSES, DETECTION_SCORES, DETECTION_THRESHOLD, DetectStage,
    DetectionBox, INPUT_TENSOR, NUM_DETECTIONS, ObjectDetector,
};
pub use labels::{COCO_LABELS, NUM_LABELS, label};
