//! Iris species classification with a small dense network, and COCO object detection with a
//! loaded detection model.
//!
//! Training reads the iris dataset, trains a `4 -> 5 -> 4 -> 3` network with Adam and exports it
//! through a `ModelStore`. Classification and detection run functions of previously loaded
//! models.

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod network;
pub mod runtime;
pub mod species;
pub mod store;
pub mod training;

pub use classifier::Classifier;
pub use config::{AppConfig, TrainingConfig};
pub use dataset::{DatasetLoader, LabeledSample};
pub use detection::{DetectionBox, ObjectDetector};
pub use error::{ProtoErr, Result};
pub use network::{NetworkBuilder, NetworkGraph};
pub use species::Species;
pub use store::{ModelHandle, ModelStore, SavedModelStore, Signature, SignatureFunction};
pub use training::{EpochReport, Trainer};
