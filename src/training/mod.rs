mod state;
mod trainer;

pub use state::{EpochReport, TrainingState};
pub use trainer::{TrainedModel, Trainer};
