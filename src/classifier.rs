use std::{path::Path, sync::OnceLock};

use log::info;
use ndarray::arr2;

use crate::{
    ProtoErr, Result,
    network::{INPUT, OUTPUT},
    runtime::{Feed, Tensor},
    species::{NUM_SPECIES, Species},
    store::{DEFAULT_SIGNATURE, DEFAULT_TAG, ModelHandle, ModelStore},
};

/// Predicts the species of an iris with a trained model.
///
/// The model is set at most once, either at construction or through `load`, and only read
/// afterwards, so a single classifier can serve concurrent calls.
#[derive(Debug, Default)]
pub struct Classifier {
    model: OnceLock<ModelHandle>,
}

impl Classifier {
    /// Creates a classifier without a model, every call fails until `load` succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a classifier over an already loaded model.
    pub fn with_model(model: ModelHandle) -> Self {
        Self {
            model: OnceLock::from(model),
        }
    }

    /// Loads the model exported at `path`.
    ///
    /// # Returns
    /// An error if the store fails to load it or if a model was already set.
    pub fn load<S: ModelStore>(&self, store: &S, path: &Path) -> Result<()> {
        let model = store.load(path, DEFAULT_TAG)?;
        self.model
            .set(model)
            .map_err(|_| ProtoErr::model_load(path, "the classifier already has a model"))?;

        info!("iris model functions: {:?}", self.model.get().map(ModelHandle::signatures));
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Classifies a single iris.
    ///
    /// # Arguments
    /// * `sepal_length`, `sepal_width`, `petal_length`, `petal_width` - The measurements, in
    ///   the order the model was trained with.
    ///
    /// # Returns
    /// The most probable species, the lowest species index winning ties. `ModelNotLoaded` if
    /// there is no model yet.
    pub fn classify(
        &self,
        sepal_length: f32,
        sepal_width: f32,
        petal_length: f32,
        petal_width: f32,
    ) -> Result<Species> {
        let model = self.model.get().ok_or(ProtoErr::ModelNotLoaded)?;

        let features = [sepal_length, sepal_width, petal_length, petal_width];
        let feed = Feed::from([(INPUT.to_string(), Tensor::from(arr2(&[features])))]);
        let outputs = model.call(DEFAULT_SIGNATURE, feed)?;

        let probabilities = outputs
            .get(OUTPUT)
            .ok_or_else(|| ProtoErr::ModelOutputMissing {
                name: OUTPUT.to_string(),
            })?
            .to_matrix("probabilities", NUM_SPECIES)?;

        if probabilities.nrows() != 1 {
            return Err(ProtoErr::ShapeMismatch {
                what: "probability rows",
                got: probabilities.nrows(),
                expected: 1,
            });
        }

        let species = Species::decide(probabilities.row(0))?;
        info!(
            "for sepal_length {sepal_length}, sepal_width {sepal_width}, petal_length {petal_length}, \
             petal_width {petal_width} predicted {species} from {:?}",
            probabilities.row(0).to_vec()
        );

        Ok(species)
    }

    /// Same as `classify`, returning the species name used in the dataset.
    pub fn classify_name(
        &self,
        sepal_length: f32,
        sepal_width: f32,
        petal_length: f32,
        petal_width: f32,
    ) -> Result<&'static str> {
        self.classify(sepal_length, sepal_width, petal_length, petal_width)
            .map(Species::name)
    }
}
