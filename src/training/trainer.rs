use std::path::Path;

use log::{debug, info};
use ndarray::{Axis, arr2};
use rand::{SeedableRng, rngs::StdRng};

use super::{EpochReport, TrainingState};
use crate::{
    Result,
    config::TrainingConfig,
    dataset::{DatasetLoader, LabeledSample},
    network::{self, NetworkBuilder},
    runtime::{Adam, Feed, Minimize, Mse, Session, Tensor},
    species::Species,
    store::{DEFAULT_SIGNATURE, DEFAULT_TAG, ModelStore, Signature},
};

/// The outcome of a training run: the trained session and how each epoch went.
#[derive(Debug)]
pub struct TrainedModel {
    session: Session,
    reports: Vec<EpochReport>,
}

impl TrainedModel {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn reports(&self) -> &[EpochReport] {
        &self.reports
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}

/// Trains the iris network, one sample per optimizer step, and exports the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `config` - The epochs, learning rate and seed of the run.
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// The function a trained iris model serves: features in, species probabilities out.
    pub fn serving_signature() -> Signature {
        Signature::new(DEFAULT_SIGNATURE)
            .input(network::INPUT, network::INPUT)
            .output(network::OUTPUT, network::OUTPUT)
    }

    /// Reads the dataset at `dataset`, trains on it and exports the model to `export_path`.
    ///
    /// # Returns
    /// The per epoch reports, or the first error: a malformed record aborts the run before any
    /// training happens and nothing is exported if training fails.
    pub fn run<S: ModelStore>(
        &self,
        dataset: &Path,
        store: &S,
        export_path: &Path,
    ) -> Result<Vec<EpochReport>> {
        let samples = DatasetLoader::new().read_path(dataset)?;
        info!("read {} samples from {}", samples.len(), dataset.display());

        let model = self.train(&samples)?;
        self.save(&model, store, export_path)?;
        Ok(model.reports)
    }

    /// Trains a freshly initialized network.
    ///
    /// The samples are shuffled once with the configured seed and visited in that order on every
    /// epoch. Each visit runs one minimize step and checks the output computed before the update
    /// against the sample's species.
    ///
    /// # Arguments
    /// * `samples` - The training set, also used to measure the accuracy.
    ///
    /// # Returns
    /// The trained model or an error if a step fails.
    pub fn train(&self, samples: &[LabeledSample]) -> Result<TrainedModel> {
        let network = NetworkBuilder::new(self.config.seed).build()?;
        let mut session = Session::new(network.into_graph())?;

        let optimizer =
            Adam::with_learning_rate(session.graph().num_params(), self.config.learning_rate);
        let mut minimize = Minimize::new(network::TARGET, Mse::new(), optimizer);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut state = TrainingState::shuffled(samples.len(), &mut rng);
        let mut reports = Vec::with_capacity(self.config.epochs.get());

        for _ in 0..self.config.epochs.get() {
            for step in 0..state.order().len() {
                let sample = &samples[state.order()[step]];
                let feed = Feed::from([
                    (network::INPUT.to_string(), Tensor::from(arr2(&[sample.features()]))),
                    (
                        network::TARGET.to_string(),
                        Tensor::from(sample.species.one_hot().insert_axis(Axis(0))),
                    ),
                ]);

                let output = session.minimize(&mut minimize, &feed)?.output;
                let predicted = Species::decide(output.row(0))?;
                let predicted_ok = predicted == sample.species;

                debug!(
                    "epoch {} sample {step}: {sample:?} predicted {predicted} {:?} ok={predicted_ok}",
                    state.epoch(),
                    output.row(0).to_vec()
                );
                state.record(predicted_ok);
            }

            let report = state.finish_epoch();
            info!(
                epoch = report.epoch, correct = report.correct, total = report.total;
                "epoch finished, accuracy {:.3}", report.accuracy()
            );
            reports.push(report);
        }

        Ok(TrainedModel { session, reports })
    }

    /// Exports a trained model under the default tag and serving signature.
    pub fn save<S: ModelStore>(&self, model: &TrainedModel, store: &S, path: &Path) -> Result<()> {
        store.export(path, &model.session, &Self::serving_signature(), DEFAULT_TAG)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::ProtoErr;

    fn sample(features: [f32; 4], species: Species) -> LabeledSample {
        let [sepal_length, sepal_width, petal_length, petal_width] = features;
        LabeledSample {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
            species,
        }
    }

    fn samples() -> Vec<LabeledSample> {
        vec![
            sample([5.1, 3.5, 1.4, 0.2], Species::Setosa),
            sample([4.9, 3.0, 1.4, 0.2], Species::Setosa),
            sample([7.0, 3.2, 4.7, 1.4], Species::Versicolor),
            sample([6.4, 3.2, 4.5, 1.5], Species::Versicolor),
            sample([6.3, 3.3, 6.0, 2.5], Species::Virginica),
            sample([5.8, 2.7, 5.1, 1.9], Species::Virginica),
        ]
    }

    #[test]
    fn one_report_per_epoch() {
        let config = TrainingConfig {
            epochs: NonZeroUsize::new(3).unwrap(),
            ..Default::default()
        };

        let model = Trainer::new(config).train(&samples()).unwrap();
        let reports = model.reports();

        assert_eq!(reports.len(), 3);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.epoch, i);
            assert_eq!(report.total, 6);
            assert!(report.correct <= 6);
        }
    }

    #[test]
    fn training_is_deterministic() {
        let trainer = Trainer::default();

        let a = trainer.train(&samples()).unwrap();
        let b = trainer.train(&samples()).unwrap();

        assert_eq!(a.reports(), b.reports());
        assert_eq!(
            a.session().variable(network::OUTPUT_WEIGHTS),
            b.session().variable(network::OUTPUT_WEIGHTS)
        );
    }

    #[test]
    fn training_moves_the_weights() {
        let model = Trainer::default().train(&samples()).unwrap();
        let initial = Session::new(NetworkBuilder::default().build().unwrap().into_graph()).unwrap();

        assert_ne!(
            model.session().variable(network::HIDDEN1_WEIGHTS),
            initial.variable(network::HIDDEN1_WEIGHTS)
        );
    }

    #[test]
    fn run_fails_fast_on_malformed_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("iris.data");
        std::fs::write(&dataset, "5.1,3.5,1.4,0.2,Iris-setosa\n5.0,3.6,1.4,0.2,Iris-unknown\n")
            .unwrap();
        let export = dir.path().join("iris");

        let result = Trainer::default().run(&dataset, &crate::store::SavedModelStore, &export);

        assert!(matches!(result, Err(ProtoErr::DataFormat { line: 2, .. })));
        assert!(!export.exists());
    }
}
