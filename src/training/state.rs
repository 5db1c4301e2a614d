use rand::{Rng, seq::SliceRandom};

/// The accuracy of the network over one epoch, measured on the outputs computed before each
/// sample's update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochReport {
    pub epoch: usize,
    pub correct: usize,
    pub total: usize,
}

impl EpochReport {
    /// Returns the fraction of correctly predicted samples, 0 for an empty epoch.
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            return 0.;
        }

        self.correct as f32 / self.total as f32
    }
}

/// The mutable bookkeeping of a single training run.
#[derive(Debug)]
pub struct TrainingState {
    order: Vec<usize>,
    epoch: usize,
    correct: usize,
}

impl TrainingState {
    /// Creates the state for `len` samples, visited in an order shuffled once with `rng`.
    pub fn shuffled<R: Rng>(len: usize, rng: &mut R) -> Self {
        let mut order: Vec<_> = (0..len).collect();
        order.shuffle(rng);

        Self {
            order,
            epoch: 0,
            correct: 0,
        }
    }

    /// The sample indices in visiting order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn record(&mut self, predicted_ok: bool) {
        if predicted_ok {
            self.correct += 1;
        }
    }

    /// Closes the current epoch and starts counting the next one.
    pub fn finish_epoch(&mut self) -> EpochReport {
        let report = EpochReport {
            epoch: self.epoch,
            correct: self.correct,
            total: self.order.len(),
        };

        self.epoch += 1;
        self.correct = 0;
        report
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn shuffled_order_is_a_seeded_permutation() {
        let a = TrainingState::shuffled(150, &mut StdRng::seed_from_u64(1234567));
        let b = TrainingState::shuffled(150, &mut StdRng::seed_from_u64(1234567));
        assert_eq!(a.order(), b.order());

        let mut sorted = a.order().to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..150).collect::<Vec<_>>());
        assert_ne!(a.order(), sorted.as_slice());
    }

    #[test]
    fn epochs_count_correct_predictions_independently() {
        let mut state = TrainingState::shuffled(3, &mut StdRng::seed_from_u64(0));

        state.record(true);
        state.record(false);
        state.record(true);
        let first = state.finish_epoch();
        assert_eq!(
            first,
            EpochReport {
                epoch: 0,
                correct: 2,
                total: 3
            }
        );
        assert!((first.accuracy() - 2. / 3.).abs() < 1e-6);

        let second = state.finish_epoch();
        assert_eq!(second.epoch, 1);
        assert_eq!(second.correct, 0);
        assert_eq!(state.epoch(), 2);
    }

    #[test]
    fn empty_epochs_have_zero_accuracy() {
        let mut state = TrainingState::shuffled(0, &mut StdRng::seed_from_u64(0));
        assert_eq!(state.finish_epoch().accuracy(), 0.);
    }
}
