use std::fmt::{self, Display};

use ndarray::{Array1, ArrayView1};

use crate::{ProtoErr, Result};

/// Number of classes the iris classifier predicts.
pub const NUM_SPECIES: usize = 3;

/// The iris species the classifier can predict.
///
/// The discriminant is the position of the species in every one-hot target and in every output
/// row of the network. Training and inference both go through this type, so the assignment only
/// lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Species {
    Setosa = 0,
    Versicolor = 1,
    Virginica = 2,
}

impl Species {
    /// All the species in output order.
    pub const ALL: [Species; NUM_SPECIES] = [Self::Setosa, Self::Versicolor, Self::Virginica];

    /// Returns the position of this species in the output vector.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns the species at the given output position, if any.
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Returns the name used for this species in the dataset and in responses.
    pub fn name(self) -> &'static str {
        match self {
            Self::Setosa => "Iris-setosa",
            Self::Versicolor => "Iris-versicolor",
            Self::Virginica => "Iris-virginica",
        }
    }

    /// Parses a dataset species name.
    ///
    /// # Arguments
    /// * `name` - The name as it appears in the dataset.
    ///
    /// # Returns
    /// The species, or `None` if the name is unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Encodes this species as a one-hot target vector.
    pub fn one_hot(self) -> Array1<f32> {
        let mut target = Array1::zeros(NUM_SPECIES);
        target[self.index()] = 1.0;
        target
    }

    /// Decodes a one-hot vector back into its species.
    ///
    /// # Returns
    /// `None` unless the vector has exactly `NUM_SPECIES` entries, one of them 1.0 and the rest
    /// 0.0.
    pub fn from_one_hot(target: ArrayView1<f32>) -> Option<Self> {
        if target.len() != NUM_SPECIES {
            return None;
        }

        let ones = target.iter().filter(|&&v| v == 1.0).count();
        let zeros = target.iter().filter(|&&v| v == 0.0).count();
        if ones != 1 || zeros != NUM_SPECIES - 1 {
            return None;
        }

        target
            .iter()
            .position(|&v| v == 1.0)
            .and_then(Self::from_index)
    }

    /// Picks the most probable species out of a probability row.
    ///
    /// The winner is the entry with the strictly greatest probability; on an exact tie the
    /// species with the lowest index wins. NaN entries never win.
    ///
    /// # Arguments
    /// * `probabilities` - One probability per species, in output order.
    ///
    /// # Returns
    /// The chosen species or a shape mismatch if the row does not have `NUM_SPECIES` entries.
    pub fn decide(probabilities: ArrayView1<f32>) -> Result<Self> {
        if probabilities.len() != NUM_SPECIES {
            return Err(ProtoErr::ShapeMismatch {
                what: "probabilities",
                got: probabilities.len(),
                expected: NUM_SPECIES,
            });
        }

        let mut best = 0;
        for (idx, &p) in probabilities.iter().enumerate().skip(1) {
            let current = probabilities[best];
            if p > current || (current.is_nan() && !p.is_nan()) {
                best = idx;
            }
        }

        // SAFETY: `best` is always lower than `NUM_SPECIES`.
        Ok(Self::ALL[best])
    }
}

impl Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
