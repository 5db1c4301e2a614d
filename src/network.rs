use crate::{
    Result,
    dataset::NUM_FEATURES,
    runtime::{ActFn, DenseNames, GraphBuilder, GraphDef},
    species::NUM_SPECIES,
};

/// Seed for every random decision of the iris network: initial weights and sample shuffling.
pub const DEFAULT_SEED: u64 = 1234567;
/// Initial value of every bias.
pub const BIAS_INIT: f32 = 0.1;
pub const HIDDEN1_WIDTH: usize = 5;
pub const HIDDEN2_WIDTH: usize = 4;

// Names a saved model binds against. Renaming any of them breaks loading of exported models.
pub const INPUT: &str = "inputLayerPlaceholder";
pub const HIDDEN1_WEIGHTS: &str = "hiddenLayer1Weights";
pub const HIDDEN1_BIASES: &str = "hiddenLayer1Biases";
pub const HIDDEN1_ACTIVATION: &str = "hiddenLayer1Activation";
pub const HIDDEN2_WEIGHTS: &str = "hiddenLayer2Weights";
pub const HIDDEN2_BIASES: &str = "hiddenLayer2Biases";
pub const HIDDEN2_ACTIVATION: &str = "hiddenLayer2Activation";
pub const OUTPUT_WEIGHTS: &str = "outputLayerWeights";
pub const OUTPUT_BIASES: &str = "outputLayerBiases";
pub const OUTPUT: &str = "outputActivation";
/// The feed name of the one-hot targets, only used while training.
pub const TARGET: &str = "trainingOutputPlaceholder";

/// The iris classifier topology: `4 -> 5 (relu) -> 4 (relu) -> 3 (softmax)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkGraph {
    graph: GraphDef,
}

impl NetworkGraph {
    /// The name of the `(batch, 4)` features placeholder.
    pub fn input(&self) -> &str {
        INPUT
    }

    /// The name of the `(batch, 3)` species probabilities.
    pub fn output(&self) -> &str {
        OUTPUT
    }

    pub fn graph(&self) -> &GraphDef {
        &self.graph
    }

    pub fn into_graph(self) -> GraphDef {
        self.graph
    }
}

/// Builds the iris `NetworkGraph` from its fixed hyperparameters.
#[derive(Debug, Clone, Copy)]
pub struct NetworkBuilder {
    seed: u64,
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl NetworkBuilder {
    /// Creates a new `NetworkBuilder`.
    ///
    /// # Arguments
    /// * `seed` - The seed the weights initialization draws from.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Describes the network.
    ///
    /// The description is a pure function of the seed, two builds with the same seed yield the
    /// same graph and, once materialized, the same initial weights.
    ///
    /// # Returns
    /// The graph, the fixed topology always validates.
    pub fn build(&self) -> Result<NetworkGraph> {
        let hidden1 = DenseNames {
            weights: HIDDEN1_WEIGHTS,
            biases: HIDDEN1_BIASES,
            output: HIDDEN1_ACTIVATION,
        };
        let hidden2 = DenseNames {
            weights: HIDDEN2_WEIGHTS,
            biases: HIDDEN2_BIASES,
            output: HIDDEN2_ACTIVATION,
        };
        let output = DenseNames {
            weights: OUTPUT_WEIGHTS,
            biases: OUTPUT_BIASES,
            output: OUTPUT,
        };

        let graph = GraphBuilder::new(self.seed, INPUT, NUM_FEATURES)
            .dense(hidden1, HIDDEN1_WIDTH, BIAS_INIT, ActFn::Relu)
            .dense(hidden2, HIDDEN2_WIDTH, BIAS_INIT, ActFn::Relu)
            .dense(output, NUM_SPECIES, BIAS_INIT, ActFn::Softmax)
            .build()?;

        Ok(NetworkGraph { graph })
    }
}
