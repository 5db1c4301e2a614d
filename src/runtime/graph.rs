use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{ActFn, Initializer};
use crate::{ProtoErr, Result};

/// A named slot bound to a `(batch, width)` float input when the graph runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderDef {
    pub name: String,
    pub width: usize,
}

/// A trainable tensor and the way it gets its initial values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    pub shape: Vec<usize>,
    pub init: Initializer,
}

impl VariableDef {
    /// Returns the amount of elements of this variable.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `act_fn(x · weights + biases)`, whose result is registered under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseDef {
    pub name: String,
    pub dim: (usize, usize),
    pub weights: String,
    pub biases: String,
    pub act_fn: ActFn,
}

/// The names under which a dense layer registers its tensors.
#[derive(Debug, Clone, Copy)]
pub struct DenseNames<'a> {
    pub weights: &'a str,
    pub biases: &'a str,
    pub output: &'a str,
}

/// An immutable description of a feedforward graph: one input placeholder followed by a chain of
/// dense layers.
///
/// The description does not hold any values, a `Session` materializes it. The names of the
/// placeholder, the variables and the layer outputs are what saved models bind against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDef {
    seed: u64,
    input: PlaceholderDef,
    variables: Vec<VariableDef>,
    layers: Vec<DenseDef>,
}

impl GraphDef {
    /// The seed every random initializer of the graph draws from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn input(&self) -> &PlaceholderDef {
        &self.input
    }

    /// The variables in creation order.
    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn layers(&self) -> &[DenseDef] {
        &self.layers
    }

    /// Returns the name of the last layer's activation.
    pub fn output(&self) -> &str {
        // SAFETY: `GraphBuilder::build` and `validate` reject graphs without layers.
        &self.layers[self.layers.len() - 1].name
    }

    /// Returns the width of the last layer's activation.
    pub fn output_width(&self) -> usize {
        self.layers[self.layers.len() - 1].dim.1
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDef> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Returns the total amount of trainable parameters.
    pub fn num_params(&self) -> usize {
        self.variables.iter().map(VariableDef::len).sum()
    }

    /// Returns whether `name` identifies the placeholder or a layer output.
    pub fn has_tensor(&self, name: &str) -> bool {
        self.input.name == name || self.layers.iter().any(|l| l.name == name)
    }

    /// Checks that the description is consistent.
    ///
    /// Every name is unique, the layer dimensions chain from the placeholder width and every
    /// layer references variables of the right shape.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(ProtoErr::ShapeMismatch {
                what: "layers",
                got: 0,
                expected: 1,
            });
        }

        let mut names = HashSet::new();
        let all_names = std::iter::once(&self.input.name)
            .chain(self.variables.iter().map(|v| &v.name))
            .chain(self.layers.iter().map(|l| &l.name));
        for name in all_names {
            if !names.insert(name.as_str()) {
                return Err(ProtoErr::Config(format!("duplicated graph name {name:?}")));
            }
        }

        let mut width = self.input.width;
        for layer in &self.layers {
            let (n, m) = layer.dim;
            if n != width {
                return Err(ProtoErr::ShapeMismatch {
                    what: "layer input",
                    got: n,
                    expected: width,
                });
            }

            self.check_variable(&layer.weights, &[n, m])?;
            self.check_variable(&layer.biases, &[m])?;
            width = m;
        }

        Ok(())
    }

    fn check_variable(&self, name: &str, shape: &[usize]) -> Result<()> {
        let var = self
            .variable(name)
            .ok_or_else(|| ProtoErr::Config(format!("missing graph variable {name:?}")))?;

        if var.shape != shape {
            return Err(ProtoErr::ShapeMismatch {
                what: "variable",
                got: var.len(),
                expected: shape.iter().product(),
            });
        }

        Ok(())
    }
}

/// Builds a `GraphDef` layer by layer.
#[derive(Debug)]
pub struct GraphBuilder {
    seed: u64,
    input: PlaceholderDef,
    variables: Vec<VariableDef>,
    layers: Vec<DenseDef>,
    width: usize,
}

impl GraphBuilder {
    /// Starts a graph whose input is a `(batch, width)` placeholder.
    ///
    /// # Arguments
    /// * `seed` - The seed for every random initializer of the graph.
    /// * `input` - The name of the input placeholder.
    /// * `width` - The amount of features per input row.
    pub fn new(seed: u64, input: &str, width: usize) -> Self {
        Self {
            seed,
            input: PlaceholderDef {
                name: input.to_string(),
                width,
            },
            variables: Vec::new(),
            layers: Vec::new(),
            width,
        }
    }

    /// Appends a dense layer with Glorot normal weights and constant biases.
    ///
    /// # Arguments
    /// * `names` - Where the layer registers its weights, biases and activation.
    /// * `width` - The amount of units of the layer.
    /// * `bias` - The initial value of every bias.
    /// * `act_fn` - The activation of the layer.
    pub fn dense(mut self, names: DenseNames<'_>, width: usize, bias: f32, act_fn: ActFn) -> Self {
        let fan_in = self.width;

        self.variables.push(VariableDef {
            name: names.weights.to_string(),
            shape: vec![fan_in, width],
            init: Initializer::GlorotNormal {
                fan_in,
                fan_out: width,
            },
        });
        self.variables.push(VariableDef {
            name: names.biases.to_string(),
            shape: vec![width],
            init: Initializer::Const { value: bias },
        });
        self.layers.push(DenseDef {
            name: names.output.to_string(),
            dim: (fan_in, width),
            weights: names.weights.to_string(),
            biases: names.biases.to_string(),
            act_fn,
        });

        self.width = width;
        self
    }

    /// Finishes the graph.
    ///
    /// # Returns
    /// The description or an error if it is not consistent.
    pub fn build(self) -> Result<GraphDef> {
        let graph = GraphDef {
            seed: self.seed,
            input: self.input,
            variables: self.variables,
            layers: self.layers,
        };

        graph.validate()?;
        Ok(graph)
    }
}
