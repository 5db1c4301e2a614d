use std::{collections::HashMap, ops::Range};

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::{SeedableRng, rngs::StdRng};

use super::{DenseDef, Feed, GraphDef, LossFn, Optimizer, Tensor, VariableDef};
use crate::{ProtoErr, Result};

/// A training operation: minimize `loss` between the graph output and the tensor fed under
/// `target`, updating every variable with `optimizer`.
#[derive(Debug)]
pub struct Minimize<L: LossFn, O: Optimizer> {
    target: String,
    loss: L,
    optimizer: O,
}

impl<L: LossFn, O: Optimizer> Minimize<L, O> {
    /// Creates a new `Minimize` operation.
    ///
    /// # Arguments
    /// * `target` - The feed name of the expected outputs.
    /// * `loss` - The loss function to minimize.
    /// * `optimizer` - The optimizer that updates the variables.
    pub fn new(target: &str, loss: L, optimizer: O) -> Self {
        Self {
            target: target.to_string(),
            loss,
            optimizer,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// What a single minimize step produced.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// The graph output computed before the variables were updated.
    pub output: Array2<f32>,
    pub loss: f32,
}

/// Intermediate values of a forward pass, one entry per layer.
struct Trace {
    inputs: Vec<Array2<f32>>,
    sums: Vec<Array2<f32>>,
    activations: Vec<Array2<f32>>,
}

/// The execution context of a `GraphDef`: owns the values of every variable.
///
/// Variables live in a single flat buffer, each one in its own slot, so the optimizer can update
/// all of them in one pass.
#[derive(Debug, Clone)]
pub struct Session {
    graph: GraphDef,
    params: Vec<f32>,
    slots: HashMap<String, Range<usize>>,
}

impl Session {
    /// Creates a session whose variables take their initial values.
    ///
    /// Random initializers draw from a generator seeded with the graph seed, in variable creation
    /// order, so two sessions over the same graph start from the same values.
    pub fn new(graph: GraphDef) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(graph.seed());
        let mut values = HashMap::with_capacity(graph.variables().len());

        for var in graph.variables() {
            let mut param_gen = var
                .init
                .generator::<StdRng>(var.len())
                .map_err(|e| ProtoErr::Config(format!("variable {:?}: {e}", var.name)))?;

            let sample = param_gen.sample(&mut rng, var.len()).unwrap_or_default();
            values.insert(var.name.clone(), sample);
        }

        Self::with_values(graph, values)
    }

    /// Creates a session from previously trained values.
    ///
    /// # Arguments
    /// * `graph` - The graph description.
    /// * `values` - The flattened (row major) values of every variable, by name.
    ///
    /// # Returns
    /// The session or an error if a variable is missing or has the wrong amount of elements.
    pub fn with_values(graph: GraphDef, mut values: HashMap<String, Vec<f32>>) -> Result<Self> {
        graph.validate()?;

        let mut params = Vec::with_capacity(graph.num_params());
        let mut slots = HashMap::with_capacity(graph.variables().len());

        for var in graph.variables() {
            let value = values
                .remove(&var.name)
                .ok_or_else(|| ProtoErr::Config(format!("missing value for {:?}", var.name)))?;

            if value.len() != var.len() {
                return Err(ProtoErr::ShapeMismatch {
                    what: "variable",
                    got: value.len(),
                    expected: var.len(),
                });
            }

            let start = params.len();
            params.extend(value);
            slots.insert(var.name.clone(), start..params.len());
        }

        Ok(Self {
            graph,
            params,
            slots,
        })
    }

    pub fn graph(&self) -> &GraphDef {
        &self.graph
    }

    /// Returns the flattened values of a variable.
    pub fn variable(&self, name: &str) -> Option<&[f32]> {
        self.slots.get(name).map(|r| &self.params[r.clone()])
    }

    /// Iterates every variable and its values in creation order.
    pub fn variables(&self) -> impl Iterator<Item = (&VariableDef, &[f32])> {
        self.graph
            .variables()
            .iter()
            .map(|var| (var, &self.params[self.slots[&var.name].clone()]))
    }

    /// Evaluates the tensor named `fetch` given the feed.
    ///
    /// # Arguments
    /// * `feed` - Must contain the graph input placeholder.
    /// * `fetch` - The name of the placeholder or of a layer output.
    ///
    /// # Returns
    /// The evaluated tensor, `ModelOutputMissing` if `fetch` is not part of the graph or a shape
    /// error if the feed does not match the placeholder.
    pub fn run(&self, feed: &Feed, fetch: &str) -> Result<Tensor> {
        if !self.graph.has_tensor(fetch) {
            return Err(ProtoErr::ModelOutputMissing {
                name: fetch.to_string(),
            });
        }

        let x = self.input_matrix(feed)?;
        if fetch == self.graph.input().name {
            return Ok(x.into());
        }

        let trace = self.forward(x, Some(fetch))?;
        let output = trace.activations.into_iter().last().ok_or_else(|| {
            ProtoErr::ModelOutputMissing {
                name: fetch.to_string(),
            }
        })?;

        Ok(output.into())
    }

    /// Runs one training step: forward pass, backpropagation of the loss through every layer and
    /// an optimizer update over every variable.
    ///
    /// # Arguments
    /// * `op` - The minimize operation.
    /// * `feed` - Must contain the graph input placeholder and the target of `op`.
    ///
    /// # Returns
    /// The output before the update together with its loss.
    pub fn minimize<L, O>(&mut self, op: &mut Minimize<L, O>, feed: &Feed) -> Result<StepOutput>
    where
        L: LossFn,
        O: Optimizer,
    {
        let x = self.input_matrix(feed)?;
        let y = feed
            .get(&op.target)
            .ok_or_else(|| ProtoErr::MissingFeed {
                name: op.target.clone(),
            })?
            .to_matrix("target", self.graph.output_width())?;

        if y.nrows() != x.nrows() {
            return Err(ProtoErr::ShapeMismatch {
                what: "target rows",
                got: y.nrows(),
                expected: x.nrows(),
            });
        }

        let trace = self.forward(x, None)?;
        // SAFETY: validated graphs have at least one layer.
        let y_pred = &trace.activations[trace.activations.len() - 1];
        let loss = op.loss.loss(y_pred.view(), y.view());

        let grad = self.backward(&trace, op.loss.loss_prime(y_pred.view(), y.view()))?;
        op.optimizer.update_params(&grad, &mut self.params)?;

        let output = trace.activations.into_iter().last().unwrap_or_default();
        Ok(StepOutput { output, loss })
    }

    fn input_matrix(&self, feed: &Feed) -> Result<Array2<f32>> {
        let input = self.graph.input();
        feed.get(&input.name)
            .ok_or_else(|| ProtoErr::MissingFeed {
                name: input.name.clone(),
            })?
            .to_matrix("input", input.width)
    }

    fn forward(&self, x: Array2<f32>, stop_at: Option<&str>) -> Result<Trace> {
        let nlayers = self.graph.layers().len();
        let mut trace = Trace {
            inputs: Vec::with_capacity(nlayers),
            sums: Vec::with_capacity(nlayers),
            activations: Vec::with_capacity(nlayers),
        };

        let mut x = x;
        for layer in self.graph.layers() {
            let (w, b) = self.view_params(layer)?;

            let z = x.dot(&w) + &b;
            let a = layer.act_fn.forward(z.view());

            trace.inputs.push(x);
            trace.sums.push(z);
            x = a.clone();
            trace.activations.push(a);

            if stop_at == Some(layer.name.as_str()) {
                break;
            }
        }

        Ok(trace)
    }

    fn backward(&self, trace: &Trace, mut d: Array2<f32>) -> Result<Vec<f32>> {
        let mut grad = vec![0.; self.params.len()];

        for (idx, layer) in self.graph.layers().iter().enumerate().rev() {
            layer
                .act_fn
                .backward(trace.sums[idx].view(), trace.activations[idx].view(), d.view_mut());

            let dw = trace.inputs[idx].t().dot(&d);
            let db = d.sum_axis(Axis(0));

            let w_slot = self.slot(&layer.weights)?;
            grad[w_slot].iter_mut().zip(dw.iter()).for_each(|(g, v)| *g = *v);
            let b_slot = self.slot(&layer.biases)?;
            grad[b_slot].iter_mut().zip(db.iter()).for_each(|(g, v)| *g = *v);

            if idx > 0 {
                let (w, _) = self.view_params(layer)?;
                d = d.dot(&w.t());
            }
        }

        Ok(grad)
    }

    fn slot(&self, name: &str) -> Result<Range<usize>> {
        self.slots
            .get(name)
            .cloned()
            .ok_or_else(|| ProtoErr::Config(format!("missing graph variable {name:?}")))
    }

    /// Gives a view of the flat parameter buffer as the weights and biases of a layer.
    fn view_params(&self, layer: &DenseDef) -> Result<(ArrayView2<'_, f32>, ArrayView1<'_, f32>)> {
        let shape_err = |got| ProtoErr::ShapeMismatch {
            what: "layer params",
            got,
            expected: layer.dim.0 * layer.dim.1,
        };

        let raw_w = &self.params[self.slot(&layer.weights)?];
        let weights = ArrayView2::from_shape(layer.dim, raw_w).map_err(|_| shape_err(raw_w.len()))?;
        let raw_b = &self.params[self.slot(&layer.biases)?];
        let biases = ArrayView1::from_shape(layer.dim.1, raw_b).map_err(|_| shape_err(raw_b.len()))?;

        Ok((weights, biases))
    }
}
