//! A minimal dataflow runtime for feedforward networks: graph descriptions, sessions that own the
//! variable values, and the training primitives sessions minimize with.

mod activations;
mod graph;
mod init;
mod loss;
mod optimizer;
mod session;
mod tensor;

pub use activations::ActFn;
pub use graph::{DenseDef, DenseNames, GraphBuilder, GraphDef, PlaceholderDef, VariableDef};
pub use init::{ConstParamGen, Initializer, ParamGen, RandParamGen};
pub use loss::{LossFn, Mse};
pub use optimizer::{Adam, Optimizer};
pub use session::{Minimize, Session, StepOutput};
pub use tensor::{Feed, Tensor};
