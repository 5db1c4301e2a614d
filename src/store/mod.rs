//! Persistence of trained graphs and the callable functions a loaded model exposes.

mod saved_model;

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::Path,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

pub use saved_model::{MANIFEST_FILE, SavedModelStore, SessionFunction, VARIABLES_FILE};

use crate::{
    ProtoErr, Result,
    runtime::{Feed, Session},
};

/// The tag models are exported under and loaded with.
pub const DEFAULT_TAG: &str = "serve";
/// The key of the function a model serves by default.
pub const DEFAULT_SIGNATURE: &str = "serving_default";

/// Binds the public input and output names of a model function to tensors of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    key: String,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

impl Signature {
    /// Creates a signature without bindings.
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Binds the input `name` to the graph placeholder `tensor`.
    pub fn input(mut self, name: &str, tensor: &str) -> Self {
        self.inputs.insert(name.to_string(), tensor.to_string());
        self
    }

    /// Binds the output `name` to the graph tensor `tensor`.
    pub fn output(mut self, name: &str, tensor: &str) -> Self {
        self.outputs.insert(name.to_string(), tensor.to_string());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn inputs(&self) -> &BTreeMap<String, String> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }
}

/// A callable model function: takes named tensors and returns named tensors.
///
/// Calls only read the model, so a single function can serve many threads at once.
pub trait SignatureFunction: Send + Sync {
    fn call(&self, feed: Feed) -> Result<Feed>;
}

/// A loaded model: its functions by signature key.
///
/// Cloning is cheap, every clone shares the same functions.
#[derive(Clone, Default)]
pub struct ModelHandle {
    functions: HashMap<String, Arc<dyn SignatureFunction>>,
}

impl ModelHandle {
    /// Creates a handle out of already built functions.
    ///
    /// # Arguments
    /// * `functions` - Pairs of signature key and function.
    pub fn from_functions<I, K>(functions: I) -> Self
    where
        I: IntoIterator<Item = (K, Arc<dyn SignatureFunction>)>,
        K: Into<String>,
    {
        Self {
            functions: functions.into_iter().map(|(k, f)| (k.into(), f)).collect(),
        }
    }

    pub fn function(&self, key: &str) -> Option<&Arc<dyn SignatureFunction>> {
        self.functions.get(key)
    }

    /// The available signature keys, sorted.
    pub fn signatures(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.functions.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Calls the function registered under `key`.
    ///
    /// # Returns
    /// The function outputs or `ModelOutputMissing` if the model has no such function.
    pub fn call(&self, key: &str, feed: Feed) -> Result<Feed> {
        let function = self
            .function(key)
            .ok_or_else(|| ProtoErr::ModelOutputMissing {
                name: key.to_string(),
            })?;

        function.call(feed)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("signatures", &self.signatures())
            .finish()
    }
}

/// Where trained models are exported to and loaded from.
pub trait ModelStore {
    /// Loads the model at `path`.
    ///
    /// # Returns
    /// The model or a `ModelLoad` error if the path, the tag or the stored format is invalid.
    fn load(&self, path: &Path, tag: &str) -> Result<ModelHandle>;

    /// Exports the variables of `session` together with the function described by `signature`.
    ///
    /// # Returns
    /// A `Persistence` error if anything could not be written, in which case nothing was.
    fn export(&self, path: &Path, session: &Session, signature: &Signature, tag: &str)
    -> Result<()>;
}
