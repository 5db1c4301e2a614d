use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info, warn};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};
use serde::{Deserialize, Serialize};

use super::{ModelHandle, ModelStore, Signature, SignatureFunction};
use crate::{
    ProtoErr, Result,
    runtime::{Feed, GraphDef, Session},
};

/// The file describing the graph, its tags and its signatures.
pub const MANIFEST_FILE: &str = "saved_model.json";
/// The file holding the values of every variable.
pub const VARIABLES_FILE: &str = "variables.safetensors";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    tags: Vec<String>,
    graph: GraphDef,
    signatures: Vec<Signature>,
}

/// A `ModelStore` over a directory: a JSON manifest next to a safetensors file of variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedModelStore;

impl SavedModelStore {
    pub fn new() -> Self {
        Self
    }

    fn read_manifest(path: &Path) -> Result<Manifest> {
        let raw = fs::read(path.join(MANIFEST_FILE)).map_err(|e| ProtoErr::model_load(path, e))?;
        let manifest: Manifest =
            serde_json::from_slice(&raw).map_err(|e| ProtoErr::model_load(path, e))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(ProtoErr::model_load(
                path,
                format!("unsupported format version {}", manifest.format_version),
            ));
        }

        Ok(manifest)
    }

    fn read_variables(path: &Path, graph: &GraphDef) -> Result<HashMap<String, Vec<f32>>> {
        let raw = fs::read(path.join(VARIABLES_FILE)).map_err(|e| ProtoErr::model_load(path, e))?;
        let tensors = SafeTensors::deserialize(&raw).map_err(|e| ProtoErr::model_load(path, e))?;

        let mut values = HashMap::with_capacity(graph.variables().len());
        for var in graph.variables() {
            let view = tensors
                .tensor(&var.name)
                .map_err(|e| ProtoErr::model_load(path, e))?;

            if view.dtype() != Dtype::F32 || view.shape() != var.shape.as_slice() {
                return Err(ProtoErr::model_load(
                    path,
                    format!(
                        "variable {:?} is {:?}{:?}, expected F32{:?}",
                        var.name,
                        view.dtype(),
                        view.shape(),
                        var.shape
                    ),
                ));
            }

            let value = view
                .data()
                .chunks_exact(size_of::<f32>())
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect();

            values.insert(var.name.clone(), value);
        }

        Ok(values)
    }

    fn write_model(dir: &Path, manifest: &Manifest, session: &Session) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest).map_err(io::Error::from)?;
        fs::write(dir.join(MANIFEST_FILE), json)?;

        let views = session
            .variables()
            .map(|(var, value)| {
                let bytes: &[u8] = bytemuck::cast_slice(value);
                TensorView::new(Dtype::F32, var.shape.clone(), bytes)
                    .map(|view| (var.name.clone(), view))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        let bytes = safetensors::serialize(views, &None)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        fs::write(dir.join(VARIABLES_FILE), bytes)?;

        Ok(())
    }

    /// Replaces `path` with the fully written `staging` directory.
    fn swap_in(staging: &Path, path: &Path, backup: &Path) -> io::Result<()> {
        if !path.exists() {
            return fs::rename(staging, path);
        }

        if backup.exists() {
            remove_entry(backup)?;
        }
        fs::rename(path, backup)?;

        if let Err(e) = fs::rename(staging, path) {
            // Put the previous model back, the export as a whole failed.
            if let Err(restore) = fs::rename(backup, path) {
                warn!("could not restore {}: {restore}", path.display());
            }
            return Err(e);
        }

        // The new model is in place, a stale backup is only left for the next export to clear.
        if let Err(e) = remove_entry(backup) {
            warn!("could not remove {}: {e}", backup.display());
        }
        Ok(())
    }
}

/// Removes a file or a whole directory.
fn remove_entry(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Sibling paths of `path` with the given suffix, hidden so they never look like a model.
fn sibling(path: &Path, suffix: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy();
    Some(path.with_file_name(format!(".{name}.{suffix}")))
}

fn check_bindings(graph: &GraphDef, signature: &Signature) -> std::result::Result<(), String> {
    let unbound = signature
        .inputs()
        .values()
        .filter(|t| graph.input().name != **t)
        .chain(signature.outputs().values().filter(|t| !graph.has_tensor(t)))
        .next();

    match unbound {
        Some(tensor) => Err(format!(
            "signature {:?} references unknown tensor {tensor:?}",
            signature.key()
        )),
        None => Ok(()),
    }
}

impl ModelStore for SavedModelStore {
    fn load(&self, path: &Path, tag: &str) -> Result<ModelHandle> {
        let manifest = Self::read_manifest(path)?;

        if !manifest.tags.iter().any(|t| t == tag) {
            return Err(ProtoErr::model_load(
                path,
                format!("no model tagged {tag:?}, found {:?}", manifest.tags),
            ));
        }

        manifest
            .graph
            .validate()
            .map_err(|e| ProtoErr::model_load(path, e))?;
        for signature in &manifest.signatures {
            check_bindings(&manifest.graph, signature).map_err(|e| ProtoErr::model_load(path, e))?;
        }

        let values = Self::read_variables(path, &manifest.graph)?;
        let session = Arc::new(
            Session::with_values(manifest.graph, values).map_err(|e| ProtoErr::model_load(path, e))?,
        );

        let handle = ModelHandle::from_functions(manifest.signatures.into_iter().map(|signature| {
            let key = signature.key().to_string();
            let function: Arc<dyn SignatureFunction> =
                Arc::new(SessionFunction::new(session.clone(), signature));
            (key, function)
        }));

        info!(
            "loaded model from {} with functions {:?}",
            path.display(),
            handle.signatures()
        );
        Ok(handle)
    }

    fn export(
        &self,
        path: &Path,
        session: &Session,
        signature: &Signature,
        tag: &str,
    ) -> Result<()> {
        check_bindings(session.graph(), signature).map_err(|e| ProtoErr::persistence(path, e))?;

        let (Some(staging), Some(backup)) = (sibling(path, "staging"), sibling(path, "previous"))
        else {
            return Err(ProtoErr::persistence(path, "the path does not name a directory"));
        };

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            tags: vec![tag.to_string()],
            graph: session.graph().clone(),
            signatures: vec![signature.clone()],
        };

        let written = (|| {
            if staging.exists() {
                remove_entry(&staging)?;
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::create_dir(&staging)?;

            Self::write_model(&staging, &manifest, session)?;
            Self::swap_in(&staging, path, &backup)?;
            Ok::<_, ProtoErr>(())
        })();

        if let Err(e) = written {
            debug!("cleaning up {}", staging.display());
            let _ = remove_entry(&staging);
            return Err(ProtoErr::persistence(path, e));
        }

        info!(tag = tag; "exported model to {}", path.display());
        Ok(())
    }
}

/// A model function backed by a session: its inputs feed placeholders and its outputs fetch
/// graph tensors.
#[derive(Debug)]
pub struct SessionFunction {
    session: Arc<Session>,
    signature: Signature,
}

impl SessionFunction {
    pub fn new(session: Arc<Session>, signature: Signature) -> Self {
        Self { session, signature }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl SignatureFunction for SessionFunction {
    fn call(&self, mut feed: Feed) -> Result<Feed> {
        let mut graph_feed = Feed::with_capacity(self.signature.inputs().len());
        for (name, tensor) in self.signature.inputs() {
            let value = feed
                .remove(name)
                .ok_or_else(|| ProtoErr::MissingFeed { name: name.clone() })?;
            graph_feed.insert(tensor.clone(), value);
        }

        let mut outputs = Feed::with_capacity(self.signature.outputs().len());
        for (name, tensor) in self.signature.outputs() {
            outputs.insert(name.clone(), self.session.run(&graph_feed, tensor)?);
        }

        Ok(outputs)
    }
}
