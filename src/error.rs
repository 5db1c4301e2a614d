use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used across the whole crate.
pub type Result<T> = std::result::Result<T, ProtoErr>;

/// Every failure the training, classification and detection paths can produce.
///
/// None of them is retried inside the crate: the operation that raised it is aborted and the
/// error is handed back to the caller untouched.
#[derive(Debug)]
pub enum ProtoErr {
    /// A training record could not be parsed.
    DataFormat { line: usize, reason: String },
    /// A model could not be read from the store or its bindings are invalid.
    ModelLoad { path: PathBuf, reason: String },
    /// An inference entry point was called before its model was loaded.
    ModelNotLoaded,
    /// The model function did not return an output that the caller needs.
    ModelOutputMissing { name: String },
    /// A graph or model function was called without one of its inputs.
    MissingFeed { name: String },
    /// The image bytes could not be decoded.
    ImageDecode(String),
    /// A trained model could not be written to the store.
    Persistence { path: PathBuf, reason: String },
    /// A tensor did not have the expected size.
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A detection referenced a class outside of the label table.
    UnknownClassIndex { index: i64 },
    /// A kept detection carried values that do not describe a box.
    InvalidDetection { index: usize, reason: String },
    /// The application configuration is invalid.
    Config(String),
    /// An I/O error not covered by the variants above.
    Io(io::Error),
}

impl ProtoErr {
    pub(crate) fn data_format(line: usize, reason: impl Into<String>) -> Self {
        Self::DataFormat {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl Display for ProtoErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataFormat { line, reason } => {
                write!(f, "malformed training record at line {line}: {reason}")
            }
            Self::ModelLoad { path, reason } => {
                write!(f, "failed to load model from {}: {reason}", path.display())
            }
            Self::ModelNotLoaded => write!(f, "the model has not been loaded"),
            Self::ModelOutputMissing { name } => {
                write!(f, "the model did not return the expected output {name:?}")
            }
            Self::MissingFeed { name } => write!(f, "no tensor was fed for input {name:?}"),
            Self::ImageDecode(reason) => write!(f, "failed to decode image: {reason}"),
            Self::Persistence { path, reason } => {
                write!(f, "failed to export model to {}: {reason}", path.display())
            }
            Self::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {what}: got {got}, expected {expected}"
            ),
            Self::UnknownClassIndex { index } => {
                write!(f, "detection class index {index} is not in the label table")
            }
            Self::InvalidDetection { index, reason } => {
                write!(f, "detection {index} is invalid: {reason}")
            }
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for ProtoErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtoErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_kind() {
        let err = ProtoErr::data_format(3, "unknown species name: Iris-unknown");
        assert_eq!(
            err.to_string(),
            "malformed training record at line 3: unknown species name: Iris-unknown"
        );

        let err = ProtoErr::ModelOutputMissing {
            name: "detection_boxes".into(),
        };
        assert!(err.to_string().contains("detection_boxes"));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = ProtoErr::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        assert!(ProtoErr::ModelNotLoaded.source().is_none());
    }
}
