//! Error type shared by every stage of a turntable run.
//!
//! Loaders below the pipeline boundary work with `anyhow::Result` so they can
//! attach context freely; the pipeline folds those into one of the variants
//! here before returning to the caller.

pub type Result<T> = std::result::Result<T, TurntableError>;

#[derive(thiserror::Error, Debug)]
pub enum TurntableError {
    /// A mesh or texture could not be fetched or decoded.
    #[error("load error: {uri}: {source:#}")]
    Load {
        uri: String,
        #[source]
        source: anyhow::Error,
    },

    /// Resolved textures whose material name matched no mesh in the model.
    #[error("{unmatched} textures not applied")]
    Application { unmatched: usize },

    /// The GIF writer (or the file underneath it) failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] gif::EncodingError),

    /// No GPU device could be created, or a render or readback failed.
    #[error("render error: {0:#}")]
    Render(anyhow::Error),

    /// A lifecycle hook returned an error.
    #[error("hook error: {0:#}")]
    Hook(anyhow::Error),

    #[error("invalid options: {0}")]
    Options(String),
}

impl TurntableError {
    pub fn load(uri: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Load {
            uri: uri.into(),
            source: source.into(),
        }
    }

    pub fn options(msg: impl Into<String>) -> Self {
        Self::Options(msg.into())
    }
}

impl From<std::io::Error> for TurntableError {
    fn from(err: std::io::Error) -> Self {
        Self::Encoding(gif::EncodingError::Io(err))
    }
}
