use std::path::PathBuf;

use thiserror::Error;

/// Problems with the shape of the inputs handed to the engine or runner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("series `{name}` is empty")]
    EmptySeries { name: String },

    #[error("unknown investment type `{name}`")]
    UnknownInvestmentType { name: String },

    #[error("simulation horizon must be at least one year")]
    ZeroHorizon,
}

/// Failures while reading percent-per-line series files.
#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: `{content}` is not a percentage", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
