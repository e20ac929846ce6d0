use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Failed to read run file: {path}")]
    RunFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse run file {path}: {source}")]
    RunFileParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to write report: {path}")]
    ReportWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid run configuration: {0}")]
    Validation(String),

    #[error("Core error: {0}")]
    Core(#[from] gs_core::CoreError),

    #[error("Solver error: {0}")]
    Solver(#[from] gs_solver::SolverError),

    #[error("Floor error: {0}")]
    Floor(#[from] gs_floor::FloorError),

    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;
