//! Error types for folding, reading and writing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the fold-and-bin core. All of these are detected before any
/// matrix is constructed; there are no partial results.
#[derive(Error, Debug)]
pub enum FoldError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("No samples to fold")]
    EmptyInput,

    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}

/// Errors when reading a light curve from disk.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("{0} does not exist or isn't readable")]
    NotAvailable(PathBuf),

    #[error("Unrecognised light-curve file extension on {0}")]
    UnknownExtension(PathBuf),

    #[error("{file} has no binary-table HDU containing light-curve data")]
    NoLightCurveHdu { file: PathBuf },

    #[error("Column {col} is not present in {file}")]
    MissingColumn { col: String, file: PathBuf },

    #[error("{file} contains no usable cadences (all flagged or non-finite)")]
    NoGoodCadences { file: PathBuf },

    #[error("Key {key} in {file} couldn't be parsed as the expected type")]
    KeyParse { key: String, file: PathBuf },

    #[error("Column {col} in {file} has {got} rows, but TIME has {expected}")]
    ColumnLength {
        col: String,
        file: PathBuf,
        got: usize,
        expected: usize,
    },

    #[error(transparent)]
    Fits(#[from] fitsio::errors::Error),
}

/// Errors when writing a river matrix as a FITS image.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Refusing to guess an output format for {0}; use .fits or .png")]
    UnknownExtension(PathBuf),

    #[error(transparent)]
    Fits(#[from] fitsio::errors::Error),
}

/// Errors when rendering a river matrix as a heatmap.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("All matrix cells are empty; nothing to render")]
    NothingToRender,

    #[error("Invalid value limits: vmin {vmin} >= vmax {vmax}")]
    BadLimits { vmin: f64, vmax: f64 },

    // plotters error types are generic over the backend, so keep the message.
    #[error("Plotting error: {0}")]
    Draw(String),
}

/// Top-level error for the CLI.
#[derive(Error, Debug)]
pub enum RiverError {
    #[error(transparent)]
    Fold(#[from] FoldError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
