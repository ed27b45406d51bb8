//! Fold light curves on a period and build "river" matrices: one row per
//! cycle, one column per phase bin, each cell an aggregate of the fluxes
//! that landed there. The matrix can be written as a FITS image or rendered
//! as a PNG heatmap.

pub mod error;
pub mod fold;
pub mod read;
pub mod render;
pub mod write;

use hifitime::{Duration, Epoch};
use vec1::Vec1;

pub use error::{FoldError, ReadError, RenderError, RiverError, WriteError};
pub use fold::{fold_to_river, Aggregation, BinningMode, FoldConfig, RiverMatrix};

/// The sample arrays of one light curve, in the order they were observed.
/// Times are in the file's native day scale (BTJD for TESS, BKJD for
/// Kepler); periods and epochs fed to the fold use the same scale.
#[derive(Debug, Clone)]
pub struct LightCurve {
    pub times: Vec<f64>,

    pub fluxes: Vec<f64>,

    /// Per-sample flux uncertainties, when the source provides them.
    pub flux_errs: Option<Vec<f64>>,
}

/// Metadata describing a light curve, populated by the read layer.
#[derive(Debug, Clone)]
pub struct LcContext {
    /// The target name (OBJECT), e.g. "TIC 261136679".
    pub object: Option<String>,

    /// The telescope/mission (TELESCOP).
    pub telescope: Option<String>,

    /// Which flux column the samples came from, e.g. "PDCSAP_FLUX".
    pub flux_column: String,

    /// The integer + fractional BJD reference the file's times are offset
    /// against (BJDREFI + BJDREFF). 2457000 for TESS, 2454833 for Kepler.
    pub bjd_ref: f64,

    /// Absolute timestamps of the good cadences. These are kept as
    /// `hifitime` [Epoch] structs for reporting; the fold itself works on
    /// the native day-scale times in [LightCurve].
    pub timestamps: Vec1<Epoch>,

    /// The sampling cadence, derived as the minimum positive time step.
    /// `None` when the curve has a single good cadence.
    pub cadence: Option<Duration>,
}
