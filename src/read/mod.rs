pub mod fits;
pub mod lightcurve;

use crate::error::ReadError;
use crate::{LcContext, LightCurve};

/// An ordered time-series provider. The fold core only ever sees sample
/// arrays, so anything that can hand over a [LightCurve] works; the FITS
/// reader is the production implementation and [MemoryLightCurve] keeps
/// tests free of file access.
pub trait LightCurveRead {
    fn get_lc_context(&self) -> &LcContext;

    fn read(&self) -> Result<LightCurve, ReadError>;
}

/// A light curve already in memory.
pub struct MemoryLightCurve {
    lc_context: LcContext,
    light_curve: LightCurve,
}

impl MemoryLightCurve {
    /// `times` must be strictly increasing, finite and non-empty.
    pub fn new(times: Vec<f64>, fluxes: Vec<f64>, bjd_ref: f64) -> Result<MemoryLightCurve, ReadError> {
        let lc_context = lightcurve::build_context(
            &times,
            None,
            None,
            "FLUX".to_string(),
            bjd_ref,
            std::path::Path::new("<memory>"),
        )?;
        Ok(MemoryLightCurve {
            lc_context,
            light_curve: LightCurve {
                times,
                fluxes,
                flux_errs: None,
            },
        })
    }
}

impl LightCurveRead for MemoryLightCurve {
    fn get_lc_context(&self) -> &LcContext {
        &self.lc_context
    }

    fn read(&self) -> Result<LightCurve, ReadError> {
        Ok(self.light_curve.clone())
    }
}
