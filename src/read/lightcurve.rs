//! Reading TESS/Kepler-style light-curve FITS files.

use std::path::{Path, PathBuf};

use fitsio::hdu::HduInfo;
use hifitime::{Duration, Epoch, TimeUnits};
use log::{debug, warn};
use vec1::Vec1;

use super::{
    fits::{
        fits_get_f64_col_with_nulls, fits_get_optional_col, fits_get_optional_key, fits_open,
        fits_open_hdu,
    },
    LightCurveRead,
};
use crate::error::ReadError;
use crate::{LcContext, LightCurve};

pub struct FitsLightCurve {
    /// Light-curve metadata.
    lc_context: LcContext,

    /// The good cadences, quality-masked and time-filtered.
    light_curve: LightCurve,

    /// The path to the light-curve file on disk.
    pub file: PathBuf,
}

impl FitsLightCurve {
    /// Open a light-curve file and eagerly read its metadata and sample
    /// columns. `flux_column` is typically "PDCSAP_FLUX" or "SAP_FLUX"; its
    /// "_ERR" companion is read when present. Cadences with a non-zero
    /// quality flag or a non-finite time are dropped here.
    pub fn new<P: AsRef<Path>>(file: P, flux_column: &str) -> Result<FitsLightCurve, ReadError> {
        let file = file.as_ref();
        debug!("Using light-curve file: {}", file.display());

        let mut fptr = fits_open(file)?;
        let primary_hdu = fits_open_hdu(&mut fptr, 0)?;
        let object: Option<String> = fits_get_optional_key(&mut fptr, &primary_hdu, "OBJECT")?;
        let telescope: Option<String> =
            fits_get_optional_key(&mut fptr, &primary_hdu, "TELESCOP")?;

        // TESS and Kepler put the table in an HDU named LIGHTCURVE; fall
        // back to the first extension for files that don't name theirs.
        let hdu = match fits_open_hdu(&mut fptr, "LIGHTCURVE") {
            Ok(hdu) => hdu,
            Err(_) => fits_open_hdu(&mut fptr, 1)?,
        };
        if !matches!(&hdu.info, HduInfo::TableInfo { .. }) {
            return Err(ReadError::NoLightCurveHdu {
                file: file.to_path_buf(),
            });
        }

        // The times are offset against BJDREFI + BJDREFF (2457000 for TESS,
        // 2454833 for Kepler). Absent keys mean the times are absolute.
        let bjdrefi: Option<f64> = fits_get_optional_key(&mut fptr, &hdu, "BJDREFI")?;
        let bjdreff: Option<f64> = fits_get_optional_key(&mut fptr, &hdu, "BJDREFF")?;
        let bjd_ref = bjdrefi.unwrap_or(0.0) + bjdreff.unwrap_or(0.0);

        let times = fits_get_f64_col_with_nulls(&mut fptr, &hdu, "TIME")?.ok_or_else(|| {
            ReadError::MissingColumn {
                col: "TIME".to_string(),
                file: file.to_path_buf(),
            }
        })?;
        let fluxes =
            fits_get_f64_col_with_nulls(&mut fptr, &hdu, flux_column)?.ok_or_else(|| {
                ReadError::MissingColumn {
                    col: flux_column.to_string(),
                    file: file.to_path_buf(),
                }
            })?;
        let err_column = format!("{flux_column}_ERR");
        let flux_errs = fits_get_f64_col_with_nulls(&mut fptr, &hdu, &err_column)?;

        // QUALITY for TESS, SAP_QUALITY for Kepler.
        let quality: Option<Vec<i32>> = match fits_get_optional_col(&mut fptr, &hdu, "QUALITY")? {
            Some(q) => Some(q),
            None => fits_get_optional_col(&mut fptr, &hdu, "SAP_QUALITY")?,
        };
        if quality.is_none() {
            warn!("No QUALITY or SAP_QUALITY column; keeping every cadence");
        }

        debug!("OBJECT:            {object:?}");
        debug!("TELESCOP:          {telescope:?}");
        debug!("BJD reference:     {bjd_ref}");
        debug!("Flux column:       {flux_column}");
        debug!("Cadences in table: {}", times.len());

        let (good_times, good_fluxes, good_errs) = mask_cadences(
            &times,
            &fluxes,
            flux_errs.as_deref(),
            quality.as_deref(),
            file,
        )?;

        let lc_context = build_context(
            &good_times,
            object,
            telescope,
            flux_column.to_string(),
            bjd_ref,
            file,
        )?;
        match lc_context.timestamps.as_slice() {
            [] => unreachable!("build_context verified non-empty"),
            [t] => debug!("Only good cadence: {t}"),
            [t0, .., tn] => {
                debug!("First good cadence: {t0}");
                debug!("Last good cadence:  {tn}");
            }
        }

        Ok(FitsLightCurve {
            lc_context,
            light_curve: LightCurve {
                times: good_times,
                fluxes: good_fluxes,
                flux_errs: good_errs,
            },
            file: file.to_path_buf(),
        })
    }
}

impl LightCurveRead for FitsLightCurve {
    fn get_lc_context(&self) -> &LcContext {
        &self.lc_context
    }

    fn read(&self) -> Result<LightCurve, ReadError> {
        Ok(self.light_curve.clone())
    }
}

/// Drop flagged cadences and cadences with no usable time. Fluxes are
/// allowed to stay NaN; the fold treats those as missing. Columns that
/// don't line up with TIME (a malformed file) are an error, not a panic.
#[allow(clippy::type_complexity)]
fn mask_cadences(
    times: &[f64],
    fluxes: &[f64],
    flux_errs: Option<&[f64]>,
    quality: Option<&[i32]>,
    file: &Path,
) -> Result<(Vec<f64>, Vec<f64>, Option<Vec<f64>>), ReadError> {
    let expected = times.len();
    let columns = [
        ("FLUX", Some(fluxes.len())),
        ("FLUX_ERR", flux_errs.map(<[f64]>::len)),
        ("QUALITY", quality.map(<[i32]>::len)),
    ];
    for (col, len) in columns {
        if let Some(got) = len.filter(|&got| got != expected) {
            return Err(ReadError::ColumnLength {
                col: col.to_string(),
                file: file.to_path_buf(),
                got,
                expected,
            });
        }
    }

    let mut good_times = Vec::with_capacity(times.len());
    let mut good_fluxes = Vec::with_capacity(times.len());
    let mut good_errs = flux_errs.map(|_| Vec::with_capacity(times.len()));
    let mut num_flagged = 0usize;
    let mut num_bad_times = 0usize;
    for i in 0..times.len() {
        if let Some(q) = quality {
            if q[i] != 0 {
                num_flagged += 1;
                continue;
            }
        }
        if !times[i].is_finite() {
            num_bad_times += 1;
            continue;
        }
        good_times.push(times[i]);
        good_fluxes.push(fluxes[i]);
        if let (Some(out), Some(errs)) = (good_errs.as_mut(), flux_errs) {
            out.push(errs[i]);
        }
    }
    debug!("Quality-flagged cadences dropped: {num_flagged}");
    debug!("Non-finite-time cadences dropped: {num_bad_times}");

    Ok((good_times, good_fluxes, good_errs))
}

/// Build an [LcContext] from filtered day-scale times. Errors if no good
/// cadences remain.
pub(crate) fn build_context(
    times: &[f64],
    object: Option<String>,
    telescope: Option<String>,
    flux_column: String,
    bjd_ref: f64,
    file: &Path,
) -> Result<LcContext, ReadError> {
    let timestamps: Vec<Epoch> = times
        .iter()
        .map(|&t| {
            // Round to the nearest 10 milliseconds to avoid float precision
            // issues.
            Epoch::from_jde_et(bjd_ref + t).round(10.milliseconds())
        })
        .collect();
    let timestamps = Vec1::try_from_vec(timestamps).map_err(|_| ReadError::NoGoodCadences {
        file: file.to_path_buf(),
    })?;

    let min_dt = times
        .windows(2)
        .map(|t| t[1] - t[0])
        .filter(|&dt| dt > 0.0)
        .fold(f64::INFINITY, f64::min);
    let cadence = min_dt.is_finite().then(|| Duration::from_days(min_dt));
    if let Some(c) = cadence {
        debug!("Cadence: {c}");
    }

    Ok(LcContext {
        object,
        telescope,
        flux_column,
        bjd_ref,
        timestamps,
        cadence,
    })
}
