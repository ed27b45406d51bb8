//! Writing river matrices out as FITS images.

use std::path::Path;

use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use log::debug;

use crate::error::WriteError;
use crate::fold::RiverMatrix;
use crate::LcContext;

/// All write-supported river-matrix formats.
#[derive(Debug, Clone, Copy)]
pub enum RiverOutputType {
    /// A FITS primary image, phase along axis 1 and cycle along axis 2.
    Fits,

    /// A PNG heatmap.
    Png,
}

/// Write the matrix as a double-precision primary image. Empty cells stay
/// NaN. The fold parameters and linear axis descriptions go in the header so
/// downstream tools can reconstruct the phase/cycle axes.
pub fn write_river_fits(
    output: &Path,
    river: &RiverMatrix,
    lc_context: Option<&LcContext>,
) -> Result<(), WriteError> {
    let (num_cycles, num_bins) = river.values.dim();
    debug!(
        "Writing {num_cycles}x{num_bins} river matrix to {}",
        output.display()
    );

    let description = ImageDescription {
        data_type: ImageType::Double,
        // FITS axis 1 varies fastest, i.e. the phase bins of one cycle.
        dimensions: &[num_cycles, num_bins],
    };
    let mut fptr = FitsFile::create(output)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;

    let values = river
        .values
        .as_slice()
        .expect("freshly-built matrices are contiguous");
    hdu.write_image(&mut fptr, values)?;

    hdu.write_key(&mut fptr, "PERIOD", river.period)?;
    hdu.write_key(&mut fptr, "EPOCH", river.epoch)?;
    hdu.write_key(&mut fptr, "NBINS", num_bins as i64)?;
    hdu.write_key(&mut fptr, "CYCLE0", river.first_cycle)?;
    hdu.write_key(&mut fptr, "AGGREG", river.aggregation.to_string())?;
    if let Some(context) = lc_context {
        if let Some(object) = context.object.as_deref() {
            hdu.write_key(&mut fptr, "OBJECT", object)?;
        }
        if let Some(telescope) = context.telescope.as_deref() {
            hdu.write_key(&mut fptr, "TELESCOP", telescope)?;
        }
        hdu.write_key(&mut fptr, "BJDREF", context.bjd_ref)?;
    }

    // Linear phase/cycle axes: pixel centres, 1-indexed per the standard.
    let bin_width = 1.0 / num_bins as f64;
    hdu.write_key(&mut fptr, "CTYPE1", "PHASE")?;
    hdu.write_key(&mut fptr, "CRPIX1", 1.0)?;
    hdu.write_key(&mut fptr, "CRVAL1", bin_width / 2.0)?;
    hdu.write_key(&mut fptr, "CDELT1", bin_width)?;
    hdu.write_key(&mut fptr, "CTYPE2", "CYCLE")?;
    hdu.write_key(&mut fptr, "CRPIX2", 1.0)?;
    hdu.write_key(&mut fptr, "CRVAL2", river.first_cycle as f64)?;
    hdu.write_key(&mut fptr, "CDELT2", 1.0)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use fitsio::hdu::HduInfo;

    use crate::fold::{fold_to_river, FoldConfig};

    fn small_river() -> RiverMatrix {
        // Cycle 0 fills both bins, cycle 1 is empty, cycle 2 fills bin 0.
        let times = vec![0.0, 0.5, 1.0, 1.5, 4.0];
        let fluxes = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut config = FoldConfig::new(2.0);
        config.epoch = Some(0.0);
        config.bin_count = Some(2);
        fold_to_river(&times, &fluxes, &config).unwrap()
    }

    /// Reopening a written matrix must give back the image values (NaN
    /// cells included) and the fold parameters + linear axis keys.
    #[test]
    fn fits_round_trip_preserves_values_and_header() {
        let river = small_river();
        assert_eq!(river.values.dim(), (3, 2));

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("river.fits");
        write_river_fits(&output, &river, None).unwrap();

        let mut fptr = FitsFile::open(&output).unwrap();
        let hdu = fptr.primary_hdu().unwrap();
        match &hdu.info {
            HduInfo::ImageInfo { shape, .. } => assert_eq!(shape, &vec![3, 2]),
            _ => panic!("expected a primary image"),
        }

        let image: Vec<f64> = hdu.read_image(&mut fptr).unwrap();
        assert_eq!(image.len(), 6);
        assert_abs_diff_eq!(image[0], 1.5);
        assert_abs_diff_eq!(image[1], 3.5);
        assert!(image[2].is_nan());
        assert!(image[3].is_nan());
        assert_abs_diff_eq!(image[4], 5.0);
        assert!(image[5].is_nan());

        assert_abs_diff_eq!(hdu.read_key::<f64>(&mut fptr, "PERIOD").unwrap(), 2.0);
        assert_abs_diff_eq!(hdu.read_key::<f64>(&mut fptr, "EPOCH").unwrap(), 0.0);
        assert_eq!(hdu.read_key::<i64>(&mut fptr, "NBINS").unwrap(), 2);
        assert_eq!(hdu.read_key::<i64>(&mut fptr, "CYCLE0").unwrap(), 0);
        assert_eq!(hdu.read_key::<String>(&mut fptr, "AGGREG").unwrap(), "mean");

        assert_eq!(hdu.read_key::<String>(&mut fptr, "CTYPE1").unwrap(), "PHASE");
        assert_abs_diff_eq!(hdu.read_key::<f64>(&mut fptr, "CRPIX1").unwrap(), 1.0);
        assert_abs_diff_eq!(hdu.read_key::<f64>(&mut fptr, "CRVAL1").unwrap(), 0.25);
        assert_abs_diff_eq!(hdu.read_key::<f64>(&mut fptr, "CDELT1").unwrap(), 0.5);
        assert_eq!(hdu.read_key::<String>(&mut fptr, "CTYPE2").unwrap(), "CYCLE");
        assert_abs_diff_eq!(hdu.read_key::<f64>(&mut fptr, "CRPIX2").unwrap(), 1.0);
        assert_abs_diff_eq!(hdu.read_key::<f64>(&mut fptr, "CRVAL2").unwrap(), 0.0);
        assert_abs_diff_eq!(hdu.read_key::<f64>(&mut fptr, "CDELT2").unwrap(), 1.0);
    }

    #[test]
    fn existing_output_is_overwritten() {
        let river = small_river();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("river.fits");

        write_river_fits(&output, &river, None).unwrap();
        write_river_fits(&output, &river, None).unwrap();

        let mut fptr = FitsFile::open(&output).unwrap();
        let hdu = fptr.primary_hdu().unwrap();
        let image: Vec<f64> = hdu.read_image(&mut fptr).unwrap();
        assert_eq!(image.len(), 6);
    }
}
