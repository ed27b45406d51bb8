//! Thin `fitsio` wrappers that turn cfitsio's status codes into [ReadError]s.

use std::fmt::Display;
use std::path::Path;

use fitsio::errors::check_status as fits_check_status;
use fitsio::hdu::{DescribesHdu, FitsHdu, HduInfo};
use fitsio::FitsFile;

use crate::error::ReadError;

/// Open a fits file.
pub(crate) fn fits_open<P: AsRef<Path>>(file: P) -> Result<FitsFile, ReadError> {
    let file = file.as_ref();
    if !file.exists() {
        return Err(ReadError::NotAvailable(file.to_path_buf()));
    }
    Ok(FitsFile::open(file)?)
}

/// Open a fits file's HDU.
pub(crate) fn fits_open_hdu<T: DescribesHdu + Display + Copy>(
    fits_fptr: &mut FitsFile,
    hdu_description: T,
) -> Result<FitsHdu, ReadError> {
    Ok(fits_fptr.hdu(hdu_description)?)
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword that may
/// or may not exist, pull out the value of the keyword, parsing it into the
/// desired type. cfitsio statuses 202 and 204 mean the key isn't present.
pub(crate) fn fits_get_optional_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<T>, ReadError> {
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(key_value) => key_value,
        Err(e) => match &e {
            fitsio::errors::Error::Fits(fe) if matches!(fe.status, 202 | 204) => return Ok(None),
            _ => return Err(e.into()),
        },
    };

    match unparsed_value.trim().parse() {
        Ok(parsed_value) => Ok(Some(parsed_value)),
        Err(_) => Err(ReadError::KeyParse {
            key: keyword.to_string(),
            file: fits_fptr.filename.clone(),
        }),
    }
}

/// Get a column from a fits file's HDU, or `None` if the HDU has no column
/// with that name (cfitsio status 219).
pub(crate) fn fits_get_optional_col<T: fitsio::tables::ReadsCol>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    col_name: &str,
) -> Result<Option<Vec<T>>, ReadError> {
    match hdu.read_col(fits_fptr, col_name) {
        Ok(col) => Ok(Some(col)),
        Err(fitsio::errors::Error::Fits(fe)) if fe.status == 219 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The number of rows in a binary-table HDU.
pub(crate) fn fits_table_num_rows(hdu: &FitsHdu) -> Option<usize> {
    match &hdu.info {
        HduInfo::TableInfo { num_rows, .. } => Some(*num_rows),
        _ => None,
    }
}

/// Whether a binary-table HDU has a column with this name.
pub(crate) fn fits_table_has_col(hdu: &FitsHdu, col_name: &str) -> bool {
    match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            ..
        } => column_descriptions.iter().any(|c| c.name == col_name),
        _ => false,
    }
}

/// Read a whole f64 column, substituting NaN for null entries. The safe API
/// has no way to express a null value, so this calls cfitsio directly;
/// cfitsio converts single-precision columns to doubles on the way through.
pub(crate) fn fits_get_f64_col_with_nulls(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    col_name: &str,
) -> Result<Option<Vec<f64>>, ReadError> {
    let num_rows = match fits_table_num_rows(hdu) {
        Some(n) => n,
        None => return Ok(None),
    };
    if !fits_table_has_col(hdu, col_name) {
        return Ok(None);
    }

    unsafe {
        // With the column name, get the column number.
        let mut status = 0;
        let mut col_num = -1;
        let keyword = std::ffi::CString::new(col_name).expect("CString::new failed");
        // ffgcno = fits_get_colnum
        fitsio_sys::ffgcno(
            fits_fptr.as_raw(),
            0,
            keyword.as_ptr() as *mut std::os::raw::c_char,
            &mut col_num,
            &mut status,
        );
        fits_check_status(status)?;

        let mut col: Vec<f64> = vec![0.0; num_rows];
        let mut any_null = 0;
        // ffgcvd = fits_read_col_dbl
        fitsio_sys::ffgcvd(
            fits_fptr.as_raw(), /* I - FITS file pointer                       */
            col_num,            /* I - column number (1 = 1st)                 */
            1,                  /* I - first row to read (1 = 1st)             */
            1,                  /* I - first vector element to read (1 = 1st)  */
            num_rows.try_into().expect("not larger than i64::MAX"), /* I - number of values */
            f64::NAN,           /* I - value for undefined entries             */
            col.as_mut_ptr(),   /* O - array of values that are returned       */
            &mut any_null,      /* O - set to 1 if any values are null; else 0 */
            &mut status,        /* IO - error status                           */
        );
        fits_check_status(status)?;

        Ok(Some(col))
    }
}
