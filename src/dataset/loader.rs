//! Array file loading
//!
//! Reads the preprocessed `.npy` arrays of a sample. Images are C×H×W floats
//! (f32 or f64 on disk), labels are H×W class masks stored with whatever
//! integer, boolean or float dtype the preprocessing produced.

use std::path::Path;

use ndarray::{Array2, Array3};
use ndarray_npy::{read_npy, ReadNpyError};

use crate::utils::error::{PlumeError, Result};

fn npy_error(path: &Path, err: ReadNpyError) -> PlumeError {
    PlumeError::Npy(path.to_path_buf(), err.to_string())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PlumeError::PathNotFound(path.to_path_buf()))
    }
}

/// Load a C×H×W image array as f32
pub fn load_image(path: &Path) -> Result<Array3<f32>> {
    ensure_exists(path)?;

    match read_npy::<_, Array3<f32>>(path) {
        Ok(array) => Ok(array),
        Err(ReadNpyError::WrongDescriptor(_)) => read_npy::<_, Array3<f64>>(path)
            .map(|a| a.mapv(|v| v as f32))
            .map_err(|e| npy_error(path, e)),
        Err(e) => Err(npy_error(path, e)),
    }
}

/// Load an H×W label mask as class ids; every non-zero value becomes 1
pub fn load_label(path: &Path) -> Result<Array2<i64>> {
    ensure_exists(path)?;

    let raw = read_label_any(path)?;
    Ok(raw.mapv(|v| i64::from(v != 0)))
}

fn read_label_any(path: &Path) -> Result<Array2<i64>> {
    let mut last_err = match read_npy::<_, Array2<i64>>(path) {
        Ok(a) => return Ok(a),
        Err(e) => e,
    };

    if matches!(last_err, ReadNpyError::WrongDescriptor(_)) {
        match read_npy::<_, Array2<u8>>(path) {
            Ok(a) => return Ok(a.mapv(i64::from)),
            Err(e) => last_err = e,
        }
    }
    if matches!(last_err, ReadNpyError::WrongDescriptor(_)) {
        match read_npy::<_, Array2<i32>>(path) {
            Ok(a) => return Ok(a.mapv(i64::from)),
            Err(e) => last_err = e,
        }
    }
    if matches!(last_err, ReadNpyError::WrongDescriptor(_)) {
        match read_npy::<_, Array2<bool>>(path) {
            Ok(a) => return Ok(a.mapv(i64::from)),
            Err(e) => last_err = e,
        }
    }
    if matches!(last_err, ReadNpyError::WrongDescriptor(_)) {
        match read_npy::<_, Array2<f32>>(path) {
            Ok(a) => return Ok(a.mapv(|v| v.round() as i64)),
            Err(e) => last_err = e,
        }
    }

    Err(npy_error(path, last_err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::write_npy;

    #[test]
    fn test_load_f32_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a_image.npy");
        let image = Array3::<f32>::from_shape_fn((9, 4, 5), |(c, y, x)| (c * 100 + y * 10 + x) as f32);
        write_npy(&path, &image).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded.dim(), (9, 4, 5));
        assert_eq!(loaded[[8, 3, 4]], 834.0);
    }

    #[test]
    fn test_load_f64_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b_image.npy");
        let image = Array3::<f64>::from_elem((9, 2, 2), 0.5);
        write_npy(&path, &image).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded[[0, 1, 1]], 0.5f32);
    }

    #[test]
    fn test_load_u8_label_binarized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c_label.npy");
        let label = Array2::<u8>::from_shape_vec((2, 3), vec![0, 1, 0, 255, 0, 1]).unwrap();
        write_npy(&path, &label).unwrap();

        let loaded = load_label(&path).unwrap();
        assert_eq!(loaded.iter().copied().collect::<Vec<_>>(), vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_load_i64_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d_label.npy");
        let label = Array2::<i64>::from_shape_vec((1, 4), vec![1, 0, 0, 1]).unwrap();
        write_npy(&path, &label).unwrap();

        assert_eq!(load_label(&path).unwrap(), label);
    }

    #[test]
    fn test_missing_file() {
        let result = load_image(Path::new("/nonexistent/x_image.npy"));
        assert!(matches!(result, Err(PlumeError::PathNotFound(_))));
    }

    #[test]
    fn test_wrong_rank_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e_image.npy");
        write_npy(&path, &Array2::<f32>::zeros((3, 3))).unwrap();

        assert!(matches!(load_image(&path), Err(PlumeError::Npy(_, _))));
    }
}
