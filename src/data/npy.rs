use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use npyz::{DType, NpyFile, Order, TypeChar, WriterBuilder};
use thiserror::Error;

use super::model::NpyArray;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported dtype {0}")]
    DType(String),

    #[error("expected a 1-D index array, got shape {0:?}")]
    NotIndexVector(Vec<usize>),

    #[error("element {position} ({value}) is not a valid unit index")]
    BadIndex { position: usize, value: f64 },
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Load a `.npy` file of any numeric dtype, widened to `f64` in C order.
pub fn load_npy(path: &Path) -> Result<NpyArray, NpyError> {
    let reader = BufReader::new(File::open(path)?);
    read_npy(reader)
}

pub fn read_npy<R: io::Read>(reader: R) -> Result<NpyArray, NpyError> {
    let npy = NpyFile::new(reader)?;
    let shape: Vec<usize> = npy.shape().iter().map(|&d| d as usize).collect();
    let order = npy.order();
    let dtype = npy.dtype();

    let data = match &dtype {
        DType::Plain(ts) => match (ts.type_char(), ts.size_field()) {
            (TypeChar::Float, 8) => npy.into_vec::<f64>()?,
            (TypeChar::Float, 4) => widen(npy.into_vec::<f32>()?),
            (TypeChar::Int, 8) => widen(npy.into_vec::<i64>()?),
            (TypeChar::Int, 4) => widen(npy.into_vec::<i32>()?),
            (TypeChar::Int, 2) => widen(npy.into_vec::<i16>()?),
            (TypeChar::Int, 1) => widen(npy.into_vec::<i8>()?),
            (TypeChar::Uint, 8) => widen(npy.into_vec::<u64>()?),
            (TypeChar::Uint, 4) => widen(npy.into_vec::<u32>()?),
            (TypeChar::Uint, 2) => widen(npy.into_vec::<u16>()?),
            (TypeChar::Uint, 1) => widen(npy.into_vec::<u8>()?),
            (TypeChar::Bool, 1) => npy
                .into_vec::<bool>()?
                .into_iter()
                .map(|b| if b { 1.0 } else { 0.0 })
                .collect(),
            _ => return Err(NpyError::DType(ts.to_string())),
        },
        other => return Err(NpyError::DType(format!("{other:?}"))),
    };

    let data = match order {
        Order::C => data,
        Order::Fortran => fortran_to_c(&data, &shape),
    };
    Ok(NpyArray { shape, data })
}

fn widen<T: Into<WideF64>>(values: Vec<T>) -> Vec<f64> {
    values.into_iter().map(|v| v.into().0).collect()
}

/// Lossy widening to `f64`; 64-bit integers beyond 2^53 round.
struct WideF64(f64);

macro_rules! wide_from {
    ($($t:ty),*) => {
        $(impl From<$t> for WideF64 {
            fn from(v: $t) -> Self {
                WideF64(v as f64)
            }
        })*
    };
}

wide_from!(f32, i8, i16, i32, i64, u8, u16, u32, u64);

/// Reorder column-major data into row-major order.
fn fortran_to_c(data: &[f64], shape: &[usize]) -> Vec<f64> {
    if shape.len() < 2 {
        return data.to_vec();
    }
    let n = data.len();
    let mut out = vec![0.0; n];
    let mut index = vec![0usize; shape.len()];
    for (c_pos, slot) in out.iter_mut().enumerate() {
        // Decompose the C position into a multi-index, then recompose in F order.
        let mut rem = c_pos;
        for axis in (0..shape.len()).rev() {
            index[axis] = rem % shape[axis];
            rem /= shape[axis];
        }
        let mut f_pos = 0;
        let mut stride = 1;
        for axis in 0..shape.len() {
            f_pos += index[axis] * stride;
            stride *= shape[axis];
        }
        *slot = data[f_pos];
    }
    out
}

/// Load a 1-D vector of unit indices (e.g. ANOVA-selected units).
pub fn load_indices(path: &Path) -> Result<Vec<usize>, NpyError> {
    let array = load_npy(path)?;
    indices_from(&array)
}

fn indices_from(array: &NpyArray) -> Result<Vec<usize>, NpyError> {
    let is_vector = array.ndim() == 1
        || (array.ndim() == 2 && (array.shape[0] == 1 || array.shape[1] == 1));
    if !is_vector && !array.is_empty() {
        return Err(NpyError::NotIndexVector(array.shape.clone()));
    }
    array
        .data
        .iter()
        .enumerate()
        .map(|(position, &value)| {
            if value < 0.0 || value.fract() != 0.0 || !value.is_finite() {
                Err(NpyError::BadIndex { position, value })
            } else {
                Ok(value as usize)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write a C-order `f64` array.
pub fn save_npy(path: &Path, shape: &[usize], data: &[f64]) -> Result<(), NpyError> {
    let file = BufWriter::new(File::create(path)?);
    let shape: Vec<u64> = shape.iter().map(|&d| d as u64).collect();
    let mut writer = npyz::WriteOptions::<f64>::new()
        .default_dtype()
        .shape(&shape)
        .writer(file)
        .begin_nd()?;
    writer.extend(data.iter().copied())?;
    writer.finish()?;
    Ok(())
}

/// Write a 1-D `int64` index vector, the dtype `np.save` uses for index arrays.
pub fn save_indices(path: &Path, indices: &[usize]) -> Result<(), NpyError> {
    let file = BufWriter::new(File::create(path)?);
    let mut writer = npyz::WriteOptions::<i64>::new()
        .default_dtype()
        .shape(&[indices.len() as u64])
        .writer(file)
        .begin_nd()?;
    writer.extend(indices.iter().map(|&i| i as i64))?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn f64_matrix_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("acts.npy");
        save_npy(&path, &[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        let array = load_npy(&path).unwrap();
        assert_eq!(array.shape, vec![2, 3]);
        assert_eq!(array.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn int64_indices_load_as_usize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("num_unit.npy");
        save_indices(&path, &[4, 0, 17]).unwrap();
        assert_eq!(load_indices(&path).unwrap(), vec![4, 0, 17]);
    }

    #[test]
    fn empty_index_vector_is_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("num_unit.npy");
        save_indices(&path, &[]).unwrap();
        assert!(load_indices(&path).unwrap().is_empty());
    }

    #[test]
    fn float32_payload_is_widened() {
        let mut bytes = Vec::new();
        {
            let mut writer = npyz::WriteOptions::<f32>::new()
                .default_dtype()
                .shape(&[3])
                .writer(&mut bytes)
                .begin_nd()
                .unwrap();
            writer.extend([0.5f32, -1.25, 2.0]).unwrap();
            writer.finish().unwrap();
        }
        let array = read_npy(&bytes[..]).unwrap();
        assert_eq!(array.data, vec![0.5, -1.25, 2.0]);
    }

    #[test]
    fn fortran_order_is_transposed_to_c() {
        // shape (2, 3); column-major [[1, 2, 3], [4, 5, 6]]
        let f = [1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
        assert_eq!(fortran_to_c(&f, &[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn negative_or_fractional_indices_are_rejected() {
        let array = NpyArray {
            shape: vec![3],
            data: vec![1.0, -2.0, 3.0],
        };
        assert!(matches!(
            indices_from(&array),
            Err(NpyError::BadIndex { position: 1, .. })
        ));

        let array = NpyArray {
            shape: vec![1],
            data: vec![0.5],
        };
        assert!(indices_from(&array).is_err());
    }

    #[test]
    fn matrices_are_not_index_vectors() {
        let array = NpyArray {
            shape: vec![2, 2],
            data: vec![0.0, 1.0, 2.0, 3.0],
        };
        assert!(matches!(indices_from(&array), Err(NpyError::NotIndexVector(_))));
    }
}
