use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array2, ShapeBuilder};

use super::mat::MatError;

// ---------------------------------------------------------------------------
// MatClass – the MATLAB array class of a numeric variable
// ---------------------------------------------------------------------------

/// MATLAB array classes that carry numeric payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatClass {
    Double,
    Single,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
}

impl MatClass {
    /// Map the `mxCLASS` id stored in the array flags.
    pub fn from_id(id: u8) -> Option<Self> {
        use MatClass::*;
        Some(match id {
            6 => Double,
            7 => Single,
            8 => Int8,
            9 => Uint8,
            10 => Int16,
            11 => Uint16,
            12 => Int32,
            13 => Uint32,
            14 => Int64,
            15 => Uint64,
            _ => return None,
        })
    }

    pub fn id(self) -> u8 {
        use MatClass::*;
        match self {
            Double => 6,
            Single => 7,
            Int8 => 8,
            Uint8 => 9,
            Int16 => 10,
            Uint16 => 11,
            Int32 => 12,
            Uint32 => 13,
            Int64 => 14,
            Uint64 => 15,
        }
    }
}

// ---------------------------------------------------------------------------
// MatValue – one MATLAB variable
// ---------------------------------------------------------------------------

/// A dynamically-typed MATLAB variable mirroring the classes `loadmat` understands.
///
/// Numeric payloads are widened to `f64` and kept column-major, exactly as
/// they are laid out in the file.
#[derive(Debug, Clone, PartialEq)]
pub enum MatValue {
    Numeric {
        class: MatClass,
        logical: bool,
        dims: Vec<usize>,
        data: Vec<f64>,
    },
    Char(String),
    Cell {
        dims: Vec<usize>,
        items: Vec<MatValue>,
    },
    /// Struct array; one field map per element, fields in file order.
    Struct {
        dims: Vec<usize>,
        fields: Vec<String>,
        elements: Vec<BTreeMap<String, MatValue>>,
    },
}

impl fmt::Display for MatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatValue::Numeric { class, dims, .. } => write!(f, "{class:?} {}", dims_text(dims)),
            MatValue::Char(s) => write!(f, "char '{s}'"),
            MatValue::Cell { dims, .. } => write!(f, "cell {}", dims_text(dims)),
            MatValue::Struct { dims, fields, .. } => {
                write!(f, "struct {} {{{}}}", dims_text(dims), fields.join(", "))
            }
        }
    }
}

fn dims_text(dims: &[usize]) -> String {
    dims.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("x")
}

impl MatValue {
    /// Convenience constructor for a 2-D double matrix given in row-major order.
    pub fn from_rows(rows: usize, cols: usize, row_major: &[f64]) -> Self {
        let mut data = vec![0.0; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                data[c * rows + r] = row_major[r * cols + c];
            }
        }
        MatValue::Numeric {
            class: MatClass::Double,
            logical: false,
            dims: vec![rows, cols],
            data,
        }
    }

    /// A 1×1 double.
    pub fn scalar_value(v: f64) -> Self {
        MatValue::from_rows(1, 1, &[v])
    }

    /// A 1×N double row vector.
    pub fn row_vector(values: &[f64]) -> Self {
        MatValue::from_rows(1, values.len(), values)
    }

    pub fn dims(&self) -> &[usize] {
        match self {
            MatValue::Numeric { dims, .. }
            | MatValue::Cell { dims, .. }
            | MatValue::Struct { dims, .. } => dims,
            MatValue::Char(_) => &[],
        }
    }

    /// Field lookup on a 1×1 struct (the `simplify_cells` view).
    pub fn field(&self, name: &str) -> Result<&MatValue, MatError> {
        match self {
            MatValue::Struct { elements, fields, .. } => {
                if elements.len() != 1 {
                    return Err(MatError::Shape(format!(
                        "field '{name}' requested from a struct array of {} elements",
                        elements.len()
                    )));
                }
                elements[0].get(name).ok_or_else(|| {
                    MatError::MissingField(name.to_string(), fields.join(", "))
                })
            }
            other => Err(MatError::Class(format!(
                "field '{name}' requested from non-struct {other}"
            ))),
        }
    }

    /// Column-major numeric payload.
    pub fn to_vec(&self) -> Result<Vec<f64>, MatError> {
        match self {
            MatValue::Numeric { data, .. } => Ok(data.clone()),
            other => Err(MatError::Class(format!("expected numeric array, got {other}"))),
        }
    }

    /// The single element of a numeric array with exactly one value.
    pub fn scalar(&self) -> Result<f64, MatError> {
        match self {
            MatValue::Numeric { data, .. } if data.len() == 1 => Ok(data[0]),
            MatValue::Numeric { dims, .. } => Err(MatError::Shape(format!(
                "expected a scalar, got {}",
                dims_text(dims)
            ))),
            other => Err(MatError::Class(format!("expected numeric scalar, got {other}"))),
        }
    }

    /// View a 2-D numeric array as an `ndarray` matrix.
    pub fn to_matrix(&self) -> Result<Array2<f64>, MatError> {
        match self {
            MatValue::Numeric { dims, data, .. } => {
                let (rows, cols) = match dims.as_slice() {
                    [r, c] => (*r, *c),
                    [r, c, rest @ ..] if rest.iter().all(|&d| d == 1) => (*r, *c),
                    _ => {
                        return Err(MatError::Shape(format!(
                            "expected a 2-D matrix, got {}",
                            dims_text(dims)
                        )))
                    }
                };
                Array2::from_shape_vec((rows, cols).f(), data.clone())
                    .map_err(|e| MatError::Shape(e.to_string()))
            }
            other => Err(MatError::Class(format!("expected numeric matrix, got {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MatFile – all variables of one .mat file
// ---------------------------------------------------------------------------

/// The parsed variables of a MAT-file, in file order.
#[derive(Debug, Clone, Default)]
pub struct MatFile {
    pub header_text: String,
    pub variables: Vec<(String, MatValue)>,
}

impl MatFile {
    pub fn get(&self, name: &str) -> Result<&MatValue, MatError> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| MatError::MissingVariable(name.to_string(), self.names().join(", ")))
    }

    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn insert(&mut self, name: &str, value: MatValue) {
        self.variables.retain(|(n, _)| n != name);
        self.variables.push((name.to_string(), value));
    }
}

// ---------------------------------------------------------------------------
// NpyArray – one .npy array
// ---------------------------------------------------------------------------

/// A numpy array widened to `f64`, always stored in C order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl NpyArray {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
}

// ---------------------------------------------------------------------------
// SelectionResult – output of the sequential forward selection run
// ---------------------------------------------------------------------------

/// Scores saved by the node-pruning pipeline for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    /// RSA score of the full layer.
    pub score_full: f64,
    /// RSA score with each node left out in turn.
    pub score_each_node: Vec<f64>,
    /// RSA score after each forward-selection step.
    pub score_sfs: Vec<f64>,
}
