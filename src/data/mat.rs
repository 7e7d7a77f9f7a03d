use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

use super::model::{MatClass, MatFile, MatValue};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a Level 5 MAT-file: {0}")]
    Header(String),

    #[error("malformed data element at byte {offset}: {reason}")]
    Element { offset: usize, reason: String },

    #[error("unsupported MATLAB array class: {0}")]
    Unsupported(String),

    #[error("variable '{0}' not found (available: {1})")]
    MissingVariable(String, String),

    #[error("struct field '{0}' not found (available: {1})")]
    MissingField(String, String),

    #[error("unexpected array class: {0}")]
    Class(String),

    #[error("unexpected array shape: {0}")]
    Shape(String),
}

// ---------------------------------------------------------------------------
// Level 5 constants
// ---------------------------------------------------------------------------

const HEADER_LEN: usize = 128;
const HEADER_TEXT_LEN: usize = 116;

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;
const MI_UTF32: u32 = 18;

const MX_CELL: u8 = 1;
const MX_STRUCT: u8 = 2;
const MX_OBJECT: u8 = 3;
const MX_CHAR: u8 = 4;
const MX_SPARSE: u8 = 5;

const FLAG_COMPLEX: u32 = 0x08;
const FLAG_LOGICAL: u32 = 0x02;

// ---------------------------------------------------------------------------
// Byte order of the file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

macro_rules! endian_readers {
    ($($name:ident => $ty:ty),* $(,)?) => {
        impl Endian {
            $(
                fn $name(self, b: &[u8]) -> $ty {
                    match self {
                        Endian::Little => LittleEndian::$name(b),
                        Endian::Big => BigEndian::$name(b),
                    }
                }
            )*
        }
    };
}

endian_readers! {
    read_u16 => u16,
    read_i16 => i16,
    read_u32 => u32,
    read_i32 => i32,
    read_u64 => u64,
    read_i64 => i64,
    read_f32 => f32,
    read_f64 => f64,
}

// ---------------------------------------------------------------------------
// Element cursor
// ---------------------------------------------------------------------------

/// One tagged data element borrowed from the underlying buffer.
struct Element<'a> {
    ty: u32,
    data: &'a [u8],
    offset: usize,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8], endian: Endian) -> Self {
        Cursor { buf, pos: 0, endian }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], MatError> {
        if self.remaining() < n {
            return Err(MatError::Element {
                offset: self.pos,
                reason: format!("needs {n} bytes, {} left", self.remaining()),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, MatError> {
        let b = self.take(4)?;
        Ok(self.endian.read_u32(b))
    }

    fn align8(&mut self) {
        let padded = (self.pos + 7) & !7;
        self.pos = padded.min(self.buf.len());
    }

    /// Read the next tag and its payload, handling the packed small-element form.
    fn element(&mut self) -> Result<Element<'a>, MatError> {
        let offset = self.pos;
        let first = self.u32()?;
        let small_len = first >> 16;
        if small_len != 0 {
            if small_len > 4 {
                return Err(MatError::Element {
                    offset,
                    reason: format!("small element claims {small_len} bytes"),
                });
            }
            let payload = self.take(4)?;
            return Ok(Element {
                ty: first & 0xffff,
                data: &payload[..small_len as usize],
                offset,
            });
        }
        let ty = first;
        let len = self.u32()? as usize;
        let data = self.take(len)?;
        // Compressed elements are written back to back without padding.
        if ty != MI_COMPRESSED {
            self.align8();
        }
        Ok(Element { ty, data, offset })
    }

    fn element_of(&mut self, ty: u32, what: &str) -> Result<Element<'a>, MatError> {
        let el = self.element()?;
        if el.ty != ty {
            return Err(MatError::Element {
                offset: el.offset,
                reason: format!("expected {what} (type {ty}), found type {}", el.ty),
            });
        }
        Ok(el)
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read and parse a Level 5 MAT-file from disk.
pub fn read_mat(path: &Path) -> Result<MatFile, MatError> {
    let bytes = std::fs::read(path)?;
    parse_mat(&bytes)
}

/// Parse the bytes of a Level 5 MAT-file.
pub fn parse_mat(bytes: &[u8]) -> Result<MatFile, MatError> {
    if bytes.len() < HEADER_LEN {
        return Err(MatError::Header(format!(
            "file is {} bytes, shorter than the 128-byte header",
            bytes.len()
        )));
    }
    let header_text = String::from_utf8_lossy(&bytes[..HEADER_TEXT_LEN])
        .trim_end_matches(['\0', ' '])
        .to_string();
    if header_text.starts_with("MATLAB 7.3") {
        return Err(MatError::Header(
            "MATLAB 7.3 files are HDF5 containers; re-save with -v7".into(),
        ));
    }
    let endian = match &bytes[126..128] {
        b"IM" => Endian::Little,
        b"MI" => Endian::Big,
        other => {
            return Err(MatError::Header(format!(
                "bad endian indicator {other:?} (Level 4 files are not supported)"
            )))
        }
    };
    let version = endian.read_u16(&bytes[124..126]);
    log::debug!("MAT header: '{header_text}', version {version:#06x}, {endian:?} endian");

    let mut file = MatFile {
        header_text,
        variables: Vec::new(),
    };
    let mut cursor = Cursor::new(&bytes[HEADER_LEN..], endian);
    read_variables(&mut cursor, &mut file)?;
    Ok(file)
}

fn read_variables(cursor: &mut Cursor<'_>, file: &mut MatFile) -> Result<(), MatError> {
    while cursor.remaining() >= 8 {
        let el = cursor.element()?;
        match el.ty {
            MI_MATRIX => {
                let (name, value) = parse_matrix(el.data, cursor.endian)?;
                file.variables.push((name, value));
            }
            MI_COMPRESSED => {
                let mut inflated = Vec::new();
                ZlibDecoder::new(el.data).read_to_end(&mut inflated)?;
                let mut inner = Cursor::new(&inflated, cursor.endian);
                read_variables(&mut inner, file)?;
            }
            other => {
                log::debug!("skipping top-level element of type {other} at byte {}", el.offset);
            }
        }
    }
    Ok(())
}

/// Parse the payload of an `miMATRIX` element into its name and value.
fn parse_matrix(data: &[u8], endian: Endian) -> Result<(String, MatValue), MatError> {
    if data.is_empty() {
        // Empty cell slots are written as zero-length matrices.
        return Ok((
            String::new(),
            MatValue::Numeric {
                class: MatClass::Double,
                logical: false,
                dims: vec![0, 0],
                data: Vec::new(),
            },
        ));
    }

    let mut cursor = Cursor::new(data, endian);

    let flags = cursor.element_of(MI_UINT32, "array flags")?;
    if flags.data.len() < 8 {
        return Err(MatError::Element {
            offset: flags.offset,
            reason: "array flags shorter than 8 bytes".into(),
        });
    }
    let word = endian.read_u32(&flags.data[..4]);
    let class_id = (word & 0xff) as u8;
    let flag_bits = (word >> 8) & 0xff;

    let dims_el = cursor.element_of(MI_INT32, "dimensions")?;
    let dims = dims_el
        .data
        .chunks_exact(4)
        .map(|b| {
            let d = endian.read_i32(b);
            usize::try_from(d).map_err(|_| MatError::Element {
                offset: dims_el.offset,
                reason: format!("negative dimension {d}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let count: usize = dims.iter().product();

    let name_el = cursor.element_of(MI_INT8, "array name")?;
    let name = String::from_utf8_lossy(name_el.data).to_string();

    let value = match class_id {
        MX_CELL => {
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let el = cursor.element_of(MI_MATRIX, "cell element")?;
                items.push(parse_matrix(el.data, endian)?.1);
            }
            MatValue::Cell { dims, items }
        }
        MX_STRUCT => {
            let len_el = cursor.element_of(MI_INT32, "field name length")?;
            if len_el.data.len() < 4 {
                return Err(MatError::Element {
                    offset: len_el.offset,
                    reason: "missing field name length".into(),
                });
            }
            let field_len = endian.read_i32(&len_el.data[..4]).max(1) as usize;
            let names_el = cursor.element_of(MI_INT8, "field names")?;
            let fields: Vec<String> = names_el
                .data
                .chunks(field_len)
                .map(|chunk| {
                    let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                    String::from_utf8_lossy(&chunk[..end]).to_string()
                })
                .filter(|f| !f.is_empty())
                .collect();

            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                let mut element = BTreeMap::new();
                for field in &fields {
                    let el = cursor.element_of(MI_MATRIX, "struct field")?;
                    element.insert(field.clone(), parse_matrix(el.data, endian)?.1);
                }
                elements.push(element);
            }
            MatValue::Struct {
                dims,
                fields,
                elements,
            }
        }
        MX_CHAR => {
            let el = cursor.element()?;
            MatValue::Char(decode_chars(&el, &dims, endian)?)
        }
        MX_OBJECT => return Err(MatError::Unsupported(format!("object '{name}'"))),
        MX_SPARSE => return Err(MatError::Unsupported(format!("sparse matrix '{name}'"))),
        id => {
            let class = MatClass::from_id(id)
                .ok_or_else(|| MatError::Unsupported(format!("class id {id} ('{name}')")))?;
            let real = cursor.element()?;
            let values = decode_numbers(&real, endian)?;
            if values.len() != count {
                return Err(MatError::Element {
                    offset: real.offset,
                    reason: format!(
                        "'{name}' declares {count} elements but stores {}",
                        values.len()
                    ),
                });
            }
            if flag_bits & FLAG_COMPLEX != 0 {
                log::warn!("'{name}' is complex; keeping the real part only");
                cursor.element()?;
            }
            MatValue::Numeric {
                class,
                logical: flag_bits & FLAG_LOGICAL != 0,
                dims,
                data: values,
            }
        }
    };

    Ok((name, value))
}

fn decode_numbers(el: &Element<'_>, endian: Endian) -> Result<Vec<f64>, MatError> {
    let width = match el.ty {
        MI_INT8 | MI_UINT8 => 1,
        MI_INT16 | MI_UINT16 => 2,
        MI_INT32 | MI_UINT32 | MI_SINGLE => 4,
        MI_DOUBLE | MI_INT64 | MI_UINT64 => 8,
        other => {
            return Err(MatError::Element {
                offset: el.offset,
                reason: format!("type {other} cannot hold numeric data"),
            })
        }
    };
    if el.data.len() % width != 0 {
        return Err(MatError::Element {
            offset: el.offset,
            reason: format!("{} bytes is not a multiple of {width}", el.data.len()),
        });
    }
    let ty = el.ty;
    Ok(el
        .data
        .chunks_exact(width)
        .map(|b| match ty {
            MI_INT8 => b[0] as i8 as f64,
            MI_UINT8 => b[0] as f64,
            MI_INT16 => endian.read_i16(b) as f64,
            MI_UINT16 => endian.read_u16(b) as f64,
            MI_INT32 => endian.read_i32(b) as f64,
            MI_UINT32 => endian.read_u32(b) as f64,
            MI_SINGLE => endian.read_f32(b) as f64,
            MI_INT64 => endian.read_i64(b) as f64,
            MI_UINT64 => endian.read_u64(b) as f64,
            _ => endian.read_f64(b),
        })
        .collect())
}

fn decode_chars(el: &Element<'_>, dims: &[usize], endian: Endian) -> Result<String, MatError> {
    let codes: Vec<u32> = match el.ty {
        MI_UTF8 | MI_INT8 | MI_UINT8 => {
            return Ok(String::from_utf8_lossy(el.data).to_string());
        }
        MI_UINT16 | MI_UTF16 => el
            .data
            .chunks_exact(2)
            .map(|b| endian.read_u16(b) as u32)
            .collect(),
        MI_UTF32 | MI_UINT32 | MI_INT32 => {
            el.data.chunks_exact(4).map(|b| endian.read_u32(b)).collect()
        }
        other => {
            return Err(MatError::Element {
                offset: el.offset,
                reason: format!("type {other} cannot hold characters"),
            })
        }
    };

    // Multi-row char arrays are column-major; emit one line per row.
    let rows = dims.first().copied().unwrap_or(1).max(1);
    let cols = codes.len() / rows;
    let lines: Vec<String> = (0..rows)
        .map(|r| {
            (0..cols)
                .filter_map(|c| char::from_u32(codes[c * rows + r]))
                .collect()
        })
        .collect();
    Ok(lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Write `file` as a little-endian Level 5 MAT-file.
///
/// Numeric payloads are always stored as `miDOUBLE`. With `compress` every
/// variable is wrapped in its own zlib `miCOMPRESSED` element, which is what
/// MATLAB's default `-v7` format does.
pub fn write_mat(path: &Path, file: &MatFile, compress: bool) -> Result<(), MatError> {
    let bytes = to_bytes(file, compress)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn to_bytes(file: &MatFile, compress: bool) -> Result<Vec<u8>, MatError> {
    let mut out = Vec::new();

    let mut text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created by: rsa-post",
        std::env::consts::OS
    )
    .into_bytes();
    text.resize(HEADER_TEXT_LEN, b' ');
    out.extend_from_slice(&text);
    out.extend_from_slice(&[0u8; 8]);
    out.write_u16::<LittleEndian>(0x0100)?;
    out.extend_from_slice(b"IM");

    for (name, value) in &file.variables {
        let mut element = Vec::new();
        put_matrix(&mut element, name, value)?;
        if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&element)?;
            let packed = encoder.finish()?;
            out.write_u32::<LittleEndian>(MI_COMPRESSED)?;
            out.write_u32::<LittleEndian>(packed.len() as u32)?;
            out.extend_from_slice(&packed);
        } else {
            out.extend_from_slice(&element);
        }
    }
    Ok(out)
}

fn put_element(out: &mut Vec<u8>, ty: u32, data: &[u8]) -> Result<(), MatError> {
    out.write_u32::<LittleEndian>(ty)?;
    out.write_u32::<LittleEndian>(data.len() as u32)?;
    out.extend_from_slice(data);
    while out.len() % 8 != 0 {
        out.push(0);
    }
    Ok(())
}

fn put_matrix(out: &mut Vec<u8>, name: &str, value: &MatValue) -> Result<(), MatError> {
    let mut body = Vec::new();

    let (class_id, flag_bits) = match value {
        MatValue::Numeric { class, logical, .. } => {
            (class.id(), if *logical { FLAG_LOGICAL } else { 0 })
        }
        MatValue::Char(_) => (MX_CHAR, 0),
        MatValue::Cell { .. } => (MX_CELL, 0),
        MatValue::Struct { .. } => (MX_STRUCT, 0),
    };
    let mut flags = Vec::with_capacity(8);
    flags.write_u32::<LittleEndian>(class_id as u32 | (flag_bits << 8))?;
    flags.write_u32::<LittleEndian>(0)?;
    put_element(&mut body, MI_UINT32, &flags)?;

    let dims: Vec<usize> = match value {
        MatValue::Char(s) => vec![1, s.chars().count()],
        other => other.dims().to_vec(),
    };
    let mut dim_bytes = Vec::with_capacity(dims.len() * 4);
    for d in &dims {
        dim_bytes.write_i32::<LittleEndian>(*d as i32)?;
    }
    put_element(&mut body, MI_INT32, &dim_bytes)?;
    put_element(&mut body, MI_INT8, name.as_bytes())?;

    match value {
        MatValue::Numeric { data, .. } => {
            let mut payload = Vec::with_capacity(data.len() * 8);
            for v in data {
                payload.write_f64::<LittleEndian>(*v)?;
            }
            put_element(&mut body, MI_DOUBLE, &payload)?;
        }
        MatValue::Char(s) => {
            let mut payload = Vec::new();
            for unit in s.encode_utf16() {
                payload.write_u16::<LittleEndian>(unit)?;
            }
            put_element(&mut body, MI_UINT16, &payload)?;
        }
        MatValue::Cell { items, .. } => {
            for item in items {
                put_matrix(&mut body, "", item)?;
            }
        }
        MatValue::Struct {
            fields, elements, ..
        } => {
            let field_len = fields.iter().map(|f| f.len() + 1).max().unwrap_or(1).max(32);
            // Packed small element: length 4, type miINT32.
            body.write_u32::<LittleEndian>((4 << 16) | MI_INT32)?;
            body.write_i32::<LittleEndian>(field_len as i32)?;

            let mut names = vec![0u8; field_len * fields.len()];
            for (i, field) in fields.iter().enumerate() {
                names[i * field_len..i * field_len + field.len()].copy_from_slice(field.as_bytes());
            }
            put_element(&mut body, MI_INT8, &names)?;

            for element in elements {
                for field in fields {
                    let value = element.get(field).ok_or_else(|| {
                        let present: Vec<&str> = element.keys().map(String::as_str).collect();
                        MatError::MissingField(field.clone(), present.join(", "))
                    })?;
                    put_matrix(&mut body, "", value)?;
                }
            }
        }
    }

    put_element(out, MI_MATRIX, &body)
}

/// Build a 1×1 struct from named fields, preserving the given order.
pub fn struct_value(fields: Vec<(String, MatValue)>) -> MatValue {
    let names = fields.iter().map(|(n, _)| n.clone()).collect();
    let element = fields.into_iter().collect();
    MatValue::Struct {
        dims: vec![1, 1],
        fields: names,
        elements: vec![element],
    }
}
