//! Safetensors I/O for session inputs and analysis outputs.
//!
//! Reader: little-endian `F64` / `F32` / `I64` / `I32` tensors, converted to
//! `f64` (or `i64` for index arrays) on request.
//! Writer: [`StWriter`] collects named tensors and writes one file.
use crate::error::{Error, Result};
use ndarray::Array2;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ── Reader ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct TensorInfo {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// An in-memory safetensors file.
#[derive(Debug, Clone)]
pub struct SafeTensors {
    origin: PathBuf,
    bytes: Vec<u8>,
    data_start: usize,
    tensors: HashMap<String, TensorInfo>,
}

impl SafeTensors {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        Self::from_bytes(bytes, path)
    }

    /// Parse an already loaded file; `origin` names it in error messages.
    pub fn from_bytes(bytes: Vec<u8>, origin: &Path) -> Result<Self> {
        let what = origin.display().to_string();
        let Some(len_bytes) = bytes.get(..8) else {
            return Err(Error::malformed(what, "file too small for a safetensors header"));
        };
        let mut len = [0u8; 8];
        len.copy_from_slice(len_bytes);
        let n = u64::from_le_bytes(len) as usize;
        let Some(header_bytes) = 8usize.checked_add(n).and_then(|end| bytes.get(8..end)) else {
            return Err(Error::malformed(what, "header length exceeds file size"));
        };
        let mut raw: HashMap<String, serde_json::Value> = serde_json::from_slice(header_bytes)?;
        raw.remove("__metadata__");
        let mut tensors = HashMap::with_capacity(raw.len());
        for (name, value) in raw {
            let info: TensorInfo = serde_json::from_value(value)?;
            tensors.insert(name, info);
        }
        let data_start = 8 + n;
        let data_len = bytes.len() - data_start;
        for (name, info) in &tensors {
            let [s, e] = info.data_offsets;
            if s > e || e > data_len {
                return Err(Error::malformed(what, format!("tensor '{name}' lies outside the data")));
            }
        }
        Ok(Self { origin: origin.to_path_buf(), bytes, data_start, tensors })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    fn info(&self, name: &str) -> Result<&TensorInfo> {
        self.tensors.get(name).ok_or_else(|| {
            Error::malformed(self.origin.display().to_string(), format!("missing tensor '{name}'"))
        })
    }

    pub fn shape(&self, name: &str) -> Result<&[usize]> {
        Ok(&self.info(name)?.shape)
    }

    fn raw(&self, name: &str) -> Result<(&TensorInfo, &[u8])> {
        let info = self.info(name)?;
        let [s, e] = info.data_offsets;
        Ok((info, &self.bytes[self.data_start + s..self.data_start + e]))
    }

    fn bad_dtype(&self, name: &str, dtype: &str) -> Error {
        Error::malformed(
            self.origin.display().to_string(),
            format!("tensor '{name}' has unsupported dtype {dtype}"),
        )
    }

    /// Data of `name`, checked to hold exactly the elements its shape
    /// declares, each `width` bytes wide.
    fn elements(&self, name: &str, width: usize) -> Result<&[u8]> {
        let (info, raw) = self.raw(name)?;
        let expected = info.shape.iter().product::<usize>() * width;
        if raw.len() != expected {
            return Err(Error::malformed(
                self.origin.display().to_string(),
                format!(
                    "tensor '{name}' holds {} bytes, shape {:?} needs {expected}",
                    raw.len(),
                    info.shape
                ),
            ));
        }
        Ok(raw)
    }

    /// Any numeric tensor, flattened and converted to `f64`.
    pub fn f64(&self, name: &str) -> Result<Vec<f64>> {
        let out = match self.info(name)?.dtype.as_str() {
            "F64" => {
                self.elements(name, 8)?.chunks_exact(8).map(|b| f64::from_le_bytes(le8(b))).collect()
            }
            "F32" => {
                self.elements(name, 4)?.chunks_exact(4).map(|b| f32::from_le_bytes(le4(b)) as f64).collect()
            }
            "I64" => {
                self.elements(name, 8)?.chunks_exact(8).map(|b| i64::from_le_bytes(le8(b)) as f64).collect()
            }
            "I32" => {
                self.elements(name, 4)?.chunks_exact(4).map(|b| i32::from_le_bytes(le4(b)) as f64).collect()
            }
            other => return Err(self.bad_dtype(name, other)),
        };
        Ok(out)
    }

    /// An integer tensor, flattened.
    pub fn i64(&self, name: &str) -> Result<Vec<i64>> {
        let out = match self.info(name)?.dtype.as_str() {
            "I64" => {
                self.elements(name, 8)?.chunks_exact(8).map(|b| i64::from_le_bytes(le8(b))).collect()
            }
            "I32" => {
                self.elements(name, 4)?.chunks_exact(4).map(|b| i32::from_le_bytes(le4(b)) as i64).collect()
            }
            other => return Err(self.bad_dtype(name, other)),
        };
        Ok(out)
    }

    /// A 2-D numeric tensor as `f64`.
    pub fn f64_arr2(&self, name: &str) -> Result<Array2<f64>> {
        let shape = self.shape(name)?.to_vec();
        let &[rows, cols] = shape.as_slice() else {
            return Err(Error::malformed(
                self.origin.display().to_string(),
                format!("tensor '{name}' is not 2-D (shape {shape:?})"),
            ));
        };
        Ok(Array2::from_shape_vec((rows, cols), self.f64(name)?)?)
    }
}

fn le8(b: &[u8]) -> [u8; 8] {
    let mut a = [0u8; 8];
    a.copy_from_slice(b);
    a
}

fn le4(b: &[u8]) -> [u8; 4] {
    let mut a = [0u8; 4];
    a.copy_from_slice(b);
    a
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Safetensors writer for `F64`, `F32`, `I64` and `I32` tensors.
///
/// ```rust,no_run
/// use swrdecode::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("correlation", &[0.9, f64::NAN], &[2]);
/// w.add_i64("replays", &[0], &[1]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    /// Shorthand for a 1-D `F64` tensor.
    pub fn add_f64_vec(&mut self, name: &str, data: &[f64]) {
        self.add_f64(name, data, &[data.len()]);
    }

    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    /// Indices as a 1-D `I64` tensor.
    pub fn add_indices(&mut self, name: &str, idx: &[usize]) {
        let data: Vec<i64> = idx.iter().map(|&i| i as i64).collect();
        self.add_i64(name, &data, &[data.len()]);
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    /// Serialised file contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let mut out = Vec::with_capacity(8 + hdr_bytes.len() + pad + offset);
        out.extend_from_slice(&((hdr_bytes.len() + pad) as u64).to_le_bytes());
        out.extend(hdr_bytes);
        out.extend(std::iter::repeat(b' ').take(pad));
        for (_, data, _, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|e| Error::io(path, e))
    }
}
