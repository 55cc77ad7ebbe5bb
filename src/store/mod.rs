//! # Weight Stores
//!
//! Read-only access to externally produced weights, keyed by path-like
//! strings such as `/conv2d_1/conv2d_1/kernel:0`.
//!
//! Leading and trailing `/` are not significant: `"/a/b:0"` and `"a/b:0"`
//! address the same entry.
//!
//! # Example
//!
//! ```rust,ignore
//! use rustylayers::store::{MemoryStore, StoredTensor, WeightStore};
//!
//! let mut store = MemoryStore::new();
//! store.insert("/dense/dense/bias:0", StoredTensor::new(vec![10], vec![0.0; 10])?);
//! assert_eq!(store.children("/"), vec!["dense"]);
//! ```

pub mod safetensors_io;

pub use safetensors_io::{list_tensors, save_safetensors, SafeTensorsStore};

use ndarray::{ArrayD, IxDyn};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SafeTensors error: {0}")]
    SafeTensorsError(#[from] safetensors::SafeTensorError),

    #[error("Unsupported data type {dtype} for entry '{path}'. Only F32 and F64 entries can be loaded.")]
    UnsupportedDtype { path: String, dtype: String },

    #[error("Entry '{0}' not found in the weight store.")]
    NotFound(String),

    #[error("Entry '{path}' declares shape {shape:?} ({expected} elements) but holds {actual} values.")]
    CorruptEntry {
        path: String,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
}

type Result<T> = std::result::Result<T, StoreError>;

/// Flat numeric buffer with its shape, as read from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl StoredTensor {
    /// Checks that `data` holds exactly `shape.product()` values.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(StoreError::CorruptEntry {
                path: String::new(),
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn from_array(array: &ArrayD<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    pub fn into_array(self) -> Result<ArrayD<f32>> {
        let (shape, actual) = (self.shape.clone(), self.data.len());
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data).map_err(|_| StoreError::CorruptEntry {
            path: String::new(),
            expected: shape.iter().product(),
            shape,
            actual,
        })
    }
}

/// External hierarchical weight store.
///
/// Implementations perform whatever I/O they need; the binding engine only
/// borrows a store for the duration of one call.
pub trait WeightStore {
    /// Returns true if an entry exists at `path`.
    fn has(&self, path: &str) -> bool;

    /// Fetches the entry at `path`.
    fn get(&self, path: &str) -> Result<StoredTensor>;

    /// Direct child names below `path` (`"/"` for the root), sorted.
    /// Used for diagnostics when a lookup fails.
    fn children(&self, path: &str) -> Vec<String>;
}

/// Canonical form of a store path.
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Distinct next segments of the keys that live below `prefix`.
pub(crate) fn child_names<'a, I>(keys: I, prefix: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let prefix = normalize_path(prefix);
    let mut names: Vec<String> = keys
        .into_iter()
        .filter_map(|key| {
            let rest = if prefix.is_empty() {
                key.as_str()
            } else {
                key.strip_prefix(prefix)?.strip_prefix('/')?
            };
            rest.split('/').next().filter(|s| !s.is_empty()).map(str::to_string)
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

/// In-memory store, mostly for tests and for re-binding exported weights.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, StoredTensor>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, tensor: StoredTensor) {
        self.entries.insert(normalize_path(path).to_string(), tensor);
    }

    pub fn insert_array(&mut self, path: &str, array: &ArrayD<f32>) {
        self.insert(path, StoredTensor::from_array(array));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entry paths, in normalized form.
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

impl WeightStore for MemoryStore {
    fn has(&self, path: &str) -> bool {
        self.entries.contains_key(normalize_path(path))
    }

    fn get(&self, path: &str) -> Result<StoredTensor> {
        self.entries
            .get(normalize_path(path))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn children(&self, path: &str) -> Vec<String> {
        child_names(self.entries.keys(), path)
    }
}
