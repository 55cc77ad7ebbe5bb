// --- File: src/store/safetensors_io.rs ---

//! Weight store backed by a SafeTensors file.
//!
//! SafeTensors keeps a flat table of named tensors; entry names are used as
//! store paths, so hierarchical names like `conv/conv/kernel:0` give the
//! store its directory structure.

use super::{child_names, normalize_path, Result, StoreError, StoredTensor, WeightStore};
use log::debug;
use ndarray::ArrayD;
use safetensors::tensor::{SafeTensors, TensorView};
use safetensors::{serialize_to_file, Dtype};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read-only store loaded from a SafeTensors file.
#[derive(Debug, Clone)]
pub struct SafeTensorsStore {
    entries: BTreeMap<String, StoredTensor>,
}

impl SafeTensorsStore {
    /// Reads and decodes every entry of the file.
    ///
    /// F64 entries are narrowed to f32; any other dtype is rejected.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let buffer = read_file(path.as_ref())?;
        let tensors = SafeTensors::deserialize(&buffer)?;

        let mut entries = BTreeMap::new();
        for (name, tensor) in tensors.tensors() {
            let stored = decode(&name, &tensor)?;
            entries.insert(normalize_path(&name).to_string(), stored);
        }
        debug!("Opened {} with {} entries", path.as_ref().display(), entries.len());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WeightStore for SafeTensorsStore {
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

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn decode(name: &str, tensor: &TensorView<'_>) -> Result<StoredTensor> {
    let shape: Vec<usize> = tensor.shape().to_vec();
    let data = tensor.data();

    let floats: Vec<f32> = match tensor.dtype() {
        Dtype::F32 => data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        Dtype::F64 => data
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
        other => {
            return Err(StoreError::UnsupportedDtype {
                path: name.to_string(),
                dtype: format!("{:?}", other),
            })
        }
    };

    StoredTensor::new(shape, floats).map_err(|e| match e {
        StoreError::CorruptEntry { shape, expected, actual, .. } => StoreError::CorruptEntry {
            path: name.to_string(),
            shape,
            expected,
            actual,
        },
        other => other,
    })
}

/// Writes f32 tensors to a SafeTensors file under the given entry names.
///
/// # Example
///
/// ```rust,ignore
/// let mut weights = BTreeMap::new();
/// weights.insert("/dense/dense/kernel:0".to_string(), ArrayD::zeros(IxDyn(&[4, 4])));
/// save_safetensors("weights.safetensors", &weights)?;
/// ```
pub fn save_safetensors<P: AsRef<Path>>(path: P, tensors: &BTreeMap<String, ArrayD<f32>>) -> Result<()> {
    // The views borrow their bytes, so encode everything first.
    let encoded: Vec<(&str, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|(name, arr)| {
            let bytes: Vec<u8> = arr.iter().flat_map(|&x| x.to_le_bytes()).collect();
            (name.as_str(), arr.shape().to_vec(), bytes)
        })
        .collect();

    let mut views: Vec<(&str, TensorView<'_>)> = Vec::with_capacity(encoded.len());
    for (name, shape, bytes) in &encoded {
        views.push((*name, TensorView::new(Dtype::F32, shape.clone(), bytes)?));
    }

    let metadata: Option<HashMap<String, String>> = None;
    serialize_to_file(views, &metadata, path.as_ref())?;
    Ok(())
}

/// Returns the entry names stored in a SafeTensors file.
pub fn list_tensors<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let buffer = read_file(path.as_ref())?;
    let tensors = SafeTensors::deserialize(&buffer)?;
    let mut names: Vec<String> = tensors.names().iter().map(|s| s.to_string()).collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;
    use std::fs;

    fn temp_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("rustylayers_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_save_and_open_store() {
        let mut weights = BTreeMap::new();
        weights.insert(
            "/conv/conv/kernel:0".to_string(),
            ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        );
        weights.insert(
            "/conv/conv/bias:0".to_string(),
            ArrayD::from_shape_vec(IxDyn(&[3]), vec![0.1, 0.2, 0.3]).unwrap(),
        );

        let path = temp_file("store.safetensors");
        save_safetensors(&path, &weights).expect("Failed to save");

        let store = SafeTensorsStore::open(&path).expect("Failed to open");
        assert_eq!(store.len(), 2);
        assert!(store.has("conv/conv/kernel:0"));
        assert_eq!(store.children("/conv/conv"), vec!["bias:0", "kernel:0"]);

        let kernel = store.get("/conv/conv/kernel:0").unwrap();
        assert_eq!(kernel.shape, vec![2, 3]);
        assert_eq!(kernel.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_list_tensors() {
        let mut weights = BTreeMap::new();
        weights.insert("layer1/kernel:0".to_string(), ArrayD::zeros(IxDyn(&[4, 4])));
        weights.insert("layer2/kernel:0".to_string(), ArrayD::zeros(IxDyn(&[4, 4])));

        let path = temp_file("list.safetensors");
        save_safetensors(&path, &weights).expect("Failed to save");

        let names = list_tensors(&path).expect("Failed to list");
        assert_eq!(names, vec!["layer1/kernel:0", "layer2/kernel:0"]);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_open_missing_file() {
        let err = SafeTensorsStore::open(temp_file("does_not_exist.safetensors")).unwrap_err();
        assert!(matches!(err, StoreError::IoError(_)));
    }
}
