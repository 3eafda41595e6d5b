//! Checkpoint container
//!
//! A checkpoint is a single safetensors file holding every tensor of one
//! component under dotted names plus two metadata scalars
//! (`meta.schema`, `meta.kind`). Writes go to a sibling temp file that is
//! renamed over the destination, so a checkpoint is either complete or
//! absent.

use candle_core::{DType, Device, Tensor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use te_common::{TeError, TeResult};
use tracing::debug;

const SCHEMA_VERSION: f64 = 1.0;
const SCHEMA_KEY: &str = "meta.schema";
const KIND_KEY: &str = "meta.kind";

/// Which component wrote a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    /// DQN agent
    Agent = 1,
    /// Sequence predictor
    Predictor = 2,
}

impl BundleKind {
    fn tag(self) -> f64 {
        self as u8 as f64
    }
}

/// Named tensors destined for (or read from) one checkpoint file
#[derive(Debug, Clone)]
pub struct TensorBundle {
    tensors: HashMap<String, Tensor>,
    device: Device,
}

impl TensorBundle {
    /// Empty bundle tagged with `kind`
    pub fn new(kind: BundleKind, device: &Device) -> TeResult<Self> {
        let mut bundle = Self {
            tensors: HashMap::new(),
            device: device.clone(),
        };
        bundle.insert_scalar(SCHEMA_KEY, SCHEMA_VERSION)?;
        bundle.insert_scalar(KIND_KEY, kind.tag())?;
        Ok(bundle)
    }

    /// Add a tensor (replacing any previous one under `name`)
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Add a scalar stored as a one-element tensor
    pub fn insert_scalar(&mut self, name: impl Into<String>, value: f64) -> TeResult<()> {
        let tensor = Tensor::from_vec(vec![value], 1, &self.device)?;
        self.insert(name, tensor);
        Ok(())
    }

    /// Add a 1-D series; an empty series is simply not stored
    pub fn insert_series(&mut self, name: impl Into<String>, values: &[f64]) -> TeResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let tensor = Tensor::from_slice(values, values.len(), &self.device)?;
        self.insert(name, tensor);
        Ok(())
    }

    /// Atomically write the bundle to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> TeResult<()> {
        let path = path.as_ref();
        let tmp = temp_sibling(path);
        candle_core::safetensors::save(&self.tensors, &tmp)
            .map_err(|e| TeError::Persistence(format!("writing {}: {e}", tmp.display())))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(path = %path.display(), tensors = self.tensors.len(), "Checkpoint written");
        Ok(())
    }

    /// Read a bundle, checking schema version and component kind
    pub fn load(path: impl AsRef<Path>, kind: BundleKind, device: &Device) -> TeResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TeError::Persistence(format!("{} does not exist", path.display())));
        }
        let tensors = candle_core::safetensors::load(path, device)
            .map_err(|e| TeError::Persistence(format!("reading {}: {e}", path.display())))?;
        let mut bundle = Self {
            tensors,
            device: device.clone(),
        };

        let schema = bundle.scalar(SCHEMA_KEY)?;
        if schema != SCHEMA_VERSION {
            return Err(TeError::Persistence(format!(
                "unsupported checkpoint schema {schema}, expected {SCHEMA_VERSION}"
            )));
        }
        let tag = bundle.scalar(KIND_KEY)?;
        if tag != kind.tag() {
            return Err(TeError::Persistence(format!(
                "checkpoint holds component kind {tag}, expected {kind:?}"
            )));
        }

        debug!(path = %path.display(), tensors = bundle.tensors.len(), "Checkpoint read");
        Ok(bundle)
    }

    /// Remove and return `name`, checking its shape
    pub fn take(&mut self, name: &str, dims: &[usize]) -> TeResult<Tensor> {
        let tensor = self
            .tensors
            .remove(name)
            .ok_or_else(|| TeError::Persistence(format!("missing tensor `{name}`")))?;
        if tensor.dims() != dims {
            return Err(TeError::Persistence(format!(
                "tensor `{name}` has shape {:?}, expected {dims:?}",
                tensor.dims()
            )));
        }
        if tensor.dtype() != DType::F64 {
            return Err(TeError::Persistence(format!(
                "tensor `{name}` has dtype {:?}, expected F64",
                tensor.dtype()
            )));
        }
        Ok(tensor)
    }

    /// Read a scalar written by [`TensorBundle::insert_scalar`]
    pub fn scalar(&mut self, name: &str) -> TeResult<f64> {
        let tensor = self.take(name, &[1])?;
        Ok(tensor.to_vec1::<f64>()?[0])
    }

    /// Read a series; absent means empty
    pub fn series(&mut self, name: &str) -> TeResult<Vec<f64>> {
        match self.tensors.remove(name) {
            None => Ok(Vec::new()),
            Some(tensor) if tensor.rank() == 1 && tensor.dtype() == DType::F64 => {
                Ok(tensor.to_vec1::<f64>()?)
            }
            Some(tensor) => Err(TeError::Persistence(format!(
                "series `{name}` has shape {:?}",
                tensor.dims()
            ))),
        }
    }

    /// Whether `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Number of stored tensors
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the bundle holds nothing
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
