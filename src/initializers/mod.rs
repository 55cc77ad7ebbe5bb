//! # Initializers and Regularizers
//!
//! Default initializers fill parameters that are not bound from a weight
//! store. They draw from a caller-supplied seeded [`StdRng`], so a given seed
//! always produces the same buffers.

use crate::graph::Shape;
use ndarray::{ArrayD, IxDyn};
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializerError {
    #[error("Invalid parameters for {name} initializer: {reason}.")]
    InvalidParameters { name: String, reason: String },
}

type Result<T> = std::result::Result<T, InitializerError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name")]
pub enum Initializer {
    Zeros,
    Ones,
    Constant { value: f32 },
    GlorotUniform,
    GlorotNormal,
    HeUniform,
    HeNormal,
    RandomUniform { min: f32, max: f32 },
    RandomNormal { mean: f32, stddev: f32 },
}

/// Fan-in and fan-out of a parameter shape.
///
/// For convolution kernels `[kh, kw, in, out]` the receptive field size
/// `kh * kw` multiplies both fans.
pub fn compute_fans(shape: &[usize]) -> (f32, f32) {
    match shape {
        [] => (1.0, 1.0),
        [n] => (*n as f32, *n as f32),
        [fan_in, fan_out] => (*fan_in as f32, *fan_out as f32),
        [spatial @ .., fan_in, fan_out] => {
            let receptive: usize = spatial.iter().product();
            ((fan_in * receptive) as f32, (fan_out * receptive) as f32)
        }
    }
}

impl Initializer {
    /// Produces a buffer of the given shape.
    pub fn initialize(&self, shape: &Shape, rng: &mut StdRng) -> Result<ArrayD<f32>> {
        let dim = IxDyn(shape);
        let (fan_in, fan_out) = compute_fans(shape);
        let array = match self {
            Initializer::Zeros => ArrayD::zeros(dim),
            Initializer::Ones => ArrayD::ones(dim),
            Initializer::Constant { value } => ArrayD::from_elem(dim, *value),
            Initializer::GlorotUniform => {
                let limit = (6.0 / (fan_in + fan_out)).sqrt();
                uniform(dim, -limit, limit, rng, "GlorotUniform")?
            }
            Initializer::GlorotNormal => {
                let stddev = (2.0 / (fan_in + fan_out)).sqrt();
                normal(dim, 0.0, stddev, rng, "GlorotNormal")?
            }
            Initializer::HeUniform => {
                let limit = (6.0 / fan_in).sqrt();
                uniform(dim, -limit, limit, rng, "HeUniform")?
            }
            Initializer::HeNormal => {
                let stddev = (2.0 / fan_in).sqrt();
                normal(dim, 0.0, stddev, rng, "HeNormal")?
            }
            Initializer::RandomUniform { min, max } => uniform(dim, *min, *max, rng, "RandomUniform")?,
            Initializer::RandomNormal { mean, stddev } => {
                normal(dim, *mean, *stddev, rng, "RandomNormal")?
            }
        };
        Ok(array)
    }
}

fn uniform(dim: IxDyn, low: f32, high: f32, rng: &mut StdRng, name: &str) -> Result<ArrayD<f32>> {
    if !(low < high) {
        return Err(InitializerError::InvalidParameters {
            name: name.to_string(),
            reason: format!("lower bound {} must be below upper bound {}", low, high),
        });
    }
    Ok(ArrayD::random_using(dim, Uniform::new(low, high), rng))
}

fn normal(dim: IxDyn, mean: f32, stddev: f32, rng: &mut StdRng, name: &str) -> Result<ArrayD<f32>> {
    let distribution = Normal::new(mean, stddev).map_err(|e| InitializerError::InvalidParameters {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(ArrayD::random_using(dim, distribution, rng))
}

/// Weight penalty attached to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name")]
pub enum Regularizer {
    L1 { l1: f32 },
    L2 { l2: f32 },
    L1L2 { l1: f32, l2: f32 },
}

impl Regularizer {
    /// `l1 * sum(|w|) + l2 * sum(w^2)`.
    pub fn penalty(&self, weights: &ArrayD<f32>) -> f32 {
        let (l1, l2) = match *self {
            Regularizer::L1 { l1 } => (l1, 0.0),
            Regularizer::L2 { l2 } => (0.0, l2),
            Regularizer::L1L2 { l1, l2 } => (l1, l2),
        };
        let mut total = 0.0;
        if l1 != 0.0 {
            total += l1 * weights.iter().map(|w| w.abs()).sum::<f32>();
        }
        if l2 != 0.0 {
            total += l2 * weights.iter().map(|w| w * w).sum::<f32>();
        }
        total
    }
}
