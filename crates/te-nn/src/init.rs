//! Seeded parameter initialisation and batch assembly

use candle_core::{Device, Shape, Tensor, Var};
use rand::Rng;
use te_common::TeResult;

/// Variable filled from `U(-bound, bound)`
pub fn uniform_var<R: Rng + ?Sized>(
    rng: &mut R,
    shape: impl Into<Shape>,
    bound: f64,
    device: &Device,
) -> TeResult<Var> {
    let shape = shape.into();
    let values: Vec<f64> = (0..shape.elem_count())
        .map(|_| rng.gen_range(-bound..bound))
        .collect();
    let tensor = Tensor::from_vec(values, shape, device)?;
    Ok(Var::from_tensor(&tensor)?)
}

/// Default bound for a layer with `fan_in` inputs
#[inline]
pub fn fan_in_bound(fan_in: usize) -> f64 {
    1.0 / (fan_in as f64).sqrt()
}

/// Row-major batch `[rows, cols]` from equally sized rows
pub fn batch_from_rows<'a>(
    rows: impl IntoIterator<Item = &'a [f64]>,
    cols: usize,
    device: &Device,
) -> TeResult<Tensor> {
    let mut data = Vec::new();
    let mut count = 0;
    for row in rows {
        if row.len() != cols {
            return Err(te_common::TeError::InvalidInput(format!(
                "row {count} has {} values, expected {cols}",
                row.len()
            )));
        }
        data.extend_from_slice(row);
        count += 1;
    }
    Ok(Tensor::from_vec(data, (count, cols), device)?)
}
