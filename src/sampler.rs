// AOgmaNeo host - categorical prediction sampling

use crate::error::{Result, ShapeMismatchError};
use crate::helpers::Rng;
use crate::validate;

/// Index of the largest finite activation, first occurrence on ties. `0` when none is finite.
pub fn argmax(acts: &[f32]) -> usize {
    let mut max_index = 0usize;
    let mut max_activation = f32::NEG_INFINITY;

    for (i, &a) in acts.iter().enumerate() {
        if a.is_finite() && a > max_activation {
            max_activation = a;
            max_index = i;
        }
    }

    max_index
}

/// Draw one index from a column's activations.
///
/// Temperature `0` selects the arg-max. Otherwise each entry is weighted by
/// `(v / max)^(1 / temperature)`; non-positive and non-finite entries get weight zero and
/// are never selected. When no entry has positive weight the arg-max is returned.
pub fn sample_column(acts: &[f32], temperature: f32, rng: &mut Rng) -> usize {
    let max_index = argmax(acts);

    if temperature <= 0.0 {
        return max_index;
    }

    let max = match acts.get(max_index) {
        Some(&m) if m.is_finite() && m > 0.0 => m,
        _ => return max_index,
    };

    let inv_temperature = 1.0 / temperature;
    let weight = |v: f32| -> f32 {
        if v.is_finite() && v > 0.0 {
            (v / max).powf(inv_temperature)
        } else {
            0.0
        }
    };

    let total: f32 = acts.iter().map(|&v| weight(v)).sum();
    if !(total.is_finite() && total > 0.0) {
        return max_index;
    }

    let cusp = rng.randf() * total;

    let mut sum_so_far = 0.0f32;
    let mut last_index = max_index;

    for (i, &v) in acts.iter().enumerate() {
        let w = weight(v);
        if w <= 0.0 {
            continue;
        }

        sum_so_far += w;
        last_index = i;

        if sum_so_far >= cusp {
            return i;
        }
    }

    // rounding shortfall
    last_index
}

/// Sample every column of a CSDR activation buffer (`column_size` entries per column).
pub fn sample_csdr(acts: &[f32], column_size: usize, temperature: f32, rng: &mut Rng) -> Result<Vec<i32>> {
    validate::validate_temperature(temperature)?;

    if column_size == 0 || acts.len() % column_size != 0 {
        return Err(ShapeMismatchError::ActivationLength {
            len: acts.len(),
            column_size,
        }
        .into());
    }

    Ok(acts
        .chunks_exact(column_size)
        .map(|column| sample_column(column, temperature, rng) as i32)
        .collect())
}
