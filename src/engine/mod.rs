// AOgmaNeo host - learning engine
//
// Sparse predictive hierarchy components. Every component receives its randomness and
// its hyperparameters explicitly per call, and reads/writes itself through the fallible
// codec. Structural values read back from a stream are checked before anything is
// allocated from them.

pub mod actor;
pub mod decoder;
pub mod encoder;
pub mod hierarchy;
pub mod image_encoder;
pub mod searcher;

use crate::codec::{Reader, Writer};
use crate::desc::VisibleLayerDesc;
use crate::error::{FormatError, Result};
use crate::helpers::Int3;

/// Upper bound on any single buffer rebuilt from serialized dimensions.
pub(crate) const MAX_BUFFER_LEN: usize = 1 << 31;

pub(crate) fn corrupt(what: &str, detail: impl Into<String>) -> FormatError {
    FormatError::Corrupt {
        what: what.to_string(),
        detail: detail.into(),
    }
}

/// Read a grid size whose components must all be at least 1.
pub(crate) fn read_size(reader: &mut dyn Reader, what: &str) -> Result<Int3> {
    let size = reader.read_int3()?;
    if size.x < 1 || size.y < 1 || size.z < 1 {
        return Err(corrupt(what, format!("size {size:?} has a component below 1")).into());
    }
    buffer_len(what, &[size.x as usize, size.y as usize, size.z as usize])?;
    Ok(size)
}

/// Read a count that must lie in `[min, MAX_BUFFER_LEN]`.
pub(crate) fn read_usize(reader: &mut dyn Reader, what: &str, min: usize) -> Result<usize> {
    let v = reader.read_i32()?;
    if v < min as i32 {
        return Err(corrupt(what, format!("{v} is below {min}")).into());
    }
    Ok(v as usize)
}

/// Reject a restored CSDR holding an index outside `[0, column_size)`.
pub(crate) fn check_restored_cis(what: &str, cis: &[i32], column_size: i32) -> Result<()> {
    match cis.iter().position(|&ci| ci < 0 || ci >= column_size) {
        Some(i) => Err(corrupt(what, format!("column {i}: index {} outside [0, {column_size})", cis[i])).into()),
        None => Ok(()),
    }
}

pub(crate) fn write_visible_layer_desc(writer: &mut dyn Writer, vld: &VisibleLayerDesc) -> Result<()> {
    writer.write_int3(vld.size)?;
    writer.write_i32(vld.radius)
}

pub(crate) fn read_visible_layer_desc(reader: &mut dyn Reader, what: &str) -> Result<VisibleLayerDesc> {
    let size = read_size(reader, what)?;
    let radius = reader.read_i32()?;
    if !(0..=(1 << 12)).contains(&radius) {
        return Err(corrupt(what, format!("radius {radius} out of range")).into());
    }
    Ok(VisibleLayerDesc { size, radius })
}

/// Product of `factors`, rejected when it overflows or exceeds [`MAX_BUFFER_LEN`].
pub(crate) fn buffer_len(what: &str, factors: &[usize]) -> Result<usize> {
    let mut len = 1usize;
    for &f in factors {
        len = match len.checked_mul(f) {
            Some(v) if v <= MAX_BUFFER_LEN => v,
            _ => return Err(corrupt(what, format!("buffer dimensions {factors:?} too large")).into()),
        };
    }
    Ok(len)
}
