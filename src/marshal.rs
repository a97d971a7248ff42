// AOgmaNeo host - step input marshalling
//
// Caller buffers are checked in full before a single value is copied, so a rejected
// step leaves both the backing storage and the engine untouched.

use crate::error::{Result, ShapeMismatchError};
use crate::helpers::{ByteBuffer, Int3, IntBuffer};
use crate::validate;

/// Check that `inputs` is one CSDR per stream in `sizes`: count, then lengths, then values.
pub fn check_cis<I: AsRef<[i32]>>(inputs: &[I], sizes: &[Int3]) -> Result<()> {
    check_count(inputs.len(), sizes.len())?;

    for (index, (input, size)) in inputs.iter().zip(sizes).enumerate() {
        check_len(index, input.as_ref().len(), size.num_columns())?;
    }

    for (index, (input, size)) in inputs.iter().zip(sizes).enumerate() {
        if let Some((position, &value)) = input
            .as_ref()
            .iter()
            .enumerate()
            .find(|(_, &v)| v < 0 || v >= size.z)
        {
            return Err(ShapeMismatchError::InputOutOfRange {
                index,
                position,
                value,
                column_size: size.z,
            }
            .into());
        }
    }

    Ok(())
}

/// Check that `inputs` is one byte image of `x * y * z` values per layer in `sizes`.
pub fn check_images<I: AsRef<[u8]>>(inputs: &[I], sizes: &[Int3]) -> Result<()> {
    check_count(inputs.len(), sizes.len())?;

    for (index, (input, size)) in inputs.iter().zip(sizes).enumerate() {
        check_len(index, input.as_ref().len(), size.num_cells())?;
    }

    Ok(())
}

/// Reward and mimic must be finite.
pub fn check_signals(reward: f32, mimic: f32) -> Result<()> {
    validate::validate_signal("reward", reward)?;
    validate::validate_signal("mimic", mimic)?;
    Ok(())
}

fn check_count(actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(ShapeMismatchError::InputCount { expected, actual }.into());
    }
    Ok(())
}

fn check_len(index: usize, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(ShapeMismatchError::InputSize {
            index,
            expected,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Fixed-capacity CSDR storage, one buffer per stream, allocated once.
#[derive(Clone, Debug, Default)]
pub struct InputBuffers {
    sizes: Vec<Int3>,
    buffers: Vec<IntBuffer>,
}

impl InputBuffers {
    pub fn new(sizes: &[Int3]) -> Self {
        Self {
            sizes: sizes.to_vec(),
            buffers: sizes.iter().map(|s| vec![0; s.num_columns()]).collect(),
        }
    }

    /// Validate every buffer, then copy them all in.
    pub fn load<I: AsRef<[i32]>>(&mut self, inputs: &[I]) -> Result<()> {
        check_cis(inputs, &self.sizes)?;

        for (dst, src) in self.buffers.iter_mut().zip(inputs) {
            dst.copy_from_slice(src.as_ref());
        }

        Ok(())
    }

    pub fn slices(&self) -> Vec<&[i32]> {
        self.buffers.iter().map(Vec::as_slice).collect()
    }

    pub fn sizes(&self) -> &[Int3] {
        &self.sizes
    }
}

/// Fixed-capacity byte image storage, one buffer per visible layer.
#[derive(Clone, Debug, Default)]
pub struct ImageBuffers {
    sizes: Vec<Int3>,
    buffers: Vec<ByteBuffer>,
}

impl ImageBuffers {
    pub fn new(sizes: &[Int3]) -> Self {
        Self {
            sizes: sizes.to_vec(),
            buffers: sizes.iter().map(|s| vec![0; s.num_cells()]).collect(),
        }
    }

    pub fn load<I: AsRef<[u8]>>(&mut self, inputs: &[I]) -> Result<()> {
        check_images(inputs, &self.sizes)?;

        for (dst, src) in self.buffers.iter_mut().zip(inputs) {
            dst.copy_from_slice(src.as_ref());
        }

        Ok(())
    }

    pub fn slices(&self) -> Vec<&[u8]> {
        self.buffers.iter().map(Vec::as_slice).collect()
    }
}
