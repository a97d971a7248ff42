// AOgmaNeo host - model objects
//
// A model owns exactly one engine and its mutable hyperparameters. It is Ready after a
// random init or a successful restore, and Failed for good once a restore goes wrong.

pub mod hierarchy;
pub mod image_encoder;
pub mod searcher;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::codec::{BufferReader, BufferWriter, Reader, SizeCounter, StreamReader, StreamWriter, Writer};
use crate::engine::corrupt;
use crate::error::{Error, FormatError, Result, ShapeMismatchError, ValidationError};

pub use hierarchy::Hierarchy;
pub use image_encoder::ImageEncoder;
pub use searcher::Searcher;

/// Version written after the magic of every full section.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ready,
    /// A restore failed; every operation now returns [`Error::Uninitialized`].
    Failed,
}

/// Where to build a model from. The first supplied source wins: buffer, then path,
/// then descriptors.
#[derive(Clone, Debug)]
pub struct Source<'a, D> {
    pub buffer: Option<&'a [u8]>,
    pub path: Option<&'a Path>,
    pub desc: Option<D>,
}

impl<D> Default for Source<'_, D> {
    fn default() -> Self {
        Self {
            buffer: None,
            path: None,
            desc: None,
        }
    }
}

impl<'a, D> Source<'a, D> {
    pub fn buffer(buffer: &'a [u8]) -> Self {
        Self {
            buffer: Some(buffer),
            ..Default::default()
        }
    }

    pub fn path(path: &'a Path) -> Self {
        Self {
            path: Some(path),
            ..Default::default()
        }
    }

    pub fn desc(desc: D) -> Self {
        Self {
            desc: Some(desc),
            ..Default::default()
        }
    }
}

/// Serialization and lifecycle shared by every model object.
///
/// Implementors provide the engine-level hooks; sizing, buffer and file handling and
/// atomic restores come for free.
pub trait Model: Sized + Clone {
    /// Name used in errors and logs.
    const KIND: &'static str;
    const MAGIC: u32;

    type Desc;
    type Params;

    /// Validate `desc` and build a model with random weights.
    fn init_random(desc: &Self::Desc) -> Result<Self>;

    fn status(&self) -> Status;

    /// Mark the model unusable after a failed restore.
    fn set_failed(&mut self);

    fn params(&self) -> Result<&Self::Params>;

    /// Replace the hyperparameters. Nothing changes unless every value is legal.
    fn update_params(&mut self, params: Self::Params) -> Result<()>;

    /// Full section: magic, version, engine, params.
    fn write(&self, writer: &mut dyn Writer) -> Result<()>;

    /// Read a full section. The magic and version are checked before anything else.
    fn read(reader: &mut dyn Reader) -> Result<Self>;

    fn write_state(&self, writer: &mut dyn Writer) -> Result<()>;

    fn write_weights(&self, writer: &mut dyn Writer) -> Result<()>;

    /// Overwrite the transient state in place. May leave `self` partially written on error;
    /// callers go through [`Model::set_state_from_buffer`].
    fn read_state(&mut self, reader: &mut dyn Reader) -> Result<()>;

    fn read_weights(&mut self, reader: &mut dyn Reader) -> Result<()>;

    fn ensure_ready(&self) -> Result<()> {
        match self.status() {
            Status::Ready => Ok(()),
            Status::Failed => Err(Error::Uninitialized { kind: Self::KIND }),
        }
    }

    /// Replace this model with one read from a full section. On any error the model
    /// becomes [`Status::Failed`].
    fn restore(&mut self, reader: &mut dyn Reader) -> Result<()> {
        self.ensure_ready()?;

        match Self::read(reader) {
            Ok(model) => {
                *self = model;
                tracing::debug!(kind = Self::KIND, "restored model");
                Ok(())
            }
            Err(e) => {
                self.set_failed();
                tracing::debug!(kind = Self::KIND, error = %e, "restore failed");
                Err(e)
            }
        }
    }

    fn size(&self) -> Result<usize> {
        let mut counter = SizeCounter::new();
        self.write(&mut counter)?;
        Ok(counter.len())
    }

    fn state_size(&self) -> Result<usize> {
        let mut counter = SizeCounter::new();
        self.write_state(&mut counter)?;
        Ok(counter.len())
    }

    fn weights_size(&self) -> Result<usize> {
        let mut counter = SizeCounter::new();
        self.write_weights(&mut counter)?;
        Ok(counter.len())
    }

    fn serialize_to_buffer(&self) -> Result<Vec<u8>> {
        let mut writer = BufferWriter::with_capacity(self.size()?);
        self.write(&mut writer)?;
        let bytes = writer.finish("full")?;
        tracing::debug!(kind = Self::KIND, len = bytes.len(), "serialized model");
        Ok(bytes)
    }

    fn serialize_state_to_buffer(&self) -> Result<Vec<u8>> {
        let mut writer = BufferWriter::with_capacity(self.state_size()?);
        self.write_state(&mut writer)?;
        writer.finish("state")
    }

    fn serialize_weights_to_buffer(&self) -> Result<Vec<u8>> {
        let mut writer = BufferWriter::with_capacity(self.weights_size()?);
        self.write_weights(&mut writer)?;
        writer.finish("weights")
    }

    /// Load a state-only section. `buffer` must be exactly [`Model::state_size`] bytes.
    fn set_state_from_buffer(&mut self, buffer: &[u8]) -> Result<()> {
        let expected = self.state_size()?;
        load_section(self, buffer, expected, "state", |m, r| m.read_state(r))
    }

    /// Load a weights-only section. `buffer` must be exactly [`Model::weights_size`] bytes.
    fn set_weights_from_buffer(&mut self, buffer: &[u8]) -> Result<()> {
        let expected = self.weights_size()?;
        load_section(self, buffer, expected, "weights", |m, r| m.read_weights(r))
    }

    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = StreamWriter::new(BufWriter::new(file));
        self.write(&mut writer)?;
        writer.into_inner().flush()?;

        tracing::debug!(kind = Self::KIND, path = %path.as_ref().display(), "saved model");
        Ok(())
    }

    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = StreamReader::new(BufReader::new(file));
        let model = Self::read(&mut reader)?;

        tracing::debug!(kind = Self::KIND, path = %path.as_ref().display(), "loaded model");
        Ok(model)
    }

    /// Build from a full section that must span the whole buffer.
    fn from_buffer(buffer: &[u8]) -> Result<Self> {
        let mut reader = BufferReader::new(buffer);
        let model = Self::read(&mut reader)?;

        if reader.remaining() != 0 {
            return Err(corrupt(Self::KIND, format!("{} trailing bytes", reader.remaining())).into());
        }

        Ok(model)
    }

    fn open(source: Source<'_, Self::Desc>) -> Result<Self> {
        if let Some(buffer) = source.buffer {
            Self::from_buffer(buffer)
        } else if let Some(path) = source.path {
            Self::from_file(path)
        } else if let Some(desc) = &source.desc {
            Self::init_random(desc)
        } else {
            Err(ValidationError::NoSource.into())
        }
    }
}

// Read a section into a copy, then commit. Any failure leaves the model Failed.
fn load_section<M: Model>(
    model: &mut M,
    buffer: &[u8],
    expected: usize,
    section: &'static str,
    read: impl FnOnce(&mut M, &mut dyn Reader) -> Result<()>,
) -> Result<()> {
    if buffer.len() != expected {
        model.set_failed();
        return Err(FormatError::SectionSize {
            section,
            expected,
            actual: buffer.len(),
        }
        .into());
    }

    let mut staged = model.clone();
    match read(&mut staged, &mut BufferReader::new(buffer)) {
        Ok(()) => {
            *model = staged;
            tracing::debug!(kind = M::KIND, section, "loaded section");
            Ok(())
        }
        Err(e) => {
            model.set_failed();
            Err(e)
        }
    }
}

pub(crate) fn check_index(what: &'static str, index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(ShapeMismatchError::IndexOutOfRange { what, index, len }.into());
    }
    Ok(())
}

/// Params that fail validation after a successful read mean the bytes are corrupt.
pub(crate) fn corrupt_params(kind: &'static str, e: ValidationError) -> Error {
    corrupt(&format!("{kind} params"), e.to_string()).into()
}
