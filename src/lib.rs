//! Host boundary for AOgmaNeo sparse predictive hierarchies.
//!
//! Descriptors are validated before an engine is built, step inputs are bounds-checked
//! before they reach it, and every model persists to a versioned binary format with
//! full, state-only and weights-only sections.
//!
//! Model objects live in [`model`]; [`Model`] carries their shared serialization and
//! lifecycle. Randomness comes from the process-wide generator in [`runtime`].

pub mod codec;
pub mod desc;
pub mod engine;
pub mod error;
pub mod helpers;
pub mod marshal;
pub mod model;
pub mod receptive_field;
pub mod runtime;
pub mod sampler;
pub mod validate;

pub use desc::{HierarchyDesc, ImageEncoderDesc, IoDesc, IoType, LayerDesc, SearcherDesc, VisibleLayerDesc};
pub use error::{Error, FormatError, Result, ShapeMismatchError, ValidationError};
pub use helpers::{Int2, Int3, Rng};
pub use model::{Model, Source, Status};
pub use receptive_field::ReceptiveField;
