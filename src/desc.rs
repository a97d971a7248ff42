// AOgmaNeo host - structural descriptors
//
// Descriptors are fixed once a model is constructed. They load from JSON with defaults
// for omitted fields and are always run through `crate::validate` before use.

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};
use crate::helpers::Int3;
use crate::validate;

/// Determines how a hierarchy processes a particular IO port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoType {
    /// Input only: feeds the first encoder, produces no prediction.
    None = 0,
    /// A decoder predicts this input's next value.
    #[default]
    Prediction = 1,
    /// An actor selects this input's next value by reinforcement learning.
    Action = 2,
}

impl TryFrom<u8> for IoType {
    type Error = FormatError;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(IoType::None),
            1 => Ok(IoType::Prediction),
            2 => Ok(IoType::Action),
            _ => Err(FormatError::Corrupt {
                what: "io type".to_string(),
                detail: format!("unknown tag {v}"),
            }),
        }
    }
}

/// One visible (input) connection of an engine component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibleLayerDesc {
    pub size: Int3,
    pub radius: i32,
}

impl Default for VisibleLayerDesc {
    fn default() -> Self {
        Self {
            size: Int3::new(5, 5, 16),
            radius: 2,
        }
    }
}

impl VisibleLayerDesc {
    pub fn diam(&self) -> i32 {
        self.radius * 2 + 1
    }

    pub fn area(&self) -> usize {
        (self.diam() * self.diam()) as usize
    }
}

/// Structural descriptor for one IO port.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoDesc {
    pub size: Int3,
    pub io_type: IoType,
    /// Dendrites per cell of the decoder, or of the actor's policy head.
    pub num_dendrites_per_cell: usize,
    /// Radius from this port up into the first encoder.
    pub up_radius: i32,
    /// Radius from the first encoder down into this port's decoder/actor.
    pub down_radius: i32,
    /// Critic value bins. Action ports only.
    pub value_size: usize,
    /// Dendrites per critic cell. Action ports only.
    pub value_num_dendrites_per_cell: usize,
    /// Replay history length. Action ports only.
    pub history_capacity: usize,
}

impl Default for IoDesc {
    fn default() -> Self {
        Self {
            size: Int3::new(5, 5, 16),
            io_type: IoType::Prediction,
            num_dendrites_per_cell: 4,
            up_radius: 2,
            down_radius: 2,
            value_size: 128,
            value_num_dendrites_per_cell: 2,
            history_capacity: 512,
        }
    }
}

/// Structural descriptor for one encoder layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerDesc {
    pub hidden_size: Int3,
    /// Dendrites per cell of this layer's decoders.
    pub num_dendrites_per_cell: usize,
    /// Radius from the layer below.
    pub up_radius: i32,
    /// Self-recurrent radius; `-1` disables recurrence.
    pub recurrent_radius: i32,
    /// Radius from this layer down into the decoders below.
    pub down_radius: i32,
    /// Lower-layer states consumed per update. Layer 0 runs every tick.
    pub ticks_per_update: usize,
    /// Lower-layer states the encoder sees at once.
    pub temporal_horizon: usize,
}

impl Default for LayerDesc {
    fn default() -> Self {
        Self {
            hidden_size: Int3::new(5, 5, 16),
            num_dendrites_per_cell: 4,
            up_radius: 2,
            recurrent_radius: 0,
            down_radius: 2,
            ticks_per_update: 2,
            temporal_horizon: 2,
        }
    }
}

/// Everything needed to build a hierarchy from scratch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyDesc {
    pub io_descs: Vec<IoDesc>,
    pub layer_descs: Vec<LayerDesc>,
}

impl HierarchyDesc {
    pub fn new(io_descs: Vec<IoDesc>, layer_descs: Vec<LayerDesc>) -> Self {
        Self {
            io_descs,
            layer_descs,
        }
    }

    /// Parse and validate a JSON descriptor bundle.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let desc: Self = serde_json::from_str(s)?;
        validate::validate_hierarchy_desc(&desc)?;
        Ok(desc)
    }
}

/// Everything needed to build an image encoder from scratch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageEncoderDesc {
    pub hidden_size: Int3,
    pub visible_layer_descs: Vec<VisibleLayerDesc>,
}

impl Default for ImageEncoderDesc {
    fn default() -> Self {
        Self {
            hidden_size: Int3::new(5, 5, 16),
            visible_layer_descs: vec![VisibleLayerDesc::default()],
        }
    }
}

impl ImageEncoderDesc {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let desc: Self = serde_json::from_str(s)?;
        validate::validate_image_encoder_desc(&desc)?;
        Ok(desc)
    }
}

/// Configuration search space: `config_size.x * config_size.y` slots with `config_size.z`
/// options each.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearcherDesc {
    pub config_size: Int3,
    /// Radius over the previous configuration.
    pub radius: i32,
    pub num_dendrites_per_cell: usize,
    pub value_size: usize,
    pub value_num_dendrites_per_cell: usize,
    pub history_capacity: usize,
}

impl Default for SearcherDesc {
    fn default() -> Self {
        Self {
            config_size: Int3::new(1, 4, 8),
            radius: 2,
            num_dendrites_per_cell: 4,
            value_size: 64,
            value_num_dendrites_per_cell: 2,
            history_capacity: 64,
        }
    }
}

impl SearcherDesc {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let desc: Self = serde_json::from_str(s)?;
        validate::validate_searcher_desc(&desc)?;
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ValidationError};

    #[test]
    fn test_hierarchy_desc_from_json_fills_defaults() {
        let json = r#"{
            "io_descs": [{ "size": { "x": 4, "y": 4, "z": 16 }, "io_type": "action" }],
            "layer_descs": [{ "hidden_size": { "x": 3, "y": 3, "z": 8 }, "recurrent_radius": -1 }]
        }"#;
        let desc = HierarchyDesc::from_json_str(json).unwrap();
        assert_eq!(desc.io_descs[0].io_type, IoType::Action);
        assert_eq!(desc.io_descs[0].history_capacity, 512);
        assert_eq!(desc.layer_descs[0].recurrent_radius, -1);
        assert_eq!(desc.layer_descs[0].temporal_horizon, 2);
    }

    #[test]
    fn test_hierarchy_desc_from_json_validates() {
        let json = r#"{
            "io_descs": [{ "size": { "x": 4, "y": 4, "z": 0 } }],
            "layer_descs": [{}]
        }"#;
        match HierarchyDesc::from_json_str(json) {
            Err(Error::Validation(e)) => assert_eq!(e.field(), Some("io_descs[0].size.z")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_json_is_config_error() {
        assert!(matches!(
            SearcherDesc::from_json_str("{ not json"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ImageEncoderDesc::from_json_str(r#"{ "visible_layer_descs": [] }"#),
            Err(Error::Validation(ValidationError::Empty { .. }))
        ));
    }

    #[test]
    fn test_io_type_tags() {
        assert_eq!(IoType::try_from(2).unwrap(), IoType::Action);
        assert!(IoType::try_from(7).is_err());
    }
}
