// AOgmaNeo host - descriptor and hyperparameter validation
//
// Pure checks run before any engine object is built or any parameter is committed.
// Each check reports the first offending field by path.

use crate::desc::{
    HierarchyDesc, ImageEncoderDesc, IoDesc, LayerDesc, SearcherDesc, VisibleLayerDesc,
};
use crate::engine::{actor, decoder, encoder, hierarchy, image_encoder};
use crate::error::ValidationError;
use crate::helpers::Int3;

type Check = std::result::Result<(), ValidationError>;

// --- Primitive rules ---

fn at_least(field: impl Into<String>, value: i64, min: i64) -> Check {
    if value < min {
        return Err(ValidationError::BelowMinimum {
            field: field.into(),
            min,
            value,
        });
    }
    Ok(())
}

fn finite(field: &str, value: f32) -> Check {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

fn in_range(field: &str, value: f32, min: f32, max: f32) -> Check {
    finite(field, value)?;
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: min as f64,
            max: max as f64,
            value: value as f64,
        });
    }
    Ok(())
}

fn non_negative(field: &str, value: f32) -> Check {
    in_range(field, value, 0.0, f32::MAX)
}

fn positive(field: &str, value: f32) -> Check {
    in_range(field, value, f32::MIN_POSITIVE, f32::MAX)
}

fn grid_size(field: &str, size: Int3) -> Check {
    at_least(format!("{field}.x"), size.x as i64, 1)?;
    at_least(format!("{field}.y"), size.y as i64, 1)?;
    at_least(format!("{field}.z"), size.z as i64, 1)
}

fn not_empty<T>(field: &str, items: &[T]) -> Check {
    if items.is_empty() {
        return Err(ValidationError::Empty {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn same_len(field: &str, expected: usize, actual: usize) -> Check {
    if expected != actual {
        return Err(ValidationError::LengthChanged {
            field: field.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

// --- Descriptors ---

pub fn validate_io_desc(desc: &IoDesc, field: &str) -> Check {
    grid_size(&format!("{field}.size"), desc.size)?;
    at_least(format!("{field}.num_dendrites_per_cell"), desc.num_dendrites_per_cell as i64, 1)?;
    at_least(format!("{field}.up_radius"), desc.up_radius as i64, 0)?;
    at_least(format!("{field}.down_radius"), desc.down_radius as i64, 0)?;
    at_least(format!("{field}.value_size"), desc.value_size as i64, 2)?;
    at_least(
        format!("{field}.value_num_dendrites_per_cell"),
        desc.value_num_dendrites_per_cell as i64,
        1,
    )?;
    at_least(format!("{field}.history_capacity"), desc.history_capacity as i64, 2)
}

pub fn validate_layer_desc(desc: &LayerDesc, field: &str) -> Check {
    grid_size(&format!("{field}.hidden_size"), desc.hidden_size)?;
    at_least(format!("{field}.num_dendrites_per_cell"), desc.num_dendrites_per_cell as i64, 1)?;
    at_least(format!("{field}.up_radius"), desc.up_radius as i64, 0)?;
    at_least(format!("{field}.recurrent_radius"), desc.recurrent_radius as i64, -1)?;
    at_least(format!("{field}.down_radius"), desc.down_radius as i64, 0)?;
    at_least(format!("{field}.ticks_per_update"), desc.ticks_per_update as i64, 1)?;
    at_least(format!("{field}.temporal_horizon"), desc.temporal_horizon as i64, 1)?;

    if desc.ticks_per_update > desc.temporal_horizon {
        return Err(ValidationError::TicksExceedHorizon {
            field: field.to_string(),
            ticks_per_update: desc.ticks_per_update,
            temporal_horizon: desc.temporal_horizon,
        });
    }

    Ok(())
}

pub fn validate_hierarchy_desc(desc: &HierarchyDesc) -> Check {
    not_empty("io_descs", &desc.io_descs)?;
    not_empty("layer_descs", &desc.layer_descs)?;

    for (i, d) in desc.io_descs.iter().enumerate() {
        validate_io_desc(d, &format!("io_descs[{i}]"))?;
    }
    for (l, d) in desc.layer_descs.iter().enumerate() {
        validate_layer_desc(d, &format!("layer_descs[{l}]"))?;
    }

    Ok(())
}

pub fn validate_visible_layer_desc(desc: &VisibleLayerDesc, field: &str) -> Check {
    grid_size(&format!("{field}.size"), desc.size)?;
    at_least(format!("{field}.radius"), desc.radius as i64, 0)
}

pub fn validate_image_encoder_desc(desc: &ImageEncoderDesc) -> Check {
    grid_size("hidden_size", desc.hidden_size)?;
    not_empty("visible_layer_descs", &desc.visible_layer_descs)?;

    for (vli, d) in desc.visible_layer_descs.iter().enumerate() {
        validate_visible_layer_desc(d, &format!("visible_layer_descs[{vli}]"))?;
    }

    Ok(())
}

pub fn validate_searcher_desc(desc: &SearcherDesc) -> Check {
    grid_size("config_size", desc.config_size)?;
    at_least("config_size.z", desc.config_size.z as i64, 2)?;
    at_least("radius", desc.radius as i64, 0)?;
    at_least("num_dendrites_per_cell", desc.num_dendrites_per_cell as i64, 1)?;
    at_least("value_size", desc.value_size as i64, 2)?;
    at_least(
        "value_num_dendrites_per_cell",
        desc.value_num_dendrites_per_cell as i64,
        1,
    )?;
    at_least("history_capacity", desc.history_capacity as i64, 2)
}

// --- Hyperparameters ---

pub fn validate_encoder_params(p: &encoder::Params, field: &str) -> Check {
    positive(&format!("{field}.choice"), p.choice)?;
    in_range(&format!("{field}.vigilance"), p.vigilance, 0.0, 1.0)?;
    in_range(&format!("{field}.lr"), p.lr, 0.0, 1.0)?;
    in_range(&format!("{field}.active_ratio"), p.active_ratio, 0.0, 1.0)?;
    at_least(format!("{field}.l_radius"), p.l_radius as i64, 0)
}

pub fn validate_decoder_params(p: &decoder::Params, field: &str) -> Check {
    positive(&format!("{field}.scale"), p.scale)?;
    non_negative(&format!("{field}.lr"), p.lr)
}

pub fn validate_actor_params(p: &actor::Params, field: &str) -> Check {
    non_negative(&format!("{field}.vlr"), p.vlr)?;
    non_negative(&format!("{field}.plr"), p.plr)?;
    in_range(&format!("{field}.smoothing"), p.smoothing, 0.0, 1.0)?;
    in_range(&format!("{field}.discount"), p.discount, 0.0, 1.0)?;
    in_range(&format!("{field}.td_scale_decay"), p.td_scale_decay, 0.0, 1.0)?;
    positive(&format!("{field}.value_range"), p.value_range)?;
    at_least(format!("{field}.min_steps"), p.min_steps as i64, 1)?;
    at_least(format!("{field}.history_iters"), p.history_iters as i64, 1)
}

pub fn validate_image_encoder_params(p: &image_encoder::Params) -> Check {
    in_range("params.falloff", p.falloff, 0.0, 1.0)?;
    in_range("params.lr", p.lr, 0.0, 1.0)?;
    positive("params.scale", p.scale)?;
    in_range("params.rr", p.rr, 0.0, 1.0)?;
    at_least("params.n_radius", p.n_radius as i64, 0)
}

/// Check a full hierarchy parameter set against the shape it was built with.
pub fn validate_hierarchy_params(p: &hierarchy::Params, num_layers: usize, num_io: usize) -> Check {
    same_len("params.layers", num_layers, p.layers.len())?;
    same_len("params.ios", num_io, p.ios.len())?;

    for (l, lp) in p.layers.iter().enumerate() {
        let field = format!("params.layers[{l}]");
        validate_encoder_params(&lp.encoder, &format!("{field}.encoder"))?;
        validate_decoder_params(&lp.decoder, &format!("{field}.decoder"))?;
        non_negative(&format!("{field}.recurrent_importance"), lp.recurrent_importance)?;
    }

    for (i, ip) in p.ios.iter().enumerate() {
        let field = format!("params.ios[{i}]");
        validate_decoder_params(&ip.decoder, &format!("{field}.decoder"))?;
        validate_actor_params(&ip.actor, &format!("{field}.actor"))?;
        non_negative(&format!("{field}.importance"), ip.importance)?;
    }

    Ok(())
}

pub fn validate_temperature(temperature: f32) -> Check {
    non_negative("temperature", temperature)
}

/// Reward and mimic signals must be finite.
pub fn validate_signal(field: &str, value: f32) -> Check {
    finite(field, value)
}
