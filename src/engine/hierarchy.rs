// AOgmaNeo host - Hierarchy (layer orchestration with exponential memory)
#![allow(clippy::needless_range_loop)]

use serde::{Deserialize, Serialize};

use super::actor::{self, Actor};
use super::decoder::{self, Decoder};
use super::encoder::{self, Encoder};
use super::{check_restored_cis, corrupt, read_size, read_usize};
use crate::codec::{Reader, Writer};
use crate::desc::{HierarchyDesc, IoType, VisibleLayerDesc};
use crate::error::Result;
use crate::helpers::*;

/// Most layers or IO ports a serialized hierarchy may declare.
const MAX_LAYERS: usize = 1 << 10;
const MAX_IO: usize = 1 << 16;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerParams {
    pub encoder: encoder::Params,
    /// Used by the decoders of layers above 0.
    pub decoder: decoder::Params,
    /// Importance of the encoder's own previous state.
    pub recurrent_importance: f32,
}

impl Default for LayerParams {
    fn default() -> Self {
        Self {
            encoder: encoder::Params::default(),
            decoder: decoder::Params::default(),
            recurrent_importance: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoParams {
    /// Used when the port is a prediction port.
    pub decoder: decoder::Params,
    /// Used when the port is an action port.
    pub actor: actor::Params,
    /// Importance of this port in the first encoder.
    pub importance: f32,
}

impl Default for IoParams {
    fn default() -> Self {
        Self {
            decoder: decoder::Params::default(),
            actor: actor::Params::default(),
            importance: 1.0,
        }
    }
}

/// Mutable hyperparameters of a hierarchy, one entry per layer and per IO port.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub layers: Vec<LayerParams>,
    pub ios: Vec<IoParams>,
    /// Decoders additionally learn with the actual next state in the feedback slot.
    pub anticipation: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl Params {
    pub fn new(num_layers: usize, num_io: usize) -> Self {
        Self {
            layers: vec![LayerParams::default(); num_layers],
            ios: vec![IoParams::default(); num_io],
            anticipation: true,
        }
    }

    pub fn write(&self, writer: &mut dyn Writer) -> Result<()> {
        for lp in &self.layers {
            lp.encoder.write(writer)?;
            lp.decoder.write(writer)?;
            writer.write_f32(lp.recurrent_importance)?;
        }

        for ip in &self.ios {
            ip.decoder.write(writer)?;
            ip.actor.write(writer)?;
            writer.write_f32(ip.importance)?;
        }

        writer.write_u8(self.anticipation as u8)
    }

    /// Read a parameter set for a hierarchy of the given shape.
    pub fn read(reader: &mut dyn Reader, num_layers: usize, num_io: usize) -> Result<Self> {
        let mut layers = Vec::with_capacity(num_layers);
        for _ in 0..num_layers {
            layers.push(LayerParams {
                encoder: encoder::Params::read(reader)?,
                decoder: decoder::Params::read(reader)?,
                recurrent_importance: reader.read_f32()?,
            });
        }

        let mut ios = Vec::with_capacity(num_io);
        for _ in 0..num_io {
            ios.push(IoParams {
                decoder: decoder::Params::read(reader)?,
                actor: actor::Params::read(reader)?,
                importance: reader.read_f32()?,
            });
        }

        Ok(Self {
            layers,
            ios,
            anticipation: reader.read_u8()? != 0,
        })
    }
}

fn input_sizes(n: usize, size_of: impl Fn(usize) -> Int3) -> Vec<Int3> {
    (0..n).map(size_of).collect()
}

#[derive(Clone, Debug, Default)]
pub struct Hierarchy {
    encoders: Vec<Encoder>,
    decoders: Vec<Vec<Decoder>>, // decoders[layer][d]
    actors: Vec<Actor>,
    hidden_cis_prev: Vec<IntBuffer>,
    feedback_cis_prev: Vec<IntBuffer>,
    // lower-layer states seen by each layer, newest first; empty for layer 0
    histories: Vec<CircleBuffer<IntBuffer>>,
    io_sizes: Vec<Int3>,
    io_types: Vec<IoType>,
    // decoder/actor index -> io port
    prediction_ios: Vec<usize>,
    action_ios: Vec<usize>,
    // io port -> decoder/actor index
    io_indices: Vec<Option<usize>>,
    recurrent: Vec<bool>,
    ticks: Vec<usize>,
    ticks_per_update: Vec<usize>,
    updates: Vec<bool>,
}

impl Hierarchy {
    /// Build from a validated descriptor bundle.
    pub fn init_random(&mut self, desc: &HierarchyDesc, rng: &mut Rng) {
        let io_descs = &desc.io_descs;
        let layer_descs = &desc.layer_descs;
        let num_layers = layer_descs.len();

        self.set_layout(
            io_descs.iter().map(|d| d.size).collect(),
            io_descs.iter().map(|d| d.io_type).collect(),
            layer_descs.iter().map(|d| d.ticks_per_update).collect(),
            layer_descs.iter().map(|d| d.recurrent_radius >= 0).collect(),
        );

        self.encoders = Vec::with_capacity(num_layers);
        self.decoders = Vec::with_capacity(num_layers);
        self.actors = Vec::with_capacity(self.action_ios.len());
        self.histories = Vec::with_capacity(num_layers);

        for l in 0..num_layers {
            let ld = &layer_descs[l];
            let has_feedback = l < num_layers - 1;
            let mut e_vlds = Vec::new();
            let mut history = CircleBuffer::new();

            if l == 0 {
                for d in io_descs {
                    e_vlds.push(VisibleLayerDesc {
                        size: d.size,
                        radius: d.up_radius,
                    });
                }

                let mut layer_decoders = Vec::with_capacity(self.prediction_ios.len());
                for &i in &self.prediction_ios {
                    let d_vld = VisibleLayerDesc {
                        size: ld.hidden_size,
                        radius: io_descs[i].down_radius,
                    };
                    let mut dec = Decoder::default();
                    dec.init_random(
                        io_descs[i].size,
                        io_descs[i].num_dendrites_per_cell,
                        vec![d_vld; 1 + has_feedback as usize],
                        rng,
                    );
                    layer_decoders.push(dec);
                }
                self.decoders.push(layer_decoders);

                for &i in &self.action_ios {
                    let a_vld = VisibleLayerDesc {
                        size: ld.hidden_size,
                        radius: io_descs[i].down_radius,
                    };
                    let mut a = Actor::default();
                    a.init_random(
                        io_descs[i].size,
                        io_descs[i].value_size,
                        io_descs[i].value_num_dendrites_per_cell,
                        io_descs[i].num_dendrites_per_cell,
                        io_descs[i].history_capacity,
                        vec![a_vld; 1 + has_feedback as usize],
                        rng,
                    );
                    self.actors.push(a);
                }
            } else {
                let below = layer_descs[l - 1].hidden_size;

                for _ in 0..ld.temporal_horizon {
                    e_vlds.push(VisibleLayerDesc {
                        size: below,
                        radius: ld.up_radius,
                    });
                }

                history.resize(ld.temporal_horizon);
                for t in 0..ld.temporal_horizon {
                    *history.get_mut(t) = vec![0; below.num_columns()];
                }

                let d_vld = VisibleLayerDesc {
                    size: ld.hidden_size,
                    radius: ld.down_radius,
                };
                let layer_decoders = (0..ld.ticks_per_update)
                    .map(|_| {
                        let mut dec = Decoder::default();
                        dec.init_random(
                            below,
                            ld.num_dendrites_per_cell,
                            vec![d_vld; 1 + has_feedback as usize],
                            rng,
                        );
                        dec
                    })
                    .collect();
                self.decoders.push(layer_decoders);
            }

            if self.recurrent[l] {
                e_vlds.push(VisibleLayerDesc {
                    size: ld.hidden_size,
                    radius: ld.recurrent_radius,
                });
            }

            let mut enc = Encoder::default();
            enc.init_random(ld.hidden_size, e_vlds, rng);
            self.encoders.push(enc);
            self.histories.push(history);
        }

        self.reset_transients();
    }

    fn set_layout(&mut self, io_sizes: Vec<Int3>, io_types: Vec<IoType>, ticks_per_update: Vec<usize>, recurrent: Vec<bool>) {
        let num_layers = ticks_per_update.len();

        self.prediction_ios.clear();
        self.action_ios.clear();
        self.io_indices = vec![None; io_types.len()];

        for (i, t) in io_types.iter().enumerate() {
            match t {
                IoType::Prediction => {
                    self.io_indices[i] = Some(self.prediction_ios.len());
                    self.prediction_ios.push(i);
                }
                IoType::Action => {
                    self.io_indices[i] = Some(self.action_ios.len());
                    self.action_ios.push(i);
                }
                IoType::None => {}
            }
        }

        self.io_sizes = io_sizes;
        self.io_types = io_types;
        self.ticks_per_update = ticks_per_update;
        self.recurrent = recurrent;
        self.ticks = vec![0; num_layers];
        self.updates = vec![false; num_layers];
    }

    fn reset_transients(&mut self) {
        let num_layers = self.encoders.len();

        self.hidden_cis_prev = self.encoders.iter().map(|e| vec![0; e.hidden_size().num_columns()]).collect();
        self.feedback_cis_prev = self.encoders[..num_layers.saturating_sub(1)]
            .iter()
            .map(|e| vec![0; e.hidden_size().num_columns()])
            .collect();

        for history in &mut self.histories {
            history.start = 0;
            for t in 0..history.len() {
                history.get_mut(t).fill(0);
            }
        }

        self.ticks.fill(0);
        self.updates.fill(false);
    }

    /// Push the caller's parameters into the per-visible-layer importances.
    fn apply_importances(&mut self, params: &Params) {
        for (i, ip) in params.ios.iter().enumerate() {
            self.encoders[0].set_importance(i, ip.importance);
        }

        for l in 0..self.encoders.len() {
            if self.recurrent[l] {
                let last = self.encoders[l].num_visible_layers() - 1;
                self.encoders[l].set_importance(last, params.layers[l].recurrent_importance);
            }
        }
    }

    /// Advance one tick. `input_cis` must already be shape-checked and `params` validated.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        input_cis: &[&[i32]],
        learn_enabled: bool,
        reward: f32,
        mimic: f32,
        params: &Params,
        rng: &mut Rng,
    ) {
        let num_layers = self.encoders.len();
        let top = num_layers - 1;

        self.apply_importances(params);

        // forward
        self.updates.fill(false);

        for l in 0..num_layers {
            if l > 0 && self.ticks[l] < self.ticks_per_update[l] {
                continue;
            }

            self.ticks[l] = 0;
            self.updates[l] = true;

            self.hidden_cis_prev[l].copy_from_slice(self.encoders[l].hidden_cis());

            {
                let mut layer_inputs: Vec<&[i32]> = if l == 0 {
                    input_cis.to_vec()
                } else {
                    let history = &self.histories[l];
                    (0..history.len()).map(|t| history.get(t).as_slice()).collect()
                };

                if self.recurrent[l] {
                    layer_inputs.push(&self.hidden_cis_prev[l]);
                }

                self.encoders[l].step(&layer_inputs, learn_enabled, &params.layers[l].encoder);
            }

            if l < top {
                let history = &mut self.histories[l + 1];
                history.push_front();
                history.get_mut(0).copy_from_slice(self.encoders[l].hidden_cis());

                self.ticks[l + 1] += 1;
            }
        }

        // backward
        for l in (0..num_layers).rev() {
            if !self.updates[l] {
                continue;
            }

            let feedback: Option<IntBuffer> = (l < top).then(|| {
                let d = self.ticks[l + 1].min(self.ticks_per_update[l + 1] - 1);
                self.decoders[l + 1][d].hidden_cis().to_vec()
            });

            if learn_enabled {
                self.learn_decoders(l, input_cis, params, rng);
            }

            let mut layer_inputs: Vec<&[i32]> = vec![self.encoders[l].hidden_cis()];
            if let Some(f) = &feedback {
                layer_inputs.push(f);
            }

            for d in 0..self.decoders[l].len() {
                let dec_params = self.decoder_params(l, d, params);
                self.decoders[l][d].activate(&layer_inputs, dec_params);
            }

            if l == 0 {
                for a in 0..self.actors.len() {
                    let i = self.action_ios[a];
                    self.actors[a].step(
                        &layer_inputs,
                        input_cis[i],
                        learn_enabled,
                        reward,
                        mimic,
                        rng,
                        &params.ios[i].actor,
                    );
                }
            }

            if let Some(f) = feedback {
                self.feedback_cis_prev[l] = f;
            }
        }
    }

    fn decoder_params<'a>(&self, l: usize, d: usize, params: &'a Params) -> &'a decoder::Params {
        if l == 0 {
            &params.ios[self.prediction_ios[d]].decoder
        } else {
            &params.layers[l].decoder
        }
    }

    // Decoders learn from the activations of the previous tick, then optionally anticipate
    fn learn_decoders(&mut self, l: usize, input_cis: &[&[i32]], params: &Params, rng: &mut Rng) {
        let top = self.encoders.len() - 1;
        let tpu = self.ticks_per_update[l];

        for d in 0..self.decoders[l].len() {
            let dec_params = self.decoder_params(l, d, params);

            let target: &[i32] = if l == 0 {
                input_cis[self.prediction_ios[d]]
            } else {
                self.histories[l].get(tpu - 1 - d).as_slice()
            };

            let mut prev_inputs: Vec<&[i32]> = vec![self.hidden_cis_prev[l].as_slice()];
            if l < top {
                prev_inputs.push(&self.feedback_cis_prev[l]);
            }

            self.decoders[l][d].learn(&prev_inputs, target, rng, dec_params);

            if params.anticipation && l < top {
                let actual_inputs: [&[i32]; 2] = [self.hidden_cis_prev[l].as_slice(), self.encoders[l].hidden_cis()];

                self.decoders[l][d].activate(&actual_inputs, dec_params);
                self.decoders[l][d].learn(&actual_inputs, target, rng, dec_params);
            }
        }
    }

    pub fn clear_state(&mut self) {
        for l in 0..self.encoders.len() {
            self.encoders[l].clear_state();
            for dec in &mut self.decoders[l] {
                dec.clear_state();
            }
        }
        for a in &mut self.actors {
            a.clear_state();
        }

        self.reset_transients();
    }

    pub fn num_layers(&self) -> usize {
        self.encoders.len()
    }

    pub fn num_io(&self) -> usize {
        self.io_sizes.len()
    }

    pub fn io_size(&self, i: usize) -> Int3 {
        self.io_sizes[i]
    }

    pub fn io_sizes(&self) -> &[Int3] {
        &self.io_sizes
    }

    pub fn io_type(&self, i: usize) -> IoType {
        self.io_types[i]
    }

    /// Whether layer `l` ran on the last step.
    pub fn is_updated(&self, l: usize) -> bool {
        self.updates[l]
    }

    pub fn ticks(&self, l: usize) -> usize {
        self.ticks[l]
    }

    pub fn ticks_per_update(&self, l: usize) -> usize {
        self.ticks_per_update[l]
    }

    pub fn encoder(&self, l: usize) -> &Encoder {
        &self.encoders[l]
    }

    pub fn num_decoders(&self, l: usize) -> usize {
        self.decoders[l].len()
    }

    pub fn decoder(&self, l: usize, d: usize) -> &Decoder {
        &self.decoders[l][d]
    }

    /// Actor bound to action port `i`, if it is one.
    pub fn actor(&self, i: usize) -> Option<&Actor> {
        match self.io_types[i] {
            IoType::Action => self.io_indices[i].map(|a| &self.actors[a]),
            _ => None,
        }
    }

    /// Next-step prediction of port `i`; empty for input-only ports.
    pub fn prediction_cis(&self, i: usize) -> &[i32] {
        match (self.io_types[i], self.io_indices[i]) {
            (IoType::Prediction, Some(d)) => self.decoders[0][d].hidden_cis(),
            (IoType::Action, Some(a)) => self.actors[a].hidden_cis(),
            _ => &[],
        }
    }

    pub fn prediction_acts(&self, i: usize) -> &[f32] {
        match (self.io_types[i], self.io_indices[i]) {
            (IoType::Prediction, Some(d)) => self.decoders[0][d].hidden_acts(),
            (IoType::Action, Some(a)) => self.actors[a].hidden_acts(),
            _ => &[],
        }
    }

    pub fn prediction_values(&self, i: usize) -> Option<&[f32]> {
        self.actor(i).map(Actor::hidden_values)
    }

    pub fn hidden_cis(&self, l: usize) -> &[i32] {
        self.encoders[l].hidden_cis()
    }

    pub fn hidden_size(&self, l: usize) -> Int3 {
        self.encoders[l].hidden_size()
    }

    // Serialization

    pub fn write(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_i32(self.encoders.len() as i32)?;
        writer.write_i32(self.io_sizes.len() as i32)?;

        for (size, t) in self.io_sizes.iter().zip(&self.io_types) {
            writer.write_int3(*size)?;
            writer.write_u8(*t as u8)?;
        }

        for l in 0..self.encoders.len() {
            writer.write_i32(self.ticks_per_update[l] as i32)?;
            writer.write_i32(self.histories[l].len() as i32)?;
            writer.write_u8(self.recurrent[l] as u8)?;
        }

        for l in 0..self.encoders.len() {
            self.encoders[l].write(writer)?;
            for dec in &self.decoders[l] {
                dec.write(writer)?;
            }
        }

        for a in &self.actors {
            a.write(writer)?;
        }

        self.write_transients(writer)
    }

    pub fn read(reader: &mut dyn Reader) -> Result<Self> {
        let num_layers = read_usize(reader, "hierarchy layer count", 1)?;
        if num_layers > MAX_LAYERS {
            return Err(corrupt("hierarchy layer count", format!("{num_layers} layers")).into());
        }
        let num_io = read_usize(reader, "hierarchy io count", 1)?;
        if num_io > MAX_IO {
            return Err(corrupt("hierarchy io count", format!("{num_io} ports")).into());
        }

        let mut io_sizes = Vec::with_capacity(num_io);
        let mut io_types = Vec::with_capacity(num_io);
        for _ in 0..num_io {
            io_sizes.push(read_size(reader, "io size")?);
            io_types.push(IoType::try_from(reader.read_u8()?)?);
        }

        let mut ticks_per_update = Vec::with_capacity(num_layers);
        let mut horizons = Vec::with_capacity(num_layers);
        let mut recurrent = Vec::with_capacity(num_layers);
        for l in 0..num_layers {
            let tpu = read_usize(reader, "ticks per update", 1)?;
            let horizon = read_usize(reader, "temporal horizon", 0)?;
            if l > 0 && (horizon < 1 || tpu > horizon) {
                return Err(corrupt(
                    "layer timing",
                    format!("layer {l}: ticks per update {tpu}, temporal horizon {horizon}"),
                )
                .into());
            }
            ticks_per_update.push(tpu);
            horizons.push(horizon);
            recurrent.push(reader.read_u8()? != 0);
        }

        let mut h = Self::default();
        h.set_layout(io_sizes, io_types, ticks_per_update, recurrent);

        for l in 0..num_layers {
            h.encoders.push(Encoder::read(reader)?);

            let num_decoders = if l == 0 {
                h.prediction_ios.len()
            } else {
                h.ticks_per_update[l]
            };
            let mut layer_decoders = Vec::with_capacity(num_decoders);
            for _ in 0..num_decoders {
                layer_decoders.push(Decoder::read(reader)?);
            }
            h.decoders.push(layer_decoders);
        }

        for _ in 0..h.action_ios.len() {
            h.actors.push(Actor::read(reader)?);
        }

        h.check_structure(&horizons)?;

        for l in 0..num_layers {
            let mut history = CircleBuffer::new();
            if l > 0 {
                let below = h.encoders[l - 1].hidden_size().num_columns();
                history.resize(horizons[l]);
                for t in 0..horizons[l] {
                    *history.get_mut(t) = vec![0; below];
                }
            }
            h.histories.push(history);
        }

        h.reset_transients();
        h.read_transients(reader)?;

        Ok(h)
    }

    // Cross-component shapes, checked before any buffer is indexed
    fn check_structure(&self, horizons: &[usize]) -> Result<()> {
        let num_layers = self.encoders.len();
        let mismatch = |what: &str, detail: String| -> Result<()> { Err(corrupt(what, detail).into()) };

        for l in 0..num_layers {
            let enc = &self.encoders[l];
            let hidden = enc.hidden_size();

            let mut expected: Vec<Int3> = if l == 0 {
                self.io_sizes.clone()
            } else {
                vec![self.encoders[l - 1].hidden_size(); horizons[l]]
            };
            if self.recurrent[l] {
                expected.push(hidden);
            }

            let actual = input_sizes(enc.num_visible_layers(), |vli| enc.visible_layer_desc(vli).size);
            if actual != expected {
                return mismatch("encoder inputs", format!("layer {l}: {actual:?}, expected {expected:?}"));
            }

            let num_inputs = 1 + (l < num_layers - 1) as usize;

            for (d, dec) in self.decoders[l].iter().enumerate() {
                let target = if l == 0 {
                    self.io_sizes[self.prediction_ios[d]]
                } else {
                    self.encoders[l - 1].hidden_size()
                };
                let actual = input_sizes(dec.num_visible_layers(), |vli| dec.visible_layer_desc(vli).size);

                if dec.hidden_size() != target || actual != vec![hidden; num_inputs] {
                    return mismatch("decoder shape", format!("layer {l} decoder {d}"));
                }
            }

            if l == 0 {
                for (a, actor) in self.actors.iter().enumerate() {
                    let actual = input_sizes(actor.num_visible_layers(), |vli| actor.visible_layer_desc(vli).size);

                    if actor.hidden_size() != self.io_sizes[self.action_ios[a]] || actual != vec![hidden; num_inputs] {
                        return mismatch("actor shape", format!("actor {a}"));
                    }
                }
            }
        }

        Ok(())
    }

    fn write_transients(&self, writer: &mut dyn Writer) -> Result<()> {
        for l in 0..self.encoders.len() {
            writer.write_i32(self.ticks[l] as i32)?;
            writer.write_u8(self.updates[l] as u8)?;
            writer.write_i32_slice(&self.hidden_cis_prev[l])?;

            if let Some(f) = self.feedback_cis_prev.get(l) {
                writer.write_i32_slice(f)?;
            }

            let history = &self.histories[l];
            if !history.is_empty() {
                writer.write_i32(history.start as i32)?;
                for t in 0..history.len() {
                    writer.write_i32_slice(history.get(t))?;
                }
            }
        }

        Ok(())
    }

    fn read_transients(&mut self, reader: &mut dyn Reader) -> Result<()> {
        for l in 0..self.encoders.len() {
            let tick = reader.read_i32()?;
            if tick < 0 || (l > 0 && tick as usize > self.ticks_per_update[l]) {
                return Err(corrupt("layer ticks", format!("layer {l}: {tick}")).into());
            }
            self.ticks[l] = tick as usize;
            self.updates[l] = reader.read_u8()? != 0;
            let z = self.encoders[l].hidden_size().z;
            reader.read_i32_slice(&mut self.hidden_cis_prev[l])?;
            check_restored_cis("layer hidden state", &self.hidden_cis_prev[l], z)?;

            if let Some(f) = self.feedback_cis_prev.get_mut(l) {
                reader.read_i32_slice(f)?;
                check_restored_cis("layer feedback", f, z)?;
            }

            let history = &mut self.histories[l];
            if !history.is_empty() {
                let start = reader.read_i32()?;
                if start < 0 || start as usize >= history.len() {
                    return Err(corrupt("layer history", format!("layer {l}: start {start}")).into());
                }
                history.start = start as usize;
                let below_z = self.encoders[l - 1].hidden_size().z;
                for t in 0..history.len() {
                    reader.read_i32_slice(history.get_mut(t))?;
                    check_restored_cis("layer history", history.get(t), below_z)?;
                }
            }
        }

        Ok(())
    }

    pub fn write_state(&self, writer: &mut dyn Writer) -> Result<()> {
        self.write_transients(writer)?;

        for l in 0..self.encoders.len() {
            self.encoders[l].write_state(writer)?;
            for dec in &self.decoders[l] {
                dec.write_state(writer)?;
            }
        }
        for a in &self.actors {
            a.write_state(writer)?;
        }

        Ok(())
    }

    pub fn read_state(&mut self, reader: &mut dyn Reader) -> Result<()> {
        self.read_transients(reader)?;

        for l in 0..self.encoders.len() {
            self.encoders[l].read_state(reader)?;
            for dec in &mut self.decoders[l] {
                dec.read_state(reader)?;
            }
        }
        for a in &mut self.actors {
            a.read_state(reader)?;
        }

        Ok(())
    }

    pub fn write_weights(&self, writer: &mut dyn Writer) -> Result<()> {
        for l in 0..self.encoders.len() {
            self.encoders[l].write_weights(writer)?;
            for dec in &self.decoders[l] {
                dec.write_weights(writer)?;
            }
        }
        for a in &self.actors {
            a.write_weights(writer)?;
        }

        Ok(())
    }

    pub fn read_weights(&mut self, reader: &mut dyn Reader) -> Result<()> {
        for l in 0..self.encoders.len() {
            self.encoders[l].read_weights(reader)?;
            for dec in &mut self.decoders[l] {
                dec.read_weights(reader)?;
            }
        }
        for a in &mut self.actors {
            a.read_weights(reader)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BufferReader, BufferWriter, SizeCounter};
    use crate::desc::{IoDesc, LayerDesc};
    use crate::error::{Error, FormatError};

    fn desc(num_layers: usize) -> HierarchyDesc {
        HierarchyDesc::new(
            vec![
                IoDesc {
                    size: Int3::new(3, 3, 8),
                    up_radius: 1,
                    down_radius: 1,
                    ..Default::default()
                },
                IoDesc {
                    size: Int3::new(1, 2, 4),
                    io_type: IoType::Action,
                    up_radius: 1,
                    down_radius: 1,
                    value_size: 16,
                    history_capacity: 16,
                    ..Default::default()
                },
            ],
            (0..num_layers)
                .map(|_| LayerDesc {
                    hidden_size: Int3::new(3, 3, 8),
                    up_radius: 1,
                    down_radius: 1,
                    recurrent_radius: 1,
                    ..Default::default()
                })
                .collect(),
        )
    }

    fn bytes_of(h: &Hierarchy) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        h.write(&mut counter).unwrap();
        let mut w = BufferWriter::with_capacity(counter.len());
        h.write(&mut w).unwrap();
        w.finish("hierarchy").unwrap()
    }

    #[test]
    fn test_step_shapes() {
        let mut rng = Rng::new(41);
        let mut h = Hierarchy::default();
        h.init_random(&desc(2), &mut rng);
        let params = Params::new(2, 2);

        let a = vec![2i32; 9];
        let b = vec![1i32; 2];
        h.step(&[&a, &b], true, 0.5, 0.0, &params, &mut rng);

        assert_eq!(h.prediction_cis(0).len(), 9);
        assert!(h.prediction_cis(0).iter().all(|&c| (0..8).contains(&c)));
        assert_eq!(h.prediction_cis(1).len(), 2);
        assert!(h.prediction_values(0).is_none());
        assert_eq!(h.prediction_values(1).map(<[f32]>::len), Some(2));
        assert_eq!(h.num_decoders(1), 2);
    }

    #[test]
    fn test_exponential_memory_cadence() {
        let mut rng = Rng::new(42);
        let mut h = Hierarchy::default();
        h.init_random(&desc(3), &mut rng);
        let params = Params::new(3, 2);

        let a = vec![0i32; 9];
        let b = vec![0i32; 2];

        let mut pattern = Vec::new();
        for _ in 0..8 {
            h.step(&[&a, &b], false, 0.0, 0.0, &params, &mut rng);
            pattern.push((h.is_updated(0), h.is_updated(1), h.is_updated(2)));
        }

        assert!(pattern.iter().all(|p| p.0));
        assert_eq!(
            pattern.iter().map(|p| p.1).collect::<Vec<_>>(),
            [false, true, false, true, false, true, false, true]
        );
        assert_eq!(
            pattern.iter().map(|p| p.2).collect::<Vec<_>>(),
            [false, false, false, true, false, false, false, true]
        );
    }

    #[test]
    fn test_roundtrip_continues_identically() {
        let mut rng = Rng::new(43);
        let mut h = Hierarchy::default();
        h.init_random(&desc(2), &mut rng);
        let params = Params::new(2, 2);

        for t in 0..5 {
            let a: Vec<i32> = (0..9).map(|i| (i + t) % 8).collect();
            let b = vec![(t % 4) as i32; 2];
            h.step(&[&a, &b], true, 1.0, 0.0, &params, &mut rng);
        }

        let bytes = bytes_of(&h);
        let mut r = BufferReader::new(&bytes);
        let mut h2 = Hierarchy::read(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        assert_eq!(bytes_of(&h2), bytes);

        let a = vec![3i32; 9];
        let b = vec![2i32; 2];
        let mut rng_a = Rng::new(5);
        let mut rng_b = Rng::new(5);
        h.step(&[&a, &b], true, 1.0, 0.0, &params, &mut rng_a);
        h2.step(&[&a, &b], true, 1.0, 0.0, &params, &mut rng_b);

        assert_eq!(h.prediction_cis(0), h2.prediction_cis(0));
        assert_eq!(h.prediction_cis(1), h2.prediction_cis(1));
        assert_eq!(bytes_of(&h), bytes_of(&h2));
    }

    #[test]
    fn test_read_rejects_bad_timing() {
        let mut rng = Rng::new(44);
        let mut h = Hierarchy::default();
        h.init_random(&desc(2), &mut rng);
        let mut bytes = bytes_of(&h);

        // layer 1 ticks_per_update follows two counts and two io entries
        let offset = 8 + 2 * 13 + 9;
        bytes[offset..offset + 4].copy_from_slice(&7i32.to_le_bytes());

        assert!(Hierarchy::read(&mut BufferReader::new(&bytes)).is_err());
    }

    #[test]
    fn test_clear_state_resets_timing() {
        let mut rng = Rng::new(45);
        let mut h = Hierarchy::default();
        h.init_random(&desc(2), &mut rng);
        let params = Params::new(2, 2);
        let a = vec![1i32; 9];
        let b = vec![1i32; 2];

        h.step(&[&a, &b], false, 0.0, 0.0, &params, &mut rng);
        assert_eq!(h.ticks(1), 1);

        h.clear_state();
        assert_eq!(h.ticks(1), 0);
        assert!(!h.is_updated(0));
        assert!(h.hidden_cis(0).iter().all(|&c| c == 0));
    }

    #[test]
    fn test_read_state_rejects_out_of_range_transients() {
        let mut rng = Rng::new(46);
        let mut h = Hierarchy::default();
        h.init_random(&desc(2), &mut rng);

        let mut counter = SizeCounter::new();
        h.write_state(&mut counter).unwrap();
        let mut w = BufferWriter::with_capacity(counter.len());
        h.write_state(&mut w).unwrap();
        let bytes = w.finish("hierarchy state").unwrap();
        h.read_state(&mut BufferReader::new(&bytes)).unwrap();

        // layer 0: ticks, update flag, previous hidden cis, feedback
        // layer 1: ticks, update flag, previous hidden cis, history start, history
        let cases: [(usize, i32); 3] = [(5, -1), (41 + 4 * 8, 8), (77 + 5 + 36 + 4, 8)];
        for (offset, value) in cases {
            let mut bad = bytes.clone();
            bad[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
            let err = h.clone().read_state(&mut BufferReader::new(&bad)).unwrap_err();
            assert!(matches!(err, Error::Format(FormatError::Corrupt { .. })), "offset {offset}");
        }
    }
}
