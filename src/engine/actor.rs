// AOgmaNeo host - Actor (actor-critic with replay history)
#![allow(clippy::needless_range_loop)]

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{buffer_len, check_restored_cis, corrupt, read_size, read_usize, read_visible_layer_desc, write_visible_layer_desc};
use crate::codec::{Reader, Writer};
use crate::desc::VisibleLayerDesc;
use crate::error::Result;
use crate::helpers::*;
use crate::receptive_field::Field;
use crate::sampler;

#[derive(Clone, Debug, Default)]
pub struct VisibleLayer {
    pub value_weights: FloatBuffer,
    pub policy_weights: FloatBuffer,
}

#[derive(Clone, Debug, Default)]
pub struct HistorySample {
    pub input_cis: Vec<IntBuffer>,
    pub hidden_target_cis_prev: IntBuffer,
    pub hidden_values: FloatBuffer,
    pub reward: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Value (critic) learning rate.
    pub vlr: f32,
    /// Policy (actor) learning rate.
    pub plr: f32,
    /// Blend between bootstrapped and stored values in the return.
    pub smoothing: f32,
    pub discount: f32,
    /// Decay of the running TD error scale.
    pub td_scale_decay: f32,
    /// Symlog range covered by the value bins.
    pub value_range: f32,
    pub min_steps: usize,
    /// Replay samples per step.
    pub history_iters: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            vlr: 0.1,
            plr: 0.01,
            smoothing: 0.02,
            discount: 0.99,
            td_scale_decay: 0.999,
            value_range: 10.0,
            min_steps: 16,
            history_iters: 8,
        }
    }
}

impl Params {
    pub fn write(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_f32(self.vlr)?;
        writer.write_f32(self.plr)?;
        writer.write_f32(self.smoothing)?;
        writer.write_f32(self.discount)?;
        writer.write_f32(self.td_scale_decay)?;
        writer.write_f32(self.value_range)?;
        writer.write_i32(self.min_steps as i32)?;
        writer.write_i32(self.history_iters as i32)
    }

    pub fn read(reader: &mut dyn Reader) -> Result<Self> {
        Ok(Self {
            vlr: reader.read_f32()?,
            plr: reader.read_f32()?,
            smoothing: reader.read_f32()?,
            discount: reader.read_f32()?,
            td_scale_decay: reader.read_f32()?,
            value_range: reader.read_f32()?,
            min_steps: reader.read_i32()?.max(0) as usize,
            history_iters: reader.read_i32()?.max(0) as usize,
        })
    }
}

// Activations of one column, dendrite slots holding their sigmoid derivative
struct ColumnActs {
    value_dendrites: Vec<f32>,
    policy_dendrites: Vec<f32>,
    value_acts: Vec<f32>,
    policy_acts: Vec<f32>,
    value: f32,
}

#[derive(Clone, Debug, Default)]
pub struct Actor {
    hidden_size: Int3,
    value_size: usize,
    value_num_dendrites_per_cell: usize,
    policy_num_dendrites_per_cell: usize,
    history_size: usize,
    hidden_cis: IntBuffer,
    hidden_policy_acts: FloatBuffer,
    hidden_values: FloatBuffer,
    hidden_td_scales: FloatBuffer,
    history_samples: CircleBuffer<HistorySample>,
    visible_layers: Vec<VisibleLayer>,
    visible_layer_descs: Vec<VisibleLayerDesc>,
}

#[inline]
fn window_partial(vld: &VisibleLayerDesc, hidden_column: usize, in_ci: usize, offset: Int2) -> usize {
    let diam = vld.diam() as usize;
    offset.y as usize + diam * (offset.x as usize + diam * (in_ci + vld.size.z as usize * hidden_column))
}

impl Actor {
    fn activate_column<I: AsRef<[i32]>>(&self, column_pos: Int2, input_cis: &[I], params: &Params) -> ColumnActs {
        let hidden_size = self.hidden_size;
        let hidden_column_index = address2(column_pos, hidden_size.xy());
        let num_hc = hidden_size.z as usize;
        let vnd = self.value_num_dendrites_per_cell;
        let pnd = self.policy_num_dendrites_per_cell;

        let mut value_dendrites = vec![0.0f32; self.value_size * vnd];
        let mut policy_dendrites = vec![0.0f32; num_hc * pnd];

        let mut count = 0usize;

        for vli in 0..self.visible_layers.len() {
            let vl = &self.visible_layers[vli];
            let vld = &self.visible_layer_descs[vli];
            let field = Field::of(column_pos, hidden_size, vld);
            let vl_input_cis = input_cis[vli].as_ref();

            count += field.count();

            for (pos, offset) in field.positions() {
                let in_ci = vl_input_cis[address2(pos, vld.size.xy())] as usize;
                let partial = window_partial(vld, hidden_column_index, in_ci, offset);

                let wi_start = vnd * self.value_size * partial;
                for (d, w) in value_dendrites.iter_mut().zip(&vl.value_weights[wi_start..wi_start + self.value_size * vnd]) {
                    *d += w;
                }

                let wi_start = pnd * num_hc * partial;
                for (d, w) in policy_dendrites.iter_mut().zip(&vl.policy_weights[wi_start..wi_start + num_hc * pnd]) {
                    *d += w;
                }
            }
        }

        let dendrite_scale = (1.0f32 / count as f32).sqrt();

        let mut value_acts: Vec<f32> = value_dendrites
            .chunks_mut(vnd)
            .map(|dendrites| dendrite_activation(dendrites, dendrite_scale))
            .collect();
        softmax(&mut value_acts);

        let smooth_max_value_index: f32 = value_acts
            .iter()
            .enumerate()
            .map(|(vac, &a)| a * vac as f32)
            .sum();

        let value = symexpf(
            (smooth_max_value_index / (self.value_size - 1) as f32 * 2.0 - 1.0) * params.value_range,
        );

        let mut policy_acts: Vec<f32> = policy_dendrites
            .chunks_mut(pnd)
            .map(|dendrites| dendrite_activation(dendrites, dendrite_scale))
            .collect();
        softmax(&mut policy_acts);

        ColumnActs {
            value_dendrites,
            policy_dendrites,
            value_acts,
            policy_acts,
            value,
        }
    }

    fn learn_column(&mut self, column_pos: Int2, t: usize, mimic: f32, params: &Params) {
        let hidden_size = self.hidden_size;
        let hidden_column_index = address2(column_pos, hidden_size.xy());
        let num_hc = hidden_size.z as usize;
        let vnd = self.value_num_dendrites_per_cell;
        let pnd = self.policy_num_dendrites_per_cell;

        let target_ci = self.history_samples.get(t - 1).hidden_target_cis_prev[hidden_column_index] as usize;

        let mut new_value = self.hidden_values[hidden_column_index];

        for t2 in 1..=t {
            let stored_value = self.history_samples.get(t2).hidden_values[hidden_column_index];
            let reward = self.history_samples.get(t2 - 1).reward;
            new_value = params.smoothing * stored_value
                + (1.0 - params.smoothing) * (reward + params.discount * new_value);
        }

        let mut acts = self.activate_column(column_pos, &self.history_samples.get(t).input_cis, params);

        let td_error = new_value - acts.value;
        let scale = &mut self.hidden_td_scales[hidden_column_index];
        *scale = (*scale * params.td_scale_decay).max(td_error.abs());
        let scaled_td_error = td_error / LIMIT_SMALL.max(*scale);

        let policy_error_partial = params.plr * scaled_td_error + mimic;

        let smooth_new_value_index = (symlogf(new_value) / params.value_range * 0.5 + 0.5).clamp(0.0, 1.0)
            * (self.value_size - 1) as f32;

        // turn stored derivatives into deltas
        for vac in 0..self.value_size {
            let target = (1.0 - (vac as f32 - smooth_new_value_index).abs()).max(0.0);
            let error = params.vlr * (target - acts.value_acts[vac]);

            for di in 0..vnd {
                acts.value_dendrites[di + vnd * vac] *= error * dendrite_sign(di, vnd / 2);
            }
        }

        for hc in 0..num_hc {
            let error = policy_error_partial * ((hc == target_ci) as i32 as f32 - acts.policy_acts[hc]);

            for di in 0..pnd {
                acts.policy_dendrites[di + pnd * hc] *= error * dendrite_sign(di, pnd / 2);
            }
        }

        let inputs = &self.history_samples.get(t).input_cis;

        for vli in 0..self.visible_layers.len() {
            let vld = self.visible_layer_descs[vli];
            let field = Field::of(column_pos, hidden_size, &vld);
            let vl = &mut self.visible_layers[vli];

            for (pos, offset) in field.positions() {
                let in_ci = inputs[vli][address2(pos, vld.size.xy())] as usize;
                let partial = window_partial(&vld, hidden_column_index, in_ci, offset);

                let wi_start = vnd * self.value_size * partial;
                for (w, d) in vl.value_weights[wi_start..wi_start + self.value_size * vnd]
                    .iter_mut()
                    .zip(&acts.value_dendrites)
                {
                    *w += d;
                }

                let wi_start = pnd * num_hc * partial;
                for (w, d) in vl.policy_weights[wi_start..wi_start + num_hc * pnd]
                    .iter_mut()
                    .zip(&acts.policy_dendrites)
                {
                    *w += d;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn init_random(
        &mut self,
        hidden_size: Int3,
        value_size: usize,
        value_num_dendrites_per_cell: usize,
        policy_num_dendrites_per_cell: usize,
        history_capacity: usize,
        visible_layer_descs: Vec<VisibleLayerDesc>,
        rng: &mut Rng,
    ) {
        self.visible_layer_descs = visible_layer_descs;
        self.hidden_size = hidden_size;
        self.value_size = value_size;
        self.value_num_dendrites_per_cell = value_num_dendrites_per_cell;
        self.policy_num_dendrites_per_cell = policy_num_dendrites_per_cell;

        let num_hidden_columns = hidden_size.num_columns();
        let value_num_dendrites = num_hidden_columns * value_size * value_num_dendrites_per_cell;
        let policy_num_dendrites = hidden_size.num_cells() * policy_num_dendrites_per_cell;

        self.visible_layers = self
            .visible_layer_descs
            .iter()
            .map(|vld| {
                let area = vld.area() * vld.size.z as usize;

                VisibleLayer {
                    value_weights: (0..value_num_dendrites * area)
                        .map(|_| rng.randf_range(-INIT_WEIGHT_NOISEF, INIT_WEIGHT_NOISEF))
                        .collect(),
                    policy_weights: (0..policy_num_dendrites * area)
                        .map(|_| rng.randf_range(-INIT_WEIGHT_NOISEF, INIT_WEIGHT_NOISEF))
                        .collect(),
                }
            })
            .collect();

        self.hidden_cis = vec![0; num_hidden_columns];
        self.hidden_policy_acts = vec![0.0; hidden_size.num_cells()];
        self.hidden_values = vec![0.0; num_hidden_columns];
        self.hidden_td_scales = vec![0.0; num_hidden_columns];

        self.history_size = 0;
        self.history_samples = CircleBuffer::new();
        self.history_samples.resize(history_capacity);

        for i in 0..history_capacity {
            *self.history_samples.get_mut(i) = self.empty_sample();
        }
    }

    fn empty_sample(&self) -> HistorySample {
        let num_hidden_columns = self.hidden_size.num_columns();

        HistorySample {
            input_cis: self
                .visible_layer_descs
                .iter()
                .map(|vld| vec![0; vld.size.num_columns()])
                .collect(),
            hidden_target_cis_prev: vec![0; num_hidden_columns],
            hidden_values: vec![0.0; num_hidden_columns],
            reward: 0.0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        input_cis: &[&[i32]],
        hidden_target_cis_prev: &[i32],
        learn_enabled: bool,
        reward: f32,
        mimic: f32,
        rng: &mut Rng,
        params: &Params,
    ) {
        let hidden_size = self.hidden_size;
        let num_hc = hidden_size.z as usize;
        let base_state = rng.next_u32() as u64;

        let results: Vec<(i32, f32, Vec<f32>)> = (0..hidden_size.num_columns())
            .into_par_iter()
            .map(|i| {
                let acts = self.activate_column(column_pos(i, hidden_size), input_cis, params);
                let mut column_rng = Rng::subseed(base_state, i);
                let ci = sampler::sample_column(&acts.policy_acts, 1.0, &mut column_rng);
                (ci as i32, acts.value, acts.policy_acts)
            })
            .collect();

        for (i, (ci, value, policy_acts)) in results.into_iter().enumerate() {
            self.hidden_cis[i] = ci;
            self.hidden_values[i] = value;
            self.hidden_policy_acts[i * num_hc..(i + 1) * num_hc].copy_from_slice(&policy_acts);
        }

        self.history_samples.push_front();
        if self.history_size < self.history_samples.len() {
            self.history_size += 1;
        }

        {
            let s = self.history_samples.get_mut(0);
            for (dst, src) in s.input_cis.iter_mut().zip(input_cis) {
                dst.copy_from_slice(src);
            }
            s.hidden_target_cis_prev.copy_from_slice(hidden_target_cis_prev);
            s.hidden_values.copy_from_slice(&self.hidden_values);
            s.reward = reward;
        }

        if learn_enabled && params.min_steps >= 1 && self.history_size > params.min_steps {
            for _ in 0..params.history_iters {
                let t = (rng.next_u32() as usize % (self.history_size - params.min_steps)) + params.min_steps;

                for i in 0..hidden_size.num_columns() {
                    self.learn_column(column_pos(i, hidden_size), t, mimic, params);
                }
            }
        }
    }

    pub fn clear_state(&mut self) {
        self.hidden_cis.fill(0);
        self.hidden_policy_acts.fill(0.0);
        self.hidden_values.fill(0.0);
        self.history_size = 0;
    }

    pub fn hidden_cis(&self) -> &[i32] {
        &self.hidden_cis
    }

    /// Policy distribution per column.
    pub fn hidden_acts(&self) -> &[f32] {
        &self.hidden_policy_acts
    }

    pub fn hidden_values(&self) -> &[f32] {
        &self.hidden_values
    }

    pub fn hidden_size(&self) -> Int3 {
        self.hidden_size
    }

    pub fn history_capacity(&self) -> usize {
        self.history_samples.len()
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    pub fn num_visible_layers(&self) -> usize {
        self.visible_layers.len()
    }

    pub fn visible_layer(&self, vli: usize) -> &VisibleLayer {
        &self.visible_layers[vli]
    }

    pub fn visible_layer_desc(&self, vli: usize) -> &VisibleLayerDesc {
        &self.visible_layer_descs[vli]
    }

    // Serialization

    pub fn write(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_int3(self.hidden_size)?;
        writer.write_i32(self.value_size as i32)?;
        writer.write_i32(self.value_num_dendrites_per_cell as i32)?;
        writer.write_i32(self.policy_num_dendrites_per_cell as i32)?;
        writer.write_i32(self.history_samples.len() as i32)?;
        writer.write_i32(self.visible_layers.len() as i32)?;

        for vld in &self.visible_layer_descs {
            write_visible_layer_desc(writer, vld)?;
        }

        self.write_weights(writer)?;
        self.write_state(writer)
    }

    pub fn read(reader: &mut dyn Reader) -> Result<Self> {
        let hidden_size = read_size(reader, "actor hidden size")?;
        let value_size = read_usize(reader, "actor value size", 2)?;
        let value_num_dendrites_per_cell = read_usize(reader, "actor value dendrites per cell", 1)?;
        let policy_num_dendrites_per_cell = read_usize(reader, "actor policy dendrites per cell", 1)?;
        let history_capacity = read_usize(reader, "actor history capacity", 2)?;
        let num_visible_layers = read_usize(reader, "actor visible layer count", 1)?;

        let mut visible_layer_descs = Vec::with_capacity(num_visible_layers.min(64));
        for _ in 0..num_visible_layers {
            visible_layer_descs.push(read_visible_layer_desc(reader, "actor visible layer")?);
        }

        let num_hidden_columns = hidden_size.num_columns();
        let value_num_dendrites = buffer_len(
            "actor value dendrites",
            &[num_hidden_columns, value_size, value_num_dendrites_per_cell],
        )?;
        let policy_num_dendrites = buffer_len(
            "actor policy dendrites",
            &[hidden_size.num_cells(), policy_num_dendrites_per_cell],
        )?;

        let visible_layers = visible_layer_descs
            .iter()
            .map(|vld| {
                let area = vld.area() * vld.size.z as usize;
                Ok(VisibleLayer {
                    value_weights: vec![0.0; buffer_len("actor value weights", &[value_num_dendrites, area])?],
                    policy_weights: vec![0.0; buffer_len("actor policy weights", &[policy_num_dendrites, area])?],
                })
            })
            .collect::<Result<Vec<_>>>()?;

        buffer_len(
            "actor history",
            &[
                history_capacity,
                num_hidden_columns + visible_layer_descs.iter().map(|d| d.size.num_columns()).sum::<usize>(),
            ],
        )?;

        let mut actor = Self {
            hidden_size,
            value_size,
            value_num_dendrites_per_cell,
            policy_num_dendrites_per_cell,
            history_size: 0,
            hidden_cis: vec![0; num_hidden_columns],
            hidden_policy_acts: vec![0.0; hidden_size.num_cells()],
            hidden_values: vec![0.0; num_hidden_columns],
            hidden_td_scales: vec![0.0; num_hidden_columns],
            history_samples: CircleBuffer::new(),
            visible_layers,
            visible_layer_descs,
        };

        actor.history_samples.resize(history_capacity);
        for i in 0..history_capacity {
            *actor.history_samples.get_mut(i) = actor.empty_sample();
        }

        actor.read_weights(reader)?;
        actor.read_state(reader)?;

        Ok(actor)
    }

    pub fn write_state(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_i32_slice(&self.hidden_cis)?;
        writer.write_f32_slice(&self.hidden_policy_acts)?;
        writer.write_f32_slice(&self.hidden_values)?;
        writer.write_i32(self.history_size as i32)?;
        writer.write_i32(self.history_samples.start as i32)?;

        for t in 0..self.history_samples.len() {
            let s = self.history_samples.get(t);
            for input_cis in &s.input_cis {
                writer.write_i32_slice(input_cis)?;
            }
            writer.write_i32_slice(&s.hidden_target_cis_prev)?;
            writer.write_f32_slice(&s.hidden_values)?;
            writer.write_f32(s.reward)?;
        }

        Ok(())
    }

    pub fn read_state(&mut self, reader: &mut dyn Reader) -> Result<()> {
        reader.read_i32_slice(&mut self.hidden_cis)?;
        check_restored_cis("actor hidden state", &self.hidden_cis, self.hidden_size.z)?;
        reader.read_f32_slice(&mut self.hidden_policy_acts)?;
        reader.read_f32_slice(&mut self.hidden_values)?;

        let capacity = self.history_samples.len();
        let history_size = reader.read_i32()?;
        let start = reader.read_i32()?;

        if history_size < 0 || history_size as usize > capacity {
            return Err(corrupt("actor history", format!("size {history_size} exceeds capacity {capacity}")).into());
        }
        if start < 0 || start as usize >= capacity {
            return Err(corrupt("actor history", format!("start {start} outside capacity {capacity}")).into());
        }

        self.history_size = history_size as usize;
        self.history_samples.start = start as usize;

        for t in 0..capacity {
            let s = self.history_samples.get_mut(t);
            for (input_cis, vld) in s.input_cis.iter_mut().zip(&self.visible_layer_descs) {
                reader.read_i32_slice(input_cis)?;
                check_restored_cis("actor history inputs", input_cis, vld.size.z)?;
            }
            reader.read_i32_slice(&mut s.hidden_target_cis_prev)?;
            check_restored_cis("actor history targets", &s.hidden_target_cis_prev, self.hidden_size.z)?;
            reader.read_f32_slice(&mut s.hidden_values)?;
            s.reward = reader.read_f32()?;
        }

        Ok(())
    }

    /// Value and policy weights plus the running TD error scales.
    pub fn write_weights(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_f32_slice(&self.hidden_td_scales)?;
        for vl in &self.visible_layers {
            writer.write_f32_slice(&vl.value_weights)?;
            writer.write_f32_slice(&vl.policy_weights)?;
        }
        Ok(())
    }

    pub fn read_weights(&mut self, reader: &mut dyn Reader) -> Result<()> {
        reader.read_f32_slice(&mut self.hidden_td_scales)?;
        for vl in &mut self.visible_layers {
            reader.read_f32_slice(&mut vl.value_weights)?;
            reader.read_f32_slice(&mut vl.policy_weights)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BufferReader, BufferWriter, SizeCounter};
    use crate::error::{Error, FormatError};

    fn actor(rng: &mut Rng) -> Actor {
        let mut a = Actor::default();
        a.init_random(
            Int3::new(2, 2, 3),
            16,
            2,
            4,
            8,
            vec![VisibleLayerDesc {
                size: Int3::new(3, 3, 4),
                radius: 1,
            }],
            rng,
        );
        a
    }

    #[test]
    fn test_step_samples_valid_actions() {
        let mut rng = Rng::new(21);
        let mut a = actor(&mut rng);
        let input = vec![1i32; 9];
        let prev = vec![0i32; 4];

        for _ in 0..4 {
            a.step(&[&input], &prev, true, 1.0, 0.0, &mut rng, &Params::default());
        }

        assert!(a.hidden_cis().iter().all(|&c| (0..3).contains(&c)));
        assert_eq!(a.history_size(), 4);
        for col in a.hidden_acts().chunks(3) {
            assert!((col.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_learning_starts_after_min_steps() {
        let mut rng = Rng::new(22);
        let mut a = actor(&mut rng);
        let input = vec![2i32; 9];
        let prev = vec![1i32; 4];
        let params = Params {
            min_steps: 3,
            history_iters: 2,
            ..Default::default()
        };
        let before = a.visible_layer(0).value_weights.clone();

        for _ in 0..3 {
            a.step(&[&input], &prev, true, 1.0, 0.0, &mut rng, &params);
        }
        assert_eq!(a.visible_layer(0).value_weights, before);

        a.step(&[&input], &prev, true, 1.0, 0.0, &mut rng, &params);
        assert_ne!(a.visible_layer(0).value_weights, before);
    }

    #[test]
    fn test_write_read_roundtrip_continues_identically() {
        let mut rng = Rng::new(23);
        let mut a = actor(&mut rng);
        let input = vec![3i32; 9];
        let prev = vec![2i32; 4];
        let params = Params {
            min_steps: 2,
            ..Default::default()
        };

        for _ in 0..5 {
            a.step(&[&input], &prev, true, 0.5, 0.0, &mut rng, &params);
        }

        let mut counter = SizeCounter::new();
        a.write(&mut counter).unwrap();
        let mut w = BufferWriter::with_capacity(counter.len());
        a.write(&mut w).unwrap();
        let bytes = w.finish("actor").unwrap();
        let mut b = Actor::read(&mut BufferReader::new(&bytes)).unwrap();

        let mut rng_a = Rng::new(99);
        let mut rng_b = Rng::new(99);
        a.step(&[&input], &prev, true, 0.5, 0.0, &mut rng_a, &params);
        b.step(&[&input], &prev, true, 0.5, 0.0, &mut rng_b, &params);

        assert_eq!(a.hidden_cis(), b.hidden_cis());
        assert_eq!(a.hidden_values(), b.hidden_values());
        assert_eq!(a.visible_layer(0).value_weights, b.visible_layer(0).value_weights);
    }

    #[test]
    fn test_read_state_rejects_out_of_range_history() {
        let mut rng = Rng::new(24);
        let mut a = actor(&mut rng);
        let input = vec![1i32; 9];
        let prev = vec![2i32; 4];
        for _ in 0..3 {
            a.step(&[&input], &prev, true, 1.0, 0.0, &mut rng, &Params::default());
        }

        let mut counter = SizeCounter::new();
        a.write_state(&mut counter).unwrap();
        let mut w = BufferWriter::with_capacity(counter.len());
        a.write_state(&mut w).unwrap();
        let bytes = w.finish("actor state").unwrap();

        let mut restored = a.clone();
        restored.read_state(&mut BufferReader::new(&bytes)).unwrap();
        assert_eq!(restored.hidden_cis(), a.hidden_cis());

        // hidden_cis, policy acts and values (4 columns of 3 cells), then size and start
        let first_sample = 4 * 4 + 12 * 4 + 4 * 4 + 8;
        let cases: [(usize, i32); 3] = [(0, 3), (first_sample, 4), (first_sample + 9 * 4, -1)];
        for (offset, value) in cases {
            let mut bad = bytes.clone();
            bad[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
            let err = restored.read_state(&mut BufferReader::new(&bad)).unwrap_err();
            assert!(matches!(err, Error::Format(FormatError::Corrupt { .. })), "offset {offset}");
        }
    }
}
