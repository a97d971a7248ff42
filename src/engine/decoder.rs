// AOgmaNeo host - Decoder (predictive reconstruction with multi-dendrite perceptrons)
#![allow(clippy::needless_range_loop)]

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{buffer_len, check_restored_cis, read_size, read_usize, read_visible_layer_desc, write_visible_layer_desc};
use crate::codec::{Reader, Writer};
use crate::desc::VisibleLayerDesc;
use crate::error::Result;
use crate::helpers::*;

#[derive(Clone, Debug, Default)]
pub struct VisibleLayer {
    pub weights: SByteBuffer,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Dendrite input scale.
    pub scale: f32,
    pub lr: f32,
}

impl Default for Params {
    fn default() -> Self {
        Self { scale: 8.0, lr: 0.1 }
    }
}

impl Params {
    pub fn write(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_f32(self.scale)?;
        writer.write_f32(self.lr)
    }

    pub fn read(reader: &mut dyn Reader) -> Result<Self> {
        Ok(Self {
            scale: reader.read_f32()?,
            lr: reader.read_f32()?,
        })
    }
}

// Per-column result of the forward pass
struct ForwardResult {
    hidden_ci: i32,
    dendrite_acts: Vec<f32>,
    hidden_acts: Vec<f32>,
}

/// Offset of the first dendrite weight for cell 0 of `hidden_column` at a window position.
#[inline]
fn weight_start(hidden_size: Int3, vld: &VisibleLayerDesc, hidden_column: usize, in_ci: usize, offset: Int2) -> usize {
    let diam = vld.diam() as usize;
    hidden_size.z as usize
        * (offset.y as usize
            + diam * (offset.x as usize + diam * (in_ci + vld.size.z as usize * hidden_column)))
}

#[derive(Clone, Debug, Default)]
pub struct Decoder {
    hidden_size: Int3,
    num_dendrites_per_cell: usize,
    hidden_cis: IntBuffer,
    hidden_acts: FloatBuffer,
    dendrite_acts: FloatBuffer,
    dendrite_deltas: IntBuffer,
    visible_layers: Vec<VisibleLayer>,
    visible_layer_descs: Vec<VisibleLayerDesc>,
}

impl Decoder {
    fn forward_column(
        column_pos: Int2,
        hidden_size: Int3,
        num_dendrites_per_cell: usize,
        visible_layers: &[VisibleLayer],
        visible_layer_descs: &[VisibleLayerDesc],
        input_cis: &[&[i32]],
        params: &Params,
    ) -> ForwardResult {
        let hidden_column_index = address2(column_pos, hidden_size.xy());
        let num_hc = hidden_size.z as usize;

        let mut dendrite_acts = vec![0.0f32; num_hc * num_dendrites_per_cell];
        let mut hidden_acts = vec![0.0f32; num_hc];

        let mut count = 0usize;

        for vli in 0..visible_layers.len() {
            let vl = &visible_layers[vli];
            let vld = &visible_layer_descs[vli];
            let field = crate::receptive_field::Field::of(column_pos, hidden_size, vld);

            count += field.count();

            for (pos, offset) in field.positions() {
                let in_ci = input_cis[vli][address2(pos, vld.size.xy())] as usize;
                let wi_partial = weight_start(hidden_size, vld, hidden_column_index, in_ci, offset);

                for hc in 0..num_hc {
                    let dendrites_start = num_dendrites_per_cell * hc;
                    let wi_start = num_dendrites_per_cell * (hc + wi_partial);

                    for di in 0..num_dendrites_per_cell {
                        dendrite_acts[dendrites_start + di] += vl.weights[di + wi_start] as f32;
                    }
                }
            }
        }

        let dendrite_scale = (1.0f32 / count as f32).sqrt() / 127.0 * params.scale;

        let mut max_index = 0usize;
        let mut max_activation = LIMIT_MIN;

        for hc in 0..num_hc {
            let dendrites_start = num_dendrites_per_cell * hc;
            let activation = dendrite_activation(
                &mut dendrite_acts[dendrites_start..dendrites_start + num_dendrites_per_cell],
                dendrite_scale,
            );

            hidden_acts[hc] = activation;

            if activation > max_activation {
                max_activation = activation;
                max_index = hc;
            }
        }

        softmax(&mut hidden_acts);

        ForwardResult {
            hidden_ci: max_index as i32,
            dendrite_acts,
            hidden_acts,
        }
    }

    fn learn_column(
        &mut self,
        column_pos: Int2,
        input_cis: &[&[i32]],
        hidden_target_cis: &[i32],
        rng: &mut Rng,
        params: &Params,
    ) {
        let hidden_size = self.hidden_size;
        let num_dendrites_per_cell = self.num_dendrites_per_cell;
        let hidden_column_index = address2(column_pos, hidden_size.xy());
        let hidden_cells_start = hidden_column_index * hidden_size.z as usize;

        let target_ci = hidden_target_cis[hidden_column_index] as usize;
        let num_hc = hidden_size.z as usize;
        let half = num_dendrites_per_cell / 2;

        for hc in 0..num_hc {
            let hidden_cell_index = hc + hidden_cells_start;
            let dendrites_start = num_dendrites_per_cell * hidden_cell_index;

            let error = params.lr * 127.0 * ((hc == target_ci) as i32 as f32 - self.hidden_acts[hidden_cell_index]);

            for di in 0..num_dendrites_per_cell {
                self.dendrite_deltas[dendrites_start + di] = rng.round_stochastic(
                    error * dendrite_sign(di, half) * self.dendrite_acts[dendrites_start + di],
                );
            }
        }

        for vli in 0..self.visible_layers.len() {
            let vld = self.visible_layer_descs[vli];
            let field = crate::receptive_field::Field::of(column_pos, hidden_size, &vld);
            let vl = &mut self.visible_layers[vli];

            for (pos, offset) in field.positions() {
                let in_ci = input_cis[vli][address2(pos, vld.size.xy())] as usize;
                let wi_partial = weight_start(hidden_size, &vld, hidden_column_index, in_ci, offset);

                for hc in 0..num_hc {
                    let dendrites_start = num_dendrites_per_cell * (hc + hidden_cells_start);
                    let wi_start = num_dendrites_per_cell * (hc + wi_partial);

                    for di in 0..num_dendrites_per_cell {
                        let delta = self.dendrite_deltas[dendrites_start + di];
                        let w = &mut vl.weights[di + wi_start];
                        *w = (*w as i32 + delta).clamp(-127, 127) as i8;
                    }
                }
            }
        }
    }

    pub fn init_random(
        &mut self,
        hidden_size: Int3,
        num_dendrites_per_cell: usize,
        visible_layer_descs: Vec<VisibleLayerDesc>,
        rng: &mut Rng,
    ) {
        self.visible_layer_descs = visible_layer_descs;
        self.hidden_size = hidden_size;
        self.num_dendrites_per_cell = num_dendrites_per_cell;

        let num_dendrites = hidden_size.num_cells() * num_dendrites_per_cell;

        self.visible_layers = self
            .visible_layer_descs
            .iter()
            .map(|vld| {
                let weights_size = num_dendrites * vld.area() * vld.size.z as usize;

                VisibleLayer {
                    weights: (0..weights_size)
                        .map(|_| {
                            ((rng.next_u32() % (INIT_WEIGHT_NOISEI + 1)) as i32
                                - INIT_WEIGHT_NOISEI as i32 / 2) as i8
                        })
                        .collect(),
                }
            })
            .collect();

        self.hidden_cis = vec![0; hidden_size.num_columns()];
        self.hidden_acts = vec![0.0; hidden_size.num_cells()];
        self.dendrite_acts = vec![0.0; num_dendrites];
        self.dendrite_deltas = vec![0; num_dendrites];
    }

    pub fn activate(&mut self, input_cis: &[&[i32]], params: &Params) {
        let hidden_size = self.hidden_size;
        let num_dendrites_per_cell = self.num_dendrites_per_cell;

        let results: Vec<ForwardResult> = (0..hidden_size.num_columns())
            .into_par_iter()
            .map(|i| {
                Self::forward_column(
                    column_pos(i, hidden_size),
                    hidden_size,
                    num_dendrites_per_cell,
                    &self.visible_layers,
                    &self.visible_layer_descs,
                    input_cis,
                    params,
                )
            })
            .collect();

        let num_hc = hidden_size.z as usize;
        let column_dendrites = num_hc * num_dendrites_per_cell;

        for (i, res) in results.into_iter().enumerate() {
            self.hidden_cis[i] = res.hidden_ci;
            self.hidden_acts[i * num_hc..(i + 1) * num_hc].copy_from_slice(&res.hidden_acts);
            self.dendrite_acts[i * column_dendrites..(i + 1) * column_dendrites]
                .copy_from_slice(&res.dendrite_acts);
        }
    }

    /// Learn toward `hidden_target_cis` using the activations of the last `activate`.
    pub fn learn(&mut self, input_cis: &[&[i32]], hidden_target_cis: &[i32], rng: &mut Rng, params: &Params) {
        let hidden_size = self.hidden_size;
        let base_state = rng.next_u32() as u64;

        for i in 0..hidden_size.num_columns() {
            let mut column_rng = Rng::subseed(base_state, i);
            self.learn_column(column_pos(i, hidden_size), input_cis, hidden_target_cis, &mut column_rng, params);
        }
    }

    pub fn clear_state(&mut self) {
        self.hidden_cis.fill(0);
        self.hidden_acts.fill(0.0);
        self.dendrite_acts.fill(0.0);
    }

    pub fn hidden_cis(&self) -> &[i32] {
        &self.hidden_cis
    }

    pub fn hidden_acts(&self) -> &[f32] {
        &self.hidden_acts
    }

    pub fn hidden_size(&self) -> Int3 {
        self.hidden_size
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
        writer.write_i32(self.num_dendrites_per_cell as i32)?;
        writer.write_i32(self.visible_layers.len() as i32)?;

        for vld in &self.visible_layer_descs {
            write_visible_layer_desc(writer, vld)?;
        }

        self.write_weights(writer)?;
        self.write_state(writer)
    }

    pub fn read(reader: &mut dyn Reader) -> Result<Self> {
        let hidden_size = read_size(reader, "decoder hidden size")?;
        let num_dendrites_per_cell = read_usize(reader, "decoder dendrites per cell", 1)?;
        let num_visible_layers = read_usize(reader, "decoder visible layer count", 1)?;

        let mut visible_layer_descs = Vec::with_capacity(num_visible_layers.min(64));
        for _ in 0..num_visible_layers {
            visible_layer_descs.push(read_visible_layer_desc(reader, "decoder visible layer")?);
        }

        let num_dendrites = buffer_len("decoder dendrites", &[hidden_size.num_cells(), num_dendrites_per_cell])?;

        let visible_layers = visible_layer_descs
            .iter()
            .map(|vld| {
                let len = buffer_len("decoder weights", &[num_dendrites, vld.area(), vld.size.z as usize])?;
                Ok(VisibleLayer { weights: vec![0; len] })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut decoder = Self {
            hidden_size,
            num_dendrites_per_cell,
            hidden_cis: vec![0; hidden_size.num_columns()],
            hidden_acts: vec![0.0; hidden_size.num_cells()],
            dendrite_acts: vec![0.0; num_dendrites],
            dendrite_deltas: vec![0; num_dendrites],
            visible_layers,
            visible_layer_descs,
        };

        decoder.read_weights(reader)?;
        decoder.read_state(reader)?;

        Ok(decoder)
    }

    pub fn write_state(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_i32_slice(&self.hidden_cis)?;
        writer.write_f32_slice(&self.hidden_acts)?;
        writer.write_f32_slice(&self.dendrite_acts)
    }

    pub fn read_state(&mut self, reader: &mut dyn Reader) -> Result<()> {
        reader.read_i32_slice(&mut self.hidden_cis)?;
        check_restored_cis("decoder prediction", &self.hidden_cis, self.hidden_size.z)?;
        reader.read_f32_slice(&mut self.hidden_acts)?;
        reader.read_f32_slice(&mut self.dendrite_acts)
    }

    pub fn write_weights(&self, writer: &mut dyn Writer) -> Result<()> {
        for vl in &self.visible_layers {
            writer.write_i8_slice(&vl.weights)?;
        }
        Ok(())
    }

    pub fn read_weights(&mut self, reader: &mut dyn Reader) -> Result<()> {
        for vl in &mut self.visible_layers {
            reader.read_i8_slice(&mut vl.weights)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BufferReader, BufferWriter, SizeCounter};
    use crate::error::{Error, FormatError};

    fn decoder(rng: &mut Rng) -> Decoder {
        let mut d = Decoder::default();
        d.init_random(
            Int3::new(2, 2, 4),
            4,
            vec![VisibleLayerDesc {
                size: Int3::new(3, 3, 5),
                radius: 1,
            }],
            rng,
        );
        d
    }

    #[test]
    fn test_activate_gives_distribution_per_column() {
        let mut rng = Rng::new(11);
        let mut d = decoder(&mut rng);
        let input = vec![2i32; 9];

        d.activate(&[&input], &Params::default());

        for col in d.hidden_acts().chunks(4) {
            let total: f32 = col.iter().sum();
            assert!((total - 1.0).abs() < 1e-4);
        }
        for (i, col) in d.hidden_acts().chunks(4).enumerate() {
            let argmax = col
                .iter()
                .enumerate()
                .fold(0, |best, (j, &v)| if v > col[best] { j } else { best });
            assert_eq!(d.hidden_cis()[i], argmax as i32);
        }
    }

    #[test]
    fn test_learns_constant_target() {
        let mut rng = Rng::new(12);
        let mut d = decoder(&mut rng);
        let input = vec![1i32; 9];
        let target = vec![3i32; 4];
        let params = Params { scale: 8.0, lr: 0.5 };

        for _ in 0..50 {
            d.activate(&[&input], &params);
            d.learn(&[&input], &target, &mut rng, &params);
        }
        d.activate(&[&input], &params);

        assert_eq!(d.hidden_cis(), &target[..]);
    }

    #[test]
    fn test_read_state_rejects_out_of_range_prediction() {
        let mut rng = Rng::new(13);
        let mut d = decoder(&mut rng);
        let input = vec![0i32; 9];
        d.activate(&[&input], &Params::default());

        let mut counter = SizeCounter::new();
        d.write_state(&mut counter).unwrap();
        let mut w = BufferWriter::with_capacity(counter.len());
        d.write_state(&mut w).unwrap();
        let mut bytes = w.finish("decoder state").unwrap();

        d.read_state(&mut BufferReader::new(&bytes)).unwrap();

        // third prediction column
        bytes[8..12].copy_from_slice(&4i32.to_le_bytes());
        let err = d.read_state(&mut BufferReader::new(&bytes)).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::Corrupt { .. })));
    }
}
