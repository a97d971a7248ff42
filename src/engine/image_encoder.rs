// AOgmaNeo host - ImageEncoder (SOM over byte images, with reconstruction)
#![allow(clippy::needless_range_loop)]

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{buffer_len, check_restored_cis, read_size, read_usize, read_visible_layer_desc, write_visible_layer_desc};
use crate::codec::{Reader, Writer};
use crate::desc::VisibleLayerDesc;
use crate::error::Result;
use crate::helpers::*;
use crate::receptive_field::{Field, FieldSource, ReverseField};

#[derive(Clone, Debug, Default)]
pub struct VisibleLayer {
    /// SOM weights, byte `b` standing for `b / 255 * 2 - 1`.
    pub weights: ByteBuffer,
    pub recon_weights: ByteBuffer,
    pub reconstruction: ByteBuffer,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Learning rate falloff per cell of distance from the winner.
    pub falloff: f32,
    pub lr: f32,
    /// Stretch applied to reconstructed values around 0.5.
    pub scale: f32,
    /// Reconstruction learning rate.
    pub rr: f32,
    /// Winner neighbourhood radius, in cells of the same column.
    pub n_radius: i32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            falloff: 0.9,
            lr: 0.1,
            scale: 2.0,
            rr: 0.02,
            n_radius: 1,
        }
    }
}

impl Params {
    pub fn write(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_f32(self.falloff)?;
        writer.write_f32(self.lr)?;
        writer.write_f32(self.scale)?;
        writer.write_f32(self.rr)?;
        writer.write_i32(self.n_radius)
    }

    pub fn read(reader: &mut dyn Reader) -> Result<Self> {
        Ok(Self {
            falloff: reader.read_f32()?,
            lr: reader.read_f32()?,
            scale: reader.read_f32()?,
            rr: reader.read_f32()?,
            n_radius: reader.read_i32()?,
        })
    }
}

const BYTE_INV: f32 = 1.0 / 255.0;

#[inline]
fn weight_index(hidden_size: Int3, vld: &VisibleLayerDesc, hidden_column: usize, offset: Int2, vc: usize, hc: usize) -> usize {
    let diam = vld.diam() as usize;
    hc + hidden_size.z as usize
        * (vc + vld.size.z as usize * (offset.y as usize + diam * (offset.x as usize + diam * hidden_column)))
}

#[inline]
fn recon_index(vld: &VisibleLayerDesc, hidden_cell: usize, offset: Int2, vc: usize) -> usize {
    let diam = vld.diam() as usize;
    vc + vld.size.z as usize * (offset.y as usize + diam * (offset.x as usize + diam * hidden_cell))
}

#[derive(Clone, Debug, Default)]
pub struct ImageEncoder {
    hidden_size: Int3,
    hidden_cis: IntBuffer,
    hidden_resources: FloatBuffer,
    visible_layers: Vec<VisibleLayer>,
    visible_layer_descs: Vec<VisibleLayerDesc>,
}

impl ImageEncoder {
    // Mean input value over every window of the column
    fn column_center(
        column_pos: Int2,
        hidden_size: Int3,
        visible_layer_descs: &[VisibleLayerDesc],
        inputs: &[&[u8]],
    ) -> f32 {
        let mut center = 0.0f32;
        let mut count = 0usize;

        for (vli, vld) in visible_layer_descs.iter().enumerate() {
            let field = Field::of(column_pos, hidden_size, vld);
            let vz = vld.size.z as usize;

            count += field.count() * vz;

            for (pos, _) in field.positions() {
                let start = vz * address2(pos, vld.size.xy());
                center += inputs[vli][start..start + vz].iter().map(|&b| b as f32).sum::<f32>() * BYTE_INV;
            }
        }

        center / count.max(1) as f32
    }

    fn forward_column(
        column_pos: Int2,
        hidden_size: Int3,
        visible_layers: &[VisibleLayer],
        visible_layer_descs: &[VisibleLayerDesc],
        inputs: &[&[u8]],
    ) -> i32 {
        let hidden_column_index = address2(column_pos, hidden_size.xy());
        let num_hc = hidden_size.z as usize;

        let center = Self::column_center(column_pos, hidden_size, visible_layer_descs, inputs);

        let mut acts = vec![0.0f32; num_hc];
        let mut totals = vec![0.0f32; num_hc];

        for (vli, vld) in visible_layer_descs.iter().enumerate() {
            let field = Field::of(column_pos, hidden_size, vld);
            let vl = &visible_layers[vli];
            let vz = vld.size.z as usize;

            for (pos, offset) in field.positions() {
                let visible_cells_start = vz * address2(pos, vld.size.xy());

                for vc in 0..vz {
                    let wi_start = weight_index(hidden_size, vld, hidden_column_index, offset, vc, 0);
                    let input_centered = (inputs[vli][vc + visible_cells_start] as f32 * BYTE_INV - center) * 2.0;

                    for hc in 0..num_hc {
                        let w = vl.weights[hc + wi_start] as f32 * BYTE_INV * 2.0 - 1.0;
                        acts[hc] += input_centered * w;
                        totals[hc] += w * w;
                    }
                }
            }
        }

        let mut max_index = 0usize;
        let mut max_activation = LIMIT_MIN;

        for hc in 0..num_hc {
            let act = acts[hc] / LIMIT_SMALL.max(totals[hc].sqrt());

            if act > max_activation {
                max_activation = act;
                max_index = hc;
            }
        }

        max_index as i32
    }

    fn learn_column(&mut self, column_pos: Int2, inputs: &[&[u8]], params: &Params) {
        let hidden_size = self.hidden_size;
        let hidden_column_index = address2(column_pos, hidden_size.xy());
        let hidden_cells_start = hidden_column_index * hidden_size.z as usize;
        let max_index = self.hidden_cis[hidden_column_index];

        let center = Self::column_center(column_pos, hidden_size, &self.visible_layer_descs, inputs);

        for dhc in -params.n_radius..=params.n_radius {
            let hc = max_index + dhc;
            if hc < 0 || hc >= hidden_size.z {
                continue;
            }
            let hc = hc as usize;
            let hidden_cell_index = hc + hidden_cells_start;

            let rate = self.hidden_resources[hidden_cell_index] * params.falloff.powi(dhc.abs());

            for vli in 0..self.visible_layers.len() {
                let vld = self.visible_layer_descs[vli];
                let field = Field::of(column_pos, hidden_size, &vld);
                let vl = &mut self.visible_layers[vli];
                let vz = vld.size.z as usize;

                for (pos, offset) in field.positions() {
                    let visible_cells_start = vz * address2(pos, vld.size.xy());

                    for vc in 0..vz {
                        let wi = weight_index(hidden_size, &vld, hidden_column_index, offset, vc, hc);
                        let input_centered = inputs[vli][vc + visible_cells_start] as f32 * BYTE_INV - center;
                        let w = vl.weights[wi] as f32 * BYTE_INV * 2.0 - 1.0;

                        let delta = roundf2i(rate * 255.0 * (input_centered - w));
                        vl.weights[wi] = (vl.weights[wi] as i32 + delta).clamp(0, 255) as u8;
                    }
                }
            }

            self.hidden_resources[hidden_cell_index] -= params.lr * rate;
        }
    }

    // Average reconstruction weight of every hidden winner whose window covers `visible_pos`
    fn reconstruct_cell(&self, visible_pos: Int2, cis: &[i32], vli: usize, vc: usize) -> f32 {
        let hidden_size = self.hidden_size;
        let vld = &self.visible_layer_descs[vli];
        let vl = &self.visible_layers[vli];
        let reverse = ReverseField::new(visible_pos, hidden_size, vld.size, vld.radius);

        let mut sum = 0.0f32;
        let mut count = 0usize;

        for hidden_pos in reverse.positions() {
            let field = Field::of(hidden_pos, hidden_size, vld);
            if !field.covers(visible_pos) {
                continue;
            }

            let hidden_column_index = address2(hidden_pos, hidden_size.xy());
            let hidden_cell_index = cis[hidden_column_index] as usize + hidden_column_index * hidden_size.z as usize;

            sum += vl.recon_weights[recon_index(vld, hidden_cell_index, field.offset(visible_pos), vc)] as f32;
            count += 1;
        }

        sum / (count.max(1) as f32 * 255.0)
    }

    fn learn_reconstruction_column(&mut self, visible_pos: Int2, inputs: &[u8], vli: usize, rng: &mut Rng, params: &Params) {
        let hidden_size = self.hidden_size;
        let vld = self.visible_layer_descs[vli];
        let vz = vld.size.z as usize;
        let visible_cells_start = vz * address2(visible_pos, vld.size.xy());
        let reverse = ReverseField::new(visible_pos, hidden_size, vld.size, vld.radius);

        for vc in 0..vz {
            let sum = self.reconstruct_cell(visible_pos, &self.hidden_cis, vli, vc);

            let target = inputs[vc + visible_cells_start] as f32 * BYTE_INV;
            let reconstructed = ((sum - 0.5) * 2.0 * params.scale + 0.5).clamp(0.0, 1.0);
            let delta = rng.round_stochastic(params.rr * (target - reconstructed) * 255.0);

            if delta == 0 {
                continue;
            }

            for hidden_pos in reverse.positions() {
                let field = Field::of(hidden_pos, hidden_size, &vld);
                if !field.covers(visible_pos) {
                    continue;
                }

                let hidden_column_index = address2(hidden_pos, hidden_size.xy());
                let hidden_cell_index =
                    self.hidden_cis[hidden_column_index] as usize + hidden_column_index * hidden_size.z as usize;
                let wi = recon_index(&vld, hidden_cell_index, field.offset(visible_pos), vc);

                let recon_weights = &mut self.visible_layers[vli].recon_weights;
                recon_weights[wi] = (recon_weights[wi] as i32 + delta).clamp(0, 255) as u8;
            }
        }
    }

    pub fn init_random(&mut self, hidden_size: Int3, visible_layer_descs: Vec<VisibleLayerDesc>, rng: &mut Rng) {
        self.visible_layer_descs = visible_layer_descs;
        self.hidden_size = hidden_size;

        let num_hidden_cells = hidden_size.num_cells();

        self.visible_layers = self
            .visible_layer_descs
            .iter()
            .map(|vld| {
                let weights_size = num_hidden_cells * vld.area() * vld.size.z as usize;

                VisibleLayer {
                    weights: (0..weights_size).map(|_| (rng.next_u32() % 256) as u8).collect(),
                    recon_weights: vec![128; weights_size],
                    reconstruction: vec![0; vld.size.num_cells()],
                }
            })
            .collect();

        self.hidden_cis = vec![0; hidden_size.num_columns()];
        self.hidden_resources = vec![0.5; num_hidden_cells];
    }

    pub fn step(&mut self, inputs: &[&[u8]], learn_enabled: bool, learn_recon: bool, rng: &mut Rng, params: &Params) {
        let hidden_size = self.hidden_size;

        self.hidden_cis = (0..hidden_size.num_columns())
            .into_par_iter()
            .map(|i| {
                Self::forward_column(
                    column_pos(i, hidden_size),
                    hidden_size,
                    &self.visible_layers,
                    &self.visible_layer_descs,
                    inputs,
                )
            })
            .collect();

        if !learn_enabled {
            return;
        }

        for i in 0..hidden_size.num_columns() {
            self.learn_column(column_pos(i, hidden_size), inputs, params);
        }

        if learn_recon {
            let base_state = rng.next_u32() as u64;

            for vli in 0..self.visible_layers.len() {
                let visible_size = self.visible_layer_descs[vli].size;

                for i in 0..visible_size.num_columns() {
                    let mut column_rng = Rng::subseed(base_state, i);
                    self.learn_reconstruction_column(column_pos(i, visible_size), inputs[vli], vli, &mut column_rng, params);
                }
            }
        }
    }

    /// Decode `cis` into every visible layer's reconstruction buffer.
    pub fn reconstruct(&mut self, cis: &[i32], params: &Params) {
        for vli in 0..self.visible_layers.len() {
            let visible_size = self.visible_layer_descs[vli].size;
            let vz = visible_size.z as usize;
            let this = &*self;

            let reconstruction: ByteBuffer = (0..visible_size.num_columns())
                .into_par_iter()
                .flat_map_iter(|i| {
                    let visible_pos = column_pos(i, visible_size);
                    (0..vz).map(move |vc| {
                        let sum = this.reconstruct_cell(visible_pos, cis, vli, vc);
                        roundf2b(((sum - 0.5) * 2.0 * params.scale + 0.5).clamp(0.0, 1.0) * 255.0)
                    })
                })
                .collect();

            self.visible_layers[vli].reconstruction = reconstruction;
        }
    }

    pub fn reconstruction(&self, vli: usize) -> &[u8] {
        &self.visible_layers[vli].reconstruction
    }

    pub fn hidden_cis(&self) -> &[i32] {
        &self.hidden_cis
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
        writer.write_i32(self.visible_layers.len() as i32)?;

        for vld in &self.visible_layer_descs {
            write_visible_layer_desc(writer, vld)?;
        }

        self.write_weights(writer)?;
        self.write_state(writer)
    }

    pub fn read(reader: &mut dyn Reader) -> Result<Self> {
        let hidden_size = read_size(reader, "image encoder hidden size")?;
        let num_visible_layers = read_usize(reader, "image encoder visible layer count", 1)?;

        let mut visible_layer_descs = Vec::with_capacity(num_visible_layers.min(64));
        for _ in 0..num_visible_layers {
            visible_layer_descs.push(read_visible_layer_desc(reader, "image encoder visible layer")?);
        }

        let num_hidden_cells = hidden_size.num_cells();

        let visible_layers = visible_layer_descs
            .iter()
            .map(|vld| {
                let len = buffer_len(
                    "image encoder weights",
                    &[num_hidden_cells, vld.area(), vld.size.z as usize],
                )?;
                Ok(VisibleLayer {
                    weights: vec![0; len],
                    recon_weights: vec![0; len],
                    reconstruction: vec![0; vld.size.num_cells()],
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut encoder = Self {
            hidden_size,
            hidden_cis: vec![0; hidden_size.num_columns()],
            hidden_resources: vec![0.0; num_hidden_cells],
            visible_layers,
            visible_layer_descs,
        };

        encoder.read_weights(reader)?;
        encoder.read_state(reader)?;

        Ok(encoder)
    }

    pub fn write_state(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_i32_slice(&self.hidden_cis)?;
        for vl in &self.visible_layers {
            writer.write_u8_slice(&vl.reconstruction)?;
        }
        Ok(())
    }

    pub fn read_state(&mut self, reader: &mut dyn Reader) -> Result<()> {
        reader.read_i32_slice(&mut self.hidden_cis)?;
        check_restored_cis("image encoder hidden state", &self.hidden_cis, self.hidden_size.z)?;
        for vl in &mut self.visible_layers {
            reader.read_u8_slice(&mut vl.reconstruction)?;
        }
        Ok(())
    }

    /// SOM and reconstruction weights plus the per-cell learning resources.
    pub fn write_weights(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_f32_slice(&self.hidden_resources)?;
        for vl in &self.visible_layers {
            writer.write_u8_slice(&vl.weights)?;
            writer.write_u8_slice(&vl.recon_weights)?;
        }
        Ok(())
    }

    pub fn read_weights(&mut self, reader: &mut dyn Reader) -> Result<()> {
        reader.read_f32_slice(&mut self.hidden_resources)?;
        for vl in &mut self.visible_layers {
            reader.read_u8_slice(&mut vl.weights)?;
            reader.read_u8_slice(&mut vl.recon_weights)?;
        }
        Ok(())
    }
}

impl FieldSource for ImageEncoder {
    fn hidden_size(&self) -> Int3 {
        self.hidden_size
    }

    fn num_visible_layers(&self) -> usize {
        self.visible_layers.len()
    }

    fn visible_layer_desc(&self, vli: usize) -> &VisibleLayerDesc {
        &self.visible_layer_descs[vli]
    }

    fn field_weight(&self, vli: usize, hidden_column: usize, hc: usize, offset: Int2, vc: usize) -> u8 {
        let vld = &self.visible_layer_descs[vli];
        self.visible_layers[vli].weights[weight_index(self.hidden_size, vld, hidden_column, offset, vc, hc)]
    }
}
