// AOgmaNeo host - Encoder (sparse coder with ART)
#![allow(clippy::needless_range_loop)]

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{buffer_len, check_restored_cis, read_usize, read_visible_layer_desc, write_visible_layer_desc};
use crate::codec::{Reader, Writer};
use crate::desc::VisibleLayerDesc;
use crate::error::Result;
use crate::helpers::*;
use crate::receptive_field::{Field, FieldSource};

#[derive(Clone, Debug)]
pub struct VisibleLayer {
    pub weights: ByteBuffer,
    pub hidden_totals: IntBuffer,
    /// Pushed in from the owner's params before every step; never serialized.
    pub importance: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Choice parameter, higher favors committing new cells.
    pub choice: f32,
    /// Minimum match for a committed cell to win.
    pub vigilance: f32,
    pub lr: f32,
    /// Fraction of neighbours allowed to beat a column before it stops learning.
    pub active_ratio: f32,
    /// Lateral inhibition radius in columns.
    pub l_radius: i32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            choice: 0.01,
            vigilance: 0.9,
            lr: 0.5,
            active_ratio: 0.1,
            l_radius: 2,
        }
    }
}

impl Params {
    pub fn write(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_f32(self.choice)?;
        writer.write_f32(self.vigilance)?;
        writer.write_f32(self.lr)?;
        writer.write_f32(self.active_ratio)?;
        writer.write_i32(self.l_radius)
    }

    pub fn read(reader: &mut dyn Reader) -> Result<Self> {
        Ok(Self {
            choice: reader.read_f32()?,
            vigilance: reader.read_f32()?,
            lr: reader.read_f32()?,
            active_ratio: reader.read_f32()?,
            l_radius: reader.read_i32()?,
        })
    }
}

// Result of one column's forward pass
struct ForwardResult {
    hidden_ci: i32,
    learn_flag: u8,
    comparison: f32,
}

#[inline]
fn weight_index(hidden_size: Int3, vld: &VisibleLayerDesc, hidden_column: usize, in_ci: usize, offset: Int2, hc: usize) -> usize {
    let diam = vld.diam() as usize;
    hc + hidden_size.z as usize
        * (offset.y as usize
            + diam * (offset.x as usize + diam * (in_ci + vld.size.z as usize * hidden_column)))
}

#[derive(Clone, Debug, Default)]
pub struct Encoder {
    hidden_size: Int3,
    hidden_cis: IntBuffer,
    hidden_learn_flags: ByteBuffer,
    hidden_committed_flags: ByteBuffer,
    hidden_comparisons: FloatBuffer,
    visible_layers: Vec<VisibleLayer>,
    visible_layer_descs: Vec<VisibleLayerDesc>,
}

impl Encoder {
    #[allow(clippy::too_many_arguments)]
    fn forward_column(
        column_pos: Int2,
        hidden_size: Int3,
        visible_layers: &[VisibleLayer],
        visible_layer_descs: &[VisibleLayerDesc],
        input_cis: &[&[i32]],
        hidden_committed_flags: &[u8],
        params: &Params,
    ) -> ForwardResult {
        let hidden_column_index = address2(column_pos, hidden_size.xy());
        let hidden_cells_start = hidden_column_index * hidden_size.z as usize;

        let num_hc = hidden_size.z as usize;
        let num_vl = visible_layers.len();

        let mut count_except = 0.0f32;
        let mut count_all = 0.0f32;

        // sums[vli][hc]
        let mut local_sums = vec![0i32; num_vl * num_hc];

        for vli in 0..num_vl {
            let vl = &visible_layers[vli];
            let vld = &visible_layer_descs[vli];
            let field = Field::of(column_pos, hidden_size, vld);

            let sub_count = field.count() as f32;
            count_except += vl.importance * sub_count * (vld.size.z - 1) as f32;
            count_all += vl.importance * sub_count * vld.size.z as f32;

            for (pos, offset) in field.positions() {
                let in_ci = input_cis[vli][address2(pos, vld.size.xy())] as usize;
                let wi_start = weight_index(hidden_size, vld, hidden_column_index, in_ci, offset, 0);

                for hc in 0..num_hc {
                    local_sums[vli * num_hc + hc] += vl.weights[hc + wi_start] as i32;
                }
            }
        }

        let mut max_index: i32 = -1;
        let mut max_activation = 0.0f32;
        let mut max_complete_index = 0usize;
        let mut max_complete_activation = 0.0f32;

        let byte_inv = 1.0f32 / 255.0;

        for hc in 0..num_hc {
            let hidden_cell_index = hc + hidden_cells_start;

            let mut sum = 0.0f32;
            let mut total = 0.0f32;

            for vli in 0..num_vl {
                let vl = &visible_layers[vli];
                let influence = vl.importance * byte_inv;
                sum += local_sums[vli * num_hc + hc] as f32 * influence;
                total += vl.hidden_totals[hidden_cell_index] as f32 * influence;
            }

            let complemented = sum - total + count_except;
            let match_val = if count_except > 0.0 {
                complemented / count_except
            } else {
                0.0
            };
            let activation = complemented / (params.choice + count_all - total);

            let committed = hidden_committed_flags[hidden_cell_index] != 0;

            if (!committed || match_val >= params.vigilance) && activation > max_activation {
                max_activation = activation;
                max_index = hc as i32;
            }

            if activation > max_complete_activation {
                max_complete_activation = activation;
                max_complete_index = hc;
            }
        }

        ForwardResult {
            hidden_ci: if max_index == -1 {
                max_complete_index as i32
            } else {
                max_index
            },
            learn_flag: (max_index != -1) as u8,
            comparison: if max_index == -1 {
                0.0
            } else {
                max_complete_activation
            },
        }
    }

    fn learn_column(&mut self, column_pos: Int2, input_cis: &[&[i32]], params: &Params) {
        let hidden_size = self.hidden_size;
        let hidden_column_index = address2(column_pos, hidden_size.xy());

        if self.hidden_learn_flags[hidden_column_index] == 0 {
            return;
        }

        let hidden_ci = self.hidden_cis[hidden_column_index] as usize;
        let hidden_max = self.hidden_comparisons[hidden_column_index];

        let mut num_higher = 0usize;
        let mut count = 1usize;

        for dcx in -params.l_radius..=params.l_radius {
            for dcy in -params.l_radius..=params.l_radius {
                if dcx == 0 && dcy == 0 {
                    continue;
                }

                let other_pos = Int2::new(column_pos.x + dcx, column_pos.y + dcy);

                if in_bounds0(other_pos, hidden_size.xy()) {
                    if self.hidden_comparisons[address2(other_pos, hidden_size.xy())] >= hidden_max {
                        num_higher += 1;
                    }
                    count += 1;
                }
            }
        }

        if num_higher as f32 / count as f32 > params.active_ratio {
            return;
        }

        let hidden_cell_index_max = hidden_ci + hidden_column_index * hidden_size.z as usize;
        let rate = if self.hidden_committed_flags[hidden_cell_index_max] != 0 {
            params.lr
        } else {
            1.0
        };

        for vli in 0..self.visible_layers.len() {
            let vld = self.visible_layer_descs[vli];
            let field = Field::of(column_pos, hidden_size, &vld);
            let vl = &mut self.visible_layers[vli];

            for (pos, offset) in field.positions() {
                let in_ci = input_cis[vli][address2(pos, vld.size.xy())] as usize;
                let wi = weight_index(hidden_size, &vld, hidden_column_index, in_ci, offset, hidden_ci);

                let w_old = vl.weights[wi];
                let delta = ceilf_to_i32(rate * (255.0 - w_old as f32));
                vl.weights[wi] = (w_old as i32 + delta).min(255) as u8;
                vl.hidden_totals[hidden_cell_index_max] += vl.weights[wi] as i32 - w_old as i32;
            }
        }

        self.hidden_committed_flags[hidden_cell_index_max] = 1;
    }

    pub fn init_random(&mut self, hidden_size: Int3, visible_layer_descs: Vec<VisibleLayerDesc>, rng: &mut Rng) {
        self.visible_layer_descs = visible_layer_descs;
        self.hidden_size = hidden_size;

        let num_hidden_columns = hidden_size.num_columns();
        let num_hidden_cells = hidden_size.num_cells();

        self.visible_layers = self
            .visible_layer_descs
            .iter()
            .map(|vld| {
                let weights_size = num_hidden_cells * vld.area() * vld.size.z as usize;

                VisibleLayer {
                    weights: (0..weights_size)
                        .map(|_| (rng.next_u32() % INIT_WEIGHT_NOISEI) as u8)
                        .collect(),
                    hidden_totals: vec![0; num_hidden_cells],
                    importance: 1.0,
                }
            })
            .collect();

        // totals must agree with the initial noise
        for vl in &mut self.visible_layers {
            Self::recompute_totals(vl, hidden_size.z as usize);
        }

        self.hidden_cis = vec![0; num_hidden_columns];
        self.hidden_learn_flags = vec![0; num_hidden_columns];
        self.hidden_committed_flags = vec![0; num_hidden_cells];
        self.hidden_comparisons = vec![0.0; num_hidden_columns];
    }

    fn recompute_totals(vl: &mut VisibleLayer, num_hc: usize) {
        vl.hidden_totals.fill(0);
        let num_cells = vl.hidden_totals.len();
        if num_cells == 0 {
            return;
        }
        // weights are laid out [column][in_ci][offset][hc]; the cell is (column, hc)
        let per_column = vl.weights.len() / (num_cells / num_hc);
        for (wi, &w) in vl.weights.iter().enumerate() {
            let column = wi / per_column;
            let hc = wi % num_hc;
            vl.hidden_totals[hc + column * num_hc] += w as i32;
        }
    }

    pub fn step(&mut self, input_cis: &[&[i32]], learn_enabled: bool, params: &Params) {
        let hidden_size = self.hidden_size;

        let results: Vec<ForwardResult> = (0..hidden_size.num_columns())
            .into_par_iter()
            .map(|i| {
                Self::forward_column(
                    column_pos(i, hidden_size),
                    hidden_size,
                    &self.visible_layers,
                    &self.visible_layer_descs,
                    input_cis,
                    &self.hidden_committed_flags,
                    params,
                )
            })
            .collect();

        for (i, res) in results.into_iter().enumerate() {
            self.hidden_cis[i] = res.hidden_ci;
            self.hidden_learn_flags[i] = res.learn_flag;
            self.hidden_comparisons[i] = res.comparison;
        }

        if !learn_enabled {
            return;
        }

        for i in 0..hidden_size.num_columns() {
            self.learn_column(column_pos(i, hidden_size), input_cis, params);
        }
    }

    pub fn clear_state(&mut self) {
        self.hidden_cis.fill(0);
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

    pub fn set_importance(&mut self, vli: usize, importance: f32) {
        self.visible_layers[vli].importance = importance;
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
        let hidden_size = super::read_size(reader, "encoder hidden size")?;
        let num_visible_layers = read_usize(reader, "encoder visible layer count", 1)?;

        let mut visible_layer_descs = Vec::with_capacity(num_visible_layers.min(64));
        for _ in 0..num_visible_layers {
            visible_layer_descs.push(read_visible_layer_desc(reader, "encoder visible layer")?);
        }

        let num_hidden_columns = hidden_size.num_columns();
        let num_hidden_cells = hidden_size.num_cells();

        let visible_layers = visible_layer_descs
            .iter()
            .map(|vld| {
                let len = buffer_len(
                    "encoder weights",
                    &[num_hidden_cells, vld.area(), vld.size.z as usize],
                )?;
                Ok(VisibleLayer {
                    weights: vec![0; len],
                    hidden_totals: vec![0; num_hidden_cells],
                    importance: 1.0,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut encoder = Self {
            hidden_size,
            hidden_cis: vec![0; num_hidden_columns],
            hidden_learn_flags: vec![0; num_hidden_columns],
            hidden_committed_flags: vec![0; num_hidden_cells],
            hidden_comparisons: vec![0.0; num_hidden_columns],
            visible_layers,
            visible_layer_descs,
        };

        encoder.read_weights(reader)?;
        encoder.read_state(reader)?;

        Ok(encoder)
    }

    pub fn write_state(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_i32_slice(&self.hidden_cis)
    }

    pub fn read_state(&mut self, reader: &mut dyn Reader) -> Result<()> {
        reader.read_i32_slice(&mut self.hidden_cis)?;
        check_restored_cis("encoder hidden state", &self.hidden_cis, self.hidden_size.z)
    }

    /// Learned quantities: commitment flags, weights and their per-cell totals.
    pub fn write_weights(&self, writer: &mut dyn Writer) -> Result<()> {
        writer.write_u8_slice(&self.hidden_committed_flags)?;
        for vl in &self.visible_layers {
            writer.write_u8_slice(&vl.weights)?;
            writer.write_i32_slice(&vl.hidden_totals)?;
        }
        Ok(())
    }

    pub fn read_weights(&mut self, reader: &mut dyn Reader) -> Result<()> {
        reader.read_u8_slice(&mut self.hidden_committed_flags)?;
        for vl in &mut self.visible_layers {
            reader.read_u8_slice(&mut vl.weights)?;
            reader.read_i32_slice(&mut vl.hidden_totals)?;
        }
        Ok(())
    }
}

impl FieldSource for Encoder {
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
        self.visible_layers[vli].weights[weight_index(self.hidden_size, vld, hidden_column, vc, offset, hc)]
    }
}
