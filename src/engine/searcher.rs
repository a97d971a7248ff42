// AOgmaNeo host - Searcher (reward-driven search over a discrete configuration)

use super::actor::{self, Actor};
use super::{check_restored_cis, corrupt};
use crate::codec::{Reader, Writer};
use crate::desc::{SearcherDesc, VisibleLayerDesc};
use crate::error::Result;
use crate::helpers::*;

/// An actor whose input is its own last configuration: every step it is told how good
/// that configuration was and proposes the next one.
#[derive(Clone, Debug, Default)]
pub struct Searcher {
    actor: Actor,
    config_cis: IntBuffer,
}

impl Searcher {
    /// Build from a validated descriptor.
    pub fn init_random(&mut self, desc: &SearcherDesc, rng: &mut Rng) {
        self.actor.init_random(
            desc.config_size,
            desc.value_size,
            desc.value_num_dendrites_per_cell,
            desc.num_dendrites_per_cell,
            desc.history_capacity,
            vec![VisibleLayerDesc {
                size: desc.config_size,
                radius: desc.radius,
            }],
            rng,
        );

        self.config_cis = vec![0; desc.config_size.num_columns()];
    }

    /// Score the current configuration with `reward` and move to the next one.
    pub fn step(&mut self, reward: f32, learn_enabled: bool, rng: &mut Rng, params: &actor::Params) {
        self.actor.step(
            &[self.config_cis.as_slice()],
            &self.config_cis,
            learn_enabled,
            reward,
            0.0,
            rng,
            params,
        );

        self.config_cis.copy_from_slice(self.actor.hidden_cis());
    }

    pub fn clear_state(&mut self) {
        self.actor.clear_state();
        self.config_cis.fill(0);
    }

    pub fn config_cis(&self) -> &[i32] {
        &self.config_cis
    }

    /// Policy distribution per slot.
    pub fn config_acts(&self) -> &[f32] {
        self.actor.hidden_acts()
    }

    pub fn config_size(&self) -> Int3 {
        self.actor.hidden_size()
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    // Serialization

    pub fn write(&self, writer: &mut dyn Writer) -> Result<()> {
        self.actor.write(writer)?;
        writer.write_i32_slice(&self.config_cis)
    }

    pub fn read(reader: &mut dyn Reader) -> Result<Self> {
        let actor = Actor::read(reader)?;

        let config_size = actor.hidden_size();
        if actor.num_visible_layers() != 1 || actor.visible_layer_desc(0).size != config_size {
            return Err(corrupt("searcher layout", "actor input must be its own configuration").into());
        }

        let mut searcher = Self {
            config_cis: vec![0; config_size.num_columns()],
            actor,
        };
        searcher.read_config(reader)?;

        Ok(searcher)
    }

    fn read_config(&mut self, reader: &mut dyn Reader) -> Result<()> {
        reader.read_i32_slice(&mut self.config_cis)?;
        check_restored_cis("searcher configuration", &self.config_cis, self.actor.hidden_size().z)
    }

    pub fn write_state(&self, writer: &mut dyn Writer) -> Result<()> {
        self.actor.write_state(writer)?;
        writer.write_i32_slice(&self.config_cis)
    }

    pub fn read_state(&mut self, reader: &mut dyn Reader) -> Result<()> {
        self.actor.read_state(reader)?;
        self.read_config(reader)
    }

    pub fn write_weights(&self, writer: &mut dyn Writer) -> Result<()> {
        self.actor.write_weights(writer)
    }

    pub fn read_weights(&mut self, reader: &mut dyn Reader) -> Result<()> {
        self.actor.read_weights(reader)
    }
}
