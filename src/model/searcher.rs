// AOgmaNeo host - Searcher model object

use super::{corrupt_params, Model, Status, FORMAT_VERSION};
use crate::codec::{read_header, write_header, Reader, Writer};
use crate::desc::SearcherDesc;
use crate::engine::actor::Params;
use crate::engine::searcher as engine;
use crate::error::Result;
use crate::helpers::Int3;
use crate::{marshal, runtime, sampler, validate};

/// Searches a discrete configuration space, one column per slot, guided by reward.
///
/// Call [`Searcher::step`] with the reward earned by the current [`Searcher::config_cis`];
/// the searcher then moves to its next proposal.
#[derive(Clone, Debug)]
pub struct Searcher {
    engine: engine::Searcher,
    params: Params,
    status: Status,
}

impl Searcher {
    fn new(engine: engine::Searcher, params: Params) -> Self {
        Self {
            engine,
            params,
            status: Status::Ready,
        }
    }

    pub fn step(&mut self, reward: f32, learn_enabled: bool) -> Result<()> {
        self.ensure_ready()?;
        marshal::check_signals(reward, 0.0)?;

        self.engine
            .step(reward, learn_enabled, &mut runtime::rng(), &self.params);

        Ok(())
    }

    pub fn clear_state(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.engine.clear_state();
        Ok(())
    }

    /// Current configuration, one option index per slot.
    pub fn config_cis(&self) -> Result<&[i32]> {
        self.ensure_ready()?;
        Ok(self.engine.config_cis())
    }

    pub fn config_acts(&self) -> Result<&[f32]> {
        self.ensure_ready()?;
        Ok(self.engine.config_acts())
    }

    pub fn config_size(&self) -> Result<Int3> {
        self.ensure_ready()?;
        Ok(self.engine.config_size())
    }

    /// Draw a configuration from the current policy. Temperature 0 is arg-max.
    pub fn sample_config(&self, temperature: f32) -> Result<Vec<i32>> {
        self.ensure_ready()?;
        validate::validate_temperature(temperature)?;

        sampler::sample_csdr(
            self.engine.config_acts(),
            self.engine.config_size().z as usize,
            temperature,
            &mut runtime::rng(),
        )
    }
}

impl Model for Searcher {
    const KIND: &'static str = "searcher";
    const MAGIC: u32 = 0x53474f41;

    type Desc = SearcherDesc;
    type Params = Params;

    fn init_random(desc: &SearcherDesc) -> Result<Self> {
        validate::validate_searcher_desc(desc)?;

        let mut engine = engine::Searcher::default();
        engine.init_random(desc, &mut runtime::rng());

        tracing::debug!(config_size = ?desc.config_size, "initialized searcher");

        Ok(Self::new(engine, Params::default()))
    }

    fn status(&self) -> Status {
        self.status
    }

    fn set_failed(&mut self) {
        self.status = Status::Failed;
    }

    fn params(&self) -> Result<&Params> {
        self.ensure_ready()?;
        Ok(&self.params)
    }

    fn update_params(&mut self, params: Params) -> Result<()> {
        self.ensure_ready()?;
        validate::validate_actor_params(&params, "params")?;
        self.params = params;
        Ok(())
    }

    fn write(&self, writer: &mut dyn Writer) -> Result<()> {
        self.ensure_ready()?;
        write_header(writer, Self::MAGIC, FORMAT_VERSION)?;
        self.engine.write(writer)?;
        self.params.write(writer)
    }

    fn read(reader: &mut dyn Reader) -> Result<Self> {
        read_header(reader, Self::KIND, Self::MAGIC, FORMAT_VERSION)?;

        let engine = engine::Searcher::read(reader)?;
        let params = Params::read(reader)?;
        validate::validate_actor_params(&params, "params").map_err(|e| corrupt_params(Self::KIND, e))?;

        Ok(Self::new(engine, params))
    }

    fn write_state(&self, writer: &mut dyn Writer) -> Result<()> {
        self.ensure_ready()?;
        self.engine.write_state(writer)
    }

    fn write_weights(&self, writer: &mut dyn Writer) -> Result<()> {
        self.ensure_ready()?;
        self.engine.write_weights(writer)
    }

    fn read_state(&mut self, reader: &mut dyn Reader) -> Result<()> {
        self.ensure_ready()?;
        self.engine.read_state(reader)
    }

    fn read_weights(&mut self, reader: &mut dyn Reader) -> Result<()> {
        self.ensure_ready()?;
        self.engine.read_weights(reader)
    }
}
