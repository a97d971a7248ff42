// AOgmaNeo host - Hierarchy model object

use super::{check_index, corrupt_params, Model, Status, FORMAT_VERSION};
use crate::codec::{read_header, write_header, Reader, Writer};
use crate::desc::{HierarchyDesc, IoType};
use crate::engine::hierarchy::{self as engine, Params};
use crate::error::{Result, ShapeMismatchError};
use crate::helpers::Int3;
use crate::marshal::{self, InputBuffers};
use crate::receptive_field::{self, ReceptiveField};
use crate::sampler;
use crate::{runtime, validate};

/// A sparse predictive hierarchy with one IO port per input stream.
///
/// ```no_run
/// use aogmaneo_host::{HierarchyDesc, IoDesc, LayerDesc, Int3, Model};
/// use aogmaneo_host::model::Hierarchy;
///
/// let desc = HierarchyDesc::new(
///     vec![IoDesc { size: Int3::new(4, 4, 16), ..Default::default() }],
///     vec![LayerDesc::default(); 2],
/// );
/// let mut h = Hierarchy::init_random(&desc)?;
/// h.step(&[vec![0; 16]], true, 0.0, 0.0)?;
/// let _next = h.prediction_cis(0)?;
/// # Ok::<(), aogmaneo_host::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Hierarchy {
    engine: engine::Hierarchy,
    params: Params,
    inputs: InputBuffers,
    status: Status,
}

impl Hierarchy {
    fn new(engine: engine::Hierarchy, params: Params) -> Self {
        Self {
            inputs: InputBuffers::new(engine.io_sizes()),
            engine,
            params,
            status: Status::Ready,
        }
    }

    /// Advance one tick. `inputs` holds one CSDR per IO port, action ports included.
    ///
    /// Every buffer is checked before anything is copied, so a rejected step leaves the
    /// model untouched.
    pub fn step<I: AsRef<[i32]>>(&mut self, inputs: &[I], learn_enabled: bool, reward: f32, mimic: f32) -> Result<()> {
        self.ensure_ready()?;
        marshal::check_signals(reward, mimic)?;
        self.inputs.load(inputs)?;

        let input_cis = self.inputs.slices();
        self.engine.step(
            &input_cis,
            learn_enabled,
            reward,
            mimic,
            &self.params,
            &mut runtime::rng(),
        );

        Ok(())
    }

    pub fn clear_state(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.engine.clear_state();
        Ok(())
    }

    fn check_io(&self, i: usize) -> Result<()> {
        self.ensure_ready()?;
        check_index("io", i, self.engine.num_io())
    }

    fn check_layer(&self, l: usize) -> Result<()> {
        self.ensure_ready()?;
        check_index("layer", l, self.engine.num_layers())
    }

    // Port `i` must produce predictions
    fn check_predicting(&self, i: usize) -> Result<()> {
        self.check_io(i)?;
        let actual = self.engine.io_type(i);
        if actual == IoType::None {
            return Err(ShapeMismatchError::WrongIoType {
                index: i,
                expected: IoType::Prediction,
                actual,
            }
            .into());
        }
        Ok(())
    }

    pub fn prediction_cis(&self, i: usize) -> Result<&[i32]> {
        self.check_predicting(i)?;
        Ok(self.engine.prediction_cis(i))
    }

    /// Per-cell activations of port `i`, column by column.
    pub fn prediction_acts(&self, i: usize) -> Result<&[f32]> {
        self.check_predicting(i)?;
        Ok(self.engine.prediction_acts(i))
    }

    /// Value estimates of action port `i`.
    pub fn prediction_values(&self, i: usize) -> Result<&[f32]> {
        self.check_io(i)?;
        self.engine.prediction_values(i).ok_or_else(|| {
            ShapeMismatchError::WrongIoType {
                index: i,
                expected: IoType::Action,
                actual: self.engine.io_type(i),
            }
            .into()
        })
    }

    /// Draw one index per column of port `i`. Temperature 0 is arg-max.
    pub fn sample_prediction(&self, i: usize, temperature: f32) -> Result<Vec<i32>> {
        self.check_predicting(i)?;
        validate::validate_temperature(temperature)?;

        sampler::sample_csdr(
            self.engine.prediction_acts(i),
            self.engine.io_size(i).z as usize,
            temperature,
            &mut runtime::rng(),
        )
    }

    pub fn hidden_cis(&self, l: usize) -> Result<&[i32]> {
        self.check_layer(l)?;
        Ok(self.engine.hidden_cis(l))
    }

    pub fn hidden_size(&self, l: usize) -> Result<Int3> {
        self.check_layer(l)?;
        Ok(self.engine.hidden_size(l))
    }

    pub fn num_layers(&self) -> Result<usize> {
        self.ensure_ready()?;
        Ok(self.engine.num_layers())
    }

    pub fn num_io(&self) -> Result<usize> {
        self.ensure_ready()?;
        Ok(self.engine.num_io())
    }

    pub fn io_size(&self, i: usize) -> Result<Int3> {
        self.check_io(i)?;
        Ok(self.engine.io_size(i))
    }

    pub fn io_type(&self, i: usize) -> Result<IoType> {
        self.check_io(i)?;
        Ok(self.engine.io_type(i))
    }

    /// Whether layer `l` ran on the last step.
    pub fn is_updated(&self, l: usize) -> Result<bool> {
        self.check_layer(l)?;
        Ok(self.engine.is_updated(l))
    }

    pub fn num_encoder_visible_layers(&self, l: usize) -> Result<usize> {
        self.check_layer(l)?;
        Ok(self.engine.encoder(l).num_visible_layers())
    }

    /// Weights hidden cell `pos` of layer `l` holds over encoder input `vli`.
    pub fn layer_receptive_field(&self, l: usize, vli: usize, pos: Int3) -> Result<ReceptiveField> {
        self.check_layer(l)?;
        receptive_field::extract(self.engine.encoder(l), vli, pos)
    }

    /// Engine view, for inspection.
    pub fn engine(&self) -> &engine::Hierarchy {
        &self.engine
    }
}

impl Model for Hierarchy {
    const KIND: &'static str = "hierarchy";
    const MAGIC: u32 = 0x4d474f41;

    type Desc = HierarchyDesc;
    type Params = Params;

    fn init_random(desc: &HierarchyDesc) -> Result<Self> {
        validate::validate_hierarchy_desc(desc)?;

        let mut engine = engine::Hierarchy::default();
        engine.init_random(desc, &mut runtime::rng());
        let params = Params::new(engine.num_layers(), engine.num_io());

        tracing::debug!(
            num_io = engine.num_io(),
            num_layers = engine.num_layers(),
            "initialized hierarchy"
        );

        Ok(Self::new(engine, params))
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
        validate::validate_hierarchy_params(&params, self.engine.num_layers(), self.engine.num_io())?;
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

        let engine = engine::Hierarchy::read(reader)?;
        let params = Params::read(reader, engine.num_layers(), engine.num_io())?;
        validate::validate_hierarchy_params(&params, engine.num_layers(), engine.num_io())
            .map_err(|e| corrupt_params(Self::KIND, e))?;

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
