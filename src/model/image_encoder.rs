// AOgmaNeo host - ImageEncoder model object

use super::{check_index, corrupt_params, Model, Status, FORMAT_VERSION};
use crate::codec::{read_header, write_header, Reader, Writer};
use crate::desc::ImageEncoderDesc;
use crate::engine::image_encoder::{self as engine, Params};
use crate::error::Result;
use crate::helpers::Int3;
use crate::marshal::{self, ImageBuffers};
use crate::receptive_field::{self, ReceptiveField};
use crate::{runtime, validate};

/// Turns byte images into a CSDR and learns to reconstruct them.
#[derive(Clone, Debug)]
pub struct ImageEncoder {
    engine: engine::ImageEncoder,
    params: Params,
    inputs: ImageBuffers,
    status: Status,
}

impl ImageEncoder {
    fn new(engine: engine::ImageEncoder, params: Params) -> Self {
        let sizes: Vec<Int3> = (0..engine.num_visible_layers())
            .map(|vli| engine.visible_layer_desc(vli).size)
            .collect();

        Self {
            inputs: ImageBuffers::new(&sizes),
            engine,
            params,
            status: Status::Ready,
        }
    }

    /// Encode one image per visible layer, each `x * y * z` bytes.
    pub fn step<I: AsRef<[u8]>>(&mut self, inputs: &[I], learn_enabled: bool, learn_recon: bool) -> Result<()> {
        self.ensure_ready()?;
        self.inputs.load(inputs)?;

        let images = self.inputs.slices();
        self.engine.step(
            &images,
            learn_enabled,
            learn_recon,
            &mut runtime::rng(),
            &self.params,
        );

        Ok(())
    }

    /// Decode `cis` into every visible layer's reconstruction.
    pub fn reconstruct(&mut self, cis: &[i32]) -> Result<()> {
        self.ensure_ready()?;
        marshal::check_cis(&[cis], &[self.engine.hidden_size()])?;
        self.engine.reconstruct(cis, &self.params);
        Ok(())
    }

    pub fn reconstruction(&self, vli: usize) -> Result<&[u8]> {
        self.check_visible_layer(vli)?;
        Ok(self.engine.reconstruction(vli))
    }

    pub fn hidden_cis(&self) -> Result<&[i32]> {
        self.ensure_ready()?;
        Ok(self.engine.hidden_cis())
    }

    pub fn hidden_size(&self) -> Result<Int3> {
        self.ensure_ready()?;
        Ok(self.engine.hidden_size())
    }

    pub fn num_visible_layers(&self) -> Result<usize> {
        self.ensure_ready()?;
        Ok(self.engine.num_visible_layers())
    }

    pub fn visible_size(&self, vli: usize) -> Result<Int3> {
        self.check_visible_layer(vli)?;
        Ok(self.engine.visible_layer_desc(vli).size)
    }

    pub fn receptive_field(&self, vli: usize, pos: Int3) -> Result<ReceptiveField> {
        self.ensure_ready()?;
        receptive_field::extract(&self.engine, vli, pos)
    }

    fn check_visible_layer(&self, vli: usize) -> Result<()> {
        self.ensure_ready()?;
        check_index("visible layer", vli, self.engine.num_visible_layers())
    }
}

impl Model for ImageEncoder {
    const KIND: &'static str = "image encoder";
    const MAGIC: u32 = 0x49474f41;

    type Desc = ImageEncoderDesc;
    type Params = Params;

    fn init_random(desc: &ImageEncoderDesc) -> Result<Self> {
        validate::validate_image_encoder_desc(desc)?;

        let mut engine = engine::ImageEncoder::default();
        engine.init_random(desc.hidden_size, desc.visible_layer_descs.clone(), &mut runtime::rng());

        tracing::debug!(
            hidden_size = ?desc.hidden_size,
            num_visible_layers = desc.visible_layer_descs.len(),
            "initialized image encoder"
        );

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
        validate::validate_image_encoder_params(&params)?;
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

        let engine = engine::ImageEncoder::read(reader)?;
        let params = Params::read(reader)?;
        validate::validate_image_encoder_params(&params).map_err(|e| corrupt_params(Self::KIND, e))?;

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
