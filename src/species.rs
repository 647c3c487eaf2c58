//! Absorption species: tag strings, VMR data and the retrieval/Jacobian switches.
use error_stack::ResultExt;
use log::{debug, info, warn};
use ndarray::{Array3, ArrayD};

use crate::{
    atmosphere::{extend_dimensions, AtmosphereError},
    context::SimulationContext,
    dimensions::DimensionError,
    error::SetupError,
    jacobian::{ArtsEngine, JacobianSettings, RetrievalSettings},
};

#[derive(Debug, thiserror::Error)]
pub enum SpeciesError {
    #[error("Species {0} has not been assigned an index in the VMR field")]
    NotSetUp(String),
    #[error("Data provider has no field for species {0}")]
    MissingData(String),
    #[error("Shape of {species} field is inconsistent with the dimensions of the atmosphere")]
    InconsistentShape { species: String },
    #[error("State vector for {species} has {actual} elements, expected {expected}")]
    StateVectorLength { species: String, expected: usize, actual: usize },
    #[error("Species {0} is not retrieved")]
    NotRetrieved(String),
    #[error(transparent)]
    Dimension(#[from] DimensionError),
    #[error(transparent)]
    Atmosphere(#[from] AtmosphereError),
}

/// Source of a priori species fields, e.g. from a climatology or model output.
///
/// The returned array may have up to three dimensions; missing trailing
/// dimensions are treated as length 1.
pub trait SpeciesDataProvider {
    fn get_field(&self, species: &str) -> Option<ArrayD<f64>>;
}

/// An absorption species as configured in ARTS.
///
/// Create one with [`AbsorptionSpecies::new`] or one of the presets ([`AbsorptionSpecies::h2o`],
/// [`AbsorptionSpecies::n2`], [`AbsorptionSpecies::o2`], [`AbsorptionSpecies::cloud_water`])
/// and adjust with the `with_*` methods.
#[derive(Debug, Clone)]
pub struct AbsorptionSpecies {
    name: String,
    catalog: Option<String>,
    cia: Option<String>,
    frequency_range: Option<(f64, f64)>,
    isotopologues: Option<String>,
    model: Option<String>,
    on_the_fly: bool,
    zeeman: bool,
    liquid_cloud: bool,
    fixed_model: bool,
    index: Option<usize>,
    jacobian: Option<JacobianSettings>,
    retrieval: Option<RetrievalSettings>,
}

impl AbsorptionSpecies {
    pub fn new<S: ToString>(name: S) -> Self {
        Self {
            name: name.to_string(),
            catalog: None,
            cia: None,
            frequency_range: None,
            isotopologues: None,
            model: None,
            on_the_fly: true,
            zeeman: false,
            liquid_cloud: false,
            fixed_model: false,
            index: None,
            jacobian: None,
            retrieval: None,
        }
    }

    /// Water vapor. The continuum model is always PWR98.
    pub fn h2o() -> Self {
        let mut me = Self::new("H2O").with_model("PWR98");
        me.fixed_model = true;
        me
    }

    pub fn n2() -> Self {
        Self::new("N2").with_model("SelfContStandardType")
    }

    pub fn o2() -> Self {
        Self::new("O2").with_model("PWR93")
    }

    /// Liquid cloud water, tagged as "liquidcloud" in ARTS.
    pub fn cloud_water() -> Self {
        let mut me = Self::new("cloud_water").with_model("MPM93");
        me.liquid_cloud = true;
        me
    }

    pub fn with_catalog<S: ToString>(mut self, catalog: S) -> Self {
        self.catalog = Some(catalog.to_string());
        self
    }

    pub fn with_cia<S: ToString>(mut self, cia: S) -> Self {
        self.cia = Some(cia.to_string());
        self
    }

    pub fn with_frequency_range(mut self, f_min: f64, f_max: f64) -> Self {
        self.frequency_range = Some((f_min, f_max));
        self
    }

    pub fn with_isotopologues<S: ToString>(mut self, isotopologues: S) -> Self {
        self.isotopologues = Some(isotopologues.to_string());
        self
    }

    /// Set the continuum model. Presets with a fixed model keep theirs.
    pub fn with_model<S: ToString>(mut self, model: S) -> Self {
        let model = model.to_string();
        if self.fixed_model {
            if self.model.as_deref() != Some(model.as_str()) {
                warn!("{} always uses the {} model, ignoring {model:?}", self.name, self.model.as_deref().unwrap_or(""));
            }
        } else {
            self.model = Some(model);
        }
        self
    }

    pub fn with_on_the_fly(mut self, on_the_fly: bool) -> Self {
        self.on_the_fly = on_the_fly;
        self
    }

    pub fn with_zeeman(mut self, zeeman: bool) -> Self {
        self.zeeman = zeeman;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    pub fn cia(&self) -> Option<&str> {
        self.cia.as_deref()
    }

    pub fn frequency_range(&self) -> Option<(f64, f64)> {
        self.frequency_range
    }

    pub fn isotopologues(&self) -> Option<&str> {
        self.isotopologues.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn on_the_fly(&self) -> bool {
        self.on_the_fly
    }

    pub fn zeeman(&self) -> bool {
        self.zeeman
    }

    /// The species tag string passed to `abs_speciesSet`, e.g. "H2O-Z-181-PWR98-1e9-2e9".
    pub fn tag_string(&self) -> String {
        let model = self.model.as_deref().filter(|m| !m.is_empty());

        if self.liquid_cloud {
            let mut ts = "liquidcloud-".to_string();
            if let Some(m) = model {
                ts.push_str(&format!("{m}-"));
            }
            return ts;
        }

        let mut ts = format!("{}-", self.name);
        if self.zeeman {
            ts.push_str("Z-");
        }
        if let Some(iso) = &self.isotopologues {
            ts.push_str(&format!("{iso}-"));
        }
        if let Some(m) = model {
            ts.push_str(&format!("{m}-"));
        }
        if let Some((f0, f1)) = self.frequency_range {
            // `Display` for f64 never switches to exponent notation: 1e20 is written out in full.
            ts.push_str(&format!("{f0}-{f1}"));
        }
        ts
    }

    /// Record the index of this species in the VMR field.
    pub fn setup(&mut self, index: usize) {
        debug!("{} assigned VMR field index {index}", self.name);
        self.index = Some(index);
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    fn require_index(&self) -> Result<usize, SpeciesError> {
        self.index.ok_or_else(|| SpeciesError::NotSetUp(self.name.clone()))
    }

    pub fn jacobian(&self) -> Option<&JacobianSettings> {
        self.jacobian.as_ref()
    }

    pub fn jacobian_mut(&mut self) -> Option<&mut JacobianSettings> {
        self.jacobian.as_mut()
    }

    /// Turn on the Jacobian for this species, with default settings if it was off.
    pub fn enable_jacobian(&mut self) -> &mut JacobianSettings {
        self.jacobian.get_or_insert_with(JacobianSettings::default)
    }

    pub fn retrieval(&self) -> Option<&RetrievalSettings> {
        self.retrieval.as_ref()
    }

    pub fn retrieval_mut(&mut self) -> Option<&mut RetrievalSettings> {
        self.retrieval.as_mut()
    }

    /// Turn on the retrieval of this species, with default settings if it was off.
    pub fn enable_retrieval(&mut self) -> &mut RetrievalSettings {
        self.retrieval.get_or_insert_with(RetrievalSettings::default)
    }

    pub fn retrieved(&self) -> bool {
        self.retrieval.is_some()
    }

    /// Load the a priori field of this species into the VMR field of `ctx`.
    ///
    /// Retrieved species are skipped; their field comes from the state vector
    /// (see [`AbsorptionSpecies::set_from_x`]). The size of the provided field is
    /// recorded as a deduction before it is compared with the temperature field.
    pub fn get_data<P: SpeciesDataProvider + ?Sized>(
        &self,
        ctx: &mut SimulationContext,
        provider: &P,
    ) -> Result<(), SpeciesError> {
        if self.retrieved() {
            return Ok(());
        }

        let index = self.require_index()?;
        let x = provider
            .get_field(&self.name)
            .ok_or_else(|| SpeciesError::MissingData(self.name.clone()))?;
        let x = extend_dimensions(x)?;

        ctx.add_field_deductions(&format!("{} field", self.name), x.shape());
        ctx.check_dimensions()?;

        if x.shape() != ctx.atmosphere().t_field.shape() {
            return Err(SpeciesError::InconsistentShape { species: self.name.clone() });
        }

        ctx.atmosphere_mut().set_species_vmr(index, &x)?;
        Ok(())
    }

    /// Write the part of the state vector belonging to this species into the VMR field.
    ///
    /// `x` must hold one value per point of the atmosphere field, pressure varying
    /// slowest, in the unit of the retrieval.
    pub fn set_from_x(&self, ctx: &mut SimulationContext, x: &[f64]) -> Result<(), SpeciesError> {
        let retrieval = self
            .retrieval
            .as_ref()
            .ok_or_else(|| SpeciesError::NotRetrieved(self.name.clone()))?;
        let index = self.require_index()?;

        let shape = ctx.atmosphere().field_shape();
        let expected = shape.0 * shape.1 * shape.2;
        if x.len() != expected {
            return Err(SpeciesError::StateVectorLength {
                species: self.name.clone(),
                expected,
                actual: x.len(),
            });
        }

        let x = Array3::from_shape_vec(shape, x.to_vec())
            .map_err(|_| SpeciesError::InconsistentShape { species: self.name.clone() })?;
        let vmr = retrieval.jacobian.unit.to_arts(ctx.atmosphere(), &x)?;
        ctx.atmosphere_mut().set_species_vmr(index, &vmr)?;
        Ok(())
    }
}

/// Assign VMR field indices to `species` in order, then add the Jacobian and
/// retrieval quantities of each to `engine`.
///
/// Returns the species tag strings in VMR field order.
pub fn setup_species<E: ArtsEngine + ?Sized>(
    ctx: &SimulationContext,
    species: &mut [AbsorptionSpecies],
    engine: &mut E,
) -> error_stack::Result<Vec<String>, SetupError> {
    ctx.check_dimensions().change_context(SetupError::Dimensions)?;

    let mut tags = Vec::with_capacity(species.len());
    for (i, s) in species.iter_mut().enumerate() {
        s.setup(i);
        let s: &AbsorptionSpecies = s;
        tags.push(s.tag_string());

        if let Some(jac) = s.jacobian() {
            jac.setup(s, ctx, engine)?;
        }
        if let Some(ret) = s.retrieval() {
            ret.add(s, ctx, engine)?;
        }
    }

    info!("{} absorption species set up: {}", tags.len(), tags.join(", "));
    Ok(tags)
}
