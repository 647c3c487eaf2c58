//! Jacobian and retrieval quantities for absorption species.
//!
//! Both boil down to one call into the engine (`jacobianAddAbsSpecies` or
//! `retrievalAddAbsSpecies`) with the same set of arguments, which is built by
//! [`JacobianSettings::args`]. The engine itself is behind the [`ArtsEngine`] trait.
use error_stack::ResultExt;
use log::info;

use crate::{
    context::SimulationContext,
    dimensions::DimensionError,
    error::{EngineError, SetupError},
    species::AbsorptionSpecies,
    units::RetrievalUnit,
};

/// How the engine computes the Jacobian.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    serde::Deserialize,
    serde::Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JacobianMethod {
    #[default]
    Analytical,
    Perturbation,
}

/// The grids a quantity is retrieved on, one per atmospheric axis.
///
/// Empty grids are allowed for axes the atmosphere does not have.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RetrievalGrids {
    pub g1: Vec<f64>,
    #[serde(default)]
    pub g2: Vec<f64>,
    #[serde(default)]
    pub g3: Vec<f64>,
}

/// Arguments of `jacobianAddAbsSpecies` and `retrievalAddAbsSpecies`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AbsSpeciesArgs {
    pub g1: Vec<f64>,
    pub g2: Vec<f64>,
    pub g3: Vec<f64>,
    pub species: String,
    pub method: String,
    pub unit: String,
    pub for_species_tag: i64,
    pub dx: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JacobianSettings {
    pub unit: RetrievalUnit,
    pub method: JacobianMethod,
    pub for_species_tag: i64,
    pub dx: f64,
    pub perturbation: f64,
    /// Retrieval grids; the atmosphere grids are used if `None`
    pub grids: Option<RetrievalGrids>,
}

impl Default for JacobianSettings {
    fn default() -> Self {
        Self {
            unit: RetrievalUnit::Vmr,
            method: JacobianMethod::Analytical,
            for_species_tag: 1,
            dx: 0.001,
            perturbation: 0.01,
            grids: None,
        }
    }
}

impl JacobianSettings {
    /// Build the engine arguments for `species`.
    ///
    /// The dimensions of `ctx` are checked first, since the default grids come
    /// from its atmosphere.
    pub fn args(&self, species: &AbsorptionSpecies, ctx: &SimulationContext) -> Result<AbsSpeciesArgs, DimensionError> {
        ctx.check_dimensions()?;

        let grids = match &self.grids {
            Some(g) => g.clone(),
            None => {
                let atm = ctx.atmosphere();
                RetrievalGrids {
                    g1: atm.p_grid.to_vec(),
                    g2: atm.lat_grid.to_vec(),
                    g3: atm.lon_grid.to_vec(),
                }
            },
        };

        Ok(AbsSpeciesArgs {
            g1: grids.g1,
            g2: grids.g2,
            g3: grids.g3,
            species: species.tag_string(),
            method: self.method.to_string(),
            unit: self.unit.arts_name().to_string(),
            for_species_tag: self.for_species_tag,
            dx: self.dx,
        })
    }

    /// Add the Jacobian of `species` to the engine.
    pub fn setup<E: ArtsEngine + ?Sized>(
        &self,
        species: &AbsorptionSpecies,
        ctx: &SimulationContext,
        engine: &mut E,
    ) -> error_stack::Result<(), SetupError> {
        let args = self.args(species, ctx)
            .change_context_lazy(|| SetupError::species(species.name()))?;
        engine.jacobian_add_abs_species(&args)
            .change_context_lazy(|| SetupError::Engine { call: JACOBIAN_CALL, species: args.species.clone() })?;
        info!("Jacobian added for {}", args.species);
        Ok(())
    }
}

/// Retrieval of an absorption species. Uses the same settings as a Jacobian.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetrievalSettings {
    pub jacobian: JacobianSettings,
}

impl RetrievalSettings {
    /// Add `species` as a retrieval quantity to the engine.
    pub fn add<E: ArtsEngine + ?Sized>(
        &self,
        species: &AbsorptionSpecies,
        ctx: &SimulationContext,
        engine: &mut E,
    ) -> error_stack::Result<(), SetupError> {
        let args = self.jacobian.args(species, ctx)
            .change_context_lazy(|| SetupError::species(species.name()))?;
        engine.retrieval_add_abs_species(&args)
            .change_context_lazy(|| SetupError::Engine { call: RETRIEVAL_CALL, species: args.species.clone() })?;
        info!("Retrieval quantity added for {}", args.species);
        Ok(())
    }
}

pub const JACOBIAN_CALL: &str = "jacobianAddAbsSpecies";
pub const RETRIEVAL_CALL: &str = "retrievalAddAbsSpecies";

/// The workspace methods of the radiative transfer engine that species setup calls.
pub trait ArtsEngine {
    fn jacobian_add_abs_species(&mut self, args: &AbsSpeciesArgs) -> error_stack::Result<(), EngineError>;
    fn retrieval_add_abs_species(&mut self, args: &AbsSpeciesArgs) -> error_stack::Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EngineCall {
    pub method: &'static str,
    pub args: AbsSpeciesArgs,
}

/// An engine that only records the calls made to it, for dry runs.
#[derive(Debug, Default, serde::Serialize)]
pub struct RecordingEngine {
    pub calls: Vec<EngineCall>,
}

impl ArtsEngine for RecordingEngine {
    fn jacobian_add_abs_species(&mut self, args: &AbsSpeciesArgs) -> error_stack::Result<(), EngineError> {
        self.calls.push(EngineCall { method: JACOBIAN_CALL, args: args.clone() });
        Ok(())
    }

    fn retrieval_add_abs_species(&mut self, args: &AbsSpeciesArgs) -> error_stack::Result<(), EngineError> {
        self.calls.push(EngineCall { method: RETRIEVAL_CALL, args: args.clone() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{atmosphere::Atmosphere, species::setup_species};
    use ndarray::{arr1, Array1};
    use rstest::{fixture, rstest};

    #[fixture]
    fn ctx() -> SimulationContext {
        let atm = Atmosphere::new(arr1(&[1e5, 5e4, 1e4]), Array1::zeros(0), Array1::zeros(0), 2);
        SimulationContext::new(atm)
    }

    struct RejectingEngine;

    impl ArtsEngine for RejectingEngine {
        fn jacobian_add_abs_species(&mut self, _args: &AbsSpeciesArgs) -> error_stack::Result<(), EngineError> {
            Err(EngineError::new("no Jacobian for you").into())
        }

        fn retrieval_add_abs_species(&mut self, _args: &AbsSpeciesArgs) -> error_stack::Result<(), EngineError> {
            Err(EngineError::new("no retrieval for you").into())
        }
    }

    #[rstest]
    fn test_default_args(ctx: SimulationContext) {
        let h2o = AbsorptionSpecies::h2o();
        let args = JacobianSettings::default().args(&h2o, &ctx).unwrap();
        assert_eq!(args.g1, vec![1e5, 5e4, 1e4]);
        assert!(args.g2.is_empty());
        assert!(args.g3.is_empty());
        assert_eq!(args.species, "H2O-PWR98-");
        assert_eq!(args.method, "analytical");
        assert_eq!(args.unit, "vmr");
        assert_eq!(args.for_species_tag, 1);
        assert_eq!(args.dx, 0.001);
    }

    #[rstest]
    fn test_custom_grids_and_method(ctx: SimulationContext) {
        let settings = JacobianSettings {
            method: JacobianMethod::Perturbation,
            grids: Some(RetrievalGrids { g1: vec![1e5, 1e4], g2: vec![], g3: vec![] }),
            ..Default::default()
        };
        let args = settings.args(&AbsorptionSpecies::o2(), &ctx).unwrap();
        assert_eq!(args.g1, vec![1e5, 1e4]);
        assert_eq!(args.method, "perturbation");
    }

    #[rstest]
    fn test_args_refused_on_inconsistent_dimensions(mut ctx: SimulationContext) {
        ctx.add_field_deductions("O3 field", &[7]);
        let err = JacobianSettings::default()
            .args(&AbsorptionSpecies::new("O3"), &ctx)
            .unwrap_err();
        assert!(matches!(err, DimensionError::Inconsistent { .. }));
    }

    #[rstest]
    fn test_setup_species_records_calls(ctx: SimulationContext) {
        let mut h2o = AbsorptionSpecies::h2o();
        h2o.enable_jacobian();
        let mut o3 = AbsorptionSpecies::new("O3");
        o3.enable_retrieval();
        let mut species = vec![h2o, o3];

        let mut engine = RecordingEngine::default();
        let tags = setup_species(&ctx, &mut species, &mut engine).unwrap();
        assert_eq!(tags, vec!["H2O-PWR98-".to_string(), "O3-".to_string()]);
        assert_eq!(species[1].index(), Some(1));
        assert_eq!(engine.calls.len(), 2);
        assert_eq!(engine.calls[0].method, JACOBIAN_CALL);
        assert_eq!(engine.calls[1].method, RETRIEVAL_CALL);
        assert_eq!(engine.calls[1].args.species, "O3-");
    }

    #[rstest]
    fn test_engine_errors_propagate(ctx: SimulationContext) {
        let mut h2o = AbsorptionSpecies::h2o();
        h2o.enable_jacobian();
        let report = h2o.jacobian().unwrap()
            .setup(&h2o, &ctx, &mut RejectingEngine)
            .unwrap_err();
        assert!(matches!(report.current_context(), SetupError::Engine { call: JACOBIAN_CALL, .. }));
    }
}
