//! Setup configuration files.
//!
//! A setup file describes the atmosphere of a simulation, the sizes of any data
//! arrays that come from outside sources, and the absorption species to configure.
//! The file uses [TOML format](https://toml.io/en/) and has four sections.
//!
//! # Atmosphere
//!
//! The `[atmosphere]` section gives the grids. Only the pressure grid is required;
//! leaving out the latitude grid makes a 1-D atmosphere, leaving out the longitude
//! grid a 2-D one:
//!
//! ```toml
//! [atmosphere]
//! p_grid = [100000.0, 50000.0, 10000.0]
//! lat_grid = [-10.0, 0.0, 10.0]
//! ```
//!
//! # Dimensions
//!
//! By default every axis (`pressure`, `latitude`, `longitude`, `atmosphere`,
//! `line_of_sight`) is checked for consistency. Axes listed under `unconstrained`
//! accept any value:
//!
//! ```toml
//! [dimensions]
//! unconstrained = ["line_of_sight"]
//! ```
//!
//! # Fields
//!
//! The `[fields]` table maps the name of a data array to its shape. Entries are
//! recorded in the order they appear in the file, each as a deduction of the pressure, latitude and longitude sizes, so a
//! field that does not fit the grids is reported before anything else happens:
//!
//! ```toml
//! [fields]
//! t_field_apriori = [3, 3, 1]
//! z_field = [3, 3, 1]
//! ```
//!
//! # Species
//!
//! Each `[[species]]` entry is one absorption species, given either by `name` or by
//! one of the presets `h2o`, `n2`, `o2` or `cloud_water`. The optional fields are
//! `catalog`, `cia`, `frequency_range` (two numbers), `isotopologues`, `model`,
//! `on_the_fly` (default `true`), `zeeman` (default `false`) and `vmr`, a constant
//! a priori VMR that fills the species' slot of the VMR field. A `jacobian` or
//! `retrieval` table turns on that quantity:
//!
//! ```toml
//! [[species]]
//! preset = "h2o"
//! retrieval = { unit = "rh" }
//!
//! [[species]]
//! name = "O3"
//! isotopologues = "666"
//! jacobian = { method = "perturbation", dx = 0.01 }
//! ```
//!
//! The quantity tables accept `unit` (`vmr`, `rel`, or `rh`), `method`
//! (`analytical` or `perturbation`), `for_species_tag`, `dx`, `perturbation`,
//! and `grids` (a table with `g1`, `g2`, `g3`). The `rel` unit is relative to the
//! a priori field, so it needs a nonzero `vmr` for the species. Note that the H2O
//! preset always uses the PWR98 model; a `model` given for it is ignored.
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};

use crate::{
    atmosphere::{Atmosphere, AtmosphereError},
    context::SimulationContext,
    dimensions::{Axis, DimensionRegistry},
    jacobian::{JacobianMethod, JacobianSettings, RetrievalGrids, RetrievalSettings},
    species::AbsorptionSpecies,
    units::{RetrievalUnit, UnitKind},
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Setup file {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("Could not read setup file {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Could not parse setup configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("The pressure grid must not be empty")]
    EmptyPressureGrid,
    #[error("Species entry {0} has neither a name nor a preset")]
    UnnamedSpecies(usize),
    #[error("Could not get the reference field for species {species}: {cause}")]
    ReferenceField { species: String, cause: AtmosphereError },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SetupConfig {
    pub atmosphere: AtmosphereConfig,
    #[serde(default)]
    pub dimensions: DimensionsConfig,
    #[serde(default)]
    pub fields: IndexMap<String, Vec<usize>>,
    #[serde(default)]
    pub species: Vec<SpeciesConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AtmosphereConfig {
    pub p_grid: Vec<f64>,
    #[serde(default)]
    pub lat_grid: Vec<f64>,
    #[serde(default)]
    pub lon_grid: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DimensionsConfig {
    #[serde(default)]
    pub unconstrained: Vec<Axis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeciesPreset {
    H2o,
    N2,
    O2,
    CloudWater,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpeciesConfig {
    pub name: Option<String>,
    pub preset: Option<SpeciesPreset>,
    pub catalog: Option<String>,
    pub cia: Option<String>,
    pub frequency_range: Option<[f64; 2]>,
    pub isotopologues: Option<String>,
    pub model: Option<String>,
    pub vmr: Option<f64>,
    #[serde(default = "default_true")]
    pub on_the_fly: bool,
    #[serde(default)]
    pub zeeman: bool,
    pub jacobian: Option<QuantityConfig>,
    pub retrieval: Option<QuantityConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuantityConfig {
    #[serde(default)]
    pub unit: UnitKind,
    #[serde(default)]
    pub method: JacobianMethod,
    #[serde(default = "default_for_species_tag")]
    pub for_species_tag: i64,
    #[serde(default = "default_dx")]
    pub dx: f64,
    #[serde(default = "default_perturbation")]
    pub perturbation: f64,
    pub grids: Option<RetrievalGrids>,
}

/// Helper function for serde default attributes
fn default_true() -> bool {
    true
}

fn default_for_species_tag() -> i64 {
    JacobianSettings::default().for_species_tag
}

fn default_dx() -> f64 {
    JacobianSettings::default().dx
}

fn default_perturbation() -> f64 {
    JacobianSettings::default().perturbation
}

impl SetupConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(p: &Path) -> Result<Self, ConfigError> {
        if !p.exists() {
            return Err(ConfigError::NotFound(p.to_path_buf()));
        }
        let s = std::fs::read_to_string(p)
            .map_err(|source| ConfigError::Io { path: p.to_path_buf(), source })?;
        Self::from_toml_str(&s)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.atmosphere.p_grid.is_empty() {
            return Err(ConfigError::EmptyPressureGrid);
        }

        for (i, s) in self.species.iter().enumerate() {
            if s.name.is_none() && s.preset.is_none() {
                return Err(ConfigError::UnnamedSpecies(i + 1));
            }
        }
        Ok(())
    }

    /// Create the simulation context: the atmosphere with one VMR slot per species,
    /// plus deductions from the grids and every entry in `[fields]`.
    ///
    /// Species with a `vmr` get that value everywhere in their slot.
    pub fn build_context(&self) -> SimulationContext {
        let registry = DimensionRegistry::with_unconstrained(&self.dimensions.unconstrained);
        let mut atm = Atmosphere::new(
            Array1::from_vec(self.atmosphere.p_grid.clone()),
            Array1::from_vec(self.atmosphere.lat_grid.clone()),
            Array1::from_vec(self.atmosphere.lon_grid.clone()),
            self.species.len(),
        );
        for (i, vmr) in self.species.iter().enumerate().filter_map(|(i, s)| Some((i, s.vmr?))) {
            atm.vmr_field.index_axis_mut(ndarray::Axis(0), i).fill(vmr);
        }

        let mut ctx = SimulationContext::with_registry(registry, atm);
        for (name, shape) in self.fields.iter() {
            ctx.add_field_deductions(name, shape);
        }
        ctx
    }

    /// Create the configured species, in order.
    ///
    /// Relative units take the species' current VMR field in `ctx` as their reference,
    /// so a priori data should be loaded into `ctx` before calling this. A reference
    /// that is zero anywhere (e.g. a species without `vmr` and no data loaded) is an error.
    pub fn build_species(&self, ctx: &SimulationContext) -> Result<Vec<AbsorptionSpecies>, ConfigError> {
        self.species
            .iter()
            .enumerate()
            .map(|(i, cfg)| cfg.build(i, ctx))
            .collect()
    }
}

impl SpeciesConfig {
    fn build(&self, index: usize, ctx: &SimulationContext) -> Result<AbsorptionSpecies, ConfigError> {
        let mut species = match (self.preset, &self.name) {
            (Some(SpeciesPreset::H2o), _) => AbsorptionSpecies::h2o(),
            (Some(SpeciesPreset::N2), _) => AbsorptionSpecies::n2(),
            (Some(SpeciesPreset::O2), _) => AbsorptionSpecies::o2(),
            (Some(SpeciesPreset::CloudWater), _) => AbsorptionSpecies::cloud_water(),
            (None, Some(name)) => AbsorptionSpecies::new(name),
            (None, None) => return Err(ConfigError::UnnamedSpecies(index + 1)),
        };

        if let Some(catalog) = &self.catalog {
            species = species.with_catalog(catalog);
        }
        if let Some(cia) = &self.cia {
            species = species.with_cia(cia);
        }
        if let Some([f0, f1]) = self.frequency_range {
            species = species.with_frequency_range(f0, f1);
        }
        if let Some(iso) = &self.isotopologues {
            species = species.with_isotopologues(iso);
        }
        if let Some(model) = &self.model {
            species = species.with_model(model);
        }
        species = species.with_on_the_fly(self.on_the_fly).with_zeeman(self.zeeman);
        species.setup(index);

        if let Some(q) = &self.jacobian {
            *species.enable_jacobian() = q.to_settings(&species, index, ctx)?;
        }
        if let Some(q) = &self.retrieval {
            let jacobian = q.to_settings(&species, index, ctx)?;
            *species.enable_retrieval() = RetrievalSettings { jacobian };
        }
        Ok(species)
    }
}

impl QuantityConfig {
    fn to_settings(&self, species: &AbsorptionSpecies, index: usize, ctx: &SimulationContext) -> Result<JacobianSettings, ConfigError> {
        let unit = match self.unit {
            UnitKind::Vmr => RetrievalUnit::Vmr,
            UnitKind::RelativeHumidity => RetrievalUnit::RelativeHumidity,
            UnitKind::Relative => {
                let reference_error = |cause| ConfigError::ReferenceField { species: species.name().to_string(), cause };
                let x_ref: Array3<f64> = ctx.atmosphere().species_vmr(index).map_err(reference_error)?;
                RetrievalUnit::relative(x_ref).map_err(reference_error)?
            },
        };

        Ok(JacobianSettings {
            unit,
            method: self.method,
            for_species_tag: self.for_species_tag,
            dx: self.dx,
            perturbation: self.perturbation,
            grids: self.grids.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{DimensionState, DimensionTracker};

    static EXAMPLE: &str = r#"
[atmosphere]
p_grid = [100000.0, 50000.0, 10000.0]
lat_grid = [-10.0, 0.0, 10.0]

[dimensions]
unconstrained = ["line_of_sight"]

[fields]
z_field = [3, 3, 1]

[[species]]
preset = "h2o"
model = "MPM89"
retrieval = { unit = "rh" }

[[species]]
name = "O3"
isotopologues = "666"
jacobian = { method = "perturbation", dx = 0.01 }

[[species]]
preset = "cloud_water"
vmr = 1e-5
jacobian = { unit = "rel" }
"#;

    #[test]
    fn test_example_config() {
        let cfg = SetupConfig::from_toml_str(EXAMPLE).expect("deserialization should not fail");
        assert_eq!(cfg.species.len(), 3);
        assert_eq!(cfg.dimensions.unconstrained, vec![Axis::LineOfSight]);

        let ctx = cfg.build_context();
        assert!(ctx.check_dimensions().is_ok());
        assert_eq!(ctx.atmosphere().n_species(), 3);
        assert_eq!(ctx.dimensions().axis(Axis::Latitude).get_value(ctx.id()).unwrap(), 3);
        assert_eq!(ctx.dimensions().axis(Axis::LineOfSight).state(ctx.id()), DimensionState::Unconstrained);

        let species = cfg.build_species(&ctx).unwrap();
        assert_eq!(species[0].tag_string(), "H2O-PWR98-");
        assert_eq!(species[0].retrieval().unwrap().jacobian.unit, RetrievalUnit::RelativeHumidity);
        assert_eq!(species[1].tag_string(), "O3-666-");
        let jac = species[1].jacobian().unwrap();
        assert_eq!(jac.method, JacobianMethod::Perturbation);
        assert_eq!(jac.dx, 0.01);
        assert_eq!(jac.for_species_tag, 1);
        assert_eq!(species[2].tag_string(), "liquidcloud-MPM93-");
        assert_eq!(species[2].index(), Some(2));
        assert_eq!(species[2].jacobian().unwrap().unit.arts_name(), "rel");

        let vmr = ctx.atmosphere().species_vmr(2).unwrap();
        assert!(vmr.iter().all(|&v| v == 1e-5));
        assert!(ctx.atmosphere().species_vmr(1).unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_fields_keep_file_order() {
        let toml_str = r#"
        [atmosphere]
        p_grid = [3.0, 2.0, 1.0]

        [fields]
        z_field = [3, 1, 1]
        b_field = [3, 1, 1]
        a_field = [2, 1, 1]
        "#;
        let cfg = SetupConfig::from_toml_str(toml_str).unwrap();
        let keys: Vec<&str> = cfg.fields.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, ["z_field", "b_field", "a_field"]);

        let ctx = cfg.build_context();
        let deductions = ctx.dimensions().axis(Axis::Pressure).deductions(ctx.id());
        let sources: Vec<&str> = deductions.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources[sources.len() - 3..], ["z_field", "b_field", "a_field"]);
    }

    #[test]
    fn test_relative_unit_needs_reference() {
        let toml_str = r#"
        [atmosphere]
        p_grid = [2.0, 1.0]

        [[species]]
        name = "O3"
        retrieval = { unit = "rel" }
        "#;
        let cfg = SetupConfig::from_toml_str(toml_str).unwrap();
        let ctx = cfg.build_context();
        let err = cfg.build_species(&ctx).unwrap_err();
        assert!(matches!(err, ConfigError::ReferenceField { cause: AtmosphereError::InvalidReference(_), .. }));

        let toml_str = toml_str.replace("name = \"O3\"", "name = \"O3\"\nvmr = 2e-6");
        let cfg = SetupConfig::from_toml_str(&toml_str).unwrap();
        let mut ctx = cfg.build_context();
        let species = cfg.build_species(&ctx).unwrap();
        species[0].set_from_x(&mut ctx, &[1.0, 0.5]).unwrap();
        let vmr = ctx.atmosphere().species_vmr(0).unwrap();
        assert_eq!(vmr.as_slice().unwrap(), &[2e-6, 1e-6]);

        let unit = &species[0].retrieval().unwrap().jacobian.unit;
        let back = unit.from_arts(ctx.atmosphere(), &vmr).unwrap();
        assert!(back.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_mismatched_field_in_config() {
        let toml_str = r#"
        [atmosphere]
        p_grid = [3.0, 2.0, 1.0]

        [fields]
        t_field = [3, 1, 1]
        vmr_o3 = [4, 1, 1]
        "#;
        let cfg = SetupConfig::from_toml_str(toml_str).unwrap();
        let ctx = cfg.build_context();
        assert!(ctx.check_dimensions().is_err());
    }

    #[test]
    fn test_invalid_configs() {
        let err = SetupConfig::from_toml_str("[atmosphere]\np_grid = []").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPressureGrid));

        let err = SetupConfig::from_toml_str("[atmosphere]\np_grid = [1.0]\n[[species]]\nzeeman = true").unwrap_err();
        assert!(matches!(err, ConfigError::UnnamedSpecies(1)));

        let err = SetupConfig::from_toml_str("[atmosphere]\np_grid = [1.0]\n[[species]]\nname = \"O3\"\njacobian = { unit = \"ppm\" }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = SetupConfig::from_toml_file(Path::new("/this/does/not/exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
