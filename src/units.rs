//! Units used for Jacobians and retrievals of absorption species.
use std::{fmt::Display, str::FromStr};

use ndarray::{Array3, Axis as NdAxis, Zip};

use crate::atmosphere::{Atmosphere, AtmosphereError};

#[derive(Debug)]
pub struct UnknownUnitError {
    pub quantity: &'static str,
    pub unit: String
}

impl UnknownUnitError {
    fn new<S: ToString>(quantity: &'static str, unit: S) -> Self {
        Self { quantity, unit: unit.to_string() }
    }
}

impl Display for UnknownUnitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown {} unit '{}'", self.quantity, self.unit)
    }
}

impl std::error::Error for UnknownUnitError {}

/// The kind of a [`RetrievalUnit`], without any reference data.
///
/// This is what configuration files name; it becomes a full unit once the
/// reference field (if any) is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum UnitKind {
    #[default]
    Vmr,
    Relative,
    RelativeHumidity,
}

impl UnitKind {
    pub fn arts_name(&self) -> &'static str {
        match self {
            UnitKind::Vmr => "vmr",
            UnitKind::Relative => "rel",
            UnitKind::RelativeHumidity => "rh",
        }
    }
}

impl FromStr for UnitKind {
    type Err = UnknownUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vmr" => Ok(Self::Vmr),
            "rel" | "relative" => Ok(Self::Relative),
            "rh" | "relative_humidity" => Ok(Self::RelativeHumidity),
            _ => Err(UnknownUnitError::new("retrieval", s)),
        }
    }
}

impl TryFrom<String> for UnitKind {
    type Error = UnknownUnitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UnitKind> for String {
    fn from(value: UnitKind) -> Self {
        value.arts_name().to_string()
    }
}

impl Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.arts_name())
    }
}

/// Unit of the values in the state vector for an absorption species.
///
/// - `Vmr` is the default unit in ARTS; state vector values are plugged into the
///   VMR field as they are.
/// - `Relative` values are multiplicative perturbations of the reference field `x_ref`.
///   In a Jacobian calculation, the Jacobian is computed w.r.t. a relative perturbation.
/// - `RelativeHumidity` is only meaningful for H2O. Converting requires the pressure
///   grid and temperature field of the atmosphere.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RetrievalUnit {
    #[default]
    Vmr,
    Relative { x_ref: Array3<f64> },
    RelativeHumidity,
}

impl RetrievalUnit {
    pub fn kind(&self) -> UnitKind {
        match self {
            RetrievalUnit::Vmr => UnitKind::Vmr,
            RetrievalUnit::Relative { .. } => UnitKind::Relative,
            RetrievalUnit::RelativeHumidity => UnitKind::RelativeHumidity,
        }
    }

    pub fn arts_name(&self) -> &'static str {
        self.kind().arts_name()
    }

    /// A relative unit, rejecting references that could not be divided by.
    pub fn relative(x_ref: Array3<f64>) -> Result<Self, AtmosphereError> {
        check_reference(&x_ref)?;
        Ok(RetrievalUnit::Relative { x_ref })
    }

    /// Convert values in this unit to ARTS VMR.
    pub fn to_arts(&self, atm: &Atmosphere, x: &Array3<f64>) -> Result<Array3<f64>, AtmosphereError> {
        match self {
            RetrievalUnit::Vmr => Ok(x.clone()),
            RetrievalUnit::Relative { x_ref } => {
                check_shape("relative unit reference field", x_ref.shape(), x.shape())?;
                Ok(x_ref * x)
            },
            RetrievalUnit::RelativeHumidity => {
                let factor = rh_to_vmr_factor(atm, x)?;
                Ok(x * &factor)
            },
        }
    }

    /// Convert ARTS VMR values back to this unit.
    pub fn from_arts(&self, atm: &Atmosphere, y: &Array3<f64>) -> Result<Array3<f64>, AtmosphereError> {
        match self {
            RetrievalUnit::Vmr => Ok(y.clone()),
            RetrievalUnit::Relative { x_ref } => {
                check_shape("relative unit reference field", x_ref.shape(), y.shape())?;
                check_reference(x_ref)?;
                Ok(y / x_ref)
            },
            RetrievalUnit::RelativeHumidity => {
                let factor = rh_to_vmr_factor(atm, y)?;
                Ok(y / &factor)
            },
        }
    }
}

fn check_reference(x_ref: &Array3<f64>) -> Result<(), AtmosphereError> {
    if x_ref.iter().any(|&v| v == 0.0 || !v.is_finite()) {
        Err(AtmosphereError::InvalidReference("relative unit reference field".to_string()))
    } else {
        Ok(())
    }
}

fn check_shape(name: &str, expected: &[usize], actual: &[usize]) -> Result<(), AtmosphereError> {
    if expected != actual {
        Err(AtmosphereError::shape_mismatch(name, expected, actual))
    } else {
        Ok(())
    }
}

/// e_s(T) / p for every point of the atmosphere, i.e. the VMR at 100% relative humidity.
fn rh_to_vmr_factor(atm: &Atmosphere, x: &Array3<f64>) -> Result<Array3<f64>, AtmosphereError> {
    check_shape("t_field", atm.t_field.shape(), x.shape())?;
    if atm.p_grid.len() != x.len_of(NdAxis(0)) {
        return Err(AtmosphereError::shape_mismatch("p_grid", &[x.len_of(NdAxis(0))], atm.p_grid.shape()));
    }

    let mut factor = Array3::zeros(x.raw_dim());
    for (mut level, (&p, t)) in factor
        .outer_iter_mut()
        .zip(atm.p_grid.iter().zip(atm.t_field.outer_iter()))
    {
        Zip::from(&mut level).and(&t).for_each(|f, &t| *f = e_eq_water_mk(t) / p);
    }
    Ok(factor)
}

/// Equilibrium water vapor pressure over liquid water in Pa (Murphy and Koop, 2005).
pub fn e_eq_water_mk(t: f64) -> f64 {
    let ln_e = 54.842763 - 6763.22 / t - 4.21 * t.ln() + 0.000367 * t
        + (0.0415 * (t - 218.8)).tanh() * (53.878 - 1331.22 / t - 9.44523 * t.ln() + 0.014025 * t);
    ln_e.exp()
}
