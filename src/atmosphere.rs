//! The atmospheric data arrays of one workspace that dimensions are deduced from.
use ndarray::{Array1, Array3, Array4, ArrayD, Axis as NdAxis, Ix3};

use crate::dimensions::{Axis, ContextId, DimensionRegistry, DimensionTracker};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AtmosphereError {
    #[error("Cannot extend an array with {0} dimensions to 3 dimensions")]
    TooManyDimensions(usize),
    #[error("Species index {index} is out of range, the VMR field holds {n_species} species")]
    SpeciesIndexOutOfRange { index: usize, n_species: usize },
    #[error("Shape of {name} ({actual:?}) does not match the expected shape {expected:?}")]
    ShapeMismatch { name: String, expected: Vec<usize>, actual: Vec<usize> },
    #[error("The {0} has zero or non-finite values")]
    InvalidReference(String),
}

impl AtmosphereError {
    pub(crate) fn shape_mismatch<S: ToString>(name: S, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            name: name.to_string(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

/// Grids and fields of a 1-, 2-, or 3-D atmosphere.
///
/// An empty latitude grid makes the atmosphere 1-D, an empty longitude grid
/// (with a non-empty latitude grid) 2-D. The fields always have three spatial
/// axes; along an empty grid that axis has length 1.
#[derive(Debug, Clone)]
pub struct Atmosphere {
    pub p_grid: Array1<f64>,
    pub lat_grid: Array1<f64>,
    pub lon_grid: Array1<f64>,
    pub t_field: Array3<f64>,
    /// Species along the first axis, then pressure, latitude, longitude
    pub vmr_field: Array4<f64>,
}

impl Atmosphere {
    /// Create an atmosphere with zeroed fields shaped to match the grids.
    pub fn new(p_grid: Array1<f64>, lat_grid: Array1<f64>, lon_grid: Array1<f64>, n_species: usize) -> Self {
        let (np, nlat, nlon) = field_shape_for(p_grid.len(), lat_grid.len(), lon_grid.len());
        Self {
            t_field: Array3::zeros((np, nlat, nlon)),
            vmr_field: Array4::zeros((n_species, np, nlat, nlon)),
            p_grid,
            lat_grid,
            lon_grid,
        }
    }

    /// Assemble an atmosphere from existing arrays without checking their shapes.
    ///
    /// Use [`Atmosphere::deduce_dimensions`] to find out whether they agree.
    pub fn from_parts(
        p_grid: Array1<f64>,
        lat_grid: Array1<f64>,
        lon_grid: Array1<f64>,
        t_field: Array3<f64>,
        vmr_field: Array4<f64>,
    ) -> Self {
        Self { p_grid, lat_grid, lon_grid, t_field, vmr_field }
    }

    pub fn atmosphere_dim(&self) -> usize {
        if self.lat_grid.is_empty() {
            1
        } else if self.lon_grid.is_empty() {
            2
        } else {
            3
        }
    }

    /// Number of columns in a line of sight: zenith only below 3-D,
    /// zenith and azimuth in 3-D.
    pub fn los_dim(&self) -> usize {
        if self.atmosphere_dim() == 3 {
            2
        } else {
            1
        }
    }

    /// The shape a 3-D field must have to match the grids.
    pub fn field_shape(&self) -> (usize, usize, usize) {
        field_shape_for(self.p_grid.len(), self.lat_grid.len(), self.lon_grid.len())
    }

    pub fn n_species(&self) -> usize {
        self.vmr_field.len_of(NdAxis(0))
    }

    /// Replace the VMR field of species `index` with `x`.
    pub fn set_species_vmr(&mut self, index: usize, x: &Array3<f64>) -> Result<(), AtmosphereError> {
        let n_species = self.n_species();
        if index >= n_species {
            return Err(AtmosphereError::SpeciesIndexOutOfRange { index, n_species });
        }

        let mut slot = self.vmr_field.index_axis_mut(NdAxis(0), index);
        if slot.shape() != x.shape() {
            return Err(AtmosphereError::shape_mismatch("vmr field", slot.shape(), x.shape()));
        }
        slot.assign(x);
        Ok(())
    }

    /// Copy of the VMR field of species `index`.
    pub fn species_vmr(&self, index: usize) -> Result<Array3<f64>, AtmosphereError> {
        let n_species = self.n_species();
        if index >= n_species {
            return Err(AtmosphereError::SpeciesIndexOutOfRange { index, n_species });
        }
        Ok(self.vmr_field.index_axis(NdAxis(0), index).to_owned())
    }

    /// Record every dimension that can be read off these arrays.
    ///
    /// Grids give the pressure, latitude and longitude sizes and the rank of the
    /// atmosphere; the temperature and VMR fields give the three grid sizes again.
    pub fn deduce_dimensions(&self, dims: &mut DimensionRegistry, ctx: ContextId) {
        let (np, nlat, nlon) = self.field_shape();
        dims.axis_mut(Axis::Pressure).add_deduction(ctx, np, "p_grid");
        dims.axis_mut(Axis::Latitude).add_deduction(ctx, nlat, "lat_grid");
        dims.axis_mut(Axis::Longitude).add_deduction(ctx, nlon, "lon_grid");
        dims.axis_mut(Axis::Atmosphere).add_deduction(ctx, self.atmosphere_dim(), "atmosphere grids");
        dims.axis_mut(Axis::LineOfSight).add_deduction(ctx, self.los_dim(), "atmosphere grids");

        add_field_deductions(dims, ctx, "t_field", self.t_field.shape());
        add_field_deductions(dims, ctx, "vmr_field", &self.vmr_field.shape()[1..]);
    }
}

/// Record the pressure, latitude and longitude sizes implied by a 3-D field shape.
///
/// Shapes with fewer than three axes are treated as if extended with trailing
/// axes of length 1; extra axes are ignored.
pub fn add_field_deductions(dims: &mut DimensionRegistry, ctx: ContextId, source: &str, shape: &[usize]) {
    let size = |i: usize| shape.get(i).copied().unwrap_or(1);
    dims.axis_mut(Axis::Pressure).add_deduction(ctx, size(0), source);
    dims.axis_mut(Axis::Latitude).add_deduction(ctx, size(1), source);
    dims.axis_mut(Axis::Longitude).add_deduction(ctx, size(2), source);
}

fn field_shape_for(np: usize, nlat: usize, nlon: usize) -> (usize, usize, usize) {
    (np, nlat.max(1), nlon.max(1))
}

/// Give an array of rank 0 to 3 trailing axes of length 1 until it is 3-D.
pub fn extend_dimensions(x: ArrayD<f64>) -> Result<Array3<f64>, AtmosphereError> {
    let ndim = x.ndim();
    if ndim > 3 {
        return Err(AtmosphereError::TooManyDimensions(ndim));
    }

    let mut x = x;
    while x.ndim() < 3 {
        let n = x.ndim();
        x = x.insert_axis(NdAxis(n));
    }

    x.into_dimensionality::<Ix3>()
        .map_err(|_| AtmosphereError::TooManyDimensions(ndim))
}
