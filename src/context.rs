//! One simulation setup pass and the dimension history that belongs to it.
use log::{debug, info};

use crate::{
    atmosphere::{add_field_deductions, Atmosphere},
    dimensions::{ContextId, DimensionError, DimensionRegistry},
};

/// The state of one ARTS workspace while it is being configured.
///
/// The context owns its [`DimensionRegistry`], so dropping the context drops every
/// deduction made for it. Contexts share nothing, so separate contexts can be set up
/// on separate threads; all mutation goes through `&mut self`.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    id: ContextId,
    dimensions: DimensionRegistry,
    atmosphere: Atmosphere,
}

impl SimulationContext {
    /// Create a context with every axis tracked and record the deductions
    /// implied by `atmosphere`.
    pub fn new(atmosphere: Atmosphere) -> Self {
        Self::with_registry(DimensionRegistry::new(), atmosphere)
    }

    /// Like [`SimulationContext::new`], but with a caller-configured registry
    /// (e.g. with some axes unconstrained).
    pub fn with_registry(dimensions: DimensionRegistry, atmosphere: Atmosphere) -> Self {
        let mut me = Self { id: ContextId::new(), dimensions, atmosphere };
        me.deduce_from_atmosphere();
        info!("{}: atmosphere is {}-D with field shape {:?}", me.id, me.atmosphere.atmosphere_dim(), me.atmosphere.field_shape());
        me
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn dimensions(&self) -> &DimensionRegistry {
        &self.dimensions
    }

    pub fn dimensions_mut(&mut self) -> &mut DimensionRegistry {
        &mut self.dimensions
    }

    pub fn atmosphere(&self) -> &Atmosphere {
        &self.atmosphere
    }

    pub fn atmosphere_mut(&mut self) -> &mut Atmosphere {
        &mut self.atmosphere
    }

    /// Record the grid, field and rank deductions of the current atmosphere.
    pub fn deduce_from_atmosphere(&mut self) {
        self.atmosphere.deduce_dimensions(&mut self.dimensions, self.id);
    }

    /// Record the pressure, latitude and longitude sizes implied by a field of shape `shape`.
    pub fn add_field_deductions(&mut self, source: &str, shape: &[usize]) {
        add_field_deductions(&mut self.dimensions, self.id, source, shape);
    }

    pub fn check_dimensions(&self) -> Result<(), DimensionError> {
        self.dimensions.check_all(self.id)
    }

    /// Forget every deduction made so far, e.g. before a second setup pass on
    /// the same workspace.
    pub fn reset_dimensions(&mut self) {
        debug!("{}: resetting dimension deductions", self.id);
        self.dimensions.reset(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{Axis, DimensionTracker};
    use ndarray::Array1;

    fn atmosphere(np: usize) -> Atmosphere {
        Atmosphere::new(Array1::linspace(1e5, 1e2, np), Array1::zeros(0), Array1::zeros(0), 1)
    }

    #[test]
    fn test_new_context_is_consistent() {
        let ctx = SimulationContext::new(atmosphere(41));
        assert!(ctx.check_dimensions().is_ok());
        assert_eq!(ctx.dimensions().axis(Axis::Pressure).get_value(ctx.id()).unwrap(), 41);
    }

    #[test]
    fn test_contexts_get_distinct_ids() {
        let a = SimulationContext::new(atmosphere(3));
        let b = SimulationContext::new(atmosphere(3));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_reset_then_rededuce() {
        let mut ctx = SimulationContext::new(atmosphere(41));
        ctx.add_field_deductions("O3 field", &[37, 1, 1]);
        assert!(ctx.check_dimensions().is_err());

        ctx.reset_dimensions();
        ctx.deduce_from_atmosphere();
        assert!(ctx.check_dimensions().is_ok());
    }
}
