//! Symbolic dimensions of the data arrays in an ARTS simulation.
//!
//! The required sizes of most array data used in an ARTS simulation are fixed by
//! the dimensions of the atmosphere (pressure, latitude and longitude grids), but
//! those sizes usually become apparent from several unrelated sources: the grids
//! themselves, the temperature field, each species' VMR field, and so on. The types
//! in this module let setup code record each of these "deductions" and verify that
//! they agree before anything is handed to the engine.
//!
//! Deductions are always recorded against a [`ContextId`], which identifies one
//! simulation workspace. Histories for different contexts never interact.
//!
//! A [`Dimension`] tracks deductions and can check them for consistency. A [`Joker`]
//! stands in for a dimension that may take any value; it accepts and ignores all
//! deductions. The two are combined in [`AxisTracker`] so that a [`DimensionRegistry`]
//! can decide per [`Axis`] whether that axis is constrained.
use std::{
    collections::HashMap,
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use itertools::Itertools;
use log::debug;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque handle for one simulation context (i.e. one ARTS workspace).
///
/// Each call to [`ContextId::new`] returns an id that has not been handed out before
/// in this process. The trackers only use it as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub fn new() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "context #{}", self.0)
    }
}

/// A size for a dimension inferred from some piece of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deduction {
    /// The inferred size
    pub value: usize,
    /// The name of the variable the size was inferred from, e.g. "p_grid"
    pub source: String,
}

impl Deduction {
    pub fn new<S: ToString>(value: usize, source: S) -> Self {
        Self { value, source: source.to_string() }
    }
}

impl Display for Deduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} deduced from {}", self.value, self.source)
    }
}

/// A pair of deductions for the same context that disagree.
///
/// `first_index` is always less than `second_index`; both index into the
/// context's deductions in the order they were added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub first_index: usize,
    pub second_index: usize,
    pub first: Deduction,
    pub second: Deduction,
}

impl Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "- {} and {}", self.first, self.second)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DimensionError {
    #[error("No deductions have been made for the {dimension} in the given context")]
    NoDeduction { dimension: String },
    #[error(
        "During deduction of the dimensions of the {dimension} the following inconsistencies were encountered:\n{}",
        format_conflicts(.conflicts)
    )]
    Inconsistent { dimension: String, conflicts: Vec<Conflict> },
    #[error("Cannot retrieve the value of an unconstrained dimension ({dimension})")]
    Unsupported { dimension: String },
}

impl DimensionError {
    /// The name of the dimension this error was raised for.
    pub fn dimension(&self) -> &str {
        match self {
            Self::NoDeduction { dimension } => dimension,
            Self::Inconsistent { dimension, .. } => dimension,
            Self::Unsupported { dimension } => dimension,
        }
    }
}

fn format_conflicts(conflicts: &[Conflict]) -> String {
    conflicts.iter().map(|c| c.to_string()).join("\n")
}

/// Classification of the deductions recorded for one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionState {
    /// Nothing has been deduced for this context (or the dimension is a joker).
    Unobserved,
    /// All deductions agree on the contained value.
    Consistent(usize),
    /// At least one pair of deductions disagrees; contains the number of conflicting pairs.
    Conflicting(usize),
    /// The dimension accepts any value and does not record deductions.
    Unconstrained,
}

impl Display for DimensionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionState::Unobserved => write!(f, "unobserved"),
            DimensionState::Consistent(n) => write!(f, "{n}"),
            DimensionState::Conflicting(n) => write!(f, "{n} conflict(s)"),
            DimensionState::Unconstrained => write!(f, "any"),
        }
    }
}

/// Common interface of tracked and unconstrained dimensions.
pub trait DimensionTracker {
    /// Human-readable name, e.g. "pressure grid"
    fn name(&self) -> &str;

    /// Record that `source` implies a size of `value` for this dimension in context `ctx`.
    fn add_deduction(&mut self, ctx: ContextId, value: usize, source: &str);

    /// Verify that every deduction made for `ctx` agrees.
    fn check(&self, ctx: ContextId) -> Result<(), DimensionError>;

    /// Return the agreed value of this dimension for `ctx`.
    fn get_value(&self, ctx: ContextId) -> Result<usize, DimensionError>;

    /// Forget every deduction made for `ctx`.
    fn reset(&mut self, ctx: ContextId);
}

/// A dimension whose value is deduced from data and checked for consistency.
#[derive(Debug, Clone)]
pub struct Dimension {
    name: String,
    deductions: HashMap<ContextId, Vec<Deduction>>,
}

impl Dimension {
    pub fn new<S: ToString>(name: S) -> Self {
        Self { name: name.to_string(), deductions: HashMap::new() }
    }

    /// The deductions recorded for `ctx`, in the order they were made.
    pub fn deductions(&self, ctx: ContextId) -> &[Deduction] {
        self.deductions.get(&ctx).map(|ds| ds.as_slice()).unwrap_or(&[])
    }

    /// Classify the current deductions for `ctx` without failing.
    pub fn state(&self, ctx: ContextId) -> DimensionState {
        let Some(ds) = self.deductions.get(&ctx) else {
            return DimensionState::Unobserved;
        };

        let conflicts = find_conflicts(ds);
        if !conflicts.is_empty() {
            DimensionState::Conflicting(conflicts.len())
        } else if let Some(d) = ds.first() {
            DimensionState::Consistent(d.value)
        } else {
            DimensionState::Unobserved
        }
    }

    fn no_deduction(&self) -> DimensionError {
        DimensionError::NoDeduction { dimension: self.name.clone() }
    }
}

impl DimensionTracker for Dimension {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_deduction(&mut self, ctx: ContextId, value: usize, source: &str) {
        debug!("{ctx}: {} = {value} (from {source})", self.name);
        self.deductions
            .entry(ctx)
            .or_default()
            .push(Deduction::new(value, source));
    }

    fn check(&self, ctx: ContextId) -> Result<(), DimensionError> {
        let ds = self.deductions.get(&ctx).ok_or_else(|| self.no_deduction())?;

        let conflicts = find_conflicts(ds);
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(DimensionError::Inconsistent { dimension: self.name.clone(), conflicts })
        }
    }

    fn get_value(&self, ctx: ContextId) -> Result<usize, DimensionError> {
        self.check(ctx)?;

        // An entry can exist with no deductions in it, which is different from
        // the context never having been seen, but still has no value.
        self.deductions
            .get(&ctx)
            .and_then(|ds| ds.first())
            .map(|d| d.value)
            .ok_or_else(|| self.no_deduction())
    }

    fn reset(&mut self, ctx: ContextId) {
        if self.deductions.remove(&ctx).is_some() {
            debug!("{ctx}: deductions for {} discarded", self.name);
        }
    }
}

/// Every pair of deductions (in index order) whose values differ.
fn find_conflicts(ds: &[Deduction]) -> Vec<Conflict> {
    (0..ds.len())
        .tuple_combinations::<(usize, usize)>()
        .filter(|&(i, j)| ds[i].value != ds[j].value)
        .map(|(i, j)| Conflict {
            first_index: i,
            second_index: j,
            first: ds[i].clone(),
            second: ds[j].clone(),
        })
        .collect()
}

/// A dimension that can take an arbitrary value.
///
/// Deductions are ignored and checks always pass, but asking for its value
/// is an error since there is none.
#[derive(Debug, Clone)]
pub struct Joker {
    name: String,
}

impl Joker {
    pub fn new<S: ToString>(name: S) -> Self {
        Self { name: name.to_string() }
    }
}

impl Default for Joker {
    fn default() -> Self {
        Self::new("This dimension can take any value.")
    }
}

impl DimensionTracker for Joker {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_deduction(&mut self, _ctx: ContextId, _value: usize, _source: &str) {}

    fn check(&self, _ctx: ContextId) -> Result<(), DimensionError> {
        Ok(())
    }

    fn get_value(&self, _ctx: ContextId) -> Result<usize, DimensionError> {
        Err(DimensionError::Unsupported { dimension: self.name.clone() })
    }

    fn reset(&mut self, _ctx: ContextId) {}
}

/// Either a tracked [`Dimension`] or an unconstrained [`Joker`], chosen per axis.
#[derive(Debug, Clone)]
pub enum AxisTracker {
    Tracked(Dimension),
    Unconstrained(Joker),
}

impl AxisTracker {
    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Self::Unconstrained(_))
    }

    pub fn state(&self, ctx: ContextId) -> DimensionState {
        match self {
            Self::Tracked(dim) => dim.state(ctx),
            Self::Unconstrained(_) => DimensionState::Unconstrained,
        }
    }

    pub fn deductions(&self, ctx: ContextId) -> &[Deduction] {
        match self {
            Self::Tracked(dim) => dim.deductions(ctx),
            Self::Unconstrained(_) => &[],
        }
    }
}

impl DimensionTracker for AxisTracker {
    fn name(&self) -> &str {
        match self {
            Self::Tracked(dim) => dim.name(),
            Self::Unconstrained(joker) => joker.name(),
        }
    }

    fn add_deduction(&mut self, ctx: ContextId, value: usize, source: &str) {
        match self {
            Self::Tracked(dim) => dim.add_deduction(ctx, value, source),
            Self::Unconstrained(joker) => joker.add_deduction(ctx, value, source),
        }
    }

    fn check(&self, ctx: ContextId) -> Result<(), DimensionError> {
        match self {
            Self::Tracked(dim) => dim.check(ctx),
            Self::Unconstrained(joker) => joker.check(ctx),
        }
    }

    fn get_value(&self, ctx: ContextId) -> Result<usize, DimensionError> {
        match self {
            Self::Tracked(dim) => dim.get_value(ctx),
            Self::Unconstrained(joker) => joker.get_value(ctx),
        }
    }

    fn reset(&mut self, ctx: ContextId) {
        match self {
            Self::Tracked(dim) => dim.reset(ctx),
            Self::Unconstrained(joker) => joker.reset(ctx),
        }
    }
}

/// The physical axes whose sizes are tracked during setup.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    serde::Deserialize,
    serde::Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Pressure,
    Latitude,
    Longitude,
    Atmosphere,
    LineOfSight,
}

impl Axis {
    pub const ALL: [Axis; 5] = [
        Axis::Pressure,
        Axis::Latitude,
        Axis::Longitude,
        Axis::Atmosphere,
        Axis::LineOfSight,
    ];

    /// The label used in messages, e.g. "pressure grid".
    pub fn label(&self) -> &'static str {
        match self {
            Axis::Pressure => "pressure grid",
            Axis::Latitude => "latitude grid",
            Axis::Longitude => "longitude grid",
            Axis::Atmosphere => "atmospheric dimension",
            Axis::LineOfSight => "line of sight dimension",
        }
    }

    fn index(&self) -> usize {
        match self {
            Axis::Pressure => 0,
            Axis::Latitude => 1,
            Axis::Longitude => 2,
            Axis::Atmosphere => 3,
            Axis::LineOfSight => 4,
        }
    }
}

/// The state of one axis for a context, for reporting.
#[derive(Debug, Clone)]
pub struct AxisSummary {
    pub axis: Axis,
    pub state: DimensionState,
    pub deductions: Vec<Deduction>,
}

/// One tracker per [`Axis`], plus a standalone joker.
#[derive(Debug, Clone)]
pub struct DimensionRegistry {
    axes: [AxisTracker; 5],
    joker: Joker,
}

impl Default for DimensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DimensionRegistry {
    /// Create a registry where every axis is tracked.
    pub fn new() -> Self {
        Self::with_unconstrained(&[])
    }

    /// Create a registry where the axes in `unconstrained` accept any value.
    pub fn with_unconstrained(unconstrained: &[Axis]) -> Self {
        let axes = Axis::ALL.map(|axis| {
            if unconstrained.contains(&axis) {
                AxisTracker::Unconstrained(Joker::new(axis.label()))
            } else {
                AxisTracker::Tracked(Dimension::new(axis.label()))
            }
        });
        Self { axes, joker: Joker::default() }
    }

    pub fn axis(&self, axis: Axis) -> &AxisTracker {
        &self.axes[axis.index()]
    }

    pub fn axis_mut(&mut self, axis: Axis) -> &mut AxisTracker {
        &mut self.axes[axis.index()]
    }

    pub fn joker(&self) -> &Joker {
        &self.joker
    }

    /// Check every axis that has deductions for `ctx`.
    ///
    /// Axes with no deductions are skipped; use [`DimensionTracker::get_value`]
    /// on a specific axis when its value is required.
    pub fn check_all(&self, ctx: ContextId) -> Result<(), DimensionError> {
        for tracker in self.axes.iter() {
            if tracker.state(ctx) != DimensionState::Unobserved {
                tracker.check(ctx)?;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self, ctx: ContextId) {
        for tracker in self.axes.iter_mut() {
            tracker.reset(ctx);
        }
    }

    pub fn summary(&self, ctx: ContextId) -> Vec<AxisSummary> {
        Axis::ALL
            .iter()
            .map(|&axis| {
                let tracker = self.axis(axis);
                AxisSummary {
                    axis,
                    state: tracker.state(ctx),
                    deductions: tracker.deductions(ctx).to_vec(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[41])]
    #[case(&[41, 41])]
    #[case(&[7, 7, 7, 7, 7])]
    #[case(&[0, 0])]
    fn test_identical_deductions(#[case] values: &[usize]) {
        let ctx = ContextId::new();
        let mut dim = Dimension::new("pressure grid");
        for (i, &v) in values.iter().enumerate() {
            dim.add_deduction(ctx, v, &format!("source{i}"));
        }
        assert!(dim.check(ctx).is_ok());
        assert_eq!(dim.get_value(ctx).unwrap(), values[0]);
        assert_eq!(dim.state(ctx), DimensionState::Consistent(values[0]));
    }

    #[test]
    fn test_all_conflicts_reported() {
        let ctx = ContextId::new();
        let mut dim = Dimension::new("latitude grid");
        dim.add_deduction(ctx, 3, "lat_grid");
        dim.add_deduction(ctx, 4, "t_field");
        dim.add_deduction(ctx, 3, "vmr_field");
        dim.add_deduction(ctx, 5, "H2O field");

        let err = dim.check(ctx).unwrap_err();
        let DimensionError::Inconsistent { dimension, conflicts } = err else {
            panic!("Expected an Inconsistent error");
        };
        assert_eq!(dimension, "latitude grid");
        let pairs = conflicts
            .iter()
            .map(|c| (c.first_index, c.second_index))
            .collect_vec();
        assert_eq!(pairs, vec![(0, 1), (0, 3), (1, 2), (1, 3), (2, 3)]);
        assert_eq!(conflicts[0].first, Deduction::new(3, "lat_grid"));
        assert_eq!(conflicts[0].second, Deduction::new(4, "t_field"));
        assert_eq!(dim.state(ctx), DimensionState::Conflicting(5));
    }

    #[test]
    fn test_sources_do_not_affect_equality() {
        let ctx = ContextId::new();
        let mut dim = Dimension::new("longitude grid");
        dim.add_deduction(ctx, 10, "lon_grid");
        dim.add_deduction(ctx, 10, "lon_grid");
        dim.add_deduction(ctx, 10, "something else");
        assert_eq!(dim.get_value(ctx).unwrap(), 10);
    }

    #[test]
    fn test_no_deduction() {
        let dim = Dimension::new("pressure grid");
        let ctx = ContextId::new();
        assert_eq!(
            dim.check(ctx).unwrap_err(),
            DimensionError::NoDeduction { dimension: "pressure grid".to_string() }
        );
        assert!(matches!(dim.get_value(ctx), Err(DimensionError::NoDeduction { .. })));
        assert_eq!(dim.state(ctx), DimensionState::Unobserved);
    }

    #[test]
    fn test_empty_entry_has_no_value() {
        let ctx = ContextId::new();
        let mut dim = Dimension::new("pressure grid");
        dim.deductions.insert(ctx, vec![]);
        assert!(dim.check(ctx).is_ok());
        assert!(matches!(dim.get_value(ctx), Err(DimensionError::NoDeduction { .. })));
    }

    #[test]
    fn test_check_is_idempotent() {
        let ctx = ContextId::new();
        let mut dim = Dimension::new("pressure grid");
        dim.add_deduction(ctx, 41, "p_grid");
        dim.add_deduction(ctx, 37, "vmr_field");
        let first = dim.check(ctx);
        let second = dim.check(ctx);
        assert!(first.is_err());
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset() {
        let ctx = ContextId::new();
        let mut dim = Dimension::new("pressure grid");
        dim.add_deduction(ctx, 41, "p_grid");
        dim.add_deduction(ctx, 37, "vmr_field");
        dim.reset(ctx);
        assert_eq!(dim.state(ctx), DimensionState::Unobserved);
        dim.add_deduction(ctx, 37, "vmr_field");
        assert_eq!(dim.get_value(ctx).unwrap(), 37);
    }

    #[test]
    fn test_joker() {
        let ctx = ContextId::new();
        let mut joker = Joker::default();
        assert!(joker.check(ctx).is_ok());
        joker.add_deduction(ctx, 1, "a");
        joker.add_deduction(ctx, 2, "b");
        assert!(joker.check(ctx).is_ok());
        assert!(matches!(joker.get_value(ctx), Err(DimensionError::Unsupported { .. })));
    }

    #[test]
    fn test_error_message_lists_sources() {
        let ctx = ContextId::new();
        let mut dim = Dimension::new("pressure grid");
        dim.add_deduction(ctx, 41, "p_grid");
        dim.add_deduction(ctx, 37, "vmr_field");
        let msg = dim.check(ctx).unwrap_err().to_string();
        assert!(msg.contains("pressure grid"), "{msg}");
        assert!(msg.contains("41 deduced from p_grid"), "{msg}");
        assert!(msg.contains("37 deduced from vmr_field"), "{msg}");
    }

    #[test]
    fn test_registry_unconstrained_axes() {
        let ctx = ContextId::new();
        let mut reg = DimensionRegistry::with_unconstrained(&[Axis::LineOfSight]);
        assert!(reg.axis(Axis::LineOfSight).is_unconstrained());
        assert!(!reg.axis(Axis::Pressure).is_unconstrained());

        reg.axis_mut(Axis::LineOfSight).add_deduction(ctx, 1, "sensor_los");
        reg.axis_mut(Axis::LineOfSight).add_deduction(ctx, 2, "mblock_dlos_grid");
        reg.axis_mut(Axis::Pressure).add_deduction(ctx, 41, "p_grid");
        assert!(reg.check_all(ctx).is_ok());
        assert_eq!(reg.axis(Axis::Pressure).get_value(ctx).unwrap(), 41);
        assert_eq!(reg.axis(Axis::LineOfSight).state(ctx), DimensionState::Unconstrained);
    }

    #[test]
    fn test_registry_check_all_and_reset() {
        let ctx = ContextId::new();
        let mut reg = DimensionRegistry::new();
        reg.axis_mut(Axis::Latitude).add_deduction(ctx, 1, "lat_grid");
        reg.axis_mut(Axis::Latitude).add_deduction(ctx, 2, "t_field");
        let err = reg.check_all(ctx).unwrap_err();
        assert_eq!(err.dimension(), "latitude grid");

        reg.reset(ctx);
        assert!(reg.check_all(ctx).is_ok());
        assert!(reg
            .summary(ctx)
            .iter()
            .all(|s| s.state == DimensionState::Unobserved && s.deductions.is_empty()));
    }

    #[rstest]
    #[case("pressure", Axis::Pressure)]
    #[case("line_of_sight", Axis::LineOfSight)]
    fn test_axis_names(#[case] s: &str, #[case] axis: Axis) {
        assert_eq!(s.parse::<Axis>().unwrap(), axis);
        assert_eq!(axis.to_string(), s);
    }
}
