use itertools::Itertools;
use parts_rs::{context::SimulationContext, species::AbsorptionSpecies};
use tabled::{
    settings::{Alignment, Style},
    Table, Tabled,
};

#[derive(Tabled)]
struct AxisRow {
    axis: &'static str,
    value: String,
    sources: String,
}

#[derive(Tabled)]
struct SpeciesRow {
    index: usize,
    tag: String,
    jacobian: String,
    retrieval: String,
}

pub(crate) fn dimension_table(ctx: &SimulationContext) -> String {
    let rows = ctx.dimensions()
        .summary(ctx.id())
        .into_iter()
        .map(|s| AxisRow {
            axis: s.axis.label(),
            value: s.state.to_string(),
            sources: s.deductions.iter().map(|d| d.to_string()).join("; "),
        });

    let mut table = Table::new(rows);
    table.with(Style::blank()).with(Alignment::left());
    table.to_string()
}

pub(crate) fn species_table(species: &[AbsorptionSpecies]) -> String {
    let rows = species.iter().enumerate().map(|(i, s)| SpeciesRow {
        index: s.index().unwrap_or(i),
        tag: s.tag_string(),
        jacobian: s.jacobian()
            .map(|j| format!("{} ({})", j.method, j.unit.arts_name()))
            .unwrap_or_else(|| "-".to_string()),
        retrieval: s.retrieval()
            .map(|r| format!("{} ({})", r.jacobian.method, r.jacobian.unit.arts_name()))
            .unwrap_or_else(|| "-".to_string()),
    });

    let mut table = Table::new(rows);
    table.with(Style::blank()).with(Alignment::left());
    table.to_string()
}
