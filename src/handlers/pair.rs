//! Personnel role × entity questions, e.g. "OEMs handled by business manager Ravi".

use super::entity;
use super::{
    comparison_table, filter_refs, growth_bullets, rank_word, ranked_table, scope_suffix,
    trend_table, HandlerContext,
};
use crate::error::Result;
use crate::intent::{QuerySpec, SubIntent};
use crate::metrics::{
    format_crores, format_percent, herfindahl_index, share_percent, top_n, top_share,
    DependencyLevel,
};
use crate::render::Report;
use crate::schema::{Dimension, EntityType, FiscalYear};
use crate::stats::{compare_breakdowns, Breakdown, EntityStatsRecord, ItemComparison};

pub fn handle(ctx: &HandlerContext<'_>, role: EntityType, entity: EntityType) -> Result<String> {
    ctx.cache.require(role)?;
    ctx.cache.require(entity)?;

    let spec = ctx.spec(&[role, entity]);
    let role_record = ctx.lookup_instance(role, true)?;
    let entity_record = ctx.lookup_instance(entity, true)?;
    let instance_names: Vec<&str> = role_record
        .iter()
        .chain(entity_record.iter())
        .map(|record| record.name.as_str())
        .collect();
    let filters = ctx.filters(&spec, &[role, entity], &instance_names)?;

    match (role_record, entity_record) {
        (Some(person), Some(counterpart)) => pair_detail(ctx, person, counterpart, &spec, &filters),
        (Some(person), None) => role_view(ctx, person, entity, &spec, &filters),
        (None, Some(counterpart)) => counterpart_view(ctx, role, counterpart, &spec, &filters),
        (None, None) => overview(ctx, role, entity, &spec, &filters),
    }
}

fn scope<'r>(
    records: &[&'r EntityStatsRecord],
    filters: &'r [(Dimension, String)],
) -> Vec<(Dimension, &'r str)> {
    let mut scope: Vec<(Dimension, &str)> = records
        .iter()
        .map(|record| (Dimension::Entity(record.entity), record.name.as_str()))
        .collect();
    scope.extend(filter_refs(filters));
    scope
}

/// Everything about one role holder working with one counterpart.
fn pair_detail(
    ctx: &HandlerContext<'_>,
    person: &EntityStatsRecord,
    counterpart: &EntityStatsRecord,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let both = scope(&[person, counterpart], filters);
    let heading = format!(
        "{} {} × {} {}{}",
        person.entity.column(),
        person.name,
        counterpart.entity.column(),
        counterpart.name,
        scope_suffix(filters)
    );

    if spec.intent == SubIntent::Growth {
        let subject = format!("{} with {}", person.name, counterpart.name);
        let (previous, current) = ctx.growth_window(&spec.years, &subject)?;
        let by_year = ctx.cache.breakdown(Dimension::Year, &both)?;
        let before = by_year.get(&previous.label()).copied().unwrap_or_default();
        let after = by_year.get(&current.label()).copied().unwrap_or_default();

        let mut report = Report::new(format!("{}: FY {} → FY {}", heading, previous, current));
        growth_bullets(&mut report, &before, &after);
        report.section("Yearly trend").table(&trend_table(&by_year));
        return Ok(report.finish());
    }

    let totals = ctx.cache.totals(&both)?;
    let person_totals = ctx.cache.totals(&scope(&[person], filters))?;
    let counterpart_totals = ctx.cache.totals(&scope(&[counterpart], filters))?;

    let mut report = Report::new(heading);
    if totals.is_empty() {
        report.line("No transactions between them.");
        return Ok(report.finish());
    }
    report
        .bullet("Revenue", format_crores(totals.revenue))
        .bullet("Margin", format_crores(totals.margin))
        .bullet("GM%", format_percent(totals.margin_percent()))
        .bullet("Transactions", totals.count.to_string())
        .bullet(
            &format!("Share of {}'s revenue", person.name),
            format_percent(share_percent(totals.revenue, person_totals.revenue)),
        )
        .bullet(
            &format!("Share of {}'s revenue", counterpart.name),
            format_percent(share_percent(totals.revenue, counterpart_totals.revenue)),
        );

    let has_year_filter = filters.iter().any(|(dimension, _)| *dimension == Dimension::Year);
    if ctx.cache.has_dimension(Dimension::Year) && !has_year_filter {
        let by_year = ctx.cache.breakdown(Dimension::Year, &both)?;
        if !by_year.is_empty() {
            report.section("Yearly trend").table(&trend_table(&by_year));
        }
    }
    Ok(report.finish())
}

/// One role holder and the counterparts they handle.
fn role_view(
    ctx: &HandlerContext<'_>,
    person: &EntityStatsRecord,
    counterpart: EntityType,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let dimension = Dimension::Entity(counterpart);
    match spec.intent {
        SubIntent::Benchmark => entity::benchmark(ctx, person, spec, filters),
        SubIntent::Breakdown(other) => entity::breakdown_within(ctx, person, other, spec, filters),
        SubIntent::TopN | SubIntent::BottomN | SubIntent::List | SubIntent::Count => {
            entity::within(ctx, person, dimension, spec, filters)
        }
        SubIntent::Growth => {
            let subject = format!("{} {}", person.entity.label(), person.name);
            movers(ctx, &scope(&[person], filters), dimension, spec, &subject, filters)
        }
        SubIntent::Concentration => {
            let handled = ctx.cache.breakdown(dimension, &scope(&[person], filters))?;
            Ok(concentration(
                ctx,
                &format!(
                    "{} {}: dependency on {}{}",
                    person.entity.column(),
                    person.name,
                    counterpart.plural(),
                    scope_suffix(filters)
                ),
                counterpart,
                &handled,
            ))
        }
        SubIntent::Metric(_) | SubIntent::Summary => {
            let handled = ctx.cache.breakdown(dimension, &scope(&[person], filters))?;
            let totals = handled.total();
            let overall = ctx.cache.totals(&filter_refs(filters))?;

            let mut report = Report::new(format!(
                "{} {} with {}{}",
                person.entity.column(),
                person.name,
                counterpart.plural(),
                scope_suffix(filters)
            ));
            report
                .bullet(counterpart.plural(), handled.len().to_string())
                .bullet("Revenue", format_crores(totals.revenue))
                .bullet("GM%", format_percent(totals.margin_percent()))
                .bullet(
                    "Share of overall revenue",
                    format_percent(share_percent(totals.revenue, overall.revenue)),
                );
            if let Some((name, _)) = handled.arg_max_revenue() {
                report.bullet(&format!("Top {}", counterpart.label()), name);
            }
            if let Some(table) = ranked_table(&handled, counterpart.column(), spec) {
                report
                    .section(format!("{} {} by {}", rank_word(spec), spec.n, spec.metric.label()))
                    .table(&table);
            }
            Ok(report.finish())
        }
    }
}

/// The role holders working with one counterpart.
fn counterpart_view(
    ctx: &HandlerContext<'_>,
    role: EntityType,
    counterpart: &EntityStatsRecord,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let dimension = Dimension::Entity(role);
    let subject = format!("{} {}", counterpart.entity.label(), counterpart.name);

    match spec.intent {
        SubIntent::Growth => movers(
            ctx,
            &scope(&[counterpart], filters),
            dimension,
            spec,
            &subject,
            filters,
        ),
        SubIntent::Concentration => {
            let handlers = ctx.cache.breakdown(dimension, &scope(&[counterpart], filters))?;
            Ok(concentration(
                ctx,
                &format!(
                    "{} {}: dependency on {}{}",
                    counterpart.entity.column(),
                    counterpart.name,
                    role.plural(),
                    scope_suffix(filters)
                ),
                role,
                &handlers,
            ))
        }
        _ => {
            let handlers = ctx.cache.breakdown(dimension, &scope(&[counterpart], filters))?;
            let heading = format!(
                "{} handling {} {}{}",
                role.plural(),
                counterpart.entity.column(),
                counterpart.name,
                scope_suffix(filters)
            );
            let mut report = Report::new(heading);
            report.bullet(role.plural(), handlers.len().to_string());
            match ranked_table(&handlers, role.column(), spec) {
                Some(table) => {
                    report.table(&table);
                }
                None => {
                    report.line("No transactions found.");
                }
            }
            Ok(report.finish())
        }
    }
}

/// No instance named on either side.
fn overview(
    ctx: &HandlerContext<'_>,
    role: EntityType,
    counterpart: EntityType,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    match spec.intent {
        SubIntent::TopN
        | SubIntent::BottomN
        | SubIntent::List
        | SubIntent::Count
        | SubIntent::Growth
        | SubIntent::Concentration
        | SubIntent::Benchmark => entity::answer_type(ctx, role, spec, filters),
        SubIntent::Breakdown(_) | SubIntent::Metric(_) | SubIntent::Summary => {
            top_pairs(ctx, role, counterpart, spec, filters)
        }
    }
}

/// Strongest role × counterpart combinations, read from the pair table when the query
/// has no other filter.
fn top_pairs(
    ctx: &HandlerContext<'_>,
    role: EntityType,
    counterpart: EntityType,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let dimensions = [Dimension::Entity(role), Dimension::Entity(counterpart)];
    let mut pairs = Breakdown::new();

    match ctx.cache.combo(&dimensions).filter(|_| filters.is_empty()) {
        Some(table) => {
            let positions: Vec<usize> = dimensions
                .iter()
                .filter_map(|dimension| {
                    table.key().dimensions().iter().position(|d| d == dimension)
                })
                .collect();
            if let [role_at, counterpart_at] = positions[..] {
                for (values, totals) in table.groups() {
                    let label = format!("{} × {}", values[role_at], values[counterpart_at]);
                    pairs.add_totals(&label, totals);
                }
            }
        }
        None => {
            let refs = filter_refs(filters);
            for row in ctx.cache.matching_rows(&refs) {
                if let (Some(person), Some(other)) = (row.value(role), row.value(counterpart)) {
                    pairs.add(&format!("{} × {}", person, other), row.revenue, row.margin);
                }
            }
        }
    }

    let heading = format!(
        "{} {} {} × {} pairs by {}{}",
        rank_word(spec),
        spec.n,
        role.column(),
        counterpart.column(),
        spec.metric.label(),
        scope_suffix(filters)
    );
    let header = format!("{} × {}", role.column(), counterpart.column());
    Ok(match ranked_table(&pairs, &header, spec) {
        Some(table) => Report::new(heading).table(&table).finish(),
        None => format!("{}\nNo matching transactions.", heading),
    })
}

/// Largest gains and declines of `dimension` values inside `base` between two years.
fn movers(
    ctx: &HandlerContext<'_>,
    base: &[(Dimension, &str)],
    dimension: Dimension,
    spec: &QuerySpec,
    subject: &str,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let (previous, current) = ctx.growth_window(&spec.years, subject)?;
    let in_year = |year: FiscalYear| -> Result<Breakdown> {
        let label = year.label();
        let mut scope = base.to_vec();
        scope.push((Dimension::Year, label.as_str()));
        ctx.cache.breakdown(dimension, &scope)
    };
    let before = in_year(previous)?;
    let after = in_year(current)?;

    let mut report = Report::new(format!(
        "Growth for {}{}: FY {} → FY {}",
        subject,
        scope_suffix(filters),
        previous,
        current
    ));
    growth_bullets(&mut report, &before.total(), &after.total());

    let Dimension::Entity(kind) = dimension else {
        return Ok(report.finish());
    };
    let items = compare_breakdowns(&before, &after);
    let gainers: Vec<&ItemComparison> = top_n(&items, spec.n, |item| item.delta)
        .into_iter()
        .filter(|item| item.delta > 0.0)
        .collect();
    let losers: Vec<&ItemComparison> = top_n(&items, spec.n, |item| -item.delta)
        .into_iter()
        .filter(|item| item.delta < 0.0)
        .collect();

    if !gainers.is_empty() {
        report
            .section("Biggest gains")
            .table(&comparison_table(kind, previous, current, &gainers));
    }
    if !losers.is_empty() {
        report
            .section("Biggest declines")
            .table(&comparison_table(kind, previous, current, &losers));
    }
    Ok(report.finish())
}

fn concentration(
    ctx: &HandlerContext<'_>,
    heading: &str,
    kind: EntityType,
    breakdown: &Breakdown,
) -> String {
    let Some((leader, leader_totals)) = breakdown.arg_max_revenue() else {
        return format!("{}\nNo matching transactions.", heading);
    };
    let k = ctx.config.concentration_top_k;
    let revenues = breakdown.revenues();
    let share = share_percent(leader_totals.revenue, breakdown.total().revenue);

    Report::new(heading)
        .bullet(
            &format!("Largest {}", kind.label()),
            format!("{} ({})", leader, format_percent(share)),
        )
        .bullet(&format!("Top {} share", k), format_percent(top_share(&revenues, k)))
        .bullet("HHI", format!("{:.0}", herfindahl_index(&revenues)))
        .bullet("Dependency", DependencyLevel::from_share(share).to_string())
        .bullet(kind.plural(), breakdown.len().to_string())
        .finish()
}
