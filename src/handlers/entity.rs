//! One handler for every entity type, business or personnel.
//!
//! With a named instance ("partner Acme") the answer is about that instance; without
//! one it is about the whole type ("top partners"). Both sides share one table of
//! sub-intent strategies.

use super::{
    chronological, comparison_table, filter_refs, growth_bullets, metric_delta, rank_word,
    ranked_table, ranking_table, scope_suffix, trend_table, HandlerContext,
};
use crate::error::Result;
use crate::intent::{asks_for_ranking, QuerySpec, SubIntent};
use crate::metrics::{
    bottom_n, format_crores, format_percent, growth_percent, herfindahl_index, mean,
    percentile_rank, share_percent, top_n, top_share, DependencyLevel, Metric,
};
use crate::render::{Report, TextTable};
use crate::schema::{Dimension, EntityType, FiscalYear};
use crate::stats::{compare_breakdowns, Breakdown, EntityStatsRecord, ItemComparison, Totals};

pub fn handle(ctx: &HandlerContext<'_>, entity: EntityType) -> Result<String> {
    ctx.cache.require(entity)?;
    let spec = ctx.spec(&[entity]);
    let instance = ctx.resolve_instance(entity, &spec)?;
    let instance_names: Vec<&str> = instance.iter().map(|record| record.name.as_str()).collect();
    let filters = ctx.filters(&spec, &[entity], &instance_names)?;

    match instance {
        Some(record) => answer_instance(ctx, record, &spec, &filters),
        None => answer_type(ctx, entity, &spec, &filters),
    }
}

fn answer_instance(
    ctx: &HandlerContext<'_>,
    record: &EntityStatsRecord,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    match spec.intent {
        SubIntent::Growth => growth(ctx, record, spec, filters),
        SubIntent::Concentration => concentration(ctx, record, spec, filters),
        SubIntent::Benchmark => benchmark(ctx, record, spec, filters),
        SubIntent::Breakdown(dimension) => breakdown_within(ctx, record, dimension, spec, filters),
        SubIntent::TopN | SubIntent::BottomN | SubIntent::List | SubIntent::Count => {
            match spec.secondary {
                Some(dimension) => within(ctx, record, dimension, spec, filters),
                None if spec.intent == SubIntent::Count || spec.intent == SubIntent::List => {
                    summary(ctx, record, filters)
                }
                None => benchmark(ctx, record, spec, filters),
            }
        }
        SubIntent::Metric(metric) => metric_answer(ctx, record, metric, filters),
        SubIntent::Summary => summary(ctx, record, filters),
    }
}

pub(super) fn answer_type(
    ctx: &HandlerContext<'_>,
    entity: EntityType,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    match spec.intent {
        SubIntent::TopN | SubIntent::BottomN => ranking(ctx, entity, spec, filters),
        SubIntent::Growth => growth_ranking(ctx, entity, spec, filters),
        SubIntent::Concentration => type_concentration(ctx, entity, filters),
        SubIntent::Benchmark if asks_for_ranking(ctx.query) => ranking(ctx, entity, spec, filters),
        SubIntent::Benchmark => Err(ctx.missing_name(entity)),
        SubIntent::Breakdown(dimension) => type_breakdown(ctx, entity, dimension, spec, filters),
        SubIntent::Count => count(ctx, entity, filters),
        SubIntent::List => list(ctx, entity, filters),
        SubIntent::Metric(_) | SubIntent::Summary => overview(ctx, entity, spec, filters),
    }
}

fn instance_scope<'r>(
    record: &'r EntityStatsRecord,
    filters: &'r [(Dimension, String)],
) -> Vec<(Dimension, &'r str)> {
    let mut scope = vec![(Dimension::Entity(record.entity), record.name.as_str())];
    scope.extend(filter_refs(filters));
    scope
}

fn scoped_totals(
    ctx: &HandlerContext<'_>,
    record: &EntityStatsRecord,
    filters: &[(Dimension, String)],
) -> Result<Totals> {
    if filters.is_empty() {
        Ok(record.totals())
    } else {
        ctx.cache.totals(&instance_scope(record, filters))
    }
}

fn title(record: &EntityStatsRecord) -> String {
    format!("{} {}", record.entity.column(), record.name)
}

fn summary(
    ctx: &HandlerContext<'_>,
    record: &EntityStatsRecord,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let totals = scoped_totals(ctx, record, filters)?;
    let peers = ctx
        .cache
        .breakdown(Dimension::Entity(record.entity), &filter_refs(filters))?;

    let mut report = Report::new(format!("{}{}", title(record), scope_suffix(filters)));
    report
        .bullet("Revenue", format_crores(totals.revenue))
        .bullet("Margin", format_crores(totals.margin))
        .bullet("GM%", format_percent(totals.margin_percent()))
        .bullet("Transactions", totals.count.to_string())
        .bullet(
            &format!("Share of {} revenue", record.entity.label()),
            format_percent(share_percent(totals.revenue, peers.total().revenue)),
        );

    if filters.is_empty() {
        let highlights = [
            ("Top region", &record.top_region),
            ("Best year", &record.best_year),
            ("Top vertical", &record.top_vertical),
            ("Top partner", &record.top_partner),
            ("Top OEM", &record.top_oem),
        ];
        for (label, value) in highlights {
            if let Some(value) = value {
                report.bullet(label, value);
            }
        }
        if let (Some(first), Some(last)) = (record.first_date, record.last_date) {
            report.bullet("Active", format!("{} to {}", first, last));
        }
    }

    Ok(report.finish())
}

fn metric_answer(
    ctx: &HandlerContext<'_>,
    record: &EntityStatsRecord,
    metric: Metric,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let totals = scoped_totals(ctx, record, filters)?;
    let peers = ctx
        .cache
        .breakdown(Dimension::Entity(record.entity), &filter_refs(filters))?;
    let value = totals.metric(metric);

    let mut report = Report::new(format!(
        "{} for {}{}: {}",
        metric.label(),
        title(record),
        scope_suffix(filters),
        metric.format(value)
    ));

    match metric {
        Metric::MarginPercent => {
            report.bullet(
                &format!("Average GM% across {}", record.entity.plural()),
                format_percent(peers.total().margin_percent()),
            );
        }
        _ => {
            report.bullet(
                &format!("Share of all {}", record.entity.plural()),
                format_percent(share_percent(value, peers.total().metric(metric))),
            );
        }
    }

    let ranked = peers.ranked(metric);
    if let Some(position) = ranked
        .iter()
        .position(|(name, _)| name.eq_ignore_ascii_case(&record.name))
    {
        report.bullet("Rank", format!("{} of {}", position + 1, ranked.len()));
    }

    for other in [
        Metric::Revenue,
        Metric::Margin,
        Metric::MarginPercent,
        Metric::Transactions,
    ] {
        if other != metric {
            report.bullet(other.label(), other.format(totals.metric(other)));
        }
    }

    Ok(report.finish())
}

fn growth(
    ctx: &HandlerContext<'_>,
    record: &EntityStatsRecord,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let subject = format!("{} {}", record.entity.label(), record.name);
    let (previous, current) = ctx.growth_window(&spec.years, &subject)?;
    let by_year = ctx
        .cache
        .breakdown(Dimension::Year, &instance_scope(record, filters))?;

    let before = by_year.get(&previous.label()).copied().unwrap_or_default();
    let after = by_year.get(&current.label()).copied().unwrap_or_default();

    let mut report = Report::new(format!(
        "Growth for {}{}: FY {} → FY {}",
        title(record),
        scope_suffix(filters),
        previous,
        current
    ));
    growth_bullets(&mut report, &before, &after);
    report.section("Yearly trend").table(&trend_table(&by_year));
    Ok(report.finish())
}

fn concentration(
    ctx: &HandlerContext<'_>,
    record: &EntityStatsRecord,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let k = ctx.config.concentration_top_k;
    let dimensions: Vec<Dimension> = match spec.secondary {
        Some(dimension) => vec![dimension],
        None => record
            .breakdowns
            .keys()
            .copied()
            .filter(|dimension| *dimension != Dimension::Year)
            .collect(),
    };

    let scope = instance_scope(record, filters);
    let top_label = format!("Top {} share", k);
    let mut table = TextTable::new([
        "Dimension",
        "Largest",
        "Share",
        top_label.as_str(),
        "HHI",
        "Dependency",
    ]);
    for dimension in dimensions {
        let breakdown = ctx.cache.breakdown(dimension, &scope)?;
        let Some((name, totals)) = breakdown.arg_max_revenue() else {
            continue;
        };
        let revenues = breakdown.revenues();
        let share = share_percent(totals.revenue, breakdown.total().revenue);
        table.row([
            dimension.column().to_string(),
            name.to_string(),
            format_percent(share),
            format_percent(top_share(&revenues, k)),
            format!("{:.0}", herfindahl_index(&revenues)),
            DependencyLevel::from_share(share).to_string(),
        ]);
    }

    let totals = scoped_totals(ctx, record, filters)?;
    let peers = ctx
        .cache
        .breakdown(Dimension::Entity(record.entity), &filter_refs(filters))?;
    let overall = ctx.cache.totals(&filter_refs(filters))?;

    let mut report = Report::new(format!(
        "Concentration for {}{}",
        title(record),
        scope_suffix(filters)
    ));
    report
        .bullet(
            &format!("Contribution to {} revenue", record.entity.label()),
            format_percent(share_percent(totals.revenue, peers.total().revenue)),
        )
        .bullet(
            "Contribution to overall revenue",
            format_percent(share_percent(totals.revenue, overall.revenue)),
        );
    if table.is_empty() {
        report.line("No breakdown data available.");
    } else {
        report.section("Dependency by dimension").table(&table);
    }
    Ok(report.finish())
}

pub(super) fn benchmark(
    ctx: &HandlerContext<'_>,
    record: &EntityStatsRecord,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let metric = spec.metric;
    let peers = ctx
        .cache
        .breakdown(Dimension::Entity(record.entity), &filter_refs(filters))?;
    let ranked = peers.ranked(metric);
    let Some(position) = ranked
        .iter()
        .position(|(name, _)| name.eq_ignore_ascii_case(&record.name))
    else {
        return Ok(format!(
            "{} has no transactions{}.",
            title(record),
            scope_suffix(filters)
        ));
    };

    let values: Vec<f64> = ranked.iter().map(|(_, totals)| totals.metric(metric)).collect();
    let value = values[position];
    let average = mean(&values);
    let (leader, leader_totals) = ranked[0];

    let mut report = Report::new(format!(
        "Benchmark for {} by {}{}",
        title(record),
        metric.label(),
        scope_suffix(filters)
    ));
    report
        .bullet("Rank", format!("{} of {}", position + 1, ranked.len()))
        .bullet(metric.label(), metric.format(value))
        .bullet(
            "Percentile",
            format!("{:.1}", percentile_rank(&values, value)),
        )
        .bullet(
            &format!("{} average", record.entity.column()),
            metric.format(average),
        )
        .bullet("Versus average", metric_delta(metric, value - average));
    if position == 0 {
        report.bullet("Leader", format!("{} (this {})", leader, record.entity.label()));
    } else {
        report.bullet(
            "Leader",
            format!(
                "{} with {} ({} behind)",
                leader,
                metric.format(leader_totals.metric(metric)),
                metric_delta(metric, leader_totals.metric(metric) - value)
            ),
        );
    }

    let shown: Vec<&(&str, &Totals)> = ranked.iter().take(spec.n.max(position + 1)).collect();
    report
        .section(format!("{} ranking", record.entity.column()))
        .table(&ranking_table(
            record.entity.column(),
            &shown,
            &peers.total(),
        ));
    Ok(report.finish())
}

pub(super) fn breakdown_within(
    ctx: &HandlerContext<'_>,
    record: &EntityStatsRecord,
    dimension: Dimension,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let breakdown = ctx.cache.breakdown(dimension, &instance_scope(record, filters))?;
    let mut report = Report::new(format!(
        "{}{} by {}",
        title(record),
        scope_suffix(filters),
        dimension.column()
    ));

    if breakdown.is_empty() {
        report.line("No matching transactions.");
    } else if dimension == Dimension::Year {
        report.table(&trend_table(&breakdown));
    } else {
        let ranked = breakdown.ranked(spec.metric);
        let rows: Vec<&(&str, &Totals)> = ranked.iter().collect();
        report.table(&ranking_table(dimension.column(), &rows, &breakdown.total()));
    }
    Ok(report.finish())
}

/// Top / bottom / list / count of a second dimension inside one instance, e.g.
/// "top OEMs for partner Acme".
pub(super) fn within(
    ctx: &HandlerContext<'_>,
    record: &EntityStatsRecord,
    dimension: Dimension,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let breakdown = ctx.cache.breakdown(dimension, &instance_scope(record, filters))?;
    let scope = format!("{}{}", title(record), scope_suffix(filters));

    match spec.intent {
        SubIntent::Count => Ok(format!(
            "{} has {} {}.",
            scope,
            breakdown.len(),
            dimension.plural()
        )),
        SubIntent::List => Ok(name_list(
            &format!("{} for {}", dimension.plural(), scope),
            &breakdown,
            ctx.config.list_limit,
        )),
        _ => {
            let heading = format!(
                "{} {} {} for {} by {}",
                rank_word(spec),
                spec.n,
                dimension.plural(),
                scope,
                spec.metric.label()
            );
            Ok(match ranked_table(&breakdown, dimension.column(), spec) {
                Some(table) => Report::new(heading).table(&table).finish(),
                None => format!("{}\nNo matching transactions.", heading),
            })
        }
    }
}

fn ranking(
    ctx: &HandlerContext<'_>,
    entity: EntityType,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let breakdown = ctx
        .cache
        .breakdown(Dimension::Entity(entity), &filter_refs(filters))?;
    let heading = format!(
        "{} {} {} by {}{}",
        rank_word(spec),
        spec.n,
        entity.plural(),
        spec.metric.label(),
        scope_suffix(filters)
    );
    Ok(match ranked_table(&breakdown, entity.column(), spec) {
        Some(table) => Report::new(heading).table(&table).finish(),
        None => format!("{}\nNo matching transactions.", heading),
    })
}

fn growth_ranking(
    ctx: &HandlerContext<'_>,
    entity: EntityType,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let (previous, current) = ctx.growth_window(&spec.years, entity.plural())?;
    let base = filter_refs(filters);
    let in_year = |year: FiscalYear| -> Result<Breakdown> {
        let label = year.label();
        let mut scope = base.clone();
        scope.push((Dimension::Year, label.as_str()));
        ctx.cache.breakdown(Dimension::Entity(entity), &scope)
    };
    let before = in_year(previous)?;
    let after = in_year(current)?;
    let items = compare_breakdowns(&before, &after);

    let mut report = Report::new(format!(
        "{} growth{}: FY {} → FY {}",
        entity.column(),
        scope_suffix(filters),
        previous,
        current
    ));
    report
        .bullet(
            "Revenue growth",
            growth_percent(after.total().revenue, before.total().revenue).to_string(),
        )
        .bullet(
            &format!("Active {}", entity.plural()),
            format!("{} → {}", before.len(), after.len()),
        );

    let growers = top_n(&items, spec.n, |item| item.growth.rank_value());
    if !growers.is_empty() {
        report
            .section("Fastest growing")
            .table(&comparison_table(entity, previous, current, &growers));
    }

    let declines: Vec<&ItemComparison> = items.iter().filter(|item| item.growth.is_decline()).collect();
    let decliners = bottom_n(&declines, spec.n, |item| item.growth.rank_value());
    if !decliners.is_empty() {
        let rows: Vec<&ItemComparison> = decliners.into_iter().copied().collect();
        report
            .section("Largest declines")
            .table(&comparison_table(entity, previous, current, &rows));
    }

    Ok(report.finish())
}

fn type_concentration(
    ctx: &HandlerContext<'_>,
    entity: EntityType,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let breakdown = ctx
        .cache
        .breakdown(Dimension::Entity(entity), &filter_refs(filters))?;
    let heading = format!(
        "Revenue concentration across {}{}",
        entity.plural(),
        scope_suffix(filters)
    );
    let Some((leader, leader_totals)) = breakdown.arg_max_revenue() else {
        return Ok(format!("{}\nNo matching transactions.", heading));
    };

    let k = ctx.config.concentration_top_k;
    let revenues = breakdown.revenues();
    let total = breakdown.total();
    let share = share_percent(leader_totals.revenue, total.revenue);

    let mut report = Report::new(heading);
    report
        .bullet("Largest", format!("{} ({})", leader, format_percent(share)))
        .bullet(&format!("Top {} share", k), format_percent(top_share(&revenues, k)))
        .bullet("HHI", format!("{:.0}", herfindahl_index(&revenues)))
        .bullet(
            &format!("Dependency on largest {}", entity.label()),
            DependencyLevel::from_share(share).to_string(),
        );

    let entries: Vec<(&str, &Totals)> = breakdown.iter().collect();
    let top = top_n(&entries, k, |entry| entry.1.revenue);
    report
        .section(format!("Top {} contributors", k))
        .table(&ranking_table(entity.column(), &top, &total));
    Ok(report.finish())
}

/// Per value of `dimension`: revenue of the type's rows, how many instances are active
/// there and which one leads.
fn type_breakdown(
    ctx: &HandlerContext<'_>,
    entity: EntityType,
    dimension: Dimension,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let base = filter_refs(filters);
    let by_dimension = ctx.cache.breakdown(dimension, &base)?;
    let values: Vec<String> = if dimension == Dimension::Year {
        chronological(&by_dimension)
            .into_iter()
            .map(|(year, _)| year.label())
            .collect()
    } else {
        by_dimension
            .ranked(spec.metric)
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect()
    };

    let count_header = format!("Active {}", entity.plural());
    let top_header = format!("Top {}", entity.column());
    let mut table = TextTable::new([
        dimension.column(),
        "Revenue",
        "GM%",
        count_header.as_str(),
        top_header.as_str(),
    ]);
    for value in &values {
        let mut scope = base.clone();
        scope.push((dimension, value.as_str()));
        let per_entity = ctx.cache.breakdown(Dimension::Entity(entity), &scope)?;
        if per_entity.is_empty() {
            continue;
        }
        let totals = per_entity.total();
        let leader = per_entity.arg_max_revenue().map_or("-", |(name, _)| name);
        table.row([
            value.clone(),
            format_crores(totals.revenue),
            format_percent(totals.margin_percent()),
            per_entity.len().to_string(),
            leader.to_string(),
        ]);
    }

    let heading = format!(
        "{} by {}{}",
        entity.plural(),
        dimension.column(),
        scope_suffix(filters)
    );
    Ok(if table.is_empty() {
        format!("{}\nNo matching transactions.", heading)
    } else {
        Report::new(heading).table(&table).finish()
    })
}

fn count(
    ctx: &HandlerContext<'_>,
    entity: EntityType,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let breakdown = ctx
        .cache
        .breakdown(Dimension::Entity(entity), &filter_refs(filters))?;
    let totals = breakdown.total();
    let mut report = Report::new(format!(
        "There are {} {}{}.",
        breakdown.len(),
        entity.plural(),
        scope_suffix(filters)
    ));
    report
        .bullet("Revenue covered", format_crores(totals.revenue))
        .bullet("Transactions", totals.count.to_string());
    Ok(report.finish())
}

fn list(
    ctx: &HandlerContext<'_>,
    entity: EntityType,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let breakdown = ctx
        .cache
        .breakdown(Dimension::Entity(entity), &filter_refs(filters))?;
    Ok(name_list(
        &format!("{}{}", entity.plural(), scope_suffix(filters)),
        &breakdown,
        ctx.config.list_limit,
    ))
}

/// `"Partners (3): A, B, C"`, highest revenue first, truncated to `limit` names.
pub(crate) fn name_list(heading: &str, breakdown: &Breakdown, limit: usize) -> String {
    let ranked = breakdown.ranked(Metric::Revenue);
    if ranked.is_empty() {
        return format!("{}: none found.", heading);
    }
    let names: Vec<&str> = ranked.iter().take(limit).map(|(name, _)| *name).collect();
    let mut text = format!("{} ({}): {}", heading, ranked.len(), names.join(", "));
    if ranked.len() > limit {
        text.push_str(&format!(" and {} more", ranked.len() - limit));
    }
    text
}

fn overview(
    ctx: &HandlerContext<'_>,
    entity: EntityType,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let breakdown = ctx
        .cache
        .breakdown(Dimension::Entity(entity), &filter_refs(filters))?;
    let totals = breakdown.total();

    let mut report = Report::new(format!("{} overview{}", entity.plural(), scope_suffix(filters)));
    report
        .bullet(entity.plural(), breakdown.len().to_string())
        .bullet("Revenue", format_crores(totals.revenue))
        .bullet("Margin", format_crores(totals.margin))
        .bullet("GM%", format_percent(totals.margin_percent()))
        .bullet("Transactions", totals.count.to_string());

    if let Some(table) = ranked_table(&breakdown, entity.column(), spec) {
        report
            .section(format!("Top {} by {}", spec.n, spec.metric.label()))
            .table(&table);
    }
    Ok(report.finish())
}
