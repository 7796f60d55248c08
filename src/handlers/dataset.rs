//! Questions about the whole dataset, and the literal table commands.

use super::entity;
use super::{
    comparison_table, filter_refs, growth_bullets, ranking_table, scope_suffix, trend_table,
    HandlerContext,
};
use crate::classifier::SpecialCommand;
use crate::error::{Result, SalesQueryError};
use crate::intent::{QuerySpec, SubIntent};
use crate::metrics::{
    format_crores, format_percent, herfindahl_index, share_percent, top_share, DependencyLevel,
    Metric,
};
use crate::render::{Report, TextTable};
use crate::schema::{Dimension, EntityType, FiscalYear};
use crate::stats::{compare_breakdowns, Breakdown, ItemComparison, Totals, YearStats};
use std::collections::BTreeMap;

const DATASET: &str = "the dataset";

const HELP_TOPICS: [(&str, &[&str]); 4] = [
    (
        "Totals and trends",
        &[
            "What's the total revenue?",
            "How many transactions do we have?",
            "Compare sales between years",
            "Revenue growth from 2022 to 2023",
        ],
    ),
    (
        "Business entities",
        &[
            "Show top partners by revenue",
            "Revenue for partner <name> in 2023",
            "Show regional performance for an OEM",
            "Bottom 3 verticals by GM%",
            "How dependent is customer <name> on its top partner?",
        ],
    ),
    (
        "People",
        &[
            "OEMs handled by business manager <name>",
            "Top partners for channel champ <name>",
            "How does vertical champ <name> rank against peers?",
        ],
    ),
    (
        "Commands",
        &[
            "regional table: revenue by region and fiscal year",
            "yearly table: revenue, margin and growth per fiscal year",
            "dataset summary: headline numbers for the loaded data",
            "help: this list",
        ],
    ),
];

pub fn handle(ctx: &HandlerContext<'_>) -> Result<String> {
    let spec = ctx.spec(&[]);
    let filters = ctx.filters(&spec, &[], &[])?;

    match spec.intent {
        SubIntent::Growth => year_comparison(ctx, &spec, &filters),
        SubIntent::Count => counts(ctx, &filters),
        SubIntent::Breakdown(dimension) => dimension_table(ctx, dimension, &spec, &filters),
        SubIntent::Concentration => concentration(ctx, &filters),
        SubIntent::TopN | SubIntent::BottomN | SubIntent::List => match spec.secondary {
            Some(Dimension::Entity(entity)) => entity::answer_type(ctx, entity, &spec, &filters),
            Some(Dimension::Year) => dimension_table(ctx, Dimension::Year, &spec, &filters),
            None => summary(ctx, &filters),
        },
        SubIntent::Metric(metric) => overall_metric(ctx, metric, &filters),
        SubIntent::Benchmark | SubIntent::Summary => summary(ctx, &filters),
    }
}

pub fn run_command(ctx: &HandlerContext<'_>, command: SpecialCommand) -> Result<String> {
    match command {
        SpecialCommand::RegionalTable => regional_table(ctx),
        SpecialCommand::YearlyTable => {
            let by_year = ctx.cache.breakdown(Dimension::Year, &[])?;
            Ok(Report::new("Yearly performance")
                .table(&trend_table(&by_year))
                .finish())
        }
        SpecialCommand::DatasetSummary => summary(ctx, &[]),
        SpecialCommand::Help => Ok(help()),
    }
}

fn summary(ctx: &HandlerContext<'_>, filters: &[(Dimension, String)]) -> Result<String> {
    let totals = ctx.cache.totals(&filter_refs(filters))?;
    let mut report = Report::new(format!("Dataset summary{}", scope_suffix(filters)));
    report
        .bullet("Transactions", totals.count.to_string())
        .bullet("Revenue", format_crores(totals.revenue))
        .bullet("Margin", format_crores(totals.margin))
        .bullet("GM%", format_percent(totals.margin_percent()));

    let labels = ctx.cache.yearly().labels();
    if !labels.is_empty() {
        report.bullet("Fiscal years", labels.join(", "));
    }

    for kind in EntityType::BUSINESS {
        if !ctx.cache.has_dimension(Dimension::Entity(kind)) {
            continue;
        }
        let breakdown = ctx
            .cache
            .breakdown(Dimension::Entity(kind), &filter_refs(filters))?;
        if let Some((name, leader)) = breakdown.arg_max_revenue() {
            report.bullet(
                &format!("Top {}", kind.label()),
                format!(
                    "{} ({} of {}, {})",
                    name,
                    format_crores(leader.revenue),
                    breakdown.len(),
                    format_percent(share_percent(leader.revenue, totals.revenue))
                ),
            );
        }
    }

    if filters.is_empty() {
        if let [.., previous, current] = ctx.cache.years()[..] {
            if let Some(comparison) = ctx.cache.yearly().comparison(previous, current) {
                report.bullet(
                    "Latest revenue growth",
                    format!("{} (FY {} → FY {})", comparison.revenue_growth, previous, current),
                );
            }
        }
    }
    Ok(report.finish())
}

fn overall_metric(
    ctx: &HandlerContext<'_>,
    metric: Metric,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let totals = ctx.cache.totals(&filter_refs(filters))?;
    let mut report = Report::new(format!(
        "Overall {}{}: {}",
        metric.label(),
        scope_suffix(filters),
        metric.format(totals.metric(metric))
    ));
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

fn counts(ctx: &HandlerContext<'_>, filters: &[(Dimension, String)]) -> Result<String> {
    let totals = ctx.cache.totals(&filter_refs(filters))?;
    let mut report = Report::new(format!("Dataset counts{}", scope_suffix(filters)));
    report.bullet("Transactions", totals.count.to_string());

    for kind in EntityType::ALL {
        if !ctx.cache.has_dimension(Dimension::Entity(kind)) {
            continue;
        }
        let distinct = ctx
            .cache
            .breakdown(Dimension::Entity(kind), &filter_refs(filters))?
            .len();
        report.bullet(kind.plural(), distinct.to_string());
    }

    if ctx.cache.has_dimension(Dimension::Year) {
        report.bullet("Fiscal years", ctx.cache.years().len().to_string());
    }
    Ok(report.finish())
}

fn dimension_table(
    ctx: &HandlerContext<'_>,
    dimension: Dimension,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let breakdown = ctx.cache.breakdown(dimension, &filter_refs(filters))?;
    let mut report = Report::new(format!(
        "{} by {}{}",
        spec.metric.label(),
        dimension.column(),
        scope_suffix(filters)
    ));

    if breakdown.is_empty() {
        report.line("No matching transactions.");
    } else if dimension == Dimension::Year {
        report.table(&trend_table(&breakdown));
    } else {
        let ranked = breakdown.ranked(spec.metric);
        let shown: Vec<&(&str, &Totals)> = ranked.iter().take(ctx.config.list_limit).collect();
        report.table(&ranking_table(dimension.column(), &shown, &breakdown.total()));
        if ranked.len() > shown.len() {
            report.line(format!("... and {} more", ranked.len() - shown.len()));
        }
    }
    Ok(report.finish())
}

fn concentration(ctx: &HandlerContext<'_>, filters: &[(Dimension, String)]) -> Result<String> {
    let k = ctx.config.concentration_top_k;
    let top_k = format!("Top {}", k);
    let mut table = TextTable::new([
        "Dimension",
        "Largest",
        "Share",
        top_k.as_str(),
        "HHI",
        "Dependency",
    ]);

    for kind in EntityType::BUSINESS {
        if !ctx.cache.has_dimension(Dimension::Entity(kind)) {
            continue;
        }
        let breakdown = ctx
            .cache
            .breakdown(Dimension::Entity(kind), &filter_refs(filters))?;
        let Some((leader, leader_totals)) = breakdown.arg_max_revenue() else {
            continue;
        };
        let revenues = breakdown.revenues();
        let share = share_percent(leader_totals.revenue, breakdown.total().revenue);
        table.row([
            kind.column().to_string(),
            leader.to_string(),
            format_percent(share),
            format_percent(top_share(&revenues, k)),
            format!("{:.0}", herfindahl_index(&revenues)),
            DependencyLevel::from_share(share).to_string(),
        ]);
    }

    let mut report = Report::new(format!("Revenue concentration{}", scope_suffix(filters)));
    if table.is_empty() {
        report.line("No entity columns loaded.");
    } else {
        report.table(&table);
    }
    Ok(report.finish())
}

fn year_stats<'a>(ctx: &HandlerContext<'a>, year: FiscalYear) -> Result<&'a YearStats> {
    ctx.cache
        .yearly()
        .year(year)
        .ok_or_else(|| SalesQueryError::YearNotFound {
            year: year.label(),
            available: ctx.cache.yearly().labels(),
        })
}

fn year_comparison(
    ctx: &HandlerContext<'_>,
    spec: &QuerySpec,
    filters: &[(Dimension, String)],
) -> Result<String> {
    let (previous, current) = ctx.growth_window(&spec.years, DATASET)?;
    let mut report = Report::new(format!(
        "Dataset growth{}: FY {} → FY {}",
        scope_suffix(filters),
        previous,
        current
    ));

    if !filters.is_empty() {
        let by_year = ctx.cache.breakdown(Dimension::Year, &filter_refs(filters))?;
        let before = by_year.get(&previous.label()).copied().unwrap_or_default();
        let after = by_year.get(&current.label()).copied().unwrap_or_default();
        growth_bullets(&mut report, &before, &after);
        report.section("Yearly trend").table(&trend_table(&by_year));
        return Ok(report.finish());
    }

    let before = year_stats(ctx, previous)?;
    let after = year_stats(ctx, current)?;
    growth_bullets(&mut report, &before.totals, &after.totals);

    let movers: BTreeMap<EntityType, Vec<ItemComparison>> =
        match ctx.cache.yearly().comparison(previous, current) {
            Some(comparison) => comparison.dimensions.clone(),
            None => before
                .breakdowns
                .iter()
                .filter_map(|(kind, earlier)| {
                    let later = after.breakdowns.get(kind)?;
                    Some((*kind, compare_breakdowns(earlier, later)))
                })
                .collect(),
        };

    let mut leaders = TextTable::new([
        "Dimension",
        "Top gainer",
        "Change",
        "Top decliner",
        "Change",
    ]);
    for (kind, items) in &movers {
        let gainer = items
            .iter()
            .filter(|item| item.delta > 0.0)
            .max_by(|a, b| a.delta.total_cmp(&b.delta));
        let decliner = items
            .iter()
            .filter(|item| item.delta < 0.0)
            .min_by(|a, b| a.delta.total_cmp(&b.delta));
        if gainer.is_none() && decliner.is_none() {
            continue;
        }
        let cell = |item: Option<&ItemComparison>| -> (String, String) {
            item.map_or_else(
                || ("-".to_string(), "-".to_string()),
                |item| (item.name.clone(), item.growth.to_string()),
            )
        };
        let (gainer_name, gainer_growth) = cell(gainer);
        let (decliner_name, decliner_growth) = cell(decliner);
        leaders.row([
            kind.column().to_string(),
            gainer_name,
            gainer_growth,
            decliner_name,
            decliner_growth,
        ]);
    }
    if !leaders.is_empty() {
        report.section("Biggest movers").table(&leaders);
    }

    if let Some(items) = movers.get(&EntityType::Partner) {
        let shown: Vec<&ItemComparison> = items.iter().take(spec.n).collect();
        if !shown.is_empty() {
            report
                .section(format!("Top {} partners by FY {} revenue", shown.len(), current))
                .table(&comparison_table(EntityType::Partner, previous, current, &shown));
        }
    }

    let by_year = ctx.cache.breakdown(Dimension::Year, &[])?;
    report.section("Yearly trend").table(&trend_table(&by_year));
    Ok(report.finish())
}

/// Region × fiscal year revenue matrix with a total row.
fn regional_table(ctx: &HandlerContext<'_>) -> Result<String> {
    let region = Dimension::Entity(EntityType::Region);
    let regions = ctx.cache.breakdown(region, &[])?;
    let years = ctx.cache.years();

    let mut headers = vec!["Region".to_string()];
    headers.extend(years.iter().map(|year| year.label()));
    headers.extend(["Total", "GM%", "Share"].map(String::from));
    let mut table = TextTable::new(headers);

    let overall = regions.total();
    let mut year_totals = Breakdown::new();
    for (name, totals) in regions.ranked(Metric::Revenue) {
        let by_year = if years.is_empty() {
            Breakdown::new()
        } else {
            ctx.cache.breakdown(Dimension::Year, &[(region, name)])?
        };
        let mut cells = vec![name.to_string()];
        for year in &years {
            let label = year.label();
            match by_year.get(&label) {
                Some(in_year) => {
                    year_totals.add_totals(&label, in_year);
                    cells.push(format_crores(in_year.revenue));
                }
                None => cells.push("-".to_string()),
            }
        }
        cells.push(format_crores(totals.revenue));
        cells.push(format_percent(totals.margin_percent()));
        cells.push(format_percent(share_percent(totals.revenue, overall.revenue)));
        table.row(cells);
    }

    if table.is_empty() {
        return Ok("Regional performance\nNo regional data.".to_string());
    }

    let mut cells = vec!["Total".to_string()];
    cells.extend(years.iter().map(|year| {
        year_totals
            .get(&year.label())
            .map_or_else(|| "-".to_string(), |totals| format_crores(totals.revenue))
    }));
    cells.push(format_crores(overall.revenue));
    cells.push(format_percent(overall.margin_percent()));
    cells.push(format_percent(100.0));
    table.row(cells);

    Ok(Report::new("Regional performance").table(&table).finish())
}

fn help() -> String {
    let mut report = Report::new("Ask about revenue, margin, GM% or transactions. For example:");
    for (heading, examples) in HELP_TOPICS {
        report.section(heading);
        for example in examples {
            report.line(format!("- {}", example));
        }
    }
    report.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SalesCache;
    use crate::classifier::NameIndex;
    use crate::config::EngineConfig;
    use crate::query::QueryText;
    use crate::schema::TransactionRow;

    fn rows() -> Vec<TransactionRow> {
        let row = |partner: &str, region: &str, year: i32, revenue: f64, margin: f64| {
            TransactionRow::new(revenue, margin)
                .with(EntityType::Partner, partner)
                .with(EntityType::Region, region)
                .with_year(FiscalYear::new(year))
        };
        vec![
            row("A", "North", 2022, 100.0, 20.0),
            row("A", "South", 2023, 200.0, 50.0),
            row("B", "North", 2023, 50.0, 10.0),
        ]
    }

    fn with_context<T>(
        rows: Vec<TransactionRow>,
        text: &str,
        f: impl FnOnce(&HandlerContext<'_>) -> T,
    ) -> T {
        let cache = SalesCache::from_rows(rows);
        let names = NameIndex::from_cache(&cache);
        let config = EngineConfig::default();
        let query = QueryText::new(text);
        let ctx = HandlerContext {
            cache: &cache,
            names: &names,
            config: &config,
            query: &query,
        };
        f(&ctx)
    }

    fn ask(text: &str) -> Result<String> {
        with_context(rows(), text, handle)
    }

    #[test]
    fn test_total_revenue() {
        let answer = ask("What's the total revenue?").unwrap();
        assert!(answer.starts_with("Overall Revenue: ₹0.00 Cr (₹350.00)"));
        assert!(answer.contains("Transactions: 3"));
    }

    #[test]
    fn test_counts() {
        let answer = ask("How many transactions do we have?").unwrap();
        assert!(answer.contains("Transactions: 3"));
        assert!(answer.contains("Partners: 2"));
        assert!(answer.contains("Fiscal years: 2"));
    }

    #[test]
    fn test_year_comparison() {
        let answer = ask("Compare sales between years").unwrap();
        assert!(answer.starts_with("Dataset growth: FY 2022-23 → FY 2023-24"));
        assert!(answer.contains("Revenue growth: +150.0%"));
        assert!(answer.contains("Biggest movers"));
        assert!(answer.contains("South"));
    }

    #[test]
    fn test_growth_needs_two_years() {
        let single = vec![TransactionRow::new(10.0, 1.0)
            .with(EntityType::Partner, "A")
            .with_year(FiscalYear::new(2023))];
        let result = with_context(single, "revenue growth year over year", handle);
        assert!(matches!(result, Err(SalesQueryError::InsufficientYears { .. })));
    }

    #[test]
    fn test_regional_table() {
        let answer = with_context(rows(), "regional table", |ctx| {
            run_command(ctx, SpecialCommand::RegionalTable)
        })
        .unwrap();
        let lines: Vec<&str> = answer.lines().collect();
        assert_eq!(lines[0], "Regional performance");
        assert!(lines[1].contains("2022-23") && lines[1].contains("2023-24"));
        assert!(lines[3].starts_with("South"));
        assert!(lines.last().unwrap().starts_with("Total"));
        assert!(lines.last().unwrap().ends_with("100.0%"));
    }

    #[test]
    fn test_help_lists_commands() {
        let answer =
            with_context(rows(), "help", |ctx| run_command(ctx, SpecialCommand::Help)).unwrap();
        assert!(answer.contains("- regional table"));
        assert!(answer.contains("Show top partners by revenue"));
    }
}
