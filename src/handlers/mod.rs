//! Query handlers and the context they share.
//!
//! Each handler reads its sub-intent from [`QuerySpec`] and answers from the
//! [`SalesCache`]. Handlers return `Result<String>`; only the assistant boundary turns
//! an error into user-facing text.

pub mod dataset;
pub mod entity;
pub mod pair;

use crate::cache::SalesCache;
use crate::classifier::{entity_keywords, NameIndex};
use crate::config::EngineConfig;
use crate::error::{Result, SalesQueryError};
use crate::intent::{is_filler_word, QuerySpec, SubIntent};
use crate::metrics::{
    bottom_n, format_crore_delta, format_crores, format_percent, growth_percent, share_percent,
    top_n, Metric,
};
use crate::query::{normalize_words, QueryText};
use crate::render::{Report, TextTable};
use crate::schema::{Dimension, EntityType, FiscalYear};
use crate::stats::{Breakdown, EntityStatsRecord, ItemComparison, Totals};
use crate::utils::parse_fiscal_year;
use log::debug;

/// Business types that may narrow an answer when one of their names appears.
const SECONDARY_FILTER_TYPES: [EntityType; 6] = [
    EntityType::Region,
    EntityType::Oem,
    EntityType::Partner,
    EntityType::Vertical,
    EntityType::EndCustomer,
    EntityType::Channel,
];

/// Shortest name accepted as a secondary filter.
const MIN_FILTER_NAME_LEN: usize = 3;

/// Owned `(dimension, value)` filters, as collected from a query.
pub type Filters = Vec<(Dimension, String)>;

pub fn filter_refs(filters: &[(Dimension, String)]) -> Vec<(Dimension, &str)> {
    filters
        .iter()
        .map(|(dimension, value)| (*dimension, value.as_str()))
        .collect()
}

/// `" (Region North, FY 2023-24)"`, or nothing when there are no filters.
pub fn scope_suffix(filters: &[(Dimension, String)]) -> String {
    if filters.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = filters
        .iter()
        .map(|(dimension, value)| match dimension {
            Dimension::Year => format!("FY {}", value),
            Dimension::Entity(entity) => format!("{} {}", entity.column(), value),
        })
        .collect();
    format!(" ({})", parts.join(", "))
}

/// Sub-intents that only make sense about a named instance.
fn needs_instance(intent: SubIntent) -> bool {
    matches!(
        intent,
        SubIntent::Summary
            | SubIntent::Metric(_)
            | SubIntent::Benchmark
            | SubIntent::Growth
            | SubIntent::Concentration
    )
}

/// Everything a handler reads while answering one query.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub cache: &'a SalesCache,
    pub names: &'a NameIndex,
    pub config: &'a EngineConfig,
    pub query: &'a QueryText,
}

impl<'a> HandlerContext<'a> {
    pub fn spec(&self, primary: &[EntityType]) -> QuerySpec {
        QuerySpec::parse(self.query, primary, self.config)
    }

    /// Up to `sample_names` valid names of `entity`, closest to `near` first.
    pub fn samples(&self, entity: EntityType, near: Option<&str>) -> Vec<String> {
        let Some(index) = self.cache.entities(entity) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = index
            .ranked(Metric::Revenue)
            .into_iter()
            .map(|record| record.name.as_str())
            .collect();

        if let Some(near) = near {
            let near = normalize_words(near);
            names.sort_by(|a, b| {
                let score_a = strsim::jaro_winkler(&near, &normalize_words(a));
                let score_b = strsim::jaro_winkler(&near, &normalize_words(b));
                score_b
                    .partial_cmp(&score_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        names
            .into_iter()
            .take(self.config.sample_names)
            .map(str::to_string)
            .collect()
    }

    pub fn not_found(&self, entity: EntityType, name: &str) -> SalesQueryError {
        SalesQueryError::EntityNotFound {
            entity: entity.label().to_string(),
            name: name.to_string(),
            samples: self.samples(entity, Some(name)),
        }
    }

    pub fn missing_name(&self, entity: EntityType) -> SalesQueryError {
        SalesQueryError::MissingEntityName {
            entity: entity.label().to_string(),
            samples: self.samples(entity, None),
        }
    }

    /// The name the user seems to have typed after `entity`'s keyword, if it is not a
    /// known name of some other type.
    pub fn candidate_name(&self, entity: EntityType) -> Option<String> {
        let words: Vec<String> = self
            .query
            .words_after(entity_keywords(entity))
            .into_iter()
            .skip_while(|word| is_filler_word(word))
            .take_while(|word| !is_filler_word(word))
            .collect();
        if words.is_empty() {
            return None;
        }

        let candidate = words.join(" ");
        let belongs_elsewhere = EntityType::ALL
            .iter()
            .filter(|other| **other != entity)
            .any(|other| {
                self.names
                    .names(*other)
                    .any(|name| normalize_words(name) == candidate)
            });
        (!belongs_elsewhere).then_some(candidate)
    }

    /// The instance of `entity` the query is about.
    ///
    /// A live name in the query wins (longest first). Otherwise a name typed after the
    /// type keyword is looked up with Jaro-Winkler similarity; a close enough match is
    /// accepted and anything else is reported as not found. The unknown name is only
    /// dropped when the question still makes sense about the whole type: a plain
    /// ranking, list or count with no other grouping named.
    pub fn resolve_instance(
        &self,
        entity: EntityType,
        spec: &QuerySpec,
    ) -> Result<Option<&'a EntityStatsRecord>> {
        self.lookup_instance(entity, needs_instance(spec.intent) || spec.secondary.is_some())
    }

    /// Like [`resolve_instance`](Self::resolve_instance), with the caller deciding
    /// whether an unknown typed name is an error (`strict`) or ignored.
    pub fn lookup_instance(
        &self,
        entity: EntityType,
        strict: bool,
    ) -> Result<Option<&'a EntityStatsRecord>> {
        if let Some(name) = self.names.find(entity, self.query, 1) {
            return Ok(self.cache.entity(entity, name));
        }

        let Some(candidate) = self.candidate_name(entity) else {
            return Ok(None);
        };

        let best = self.names.names(entity).fold(None, |best: Option<(&str, f64)>, name| {
            let score = strsim::jaro_winkler(&candidate, &normalize_words(name));
            match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((name, score)),
            }
        });

        if let Some((name, score)) = best {
            if score >= self.config.fuzzy_match_threshold {
                debug!(
                    "Matched '{}' to {} '{}' (similarity {:.3})",
                    candidate,
                    entity.label(),
                    name,
                    score
                );
                return Ok(self.cache.entity(entity, name));
            }
        }

        if strict {
            let typed = self.query.original_spelling(&candidate).unwrap_or(candidate);
            Err(self.not_found(entity, &typed))
        } else {
            Ok(None)
        }
    }

    /// A name of another business type that narrows the answer, e.g. a region in
    /// "revenue of partner A in North".
    pub fn secondary_filter(
        &self,
        exclude: &[EntityType],
        instance_names: &[&str],
    ) -> Option<(Dimension, String)> {
        let query = self.query.without(instance_names);
        SECONDARY_FILTER_TYPES
            .iter()
            .filter(|entity| !exclude.contains(entity))
            .filter(|entity| self.cache.has_dimension(Dimension::Entity(**entity)))
            .find_map(|entity| {
                self.names
                    .find(*entity, &query, MIN_FILTER_NAME_LEN)
                    .map(|name| (Dimension::Entity(*entity), name.to_string()))
            })
    }

    /// Label of a loaded fiscal year, or `YearNotFound`.
    pub fn check_year(&self, year: FiscalYear) -> Result<String> {
        if !self.cache.has_dimension(Dimension::Year) {
            return Err(SalesQueryError::MissingColumn(
                Dimension::Year.column().to_string(),
            ));
        }
        if self.cache.yearly().year(year).is_some() {
            Ok(year.label())
        } else {
            Err(SalesQueryError::YearNotFound {
                year: year.label(),
                available: self.cache.yearly().labels(),
            })
        }
    }

    /// The two years a growth answer compares.
    ///
    /// Two years named: those two, earlier first. One year named: that year against
    /// the one before it. None: the two most recent loaded years.
    pub fn growth_window(
        &self,
        years: &[FiscalYear],
        subject: &str,
    ) -> Result<(FiscalYear, FiscalYear)> {
        let loaded = self.cache.years();
        let (previous, current) = match years {
            [] => match loaded.as_slice() {
                [.., previous, current] => (*previous, *current),
                _ => {
                    if !self.cache.has_dimension(Dimension::Year) {
                        return Err(SalesQueryError::MissingColumn(
                            Dimension::Year.column().to_string(),
                        ));
                    }
                    return Err(SalesQueryError::InsufficientYears {
                        subject: subject.to_string(),
                    });
                }
            },
            [only] => (only.previous(), *only),
            [first, second, ..] => (*first.min(second), *first.max(second)),
        };

        if previous == current {
            return Err(SalesQueryError::InsufficientYears {
                subject: subject.to_string(),
            });
        }
        self.check_year(current)?;
        self.check_year(previous)?;
        Ok((previous, current))
    }

    /// Secondary-name and year filters for a handler whose own types are `exclude`.
    pub fn filters(
        &self,
        spec: &QuerySpec,
        exclude: &[EntityType],
        instance_names: &[&str],
    ) -> Result<Filters> {
        let mut filters = Filters::new();
        if let Some(filter) = self.secondary_filter(exclude, instance_names) {
            filters.push(filter);
        }
        if spec.intent != SubIntent::Growth {
            if let Some(year) = spec.year() {
                filters.push((Dimension::Year, self.check_year(year)?));
            }
        }
        Ok(filters)
    }
}

/// Chronological view of a year breakdown: `(year, totals)` in fiscal order.
pub fn chronological(breakdown: &Breakdown) -> Vec<(FiscalYear, Totals)> {
    let mut years: Vec<(FiscalYear, Totals)> = breakdown
        .iter()
        .filter_map(|(label, totals)| parse_fiscal_year(label).map(|year| (year, *totals)))
        .collect();
    years.sort_by_key(|(year, _)| *year);
    years
}

/// Revenue / margin / GM% / transaction movement between two periods.
pub fn growth_bullets(report: &mut Report, before: &Totals, after: &Totals) {
    report
        .bullet(
            "Revenue growth",
            format!(
                "{} ({} → {}, {})",
                growth_percent(after.revenue, before.revenue),
                format_crores(before.revenue),
                format_crores(after.revenue),
                format_crore_delta(after.revenue - before.revenue)
            ),
        )
        .bullet(
            "Margin growth",
            format!(
                "{} ({} → {}, {})",
                growth_percent(after.margin, before.margin),
                format_crores(before.margin),
                format_crores(after.margin),
                format_crore_delta(after.margin - before.margin)
            ),
        )
        .bullet(
            "GM% change",
            format!(
                "{:+.1} pts ({} → {})",
                after.margin_percent() - before.margin_percent(),
                format_percent(before.margin_percent()),
                format_percent(after.margin_percent())
            ),
        )
        .bullet(
            "Transactions",
            format!(
                "{} → {} ({})",
                before.count,
                after.count,
                growth_percent(after.count as f64, before.count as f64)
            ),
        );
}

/// Fiscal years in order with year-over-year revenue growth.
pub fn trend_table(by_year: &Breakdown) -> TextTable {
    let mut table = TextTable::new(["Year", "Revenue", "Margin", "GM%", "Txns", "YoY"]);
    let mut previous: Option<Totals> = None;
    for (year, totals) in chronological(by_year) {
        let yoy = previous.map_or_else(
            || "-".to_string(),
            |before| growth_percent(totals.revenue, before.revenue).to_string(),
        );
        table.row([
            year.label(),
            format_crores(totals.revenue),
            format_crores(totals.margin),
            format_percent(totals.margin_percent()),
            totals.count.to_string(),
            yoy,
        ]);
        previous = Some(totals);
    }
    table
}

/// Numbered rows with revenue, margin and share of `total` revenue.
pub fn ranking_table(header: &str, rows: &[&(&str, &Totals)], total: &Totals) -> TextTable {
    let mut table = TextTable::new(["#", header, "Revenue", "Margin", "GM%", "Txns", "Share"]);
    for (position, (name, totals)) in rows.iter().enumerate() {
        table.row([
            (position + 1).to_string(),
            name.to_string(),
            format_crores(totals.revenue),
            format_crores(totals.margin),
            format_percent(totals.margin_percent()),
            totals.count.to_string(),
            format_percent(share_percent(totals.revenue, total.revenue)),
        ]);
    }
    table
}

/// The `n` best (or worst, for a bottom-N query) entries of `breakdown` by `metric`.
pub fn ranked_table(breakdown: &Breakdown, header: &str, spec: &QuerySpec) -> Option<TextTable> {
    let entries: Vec<(&str, &Totals)> = breakdown.iter().collect();
    let key = |entry: &(&str, &Totals)| entry.1.metric(spec.metric);
    let chosen = if spec.intent == SubIntent::BottomN {
        bottom_n(&entries, spec.n, key)
    } else {
        top_n(&entries, spec.n, key)
    };
    if chosen.is_empty() {
        return None;
    }
    Some(ranking_table(header, &chosen, &breakdown.total()))
}

/// `"Top"` or `"Bottom"`, for titles.
pub fn rank_word(spec: &QuerySpec) -> &'static str {
    if spec.intent == SubIntent::BottomN {
        "Bottom"
    } else {
        "Top"
    }
}

/// Signed difference in a metric's own unit.
pub fn metric_delta(metric: Metric, delta: f64) -> String {
    match metric {
        Metric::Revenue | Metric::Margin => format_crore_delta(delta),
        Metric::MarginPercent => format!("{:+.1} pts", delta),
        Metric::Transactions => format!("{:+.0}", delta),
    }
}

/// Per-name revenue in two fiscal years.
pub fn comparison_table(
    entity: EntityType,
    previous: FiscalYear,
    current: FiscalYear,
    items: &[&ItemComparison],
) -> TextTable {
    let before = format!("FY {}", previous);
    let after = format!("FY {}", current);
    let mut table = TextTable::new([
        "#",
        entity.column(),
        before.as_str(),
        after.as_str(),
        "Growth",
        "Change",
    ]);
    for (position, item) in items.iter().enumerate() {
        table.row([
            (position + 1).to_string(),
            item.name.clone(),
            format_crores(item.previous),
            format_crores(item.current),
            item.growth.to_string(),
            metric_delta(Metric::Revenue, item.delta),
        ]);
    }
    table
}
