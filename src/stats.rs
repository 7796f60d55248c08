use crate::metrics::{growth_percent, margin_percent, top_n, Growth, Metric};
use crate::schema::{ColumnSet, Dimension, EntityType, FiscalYear, TransactionRow};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Summed revenue / margin over a group of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub revenue: f64,
    pub margin: f64,
    pub count: usize,
}

impl Totals {
    pub fn add(&mut self, revenue: f64, margin: f64) {
        self.revenue += revenue;
        self.margin += margin;
        self.count += 1;
    }

    pub fn add_row(&mut self, row: &TransactionRow) {
        self.add(row.revenue, row.margin);
    }

    pub fn merge(&mut self, other: &Totals) {
        self.revenue += other.revenue;
        self.margin += other.margin;
        self.count += other.count;
    }

    pub fn margin_percent(&self) -> f64 {
        margin_percent(self.revenue, self.margin)
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Revenue => self.revenue,
            Metric::Margin => self.margin,
            Metric::MarginPercent => self.margin_percent(),
            Metric::Transactions => self.count as f64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Name → totals, remembering the order in which names were first seen.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Breakdown {
    entries: Vec<(String, Totals)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Breakdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, revenue: f64, margin: f64) {
        self.slot(key).add(revenue, margin);
    }

    pub fn add_totals(&mut self, key: &str, totals: &Totals) {
        self.slot(key).merge(totals);
    }

    fn slot(&mut self, key: &str) -> &mut Totals {
        let position = match self.index.get(key) {
            Some(position) => *position,
            None => {
                self.entries.push((key.to_string(), Totals::default()));
                self.index.insert(key.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].1
    }

    pub fn get(&self, key: &str) -> Option<&Totals> {
        self.index.get(key).map(|position| &self.entries[*position].1)
    }

    pub fn get_ignore_case(&self, key: &str) -> Option<(&str, &Totals)> {
        let entry = match self.index.get(key) {
            Some(position) => &self.entries[*position],
            None => self
                .entries
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))?,
        };
        Some((entry.0.as_str(), &entry.1))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Totals)> {
        self.entries.iter().map(|(name, totals)| (name.as_str(), totals))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> Totals {
        let mut total = Totals::default();
        for (_, totals) in &self.entries {
            total.merge(totals);
        }
        total
    }

    /// The entry with the highest revenue; the first one seen wins ties.
    pub fn arg_max_revenue(&self) -> Option<(&str, &Totals)> {
        let mut best: Option<(&str, &Totals)> = None;
        for (name, totals) in &self.entries {
            match best {
                Some((_, current)) if totals.revenue <= current.revenue => {}
                _ => best = Some((name.as_str(), totals)),
            }
        }
        best
    }

    /// All entries ordered by `metric`, highest first (stable on ties).
    pub fn ranked(&self, metric: Metric) -> Vec<(&str, &Totals)> {
        top_n(&self.entries, self.entries.len(), |(_, totals)| {
            totals.metric(metric)
        })
        .into_iter()
        .map(|(name, totals)| (name.as_str(), totals))
        .collect()
    }

    pub fn revenues(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, totals)| totals.revenue).collect()
    }
}

/// Pre-aggregated statistics for one entity instance, e.g. partner "Acme".
#[derive(Debug, Clone)]
pub struct EntityStatsRecord {
    pub entity: EntityType,
    pub name: String,
    pub total_revenue: f64,
    pub total_margin: f64,
    pub transaction_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub breakdowns: BTreeMap<Dimension, Breakdown>,
    pub top_region: Option<String>,
    pub best_year: Option<String>,
    pub top_vertical: Option<String>,
    pub top_partner: Option<String>,
    pub top_oem: Option<String>,
}

impl EntityStatsRecord {
    pub fn new(entity: EntityType, name: &str) -> Self {
        Self {
            entity,
            name: name.to_string(),
            total_revenue: 0.0,
            total_margin: 0.0,
            transaction_count: 0,
            first_date: None,
            last_date: None,
            breakdowns: BTreeMap::new(),
            top_region: None,
            best_year: None,
            top_vertical: None,
            top_partner: None,
            top_oem: None,
        }
    }

    pub fn totals(&self) -> Totals {
        Totals {
            revenue: self.total_revenue,
            margin: self.total_margin,
            count: self.transaction_count,
        }
    }

    pub fn margin_percent(&self) -> f64 {
        margin_percent(self.total_revenue, self.total_margin)
    }

    pub fn breakdown(&self, dimension: Dimension) -> Option<&Breakdown> {
        self.breakdowns.get(&dimension)
    }

    pub(crate) fn absorb(&mut self, row: &TransactionRow, dimensions: &[Dimension]) {
        self.total_revenue += row.revenue;
        self.total_margin += row.margin;
        self.transaction_count += 1;

        if let Some(date) = row.posting_date {
            self.first_date = Some(self.first_date.map_or(date, |d| d.min(date)));
            self.last_date = Some(self.last_date.map_or(date, |d| d.max(date)));
        }

        for dimension in dimensions {
            if let Some(key) = row.dimension_value(*dimension) {
                self.breakdowns
                    .entry(*dimension)
                    .or_default()
                    .add(&key, row.revenue, row.margin);
            }
        }
    }

    pub(crate) fn finalize(&mut self) {
        let top = |dimension: Dimension| {
            self.breakdowns
                .get(&dimension)
                .and_then(Breakdown::arg_max_revenue)
                .map(|(name, _)| name.to_string())
        };

        let top_region = top(Dimension::Entity(EntityType::Region));
        let best_year = top(Dimension::Year);
        let top_vertical = top(Dimension::Entity(EntityType::Vertical));
        let top_partner = top(Dimension::Entity(EntityType::Partner));
        let top_oem = top(Dimension::Entity(EntityType::Oem));

        self.top_region = top_region;
        self.best_year = best_year;
        self.top_vertical = top_vertical;
        self.top_partner = top_partner;
        self.top_oem = top_oem;
    }
}

/// All records for one entity type, in first-seen order, with case-insensitive lookup.
#[derive(Debug, Clone)]
pub struct EntityIndex {
    pub entity: EntityType,
    records: Vec<EntityStatsRecord>,
    lookup: HashMap<String, usize>,
}

impl EntityIndex {
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            records: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    pub(crate) fn record_mut(&mut self, name: &str) -> &mut EntityStatsRecord {
        let key = name.to_lowercase();
        let position = match self.lookup.get(&key) {
            Some(position) => *position,
            None => {
                self.records.push(EntityStatsRecord::new(self.entity, name));
                self.lookup.insert(key, self.records.len() - 1);
                self.records.len() - 1
            }
        };
        &mut self.records[position]
    }

    pub(crate) fn finalize(&mut self) {
        for record in &mut self.records {
            record.finalize();
        }
    }

    pub fn get(&self, name: &str) -> Option<&EntityStatsRecord> {
        self.lookup
            .get(&name.trim().to_lowercase())
            .map(|position| &self.records[*position])
    }

    pub fn records(&self) -> &[EntityStatsRecord] {
        &self.records
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_revenue(&self) -> f64 {
        self.records.iter().map(|record| record.total_revenue).sum()
    }

    pub fn ranked(&self, metric: Metric) -> Vec<&EntityStatsRecord> {
        top_n(&self.records, self.records.len(), |record| {
            record.totals().metric(metric)
        })
    }
}

/// Entity types broken down inside each fiscal year and compared year over year.
pub const YEARLY_DIMENSIONS: [EntityType; 6] = [
    EntityType::Channel,
    EntityType::Region,
    EntityType::Partner,
    EntityType::Oem,
    EntityType::Vertical,
    EntityType::EndCustomer,
];

#[derive(Debug, Clone, Serialize)]
pub struct YearStats {
    pub year: FiscalYear,
    pub totals: Totals,
    pub breakdowns: BTreeMap<EntityType, Breakdown>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemComparison {
    pub name: String,
    pub previous: f64,
    pub current: f64,
    pub growth: Growth,
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearComparison {
    pub previous: FiscalYear,
    pub current: FiscalYear,
    pub revenue_growth: Growth,
    pub margin_growth: Growth,
    pub count_growth: Growth,
    pub revenue_delta: f64,
    pub margin_delta: f64,
    pub count_delta: i64,
    /// Change in GM%, in percentage points.
    pub margin_percent_change: f64,
    /// Per-entity revenue comparisons, in order of current-year revenue.
    pub dimensions: BTreeMap<EntityType, Vec<ItemComparison>>,
}

impl YearComparison {
    pub fn key(previous: FiscalYear, current: FiscalYear) -> String {
        format!("{}_to_{}", previous.start, current.start)
    }

    fn between(previous: &YearStats, current: &YearStats) -> Self {
        let mut dimensions = BTreeMap::new();
        for entity in YEARLY_DIMENSIONS {
            let (Some(before), Some(after)) = (
                previous.breakdowns.get(&entity),
                current.breakdowns.get(&entity),
            ) else {
                continue;
            };
            dimensions.insert(entity, compare_breakdowns(before, after));
        }

        Self {
            previous: previous.year,
            current: current.year,
            revenue_growth: growth_percent(current.totals.revenue, previous.totals.revenue),
            margin_growth: growth_percent(current.totals.margin, previous.totals.margin),
            count_growth: growth_percent(
                current.totals.count as f64,
                previous.totals.count as f64,
            ),
            revenue_delta: current.totals.revenue - previous.totals.revenue,
            margin_delta: current.totals.margin - previous.totals.margin,
            count_delta: current.totals.count as i64 - previous.totals.count as i64,
            margin_percent_change: current.totals.margin_percent()
                - previous.totals.margin_percent(),
            dimensions,
        }
    }
}

/// Revenue comparison of every name present in either year.
pub fn compare_breakdowns(previous: &Breakdown, current: &Breakdown) -> Vec<ItemComparison> {
    let mut items: Vec<ItemComparison> = current
        .iter()
        .map(|(name, totals)| (name, totals.revenue))
        .chain(
            previous
                .iter()
                .filter(|(name, _)| current.get(name).is_none())
                .map(|(name, _)| (name, 0.0)),
        )
        .map(|(name, current_revenue)| {
            let previous_revenue = previous.get(name).map_or(0.0, |t| t.revenue);
            ItemComparison {
                name: name.to_string(),
                previous: previous_revenue,
                current: current_revenue,
                growth: growth_percent(current_revenue, previous_revenue),
                delta: current_revenue - previous_revenue,
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.current
            .partial_cmp(&a.current)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    items
}

#[derive(Debug, Clone, Default)]
pub struct YearlyStats {
    pub years: BTreeMap<FiscalYear, YearStats>,
    /// Keyed `"{previous.start}_to_{current.start}"` for each pair of adjacent loaded years.
    pub comparisons: BTreeMap<String, YearComparison>,
}

impl YearlyStats {
    pub fn build(rows: &[TransactionRow], columns: &ColumnSet) -> Self {
        if !columns.has_dimension(Dimension::Year) {
            warn!("No Year column; skipping yearly statistics");
            return Self::default();
        }

        let tracked: Vec<EntityType> = YEARLY_DIMENSIONS
            .into_iter()
            .filter(|entity| columns.has_entity(*entity))
            .collect();

        let mut years: BTreeMap<FiscalYear, YearStats> = BTreeMap::new();
        for row in rows {
            let Some(year) = row.fiscal_year else { continue };
            let stats = years.entry(year).or_insert_with(|| YearStats {
                year,
                totals: Totals::default(),
                breakdowns: BTreeMap::new(),
            });
            stats.totals.add_row(row);
            for entity in &tracked {
                if let Some(name) = row.value(*entity) {
                    stats
                        .breakdowns
                        .entry(*entity)
                        .or_default()
                        .add(name, row.revenue, row.margin);
                }
            }
        }

        let ordered: Vec<&YearStats> = years.values().collect();
        let comparisons = ordered
            .windows(2)
            .map(|pair| {
                let comparison = YearComparison::between(pair[0], pair[1]);
                (YearComparison::key(pair[0].year, pair[1].year), comparison)
            })
            .collect::<BTreeMap<_, _>>();

        debug!(
            "Built yearly stats for {} fiscal years with {} comparisons",
            years.len(),
            comparisons.len()
        );

        Self { years, comparisons }
    }

    pub fn year(&self, year: FiscalYear) -> Option<&YearStats> {
        self.years.get(&year)
    }

    pub fn latest(&self) -> Option<&YearStats> {
        self.years.values().next_back()
    }

    pub fn comparison(&self, previous: FiscalYear, current: FiscalYear) -> Option<&YearComparison> {
        self.comparisons.get(&YearComparison::key(previous, current))
    }

    pub fn labels(&self) -> Vec<String> {
        self.years.keys().map(|year| year.label()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakdown_keeps_first_seen_order_and_ties() {
        let mut breakdown = Breakdown::new();
        breakdown.add("North", 100.0, 10.0);
        breakdown.add("South", 100.0, 30.0);
        breakdown.add("East", 50.0, 5.0);

        let keys: Vec<&str> = breakdown.keys().collect();
        assert_eq!(keys, vec!["North", "South", "East"]);
        assert_eq!(breakdown.arg_max_revenue().unwrap().0, "North");

        breakdown.add("South", 1.0, 0.0);
        assert_eq!(breakdown.arg_max_revenue().unwrap().0, "South");
        assert_eq!(breakdown.get("South").unwrap().count, 2);
        assert_eq!(breakdown.total().count, 4);
    }

    #[test]
    fn test_breakdown_ranked_by_margin() {
        let mut breakdown = Breakdown::new();
        breakdown.add("A", 100.0, 10.0);
        breakdown.add("B", 50.0, 40.0);
        let ranked: Vec<&str> = breakdown
            .ranked(Metric::Margin)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(ranked, vec!["B", "A"]);
        assert_eq!(breakdown.get_ignore_case("b").unwrap().0, "B");
    }

    #[test]
    fn test_yearly_stats_comparisons() {
        let rows = vec![
            TransactionRow::new(100.0, 20.0)
                .with(EntityType::Region, "North")
                .with_year(FiscalYear::new(2022)),
            TransactionRow::new(250.0, 50.0)
                .with(EntityType::Region, "North")
                .with_year(FiscalYear::new(2023)),
            TransactionRow::new(50.0, 5.0)
                .with(EntityType::Region, "West")
                .with_year(FiscalYear::new(2023)),
            TransactionRow::new(999.0, 9.0).with(EntityType::Region, "North"),
        ];
        let columns = crate::normalizer::NormalizedTable::from_rows(rows.clone()).columns;
        let yearly = YearlyStats::build(&rows, &columns);

        assert_eq!(yearly.years.len(), 2);
        assert_eq!(yearly.labels(), vec!["2022-23", "2023-24"]);

        let comparison = &yearly.comparisons["2022_to_2023"];
        assert_eq!(comparison.revenue_growth.to_string(), "+200.0%");
        assert_eq!(comparison.count_delta, 1);

        let regions = &comparison.dimensions[&EntityType::Region];
        assert_eq!(regions[0].name, "North");
        assert_eq!(regions[0].growth.to_string(), "+150.0%");
        assert_eq!(regions[1].name, "West");
        assert_eq!(regions[1].growth, Growth::New);
    }
}
