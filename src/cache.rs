//! The aggregation cache, built once per dataset load.
//!
//! The build walks the normalized rows and produces:
//! - one [`EntityIndex`] per entity column present (name → [`EntityStatsRecord`]),
//! - one [`DimensionComboTable`] for every pair of present dimensions plus the fixed
//!   [`TRIPLE_COMBOS`] list,
//! - [`YearlyStats`] with adjacent-year comparisons.
//!
//! A missing column only skips the families that depend on it. The cache is never
//! mutated after [`CacheBuilder::build`] returns; a reload builds a fresh one.

use crate::error::{Result, SalesQueryError};
use crate::normalizer::{unify_name_spellings, NormalizeStats, NormalizedTable};
use crate::schema::{ColumnSet, Dimension, EntityType, FiscalYear, TransactionRow};
use crate::stats::{Breakdown, EntityIndex, EntityStatsRecord, Totals, YearlyStats};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use Dimension::Year;
use EntityType::*;

const fn e(entity: EntityType) -> Dimension {
    Dimension::Entity(entity)
}

/// Explicitly chosen three-way groupings, on top of every pairwise combination.
pub const TRIPLE_COMBOS: [[Dimension; 3]; 17] = [
    [e(Partner), e(Oem), e(Region)],
    [e(Partner), e(Oem), Year],
    [e(Partner), e(Region), Year],
    [e(Oem), e(Region), Year],
    [e(Region), e(Vertical), Year],
    [e(Partner), e(EndCustomer), Year],
    [e(Oem), e(EndCustomer), Year],
    [e(Oem), e(Vertical), Year],
    [e(Partner), e(Vertical), Year],
    [e(Region), e(Channel), Year],
    [e(Partner), e(Channel), Year],
    [e(Oem), e(BusinessHead), Year],
    [e(Oem), e(GroupBusinessManager), Year],
    [e(Oem), e(BusinessManager), Year],
    [e(Partner), e(GroupChannelChamp), Year],
    [e(Partner), e(ChannelChamp), Year],
    [e(EndCustomer), e(VerticalChamp), Year],
];

/// Dimensions every entity record is broken down by, when the column exists.
const RECORD_BREAKDOWNS: [Dimension; 5] = [
    e(Region),
    Year,
    e(Vertical),
    e(Partner),
    e(Oem),
];

/// Canonical identity of a grouping: its dimensions in [`Dimension`] order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComboKey(Vec<Dimension>);

impl ComboKey {
    pub fn new(dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        let mut dimensions: Vec<Dimension> = dimensions.into_iter().collect();
        dimensions.sort();
        dimensions.dedup();
        Self(dimensions)
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.0
    }

    pub fn contains(&self, dimension: Dimension) -> bool {
        self.0.contains(&dimension)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ComboKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|d| d.column()).collect();
        f.write_str(&names.join("+"))
    }
}

/// Rows grouped by every distinct value combination of a [`ComboKey`].
///
/// Only rows carrying a value for every dimension of the key are grouped.
#[derive(Debug, Clone)]
pub struct DimensionComboTable {
    key: ComboKey,
    groups: Vec<(Vec<String>, Totals)>,
    index: HashMap<Vec<String>, usize>,
}

impl DimensionComboTable {
    pub fn build(key: ComboKey, rows: &[TransactionRow]) -> Self {
        let mut table = Self {
            key,
            groups: Vec::new(),
            index: HashMap::new(),
        };

        for row in rows {
            let values: Option<Vec<String>> = table
                .key
                .dimensions()
                .iter()
                .map(|dimension| row.dimension_value(*dimension))
                .collect();
            let Some(values) = values else { continue };

            let position = match table.index.get(&values) {
                Some(position) => *position,
                None => {
                    table.groups.push((values.clone(), Totals::default()));
                    table.index.insert(values, table.groups.len() - 1);
                    table.groups.len() - 1
                }
            };
            table.groups[position].1.add_row(row);
        }

        table
    }

    pub fn key(&self) -> &ComboKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&[String], &Totals)> {
        self.groups
            .iter()
            .map(|(values, totals)| (values.as_slice(), totals))
    }

    /// Exact lookup; `values` must follow the key's dimension order.
    pub fn get(&self, values: &[&str]) -> Option<&Totals> {
        let owned: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        self.index.get(&owned).map(|position| &self.groups[*position].1)
    }

    fn position(&self, dimension: Dimension) -> Option<usize> {
        self.key.dimensions().iter().position(|d| *d == dimension)
    }

    fn filter_positions(&self, filters: &[(Dimension, &str)]) -> Option<Vec<(usize, String)>> {
        filters
            .iter()
            .map(|(dimension, value)| {
                self.position(*dimension)
                    .map(|position| (position, value.to_lowercase()))
            })
            .collect()
    }

    fn matching<'a>(
        &'a self,
        positions: &'a [(usize, String)],
    ) -> impl Iterator<Item = &'a (Vec<String>, Totals)> + 'a {
        self.groups.iter().filter(move |(values, _)| {
            positions
                .iter()
                .all(|(position, expected)| values[*position].to_lowercase() == *expected)
        })
    }

    /// Sums the groups matching `filters` (case-insensitive) by the value of `by`.
    ///
    /// Returns `None` when `by` or a filter dimension is not part of this table.
    pub fn rollup(&self, by: Dimension, filters: &[(Dimension, &str)]) -> Option<Breakdown> {
        let by_position = self.position(by)?;
        let positions = self.filter_positions(filters)?;

        let mut breakdown = Breakdown::new();
        for (values, totals) in self.matching(&positions) {
            breakdown.add_totals(&values[by_position], totals);
        }
        Some(breakdown)
    }

    pub fn filtered_total(&self, filters: &[(Dimension, &str)]) -> Option<Totals> {
        let positions = self.filter_positions(filters)?;
        let mut total = Totals::default();
        for (_, totals) in self.matching(&positions) {
            total.merge(totals);
        }
        Some(total)
    }
}

/// Cache build options.
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    pub include_triples: bool,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self {
            include_triples: true,
        }
    }
}

impl CacheBuilder {
    pub fn new(include_triples: bool) -> Self {
        Self { include_triples }
    }

    pub fn build(&self, table: NormalizedTable) -> SalesCache {
        let NormalizedTable {
            mut rows,
            columns,
            mut stats,
        } = table;

        stats.merged_spellings += unify_name_spellings(&mut rows);
        if stats.merged_spellings > 0 {
            warn!(
                "{} name cells differ from an earlier spelling only by case; grouped under the first",
                stats.merged_spellings
            );
        }

        let mut totals = Totals::default();
        for row in &rows {
            totals.add_row(row);
        }

        let entities = build_entity_indexes(&rows, &columns);
        let combos = self.build_combos(&rows, &columns);
        let yearly = YearlyStats::build(&rows, &columns);

        info!(
            "Built sales cache: {} rows, {} entity types, {} combination tables, {} fiscal years",
            rows.len(),
            entities.len(),
            combos.len(),
            yearly.years.len()
        );

        SalesCache {
            rows,
            columns,
            stats,
            totals,
            entities,
            combos,
            yearly,
        }
    }

    fn build_combos(
        &self,
        rows: &[TransactionRow],
        columns: &ColumnSet,
    ) -> BTreeMap<ComboKey, DimensionComboTable> {
        let present: Vec<Dimension> = Dimension::all()
            .filter(|dimension| columns.has_dimension(*dimension))
            .collect();

        let mut keys: Vec<ComboKey> = Vec::new();
        for (i, first) in present.iter().enumerate() {
            for second in &present[i + 1..] {
                keys.push(ComboKey::new([*first, *second]));
            }
        }

        if self.include_triples {
            for triple in TRIPLE_COMBOS {
                match triple.iter().find(|d| !columns.has_dimension(**d)) {
                    Some(missing) => debug!(
                        "Skipping combination {} (no '{}' column)",
                        ComboKey::new(triple),
                        missing
                    ),
                    None => keys.push(ComboKey::new(triple)),
                }
            }
        }

        keys.into_iter()
            .map(|key| {
                let table = DimensionComboTable::build(key.clone(), rows);
                (key, table)
            })
            .collect()
    }
}

fn build_entity_indexes(
    rows: &[TransactionRow],
    columns: &ColumnSet,
) -> BTreeMap<EntityType, EntityIndex> {
    let mut indexes = BTreeMap::new();

    for entity in EntityType::ALL {
        if !columns.has_entity(entity) {
            warn!(
                "No '{}' column; skipping {} statistics",
                entity.column(),
                entity.label()
            );
            continue;
        }

        let breakdowns: Vec<Dimension> = RECORD_BREAKDOWNS
            .into_iter()
            .filter(|d| *d != Dimension::Entity(entity) && columns.has_dimension(*d))
            .collect();

        let mut index = EntityIndex::new(entity);
        for row in rows {
            if let Some(name) = row.value(entity) {
                index.record_mut(name).absorb(row, &breakdowns);
            }
        }
        index.finalize();

        debug!("Indexed {} distinct {} values", index.len(), entity.label());
        indexes.insert(entity, index);
    }

    indexes
}

/// One immutable generation of the loaded dataset and everything derived from it.
#[derive(Debug, Clone)]
pub struct SalesCache {
    rows: Vec<TransactionRow>,
    columns: ColumnSet,
    stats: NormalizeStats,
    totals: Totals,
    entities: BTreeMap<EntityType, EntityIndex>,
    combos: BTreeMap<ComboKey, DimensionComboTable>,
    yearly: YearlyStats,
}

impl SalesCache {
    pub fn build(table: NormalizedTable) -> Self {
        CacheBuilder::default().build(table)
    }

    pub fn from_rows(rows: Vec<TransactionRow>) -> Self {
        Self::build(NormalizedTable::from_rows(rows))
    }

    pub fn rows(&self) -> &[TransactionRow] {
        &self.rows
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn normalize_stats(&self) -> &NormalizeStats {
        &self.stats
    }

    pub fn overall(&self) -> Totals {
        self.totals
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_dimension(&self, dimension: Dimension) -> bool {
        self.columns.has_dimension(dimension)
    }

    pub fn entities(&self, entity: EntityType) -> Option<&EntityIndex> {
        self.entities.get(&entity)
    }

    /// The index for `entity`, or a `MissingColumn` error.
    pub fn require(&self, entity: EntityType) -> Result<&EntityIndex> {
        self.entities
            .get(&entity)
            .ok_or_else(|| SalesQueryError::MissingColumn(entity.column().to_string()))
    }

    pub fn entity(&self, entity: EntityType, name: &str) -> Option<&EntityStatsRecord> {
        self.entities.get(&entity).and_then(|index| index.get(name))
    }

    pub fn names(&self, entity: EntityType) -> Vec<&str> {
        self.entities
            .get(&entity)
            .map(|index| index.names().collect())
            .unwrap_or_default()
    }

    pub fn yearly(&self) -> &YearlyStats {
        &self.yearly
    }

    pub fn years(&self) -> Vec<FiscalYear> {
        self.yearly.years.keys().copied().collect()
    }

    pub fn combo(&self, dimensions: &[Dimension]) -> Option<&DimensionComboTable> {
        self.combos.get(&ComboKey::new(dimensions.iter().copied()))
    }

    pub fn combo_keys(&self) -> impl Iterator<Item = &ComboKey> {
        self.combos.keys()
    }

    fn check_dimension(&self, dimension: Dimension) -> Result<()> {
        if self.has_dimension(dimension) {
            Ok(())
        } else {
            Err(SalesQueryError::MissingColumn(dimension.column().to_string()))
        }
    }

    /// Totals of `by` values over the rows matching every filter.
    ///
    /// Served from the precomputed table whose dimensions are exactly `by` plus the
    /// filter dimensions; falls back to a row scan when no such table exists.
    pub fn breakdown(&self, by: Dimension, filters: &[(Dimension, &str)]) -> Result<Breakdown> {
        self.check_dimension(by)?;
        for (dimension, _) in filters {
            self.check_dimension(*dimension)?;
        }

        if filters.is_empty() {
            return Ok(self.unfiltered_breakdown(by));
        }

        let key = ComboKey::new(std::iter::once(by).chain(filters.iter().map(|(d, _)| *d)));
        if let Some(table) = self.combos.get(&key) {
            if let Some(breakdown) = table.rollup(by, filters) {
                return Ok(breakdown);
            }
        }

        debug!("No precomputed table for {}; scanning rows", key);
        let mut breakdown = Breakdown::new();
        for row in self.matching_rows(filters) {
            if let Some(value) = row.dimension_value(by) {
                breakdown.add(&value, row.revenue, row.margin);
            }
        }
        Ok(breakdown)
    }

    fn unfiltered_breakdown(&self, by: Dimension) -> Breakdown {
        let mut breakdown = Breakdown::new();
        match by {
            Dimension::Entity(entity) => {
                if let Some(index) = self.entities.get(&entity) {
                    for record in index.records() {
                        breakdown.add_totals(&record.name, &record.totals());
                    }
                }
            }
            Dimension::Year => {
                for (year, stats) in &self.yearly.years {
                    breakdown.add_totals(&year.label(), &stats.totals);
                }
            }
        }
        breakdown
    }

    /// Totals over the rows matching every filter.
    pub fn totals(&self, filters: &[(Dimension, &str)]) -> Result<Totals> {
        for (dimension, _) in filters {
            self.check_dimension(*dimension)?;
        }

        match filters {
            [] => Ok(self.totals),
            [(Dimension::Entity(entity), name)] => Ok(self
                .entity(*entity, name)
                .map(EntityStatsRecord::totals)
                .unwrap_or_default()),
            [(Dimension::Year, label)] => Ok(self
                .yearly
                .years
                .values()
                .find(|stats| stats.year.label() == *label)
                .map(|stats| stats.totals)
                .unwrap_or_default()),
            _ => {
                let key = ComboKey::new(filters.iter().map(|(d, _)| *d));
                if let Some(total) = self
                    .combos
                    .get(&key)
                    .and_then(|table| table.filtered_total(filters))
                {
                    return Ok(total);
                }

                debug!("No precomputed table for {}; scanning rows", key);
                let mut total = Totals::default();
                for row in self.matching_rows(filters) {
                    total.add_row(row);
                }
                Ok(total)
            }
        }
    }

    pub fn matching_rows<'a>(
        &'a self,
        filters: &'a [(Dimension, &'a str)],
    ) -> impl Iterator<Item = &'a TransactionRow> + 'a {
        self.rows.iter().filter(move |row| {
            filters
                .iter()
                .all(|(dimension, value)| row.matches(*dimension, value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_rows() -> Vec<TransactionRow> {
        vec![
            TransactionRow::new(100.0, 20.0)
                .with(Partner, "A")
                .with(Region, "North")
                .with(Oem, "Dell")
                .with_year(FiscalYear::new(2022)),
            TransactionRow::new(200.0, 50.0)
                .with(Partner, "A")
                .with(Region, "South")
                .with(Oem, "HP")
                .with_year(FiscalYear::new(2023)),
            TransactionRow::new(50.0, 10.0)
                .with(Partner, "B")
                .with(Region, "North")
                .with(Oem, "Dell")
                .with_year(FiscalYear::new(2023)),
            TransactionRow::new(70.0, 7.0).with(Region, "North"),
        ]
    }

    #[test]
    fn test_combo_key_is_canonical() {
        let a = ComboKey::new([Year, e(Region), e(Partner)]);
        let b = ComboKey::new([e(Partner), Year, e(Region)]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Partner+Region+Year");
    }

    #[test]
    fn test_entity_records() {
        let cache = SalesCache::from_rows(sample_rows());
        let a = cache.entity(Partner, "a").unwrap();

        assert_eq!(a.name, "A");
        assert_eq!(a.total_revenue, 300.0);
        assert_eq!(a.total_margin, 70.0);
        assert_eq!(a.transaction_count, 2);
        assert_eq!(a.top_region.as_deref(), Some("South"));
        assert_eq!(a.best_year.as_deref(), Some("2023-24"));
        assert_eq!(a.top_oem.as_deref(), Some("HP"));
        assert!(a.top_partner.is_none());
        assert!(a.breakdown(e(Partner)).is_none());

        let north = cache.entity(Region, "North").unwrap();
        assert_eq!(north.total_revenue, 220.0);
        assert_eq!(north.transaction_count, 3);
    }

    #[test]
    fn test_missing_column_skips_only_dependent_family() {
        let cache = SalesCache::from_rows(sample_rows());
        assert!(cache.entities(Vertical).is_none());
        assert!(cache.require(Vertical).is_err());
        assert!(cache.entities(Partner).is_some());
        assert!(cache.combo(&[e(Partner), e(Vertical)]).is_none());
        assert!(cache.combo(&[e(Partner), e(Region)]).is_some());
        assert!(cache.combo(&[e(Partner), e(Oem), e(Region)]).is_some());
        assert!(matches!(
            cache.breakdown(e(Vertical), &[]),
            Err(SalesQueryError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_breakdown_uses_exact_tables() {
        let cache = SalesCache::from_rows(sample_rows());

        let by_region = cache.breakdown(e(Region), &[(e(Partner), "A")]).unwrap();
        assert_eq!(by_region.get("North").unwrap().revenue, 100.0);
        assert_eq!(by_region.get("South").unwrap().revenue, 200.0);

        let all_regions = cache.breakdown(e(Region), &[]).unwrap();
        assert_eq!(all_regions.get("North").unwrap().revenue, 220.0);

        let by_oem = cache
            .breakdown(e(Oem), &[(e(Region), "north"), (Year, "2023-24")])
            .unwrap();
        assert_eq!(by_oem.len(), 1);
        assert_eq!(by_oem.get("Dell").unwrap().revenue, 50.0);

        let by_year = cache.breakdown(Year, &[(e(Partner), "A")]).unwrap();
        assert_eq!(by_year.keys().collect::<Vec<_>>(), vec!["2022-23", "2023-24"]);
    }

    #[test]
    fn test_case_variants_share_one_key() {
        let cache = SalesCache::from_rows(vec![
            TransactionRow::new(100.0, 20.0)
                .with(Partner, "Acme")
                .with_year(FiscalYear::new(2022)),
            TransactionRow::new(200.0, 40.0)
                .with(Partner, "ACME")
                .with_year(FiscalYear::new(2023)),
        ]);
        assert_eq!(cache.normalize_stats().merged_spellings, 1);
        assert_eq!(cache.entities(Partner).unwrap().records().len(), 1);

        let in_2023 = cache.breakdown(e(Partner), &[(Year, "2023-24")]).unwrap();
        assert_eq!(in_2023.keys().collect::<Vec<_>>(), vec!["Acme"]);

        let by_year = cache.breakdown(Year, &[(e(Partner), "Acme")]).unwrap();
        assert_eq!(by_year.total().revenue, 300.0);
    }

    #[test]
    fn test_totals_with_filters() {
        let cache = SalesCache::from_rows(sample_rows());
        assert_eq!(cache.totals(&[]).unwrap().revenue, 420.0);
        assert_eq!(cache.totals(&[(e(Partner), "A")]).unwrap().revenue, 300.0);
        assert_eq!(cache.totals(&[(Year, "2023-24")]).unwrap().revenue, 250.0);
        let pair = cache
            .totals(&[(e(Partner), "A"), (Year, "2023-24")])
            .unwrap();
        assert_eq!(pair.revenue, 200.0);
        assert_eq!(pair.count, 1);
        assert_eq!(cache.totals(&[(e(Partner), "Nobody")]).unwrap().count, 0);
    }

    #[test]
    fn test_triples_can_be_disabled() {
        let cache = CacheBuilder::new(false).build(NormalizedTable::from_rows(sample_rows()));
        assert!(cache.combo(&[e(Partner), e(Oem), e(Region)]).is_none());
        assert!(cache.combo(&[e(Partner), e(Oem)]).is_some());
        let by_oem = cache
            .breakdown(e(Oem), &[(e(Region), "North"), (Year, "2023-24")])
            .unwrap();
        assert_eq!(by_oem.get("Dell").unwrap().revenue, 50.0);
    }

    fn arb_name() -> impl Strategy<Value = Option<&'static str>> {
        prop::option::of(prop::sample::select(vec!["A", "B", "C"]))
    }

    fn arb_row() -> impl Strategy<Value = TransactionRow> {
        (arb_name(), arb_name(), arb_name(), 0u32..10_000, 0u32..1_000).prop_map(
            |(partner, region, oem, revenue, margin)| {
                let mut row = TransactionRow::new(revenue as f64, margin as f64);
                row.partner = partner.map(str::to_string);
                row.region = region.map(|r| format!("R{}", r));
                row.oem = oem.map(|o| format!("O{}", o));
                row
            },
        )
    }

    proptest! {
        #[test]
        fn aggregation_conserves_revenue(rows in prop::collection::vec(arb_row(), 1..60)) {
            let cache = SalesCache::from_rows(rows.clone());
            for entity in [Partner, Region, Oem] {
                let expected: f64 = rows
                    .iter()
                    .filter(|row| row.value(entity).is_some())
                    .map(|row| row.revenue)
                    .sum();
                let actual = cache.entities(entity).map_or(0.0, |index| index.total_revenue());
                prop_assert!((expected - actual).abs() < 1e-6);
            }
        }
    }
}
