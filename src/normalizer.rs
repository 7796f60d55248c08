//! Column-name normalization and row typing.
//!
//! Source exports spell the same column many ways ("Partner Name", "partner_name",
//! "PARTNER"). Headers are folded to a lowercase, single-spaced key and looked up in
//! an alias table; cells are then typed into [`TransactionRow`]s. Nothing here fails:
//! bad cells are counted and skipped field-by-field.

use crate::ingestion::RawTable;
use crate::schema::{CanonicalColumn, ColumnSet, EntityType, TransactionRow};
use crate::utils::{is_blank, parse_amount, parse_fiscal_year, parse_posting_date};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const ALIASES: &[(&str, CanonicalColumn)] = &[
    ("partner", CanonicalColumn::Entity(EntityType::Partner)),
    ("partner name", CanonicalColumn::Entity(EntityType::Partner)),
    ("reseller", CanonicalColumn::Entity(EntityType::Partner)),
    ("oem", CanonicalColumn::Entity(EntityType::Oem)),
    ("oem name", CanonicalColumn::Entity(EntityType::Oem)),
    ("vendor", CanonicalColumn::Entity(EntityType::Oem)),
    ("brand", CanonicalColumn::Entity(EntityType::Oem)),
    ("region", CanonicalColumn::Entity(EntityType::Region)),
    ("zone", CanonicalColumn::Entity(EntityType::Region)),
    ("sales region", CanonicalColumn::Entity(EntityType::Region)),
    ("vertical", CanonicalColumn::Entity(EntityType::Vertical)),
    ("industry", CanonicalColumn::Entity(EntityType::Vertical)),
    ("segment", CanonicalColumn::Entity(EntityType::Vertical)),
    ("end customer", CanonicalColumn::Entity(EntityType::EndCustomer)),
    ("endcustomer", CanonicalColumn::Entity(EntityType::EndCustomer)),
    ("end customer name", CanonicalColumn::Entity(EntityType::EndCustomer)),
    ("customer", CanonicalColumn::Entity(EntityType::EndCustomer)),
    ("customer name", CanonicalColumn::Entity(EntityType::EndCustomer)),
    ("channel", CanonicalColumn::Entity(EntityType::Channel)),
    ("sales channel", CanonicalColumn::Entity(EntityType::Channel)),
    ("business head", CanonicalColumn::Entity(EntityType::BusinessHead)),
    ("bh", CanonicalColumn::Entity(EntityType::BusinessHead)),
    ("business head name", CanonicalColumn::Entity(EntityType::BusinessHead)),
    ("group business manager", CanonicalColumn::Entity(EntityType::GroupBusinessManager)),
    ("gbm", CanonicalColumn::Entity(EntityType::GroupBusinessManager)),
    ("business manager", CanonicalColumn::Entity(EntityType::BusinessManager)),
    ("bm", CanonicalColumn::Entity(EntityType::BusinessManager)),
    ("group channel champ", CanonicalColumn::Entity(EntityType::GroupChannelChamp)),
    ("group channel champion", CanonicalColumn::Entity(EntityType::GroupChannelChamp)),
    ("gcc", CanonicalColumn::Entity(EntityType::GroupChannelChamp)),
    ("channel champ", CanonicalColumn::Entity(EntityType::ChannelChamp)),
    ("channel champion", CanonicalColumn::Entity(EntityType::ChannelChamp)),
    ("cc", CanonicalColumn::Entity(EntityType::ChannelChamp)),
    ("vertical champ", CanonicalColumn::Entity(EntityType::VerticalChamp)),
    ("vertical champion", CanonicalColumn::Entity(EntityType::VerticalChamp)),
    ("vc", CanonicalColumn::Entity(EntityType::VerticalChamp)),
    ("year", CanonicalColumn::Year),
    ("fy", CanonicalColumn::Year),
    ("fiscal year", CanonicalColumn::Year),
    ("financial year", CanonicalColumn::Year),
    ("posting date", CanonicalColumn::PostingDate),
    ("invoice date", CanonicalColumn::PostingDate),
    ("date", CanonicalColumn::PostingDate),
    ("transaction date", CanonicalColumn::PostingDate),
    ("revenue value", CanonicalColumn::RevenueValue),
    ("revenue", CanonicalColumn::RevenueValue),
    ("base value", CanonicalColumn::RevenueValue),
    ("sales value", CanonicalColumn::RevenueValue),
    ("net sales", CanonicalColumn::RevenueValue),
    ("margin value", CanonicalColumn::MarginValue),
    ("margin", CanonicalColumn::MarginValue),
    ("gm value", CanonicalColumn::MarginValue),
    ("gross margin", CanonicalColumn::MarginValue),
    ("gm", CanonicalColumn::MarginValue),
];

/// Counters for cells that could not be typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub rows: usize,
    pub unparseable_years: usize,
    pub unparseable_dates: usize,
    pub unparseable_amounts: usize,
    /// Name cells rewritten to an earlier spelling that differs only by case.
    pub merged_spellings: usize,
    pub ignored_headers: Vec<String>,
}

/// Output of [`normalize_table`]: typed rows plus the canonical columns that were present.
#[derive(Debug, Clone, Default)]
pub struct NormalizedTable {
    pub rows: Vec<TransactionRow>,
    pub columns: ColumnSet,
    pub stats: NormalizeStats,
}

impl NormalizedTable {
    /// Wraps rows assembled in code; present columns are inferred from the values.
    pub fn from_rows(rows: Vec<TransactionRow>) -> Self {
        let mut columns = ColumnSet::new();
        for row in &rows {
            for entity in EntityType::ALL {
                if row.value(entity).is_some() {
                    columns.insert(CanonicalColumn::Entity(entity));
                }
            }
            if row.year_label.is_some() || row.fiscal_year.is_some() {
                columns.insert(CanonicalColumn::Year);
            }
            if row.posting_date.is_some() {
                columns.insert(CanonicalColumn::PostingDate);
            }
        }
        if !rows.is_empty() {
            columns.insert(CanonicalColumn::RevenueValue);
            columns.insert(CanonicalColumn::MarginValue);
        }

        let stats = NormalizeStats {
            rows: rows.len(),
            ..NormalizeStats::default()
        };

        Self {
            rows,
            columns,
            stats,
        }
    }
}

/// Folds a header to its lookup key: lowercase, `_`/`-`/`.` as spaces, single spaced.
pub fn header_key(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .replace(['_', '-', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn canonical_column(header: &str) -> Option<CanonicalColumn> {
    let key = header_key(header);
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, column)| *column)
}

/// Resolves each header to a canonical column. The first header mapping to a column
/// wins; later duplicates resolve to `None`.
pub fn normalize_headers(headers: &[String]) -> Vec<Option<CanonicalColumn>> {
    let mut seen = ColumnSet::new();
    headers
        .iter()
        .map(|header| match canonical_column(header) {
            Some(column) if seen.insert(column) => {
                if header.trim() != column.name() {
                    debug!("Renamed column '{}' to '{}'", header, column);
                }
                Some(column)
            }
            Some(column) => {
                warn!(
                    "Column '{}' duplicates canonical column '{}'; ignoring it",
                    header, column
                );
                None
            }
            None => None,
        })
        .collect()
}

pub fn normalize_table(table: &RawTable) -> NormalizedTable {
    let mapping = normalize_headers(&table.headers);
    let columns: ColumnSet = mapping.iter().flatten().copied().collect();

    let mut stats = NormalizeStats {
        rows: table.len(),
        ignored_headers: table
            .headers
            .iter()
            .zip(&mapping)
            .filter(|(_, column)| column.is_none())
            .map(|(header, _)| header.clone())
            .collect(),
        ..NormalizeStats::default()
    };

    for missing in CanonicalColumn::all().filter(|c| !columns.contains(*c)) {
        debug!("Canonical column '{}' not present in source table", missing);
    }

    let mut rows = Vec::with_capacity(table.len());
    for record_index in 0..table.len() {
        let mut row = TransactionRow::default();

        for (column_index, column) in mapping.iter().enumerate() {
            let Some(column) = column else { continue };
            let cell = table.cell(record_index, column_index).trim();

            match column {
                CanonicalColumn::Entity(entity) => {
                    if !is_blank(cell) {
                        row.set(*entity, Some(cell.to_string()));
                    }
                }
                CanonicalColumn::Year => {
                    if !is_blank(cell) {
                        row.year_label = Some(cell.to_string());
                        row.fiscal_year = parse_fiscal_year(cell);
                        if row.fiscal_year.is_none() {
                            stats.unparseable_years += 1;
                        }
                    }
                }
                CanonicalColumn::PostingDate => {
                    if !is_blank(cell) {
                        row.posting_date = parse_posting_date(cell);
                        if row.posting_date.is_none() {
                            stats.unparseable_dates += 1;
                        }
                    }
                }
                CanonicalColumn::RevenueValue => {
                    row.revenue = parse_cell_amount(cell, &mut stats);
                }
                CanonicalColumn::MarginValue => {
                    row.margin = parse_cell_amount(cell, &mut stats);
                }
            }
        }

        rows.push(row);
    }

    if stats.unparseable_years > 0 {
        warn!(
            "{} rows have an unparseable fiscal year and are left out of year-keyed aggregates",
            stats.unparseable_years
        );
    }
    if stats.unparseable_dates > 0 {
        warn!(
            "{} rows have an unparseable posting date; treated as absent",
            stats.unparseable_dates
        );
    }
    if stats.unparseable_amounts > 0 {
        warn!(
            "{} revenue/margin cells are not numeric; counted as zero",
            stats.unparseable_amounts
        );
    }

    info!(
        "Normalized {} rows across {} canonical columns",
        rows.len(),
        columns.len()
    );

    NormalizedTable {
        rows,
        columns,
        stats,
    }
}

/// Rewrites every entity name to the first spelling seen for it, ignoring case, so
/// "ACME" and "Acme" group together everywhere. Returns the number of cells rewritten.
pub fn unify_name_spellings(rows: &mut [TransactionRow]) -> usize {
    let mut rewritten = 0;
    for entity in EntityType::ALL {
        let mut first_seen: HashMap<String, String> = HashMap::new();
        for row in rows.iter_mut() {
            let Some(name) = row.value(entity) else {
                continue;
            };
            let canonical = first_seen
                .entry(name.to_lowercase())
                .or_insert_with(|| name.to_string());
            if canonical.as_str() != name {
                debug!("{} '{}' grouped under '{}'", entity.label(), name, canonical);
                let canonical = canonical.clone();
                row.set(entity, Some(canonical));
                rewritten += 1;
            }
        }
    }
    rewritten
}

fn parse_cell_amount(cell: &str, stats: &mut NormalizeStats) -> f64 {
    if is_blank(cell) {
        return 0.0;
    }
    parse_amount(cell).unwrap_or_else(|| {
        stats.unparseable_amounts += 1;
        0.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FiscalYear;

    #[test]
    fn test_header_key_folding() {
        assert_eq!(header_key(" Partner_Name "), "partner name");
        assert_eq!(header_key("END-CUSTOMER"), "end customer");
        assert_eq!(header_key("Group  Channel   Champ"), "group channel champ");
    }

    #[test]
    fn test_canonical_column_aliases() {
        assert_eq!(
            canonical_column("Vendor"),
            Some(CanonicalColumn::Entity(EntityType::Oem))
        );
        assert_eq!(
            canonical_column("GBM"),
            Some(CanonicalColumn::Entity(EntityType::GroupBusinessManager))
        );
        assert_eq!(canonical_column("Base_Value"), Some(CanonicalColumn::RevenueValue));
        assert_eq!(canonical_column("GM Value"), Some(CanonicalColumn::MarginValue));
        assert_eq!(canonical_column("Financial Year"), Some(CanonicalColumn::Year));
        assert_eq!(canonical_column("Remarks"), None);
    }

    #[test]
    fn test_duplicate_headers_keep_first() {
        let headers = vec!["Partner".to_string(), "Partner Name".to_string()];
        let mapping = normalize_headers(&headers);
        assert_eq!(
            mapping,
            vec![Some(CanonicalColumn::Entity(EntityType::Partner)), None]
        );
    }

    #[test]
    fn test_normalize_table_types_cells() {
        let table = RawTable::from_records(
            ["Partner Name", "Zone", "FY", "Invoice Date", "Base Value", "GM Value", "Notes"],
            vec![
                vec!["Acme", "North", "2022-23", "2022-05-01", "1,000", "100", "x"],
                vec!["Globex", "", "someday", "garbage", "abc", "5", "y"],
                vec!["nan", "South", "FY24", "", "", "", ""],
            ],
        );

        let normalized = normalize_table(&table);
        assert_eq!(normalized.rows.len(), 3);
        assert!(normalized.columns.has_entity(EntityType::Partner));
        assert!(normalized.columns.has_entity(EntityType::Region));
        assert!(!normalized.columns.has_entity(EntityType::Oem));
        assert_eq!(normalized.stats.ignored_headers, vec!["Notes".to_string()]);

        let first = &normalized.rows[0];
        assert_eq!(first.partner.as_deref(), Some("Acme"));
        assert_eq!(first.fiscal_year, Some(FiscalYear::new(2022)));
        assert_eq!(first.revenue, 1000.0);
        assert!(first.posting_date.is_some());

        let second = &normalized.rows[1];
        assert_eq!(second.region, None);
        assert_eq!(second.fiscal_year, None);
        assert_eq!(second.year_label.as_deref(), Some("someday"));
        assert_eq!(second.posting_date, None);
        assert_eq!(second.revenue, 0.0);
        assert_eq!(second.margin, 5.0);

        let third = &normalized.rows[2];
        assert_eq!(third.partner, None);
        assert_eq!(third.fiscal_year, Some(FiscalYear::new(2024)));

        assert_eq!(normalized.stats.unparseable_years, 1);
        assert_eq!(normalized.stats.unparseable_dates, 1);
        assert_eq!(normalized.stats.unparseable_amounts, 1);
    }

    #[test]
    fn test_from_rows_infers_columns() {
        let rows = vec![TransactionRow::new(1.0, 0.5)
            .with(EntityType::Oem, "Dell")
            .with_year(FiscalYear::new(2023))];
        let table = NormalizedTable::from_rows(rows);
        assert!(table.columns.has_entity(EntityType::Oem));
        assert!(table.columns.contains(CanonicalColumn::Year));
        assert!(!table.columns.has_entity(EntityType::Partner));
    }

    #[test]
    fn test_unify_name_spellings_keeps_first() {
        let mut rows = vec![
            TransactionRow::new(1.0, 0.0).with(EntityType::Partner, "Acme"),
            TransactionRow::new(1.0, 0.0).with(EntityType::Partner, "ACME"),
            TransactionRow::new(1.0, 0.0)
                .with(EntityType::Partner, "acme")
                .with(EntityType::Oem, "Dell"),
            TransactionRow::new(1.0, 0.0).with(EntityType::Oem, "DELL"),
        ];
        assert_eq!(unify_name_spellings(&mut rows), 3);
        for row in &rows[..3] {
            assert_eq!(row.partner.as_deref(), Some("Acme"));
        }
        assert_eq!(rows[3].oem.as_deref(), Some("Dell"));
        assert_eq!(unify_name_spellings(&mut rows), 0);
    }
}
