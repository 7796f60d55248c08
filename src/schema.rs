use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Every attribute of a transaction that answers can be grouped by.
///
/// The first six are business entities; the remaining six are personnel roles
/// attached to each transaction line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum EntityType {
    Partner,
    Oem,
    Region,
    Vertical,
    EndCustomer,
    Channel,
    BusinessHead,
    GroupBusinessManager,
    BusinessManager,
    GroupChannelChamp,
    ChannelChamp,
    VerticalChamp,
}

impl EntityType {
    pub const ALL: [EntityType; 12] = [
        EntityType::Partner,
        EntityType::Oem,
        EntityType::Region,
        EntityType::Vertical,
        EntityType::EndCustomer,
        EntityType::Channel,
        EntityType::BusinessHead,
        EntityType::GroupBusinessManager,
        EntityType::BusinessManager,
        EntityType::GroupChannelChamp,
        EntityType::ChannelChamp,
        EntityType::VerticalChamp,
    ];

    pub const BUSINESS: [EntityType; 6] = [
        EntityType::Partner,
        EntityType::Oem,
        EntityType::Region,
        EntityType::Vertical,
        EntityType::EndCustomer,
        EntityType::Channel,
    ];

    pub const PERSONNEL: [EntityType; 6] = [
        EntityType::BusinessHead,
        EntityType::GroupBusinessManager,
        EntityType::BusinessManager,
        EntityType::GroupChannelChamp,
        EntityType::ChannelChamp,
        EntityType::VerticalChamp,
    ];

    /// Canonical column header for this entity in a normalized table.
    pub fn column(self) -> &'static str {
        match self {
            EntityType::Partner => "Partner",
            EntityType::Oem => "OEM",
            EntityType::Region => "Region",
            EntityType::Vertical => "Vertical",
            EntityType::EndCustomer => "End Customer",
            EntityType::Channel => "Channel",
            EntityType::BusinessHead => "Business Head",
            EntityType::GroupBusinessManager => "Group Business Manager",
            EntityType::BusinessManager => "Business Manager",
            EntityType::GroupChannelChamp => "Group Channel Champ",
            EntityType::ChannelChamp => "Channel Champ",
            EntityType::VerticalChamp => "Vertical Champ",
        }
    }

    /// Lowercase label used inside sentences ("No partner named ...").
    pub fn label(self) -> &'static str {
        match self {
            EntityType::Partner => "partner",
            EntityType::Oem => "OEM",
            EntityType::Region => "region",
            EntityType::Vertical => "vertical",
            EntityType::EndCustomer => "end customer",
            EntityType::Channel => "channel",
            EntityType::BusinessHead => "business head",
            EntityType::GroupBusinessManager => "group business manager",
            EntityType::BusinessManager => "business manager",
            EntityType::GroupChannelChamp => "group channel champ",
            EntityType::ChannelChamp => "channel champ",
            EntityType::VerticalChamp => "vertical champ",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            EntityType::Partner => "Partners",
            EntityType::Oem => "OEMs",
            EntityType::Region => "Regions",
            EntityType::Vertical => "Verticals",
            EntityType::EndCustomer => "End Customers",
            EntityType::Channel => "Channels",
            EntityType::BusinessHead => "Business Heads",
            EntityType::GroupBusinessManager => "Group Business Managers",
            EntityType::BusinessManager => "Business Managers",
            EntityType::GroupChannelChamp => "Group Channel Champs",
            EntityType::ChannelChamp => "Channel Champs",
            EntityType::VerticalChamp => "Vertical Champs",
        }
    }

    pub fn is_personnel(self) -> bool {
        Self::PERSONNEL.contains(&self)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A group-by axis: either an entity column or the fiscal year.
///
/// The derived ordering (entities in declaration order, then `Year`) is the
/// canonical order used for combination keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Entity(EntityType),
    Year,
}

impl Dimension {
    pub fn column(self) -> &'static str {
        match self {
            Dimension::Entity(entity) => entity.column(),
            Dimension::Year => "Year",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::Entity(entity) => entity.label(),
            Dimension::Year => "fiscal year",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Dimension::Entity(entity) => entity.plural(),
            Dimension::Year => "Fiscal Years",
        }
    }

    pub fn all() -> impl Iterator<Item = Dimension> {
        EntityType::ALL
            .into_iter()
            .map(Dimension::Entity)
            .chain(std::iter::once(Dimension::Year))
    }
}

impl From<EntityType> for Dimension {
    fn from(entity: EntityType) -> Self {
        Dimension::Entity(entity)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// An Indian-style fiscal year, e.g. `2023-24` runs April 2023 to March 2024.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct FiscalYear {
    pub start: i32,
    pub end: i32,
}

impl FiscalYear {
    pub fn new(start: i32) -> Self {
        Self {
            start,
            end: start + 1,
        }
    }

    pub fn previous(self) -> Self {
        Self::new(self.start - 1)
    }

    pub fn next(self) -> Self {
        Self::new(self.start + 1)
    }

    /// Canonical label, `"{start}-{end % 100}"` with a two digit suffix.
    pub fn label(self) -> String {
        format!("{}-{:02}", self.start, self.end.rem_euclid(100))
    }
}

impl fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.start, self.end.rem_euclid(100))
    }
}

/// Columns a normalized table can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CanonicalColumn {
    Entity(EntityType),
    Year,
    PostingDate,
    RevenueValue,
    MarginValue,
}

impl CanonicalColumn {
    pub fn name(self) -> &'static str {
        match self {
            CanonicalColumn::Entity(entity) => entity.column(),
            CanonicalColumn::Year => "Year",
            CanonicalColumn::PostingDate => "Posting Date",
            CanonicalColumn::RevenueValue => "Revenue Value",
            CanonicalColumn::MarginValue => "Margin Value",
        }
    }

    pub fn all() -> impl Iterator<Item = CanonicalColumn> {
        EntityType::ALL
            .into_iter()
            .map(CanonicalColumn::Entity)
            .chain([
                CanonicalColumn::Year,
                CanonicalColumn::PostingDate,
                CanonicalColumn::RevenueValue,
                CanonicalColumn::MarginValue,
            ])
    }
}

impl fmt::Display for CanonicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of canonical columns present in a loaded table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSet(BTreeSet<CanonicalColumn>);

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: CanonicalColumn) -> bool {
        self.0.insert(column)
    }

    pub fn contains(&self, column: CanonicalColumn) -> bool {
        self.0.contains(&column)
    }

    pub fn has_entity(&self, entity: EntityType) -> bool {
        self.contains(CanonicalColumn::Entity(entity))
    }

    pub fn has_dimension(&self, dimension: Dimension) -> bool {
        match dimension {
            Dimension::Entity(entity) => self.has_entity(entity),
            Dimension::Year => self.contains(CanonicalColumn::Year),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CanonicalColumn> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<CanonicalColumn> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = CanonicalColumn>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One normalized transaction line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub partner: Option<String>,
    pub oem: Option<String>,
    pub region: Option<String>,
    pub vertical: Option<String>,
    pub end_customer: Option<String>,
    pub channel: Option<String>,
    pub business_head: Option<String>,
    pub group_business_manager: Option<String>,
    pub business_manager: Option<String>,
    pub group_channel_champ: Option<String>,
    pub channel_champ: Option<String>,
    pub vertical_champ: Option<String>,
    /// The year cell exactly as it appeared in the source.
    pub year_label: Option<String>,
    /// `None` when the year cell was absent or unparseable.
    pub fiscal_year: Option<FiscalYear>,
    pub posting_date: Option<NaiveDate>,
    pub revenue: f64,
    pub margin: f64,
}

impl TransactionRow {
    pub fn new(revenue: f64, margin: f64) -> Self {
        Self {
            revenue,
            margin,
            ..Self::default()
        }
    }

    pub fn value(&self, entity: EntityType) -> Option<&str> {
        let field = match entity {
            EntityType::Partner => &self.partner,
            EntityType::Oem => &self.oem,
            EntityType::Region => &self.region,
            EntityType::Vertical => &self.vertical,
            EntityType::EndCustomer => &self.end_customer,
            EntityType::Channel => &self.channel,
            EntityType::BusinessHead => &self.business_head,
            EntityType::GroupBusinessManager => &self.group_business_manager,
            EntityType::BusinessManager => &self.business_manager,
            EntityType::GroupChannelChamp => &self.group_channel_champ,
            EntityType::ChannelChamp => &self.channel_champ,
            EntityType::VerticalChamp => &self.vertical_champ,
        };
        field.as_deref()
    }

    pub fn set(&mut self, entity: EntityType, value: Option<String>) {
        let field = match entity {
            EntityType::Partner => &mut self.partner,
            EntityType::Oem => &mut self.oem,
            EntityType::Region => &mut self.region,
            EntityType::Vertical => &mut self.vertical,
            EntityType::EndCustomer => &mut self.end_customer,
            EntityType::Channel => &mut self.channel,
            EntityType::BusinessHead => &mut self.business_head,
            EntityType::GroupBusinessManager => &mut self.group_business_manager,
            EntityType::BusinessManager => &mut self.business_manager,
            EntityType::GroupChannelChamp => &mut self.group_channel_champ,
            EntityType::ChannelChamp => &mut self.channel_champ,
            EntityType::VerticalChamp => &mut self.vertical_champ,
        };
        *field = value;
    }

    /// Builder-style setter, handy for assembling rows in code.
    pub fn with(mut self, entity: EntityType, value: &str) -> Self {
        self.set(entity, Some(value.to_string()));
        self
    }

    pub fn with_year(mut self, year: FiscalYear) -> Self {
        self.year_label = Some(year.label());
        self.fiscal_year = Some(year);
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.posting_date = Some(date);
        self
    }

    /// The grouping key of this row along `dimension`, if it has one.
    pub fn dimension_value(&self, dimension: Dimension) -> Option<String> {
        match dimension {
            Dimension::Entity(entity) => self.value(entity).map(str::to_string),
            Dimension::Year => self.fiscal_year.map(|year| year.label()),
        }
    }

    pub fn matches(&self, dimension: Dimension, expected: &str) -> bool {
        match dimension {
            Dimension::Entity(entity) => self
                .value(entity)
                .is_some_and(|value| value.eq_ignore_ascii_case(expected)),
            Dimension::Year => self
                .fiscal_year
                .is_some_and(|year| year.label() == expected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiscal_year_label() {
        assert_eq!(FiscalYear::new(2023).label(), "2023-24");
        assert_eq!(FiscalYear::new(1999).to_string(), "1999-00");
        assert_eq!(FiscalYear::new(2023).previous(), FiscalYear::new(2022));
    }

    #[test]
    fn test_dimension_ordering_is_canonical() {
        let mut dims = vec![
            Dimension::Year,
            Dimension::Entity(EntityType::Region),
            Dimension::Entity(EntityType::Partner),
        ];
        dims.sort();
        assert_eq!(
            dims,
            vec![
                Dimension::Entity(EntityType::Partner),
                Dimension::Entity(EntityType::Region),
                Dimension::Year,
            ]
        );
    }

    #[test]
    fn test_row_accessors() {
        let row = TransactionRow::new(100.0, 20.0)
            .with(EntityType::Partner, "Acme")
            .with(EntityType::ChannelChamp, "Ravi")
            .with_year(FiscalYear::new(2022));

        assert_eq!(row.value(EntityType::Partner), Some("Acme"));
        assert_eq!(row.value(EntityType::Oem), None);
        assert_eq!(
            row.dimension_value(Dimension::Year).as_deref(),
            Some("2022-23")
        );
        assert!(row.matches(Dimension::Entity(EntityType::Partner), "acme"));
        assert!(!row.matches(Dimension::Entity(EntityType::ChannelChamp), "Ravi Kumar"));
    }

    #[test]
    fn test_serialization() {
        let row = TransactionRow::new(10.0, 1.0).with(EntityType::Region, "North");
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("North"));

        let back: TransactionRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
