//! Deterministic query routing.
//!
//! A query is checked against an ordered list of [`Rule`]s; the first rule whose
//! predicate holds decides the [`Route`]. The rules are grouped in fixed stages:
//!
//! 1. special commands (`regional table`, `yearly table`, `help`, `dataset summary`)
//! 2. an explicit channel / partner / OEM / region / customer keyword, unless a
//!    personnel role is also mentioned
//! 3. the six personnel × entity pairs
//! 4. a single personnel role
//! 5. the vertical keyword, then bare instance names of business entities
//! 6. dataset-wide questions with no entity at all
//!
//! Overlapping terms are resolved by blanking out the longer compound before looking
//! for the shorter word: "channel" is only seen once "channel champ" and
//! "group channel champ" are removed, and "business manager" once "group business
//! manager" is removed.

use crate::cache::SalesCache;
use crate::query::{normalize_words, QueryText};
use crate::schema::EntityType;
use crate::utils::extract_fiscal_years;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use EntityType::*;

/// Shortest live name that may be matched without a type keyword next to it.
const MIN_BARE_NAME_LEN: usize = 2;

/// Words that identify a type of entity in a query, singular and plural.
pub fn entity_keywords(entity: EntityType) -> &'static [&'static str] {
    match entity {
        Partner => &["partner", "partners", "reseller", "resellers"],
        Oem => &["oem", "oems", "vendor", "vendors", "brand", "brands"],
        Region => &["region", "regions", "zone", "zones"],
        Vertical => &[
            "vertical",
            "verticals",
            "industry",
            "industries",
            "sector",
            "sectors",
        ],
        EndCustomer => &[
            "end customer",
            "end customers",
            "customer",
            "customers",
            "client",
            "clients",
        ],
        Channel => &["channel", "channels"],
        BusinessHead => &["business head", "business heads", "bh"],
        GroupBusinessManager => &[
            "group business manager",
            "group business managers",
            "gbm",
        ],
        BusinessManager => &["business manager", "business managers", "bm"],
        GroupChannelChamp => &[
            "group channel champion",
            "group channel champions",
            "group channel champ",
            "group channel champs",
            "gcc",
        ],
        ChannelChamp => &[
            "channel champion",
            "channel champions",
            "channel champ",
            "channel champs",
            "cc",
        ],
        VerticalChamp => &[
            "vertical champion",
            "vertical champions",
            "vertical champ",
            "vertical champs",
            "vc",
        ],
    }
}

/// Longer terms that contain one of `entity`'s keywords and must be removed first.
fn overlapping_compounds(entity: EntityType) -> &'static [&'static str] {
    const CHANNEL_COMPOUNDS: &[&str] = &[
        "group channel champion",
        "group channel champions",
        "group channel champ",
        "group channel champs",
        "channel champion",
        "channel champions",
        "channel champ",
        "channel champs",
    ];
    match entity {
        Channel => CHANNEL_COMPOUNDS,
        ChannelChamp => &CHANNEL_COMPOUNDS[..4],
        Vertical => &[
            "vertical champion",
            "vertical champions",
            "vertical champ",
            "vertical champs",
        ],
        BusinessManager => &["group business manager", "group business managers"],
        _ => &[],
    }
}

/// True when one of `entity`'s keywords appears on its own, not as part of a longer term.
pub fn mentions_keyword(query: &QueryText, entity: EntityType) -> bool {
    let compounds = overlapping_compounds(entity);
    if compounds.is_empty() {
        query.has_any(entity_keywords(entity))
    } else {
        query.without(compounds).has_any(entity_keywords(entity))
    }
}

/// Live entity names, lowercased and sorted longest first for instance matching.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    names: BTreeMap<EntityType, Vec<NameEntry>>,
}

#[derive(Debug, Clone)]
struct NameEntry {
    key: String,
    name: String,
}

impl NameIndex {
    pub fn from_cache(cache: &SalesCache) -> Self {
        let mut index = Self::default();
        for entity in EntityType::ALL {
            if let Some(entities) = cache.entities(entity) {
                index.insert(entity, entities.names());
            }
        }
        index
    }

    pub fn insert<'a>(&mut self, entity: EntityType, names: impl IntoIterator<Item = &'a str>) {
        let mut entries: Vec<NameEntry> = names
            .into_iter()
            .filter_map(|name| {
                let key = normalize_words(name);
                (!key.is_empty()).then(|| NameEntry {
                    key,
                    name: name.to_string(),
                })
            })
            .collect();
        entries.sort_by(|a, b| b.key.len().cmp(&a.key.len()));
        self.names.insert(entity, entries);
    }

    /// The longest live name of `entity` appearing as whole words in `query`.
    pub fn find(&self, entity: EntityType, query: &QueryText, min_len: usize) -> Option<&str> {
        self.names.get(&entity)?.iter().find_map(|entry| {
            (entry.key.chars().count() >= min_len && query.has_phrase(&entry.key))
                .then_some(entry.name.as_str())
        })
    }

    /// True when a live name of `entity` appears without needing a keyword beside it.
    pub fn mentions(&self, entity: EntityType, query: &QueryText) -> bool {
        self.find(entity, query, MIN_BARE_NAME_LEN).is_some()
    }

    pub fn names(&self, entity: EntityType) -> impl Iterator<Item = &str> {
        self.names
            .get(&entity)
            .into_iter()
            .flatten()
            .map(|entry| entry.name.as_str())
    }
}

/// A role is mentioned by keyword or by one of its live names.
pub fn mentions_role(query: &QueryText, names: &NameIndex, role: EntityType) -> bool {
    mentions_keyword(query, role) || names.mentions(role, query)
}

pub fn mentions_any_role(query: &QueryText, names: &NameIndex) -> bool {
    EntityType::PERSONNEL
        .iter()
        .any(|role| mentions_role(query, names, *role))
}

/// Fixed literal commands recognised before any keyword routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialCommand {
    RegionalTable,
    YearlyTable,
    DatasetSummary,
    Help,
}

impl SpecialCommand {
    const PREFIXES: [(&'static str, SpecialCommand); 7] = [
        ("regional table", SpecialCommand::RegionalTable),
        ("region table", SpecialCommand::RegionalTable),
        ("yearly table", SpecialCommand::YearlyTable),
        ("year table", SpecialCommand::YearlyTable),
        ("dataset summary", SpecialCommand::DatasetSummary),
        ("overall summary", SpecialCommand::DatasetSummary),
        ("help", SpecialCommand::Help),
    ];

    pub fn parse(query: &QueryText) -> Option<Self> {
        let text = query.lower().trim_start_matches('/');
        Self::PREFIXES.iter().find_map(|(prefix, command)| {
            let matched = match command {
                SpecialCommand::Help => query.words() == "help" || text == "?",
                _ => text.starts_with(prefix),
            };
            matched.then_some(*command)
        })
    }
}

/// Where a classified query is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Special(SpecialCommand),
    Entity(EntityType),
    Pair { role: EntityType, entity: EntityType },
    Dataset,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Special(command) => write!(f, "special:{:?}", command),
            Route::Entity(entity) => write!(f, "entity:{}", entity),
            Route::Pair { role, entity } => write!(f, "pair:{}x{}", role, entity),
            Route::Dataset => f.write_str("dataset"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    SpecialCommand = 1,
    PrimaryEntity = 2,
    PersonnelPair = 3,
    Personnel = 4,
    Fallback = 5,
    Dataset = 6,
}

type Predicate = Box<dyn Fn(&QueryText, &NameIndex) -> bool + Send + Sync>;

/// One routing decision: when `predicate` holds, the query goes to `route`.
pub struct Rule {
    pub name: String,
    pub stage: Stage,
    pub route: Route,
    predicate: Predicate,
}

impl Rule {
    pub fn new<F>(name: impl Into<String>, stage: Stage, route: Route, predicate: F) -> Self
    where
        F: Fn(&QueryText, &NameIndex) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            stage,
            route,
            predicate: Box::new(predicate),
        }
    }

    pub fn matches(&self, query: &QueryText, names: &NameIndex) -> bool {
        (self.predicate)(query, names)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("route", &self.route)
            .finish()
    }
}

/// Stage 2 entity types, in priority order.
const PRIMARY_ENTITIES: [EntityType; 5] = [Channel, Partner, Oem, Region, EndCustomer];

/// Stage 3 role × entity pairs, in priority order.
pub const PERSONNEL_PAIRS: [(EntityType, EntityType); 6] = [
    (BusinessHead, Oem),
    (GroupBusinessManager, Oem),
    (BusinessManager, Oem),
    (GroupChannelChamp, Partner),
    (ChannelChamp, Partner),
    (VerticalChamp, EndCustomer),
];

/// Stage 5 bare-name lookups, in priority order.
const FALLBACK_ENTITIES: [EntityType; 6] = [Partner, Oem, EndCustomer, Vertical, Region, Channel];

/// Words that make a query with no entity a question about the whole dataset.
const DATASET_TERMS: &[&str] = &[
    "revenue",
    "sales",
    "margin",
    "margins",
    "gm",
    "gm%",
    "profit",
    "transactions",
    "transaction",
    "growth",
    "yoy",
    "compare",
    "comparison",
    "year",
    "years",
    "yearly",
    "regional",
    "total",
    "overall",
    "business",
    "performance",
    "summary",
    "overview",
    "trend",
    "how many",
    "breakdown",
];

/// Keyword and name rules for stages 2 to 6. Special commands carry their own route and
/// are checked by [`Classifier::classify`] before these.
pub fn default_rules() -> Vec<Rule> {
    let mut rules = Vec::new();

    for entity in PRIMARY_ENTITIES {
        rules.push(Rule::new(
            format!("{}-keyword", entity.label()),
            Stage::PrimaryEntity,
            Route::Entity(entity),
            move |query, names| {
                mentions_keyword(query, entity) && !mentions_any_role(query, names)
            },
        ));
    }

    for (role, entity) in PERSONNEL_PAIRS {
        rules.push(Rule::new(
            format!("{}-{}", role.label(), entity.label()),
            Stage::PersonnelPair,
            Route::Pair { role, entity },
            move |query, names| {
                mentions_role(query, names, role)
                    && (mentions_keyword(query, entity) || names.mentions(entity, query))
            },
        ));
    }

    for role in EntityType::PERSONNEL {
        rules.push(Rule::new(
            role.label().to_string(),
            Stage::Personnel,
            Route::Entity(role),
            move |query, names| mentions_role(query, names, role),
        ));
    }

    rules.push(Rule::new(
        "vertical-keyword",
        Stage::Fallback,
        Route::Entity(Vertical),
        |query, _| mentions_keyword(query, Vertical),
    ));
    for entity in FALLBACK_ENTITIES {
        rules.push(Rule::new(
            format!("{}-name", entity.label()),
            Stage::Fallback,
            Route::Entity(entity),
            move |query, names| names.mentions(entity, query),
        ));
    }

    rules.push(Rule::new(
        "dataset",
        Stage::Dataset,
        Route::Dataset,
        |query, _| {
            query.has_any(DATASET_TERMS) || !extract_fiscal_years(query.lower()).is_empty()
        },
    ));

    rules
}

/// Outcome of classifying one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub route: Route,
    pub stage: Stage,
    pub rule: String,
}

#[derive(Debug)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First matching rule, or `None` when nothing applies.
    pub fn classify(&self, query: &QueryText, names: &NameIndex) -> Option<Classification> {
        if let Some(command) = SpecialCommand::parse(query) {
            debug!("Query '{}' is special command {:?}", query, command);
            return Some(Classification {
                route: Route::Special(command),
                stage: Stage::SpecialCommand,
                rule: "special-command".to_string(),
            });
        }

        let rule = self.rules.iter().find(|rule| rule.matches(query, names))?;

        debug!(
            "Query '{}' matched rule '{}' (stage {:?}) -> {}",
            query, rule.name, rule.stage, rule.route
        );
        Some(Classification {
            route: rule.route,
            stage: rule.stage,
            rule: rule.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> NameIndex {
        let mut index = NameIndex::default();
        index.insert(Partner, ["A", "Acme Systems", "Zen"]);
        index.insert(Oem, ["Dell", "HP"]);
        index.insert(Region, ["North", "South"]);
        index.insert(Vertical, ["BFSI", "Healthcare"]);
        index.insert(BusinessHead, ["Priya"]);
        index.insert(GroupBusinessManager, ["Kiran"]);
        index.insert(BusinessManager, ["Ravi"]);
        index.insert(ChannelChamp, ["Meena"]);
        index
    }

    fn route(text: &str) -> Option<Route> {
        Classifier::default()
            .classify(&QueryText::new(text), &names())
            .map(|c| c.route)
    }

    #[test]
    fn test_special_commands() {
        assert_eq!(
            route("regional table"),
            Some(Route::Special(SpecialCommand::RegionalTable))
        );
        assert_eq!(
            route("/yearly table please"),
            Some(Route::Special(SpecialCommand::YearlyTable))
        );
        assert_eq!(route("help"), Some(Route::Special(SpecialCommand::Help)));
        assert_ne!(route("help me with partner A"), Some(Route::Special(SpecialCommand::Help)));
    }

    #[test]
    fn test_primary_keywords() {
        assert_eq!(route("revenue for partner A"), Some(Route::Entity(Partner)));
        assert_eq!(route("top 3 oems by margin"), Some(Route::Entity(Oem)));
        assert_eq!(route("show me top regions"), Some(Route::Entity(Region)));
        assert_eq!(route("best customers"), Some(Route::Entity(EndCustomer)));
        assert_eq!(route("channel wise revenue"), Some(Route::Entity(Channel)));
    }

    #[test]
    fn test_channel_never_captures_channel_champ() {
        assert_eq!(
            route("channel revenue for channel champ Meena"),
            Some(Route::Entity(ChannelChamp))
        );
        assert_eq!(
            route("top group channel champs"),
            Some(Route::Entity(GroupChannelChamp))
        );
        assert_eq!(route("channel performance"), Some(Route::Entity(Channel)));
    }

    #[test]
    fn test_group_business_manager_is_not_business_manager() {
        assert_eq!(
            route("revenue of group business manager Kiran"),
            Some(Route::Entity(GroupBusinessManager))
        );
        assert_eq!(
            route("oems handled by group business manager Kiran"),
            Some(Route::Pair {
                role: GroupBusinessManager,
                entity: Oem
            })
        );
        assert_eq!(
            route("business manager performance"),
            Some(Route::Entity(BusinessManager))
        );
    }

    #[test]
    fn test_personnel_pairs_by_instance_name() {
        assert_eq!(
            route("Ravi revenue with Dell"),
            Some(Route::Pair {
                role: BusinessManager,
                entity: Oem
            })
        );
        assert_eq!(
            route("partners under cc Meena"),
            Some(Route::Pair {
                role: ChannelChamp,
                entity: Partner
            })
        );
        assert_eq!(route("how is Priya doing"), Some(Route::Entity(BusinessHead)));
    }

    #[test]
    fn test_role_suppresses_primary_entity() {
        assert_eq!(
            route("regions covered by business head Priya"),
            Some(Route::Entity(BusinessHead))
        );
    }

    #[test]
    fn test_fallback_and_dataset() {
        assert_eq!(route("top verticals by revenue"), Some(Route::Entity(Vertical)));
        assert_eq!(
            route("vertical champ performance"),
            Some(Route::Entity(VerticalChamp))
        );
        assert_eq!(route("how is Acme Systems doing"), Some(Route::Entity(Partner)));
        assert_eq!(route("Dell margin"), Some(Route::Entity(Oem)));
        assert_eq!(route("what's the total revenue?"), Some(Route::Dataset));
        assert_eq!(route("compare sales between years"), Some(Route::Dataset));
        assert_eq!(route("what happened in FY23"), Some(Route::Dataset));
        assert_eq!(route("tell me a joke"), None);
    }

    #[test]
    fn test_single_letter_names_need_a_keyword() {
        let index = names();
        let query = QueryText::new("what is a good idea");
        assert!(index.find(Partner, &query, 1).is_some());
        assert!(!index.mentions(Partner, &query));
    }

    #[test]
    fn test_longest_name_wins() {
        let mut index = NameIndex::default();
        index.insert(Partner, ["Acme", "Acme Systems"]);
        let query = QueryText::new("revenue for partner acme systems");
        assert_eq!(index.find(Partner, &query, 1), Some("Acme Systems"));
    }
}
