//! Sub-intent vocabulary shared by every handler.
//!
//! Once a query is routed to a handler, what it asks for (a ranking, a growth figure,
//! a dependency check...) is read off the same ordered cue table. The first cue whose
//! phrases appear wins; a query matching none is answered with a summary.

use crate::classifier::{entity_keywords, mentions_keyword};
use crate::config::EngineConfig;
use crate::metrics::Metric;
use crate::query::QueryText;
use crate::schema::{Dimension, EntityType, FiscalYear};
use crate::utils::extract_fiscal_years;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static EXPLICIT_N: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:top|bottom|best|worst|highest|lowest|leading|largest|biggest|smallest|first|last)\s+(\d{1,3})\b",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubIntent {
    Benchmark,
    Concentration,
    Growth,
    TopN,
    BottomN,
    Breakdown(Dimension),
    Count,
    List,
    Metric(Metric),
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cue {
    Benchmark,
    Concentration,
    Growth,
    Top,
    Bottom,
    Breakdown,
    Count,
    List,
    Metric,
}

const VOCABULARY: [(Cue, &[&str]); 9] = [
    (
        Cue::Benchmark,
        &[
            "benchmark",
            "peers",
            "peer",
            "rank",
            "ranking",
            "rankings",
            "ranked",
            "position",
            "percentile",
            "stack up",
            "compared to others",
            "against others",
            "relative to others",
        ],
    ),
    (
        Cue::Concentration,
        &[
            "dependency",
            "dependent",
            "depend",
            "depends",
            "concentration",
            "concentrated",
            "reliance",
            "reliant",
            "rely",
            "relies",
            "contribution",
            "contribute",
            "contributes",
            "share",
            "exposure",
        ],
    ),
    (
        Cue::Growth,
        &[
            "growth",
            "grow",
            "grew",
            "growing",
            "yoy",
            "year over year",
            "year on year",
            "trend",
            "change",
            "increase",
            "decrease",
            "decline",
            "compare",
            "comparison",
        ],
    ),
    (
        Cue::Top,
        &[
            "top", "best", "highest", "largest", "biggest", "leading", "most",
        ],
    ),
    (
        Cue::Bottom,
        &[
            "bottom", "lowest", "worst", "least", "smallest", "weakest",
        ],
    ),
    (
        Cue::Breakdown,
        &[
            "breakdown",
            "break down",
            "broken down",
            "split",
            "distribution",
            "by",
            "wise",
            "per",
            "across",
            "each",
            "regional",
            "yearly",
            "annual",
        ],
    ),
    (Cue::Count, &["how many", "count", "number of", "no of"]),
    (
        Cue::List,
        &["list", "show all", "all the", "names of", "which", "who are"],
    ),
    (Cue::Metric, &[]),
];

const MARGIN_PERCENT_TERMS: &[&str] = &[
    "gm%",
    "gm %",
    "margin%",
    "margin %",
    "margin percent",
    "margin percentage",
    "gm percent",
    "gm percentage",
    "margin rate",
    "profitability",
];
const MARGIN_TERMS: &[&str] = &[
    "margin",
    "margins",
    "gm",
    "gross margin",
    "profit",
    "profits",
];
const TRANSACTION_TERMS: &[&str] = &[
    "transactions",
    "transaction",
    "deals",
    "orders",
    "invoices",
];
const REVENUE_TERMS: &[&str] = &["revenue", "sales", "turnover", "billing"];

const YEAR_TERMS: &[&str] = &[
    "year",
    "years",
    "yearly",
    "annual",
    "annually",
    "fiscal year",
    "fy",
];
const REGION_ADJECTIVES: &[&str] = &["regional"];

const SINGULAR_CUES: &[&str] = &[
    "the top",
    "the best",
    "the highest",
    "the largest",
    "the biggest",
    "the most",
    "the lowest",
    "the worst",
    "the least",
    "the smallest",
];

/// Words that never form part of an entity name when looking for one the user typed.
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "in", "on", "at", "to", "by", "with", "and", "or", "is",
    "are", "was", "were", "be", "do", "does", "did", "doing", "has", "have", "had", "what",
    "whats", "s", "how", "show", "me", "tell", "give", "get", "about", "from", "between",
    "during", "its", "their", "this", "that", "our", "we", "vs", "versus", "against", "than",
    "fy", "please", "performance", "performing", "overall", "total", "details", "detail",
    "info", "summary", "stats", "statistics", "value", "values", "name", "named", "called",
    "under", "handled", "handles", "handling", "managed", "manages", "managing", "working",
    "works", "covered", "covers", "all",
    "so", "far", "much", "well", "good", "current", "last", "since", "till", "until",
    "among", "within", "only", "ever", "percent", "percentage", "%",
];

/// Dimension keywords, including adjectives that only work as a grouping axis.
fn dimension_position(query: &QueryText, dimension: Dimension) -> Option<usize> {
    let terms: Vec<&str> = match dimension {
        Dimension::Year => YEAR_TERMS.to_vec(),
        Dimension::Entity(EntityType::Region) => entity_keywords(EntityType::Region)
            .iter()
            .chain(REGION_ADJECTIVES)
            .copied()
            .collect(),
        Dimension::Entity(entity) => {
            if !mentions_keyword(query, entity) {
                return None;
            }
            entity_keywords(entity).to_vec()
        }
    };
    terms
        .iter()
        .filter_map(|term| query.phrase_position(term))
        .min()
}

/// The grouping axis named first in the query, ignoring `exclude`.
pub fn mentioned_dimension(query: &QueryText, exclude: &[EntityType]) -> Option<Dimension> {
    Dimension::all()
        .filter(|dimension| match dimension {
            Dimension::Entity(entity) => !exclude.contains(entity),
            Dimension::Year => true,
        })
        .filter_map(|dimension| dimension_position(query, dimension).map(|pos| (pos, dimension)))
        .min_by_key(|(position, _)| *position)
        .map(|(_, dimension)| dimension)
}

/// The number the query talks about; revenue unless another metric is named.
pub fn detect_metric(query: &QueryText) -> Option<Metric> {
    if query.has_any(MARGIN_PERCENT_TERMS) || query.lower().contains("gm%") {
        Some(Metric::MarginPercent)
    } else if query.has_any(MARGIN_TERMS) {
        Some(Metric::Margin)
    } else if query.has_any(TRANSACTION_TERMS) {
        Some(Metric::Transactions)
    } else if query.has_any(REVENUE_TERMS) {
        Some(Metric::Revenue)
    } else {
        None
    }
}

/// Benchmark wording that also reads as a plain ranking when no instance is named.
const RANKING_TERMS: &[&str] = &["rank", "ranking", "rankings", "ranked"];

pub fn asks_for_ranking(query: &QueryText) -> bool {
    query.has_any(RANKING_TERMS)
}

pub fn is_filler_word(word: &str) -> bool {
    FILLER_WORDS.contains(&word)
        || VOCABULARY
            .iter()
            .flat_map(|(_, phrases)| phrases.iter())
            .chain(MARGIN_PERCENT_TERMS)
            .chain(MARGIN_TERMS)
            .chain(TRANSACTION_TERMS)
            .chain(REVENUE_TERMS)
            .chain(YEAR_TERMS)
            .any(|phrase| phrase.split_whitespace().any(|part| part == word))
        || EntityType::ALL
            .iter()
            .flat_map(|entity| entity_keywords(*entity).iter())
            .any(|keyword| keyword.split_whitespace().any(|part| part == word))
        || word.chars().all(|c| c.is_ascii_digit())
        || extract_fiscal_years(word).len() == 1
}

/// Everything a handler needs to know about what the query asks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySpec {
    pub intent: SubIntent,
    pub metric: Metric,
    /// Whether the metric was named explicitly rather than defaulted.
    pub explicit_metric: bool,
    pub n: usize,
    pub years: Vec<FiscalYear>,
    /// A grouping axis other than the handler's own entity type, if one is named.
    pub secondary: Option<Dimension>,
}

impl QuerySpec {
    /// Reads the sub-intent of `query` for a handler whose own types are `primary`.
    pub fn parse(query: &QueryText, primary: &[EntityType], config: &EngineConfig) -> Self {
        let detected = detect_metric(query);
        let metric = detected.unwrap_or(Metric::Revenue);
        let secondary = mentioned_dimension(query, primary);

        let intent = VOCABULARY
            .iter()
            .find_map(|(cue, phrases)| match cue {
                Cue::Metric => detected.map(SubIntent::Metric),
                Cue::Breakdown => {
                    if query.has_any(phrases) {
                        secondary.map(SubIntent::Breakdown)
                    } else {
                        None
                    }
                }
                _ if query.has_any(phrases) => Some(match cue {
                    Cue::Benchmark => SubIntent::Benchmark,
                    Cue::Concentration => SubIntent::Concentration,
                    Cue::Growth => SubIntent::Growth,
                    Cue::Top => SubIntent::TopN,
                    Cue::Bottom => SubIntent::BottomN,
                    Cue::Count => SubIntent::Count,
                    _ => SubIntent::List,
                }),
                _ => None,
            })
            .unwrap_or(SubIntent::Summary);

        Self {
            intent,
            metric,
            explicit_metric: detected.is_some(),
            n: parse_n(query, config),
            years: extract_fiscal_years(query.lower()),
            secondary,
        }
    }

    /// The first year mentioned, if any.
    pub fn year(&self) -> Option<FiscalYear> {
        self.years.first().copied()
    }
}

fn parse_n(query: &QueryText, config: &EngineConfig) -> usize {
    let explicit = EXPLICIT_N
        .captures(query.words())
        .and_then(|caps| caps[1].parse::<usize>().ok());

    let n = match explicit {
        Some(n) => n,
        None if query.has_any(SINGULAR_CUES) => 1,
        None => config.default_top_n,
    };
    n.clamp(1, config.max_top_n.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(text: &str, primary: &[EntityType]) -> QuerySpec {
        QuerySpec::parse(&QueryText::new(text), primary, &EngineConfig::default())
    }

    #[test]
    fn test_cue_order() {
        let partner = &[EntityType::Partner];
        assert_eq!(spec("rank of partner A among peers", partner).intent, SubIntent::Benchmark);
        assert_eq!(
            spec("how dependent is partner A on Dell", partner).intent,
            SubIntent::Concentration
        );
        assert_eq!(spec("growth for partner A in 2023", partner).intent, SubIntent::Growth);
        assert_eq!(spec("top 3 partners", partner).intent, SubIntent::TopN);
        assert_eq!(spec("worst partners", partner).intent, SubIntent::BottomN);
        assert_eq!(
            spec("partner A revenue by region", partner).intent,
            SubIntent::Breakdown(Dimension::Entity(EntityType::Region))
        );
        assert_eq!(spec("how many partners", partner).intent, SubIntent::Count);
        assert_eq!(spec("list partners", partner).intent, SubIntent::List);
        assert_eq!(
            spec("GM% for partner A", partner).intent,
            SubIntent::Metric(Metric::MarginPercent)
        );
        assert_eq!(spec("partner A", partner).intent, SubIntent::Summary);
    }

    #[test]
    fn test_ranking_wording() {
        assert!(asks_for_ranking(&QueryText::new("partner ranking by revenue")));
        assert!(asks_for_ranking(&QueryText::new("partners ranked by margin")));
        assert!(!asks_for_ranking(&QueryText::new("benchmark partner A against peers")));
    }

    #[test]
    fn test_breakdown_needs_an_axis() {
        let partner = &[EntityType::Partner];
        assert_eq!(
            spec("regional performance for a partner", partner).intent,
            SubIntent::Breakdown(Dimension::Entity(EntityType::Region))
        );
        assert_eq!(
            spec("partner A by year", partner).intent,
            SubIntent::Breakdown(Dimension::Year)
        );
        assert_eq!(
            spec("partners by revenue", partner).intent,
            SubIntent::Metric(Metric::Revenue)
        );
    }

    #[test]
    fn test_metric_detection() {
        let none: &[EntityType] = &[];
        assert_eq!(spec("gm% of oems", none).metric, Metric::MarginPercent);
        assert_eq!(spec("margin of oems", none).metric, Metric::Margin);
        assert_eq!(spec("number of transactions", none).metric, Metric::Transactions);
        assert_eq!(spec("oems", none).metric, Metric::Revenue);
        assert!(!spec("oems", none).explicit_metric);
    }

    #[test]
    fn test_top_n_parsing() {
        let none: &[EntityType] = &[];
        assert_eq!(spec("top 3 oems", none).n, 3);
        assert_eq!(spec("top oems", none).n, 5);
        assert_eq!(spec("which oem has the highest margin", none).n, 1);
        assert_eq!(spec("top 500 oems", none).n, 50);
        assert_eq!(spec("top 0 oems", none).n, 1);
    }

    #[test]
    fn test_years() {
        let none: &[EntityType] = &[];
        let parsed = spec("compare FY23 with 2021-22", none);
        assert_eq!(parsed.years, vec![FiscalYear::new(2023), FiscalYear::new(2021)]);
        assert_eq!(parsed.year(), Some(FiscalYear::new(2023)));
    }

    #[test]
    fn test_filler_words() {
        assert!(is_filler_word("revenue"));
        assert!(is_filler_word("partner"));
        assert!(is_filler_word("2023"));
        assert!(!is_filler_word("zeta"));
    }
}
