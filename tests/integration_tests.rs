use sales_query_engine::*;
use std::sync::Arc;

const SALES_CSV: &str = "\
Partner Name,OEM,Region,Vertical,Customer,Channel,BH,GBM,BM,GCC,CC,VC,FY,Base Value,GM Value
Acme,Dell,North,BFSI,Axis Bank,Retail,Meera,Gopal,Ravi,Kiran,Kavya,Vinod,2022-23,\"1,00,000\",20000
Acme,HP,South,Govt,State Board,Enterprise,Meera,Gopal,Ravi,Kiran,Kavya,Vinod,2023-24,200000,50000
Bolt,Dell,North,BFSI,Axis Bank,Retail,Meera,Harish,Sunil,Kiran,Kavya,Vinod,2023-24,50000,10000
Crest,Lenovo,West,Health,City Clinic,Retail,Meera,Harish,Sunil,Latha,Manoj,Vinod,2023-24,25000,pending
";

fn csv_assistant() -> SalesAssistant {
    let table = RawTable::from_csv_reader(SALES_CSV.as_bytes()).unwrap();
    SalesAssistant::load_table(&table, EngineConfig::default())
}

fn scenario_rows() -> Vec<TransactionRow> {
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

#[test]
fn test_partner_revenue_and_growth() {
    let assistant = load(scenario_rows(), EngineConfig::default());

    let revenue = process_query(&assistant, "revenue for partner A");
    assert!(
        revenue.starts_with("Revenue for Partner A: ₹0.00 Cr (₹300.00)"),
        "unexpected answer: {}",
        revenue
    );

    let growth = process_query(&assistant, "growth for partner A in 2023");
    assert!(growth.contains("+100.0%"), "unexpected answer: {}", growth);
    assert!(growth.contains("2022-23") && growth.contains("2023-24"));
}

#[test]
fn test_unknown_partner_lists_alternatives() {
    let names = ["Acme", "Bolt", "Crest", "Delta", "Echo", "Fjord", "Gamma"];
    let rows = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            TransactionRow::new(1000.0 * (i + 1) as f64, 100.0).with(EntityType::Partner, name)
        })
        .collect();
    let assistant = load(rows, EngineConfig::default());

    let answer = assistant.process_query("revenue for partner Zeta");
    let prefix = "Error: No partner named 'Zeta' was found. Try one of: ";
    assert!(answer.starts_with(prefix), "unexpected answer: {}", answer);

    let samples: Vec<&str> = answer[prefix.len()..].split(", ").collect();
    assert!(!samples.is_empty() && samples.len() <= 5);
    for sample in samples {
        assert!(names.contains(&sample), "'{}' is not a partner", sample);
    }
}

#[test]
fn test_unknown_partner_with_grouping_is_reported() {
    let assistant = csv_assistant();
    for query in [
        "top oems for partner Zeta",
        "how many oems does partner Zeta have",
    ] {
        let answer = assistant.process_query(query);
        assert!(
            answer.starts_with("Error: No partner named 'Zeta' was found. Try one of: "),
            "'{}' gave: {}",
            query,
            answer
        );
        assert!(answer.contains("Acme"));
    }

    let answer = assistant.process_query("top oems for partner Acme");
    assert!(answer.starts_with("Top 5 OEMs for Partner Acme"), "{}", answer);
}

#[test]
fn test_names_differing_by_case_are_one_entity() {
    let rows = vec![
        TransactionRow::new(100.0, 20.0)
            .with(EntityType::Partner, "Acme")
            .with_year(FiscalYear::new(2022)),
        TransactionRow::new(200.0, 40.0)
            .with(EntityType::Partner, "ACME")
            .with_year(FiscalYear::new(2023)),
        TransactionRow::new(50.0, 10.0)
            .with(EntityType::Partner, "Bolt")
            .with_year(FiscalYear::new(2023)),
    ];
    let assistant = load(rows, EngineConfig::default());
    assert_eq!(assistant.cache().normalize_stats().merged_spellings, 1);

    let overall = assistant.process_query("top partners");
    assert!(overall.contains("₹300.00"), "{}", overall);
    assert!(!overall.contains("ACME"), "{}", overall);

    let in_year = assistant.process_query("top partners in 2023");
    assert!(in_year.contains("Acme") && !in_year.contains("ACME"), "{}", in_year);
    assert!(in_year.contains("₹200.00"), "{}", in_year);

    let growth = assistant.process_query("partner growth");
    assert!(growth.contains("+100.0%"), "{}", growth);
    assert!(!growth.contains("-100.0%"), "{}", growth);
    assert!(!growth.contains("ACME"), "{}", growth);

    let revenue = assistant.process_query("revenue for partner acme");
    assert!(revenue.starts_with("Revenue for Partner Acme"), "{}", revenue);
}

#[test]
fn test_ranking_questions_rank_the_type() {
    let assistant = csv_assistant();
    for query in ["partner ranking by revenue", "show top partners ranked by revenue"] {
        let answer = assistant.process_query(query);
        assert!(
            answer.starts_with("Top 5 Partners by Revenue"),
            "'{}' gave: {}",
            query,
            answer
        );
        assert!(answer.find("Acme").unwrap() < answer.find("Crest").unwrap());
    }
}

#[test]
fn test_csv_load_and_status() {
    let assistant = csv_assistant();
    let status = assistant.status();

    assert!(status.data_loaded);
    assert_eq!(status.rows, 4);
    assert_eq!(status.columns, 15);
    assert_eq!(status.years, vec!["2022-23", "2023-24"]);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["message"], "Ready for queries!");
    assert_eq!(assistant.cache().normalize_stats().unparseable_amounts, 1);

    let top = assistant.process_query("Show top partners by revenue");
    assert!(top.starts_with("Top 5 Partners by Revenue"), "{}", top);
    let acme = top.find("Acme").unwrap();
    let bolt = top.find("Bolt").unwrap();
    assert!(acme < bolt);
}

#[test]
fn test_every_suggestion_is_answered() {
    let assistant = csv_assistant();
    for suggestion in assistant.suggestions().iter() {
        assert!(
            assistant.classify(suggestion).is_some(),
            "'{}' was not classified",
            suggestion
        );
        let answer = assistant.process_query(suggestion);
        assert!(
            !answer.starts_with(ERROR_PREFIX),
            "'{}' failed: {}",
            suggestion,
            answer
        );
    }
}

#[test]
fn test_channel_and_champ_routes_stay_apart() {
    let assistant = csv_assistant();
    let route = |query: &str| assistant.classify(query).map(|c| c.route);

    assert_eq!(
        route("revenue of channel Retail"),
        Some(Route::Entity(EntityType::Channel))
    );
    assert_eq!(
        route("revenue of channel champ Kavya"),
        Some(Route::Entity(EntityType::ChannelChamp))
    );
    assert_eq!(
        route("revenue of group channel champ Kiran"),
        Some(Route::Entity(EntityType::GroupChannelChamp))
    );
    assert_eq!(
        route("top partners for channel champ Kavya"),
        Some(Route::Pair {
            role: EntityType::ChannelChamp,
            entity: EntityType::Partner,
        })
    );
}

#[test]
fn test_group_business_manager_is_not_business_manager() {
    let assistant = csv_assistant();
    let route = |query: &str| assistant.classify(query).map(|c| c.route);

    assert_eq!(
        route("revenue of group business manager Gopal"),
        Some(Route::Entity(EntityType::GroupBusinessManager))
    );
    assert_eq!(
        route("revenue of business manager Ravi"),
        Some(Route::Entity(EntityType::BusinessManager))
    );
    assert_eq!(
        route("OEMs handled by business manager Ravi"),
        Some(Route::Pair {
            role: EntityType::BusinessManager,
            entity: EntityType::Oem,
        })
    );
}

#[test]
fn test_personnel_pair_answer() {
    let assistant = csv_assistant();
    let answer = assistant.process_query("OEMs handled by business manager Ravi");
    assert!(
        answer.starts_with("Business Manager Ravi with OEMs"),
        "{}",
        answer
    );
    assert!(answer.contains("Dell"));
    assert!(answer.contains("HP"));
}

#[test]
fn test_errors_are_prefixed() {
    let assistant = csv_assistant();

    let missing_year = assistant.process_query("revenue for partner Acme in 2030");
    assert_eq!(
        missing_year,
        "Error: No data for fiscal year 2030-31. Available years: 2022-23, 2023-24"
    );

    let unclassified = assistant.process_query("what is the weather like");
    assert!(unclassified.starts_with("Error: Sorry, I could not process that query"));

    assert_eq!(assistant.process_query(""), "Error: No query provided");
}

#[test]
fn test_special_commands() {
    let assistant = csv_assistant();

    let regional = assistant.process_query("regional table");
    assert!(regional.starts_with("Regional performance"));
    assert!(regional.contains("West"));

    let yearly = assistant.process_query("yearly table");
    assert!(yearly.starts_with("Yearly performance"));
    assert!(yearly.contains("2023-24"));

    let help = assistant.process_query("help");
    assert!(help.contains("regional table"));
}

#[test]
fn test_shared_assistant_reload() {
    let shared = Arc::new(SharedAssistant::new());
    assert_eq!(
        shared.process_query("total revenue"),
        "Error: No data loaded. Please upload a file first."
    );

    shared.reload(scenario_rows(), EngineConfig::default());
    assert!(shared.process_query("total revenue").contains("₹350.00"));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let shared = Arc::clone(&shared);
            scope.spawn(move || {
                for _ in 0..20 {
                    let answer = shared.process_query("total revenue");
                    assert!(answer.starts_with("Overall Revenue"), "{}", answer);
                }
            });
        }
        for revenue in [1000.0, 2000.0, 3000.0] {
            let rows = vec![TransactionRow::new(revenue, 10.0).with(EntityType::Partner, "Acme")];
            shared.reload(rows, EngineConfig::default());
        }
    });

    assert!(shared.process_query("total revenue").contains("₹3000.00"));
    assert_eq!(shared.status().rows, 1);
}

#[test]
fn test_config_schema_generation() {
    let schema = EngineConfig::schema_as_json().unwrap();
    assert!(schema.contains("fuzzy_match_threshold"));
    assert!(schema.contains("default_top_n"));

    let config = EngineConfig::from_json_str(r#"{"default_top_n": 3}"#).unwrap();
    assert_eq!(config.default_top_n, 3);
    assert_eq!(config.max_top_n, 50);
    assert!(EngineConfig::from_json_str(r#"{"default_top_n": 0}"#).is_err());
}
