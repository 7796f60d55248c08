//! sales-query: answer questions about a sales CSV from the command line.
//!
//! Usage:
//!   sales-query --data sales.csv --query "Show top partners by revenue"
//!   sales-query --data sales.csv --status
//!   sales-query --data sales.csv            (one question per line on stdin)

use clap::Parser;
use sales_query_engine::{EngineConfig, Result, SalesAssistant};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Answer plain-language questions about a table of sales transactions.")]
struct Args {
    /// Sales transactions as CSV, one row per transaction line.
    #[arg(long, required_unless_present = "config_schema")]
    data: Option<PathBuf>,

    /// Engine configuration as JSON. Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Question to answer (repeatable). Without one, questions are read from stdin.
    #[arg(long = "query")]
    queries: Vec<String>,

    /// Print the dataset status as JSON and exit.
    #[arg(long)]
    status: bool,

    /// Print the JSON schema of the configuration file and exit.
    #[arg(long)]
    config_schema: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.config_schema {
        println!("{}", EngineConfig::schema_as_json()?);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    let Some(data) = &args.data else {
        return Ok(());
    };
    let assistant = SalesAssistant::from_csv_path(data, config)?;

    if args.status {
        println!("{}", serde_json::to_string_pretty(&assistant.status())?);
        return Ok(());
    }

    if !args.queries.is_empty() {
        for query in &args.queries {
            println!("{}\n", assistant.process_query(query));
        }
        return Ok(());
    }

    interactive(&assistant)
}

fn interactive(assistant: &SalesAssistant) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let status = assistant.status();
    println!(
        "{} rows loaded ({}). Type 'help' for examples, 'quit' to exit.",
        status.rows,
        status.years.join(", ")
    );

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        match query {
            "" => continue,
            "quit" | "exit" => break,
            _ => println!("{}\n", assistant.process_query(query)),
        }
    }
    Ok(())
}
