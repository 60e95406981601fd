//! criteria: render criteria documents from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Render a criteria document
//! criteria render query.toml
//!
//! # Show the three queries of page 2
//! criteria page query.toml --page 2 --size 25
//!
//! # Show how an expression parses and resolves
//! criteria explain "d.contacts[1].name" --entity Document --alias d
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use criteria::ast::{Expression, Parameter, PathElement};
use criteria::config::{Config, CriteriaDocument};
use criteria::{Criteria, Query};
use tracing::debug;

#[derive(Parser)]
#[command(name = "criteria")]
#[command(version)]
#[command(about = "Build and render criteria queries", long_about = None)]
#[command(after_help = "EXAMPLES:
    criteria render query.toml --format json
    criteria page query.toml --page 3
    criteria explain 'd.owner.contacts[:key]' --entity Document --alias d")]
struct Cli {
    /// Configuration file (defaults to ./criteria.toml, then the user config directory)
    #[arg(short, long, global = true, env = "CRITERIA_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a criteria document to query text and parameters
    Render {
        /// TOML criteria document
        file: PathBuf,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Show the count, id and object queries of one page
    Page {
        /// TOML criteria document
        file: PathBuf,

        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Page size (defaults to the configured page size)
        #[arg(short, long)]
        size: Option<usize>,

        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Parse an expression and show how it resolves
    Explain {
        /// Expression text
        expression: String,

        /// Root entity used for resolution
        #[arg(long, default_value = "Entity")]
        entity: String,

        /// Root alias used for resolution
        #[arg(long, default_value = "e")]
        alias: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "criteria=debug" } else { "criteria=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    debug!(?config, "configuration");

    match &cli.command {
        Commands::Render { file, format } => {
            let mut criteria = load(file, &config)?;
            let query = criteria.query()?;
            print_query("Query", &query, *format)
        }
        Commands::Page {
            file,
            page,
            size,
            format,
        } => {
            let mut criteria = load(file, &config)?;
            let size = size.unwrap_or(config.pagination.page_size);
            let mut paged = criteria.page(*page, size)?;
            let queries = [
                ("Count query", paged.count_query()?.clone()),
                ("Id query", paged.id_query()?.clone()),
                ("Object query", paged.object_query()?.clone()),
            ];
            match format {
                OutputFormat::Json => {
                    let map: BTreeMap<&str, &Query> = queries.iter().map(|(k, q)| (*k, q)).collect();
                    println!("{}", serde_json::to_string_pretty(&map)?);
                }
                OutputFormat::Table => {
                    println!(
                        "{} page {} of size {} (first result {})",
                        "Pagination:".cyan().bold(),
                        paged.page(),
                        paged.page_size(),
                        paged.first_result()
                    );
                    for (title, query) in &queries {
                        println!();
                        print_query(title, query, OutputFormat::Table)?;
                    }
                }
            }
            Ok(())
        }
        Commands::Explain {
            expression,
            entity,
            alias,
        } => explain(expression, entity, alias, &config),
    }
}

fn load(file: &Path, config: &Config) -> Result<Criteria> {
    let document = CriteriaDocument::load(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    Ok(document.build(config.render.clone())?)
}

fn print_query(title: &str, query: &Query, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(query)?),
        OutputFormat::Table => {
            println!("{}", format!("{}:", title).green().bold());
            println!("  {}", query.text.white());
            if let (Some(first), Some(max)) = (query.first_result, query.max_results) {
                println!("  {} first {} max {}", "Range:".dimmed(), first, max);
            }
            if !query.parameters.is_empty() {
                println!("  {}", "Parameters:".cyan());
                for (name, value) in &query.parameters {
                    println!("    :{} = {}", name, value.to_string().yellow());
                }
            }
        }
    }
    Ok(())
}

fn explain(expression: &str, entity: &str, alias: &str, config: &Config) -> Result<()> {
    println!("{} {}", "Expression:".dimmed(), expression.yellow());
    println!();

    let parsed = criteria::parse(expression)?;
    println!("{}", "Parsed Structure:".green().bold());
    describe(&parsed, 1);

    let mut criteria = Criteria::from(entity, alias)?.with_options(config.render.clone());
    criteria.select(expression)?;
    println!();
    println!("{}", "Resolved Query:".green().bold());
    println!("  {}", criteria.query_string()?.white());
    Ok(())
}

fn describe(expr: &Expression, depth: usize) {
    let indent = "  ".repeat(depth);
    match expr {
        Expression::Path(path) => {
            println!("{}{}", indent, "Path".cyan());
            for element in &path.elements {
                match element {
                    PathElement::Property(name) => println!("{}  • {}", indent, name.white()),
                    PathElement::ArrayAccess { property, index } => {
                        println!("{}  • {} {}", indent, property.white(), "[key]".dimmed());
                        describe(index, depth + 2);
                    }
                }
            }
        }
        Expression::Function(func) => {
            println!("{}{} {}", indent, "Function".cyan(), func.name.white());
            for arg in &func.args {
                describe(arg, depth + 1);
            }
        }
        Expression::Composite(parts) => {
            println!("{}{}", indent, "Composite".cyan());
            for part in parts {
                describe(part, depth + 1);
            }
        }
        Expression::Parameter(Parameter::Named(name)) => {
            println!("{}{} :{}", indent, "Parameter".cyan(), name.yellow())
        }
        Expression::Parameter(Parameter::Bound { value, .. }) => {
            println!("{}{} {}", indent, "Value".cyan(), value.to_string().yellow())
        }
        other => println!("{}{} {}", indent, "Literal".cyan(), other.to_string().white()),
    }
}
