//! mtgdb - main entry point.

use clap::Parser;
use colored::Colorize;
use mtgdb_build::assemble::{self, Assembler};
use mtgdb_build::cache::{HttpFetcher, SourceCache};
use mtgdb_build::lookups::Lookups;
use mtgdb_build::pipeline::{self, PipelineContext};
use mtgdb_build::{referral, BuildConfig, BuildReport};
use mtgdb_cli::{Cli, Commands};
use mtgdb_common::logging::{debug_env_enabled, init_logging, LogConfig, LogLevel};
use mtgdb_prices::providers::ProviderSet;
use mtgdb_prices::s3::PriceStore;
use mtgdb_prices::PriceBuilder;
use std::path::Path;
use std::process;
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.command.is_none() {
        eprintln!("Error: a subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    }

    let mut log_config = LogConfig::from_env().unwrap_or_default();
    if cli.verbose || debug_env_enabled() {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    let _ = init_logging(&log_config);

    let config = match BuildConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    if let Err(e) = execute(&cli, config.clone()).await {
        error!(error = %e, "run failed");
        eprintln!("{} {e}", "error:".red().bold());
        // A failed run must not leave half-written artifacts behind;
        // finished files were renamed into place and stay untouched.
        remove_partial_outputs(&config.output_path);
        process::exit(1);
    }
}

async fn execute(cli: &Cli, config: BuildConfig) -> mtgdb_common::Result<()> {
    let Some(command) = &cli.command else {
        unreachable!("command presence checked in main");
    };

    match command {
        Commands::Build {
            sets,
            all_sets,
            skip_sets,
            include_compiled_outputs,
            resume_build,
            formats,
            pretty,
            compress,
            from_cache,
            force_refresh,
        } => {
            let mut config = config;
            config.pretty = *pretty;
            config.resume = *resume_build;
            config.force_refresh = *force_refresh;
            if *from_cache {
                config.offline = true;
            }

            let set_filter: Vec<String> = if *all_sets {
                Vec::new()
            } else {
                sets.iter().map(|s| s.to_uppercase()).collect()
            };
            let skip: Vec<String> = skip_sets.iter().map(|s| s.to_uppercase()).collect();

            run_build(
                &config,
                set_filter,
                skip,
                formats,
                *include_compiled_outputs,
                *compress,
            )
            .await
        }

        Commands::Prices { bucket } => run_prices(&config, bucket.clone()).await,

        Commands::Referrals => {
            let cache = SourceCache::from_dir(&config, Vec::new(), Vec::new())?;
            let map = referral::build_referral_map(&config, &cache)?;
            referral::write_referral_map(&map, &config.output_path)?;
            println!("{} referral map ({} entries)", "✓".green(), map.len());
            Ok(())
        }
    }
}

async fn run_build(
    config: &BuildConfig,
    set_filter: Vec<String>,
    skip_sets: Vec<String>,
    formats: &[String],
    include_compiled: bool,
    compress: bool,
) -> mtgdb_common::Result<()> {
    let report = BuildReport::new();

    let cache = if config.offline {
        println!("{} offline mode: assembling from cached partitions", "→".cyan());
        SourceCache::from_dir(config, set_filter, Vec::new())?
    } else {
        println!("{} loading sources", "→".cyan());
        let fetcher = Arc::new(HttpFetcher::new()?);
        SourceCache::load_all(config, fetcher, set_filter, Vec::new()).await?
    };

    if !config.offline {
        let spinner = indicatif::ProgressBar::new_spinner();
        spinner.set_message("compiling cards");
        spinner.enable_steady_tick(std::time::Duration::from_millis(120));

        let lookups = Lookups::build(&cache)?;
        let ctx = PipelineContext {
            cache: &cache,
            lookups: &lookups,
            config,
            report: &report,
        };
        let outcome = pipeline::build_cards(&ctx)?;

        spinner.finish_and_clear();
        println!(
            "{} pipeline complete ({} card sets, {} token sets)",
            "✓".green(),
            outcome.card_sets.len(),
            outcome.token_sets.len()
        );
    }

    let assembler = Assembler::new(&cache, config, &report)?;

    // Skip-set exclusion applies at assembly: partitions stay cached.
    let codes: Vec<String> = assembler
        .set_codes()?
        .into_iter()
        .filter(|c| !skip_sets.contains(c))
        .collect();
    println!("{} assembling {} sets", "→".cyan(), codes.len());

    for format in formats {
        match format.as_str() {
            "json" => {
                assemble::json::write_all_printings(
                    &assembler,
                    &config.output_path.join("AllPrintings.json"),
                )?;
                assemble::json::write_individual_sets(&assembler, &config.output_path)?;
                if include_compiled {
                    assemble::json::write_atomic_cards(
                        &assembler,
                        &config.output_path.join("AtomicCards.json"),
                    )?;
                    assemble::json::write_set_list(
                        &assembler,
                        &config.output_path.join("SetList.json"),
                    )?;
                }
            }
            "sqlite" => assemble::sqlite::write_sqlite(
                &assembler,
                &config.output_path.join("AllPrintings.sqlite"),
            )?,
            "sql" => {
                assemble::sql::write_sql_dump(
                    &assembler,
                    &config.output_path.join("AllPrintings.sql"),
                )?;
            }
            "psql" => assemble::sql::write_psql_dump(
                &assembler,
                &config.output_path.join("AllPrintings.psql"),
            )?,
            "csv" => assemble::csv::write_csv(&assembler, &config.csv_output_dir())?,
            "parquet" => {
                assemble::parquet::write_nested(&assembler, &config.parquet_output_dir())?;
                assemble::parquet::write_normalized(
                    &assembler,
                    &config.parquet_output_dir().join("normalized"),
                )?;
            }
            other => {
                return Err(mtgdb_common::MtgdbError::config(
                    format!("unknown export format '{other}'"),
                    "Valid formats: json, sqlite, sql, psql, csv, parquet.",
                ))
            }
        }
    }

    if compress {
        // Artifact compression belongs to the release tooling; the flag is
        // accepted so wrappers can pass a single command line through.
        println!("{} compression deferred to release tooling", "→".cyan());
    }

    report.summarize();
    println!("{} build complete", "✓".green().bold());
    Ok(())
}

async fn run_prices(config: &BuildConfig, bucket: Option<String>) -> mtgdb_common::Result<()> {
    let report = Arc::new(BuildReport::new());

    let mut builder = PriceBuilder::new(config.clone());
    if let Some(bucket) = bucket {
        builder = builder.with_store(Arc::new(PriceStore::from_env(bucket).await));
    }

    // Provider transports are wired from the environment; a provider with
    // no configuration simply doesn't run.
    let providers = build_provider_set()?;

    builder.build(providers, Arc::clone(&report)).await?;
    report.summarize();
    println!("{} price build complete", "✓".green().bold());
    Ok(())
}

fn build_provider_set() -> mtgdb_common::Result<ProviderSet> {
    use mtgdb_cli::feeds;
    use mtgdb_prices::providers::{
        cardhoarder::CardhoarderProvider, cardkingdom::CardkingdomProvider,
        cardmarket::CardmarketProvider, manapool::ManapoolProvider, tcgplayer::TcgplayerProvider,
    };

    let mut set = ProviderSet::empty();
    if let Ok(base) = std::env::var("MTGDB_TCGPLAYER_URL") {
        set.tcgplayer = Some(TcgplayerProvider::new(Arc::new(
            feeds::HttpTcgplayerFeed::new(base)?,
        )));
    }
    if let (Ok(base), Ok(token)) = (
        std::env::var("MTGDB_CARDHOARDER_URL"),
        std::env::var("MTGDB_CARDHOARDER_TOKEN"),
    ) {
        set.cardhoarder = Some(CardhoarderProvider::new(Arc::new(
            feeds::HttpCardhoarderFeed::new(base, token)?,
        )));
    }
    if let Ok(base) = std::env::var("MTGDB_MANAPOOL_URL") {
        set.manapool = Some(ManapoolProvider::new(Arc::new(
            feeds::HttpManapoolFeed::new(base)?,
        )));
    }
    if let Ok(base) = std::env::var("MTGDB_CARDMARKET_URL") {
        set.cardmarket = Some(CardmarketProvider::new(Arc::new(
            feeds::HttpCardmarketFeed::new(base)?,
        )));
    }
    if let Ok(base) = std::env::var("MTGDB_CARDKINGDOM_URL") {
        set.cardkingdom = Some(CardkingdomProvider::new(Arc::new(
            feeds::HttpCardkingdomFeed::new(base)?,
        )));
    }
    Ok(set)
}

/// Remove leftover temp files from an aborted run. Finished artifacts were
/// renamed into place and are left alone.
fn remove_partial_outputs(output_path: &Path) {
    let Ok(entries) = std::fs::read_dir(output_path) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "tmp").unwrap_or(false) {
            let _ = std::fs::remove_file(&path);
        }
    }
}
