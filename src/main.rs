use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use financial_agent_db::{
    config::{Config, LogFormat},
    AppResult, Collection, Connector, Harness, MemoryConnector, MongoConnector, Provisioner,
    Repositories, SeedOutcome, Seeder, ValidationReport,
};

#[derive(Parser)]
#[command(name = "financial-agent-db")]
#[command(version, about = "MongoDB setup for the financial investigation agents", long_about = None)]
struct Cli {
    /// Run against an in-process store instead of MongoDB
    #[arg(long, global = true)]
    in_memory: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create collections and indexes, insert sample data, run validation
    Setup {
        /// Do not insert sample data
        #[arg(long)]
        skip_sample_data: bool,

        /// Do not run the validation harness
        #[arg(long)]
        skip_validation: bool,

        /// Write .env.example to the current directory
        #[arg(long)]
        write_env_example: bool,
    },

    /// Run the validation harness
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database.name,
        in_memory = cli.in_memory,
        "financial-agent-db starting..."
    );

    let connector: Arc<dyn Connector> = if cli.in_memory {
        Arc::new(MemoryConnector::new())
    } else {
        Arc::new(MongoConnector::new(config.database.clone()))
    };

    let passed = match cli.command {
        Commands::Setup {
            skip_sample_data,
            skip_validation,
            write_env_example,
        } => {
            let options = SetupOptions {
                skip_sample_data,
                skip_validation,
                write_env_example,
                json: cli.json,
            };
            match setup(connector, &options).await {
                Ok(passed) => passed,
                Err(e) => {
                    error!(error = %e, "Setup failed");
                    if !cli.json {
                        println!("\n❌ Error during setup: {}", e);
                    }
                    false
                }
            }
        }
        Commands::Validate => {
            let report = Harness::new(connector).run().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            report.passed()
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

struct SetupOptions {
    skip_sample_data: bool,
    skip_validation: bool,
    write_env_example: bool,
    json: bool,
}

async fn setup(connector: Arc<dyn Connector>, options: &SetupOptions) -> anyhow::Result<bool> {
    let banner = |text: &str| {
        if !options.json {
            println!("{}", text);
        }
    };

    if options.write_env_example {
        write_env_example(Path::new(".env.example"))?;
        banner("Created .env.example");
    }

    banner("Starting Financial AI Agent MongoDB setup...");
    let provisioner = Provisioner::new(Arc::clone(&connector));

    banner("\n--- Step 1: Creating collections with schema validation ---");
    provisioner.create_collections().await?;

    banner("\n--- Step 2: Creating indexes for efficient querying ---");
    provisioner.ensure_indexes().await?;

    let mut seed = None;
    if !options.skip_sample_data {
        banner("\n--- Step 3: Inserting sample data ---");
        let outcome = Seeder::new()
            .run(&Repositories::new(Arc::clone(&connector)))
            .await?;
        if !options.json {
            print_seed_outcome(&outcome);
        }
        seed = Some(outcome);
    }

    let mut validation = None;
    if !options.skip_validation {
        banner("\n--- Step 4: Running validation tests ---");
        let report = Harness::new(connector).run().await;
        if !options.json {
            print_report(&report);
        }
        validation = Some(report);
    }

    let passed = validation.as_ref().map_or(true, ValidationReport::passed);

    if options.json {
        let summary = serde_json::json!({
            "passed": passed,
            "seed": seed,
            "validation": validation,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if passed {
        println!("\n✅ Financial AI Agent MongoDB setup completed successfully!");
        println!("The following collections are now available:");
        for collection in Collection::ALL {
            println!("- {}: {}", collection.name(), collection.summary());
        }
    } else {
        println!("\n❌ Financial AI Agent MongoDB setup encountered errors.");
        println!("Please check the logs above for details.");
    }

    Ok(passed)
}

fn write_env_example(path: &Path) -> AppResult<()> {
    Config::write_env_example(path)?;
    info!(path = %path.display(), "Wrote env template");
    Ok(())
}

fn print_seed_outcome(outcome: &SeedOutcome) {
    match outcome {
        SeedOutcome::Inserted(report) => {
            println!("Sample General Assistant created with ID: {}", report.assistant_id);
            for agent in &report.agents {
                println!("Sample {} Agent created with ID: {}", agent.agent_type, agent.id);
            }
            for id in &report.conversation_ids {
                println!("Sample Conversation created with ID: {}", id);
            }
        }
        SeedOutcome::AlreadyPresent { assistant_id } => {
            println!(
                "Sample data already present (assistant {}), skipping",
                assistant_id
            );
        }
    }
}

fn print_report(report: &ValidationReport) {
    for result in &report.phases {
        match &result.error {
            None => println!("✅ {} successful", result.phase),
            Some(e) => println!("❌ {} failed: {}", result.phase, e),
        }
    }
    match report.failed_phase() {
        None if report.passed() => println!("✅ All validation tests passed successfully"),
        Some(failed) => println!("❌ Validation failed at {}", failed.phase),
        None => println!("❌ Validation did not complete"),
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
