use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use scheduledb_db::MongoAdmin;
use scheduledb_init::verify::{self, VerifyOptions};
use scheduledb_kernel::settings::{CreateMode, Settings};

#[derive(Debug, Parser)]
#[command(name = "scheduledb", version, about = "Provision the schedule_db database")]
struct Cli {
    /// Directory holding base.toml and <env>.toml
    #[arg(long, global = true, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// MongoDB connection string, overriding database.uri
    #[arg(long, global = true, value_name = "URI")]
    uri: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the application user and collections
    Run {
        /// Do not log in as the administrative principal first
        #[arg(long)]
        skip_admin_auth: bool,
        /// Fail when the user or a collection already exists
        #[arg(long)]
        strict: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the steps a run would perform, without connecting
    Plan {
        #[arg(long)]
        skip_admin_auth: bool,
        #[arg(long)]
        json: bool,
    },
    /// Check that the database matches the configured layout
    Verify {
        /// Report collections that hold documents
        #[arg(long)]
        expect_empty: bool,
        /// Finish by logging in as the application user
        #[arg(long)]
        check_login: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            // Settings can fail before telemetry is installed.
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load_from(cli.config_dir.clone()).with_context(|| "failed to load scheduledb settings")?;
    if let Some(uri) = cli.uri.clone() {
        settings.database.uri = uri;
    }
    scheduledb_telemetry::init(&settings.telemetry).ok();

    match cli.command {
        Command::Plan {
            skip_admin_auth,
            json,
        } => {
            if skip_admin_auth {
                settings.bootstrap.admin.authenticate = false;
            }
            settings.bootstrap.validate()?;

            let plan = scheduledb_init::build_registry(&settings.bootstrap).describe();
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                for (position, step) in plan.iter().enumerate() {
                    println!("{}. {}  ({})", position + 1, step.name, step.description);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            skip_admin_auth,
            strict,
            json,
        } => {
            if skip_admin_auth {
                settings.bootstrap.admin.authenticate = false;
            }
            if strict {
                settings.bootstrap.mode = CreateMode::Strict;
            }

            let runtime = tokio::runtime::Runtime::new()?;
            let report = runtime.block_on(async {
                let admin = MongoAdmin::connect(&settings.database).await?;
                scheduledb_init::run(&settings.bootstrap, &admin).await
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for record in &report.steps {
                    println!("{:<32} {:?}", record.name, record.outcome);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify {
            expect_empty,
            check_login,
            json,
        } => {
            settings.bootstrap.validate()?;

            let options = VerifyOptions {
                expect_empty,
                check_login,
            };

            let runtime = tokio::runtime::Runtime::new()?;
            let report = runtime.block_on(async {
                let admin = MongoAdmin::connect(&settings.database).await?;
                verify::verify(&settings.bootstrap, &admin, options).await
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_clean() {
                println!("{} matches the configured layout", settings.bootstrap.target_database);
            } else {
                for finding in &report.findings {
                    println!("{:?}: {}", finding.kind, finding.detail);
                }
            }

            Ok(if report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
