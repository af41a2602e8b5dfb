use std::process;

use clap::{Arg, ArgMatches, Command};
use log::error;

use apep::{Config, PgGateway, ScenarioRunner, inspect, scenarios, seed};

const DEFAULT_CONFIG: &str = "./conf.d/env.toml";

fn build_cli() -> Command {
    Command::new("apep")
        .about("Reproduces transaction isolation anomalies against a live PostgreSQL server")
        .arg(
            Arg::new("config")
                .short('f')
                .long("config")
                .value_name("PATH")
                .default_value(DEFAULT_CONFIG)
                .help("config file path")
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("dirty-read")
                .about("Reader at read uncommitted observes an insert that is later rolled back"),
        )
        .subcommand(
            Command::new("read-skew")
                .about("Two reads of the same row within one transaction return different values"),
        )
        .subcommand(
            Command::new("lost-update")
                .about("The later of two read-then-write commits erases the earlier one"),
        )
        .subcommand(
            Command::new("write-skew-insert")
                .about("Two inserts each justified by a row count the other invalidates"),
        )
        .subcommand(
            Command::new("write-skew-debit")
                .about("Two debits each permitted by a balance check the other invalidates"),
        )
        .subcommand(
            Command::new("lock-escalation")
                .about("A share lock on the secondary index fails to block a primary-key write"),
        )
        .subcommand(
            Command::new("concurrent-transfer")
                .about("Exclusive row locks serialize two concurrent transfers"),
        )
        .subcommand(
            Command::new("show-tables").about("Lists public tables and their columns"),
        )
        .subcommand(
            Command::new("generate-data").about("Truncates and bulk-seeds the test tables"),
        )
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = build_cli().get_matches();
    let config_path = matches
        .get_one::<String>("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&matches, &config).await {
        error!("{e}");
        process::exit(1);
    }
}

/// Dispatches the selected subcommand. Scenario runs succeed (exit 0)
/// whether or not the anomaly manifested; only infrastructure failures
/// propagate as errors.
async fn run(matches: &ArgMatches, config: &Config) -> apep::Result<()> {
    let gateway = PgGateway::connect(config).await?;

    match matches.subcommand() {
        Some(("show-tables", _)) => inspect::show_tables(&gateway).await,
        Some(("generate-data", _)) => seed::generate(&gateway).await,
        Some((name, _)) => {
            let scenario = match name {
                "dirty-read" => scenarios::dirty_read(),
                "read-skew" => scenarios::read_skew(),
                "lost-update" => scenarios::lost_update(),
                "write-skew-insert" => scenarios::write_skew_insert(),
                "write-skew-debit" => scenarios::write_skew_debit(),
                "lock-escalation" => scenarios::lock_escalation(config.blocked_threshold()),
                "concurrent-transfer" => {
                    scenarios::concurrent_transfer(config.blocked_threshold())
                }
                _ => unreachable!("clap rejects unknown subcommands"),
            };
            let runner = ScenarioRunner::from_config(gateway, config);
            runner.run(scenario).await.map(|_| ())
        }
        None => unreachable!("clap requires a subcommand"),
    }
}
