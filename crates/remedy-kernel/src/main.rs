//! `remedy` command line
//!
//! Offline front end to the kernel: score proposals, gate scores under the
//! configured policies, check rendered commands against the blocklist and
//! validate configuration files. No provider connectors are registered, so
//! nothing here touches a remote system. Remediation itself runs through
//! [`RemediationEngine::remediate`] in a host that wires in connectors.

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use remedy_kernel::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("remedy")
        .version(remedy_kernel::VERSION)
        .about("Auto-remediation kernel: risk scoring, policy gating and command safety checks")
        .after_help(
            "Evaluation only: no provider connectors are registered, so no subcommand \
             executes, snapshots or rolls back anything.",
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration (TOML)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("score")
                .about("Score a proposed action")
                .arg(Arg::new("action").long("action").required(true).help("Action type, e.g. restart"))
                .arg(
                    Arg::new("environment")
                        .long("environment")
                        .required(true)
                        .help("production, staging, development or any other name"),
                )
                .arg(
                    Arg::new("blast-radius")
                        .long("blast-radius")
                        .default_value("0")
                        .value_parser(value_parser!(u32))
                        .help("Number of units the action could affect"),
                )
                .arg(Arg::new("service").long("service").default_value("cli")),
        )
        .subcommand(
            Command::new("evaluate")
                .about("Gate a risk score, optionally under a configured policy")
                .arg(
                    Arg::new("score")
                        .long("score")
                        .required(true)
                        .value_parser(value_parser!(f64)),
                )
                .arg(Arg::new("action").long("action").required(true))
                .arg(Arg::new("service").long("service").default_value("cli"))
                .arg(
                    Arg::new("policy")
                        .long("policy")
                        .help("Name of a policy from the configuration"),
                ),
        )
        .subcommand(
            Command::new("check-command")
                .about("Check a rendered command against the blocklist")
                .arg(
                    Arg::new("command")
                        .required(true)
                        .num_args(1..)
                        .trailing_var_arg(true)
                        .allow_hyphen_values(true),
                ),
        )
        .subcommand(Command::new("config").about("Validate and print the effective configuration"))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<EngineConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Engine without connectors; only the evaluation paths are usable
fn build_engine(config: EngineConfig) -> anyhow::Result<RemediationEngine> {
    let router = Arc::new(ConnectorRouter::new());
    RemediationEngine::new(config, router, Arc::new(TracingSink)).context("building engine")
}

fn run(matches: &ArgMatches) -> anyhow::Result<ExitCode> {
    let config = load_config(matches)?;

    match matches.subcommand() {
        Some(("score", args)) => {
            let action: ActionType = args.get_one::<String>("action").map_or(
                ActionType::Custom(String::new()),
                |s| ActionType::from(s.as_str()),
            );
            let environment = args
                .get_one::<String>("environment")
                .map_or(Environment::Staging, |s| Environment::from(s.as_str()));
            let blast_radius = args.get_one::<u32>("blast-radius").copied().unwrap_or(0);
            let service = args.get_one::<String>("service").map_or("cli", String::as_str);

            let engine = build_engine(config)?;
            let assessment =
                engine.calculate_risk_score(service, &action, &environment, blast_radius);
            println!("{}", serde_json::to_string_pretty(&assessment)?);
            Ok(ExitCode::SUCCESS)
        }
        Some(("evaluate", args)) => {
            let score = args.get_one::<f64>("score").copied().unwrap_or(f64::NAN);
            let action = args
                .get_one::<String>("action")
                .map_or(ActionType::Custom(String::new()), |s| ActionType::from(s.as_str()));
            let service = args.get_one::<String>("service").map_or("cli", String::as_str);
            let policy_name = args.get_one::<String>("policy");

            let engine = build_engine(config)?;
            let policy_id = match policy_name {
                Some(name) => Some(
                    engine
                        .list_policies()
                        .into_iter()
                        .find(|p| &p.name == name)
                        .map(|p| p.id)
                        .with_context(|| format!("no configured policy named '{name}'"))?,
                ),
                None => None,
            };

            let decision = engine.evaluate_decision(service, &action, score, policy_id)?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(if decision.outcome == DecisionOutcome::Block {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Some(("check-command", args)) => {
            let command = args
                .get_many::<String>("command")
                .map(|parts| parts.cloned().collect::<Vec<_>>().join(" "))
                .unwrap_or_default();

            let engine = build_engine(config)?;
            match engine.check_command(&command) {
                Ok(()) => {
                    println!("allowed");
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    println!("rejected: {err}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Some(("config", _)) => {
            build_engine(config.clone())?;
            print!("{}", config.to_toml_string()?);
            Ok(ExitCode::SUCCESS)
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    match run(&matches) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn help_says_nothing_is_executed() {
        let help = cli().render_long_help().to_string();
        assert!(help.contains("Evaluation only"));
    }

    #[test]
    fn check_command_takes_flags_as_words() {
        let matches = cli()
            .try_get_matches_from(["remedy", "check-command", "rm", "-r", "-f", "/"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let words: Vec<_> = args.get_many::<String>("command").unwrap().cloned().collect();
        assert_eq!(words, ["rm", "-r", "-f", "/"]);
    }
}
