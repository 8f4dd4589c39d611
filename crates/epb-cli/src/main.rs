//! `eddypro-batch`: run EddyPro over years and parameter scenarios

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{value_parser, Arg, ArgAction, Command};
use epb_core::{DEFAULT_CONFIG_PATH, LOG_LEVELS};

mod commands;
mod logging;

/// Chart modes accepted by `--report-charts`
const CHART_MODES: [&str; 3] = ["plotly", "svg", "none"];

fn run_args() -> Vec<Arg> {
    vec![
        Arg::new("dry-run")
            .long("dry-run")
            .action(ArgAction::SetTrue)
            .help("Prepare project files without running EddyPro"),
        Arg::new("site")
            .long("site")
            .help("Override the configured site_id"),
        Arg::new("years")
            .long("years")
            .num_args(1..)
            .value_parser(value_parser!(i32))
            .help("Override the configured years_to_process"),
        Arg::new("report-charts")
            .long("report-charts")
            .value_parser(CHART_MODES)
            .help("Chart rendering for the HTML report"),
        Arg::new("metrics-interval")
            .long("metrics-interval")
            .value_parser(value_parser!(f64))
            .help("Performance sampling interval in seconds"),
    ]
}

fn scenario_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .num_args(1..)
        .value_parser(value_parser!(i64))
        .help(help)
}

fn build_cli() -> Command {
    Command::new("eddypro-batch")
        .version(epb_core::VERSION)
        .about("EddyPro batch processor: scenario matrices, monitored runs and run reports")
        .subcommand_help_heading("Available commands")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .default_value(DEFAULT_CONFIG_PATH)
                .value_parser(value_parser!(PathBuf))
                .help("Path to the configuration YAML file"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .ignore_case(true)
                .value_parser(LOG_LEVELS.to_vec())
                .help("Override the configured log level"),
        )
        .subcommand(
            Command::new("run")
                .about("Run the baseline configuration for every year")
                .args(run_args()),
        )
        .subcommand(
            Command::new("scenarios")
                .about("Run a matrix of processing-parameter scenarios")
                .arg(scenario_arg("rot-meth", "Axis rotation methods (1, 3)"))
                .arg(scenario_arg("tlag-meth", "Time-lag methods (2, 4)"))
                .arg(scenario_arg("detrend-meth", "Detrending methods (0, 1)"))
                .arg(scenario_arg("despike-meth", "Despiking methods (0, 1)"))
                .arg(
                    Arg::new("max-scenarios")
                        .long("max-scenarios")
                        .value_parser(value_parser!(usize))
                        .help("Refuse matrices larger than this (default: max_scenarios)"),
                )
                .args(run_args()),
        )
        .subcommand(
            Command::new("validate")
                .about("Check the configuration, paths and ECMD file")
                .arg(
                    Arg::new("skip-paths")
                        .long("skip-paths")
                        .action(ArgAction::SetTrue)
                        .help("Skip filesystem existence checks"),
                )
                .arg(
                    Arg::new("skip-ecmd")
                        .long("skip-ecmd")
                        .action(ArgAction::SetTrue)
                        .help("Skip ECMD schema and sanity checks"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Show the last run recorded in the reports directory")
                .arg(
                    Arg::new("reports-dir")
                        .long("reports-dir")
                        .value_parser(value_parser!(PathBuf))
                        .help("Reports directory; defaults to the configured one"),
                ),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = build_cli();
    let matches = cli.clone().get_matches();

    let globals = matches.subcommand().map_or(&matches, |(_, args)| args);
    let config_path = globals
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    logging::init(
        globals.get_one::<String>("log-level").map(String::as_str),
        &config_path,
    );

    let result = match matches.subcommand() {
        Some(("run", args)) => commands::run(&config_path, args).await,
        Some(("scenarios", args)) => commands::scenarios(&config_path, args).await,
        Some(("validate", args)) => commands::validate(&config_path, args),
        Some(("status", args)) => commands::status(&config_path, args),
        _ => {
            let _ = cli.print_help();
            println!();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            println!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        build_cli().debug_assert();
    }

    #[test]
    fn scenario_values_are_lists() {
        let matches = build_cli()
            .try_get_matches_from([
                "eddypro-batch",
                "scenarios",
                "--rot-meth",
                "1",
                "3",
                "--years",
                "2020",
                "2021",
                "--dry-run",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let rot: Vec<i64> = args.get_many::<i64>("rot-meth").unwrap().copied().collect();
        assert_eq!(rot, vec![1, 3]);
        let years: Vec<i32> = args.get_many::<i32>("years").unwrap().copied().collect();
        assert_eq!(years, vec![2020, 2021]);
        assert!(args.get_flag("dry-run"));
        assert_eq!(args.get_one::<usize>("max-scenarios"), None);
    }

    #[test]
    fn global_options_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from([
                "eddypro-batch",
                "validate",
                "--config",
                "site.yaml",
                "--log-level",
                "debug",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(
            args.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("site.yaml"))
        );
        let level = args.get_one::<String>("log-level").unwrap();
        assert!(level.eq_ignore_ascii_case("debug"));
    }

    #[test]
    fn unknown_chart_mode_is_rejected() {
        let result = build_cli().try_get_matches_from([
            "eddypro-batch",
            "run",
            "--report-charts",
            "png",
        ]);
        assert!(result.is_err());
    }
}
