mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use recordflow::prelude::*;

use logging::{LogFormat, LogLevel};

/// Exit code for unreadable or invalid configuration and input.
const EXIT_SETUP_ERROR: u8 = 1;
/// Exit code for a halted run.
const EXIT_HALTED: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "recordflow",
    version,
    about = "Run records through ingestion, deduplication and quality services"
)]
struct Cli {
    /// Pipeline configuration (YAML, or JSON with a .json extension)
    #[arg(long, default_value = "pipeline_config.yaml")]
    config: PathBuf,

    /// Input records (JSON array of objects)
    #[arg(long, default_value = "sample_data.json")]
    input: PathBuf,

    /// Skip HTTP calls and echo payloads back
    #[arg(long)]
    simulate: bool,

    /// Log level; `RUST_LOG` takes precedence
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write the JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(cli.log_level, cli.log_format);

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_HALTED),
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(EXIT_SETUP_ERROR)
        }
    }
}

/// Loads inputs, runs the pipeline and reports. Returns whether the run succeeded.
async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = load_config(&cli.config)
        .with_context(|| format!("loading configuration {}", cli.config.display()))?;
    let config = Arc::new(config);
    let records = load_records(&cli.input)
        .with_context(|| format!("loading input {}", cli.input.display()))?;

    let gateway: Arc<dyn ServiceGateway> = if cli.simulate {
        Arc::new(Gateway::simulated(Arc::clone(&config)))
    } else {
        Arc::new(Gateway::live(Arc::clone(&config)).context("building HTTP client")?)
    };

    let token = Arc::new(CancellationToken::new());
    let signal_token = Arc::clone(&token);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel("interrupted by user");
        }
    });
    // Let the listener register its handler before the run starts.
    tokio::task::yield_now().await;

    let runner = StageRunner::new(config, gateway)
        .with_event_sink(Arc::new(LoggingEventSink::debug()))
        .with_cancellation(token);
    let outcome = runner.run(records).await;

    log_run(&outcome.run);
    print!("{}", render_text(&outcome.run));

    if let Some(path) = &cli.report {
        write_report(&outcome.run, path)
            .with_context(|| format!("writing report {}", path.display()))?;
    }

    Ok(outcome.run.is_succeeded())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["recordflow"]);
        assert_eq!(cli.config, PathBuf::from("pipeline_config.yaml"));
        assert_eq!(cli.input, PathBuf::from("sample_data.json"));
        assert!(!cli.simulate);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(cli.report.is_none());
    }

    #[test]
    fn test_all_flags() {
        let cli = Cli::parse_from([
            "recordflow",
            "--config",
            "conf.json",
            "--input",
            "in.json",
            "--simulate",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--report",
            "out/report.json",
        ]);
        assert_eq!(cli.config, PathBuf::from("conf.json"));
        assert!(cli.simulate);
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.report, Some(PathBuf::from("out/report.json")));
    }

    #[test]
    fn test_rejects_unknown_level() {
        assert!(Cli::try_parse_from(["recordflow", "--log-level", "loud"]).is_err());
    }

    #[tokio::test]
    async fn test_missing_config_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "recordflow",
            "--config",
            dir.path().join("absent.yaml").to_str().unwrap(),
        ]);
        let err = run(&cli).await.unwrap_err();
        assert!(format!("{err:#}").contains("loading configuration"));
    }

    #[tokio::test]
    async fn test_simulated_run_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("pipeline.yaml");
        let input = dir.path().join("records.json");
        let report = dir.path().join("report.json");
        std::fs::write(
            &config,
            "stages:\n  dataingestion:\n    endpoint: http://127.0.0.1:9/api/v1/dataingestion\n",
        )
        .unwrap();
        std::fs::write(&input, r#"[{"source_record_id": "A", "purchase_amount": 5}]"#).unwrap();

        let cli = Cli::parse_from([
            "recordflow",
            "--config",
            config.to_str().unwrap(),
            "--input",
            input.to_str().unwrap(),
            "--simulate",
            "--report",
            report.to_str().unwrap(),
        ]);

        assert!(run(&cli).await.unwrap());
        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(document["simulated"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_blocking_quality_failure_reports_halt() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("pipeline.yaml");
        let input = dir.path().join("records.json");
        let report = dir.path().join("report.json");
        std::fs::write(
            &config,
            "stages:\n  dataingestion:\n    endpoint: http://127.0.0.1:9/api/v1/dataingestion\n  dataquality:\n    endpoint: http://127.0.0.1:9/api/v1/dataquality\n    blocking: true\n",
        )
        .unwrap();
        std::fs::write(
            &input,
            r#"[{"source_record_id": "A", "purchase_amount": -5, "customer_email": "bad"}]"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "recordflow",
            "--config",
            config.to_str().unwrap(),
            "--input",
            input.to_str().unwrap(),
            "--simulate",
            "--report",
            report.to_str().unwrap(),
        ]);

        assert!(!run(&cli).await.unwrap());
        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(document["status"]["state"], serde_json::json!("halted"));
        assert_eq!(document["status"]["stage"], serde_json::json!("dataquality"));
    }
}
