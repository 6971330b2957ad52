use clap::Parser;
use quotation_cli::obs::{init_metrics, init_tracing, LogFormat};
use quotation_cli::runner::{run, RunArgs};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quotation")]
#[command(
    about = "Quotation engine runner: prints backtest or realtime events as JSON lines.",
    version
)]
#[command(
    after_help = "Examples:\n  quotation --config configs/backtest.toml\n  QUOTATION_LOG=debug quotation --config configs/realtime.toml --max-events 100\n"
)]
struct Cli {
    /// Config file path (TOML). If omitted, uses env QUOTATION_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many events.
    #[arg(long)]
    max_events: Option<u64>,

    /// Default log filter when QUOTATION_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Prometheus listener (host:port). If omitted, uses env QUOTATION_METRICS_ADDR.
    #[arg(long)]
    metrics_addr: Option<String>,
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log_level, cli.log_format) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    let metrics_addr = cli
        .metrics_addr
        .clone()
        .or_else(|| env_non_empty("QUOTATION_METRICS_ADDR"));
    if let Err(err) = init_metrics(metrics_addr.as_deref()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let Some(config_path) = cli
        .config
        .or_else(|| env_non_empty("QUOTATION_CONFIG").map(PathBuf::from))
    else {
        eprintln!("error: --config is required (or set QUOTATION_CONFIG)");
        std::process::exit(2);
    };

    let args = RunArgs {
        config_path,
        max_events: cli.max_events,
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match run(&args, &mut out) {
        Ok(summary) => {
            eprintln!("{}", summary.to_json());
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}
