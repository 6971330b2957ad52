//! Log and metrics wiring for the runner. stdout is reserved for the JSON event stream, so
//! every log line goes to stderr.

use std::net::SocketAddr;

/// Env var that overrides `--log-level` with a full `EnvFilter` directive.
pub const LOG_ENV: &str = "QUOTATION_LOG";

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Picks the filter directive: a non-blank `QUOTATION_LOG` wins over the CLI level.
pub fn log_directive(env_value: Option<&str>, log_level: &str) -> String {
    match env_value.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => log_level.trim().to_string(),
    }
}

pub fn init_tracing(log_level: &str, format: LogFormat) -> Result<(), String> {
    let env_value = std::env::var(LOG_ENV).ok();
    let directive = log_directive(env_value.as_deref(), log_level);
    let env_filter = tracing_subscriber::EnvFilter::try_new(&directive)
        .map_err(|err| format!("invalid log filter `{directive}`: {err}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

/// Parses the exporter listener address; `localhost` is accepted as a loopback alias.
pub fn parse_metrics_addr(raw: &str) -> Result<SocketAddr, String> {
    let trimmed = raw.trim();
    let normalized = match trimmed.strip_prefix("localhost:") {
        Some(port) => format!("127.0.0.1:{port}"),
        None => trimmed.to_string(),
    };
    normalized
        .parse()
        .map_err(|err| format!("invalid metrics address `{trimmed}` (expected host:port): {err}"))
}

#[cfg(feature = "prometheus")]
pub fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, String> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let Some(raw) = metrics_addr else {
        return Ok(None);
    };
    let addr = parse_metrics_addr(raw)?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| format!("failed to install prometheus exporter: {err}"))?;

    tracing::info!(metrics_addr = %addr, "quotation metrics exporter listening");
    Ok(Some(addr))
}

#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, String> {
    match metrics_addr {
        Some(raw) => {
            parse_metrics_addr(raw)?;
            Err("metrics exporter requires quotation-cli feature `prometheus`".to_string())
        }
        None => Ok(None),
    }
}
