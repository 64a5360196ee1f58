use std::io::{self, IsTerminal as _};

use anyhow::Result;
use chrono::{Local, SecondsFormat};
use logging::debug_with_status;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::Writer, time::FormatTime},
    prelude::*,
    EnvFilter,
};

pub const LOG_ENV_VARIABLE: &str = "CHAIND_LOG";

const CRATES_LOGGING_AT_INFO: &[&str] = &[
    "binary_utils",
    "chain_control",
    "chain_store",
    "clock",
    "panics",
    "prometheus_metrics",
];

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> core::fmt::Result {
        write!(
            w,
            "[{}]",
            Local::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

pub fn initialize_tracing_logger(module_path: &str, always_write_style: bool) -> Result<()> {
    let overrides = std::env::var(LOG_ENV_VARIABLE).ok();
    let filter = log_filter(module_path, overrides.as_deref())?;
    let enable_ansi = always_write_style || io::stdout().is_terminal();

    let stdout_layer = fmt::layer()
        .compact()
        .with_thread_ids(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(true)
        .with_timer(LocalTimer)
        .with_ansi(enable_ansi)
        .with_filter(filter);

    tracing_subscriber::registry().with(stdout_layer).try_init()?;

    debug_with_status!("tracing started");

    Ok(())
}

/// Logs nothing except `info` and above from workspace crates, then applies `overrides`.
///
/// `overrides` uses the `EnvFilter` directive syntax, e.g. `chain_control=debug,chain_store=warn`.
pub fn log_filter(module_path: &str, overrides: Option<&str>) -> Result<EnvFilter> {
    let mut filter = EnvFilter::default().add_directive(LevelFilter::OFF.into());

    for crate_name in CRATES_LOGGING_AT_INFO.iter().copied().chain([module_path]) {
        filter = filter.add_directive(format!("{crate_name}=info").parse()?);
    }

    for directive in overrides
        .into_iter()
        .flat_map(|overrides| overrides.split(','))
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
    {
        filter = filter.add_directive(directive.parse()?);
    }

    Ok(filter)
}
