use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use anyhow::{Error, Result};
use chain_control::{Controller, Error as ControlError, UiContext};
use itertools::Itertools as _;
use logging::debug_with_status;
use parking_lot::Mutex;
use prometheus_metrics::Metrics;
use std_ext::ArcExt as _;
use strum::EnumString;
use types::BlockHash;

const HELP: &[(&str, &str)] = &[
    ("info", "show the best tip and block counts"),
    ("pending", "show how many blocks are waiting for their parents"),
    ("received HASH", "show when a block was received and how long accepting it took"),
    ("counters", "show block ingestion counters"),
    ("balance", "show balances of watched addresses"),
    ("quit, exit", "stop the node"),
    ("help", "show this list"),
];

#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumString)]
#[strum(serialize_all = "lowercase")]
enum Command {
    Info,
    Pending,
    Received,
    Counters,
    Balance,
    #[strum(serialize = "quit", serialize = "exit")]
    Quit,
    Help,
}

/// Reads commands line by line and runs them on the dispatch loop.
pub struct Console<W> {
    controller: Arc<Controller>,
    metrics: Option<Arc<Metrics>>,
    output: W,
}

impl<W: Write> Console<W> {
    pub const fn new(
        controller: Arc<Controller>,
        metrics: Option<Arc<Metrics>>,
        output: W,
    ) -> Self {
        Self {
            controller,
            metrics,
            output,
        }
    }

    pub fn run(mut self, input: impl BufRead) -> Result<()> {
        writeln!(self.output, "type help for a list of commands")?;

        for line in input.lines() {
            if !self.handle_line(&line?)? {
                return Ok(());
            }
        }

        debug_with_status!("console input closed");

        Ok(())
    }

    /// Returns `false` when the console should stop reading.
    fn handle_line(&mut self, line: &str) -> Result<bool> {
        let mut words = line.split_whitespace();

        let Some(name) = words.next() else {
            return Ok(true);
        };

        let Ok(command) = name.parse::<Command>() else {
            writeln!(self.output, "unknown command {name:?}, type help for a list")?;
            return Ok(true);
        };

        let parameter = words.join(" ");

        let report = match self.execute(command, parameter) {
            Ok(report) => report,
            Err(error) if is_dispatch_loop_stopped(&error) => {
                debug_with_status!("console stopped because the dispatch loop has stopped");
                return Ok(false);
            }
            Err(error) => return Err(error),
        };

        writeln!(self.output, "{report}")?;

        Ok(command != Command::Quit)
    }

    fn execute(&self, command: Command, parameter: String) -> Result<String> {
        let report = Arc::new(Mutex::new(String::new()));
        let handler_report = report.clone_arc();
        let metrics = self.metrics.clone();

        self.controller
            .execute_blocking(parameter, move |context, parameter| {
                *handler_report.lock() = render(command, context, &parameter, metrics.as_deref());
            })?;

        let report = core::mem::take(&mut *report.lock());

        Ok(report)
    }
}

fn render(
    command: Command,
    context: &mut UiContext<'_>,
    parameter: &str,
    metrics: Option<&Metrics>,
) -> String {
    match command {
        Command::Info => info(context),
        Command::Pending => format!("pending blocks: {}", context.pending_block_count()),
        Command::Received => received(context, parameter),
        Command::Counters => metrics.map_or_else(|| "metrics are disabled".to_owned(), counters),
        Command::Balance => context.wallet_summary(),
        Command::Quit => {
            context.request_exit();
            "shutting down".to_owned()
        }
        Command::Help => HELP
            .iter()
            .map(|(usage, description)| format!("{usage:<16}{description}"))
            .join("\n"),
    }
}

fn info(context: &UiContext<'_>) -> String {
    let chain = context.chain();
    let tip = chain.best_tip();
    let last_observed_tip = context.last_observed_tip();

    format!(
        "tip: {:?} (height: {}, timestamp: {})\n\
         tip last changed at: {}\n\
         known blocks: {}, pending: {}, received: {}",
        tip.hash,
        tip.height,
        tip.timestamp,
        last_observed_tip.observed_at,
        chain.node_count(),
        context.pending_block_count(),
        context.received_blocks().len(),
    )
}

fn received(context: &UiContext<'_>, parameter: &str) -> String {
    let Some(hash) = parse_hash(parameter) else {
        return format!("{parameter:?} is not a block hash");
    };

    let Some(received_block) = context.received_blocks().get(hash) else {
        return format!("block {hash:?} has not been received");
    };

    match received_block.accept_time {
        Some(accept_time) => format!(
            "block {hash:?} received at {}, accepted in {accept_time:?}",
            received_block.received_at,
        ),
        None => format!(
            "block {hash:?} received at {}, not accepted in this session",
            received_block.received_at,
        ),
    }
}

fn counters(metrics: &Metrics) -> String {
    [
        ("handle_net_block", metrics.handle_net_block.get()),
        ("blocks_accepted", metrics.blocks_accepted.get()),
        ("blocks_from_cache", metrics.blocks_from_cache.get()),
        ("blocks_cached", metrics.blocks_cached.get()),
        ("bad_cached_blocks", metrics.bad_cached_blocks.get()),
        ("cached_blocks_dos", metrics.cached_blocks_dos.get()),
        ("pending_evictions", metrics.pending_evictions.get()),
        ("invalid_blocks", metrics.invalid_blocks.get()),
        ("penalized_blocks", metrics.penalized_blocks.get()),
        ("accept_failures", metrics.accept_failures.get()),
        ("reorgs_total", metrics.reorgs_total.get()),
        ("main_loop_iterations", metrics.main_loop_iterations.get()),
        ("main_loop_timeouts", metrics.main_loop_timeouts.get()),
        ("net_messages", metrics.net_messages.get()),
        ("ui_commands", metrics.ui_commands.get()),
    ]
    .into_iter()
    .map(|(name, value)| format!("{name}: {value}"))
    .join("\n")
}

fn is_dispatch_loop_stopped(error: &Error) -> bool {
    matches!(error.downcast_ref(), Some(ControlError::DispatchLoopStopped))
}

fn parse_hash(text: &str) -> Option<BlockHash> {
    let bytes = hex::decode(text.strip_prefix("0x").unwrap_or(text)).ok()?;
    (bytes.len() == BlockHash::len_bytes()).then(|| BlockHash::from_slice(bytes.as_slice()))
}
