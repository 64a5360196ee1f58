use core::{fmt::Display, num::NonZeroUsize};
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context as _, Result};
use chain_control::ControlConfig;
use chain_store::TreeConfig;
use clap::{error::ErrorKind, Args, CommandFactory as _, Error as ClapError, Parser};
use itertools::Itertools as _;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    chaind_config::{ChaindConfig, NodeConfig},
    consts::{APPLICATION_NAME, CONFIG_FILE},
};

/// Block ingestion node
///
/// Validates blocks received from peers, caches blocks that arrive before their parents
/// and keeps the best chain up to date.
#[derive(Parser)]
#[clap(display_name = APPLICATION_NAME, verbatim_doc_comment, version)]
pub struct ChaindArgs {
    #[clap(flatten)]
    storage_options: StorageOptions,

    #[clap(flatten)]
    notification_options: NotificationOptions,

    #[clap(flatten)]
    pipeline_options: PipelineOptions,

    /// Address whose balance is tracked (may be repeated)
    #[clap(long = "watch-address", value_name = "ADDRESS")]
    watch_addresses: Vec<String>,

    /// JSON lines file of blocks to feed into the node as if received from a peer
    #[clap(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Do not read commands from standard input
    #[clap(long)]
    no_console: bool,
}

#[derive(Args)]
struct StorageOptions {
    /// Directory holding the block log, the peer table and the lock file
    #[clap(long, value_name = "DIRECTORY", default_value = "chaind-data")]
    data_dir: PathBuf,

    /// YAML configuration file
    /// [default: chaind.yaml in the data directory if present]
    #[clap(long, value_name = "YAML_FILE")]
    config_file: Option<PathBuf>,
}

#[derive(Args)]
struct NotificationOptions {
    /// Alert when a fresh block extends the best chain
    #[clap(long)]
    beep_new_block: bool,

    /// Alert when a fresh block lands on a side branch
    #[clap(long)]
    beep_active_fork: bool,

    /// Alert when a fresh block changes the balance of a watched address
    #[clap(long)]
    beep_new_balance: bool,
}

#[derive(Args)]
struct PipelineOptions {
    /// Blocks whose payload contains this string are reported as mined by us
    #[clap(long)]
    miner_id: Option<String>,

    /// Maximum number of blocks waiting for their parents
    #[clap(long)]
    max_pending_blocks: Option<NonZeroUsize>,
}

/// Contents of the YAML configuration file. Command-line options take precedence.
#[derive(Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    control: ControlConfig,
    chain: TreeConfig,
    node: NodeConfig,
    watch_addresses: Vec<String>,
}

impl ChaindArgs {
    pub fn try_into_config(self) -> Result<ChaindConfig> {
        let Self {
            storage_options,
            notification_options,
            pipeline_options,
            watch_addresses,
            import,
            no_console,
        } = self;

        let StorageOptions {
            data_dir,
            config_file,
        } = storage_options;

        let NotificationOptions {
            beep_new_block,
            beep_active_fork,
            beep_new_balance,
        } = notification_options;

        let PipelineOptions {
            miner_id,
            max_pending_blocks,
        } = pipeline_options;

        let FileConfig {
            control: mut control_config,
            chain: tree_config,
            node: node_config,
            watch_addresses: file_watch_addresses,
        } = match config_file {
            Some(path) => load_file_config(&path)?,
            None => {
                let default_path = data_dir.join(CONFIG_FILE);

                if default_path.is_file() {
                    load_file_config(&default_path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        // Flags can only enable notifications that the file leaves disabled.
        let notifications = &mut control_config.notifications;
        notifications.new_block |= beep_new_block;
        notifications.active_fork |= beep_active_fork;
        notifications.new_balance |= beep_new_balance;

        if let Some(miner_id) = miner_id {
            control_config.miner_id = Some(miner_id);
        }

        if let Some(max_pending_blocks) = max_pending_blocks {
            control_config.max_pending_blocks = max_pending_blocks;
        }

        ensure!(
            control_config.miner_id.as_deref() != Some(""),
            Error::EmptyMinerId,
        );

        if let Some(path) = &import {
            ensure!(
                path.is_file(),
                Error::ImportFileMissing { path: path.clone() },
            );
        }

        let watch_addresses = file_watch_addresses
            .into_iter()
            .chain(watch_addresses)
            .unique()
            .collect();

        Ok(ChaindConfig {
            data_dir,
            control_config,
            tree_config,
            node_config,
            watch_addresses,
            import,
            console: !no_console,
        })
    }

    pub fn clap_error(message: impl Display) -> ClapError {
        Self::command().error(ErrorKind::ValueValidation, message)
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let bytes = fs_err::read(path)?;

    serde_yaml::from_slice(bytes.as_slice())
        .with_context(|| format!("configuration file {path:?} is invalid"))
}

#[derive(Debug, Error)]
enum Error {
    #[error("--miner-id must not be empty")]
    EmptyMinerId,
    #[error("import file {path:?} does not exist")]
    ImportFileMissing { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::io::Write as _;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;

    #[test]
    fn defaults() -> Result<()> {
        let data_dir = TempDir::new()?;
        let config = config_from_args(&data_dir, [])?;

        assert!(config.console);
        assert_eq!(config.import, None);
        assert_eq!(config.watch_addresses, Vec::<String>::new());
        assert_eq!(config.control_config.miner_id, None);
        assert_eq!(config.control_config.max_pending_blocks.get(), 500);
        assert!(!config.control_config.notifications.new_block);
        assert_eq!(config.node_config.ban_threshold, 100);

        Ok(())
    }

    #[test]
    fn flags_enable_notifications_and_override_limits() -> Result<()> {
        let data_dir = TempDir::new()?;
        let config = config_from_args(
            &data_dir,
            [
                "--beep-new-block",
                "--beep-active-fork",
                "--miner-id",
                "/chaind/",
                "--max-pending-blocks",
                "20",
                "--watch-address",
                "alice",
                "--watch-address",
                "bob",
                "--no-console",
            ],
        )?;

        let notifications = config.control_config.notifications;

        assert!(notifications.new_block);
        assert!(notifications.active_fork);
        assert!(!notifications.new_balance);
        assert_eq!(config.control_config.miner_id.as_deref(), Some("/chaind/"));
        assert_eq!(config.control_config.max_pending_blocks.get(), 20);
        assert_eq!(config.watch_addresses, ["alice", "bob"]);
        assert!(!config.console);

        Ok(())
    }

    #[test]
    fn configuration_file_is_read_and_flags_take_precedence() -> Result<()> {
        let data_dir = TempDir::new()?;
        let mut file = NamedTempFile::new()?;

        writeln!(
            file,
            "control:\n  \
               miner_id: from-file\n  \
               max_pending_blocks: 7\n  \
               idle_timeout: 250\n  \
               notifications:\n    \
                 new_balance: true\n\
             chain:\n  \
               max_future_drift: 60\n\
             node:\n  \
               ban_threshold: 5\n\
             watch_addresses: [alice]",
        )?;

        let config_file = file.path().to_str().context("temporary path is not UTF-8")?;
        let config = config_from_args(
            &data_dir,
            [
                "--config-file",
                config_file,
                "--miner-id",
                "from-flag",
                "--watch-address",
                "alice",
                "--watch-address",
                "carol",
            ],
        )?;

        assert_eq!(config.control_config.miner_id.as_deref(), Some("from-flag"));
        assert_eq!(config.control_config.max_pending_blocks.get(), 7);
        assert_eq!(config.control_config.idle_timeout, Duration::from_millis(250));
        assert!(config.control_config.notifications.new_balance);
        assert_eq!(config.tree_config.max_future_drift, Duration::from_secs(60));
        assert_eq!(config.node_config.ban_threshold, 5);
        assert_eq!(config.watch_addresses, ["alice", "carol"]);

        Ok(())
    }

    #[test]
    fn configuration_file_in_data_directory_is_used_by_default() -> Result<()> {
        let data_dir = TempDir::new()?;

        fs_err::write(data_dir.path().join(CONFIG_FILE), "node:\n  ban_threshold: 9\n")?;

        let config = config_from_args(&data_dir, [])?;

        assert_eq!(config.node_config.ban_threshold, 9);

        Ok(())
    }

    #[test]
    fn unknown_configuration_keys_are_rejected() -> Result<()> {
        let data_dir = TempDir::new()?;

        fs_err::write(data_dir.path().join(CONFIG_FILE), "control:\n  web_ui: true\n")?;

        assert!(config_from_args(&data_dir, []).is_err());

        Ok(())
    }

    #[test]
    fn empty_miner_id_is_rejected() -> Result<()> {
        let data_dir = TempDir::new()?;
        let error = config_from_args(&data_dir, ["--miner-id", ""])
            .err()
            .context("empty miner id should be rejected")?;

        assert!(matches!(error.downcast_ref(), Some(Error::EmptyMinerId)));

        Ok(())
    }

    #[test]
    fn missing_import_file_is_rejected() -> Result<()> {
        let data_dir = TempDir::new()?;
        let missing = data_dir.path().join("missing.jsonl");
        let missing = missing.to_str().context("temporary path is not UTF-8")?;

        let error = config_from_args(&data_dir, ["--import", missing])
            .err()
            .context("missing import file should be rejected")?;

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::ImportFileMissing { .. }),
        ));

        Ok(())
    }

    fn config_from_args<'a>(
        data_dir: &'a TempDir,
        arguments: impl IntoIterator<Item = &'a str>,
    ) -> Result<ChaindConfig> {
        let data_dir = data_dir
            .path()
            .to_str()
            .context("temporary path is not UTF-8")?;

        ChaindArgs::try_parse_from(
            [APPLICATION_NAME, "--data-dir", data_dir]
                .into_iter()
                .chain(arguments),
        )?
        .try_into_config()
    }
}
