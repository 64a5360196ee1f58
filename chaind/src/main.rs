use core::{future::Future, panic::AssertUnwindSafe};
use std::{io, process::ExitCode, sync::Arc, thread};

use anyhow::Result;
use chain_control::{Collaborators, Controller, NetworkMaintenance as _, PeerDirectory as _};
use chain_store::{BlockTree, ChainState as _};
use clap::{Error as ClapError, Parser as _};
use futures::channel::mpsc;
use logging::{error_with_status, info_with_status, warn_with_status};
use prometheus_metrics::Metrics;
use std_ext::ArcExt as _;
use thiserror::Error;
use tokio::{runtime::Builder, select};
use types::Block;

#[cfg(unix)]
use tokio::signal::unix::SignalKind;

use crate::{
    chaind_args::ChaindArgs,
    chaind_config::ChaindConfig,
    console::Console,
    consts::{APPLICATION_NAME, BLOCKS_DIRECTORY},
    data_dir_lock::DataDirLock,
    local_network::LocalNetwork,
    memory_pool::MemoryPool,
    notifier::Notifier,
    peer_book::PeerBook,
    watch_wallet::WatchWallet,
};

mod chaind_args;
mod chaind_config;
mod console;
mod consts;
mod data_dir_lock;
mod import;
mod local_network;
mod memory_pool;
mod notifier;
mod peer_book;
mod watch_wallet;

type NodeCollaborators = Collaborators<BlockTree, MemoryPool, WatchWallet, PeerBook, LocalNetwork>;

#[derive(Debug, Error)]
enum Error {
    #[error("node stopped after a fault")]
    NodeFailed,
}

struct Node {
    config: ChaindConfig,
    metrics: Arc<Metrics>,
    peer_book: PeerBook,
    network: LocalNetwork,
}

impl Node {
    async fn run(self) -> Result<NodeCollaborators> {
        let Self {
            config,
            metrics,
            peer_book,
            network,
        } = self;

        let ChaindConfig {
            data_dir,
            control_config,
            tree_config,
            node_config,
            watch_addresses,
            import,
            console,
        } = config;

        let chain = BlockTree::open(
            tree_config,
            Block::genesis(),
            data_dir.join(BLOCKS_DIRECTORY).as_path(),
        )?;

        let mut wallet = WatchWallet::new(watch_addresses);
        wallet.scan(&chain);

        let collaborators = Collaborators {
            chain,
            transaction_pool: MemoryPool::new(node_config.tx_pool_timeout),
            wallet,
            peer_directory: peer_book.clone(),
            network: network.clone(),
        };

        let (p2p_tx, p2p_rx) = mpsc::unbounded();
        let (notifier_tx, notifier_rx) = mpsc::unbounded();

        let (controller, dispatch_loop) = Controller::new(
            control_config,
            collaborators,
            Some(metrics.clone_arc()),
            p2p_tx,
            notifier_tx,
        );

        let network_task = tokio::spawn(network.clone().run(p2p_rx));
        let notifier_task = tokio::spawn(Notifier::new(io::stderr()).run(notifier_rx));

        tokio::spawn(log_failure(
            "signal handler",
            stop_on_signal(controller.clone_arc()),
        ));

        if let Some(path) = import {
            tokio::spawn(log_failure(
                "block import",
                import::run(controller.clone_arc(), network, peer_book, path),
            ));
        }

        if console {
            spawn_console(controller, metrics)?;
        }

        let collaborators = dispatch_loop.run().await?;

        network_task.await??;
        notifier_task.await??;

        Ok(collaborators)
    }
}

fn main() -> ExitCode {
    if let Err(error) = try_main() {
        error.downcast_ref().map(ClapError::exit);
        error_with_status!("{error:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn try_main() -> Result<()> {
    binary_utils::initialize_tracing_logger(
        module_path!(),
        cfg!(feature = "logger-always-write-style"),
    )?;

    let config = ChaindArgs::try_parse()?
        .try_into_config()
        .map_err(ChaindArgs::clap_error)?;

    info_with_status!("starting {APPLICATION_NAME}");
    config.report();

    let metrics = Arc::new(Metrics::new()?);
    metrics.register_with_default_metrics()?;

    let lock = DataDirLock::acquire(&config.data_dir)?;
    let result = supervise(config, metrics);
    let unlocked = lock.release();

    result.and(unlocked)
}

fn supervise(config: ChaindConfig, metrics: Arc<Metrics>) -> Result<()> {
    let mut peer_book = PeerBook::load(&config.data_dir, config.node_config.peer_timeout)?;
    let mut network = LocalNetwork::new(config.node_config.ban_threshold);

    let node = Node {
        config,
        metrics,
        peer_book: peer_book.clone(),
        network: network.clone(),
    };

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| block_on(node.run())))
        .map_err(panics::payload_into_error)
        .and_then(core::convert::identity);

    match result {
        Ok(collaborators) => shutdown(collaborators),
        Err(error) => {
            error_with_status!("node failed: {error:?}");

            // A failing dispatch loop closes the chain state itself.
            network.close_all();

            if let Err(error) = peer_book.close() {
                warn_with_status!("failed to save peer table: {error:?}");
            }

            Err(Error::NodeFailed.into())
        }
    }
}

fn shutdown(collaborators: NodeCollaborators) -> Result<()> {
    let Collaborators {
        mut chain,
        mut peer_directory,
        mut network,
        ..
    } = collaborators;

    network.close_all();
    peer_directory.close()?;
    chain.close()?;

    info_with_status!("node stopped (tip height: {})", chain.best_tip().height);

    Ok(())
}

fn spawn_console(controller: Arc<Controller>, metrics: Arc<Metrics>) -> Result<()> {
    thread::Builder::new()
        .name("console".to_owned())
        .spawn(move || {
            let console = Console::new(controller, Some(metrics), io::stdout());

            match std::panic::catch_unwind(AssertUnwindSafe(|| console.run(io::stdin().lock()))) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn_with_status!("console failed: {error:?}"),
                Err(payload) => panics::log(payload),
            }
        })?;

    Ok(())
}

async fn stop_on_signal(controller: Arc<Controller>) -> Result<()> {
    wait_for_signal().await?;
    info_with_status!("termination signal received");
    controller.stop();
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut interrupt = tokio::signal::unix::signal(SignalKind::interrupt())?;
        let mut terminate = tokio::signal::unix::signal(SignalKind::terminate())?;

        select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

async fn log_failure(task: &str, future: impl Future<Output = Result<()>> + Send) {
    if let Err(error) = future.await {
        warn_with_status!("{task} failed: {error:?}");
    }
}

// Tasks spawned by the node own collaborators and connections.
// Building a runtime per run drops them all when the run ends, including after a panic.
fn block_on<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(future)
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use chain_control::ControlConfig;
    use chain_store::TreeConfig;
    use tempfile::TempDir;
    use types::ConnectionId;

    use crate::{chaind_config::NodeConfig, consts::PEERS_FILE};

    use super::*;

    #[test]
    fn shutdown_persists_chain_and_peers() -> Result<()> {
        let data_dir = TempDir::new()?;
        let blocks_dir = data_dir.path().join(BLOCKS_DIRECTORY);
        let genesis = Block::genesis();
        let child = factory::child(&genesis, genesis.timestamp + 1, 1);

        let mut chain = BlockTree::open(TreeConfig::default(), genesis.clone(), &blocks_dir)?;
        chain.accept_block(&child)?;

        let peer_book = PeerBook::load(data_dir.path(), Duration::from_secs(60))?;
        peer_book.record_seen("10.0.0.1:8333", 1000);

        let network = LocalNetwork::new(100);
        network.connect(ConnectionId(1), "10.0.0.1:8333");

        shutdown(Collaborators {
            chain,
            transaction_pool: MemoryPool::new(Duration::from_secs(60)),
            wallet: WatchWallet::new([]),
            peer_directory: peer_book,
            network: network.clone(),
        })?;

        let reopened = BlockTree::open(TreeConfig::default(), genesis, &blocks_dir)?;

        assert_eq!(reopened.best_tip().hash, child.hash);
        assert!(data_dir.path().join(PEERS_FILE).is_file());
        assert!(!network.is_connected(ConnectionId(1)));

        Ok(())
    }

    #[test]
    fn fault_during_startup_still_saves_peers() -> Result<()> {
        let data_dir = TempDir::new()?;
        let blocks_dir = data_dir.path().join(BLOCKS_DIRECTORY);

        fs_err::create_dir_all(&blocks_dir)?;
        fs_err::write(blocks_dir.join("blocks.jsonl"), "{\"truncated\":")?;

        let config = ChaindConfig {
            data_dir: data_dir.path().to_path_buf(),
            control_config: ControlConfig::default(),
            tree_config: TreeConfig::default(),
            node_config: NodeConfig::default(),
            watch_addresses: vec![],
            import: None,
            console: false,
        };

        let error = supervise(config, Arc::new(Metrics::new()?))
            .expect_err("corrupt block log should stop the node");

        assert!(matches!(error.downcast_ref(), Some(Error::NodeFailed)));
        assert!(data_dir.path().join(PEERS_FILE).is_file());

        Ok(())
    }
}
