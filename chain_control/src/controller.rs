// Producers never touch the chain state. They hand blocks, transactions and UI commands to the
// dispatch loop through bounded channels, one per event category. A full channel makes the producer
// wait, which throttles peers that send faster than blocks can be validated.

use std::sync::Arc;

use anyhow::Result;
use chain_store::ChainState;
use futures::{
    channel::{
        mpsc::{self, Sender as MultiSender},
        oneshot::{self, Sender as OneshotSender},
    },
    executor::block_on,
    SinkExt as _,
};
use parking_lot::Mutex;
use prometheus_metrics::Metrics;
use std_ext::ArcExt as _;
use thiserror::Error;
use types::{Block, ConnectionId, Transaction};

use crate::{
    collaborators::{Collaborators, NetworkMaintenance, PeerDirectory, TransactionPool, Wallet},
    config::ControlConfig,
    messages::{NetBlock, NetTx, NotifierMessage, P2pMessage, UiCommand},
    misc::BlockOrigin,
    mutator::Mutator,
    received::ReceivedBlocks,
    service::DispatchLoop,
    ui::UiContext,
    unbounded_sink::UnboundedSink,
};

pub struct Controller {
    block_tx: MultiSender<NetBlock>,
    transaction_tx: MultiSender<NetTx>,
    ui_tx: MultiSender<UiCommand>,
    stop_tx: Mutex<Option<OneshotSender<()>>>,
    received_blocks: Arc<ReceivedBlocks>,
}

impl Controller {
    #[expect(clippy::type_complexity)]
    pub fn new<C, T, W, D, N, PS, NS>(
        config: ControlConfig,
        collaborators: Collaborators<C, T, W, D, N>,
        metrics: Option<Arc<Metrics>>,
        p2p_tx: PS,
        notifier_tx: NS,
    ) -> (Arc<Self>, DispatchLoop<C, T, W, D, N, PS, NS>)
    where
        C: ChainState,
        T: TransactionPool,
        W: Wallet,
        D: PeerDirectory,
        N: NetworkMaintenance,
        PS: UnboundedSink<P2pMessage>,
        NS: UnboundedSink<NotifierMessage>,
    {
        let config = Arc::new(config);
        let received_blocks = Arc::new(ReceivedBlocks::default());

        let (block_tx, block_rx) = mpsc::channel(config.block_channel_capacity);
        let (transaction_tx, transaction_rx) = mpsc::channel(config.transaction_channel_capacity);
        let (ui_tx, ui_rx) = mpsc::channel(config.ui_channel_capacity);
        let (stop_tx, stop_rx) = oneshot::channel();

        let Collaborators {
            chain,
            transaction_pool,
            wallet,
            peer_directory,
            network,
        } = collaborators;

        let mutator = Mutator::new(
            config.clone_arc(),
            chain,
            transaction_pool,
            wallet,
            received_blocks.clone_arc(),
            metrics.clone(),
            p2p_tx,
            notifier_tx,
        );

        let dispatch_loop = DispatchLoop::new(
            config,
            mutator,
            peer_directory,
            network,
            metrics,
            block_rx,
            transaction_rx,
            ui_rx,
            stop_rx,
        );

        let controller = Arc::new(Self {
            block_tx,
            transaction_tx,
            ui_tx,
            stop_tx: Mutex::new(Some(stop_tx)),
            received_blocks,
        });

        (controller, dispatch_loop)
    }

    pub async fn submit_block(&self, block: Arc<Block>, origin: BlockOrigin) -> Result<()> {
        self.block_tx
            .clone()
            .send(NetBlock { block, origin })
            .await
            .map_err(|_| Error::DispatchLoopStopped.into())
    }

    pub async fn submit_transaction(
        &self,
        transaction: Transaction,
        connection_id: ConnectionId,
    ) -> Result<()> {
        let net_tx = NetTx {
            transaction,
            connection_id,
        };

        self.transaction_tx
            .clone()
            .send(net_tx)
            .await
            .map_err(|_| Error::DispatchLoopStopped.into())
    }

    /// Runs `handler` on the dispatch loop and waits for it to finish.
    pub async fn execute(
        &self,
        parameter: impl Into<String> + Send,
        handler: impl FnOnce(&mut UiContext<'_>, String) + Send + 'static,
    ) -> Result<()> {
        let (done, done_rx) = oneshot::channel();

        let command = UiCommand {
            handler: Box::new(handler),
            parameter: parameter.into(),
            done,
        };

        self.ui_tx
            .clone()
            .send(command)
            .await
            .map_err(|_| Error::DispatchLoopStopped)?;

        done_rx.await.map_err(|_| Error::DispatchLoopStopped.into())
    }

    pub fn submit_block_blocking(&self, block: Arc<Block>, origin: BlockOrigin) -> Result<()> {
        block_on(self.submit_block(block, origin))
    }

    pub fn execute_blocking(
        &self,
        parameter: impl Into<String> + Send,
        handler: impl FnOnce(&mut UiContext<'_>, String) + Send + 'static,
    ) -> Result<()> {
        block_on(self.execute(parameter, handler))
    }

    /// Makes the dispatch loop terminate. Subsequent calls do nothing.
    pub fn stop(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            // The dispatch loop may already be gone.
            stop_tx.send(()).ok();
        }
    }

    #[must_use]
    pub const fn received_blocks(&self) -> &Arc<ReceivedBlocks> {
        &self.received_blocks
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("dispatch loop has stopped")]
    DispatchLoopStopped,
}
