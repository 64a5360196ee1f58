use core::{
    convert::identity,
    panic::AssertUnwindSafe,
    pin::{pin, Pin},
};
use std::sync::Arc;

use anyhow::Result;
use chain_store::ChainState;
use futures::{
    channel::{mpsc::Receiver, oneshot::Receiver as OneshotReceiver},
    future::FutureExt as _,
    select,
    stream::{Peekable, StreamExt as _},
};
use logging::{debug_with_status, info_with_status, warn_with_status};
use prometheus_metrics::Metrics;

use crate::{
    collaborators::{Collaborators, NetworkMaintenance, PeerDirectory, TransactionPool, Wallet},
    config::ControlConfig,
    messages::{NetBlock, NetTx, NotifierMessage, P2pMessage, UiCommand},
    misc::IngestOutcome,
    mutator::Mutator,
    unbounded_sink::UnboundedSink,
};

/// The only caller of operations that mutate the chain state.
///
/// Each iteration first retries cached blocks while that makes progress and no foreground work is
/// waiting, then services exactly one event: a stop signal, a network block, a network
/// transaction, a UI command, one of the maintenance timers or the idle timeout.
/// When several events are ready at once, [`select!`] picks one of them at random.
pub struct DispatchLoop<C, T, W, D, N, PS, NS> {
    config: Arc<ControlConfig>,
    mutator: Mutator<C, T, W, PS, NS>,
    peer_directory: D,
    network: N,
    metrics: Option<Arc<Metrics>>,
    block_rx: Peekable<Receiver<NetBlock>>,
    transaction_rx: Receiver<NetTx>,
    ui_rx: Peekable<Receiver<UiCommand>>,
    stop_rx: OneshotReceiver<()>,
}

impl<C, T, W, D, N, PS, NS> DispatchLoop<C, T, W, D, N, PS, NS>
where
    C: ChainState,
    T: TransactionPool,
    W: Wallet,
    D: PeerDirectory,
    N: NetworkMaintenance,
    PS: UnboundedSink<P2pMessage>,
    NS: UnboundedSink<NotifierMessage>,
{
    #[expect(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Arc<ControlConfig>,
        mutator: Mutator<C, T, W, PS, NS>,
        peer_directory: D,
        network: N,
        metrics: Option<Arc<Metrics>>,
        block_rx: Receiver<NetBlock>,
        transaction_rx: Receiver<NetTx>,
        ui_rx: Receiver<UiCommand>,
        stop_rx: OneshotReceiver<()>,
    ) -> Self {
        Self {
            config,
            mutator,
            peer_directory,
            network,
            metrics,
            block_rx: block_rx.peekable(),
            transaction_rx,
            ui_rx: ui_rx.peekable(),
            stop_rx,
        }
    }

    /// Runs until stopped and hands the collaborators back for the shutdown sequence.
    ///
    /// If the loop fails or panics, the chain state is closed before the fault is returned.
    /// The peer directory and network are dropped in that case.
    pub async fn run(mut self) -> Result<Collaborators<C, T, W, D, N>> {
        let result = AssertUnwindSafe(self.run_until_stopped())
            .catch_unwind()
            .await
            .map_err(panics::payload_into_error)
            .and_then(identity);

        let mut collaborators = self
            .mutator
            .into_collaborators(self.peer_directory, self.network);

        if let Err(error) = result {
            if let Err(close_error) = collaborators.chain.close() {
                warn_with_status!("failed to close chain state after a fault: {close_error:?}");
            }

            return Err(error);
        }

        Ok(collaborators)
    }

    async fn run_until_stopped(&mut self) -> Result<()> {
        let mut peer_expiry = clock::periodic(self.config.peer_expiry_interval)?;
        let mut transaction_expiry = clock::periodic(self.config.tx_pool_expiry_interval)?;
        let mut network_ticks = clock::periodic(self.config.network_tick_interval)?;

        let mut retry_pending = false;
        let mut exit_requested = false;

        info_with_status!(
            "dispatch loop started (tip: {:?})",
            self.mutator.last_observed_tip().node.hash,
        );

        while !exit_requested {
            if let Some(metrics) = self.metrics.as_ref() {
                metrics.main_loop_iterations.inc();
            }

            while retry_pending {
                retry_pending = self.mutator.retry_cached_blocks();

                if self.foreground_work_waiting() {
                    break;
                }
            }

            let mut idle_timeout = pin!(tokio::time::sleep(self.config.idle_timeout).fuse());

            select! {
                _ = &mut self.stop_rx => {
                    info_with_status!("dispatch loop received stop signal");
                    exit_requested = true;
                    continue;
                },

                net_block = self.block_rx.select_next_some() => {
                    let NetBlock { block, origin } = net_block;

                    if let IngestOutcome::Accepted { retry_pending: more } =
                        self.mutator.handle_net_block(block, origin)
                    {
                        retry_pending = more;
                    }
                },

                net_tx = self.transaction_rx.select_next_some() => {
                    let NetTx { transaction, connection_id } = net_tx;

                    self.mutator
                        .transaction_pool_mut()
                        .handle_transaction(transaction, connection_id);
                },

                command = self.ui_rx.select_next_some() => {
                    if let Some(metrics) = self.metrics.as_ref() {
                        metrics.ui_commands.inc();
                    }

                    let UiCommand { handler, parameter, done } = command;
                    let mut context = self.mutator.ui_context();

                    handler(&mut context, parameter);

                    exit_requested = context.exit_requested();

                    if done.send(()).is_err() {
                        debug_with_status!("UI command completed after its issuer stopped waiting");
                    }

                    continue;
                },

                _ = peer_expiry.select_next_some() => {
                    self.peer_directory.expire();
                },

                _ = transaction_expiry.select_next_some() => {
                    self.mutator.transaction_pool_mut().expire();
                },

                _ = network_ticks.select_next_some() => {
                    self.network.tick();
                },

                () = idle_timeout => {
                    if let Some(metrics) = self.metrics.as_ref() {
                        metrics.main_loop_timeouts.inc();
                    }

                    if !retry_pending {
                        self.mutator.idle()?;
                    }

                    continue;
                },
            }

            if let Some(metrics) = self.metrics.as_ref() {
                metrics.net_messages.inc();
            }
        }

        info_with_status!(
            "dispatch loop stopped (pending blocks: {})",
            self.mutator.pending_block_count(),
        );

        Ok(())
    }

    fn foreground_work_waiting(&mut self) -> bool {
        let block_waiting = matches!(
            Pin::new(&mut self.block_rx).peek().now_or_never(),
            Some(Some(_)),
        );

        let command_waiting = matches!(
            Pin::new(&mut self.ui_rx).peek().now_or_never(),
            Some(Some(_)),
        );

        block_waiting || command_waiting
    }
}
