use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::{collections::HashSet, sync::Arc};

use anyhow::{bail, Result};
use chain_store::{BlockCheck, BlockTree, ChainNode, ChainState, TreeConfig};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use prometheus_metrics::Metrics;
use std_ext::ArcExt as _;
use types::{Block, BlockHash, ConnectionId, Transaction, TxHash, UnixSeconds};

use crate::{
    collaborators::{NetworkMaintenance, PeerDirectory, TransactionPool, Wallet},
    config::ControlConfig,
    messages::{NotifierMessage, P2pMessage},
    misc::{BlockOrigin, RejectionReason},
    mutator::Mutator,
    received::ReceivedBlocks,
};

/// Calls made to a [`ScriptedChain`], readable after the chain has been moved or dropped.
#[derive(Default)]
pub struct ChainEvents {
    idle_calls: AtomicUsize,
    closed: AtomicBool,
}

impl ChainEvents {
    pub fn idle_calls(&self) -> usize {
        self.idle_calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A [`BlockTree`] that can be told to fail specific acceptances or its idle hook.
pub struct ScriptedChain {
    tree: BlockTree,
    failing_accepts: HashSet<BlockHash>,
    failing_idle: bool,
    events: Arc<ChainEvents>,
}

impl ScriptedChain {
    pub fn new(genesis: Arc<Block>) -> Self {
        Self {
            tree: BlockTree::in_memory(TreeConfig::default(), genesis),
            failing_accepts: HashSet::new(),
            failing_idle: false,
            events: Arc::default(),
        }
    }

    pub fn fail_accept_of(&mut self, hash: BlockHash) {
        self.failing_accepts.insert(hash);
    }

    pub fn fail_idle(&mut self) {
        self.failing_idle = true;
    }

    pub fn events(&self) -> Arc<ChainEvents> {
        self.events.clone_arc()
    }
}

impl ChainState for ScriptedChain {
    fn check_block(&self, block: &Block) -> BlockCheck {
        self.tree.check_block(block)
    }

    fn accept_block(&mut self, block: &Arc<Block>) -> Result<()> {
        if self.failing_accepts.contains(&block.hash) {
            bail!("block store refused block {:?}", block.hash);
        }

        self.tree.accept_block(block)
    }

    fn idle(&mut self) -> Result<bool> {
        self.events.idle_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_idle {
            bail!("block store is out of disk space");
        }

        self.tree.idle()
    }

    fn best_tip(&self) -> ChainNode {
        self.tree.best_tip()
    }

    fn node(&self, hash: BlockHash) -> Option<ChainNode> {
        self.tree.node(hash)
    }

    fn block(&self, hash: BlockHash) -> Option<Arc<Block>> {
        self.tree.block(hash)
    }

    fn common_ancestor(&self, left: &ChainNode, right: &ChainNode) -> Option<ChainNode> {
        self.tree.common_ancestor(left, right)
    }

    fn nodes(&self) -> Box<dyn Iterator<Item = ChainNode> + '_> {
        self.tree.nodes()
    }

    fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    fn close(&mut self) -> Result<()> {
        self.events.closed.store(true, Ordering::SeqCst);
        self.tree.close()
    }
}

#[derive(Default)]
pub struct RecordingPool {
    pub received: Vec<(TxHash, ConnectionId)>,
    pub confirmed: Vec<TxHash>,
    pub expirations: usize,
}

impl TransactionPool for RecordingPool {
    fn handle_transaction(&mut self, transaction: Transaction, connection_id: ConnectionId) {
        self.received.push((transaction.hash, connection_id));
    }

    fn mark_confirmed(&mut self, tx_hash: TxHash) {
        self.confirmed.push(tx_hash);
    }

    fn expire(&mut self) {
        self.expirations += 1;
    }
}

/// Sums outputs paid to a single address.
#[derive(Default)]
pub struct RecordingWallet {
    pub address: Option<String>,
    pub balance: u64,
}

impl RecordingWallet {
    pub fn watching(address: &str) -> Self {
        Self {
            address: Some(address.to_owned()),
            balance: 0,
        }
    }
}

impl Wallet for RecordingWallet {
    fn balance_change(&mut self, block: &Block) -> Option<String> {
        let address = self.address.as_deref()?;

        let received = block
            .transactions
            .iter()
            .flat_map(|transaction| &transaction.outputs)
            .filter(|output| output.address == address)
            .map(|output| output.value)
            .sum::<u64>();

        if received == 0 {
            return None;
        }

        self.balance += received;

        Some(self.summary())
    }

    fn summary(&self) -> String {
        format!("balance: {}", self.balance)
    }
}

#[derive(Default)]
pub struct RecordingPeers {
    pub expirations: usize,
}

impl PeerDirectory for RecordingPeers {
    fn expire(&mut self) {
        self.expirations += 1;
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNetwork {
    pub ticks: usize,
}

impl NetworkMaintenance for RecordingNetwork {
    fn tick(&mut self) {
        self.ticks += 1;
    }

    fn close_all(&mut self) {}
}

pub type TestMutator = Mutator<
    ScriptedChain,
    RecordingPool,
    RecordingWallet,
    UnboundedSender<P2pMessage>,
    UnboundedSender<NotifierMessage>,
>;

pub struct Context {
    pub genesis: Arc<Block>,
    pub mutator: TestMutator,
    pub metrics: Arc<Metrics>,
    p2p_rx: UnboundedReceiver<P2pMessage>,
    notifier_rx: UnboundedReceiver<NotifierMessage>,
}

impl Context {
    pub fn new(config: ControlConfig) -> Result<Self> {
        let genesis = Block::genesis();
        let chain = ScriptedChain::new(genesis.clone());
        Self::with_chain(config, genesis, chain, RecordingWallet::default())
    }

    pub fn with_chain(
        config: ControlConfig,
        genesis: Arc<Block>,
        chain: ScriptedChain,
        wallet: RecordingWallet,
    ) -> Result<Self> {
        let (p2p_tx, p2p_rx) = mpsc::unbounded();
        let (notifier_tx, notifier_rx) = mpsc::unbounded();
        let metrics = Arc::new(Metrics::new()?);

        let mutator = Mutator::new(
            Arc::new(config),
            chain,
            RecordingPool::default(),
            wallet,
            Arc::new(ReceivedBlocks::default()),
            Some(metrics.clone()),
            p2p_tx,
            notifier_tx,
        );

        Ok(Self {
            genesis,
            mutator,
            metrics,
            p2p_rx,
            notifier_rx,
        })
    }

    pub fn tip(&self) -> ChainNode {
        self.mutator.chain().best_tip()
    }

    pub fn p2p_messages(&mut self) -> Vec<P2pMessage> {
        core::iter::from_fn(|| self.p2p_rx.try_next().ok().flatten()).collect()
    }

    pub fn notifier_messages(&mut self) -> Vec<NotifierMessage> {
        core::iter::from_fn(|| self.notifier_rx.try_next().ok().flatten()).collect()
    }

    pub fn penalties(&mut self) -> Vec<(ConnectionId, RejectionReason)> {
        self.p2p_messages()
            .into_iter()
            .filter_map(|message| match message {
                P2pMessage::PenalizePeer(connection_id, reason) => Some((connection_id, reason)),
                _ => None,
            })
            .collect()
    }

    pub fn orphan_depths(&mut self) -> Vec<u64> {
        self.notifier_messages()
            .into_iter()
            .filter_map(|message| match message {
                NotifierMessage::OrphanedBlock { fork_depth, .. } => Some(fork_depth),
                _ => None,
            })
            .collect()
    }
}

pub const fn peer(id: u64) -> BlockOrigin {
    BlockOrigin::Peer(ConnectionId(id))
}

pub fn now() -> UnixSeconds {
    clock::unix_now().expect("system clock should be after the Unix epoch")
}

/// A timestamp outside the default freshness window.
pub fn historical() -> UnixSeconds {
    now() - 60 * 60
}
