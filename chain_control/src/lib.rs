//! The block ingestion core of the node.
//!
//! This crate handles the following concerns:
//! - Classifying blocks received from the network and accepting them into the chain state.
//! - Caching blocks that cannot be validated yet and retrying them as the chain grows.
//! - Detecting orphaned blocks and chain reorganizations.
//! - Multiplexing network input, UI commands and maintenance timers in [`DispatchLoop`].
//! - Notifying the network layer and the operator about the outcome.

pub use crate::{
    collaborators::{Collaborators, NetworkMaintenance, PeerDirectory, TransactionPool, Wallet},
    config::{ControlConfig, Notifications, DEFAULT_FRESHNESS_WINDOW, DEFAULT_MAX_PENDING_BLOCKS},
    controller::{Controller, Error},
    messages::{NetBlock, NetTx, NotifierMessage, P2pMessage, UiCommand, UiHandler},
    misc::{BlockOrigin, IngestOutcome, LastObservedTip, RejectionReason},
    received::{ReceivedBlock, ReceivedBlocks},
    service::DispatchLoop,
    ui::UiContext,
    unbounded_sink::UnboundedSink,
};

mod collaborators;
mod config;
mod controller;
mod messages;
mod misc;
mod mutator;
mod pending;
mod received;
mod service;
mod ui;
mod unbounded_sink;

#[cfg(test)]
mod helpers;
