use core::time::Duration;
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result};
use chain_control::PeerDirectory;
use logging::{debug_with_status, info_with_status};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use types::UnixSeconds;

use crate::consts::PEERS_FILE;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct PeerRecord {
    pub last_seen: UnixSeconds,
}

/// Peers the node has heard from, keyed by address and saved across restarts.
///
/// Clones share the same table.
#[derive(Clone)]
pub struct PeerBook {
    path: PathBuf,
    timeout: Duration,
    peers: Arc<Mutex<BTreeMap<String, PeerRecord>>>,
}

impl PeerBook {
    pub fn load(data_dir: &Path, timeout: Duration) -> Result<Self> {
        let path = data_dir.join(PEERS_FILE);

        let peers = match fs_err::read(&path) {
            Ok(bytes) => serde_json::from_slice(bytes.as_slice())
                .with_context(|| format!("peer table {path:?} is invalid"))?,
            Err(error) if error.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };

        info_with_status!("peer table loaded (peers: {})", peers.len());

        Ok(Self {
            path,
            timeout,
            peers: Arc::new(Mutex::new(peers)),
        })
    }

    pub fn record_seen(&self, address: impl Into<String>, now: UnixSeconds) {
        self.peers
            .lock()
            .insert(address.into(), PeerRecord { last_seen: now });
    }

    #[cfg(test)]
    fn get(&self, address: &str) -> Option<PeerRecord> {
        self.peers.lock().get(address).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn expire_at(&self, now: UnixSeconds) -> usize {
        let cutoff = now.saturating_sub(self.timeout.as_secs());
        let mut peers = self.peers.lock();
        let before = peers.len();

        peers.retain(|_, record| record.last_seen > cutoff);

        before - peers.len()
    }

    pub fn save(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&*self.peers.lock())?;
        fs_err::write(&self.path, bytes)?;
        Ok(())
    }
}

impl PeerDirectory for PeerBook {
    fn expire(&mut self) {
        let expired = self.expire_at(clock::unix_now().unwrap_or_default());

        if expired > 0 {
            debug_with_status!("peers expired (expired: {expired}, remaining: {})", self.len());
        }
    }

    fn close(&mut self) -> Result<()> {
        self.save()?;
        info_with_status!("peer table saved (peers: {}, path: {:?})", self.len(), self.path);
        Ok(())
    }
}
