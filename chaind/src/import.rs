use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chain_control::{BlockOrigin, Controller};
use logging::{info_with_status, warn_with_status};
use types::Block;

use crate::{consts::IMPORT_CONNECTION_ID, local_network::LocalNetwork, peer_book::PeerBook};

/// Feeds blocks from a JSON lines file into the node as if a peer had sent them.
///
/// The file is treated like any other peer. Invalid blocks are penalized and once the
/// pseudo-connection is banned the rest of the file is ignored.
pub async fn run(
    controller: Arc<Controller>,
    network: LocalNetwork,
    peer_book: PeerBook,
    path: PathBuf,
) -> Result<()> {
    let address = format!("import:{}", path.display());

    if !network.connect(IMPORT_CONNECTION_ID, address.as_str()) {
        warn_with_status!("not importing from banned source {address:?}");
        return Ok(());
    }

    peer_book.record_seen(address, clock::unix_now().unwrap_or_default());

    let contents = fs_err::tokio::read_to_string(&path).await?;
    let mut submitted = 0_usize;
    let mut skipped = 0_usize;

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        if !network.is_connected(IMPORT_CONNECTION_ID) {
            warn_with_status!(
                "import from {path:?} aborted after {submitted} blocks: source was banned",
            );
            return Ok(());
        }

        let block = match serde_json::from_str::<Block>(line) {
            Ok(block) => block,
            Err(error) => {
                warn_with_status!("{path:?} line {} is not a block: {error}", index + 1);
                skipped += 1;
                continue;
            }
        };

        controller
            .submit_block(Arc::new(block), BlockOrigin::Peer(IMPORT_CONNECTION_ID))
            .await?;

        submitted += 1;
    }

    info_with_status!(
        "import from {path:?} finished (blocks submitted: {submitted}, lines skipped: {skipped})",
    );

    Ok(())
}
