use std::io::Write;

use anyhow::Result;
use chain_control::NotifierMessage;
use futures::{channel::mpsc::UnboundedReceiver, StreamExt as _};
use logging::{debug_with_status, info_with_status};

const BELL: &[u8] = b"\x07";

/// Turns notifications from the dispatch loop into log lines and terminal bells.
pub struct Notifier<W> {
    bell: W,
}

impl<W: Write> Notifier<W> {
    pub const fn new(bell: W) -> Self {
        Self { bell }
    }

    pub async fn run(mut self, mut notifier_rx: UnboundedReceiver<NotifierMessage>) -> Result<()> {
        while let Some(message) = notifier_rx.next().await {
            if !self.handle(message)? {
                break;
            }
        }

        debug_with_status!("notifier stopped");

        Ok(())
    }

    /// Returns `false` once the dispatch loop has stopped.
    fn handle(&mut self, message: NotifierMessage) -> Result<bool> {
        match message {
            NotifierMessage::NewBlock { hash, tip_height } => {
                info_with_status!("received block {hash:?} (tip height: {tip_height})");
                self.ring(1)?;
            }
            NotifierMessage::MinedByUs { hash } => {
                info_with_status!("block mined by us: {hash:?}");
                self.ring(1)?;
            }
            // The dispatch loop has already logged the orphaned block.
            NotifierMessage::OrphanedBlock { fork_depth, .. } => {
                if fork_depth > 1 {
                    self.ring(3)?;
                }
            }
            NotifierMessage::BalanceChanged { summary, alert } => {
                info_with_status!("balance changed: {summary}");

                if alert {
                    self.ring(1)?;
                }
            }
            NotifierMessage::Stop => return Ok(false),
        }

        Ok(true)
    }

    fn ring(&mut self, times: usize) -> Result<()> {
        self.bell.write_all(&BELL.repeat(times))?;
        self.bell.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc;
    use test_case::test_case;
    use types::H256;

    use super::*;

    #[test_case(
        NotifierMessage::NewBlock { hash: H256::zero(), tip_height: 3 },
        1;
        "new block"
    )]
    #[test_case(NotifierMessage::MinedByUs { hash: H256::zero() }, 1; "mined by us")]
    #[test_case(
        NotifierMessage::OrphanedBlock { hash: H256::zero(), height: 4, fork_depth: 1 },
        0;
        "shallow fork"
    )]
    #[test_case(
        NotifierMessage::OrphanedBlock { hash: H256::zero(), height: 4, fork_depth: 2 },
        3;
        "deep fork"
    )]
    #[test_case(
        NotifierMessage::BalanceChanged { summary: "alice: 1".to_owned(), alert: false },
        0;
        "quiet balance change"
    )]
    #[test_case(
        NotifierMessage::BalanceChanged { summary: "alice: 1".to_owned(), alert: true },
        1;
        "balance alert"
    )]
    fn bells(message: NotifierMessage, expected_bells: usize) -> Result<()> {
        let mut notifier = Notifier::new(vec![]);

        assert!(notifier.handle(message)?);
        assert_eq!(notifier.bell, BELL.repeat(expected_bells));

        Ok(())
    }

    #[tokio::test]
    async fn notifier_stops_on_stop_message() -> Result<()> {
        let (notifier_tx, notifier_rx) = mpsc::unbounded();

        notifier_tx.unbounded_send(NotifierMessage::Stop)?;
        notifier_tx.unbounded_send(NotifierMessage::MinedByUs { hash: H256::zero() })?;

        let mut bell = vec![];
        Notifier::new(&mut bell).run(notifier_rx).await?;

        assert_eq!(bell, b"");

        Ok(())
    }
}
