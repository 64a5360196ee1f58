use futures::{
    channel::mpsc::{TrySendError, UnboundedSender},
    sink::Drain,
};
use logging::debug_with_status;

/// A destination for messages produced by the dispatch loop that never blocks the sender.
pub trait UnboundedSink<T>: Send + 'static {
    // `Drain` does not implement `Clone`.
    fn clone(&self) -> Self;

    fn unbounded_send(&self, message: T) -> Result<(), T>;

    fn send_or_log(&self, message: T, receiver: &str) {
        if self.unbounded_send(message).is_err() {
            debug_with_status!("send to {receiver} failed because the receiver was dropped");
        }
    }
}

impl<T, S: UnboundedSink<T> + Clone> UnboundedSink<T> for Option<S> {
    fn clone(&self) -> Self {
        Clone::clone(self)
    }

    fn unbounded_send(&self, message: T) -> Result<(), T> {
        self.as_ref()
            .map_or(Ok(()), |sink| sink.unbounded_send(message))
    }
}

impl<T: Send + 'static> UnboundedSink<T> for UnboundedSender<T> {
    fn clone(&self) -> Self {
        Clone::clone(self)
    }

    fn unbounded_send(&self, message: T) -> Result<(), T> {
        Self::unbounded_send(self, message).map_err(TrySendError::into_inner)
    }
}

impl<T: Send + 'static> UnboundedSink<T> for Drain<T> {
    fn clone(&self) -> Self {
        futures::sink::drain()
    }

    fn unbounded_send(&self, _message: T) -> Result<(), T> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc;

    use super::*;

    #[test]
    fn closed_channel_returns_message() {
        let (tx, rx) = mpsc::unbounded::<u8>();

        drop(rx);

        assert_eq!(UnboundedSink::unbounded_send(&tx, 7), Err(7));
    }

    #[test]
    fn missing_sink_accepts_everything() {
        let sink = None::<UnboundedSender<u8>>;

        assert_eq!(sink.unbounded_send(7), Ok(()));
    }
}
