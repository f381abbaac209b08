//! Bounded waits for human input from inside a blocking session thread.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::warn;

/// Receiving end of an input channel, drained synchronously.
///
/// Sessions run on a blocking thread; [`Inbox::next`] parks that thread on
/// the runtime until a value arrives, the sender goes away, or the timeout
/// expires.
pub struct Inbox<T> {
    rx: mpsc::Receiver<T>,
    handle: Handle,
    timeout: Option<Duration>,
}

impl<T> Inbox<T> {
    pub fn new(rx: mpsc::Receiver<T>, handle: Handle, timeout: Option<Duration>) -> Self {
        Self {
            rx,
            handle,
            timeout,
        }
    }

    /// `None` when the input closed or the wait timed out.
    pub fn next(&mut self) -> Option<T> {
        let rx = &mut self.rx;
        match self.timeout {
            None => self.handle.block_on(rx.recv()),
            Some(limit) => match self.handle.block_on(tokio::time::timeout(limit, rx.recv())) {
                Ok(v) => v,
                Err(_) => {
                    warn!(?limit, "timed out waiting for a move");
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn delivers_then_reports_closed() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(7u32).await.unwrap();
        drop(tx);
        let mut inbox = Inbox::new(rx, Handle::current(), None);
        let got = tokio::task::spawn_blocking(move || (inbox.next(), inbox.next()))
            .await
            .unwrap();
        assert_eq!(got, (Some(7), None));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gives_up_after_the_timeout() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        let mut inbox = Inbox::new(rx, Handle::current(), Some(Duration::from_millis(20)));
        let got = tokio::task::spawn_blocking(move || inbox.next()).await.unwrap();
        assert_eq!(got, None);
        drop(tx);
    }
}
