use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A message delivered after a delay unless the handle is dropped first.
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct DelayedTask {
    handle: JoinHandle<()>,
}

impl DelayedTask {
    pub fn schedule<T>(delay: Duration, tx: mpsc::UnboundedSender<T>, message: T) -> Self
    where
        T: Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(message);
        });

        Self { handle }
    }

    /// Cancel explicitly; equivalent to dropping the handle
    pub fn cancel(self) {}
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
