use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Creates a connected stop handle / signal pair.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

/// Raises the global stop signal. Cheap to clone and hand to a ctrl-c task.
#[derive(Clone, Debug)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Lowers the signal again so a new run can start.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Worker-side view of the stop signal.
#[derive(Clone, Debug)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is raised. Never resolves if the handle is
    /// dropped without raising it.
    pub async fn raised(&self) {
        let mut rx = self.rx.clone();
        let raised = rx.wait_for(|stopped| *stopped).await.is_ok();
        if !raised {
            std::future::pending::<()>().await;
        }
    }

    /// Sleeps for `delay` unless the signal is raised first.
    /// Returns `false` when the sleep was cut short.
    pub async fn sleep(&self, delay: Duration) -> bool {
        if self.is_raised() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.raised() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_is_cut_short_by_stop() {
        let (handle, signal) = stop_channel();
        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.stop();
        });

        let completed = signal.sleep(Duration::from_secs(30)).await;
        assert!(!completed);
        assert!(signal.is_raised());
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn sleep_completes_without_stop() {
        let (_handle, signal) = stop_channel();
        assert!(signal.sleep(Duration::from_millis(5)).await);
        assert!(!signal.is_raised());
    }
}
