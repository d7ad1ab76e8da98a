//! 关闭信号: 发送端被丢弃即表示关闭, 所有工作线程在周期之间检查

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Observed by every worker thread.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

/// 持有发送端; `trigger` 或 drop 都会通知所有 [`ShutdownSignal`]
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: Mutex<Option<Sender<()>>>,
}

pub fn shutdown_pair() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = bounded(0);
    (
        ShutdownTrigger {
            tx: Mutex::new(Some(tx)),
        },
        ShutdownSignal { rx },
    )
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            tracing::info!("shutdown requested");
        }
    }
}

impl ShutdownSignal {
    pub fn is_requested(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for `duration` unless shutdown arrives first.
    /// Returns `true` when shutdown was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        match self.rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) | Ok(()) => true,
        }
    }
}
