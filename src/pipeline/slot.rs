//! 单槽帧交接 (Single-slot hand-off)
//!
//! 最多保存一帧; 写入不阻塞并覆盖未读的旧帧, 读取取走帧并清除就绪状态。
//! 读端在条件变量上挂起, 不轮询。

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct SlotState<T> {
    value: Option<T>,
    closed: bool,
    overwritten: u64,
}

/// Outcome of a blocking [`FrameSlot::wait_take`].
#[derive(Debug, PartialEq, Eq)]
pub enum Wait<T> {
    Ready(T),
    Timeout,
    /// 写端已关闭且槽为空
    Closed,
}

#[derive(Debug)]
pub struct FrameSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                closed: false,
                overwritten: 0,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value`, replacing any unread one, and wakes the reader.
    /// Returns `true` when an unread value was dropped.
    pub fn put(&self, value: T) -> bool {
        let mut state = self.lock();
        let dropped = state.value.replace(value).is_some();
        if dropped {
            state.overwritten += 1;
        }
        drop(state);
        self.ready.notify_one();
        dropped
    }

    /// 非阻塞取帧
    pub fn take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// Suspends until a value is available, the slot is closed, or `timeout`
    /// elapses. A value written before `close` is still delivered.
    pub fn wait_take(&self, timeout: Duration) -> Wait<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(value) = state.value.take() {
                return Wait::Ready(value);
            }
            if state.closed {
                return Wait::Closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return Wait::Timeout;
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// 关闭槽并唤醒读端
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn has_value(&self) -> bool {
        self.lock().value.is_some()
    }

    /// 被覆盖 (未读即丢弃) 的帧数
    pub fn overwritten(&self) -> u64 {
        self.lock().overwritten
    }
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
