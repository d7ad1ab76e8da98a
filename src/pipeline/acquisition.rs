//! 采集阶段 (Acquisition)
//!
//! 读取帧 → 写入原始帧槽; 失败时按指数退避等待并重连, 间隔有上限。

use std::sync::Arc;
use std::time::Duration;

use super::shutdown::ShutdownSignal;
use super::slot::FrameSlot;
use super::stats::{FpsMeter, PipelineStats};
use crate::config::ReconnectConfig;
use crate::input::{Frame, FrameSource};

/// 有上限的指数退避
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            multiplier: multiplier.max(1.0),
            current: initial,
            attempts: 0,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.multiplier,
        )
    }

    /// Delay to wait before the next attempt; grows until capped at `max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(self.multiplier).min(self.max);
        self.attempts += 1;
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

pub struct AcquisitionStage {
    source: Box<dyn FrameSource>,
    raw: Arc<FrameSlot<Frame>>,
    backoff: Backoff,
    stats: Arc<PipelineStats>,
    shutdown: ShutdownSignal,
}

impl AcquisitionStage {
    pub fn new(
        source: Box<dyn FrameSource>,
        raw: Arc<FrameSlot<Frame>>,
        backoff: Backoff,
        stats: Arc<PipelineStats>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            source,
            raw,
            backoff,
            stats,
            shutdown,
        }
    }

    pub fn run(&mut self) {
        let name = self.source.describe();
        tracing::info!(source = %name, "acquisition stage started");
        let mut meter = FpsMeter::new("acquisition");

        while !self.shutdown.is_requested() {
            match self.source.read() {
                Ok(frame) => {
                    if self.backoff.attempts() > 0 {
                        tracing::info!(source = %name, attempts = self.backoff.attempts(), "source recovered");
                        self.backoff.reset();
                    }
                    PipelineStats::incr(&self.stats.frames_acquired);
                    self.raw.put(frame);
                    meter.tick();
                }
                Err(err) => {
                    PipelineStats::incr(&self.stats.source_errors);
                    let delay = self.backoff.next_delay();
                    tracing::warn!(source = %name, error = %err, retry_in = ?delay, "frame read failed");
                    if self.shutdown.sleep(delay) {
                        break;
                    }
                    PipelineStats::incr(&self.stats.reconnects);
                    if let Err(err) = self.source.reconnect() {
                        tracing::warn!(source = %name, error = %err, "reconnect failed");
                    }
                }
            }
        }

        // 通知推理阶段不会再有新帧
        self.raw.close();
        tracing::info!(source = %name, "acquisition stage exited");
    }
}
