//! 渲染阶段 (Render)
//!
//! 等待渲染帧 → 缩放 + 叠加层 → 输出; 按固定间隔记录计数快照。

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};

use super::inference::RenderFrame;
use super::shutdown::ShutdownSignal;
use super::slot::{FrameSlot, Wait};
use super::stats::{FpsMeter, PipelineStats};
use crate::counting::{CounterSnapshot, SharedCounters};
use crate::renderer::{FrameSink, Renderer};
use crate::zones::ZoneStore;

pub struct RenderStage {
    pub(crate) renderer: Renderer,
    pub(crate) sink: Box<dyn FrameSink>,
    pub(crate) render: Arc<FrameSlot<RenderFrame>>,
    pub(crate) zones: Arc<ZoneStore>,
    pub(crate) counters: Arc<SharedCounters>,
    pub(crate) snapshot_tx: Sender<CounterSnapshot>,
    pub(crate) snapshot_interval: Duration,
    pub(crate) wait_timeout: Duration,
    pub(crate) stats: Arc<PipelineStats>,
    pub(crate) shutdown: ShutdownSignal,
}

impl RenderStage {
    pub fn run(&mut self) {
        let (w, h) = self.renderer.size();
        tracing::info!(width = w, height = h, "render stage started");
        let mut meter = FpsMeter::new("render");
        let mut next_snapshot = Instant::now() + self.snapshot_interval;

        while !self.shutdown.is_requested() {
            let now = Instant::now();
            if now >= next_snapshot {
                self.record_snapshot();
                next_snapshot += self.snapshot_interval;
                // 落后太多时不补记
                if next_snapshot <= now {
                    next_snapshot = now + self.snapshot_interval;
                }
            }

            let timeout = self
                .wait_timeout
                .min(next_snapshot.saturating_duration_since(Instant::now()));
            match self.render.wait_take(timeout) {
                Wait::Ready(frame) => {
                    self.present(frame);
                    meter.tick();
                }
                Wait::Timeout => {}
                Wait::Closed => break,
            }
        }

        tracing::info!("render stage exited");
    }

    fn record_snapshot(&mut self) {
        let snapshot = self.counters.record_snapshot();
        PipelineStats::incr(&self.stats.snapshots);
        // 快照已写入历史, 通道满时只丢弃通知
        match self.snapshot_tx.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                PipelineStats::incr(&self.stats.snapshots_dropped);
                tracing::debug!(
                    dropped = self.stats.snapshots_dropped.load(Ordering::Relaxed),
                    "snapshot consumer lagging, snapshot dropped"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("snapshot receiver gone");
            }
        }
    }

    fn present(&mut self, frame: RenderFrame) {
        let zones = self.zones.snapshot();
        let result = self
            .renderer
            .compose(&frame.frame.image, &zones, &frame.tracks)
            .and_then(|canvas| self.sink.present(&canvas));
        match result {
            Ok(()) => PipelineStats::incr(&self.stats.frames_rendered),
            Err(err) => {
                PipelineStats::incr(&self.stats.sink_errors);
                tracing::warn!(frame = frame.frame.id, error = %err, "failed to present frame");
            }
        }
    }
}
