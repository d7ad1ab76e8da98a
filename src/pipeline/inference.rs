//! 推理与评估阶段 (Inference + Evaluation)
//!
//! 等待原始帧 → 跳帧策略 → 检测跟踪 → 穿越/占用评估 → 更新计数 → 马赛克 → 渲染帧槽。
//! 检测失败时跳过本周期, 不写渲染槽, 计数不变。

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::shutdown::ShutdownSignal;
use super::slot::{FrameSlot, Wait};
use super::stats::{FpsMeter, PipelineStats};
use crate::counting::{Evaluator, SharedCounters};
use crate::detection::{Track, TrackProvider};
use crate::input::Frame;
use crate::redaction::Redactor;
use crate::zones::ZoneStore;

/// 推理线程 → 渲染线程
#[derive(Debug, Clone)]
pub struct RenderFrame {
    pub frame: Frame,
    /// 本周期已确认的人体轨迹, 跳过的帧为空
    pub tracks: Vec<Track>,
    /// 是否经过推理 (跳过的帧原样转发)
    pub inferred: bool,
}

pub struct InferenceStage {
    pub(crate) provider: Box<dyn TrackProvider>,
    pub(crate) evaluator: Evaluator,
    pub(crate) redactor: Option<Redactor>,
    pub(crate) zones: Arc<ZoneStore>,
    pub(crate) counters: Arc<SharedCounters>,
    pub(crate) raw: Arc<FrameSlot<Frame>>,
    pub(crate) render: Arc<FrameSlot<RenderFrame>>,
    pub(crate) frame_skip: u64,
    pub(crate) wait_timeout: Duration,
    pub(crate) stats: Arc<PipelineStats>,
    pub(crate) shutdown: ShutdownSignal,
}

impl InferenceStage {
    pub fn run(&mut self) {
        tracing::info!(
            provider = self.provider.name(),
            frame_skip = self.frame_skip,
            redaction = self.redactor.is_some(),
            "inference stage started"
        );
        let mut meter = FpsMeter::new("inference");
        let mut signaled: u64 = 0;

        while !self.shutdown.is_requested() {
            let frame = match self.raw.wait_take(self.wait_timeout) {
                Wait::Ready(frame) => frame,
                Wait::Timeout => continue,
                Wait::Closed => break,
            };
            PipelineStats::incr(&self.stats.frames_signaled);
            let seq = signaled;
            signaled += 1;

            if seq % self.frame_skip != 0 {
                PipelineStats::incr(&self.stats.frames_skipped);
                self.render.put(RenderFrame {
                    frame,
                    tracks: Vec::new(),
                    inferred: false,
                });
                continue;
            }

            if let Some(out) = self.process(frame) {
                self.render.put(out);
                meter.tick();
            }
        }

        self.render.close();
        tracing::info!(frames = signaled, "inference stage exited");
    }

    /// 单个推理周期; 检测失败返回 `None`
    fn process(&mut self, mut frame: Frame) -> Option<RenderFrame> {
        let start = Instant::now();
        let tracks = match self.provider.detect_and_track(&frame) {
            Ok(tracks) => tracks,
            Err(err) => {
                PipelineStats::incr(&self.stats.inference_errors);
                tracing::warn!(frame = frame.id, error = %err, "inference failed, skipping cycle");
                return None;
            }
        };
        let elapsed = start.elapsed();
        self.stats
            .last_inference_us
            .store(elapsed.as_micros() as u64, std::sync::atomic::Ordering::Relaxed);

        let zones = self.zones.snapshot();
        let outcome = self.evaluator.evaluate(&zones, &tracks);
        self.counters.apply(&outcome);

        if let Some(redactor) = &self.redactor {
            redactor.redact(&mut frame.image, &outcome.redact);
        }
        PipelineStats::incr(&self.stats.frames_inferred);
        tracing::trace!(
            frame = frame.id,
            tracks = tracks.len(),
            entries = outcome.entries,
            exits = outcome.exits,
            occupancy = outcome.occupancy,
            inference_ms = elapsed.as_secs_f64() * 1000.0,
            "cycle evaluated"
        );

        let tracks = tracks
            .into_iter()
            .filter(|t| t.confirmed && t.is_person())
            .collect();
        Some(RenderFrame {
            frame,
            tracks,
            inferred: true,
        })
    }
}
