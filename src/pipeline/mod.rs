/// 视频处理流水线 (Video Processing Pipeline)
///
/// 三个长期运行的工作线程, 通过单槽交接通信:
/// - Acquisition: 帧源读取 → 原始帧槽
/// - Inference:   检测跟踪 + 评估 + 马赛克 → 渲染帧槽
/// - Render:      缩放 + 叠加层 → 输出, 定时计数快照
///
/// 跨阶段只共享计数状态、两个帧槽与区域存储; 只有推理阶段修改计数。
pub mod acquisition;
pub mod inference;
pub mod render;
pub mod shutdown;
pub mod slot;
pub mod stats;

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver};

use crate::config::SentinelConfig;
use crate::counting::{CounterSnapshot, Evaluator, SharedCounters};
use crate::detection::TrackProvider;
use crate::input::{Frame, FrameSource};
use crate::redaction::Redactor;
use crate::renderer::{FrameSink, Renderer};
use crate::zones::ZoneStore;

pub use acquisition::{AcquisitionStage, Backoff};
pub use inference::{InferenceStage, RenderFrame};
pub use render::RenderStage;
pub use shutdown::{shutdown_pair, ShutdownSignal, ShutdownTrigger};
pub use slot::{FrameSlot, Wait};
pub use stats::{PipelineStats, StatsSnapshot};

/// 未读快照通道容量
const SNAPSHOT_BACKLOG: usize = 64;

/// Everything the pipeline owns or shares.
pub struct PipelineParts {
    pub source: Box<dyn FrameSource>,
    pub provider: Box<dyn TrackProvider>,
    pub sink: Box<dyn FrameSink>,
    pub renderer: Renderer,
    pub zones: Arc<ZoneStore>,
    pub counters: Arc<SharedCounters>,
}

pub struct Pipeline {
    trigger: ShutdownTrigger,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    zones: Arc<ZoneStore>,
    counters: Arc<SharedCounters>,
    stats: Arc<PipelineStats>,
    raw: Arc<FrameSlot<Frame>>,
    render: Arc<FrameSlot<RenderFrame>>,
    snapshots: Receiver<CounterSnapshot>,
}

fn spawn_stage<F>(name: &'static str, body: F) -> std::io::Result<(&'static str, JoinHandle<()>)>
where
    F: FnOnce() + Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)?;
    Ok((name, handle))
}

impl Pipeline {
    /// Starts the three worker threads.
    pub fn spawn(parts: PipelineParts, config: &SentinelConfig) -> std::io::Result<Self> {
        let PipelineParts {
            source,
            provider,
            sink,
            renderer,
            zones,
            counters,
        } = parts;

        let (trigger, signal) = shutdown_pair();
        let stats = Arc::new(PipelineStats::default());
        let raw = Arc::new(FrameSlot::new());
        let render = Arc::new(FrameSlot::new());
        let (snapshot_tx, snapshots) = bounded(SNAPSHOT_BACKLOG);
        let wait_timeout = config.pipeline.wait_timeout();

        let mut acquisition = AcquisitionStage::new(
            source,
            Arc::clone(&raw),
            Backoff::from_config(&config.reconnect),
            Arc::clone(&stats),
            signal.clone(),
        );
        let mut inference = InferenceStage {
            provider,
            evaluator: Evaluator::new(config.pipeline.track_memory_ttl),
            redactor: config
                .redaction
                .enabled
                .then(|| Redactor::new(config.redaction.grid)),
            zones: Arc::clone(&zones),
            counters: Arc::clone(&counters),
            raw: Arc::clone(&raw),
            render: Arc::clone(&render),
            frame_skip: u64::from(config.pipeline.frame_skip.max(1)),
            wait_timeout,
            stats: Arc::clone(&stats),
            shutdown: signal.clone(),
        };
        let mut render_stage = RenderStage {
            renderer,
            sink,
            render: Arc::clone(&render),
            zones: Arc::clone(&zones),
            counters: Arc::clone(&counters),
            snapshot_tx,
            snapshot_interval: config.pipeline.snapshot_interval(),
            wait_timeout,
            stats: Arc::clone(&stats),
            shutdown: signal,
        };

        let mut pipeline = Self {
            trigger,
            handles: Vec::with_capacity(3),
            zones,
            counters,
            stats,
            raw,
            render,
            snapshots,
        };

        // 下游先启动; 任一线程启动失败时关闭已启动的线程
        let stages: [(&'static str, Box<dyn FnOnce() + Send>); 3] = [
            ("render", Box::new(move || render_stage.run())),
            ("inference", Box::new(move || inference.run())),
            ("acquisition", Box::new(move || acquisition.run())),
        ];
        for (name, body) in stages {
            match spawn_stage(name, body) {
                Ok(handle) => pipeline.handles.push(handle),
                Err(err) => {
                    pipeline.stop();
                    return Err(err);
                }
            }
        }
        tracing::info!("pipeline started");
        Ok(pipeline)
    }

    pub fn zones(&self) -> &Arc<ZoneStore> {
        &self.zones
    }

    pub fn counters(&self) -> &Arc<SharedCounters> {
        &self.counters
    }

    /// Periodic counter snapshots, one per snapshot interval.
    pub fn snapshots(&self) -> &Receiver<CounterSnapshot> {
        &self.snapshots
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// 两个帧槽中未读即被覆盖的帧数 (原始, 渲染)
    pub fn overwritten(&self) -> (u64, u64) {
        (self.raw.overwritten(), self.render.overwritten())
    }

    fn stop(&mut self) {
        self.trigger.trigger();
        self.raw.close();
        self.render.close();
        for (name, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::warn!(stage = name, "stage thread panicked");
            }
        }
    }

    /// Signals every stage and waits for them to exit.
    pub fn shutdown(mut self) -> StatsSnapshot {
        self.stop();
        let stats = self.stats.snapshot();
        tracing::info!(
            acquired = stats.frames_acquired,
            inferred = stats.frames_inferred,
            rendered = stats.frames_rendered,
            "pipeline stopped"
        );
        stats
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.stop();
        }
    }
}
