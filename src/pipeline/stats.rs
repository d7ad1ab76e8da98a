//! 吞吐统计: 各阶段原子计数器 + 每秒一次的帧率日志

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_acquired: AtomicU64,
    pub source_errors: AtomicU64,
    pub reconnects: AtomicU64,
    pub frames_signaled: AtomicU64,
    pub frames_inferred: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub inference_errors: AtomicU64,
    pub frames_rendered: AtomicU64,
    pub sink_errors: AtomicU64,
    pub snapshots: AtomicU64,
    /// 消费者未及时读取而丢弃的快照
    pub snapshots_dropped: AtomicU64,
    /// 最近一次推理耗时 (微秒)
    pub last_inference_us: AtomicU64,
}

impl PipelineStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_acquired: get(&self.frames_acquired),
            source_errors: get(&self.source_errors),
            reconnects: get(&self.reconnects),
            frames_signaled: get(&self.frames_signaled),
            frames_inferred: get(&self.frames_inferred),
            frames_skipped: get(&self.frames_skipped),
            inference_errors: get(&self.inference_errors),
            frames_rendered: get(&self.frames_rendered),
            sink_errors: get(&self.sink_errors),
            snapshots: get(&self.snapshots),
            snapshots_dropped: get(&self.snapshots_dropped),
            last_inference_ms: get(&self.last_inference_us) as f64 / 1000.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub frames_acquired: u64,
    pub source_errors: u64,
    pub reconnects: u64,
    pub frames_signaled: u64,
    pub frames_inferred: u64,
    pub frames_skipped: u64,
    pub inference_errors: u64,
    pub frames_rendered: u64,
    pub sink_errors: u64,
    pub snapshots: u64,
    pub snapshots_dropped: u64,
    pub last_inference_ms: f64,
}

/// 阶段帧率计: 每秒输出一次
#[derive(Debug)]
pub(crate) struct FpsMeter {
    stage: &'static str,
    count: u64,
    last: Instant,
}

impl FpsMeter {
    pub(crate) fn new(stage: &'static str) -> Self {
        Self {
            stage,
            count: 0,
            last: Instant::now(),
        }
    }

    pub(crate) fn tick(&mut self) {
        self.count += 1;
        let elapsed = self.last.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = self.count as f64 / elapsed.as_secs_f64();
            tracing::debug!(stage = self.stage, fps = format!("{fps:.1}"), "throughput");
            self.count = 0;
            self.last = Instant::now();
        }
    }
}
