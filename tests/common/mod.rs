//! 集成测试公共组件: 脚本化帧源与轨迹提供者
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use zone_sentinel::config::SentinelConfig;
use zone_sentinel::detection::{Track, TrackProvider, PERSON_CLASS};
use zone_sentinel::error::{InferenceError, SourceError};
use zone_sentinel::geometry::BBox;
use zone_sentinel::input::{Frame, FrameSource};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

pub fn gradient() -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        Rgb([(x * 4) as u8, (y * 5) as u8, ((x * y) % 256) as u8])
    })
}

/// 按固定间隔产出 `count` 帧, 之后报告流结束
pub struct ScriptedSource {
    next: u64,
    count: u64,
    interval: Duration,
    pub reconnects: Arc<AtomicU64>,
}

impl ScriptedSource {
    pub fn new(count: u64, interval: Duration) -> Self {
        Self {
            next: 0,
            count,
            interval,
            reconnects: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<Frame, SourceError> {
        if self.next >= self.count {
            return Err(SourceError::EndOfStream);
        }
        std::thread::sleep(self.interval);
        let frame = Frame::new(self.next, gradient());
        self.next += 1;
        Ok(frame)
    }

    fn reconnect(&mut self) -> Result<(), SourceError> {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// 总是失败的帧源
pub struct DeadSource;

impl FrameSource for DeadSource {
    fn read(&mut self) -> Result<Frame, SourceError> {
        Err(SourceError::Disconnected("camera unplugged".to_string()))
    }

    fn describe(&self) -> String {
        "dead".to_string()
    }
}

/// 轨迹由帧序号计算; `fail_on` 中的帧返回推理错误
pub struct ScriptedProvider<F> {
    script: F,
    fail_on: HashSet<u64>,
    pub calls: Arc<AtomicU64>,
}

impl<F> ScriptedProvider<F>
where
    F: Fn(u64) -> Vec<Track> + Send,
{
    pub fn new(script: F) -> Self {
        Self {
            script,
            fail_on: HashSet::new(),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn failing_on(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.fail_on.extend(frames);
        self
    }
}

impl<F> TrackProvider for ScriptedProvider<F>
where
    F: Fn(u64) -> Vec<Track> + Send,
{
    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<Track>, InferenceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_on.contains(&frame.id) {
            return Err(InferenceError::backend("scripted fault"));
        }
        Ok((self.script)(frame.id))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn person(id: u32, cx: i32, cy: i32) -> Track {
    Track::new(
        id,
        BBox::new(cx - 4, cy - 4, cx + 4, cy + 4),
        true,
        PERSON_CLASS,
    )
}

/// 测试用配置: 显示尺寸与帧相同, 快速退避与快照
pub fn test_config() -> SentinelConfig {
    let mut config = SentinelConfig::default();
    config.display.width = WIDTH;
    config.display.height = HEIGHT;
    config.display.draw_tracks = false;
    config.pipeline.snapshot_interval_ms = 50;
    config.pipeline.wait_timeout_ms = 20;
    config.reconnect.initial_backoff_ms = 10;
    config.reconnect.max_backoff_ms = 40;
    config
}

pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}
