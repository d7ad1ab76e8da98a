#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 运行配置
pub mod counting; // 穿越/占用计数
pub mod detection; // 检测与跟踪
pub mod error; // 错误类型
pub mod geometry; // 几何基元
pub mod input; // 视频输入系统
pub mod pipeline; // 三阶段流水线
pub mod redaction; // 隐私马赛克
pub mod renderer; // 缩放与叠加层
pub mod zones; // 区域存储

pub use crate::config::SentinelConfig;
pub use crate::counting::{CounterSnapshot, Evaluator, SharedCounters, TableRow};
pub use crate::detection::{Track, TrackProvider, PERSON_CLASS};
pub use crate::error::{
    ConfigError, InferenceError, RedactionBoundsError, SinkError, SourceError, ZoneValidationError,
};
pub use crate::geometry::{BBox, Point, Side};
pub use crate::input::{Frame, FrameSource};
pub use crate::pipeline::{Pipeline, PipelineParts};
pub use crate::redaction::Redactor;
pub use crate::renderer::{FrameSink, Renderer};
pub use crate::zones::{BoxZone, ClearTarget, CrossingDirection, LineKind, LineZone, ZoneStore};

/// 时间戳字符串, 用于输出文件名
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
