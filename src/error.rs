//! 错误类型 (Error taxonomy)
//!
//! 每个阶段的错误都在阶段边界被捕获并记录, 只有显式关闭才会终止流水线。

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::geometry::{BBox, Point};

/// 帧采集失败, 由采集阶段退避重连处理
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("frame source disconnected: {0}")]
    Disconnected(String),

    #[error("end of stream")]
    EndOfStream,

    #[error("no frame within {0:?}")]
    Timeout(Duration),

    #[error("failed to open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),
}

/// 检测/跟踪失败, 跳过当前周期
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("malformed input frame: {0}")]
    MalformedInput(String),

    #[error("inference backend fault: {0}")]
    Backend(String),
}

impl InferenceError {
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedInput(msg.into())
    }
}

/// 用户绘制的区域无效, 在区域存储边界被拒绝
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZoneValidationError {
    #[error("line from {start:?} to {end:?} has zero length")]
    ZeroLengthLine { start: Point, end: Point },

    #[error("box ({x1},{y1})-({x2},{y2}) has zero area")]
    ZeroAreaBox { x1: i32, y1: i32, x2: i32, y2: i32 },
}

/// 裁剪到画面后退化的马赛克区域, 仅跳过该框
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("box {bbox:?} is empty after clamping to {width}x{height}")]
pub struct RedactionBoundsError {
    pub bbox: BBox,
    pub width: u32,
    pub height: u32,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid zone in configuration: {0}")]
    Zone(#[from] ZoneValidationError),
}

/// 显示输出错误
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("resize failed: {0}")]
    Resize(String),

    #[error("invalid font: {0}")]
    Font(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),
}
