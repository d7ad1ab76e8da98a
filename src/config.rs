//! 运行配置 - 通过JSON文件调整参数
//!
//! 文件不存在时写出默认配置; 所有字段都有默认值, 旧配置文件缺失的字段自动补齐。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detection::TrackerConfig;
use crate::error::ConfigError;
use crate::zones::ZoneSnapshot;

/// 流水线参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 每N帧推理一次, 1 表示逐帧
    pub frame_skip: u32,
    /// 计数快照间隔
    pub snapshot_interval_ms: u64,
    /// 历史表最大行数
    pub history_capacity: usize,
    /// 轨迹记忆保留的评估周期数
    pub track_memory_ttl: u64,
    /// 阶段等待帧的超时, 超时后检查关闭信号
    pub wait_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_skip: 1,
            snapshot_interval_ms: 1000,
            history_capacity: 3600,
            track_memory_ttl: 150,
            wait_timeout_ms: 100,
        }
    }
}

impl PipelineConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms.max(1))
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms.max(1))
    }
}

/// 断线重连退避参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub read_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
            read_timeout_ms: 5_000,
        }
    }
}

impl ReconnectConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// 检测参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 检测置信度阈值, 之上的检测可以新建轨迹
    pub confidence_threshold: f32,
    /// NMS IOU阈值
    pub iou_threshold: f32,
    pub model_path: Option<PathBuf>,
    pub tracker: TrackerConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            model_path: None,
            tracker: TrackerConfig::default(),
        }
    }
}

/// 马赛克参数
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub enabled: bool,
    pub grid: u32,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grid: crate::redaction::DEFAULT_GRID,
        }
    }
}

/// 显示参数
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub draw_tracks: bool,
    /// TTF/OTF 字体, 用于绘制轨迹ID
    pub font_path: Option<PathBuf>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 600,
            height: 400,
            draw_tracks: true,
            font_path: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub pipeline: PipelineConfig,
    pub reconnect: ReconnectConfig,
    pub detection: DetectionConfig,
    pub redaction: RedactionConfig,
    pub display: DisplayConfig,
    /// 启动时的初始区域
    pub zones: ZoneSnapshot,
}

impl SentinelConfig {
    pub fn from_json(json: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 从JSON文件加载配置, 文件不存在时写出默认配置
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let config = Self::from_json(&json, path)?;
                tracing::info!(path = %path.display(), "configuration loaded");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path)?;
                tracing::info!(path = %path.display(), "configuration file created with defaults");
                Ok(config)
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 校验初始区域
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(line) = &self.zones.entry_line {
            line.validate()?;
        }
        if let Some(line) = &self.zones.exit_line {
            line.validate()?;
        }
        if let Some(zone) = &self.zones.occupancy_box {
            zone.normalized().validate()?;
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        tracing::info!(
            frame_skip = self.pipeline.frame_skip,
            snapshot_ms = self.pipeline.snapshot_interval_ms,
            confidence = self.detection.confidence_threshold,
            n_init = self.detection.tracker.n_init,
            max_age = self.detection.tracker.max_age,
            redaction = self.redaction.enabled,
            grid = self.redaction.grid,
            display = %format!("{}x{}", self.display.width, self.display.height),
            "active configuration"
        );
    }
}
