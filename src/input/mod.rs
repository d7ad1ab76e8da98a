/// 视频输入系统 (Video Input System)
///
/// 采集线程拥有帧源, 按顺序读取原始帧
/// - ImageDirSource: 图片目录回放 (可循环)
/// - FfmpegSource:   RTSP 拉流 / 本地摄像头 (ffmpeg 特性)
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod image_dir;

use std::time::Instant;

use image::RgbImage;

use crate::error::SourceError;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegSource, InputSource};
pub use image_dir::ImageDirSource;

/// 原始帧 (采集线程 → 推理线程)
#[derive(Debug, Clone)]
pub struct Frame {
    /// 帧源内单调递增的序号
    pub id: u64,
    pub image: RgbImage,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(id: u64, image: RgbImage) -> Self {
        Self {
            id,
            image,
            captured_at: Instant::now(),
        }
    }

    /// 全黑帧
    pub fn blank(id: u64, width: u32, height: u32) -> Self {
        Self::new(id, RgbImage::new(width, height))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Continuous supply of raw frames, owned by the acquisition stage.
///
/// Every error from `read` is treated as a reason to back off and reconnect.
/// `read` must not block longer than the source's own read timeout.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Frame, SourceError>;

    fn reconnect(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Frame, SourceError> {
        (**self).read()
    }

    fn reconnect(&mut self) -> Result<(), SourceError> {
        (**self).reconnect()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
