//! 显示输出 (Display sinks)
//!
//! - LatestFrameSink: 内存中保存最新画面, 供界面轮询
//! - DirectorySink:   每N帧写一张PNG

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;

use crate::error::SinkError;

/// Presentation target of the render stage.
pub trait FrameSink: Send {
    fn present(&mut self, image: &RgbImage) -> Result<(), SinkError>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn present(&mut self, image: &RgbImage) -> Result<(), SinkError> {
        (**self).present(image)
    }
}

#[derive(Debug, Default)]
struct Latest {
    image: Option<RgbImage>,
    presented: u64,
}

/// 读端句柄
#[derive(Debug, Clone, Default)]
pub struct LatestFrame {
    inner: Arc<Mutex<Latest>>,
}

impl LatestFrame {
    pub fn get(&self) -> Option<RgbImage> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .image
            .clone()
    }

    pub fn presented(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .presented
    }
}

#[derive(Debug, Default)]
pub struct LatestFrameSink {
    shared: LatestFrame,
}

impl LatestFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> LatestFrame {
        self.shared.clone()
    }
}

impl FrameSink for LatestFrameSink {
    fn present(&mut self, image: &RgbImage) -> Result<(), SinkError> {
        let mut latest = self
            .shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        latest.image = Some(image.clone());
        latest.presented += 1;
        Ok(())
    }
}

pub struct DirectorySink {
    dir: PathBuf,
    every: u64,
    count: u64,
    written: u64,
}

impl DirectorySink {
    pub fn create<P: AsRef<Path>>(dir: P, every: u64) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        tracing::info!(dir = %dir.display(), every, "writing rendered frames");
        Ok(Self {
            dir,
            every: every.max(1),
            count: 0,
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for DirectorySink {
    fn present(&mut self, image: &RgbImage) -> Result<(), SinkError> {
        let seq = self.count;
        self.count += 1;
        if seq % self.every != 0 {
            return Ok(());
        }
        let path = self.dir.join(format!("frame_{seq:06}.png"));
        image.save(&path)?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn latest_sink_keeps_newest() {
        let mut sink = LatestFrameSink::new();
        let handle = sink.handle();
        assert!(handle.get().is_none());
        sink.present(&RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))).unwrap();
        sink.present(&RgbImage::from_pixel(2, 2, Rgb([4, 5, 6]))).unwrap();
        assert_eq!(handle.get().unwrap().get_pixel(0, 0), &Rgb([4, 5, 6]));
        assert_eq!(handle.presented(), 2);
    }

    #[test]
    fn directory_sink_writes_every_nth() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::create(dir.path().join("out"), 2).unwrap();
        let image = RgbImage::new(4, 4);
        for _ in 0..5 {
            sink.present(&image).unwrap();
        }
        assert_eq!(sink.written(), 3);
        assert!(dir.path().join("out/frame_000004.png").exists());
        assert!(!dir.path().join("out/frame_000001.png").exists());
    }
}
