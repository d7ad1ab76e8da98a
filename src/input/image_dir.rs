//! 图片目录帧源: 按文件名顺序逐帧读取, 可循环, 可按固定帧间隔节流

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{Frame, FrameSource};
use crate::error::SourceError;

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    next_id: u64,
    looping: bool,
    frame_interval: Option<Duration>,
    last_read: Option<Instant>,
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SourceError::Open {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}

impl ImageDirSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SourceError> {
        let dir = dir.as_ref().to_path_buf();
        let files = list_images(&dir)?;
        if files.is_empty() {
            return Err(SourceError::Open {
                path: dir,
                reason: "no image files".to_string(),
            });
        }
        tracing::info!(dir = %dir.display(), frames = files.len(), "image directory source opened");
        Ok(Self {
            dir,
            files,
            cursor: 0,
            next_id: 0,
            looping: false,
            frame_interval: None,
            last_read: None,
        })
    }

    /// 播放到末尾后从头开始
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Paces reads to at most `fps` frames per second.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.frame_interval = (fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps));
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_read) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_read = Some(Instant::now());
    }
}

impl FrameSource for ImageDirSource {
    fn read(&mut self) -> Result<Frame, SourceError> {
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Err(SourceError::EndOfStream);
            }
            self.cursor = 0;
        }
        self.pace();

        let path = &self.files[self.cursor];
        self.cursor += 1;
        let image = image::open(path)?.to_rgb8();
        let frame = Frame::new(self.next_id, image);
        self.next_id += 1;
        Ok(frame)
    }

    /// 重新扫描目录; 非循环模式下不会回到开头
    fn reconnect(&mut self) -> Result<(), SourceError> {
        let files = list_images(&self.dir)?;
        if files.len() != self.files.len() {
            tracing::info!(dir = %self.dir.display(), frames = files.len(), "image directory rescanned");
        }
        self.files = files;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("images:{}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frames(dir: &Path, n: u8) {
        for i in 0..n {
            RgbImage::from_pixel(4, 3, Rgb([i * 10, 0, 0]))
                .save(dir.join(format!("frame_{i:03}.png")))
                .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
    }

    #[test]
    fn reads_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3);
        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 3);
        let reds: Vec<u8> = (0..3).map(|_| source.read().unwrap().image.get_pixel(0, 0)[0]).collect();
        assert_eq!(reds, vec![0, 10, 20]);
        assert!(matches!(source.read(), Err(SourceError::EndOfStream)));
        source.reconnect().unwrap();
        assert!(matches!(source.read(), Err(SourceError::EndOfStream)));
    }

    #[test]
    fn looping_keeps_ids_increasing() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 2);
        let mut source = ImageDirSource::open(dir.path()).unwrap().looping(true);
        let ids: Vec<u64> = (0..5).map(|_| source.read().unwrap().id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageDirSource::open(dir.path()),
            Err(SourceError::Open { .. })
        ));
    }
}
