//! 轨迹回放: 按帧序号读取预先录制的跟踪结果 (JSON Lines)
//!
//! 每行一个对象: `{"frame": 12, "tracks": [{"id": 7, "bbox": {...}, "confirmed": true}]}`

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use serde::Deserialize;

use super::{Track, TrackProvider};
use crate::error::InferenceError;
use crate::input::Frame;

#[derive(Debug, Deserialize)]
struct ReplayLine {
    frame: u64,
    #[serde(default)]
    tracks: Vec<Track>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayProvider {
    frames: HashMap<u64, Vec<Track>>,
    /// 循环周期, 与循环的帧源配合使用
    period: Option<u64>,
}

impl ReplayProvider {
    pub fn new(frames: HashMap<u64, Vec<Track>>) -> Self {
        Self {
            frames,
            period: None,
        }
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, InferenceError> {
        let mut frames = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| InferenceError::backend(format!("replay read: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(&line).map_err(|e| {
                InferenceError::malformed(format!("replay line {}: {e}", idx + 1))
            })?;
            frames.insert(parsed.frame, parsed.tracks);
        }
        Ok(Self::new(frames))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            InferenceError::backend(format!("open replay {}: {e}", path.display()))
        })?;
        let provider = Self::from_reader(std::io::BufReader::new(file))?;
        tracing::info!(path = %path.display(), frames = provider.frames.len(), "loaded track replay");
        Ok(provider)
    }

    /// Wraps frame ids modulo `period` before lookup.
    pub fn looping(mut self, period: u64) -> Self {
        self.period = (period > 0).then_some(period);
        self
    }
}

impl TrackProvider for ReplayProvider {
    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<Track>, InferenceError> {
        let key = match self.period {
            Some(p) => frame.id % p,
            None => frame.id,
        };
        Ok(self.frames.get(&key).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    const SCRIPT: &str = r#"
{"frame": 0, "tracks": [{"id": 7, "bbox": {"x1": 0, "y1": 40, "x2": 20, "y2": 60}, "confirmed": true}]}
{"frame": 1, "tracks": [{"id": 7, "bbox": {"x1": 0, "y1": 80, "x2": 20, "y2": 100}, "confirmed": true, "class_id": 0}]}
"#;

    #[test]
    fn replays_by_frame_id() {
        let mut provider = ReplayProvider::from_reader(SCRIPT.as_bytes()).unwrap();
        let tracks = provider.detect_and_track(&Frame::blank(1, 8, 8)).unwrap();
        assert_eq!(tracks, vec![Track::new(7, BBox::new(0, 80, 20, 100), true, 0)]);
        assert!(provider
            .detect_and_track(&Frame::blank(5, 8, 8))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn looping_wraps_ids() {
        let mut provider = ReplayProvider::from_reader(SCRIPT.as_bytes())
            .unwrap()
            .looping(2);
        let tracks = provider.detect_and_track(&Frame::blank(4, 8, 8)).unwrap();
        assert_eq!(tracks[0].bbox.y1, 40);
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = ReplayProvider::from_reader("{\"frame\": 0}\nnot json\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
