/// 检测与跟踪 (Detection & Tracking)
///
/// 推理线程调用的外部能力: 帧 → 已确认轨迹
/// - Detector:        目标检测 (YOLOv8 ONNX, 可选)
/// - ByteTracker:     IOU + 卡尔曼多目标跟踪
/// - ReplayProvider:  从 JSON Lines 回放录制的轨迹
pub mod bytetrack;
pub mod kalman;
pub mod replay;
#[cfg(feature = "onnx")]
pub mod yolov8;

use serde::{Deserialize, Serialize};

use crate::error::InferenceError;
use crate::geometry::BBox;
use crate::input::Frame;

pub use bytetrack::{ByteTracker, TrackerConfig};
pub use replay::ReplayProvider;
#[cfg(feature = "onnx")]
pub use yolov8::YoloV8Detector;

/// COCO 人体类别
pub const PERSON_CLASS: u32 = 0;

pub type TrackId = u32;

/// 跟踪结果, 只在一个评估周期内有效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub bbox: BBox,
    pub confirmed: bool,
    #[serde(default)]
    pub class_id: u32,
}

impl Track {
    pub fn new(id: TrackId, bbox: BBox, confirmed: bool, class_id: u32) -> Self {
        Self {
            id,
            bbox,
            confirmed,
            class_id,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class_id == PERSON_CLASS
    }
}

/// Detector + tracker seam used by the inference stage.
///
/// May block. An empty list is a valid answer; only `confirmed` and id
/// stability are relied upon.
pub trait TrackProvider: Send {
    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<Track>, InferenceError>;

    fn name(&self) -> &str {
        "provider"
    }
}

impl<P: TrackProvider + ?Sized> TrackProvider for Box<P> {
    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<Track>, InferenceError> {
        (**self).detect_and_track(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// 检测框 (原始帧像素坐标)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union.
    pub fn iou(&self, other: &Detection) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// 非极大值抑制, 按置信度降序保留
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if kept.iter().all(|k| k.iou(&det) < iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, InferenceError>;
}

/// 检测器 + ByteTrack 组合成的轨迹提供者
///
/// 置信度低于 `confidence_threshold` 的检测在进入跟踪器之前丢弃, 因此低分框
/// 既不能新建轨迹, 也不能移动已确认的轨迹。
pub struct DetectorTracker<D> {
    detector: D,
    tracker: ByteTracker,
    confidence_threshold: f32,
}

impl<D: Detector> DetectorTracker<D> {
    pub fn new(detector: D, confidence_threshold: f32, config: TrackerConfig) -> Self {
        let config = TrackerConfig {
            low_score_threshold: config.low_score_threshold.max(confidence_threshold),
            ..config
        };
        Self {
            detector,
            tracker: ByteTracker::new(confidence_threshold, config),
            confidence_threshold,
        }
    }

    pub fn reset(&mut self) {
        self.tracker.reset();
    }
}

impl<D: Detector> TrackProvider for DetectorTracker<D> {
    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<Track>, InferenceError> {
        let detections: Vec<Detection> = self
            .detector
            .detect(frame)?
            .into_iter()
            .filter(|d| d.class_id == PERSON_CLASS && d.confidence >= self.confidence_threshold)
            .collect();
        Ok(self.tracker.update(&detections))
    }

    fn name(&self) -> &str {
        "detector+bytetrack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<Vec<Detection>>);

    impl Detector for Scripted {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
            if self.0.is_empty() {
                return Err(InferenceError::backend("script exhausted"));
            }
            Ok(self.0.remove(0))
        }
    }

    #[test]
    fn nms_keeps_best_of_overlapping() {
        let kept = non_max_suppression(
            vec![
                Detection::new(0.0, 0.0, 10.0, 10.0, 0.6, 0),
                Detection::new(1.0, 1.0, 11.0, 11.0, 0.9, 0),
                Detection::new(50.0, 50.0, 60.0, 60.0, 0.5, 0),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn low_confidence_detections_do_not_move_confirmed_tracks() {
        let strong = |y: f32| Detection::new(100.0, y, 140.0, y + 100.0, 0.9, PERSON_CLASS);
        let weak = Detection::new(100.0, 104.0, 140.0, 204.0, 0.12, PERSON_CLASS);
        let mut provider = DetectorTracker::new(
            Scripted(vec![vec![strong(100.0)], vec![strong(101.0)], vec![strong(102.0)], vec![weak]]),
            0.5,
            TrackerConfig::default(),
        );
        let frame = Frame::blank(0, 300, 300);
        let last = (0..3)
            .map(|_| provider.detect_and_track(&frame).unwrap())
            .last()
            .unwrap();
        assert!(last[0].confirmed);
        // 0.12 的框在跟踪前被丢弃, 轨迹本帧未匹配, 不上报
        assert!(provider.detect_and_track(&frame).unwrap().is_empty());
    }

    #[test]
    fn non_person_detections_never_become_tracks() {
        let car = Detection::new(0.0, 0.0, 50.0, 50.0, 0.95, 2);
        let person = Detection::new(100.0, 0.0, 150.0, 120.0, 0.95, PERSON_CLASS);
        let mut provider = DetectorTracker::new(
            Scripted(vec![vec![car, person]; 3]),
            0.5,
            TrackerConfig::default(),
        );
        let frame = Frame::blank(0, 200, 200);
        for _ in 0..3 {
            let tracks = provider.detect_and_track(&frame).unwrap();
            assert_eq!(tracks.len(), 1);
            assert!(tracks[0].is_person());
        }
        assert!(provider.detect_and_track(&frame).is_err());
    }
}
