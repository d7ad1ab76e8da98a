//! ByteTrack 多目标跟踪
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先与所有轨迹做IOU匹配
//! 3. 低分框救援未匹配的轨迹
//! 4. 连续命中 `n_init` 帧后确认, 连续丢失超过 `max_age` 帧后删除

use serde::{Deserialize, Serialize};

use super::kalman::KalmanBoxFilter;
use super::{Detection, Track, TrackId};

/// 跟踪器参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// 确认所需命中次数
    pub n_init: u32,
    /// 最大允许丢失帧数
    pub max_age: u32,
    /// 低分检测阈值 (救援用); 经 `DetectorTracker` 使用时不低于置信度阈值
    pub low_score_threshold: f32,
    pub high_iou_threshold: f32,
    pub low_iou_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            n_init: 3,
            max_age: 30,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.4,
            low_iou_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedPerson {
    id: TrackId,
    detection: Detection,
    kalman: KalmanBoxFilter,
    hits: u32,
    frames_lost: u32,
    confirmed: bool,
}

impl TrackedPerson {
    fn new(id: TrackId, detection: Detection, n_init: u32) -> Self {
        // 降低观测噪声, 更信任检测结果
        let kalman = KalmanBoxFilter::new(&detection, 0.1, 0.5);
        Self {
            id,
            detection,
            kalman,
            hits: 1,
            frames_lost: 0,
            confirmed: n_init <= 1,
        }
    }

    fn update(&mut self, detection: Detection, n_init: u32) {
        self.kalman.update(&detection);
        self.detection = detection;
        self.hits += 1;
        self.frames_lost = 0;
        if self.hits >= n_init {
            self.confirmed = true;
        }
    }

    fn mark_lost(&mut self) {
        self.frames_lost += 1;
    }

    fn predicted(&self) -> Detection {
        self.kalman.predicted_box(&self.detection)
    }

    fn to_track(&self) -> Track {
        let b = self.kalman.state_box(&self.detection);
        Track::new(
            self.id,
            crate::geometry::BBox::from_f32(b.x1, b.y1, b.x2, b.y2),
            self.confirmed,
            self.detection.class_id,
        )
    }
}

pub struct ByteTracker {
    tracks: Vec<TrackedPerson>,
    next_id: TrackId,
    high_score_threshold: f32,
    config: TrackerConfig,
}

impl ByteTracker {
    /// `high_score_threshold` 之上的检测可以新建轨迹
    pub fn new(high_score_threshold: f32, config: TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            high_score_threshold,
            config,
        }
    }

    /// Runs one tracking step and returns the tracks matched in this frame.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        for track in &mut self.tracks {
            track.kalman.predict();
        }

        let mut high = Vec::new();
        let mut low = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.confidence >= self.high_score_threshold {
                high.push(idx);
            } else if det.confidence >= self.config.low_score_threshold {
                low.push(idx);
            }
        }

        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracks.len()];

        // 第一轮: 高分检测 + 所有轨迹
        let all: Vec<usize> = (0..self.tracks.len()).collect();
        let first = self.associate(detections, &high, &all, self.config.high_iou_threshold);
        for &(d, t) in &first {
            matched_det[d] = true;
            matched_track[t] = true;
        }

        // 第二轮: 低分检测 + 未匹配轨迹 (救援)
        let remaining: Vec<usize> = all.iter().copied().filter(|&t| !matched_track[t]).collect();
        let second = self.associate(detections, &low, &remaining, self.config.low_iou_threshold);
        for &(d, t) in &second {
            matched_det[d] = true;
            matched_track[t] = true;
        }

        let n_init = self.config.n_init;
        for (d, t) in first.into_iter().chain(second) {
            self.tracks[t].update(detections[d], n_init);
        }
        for (t, matched) in matched_track.iter().enumerate() {
            if !matched {
                self.tracks[t].mark_lost();
            }
        }

        // 未匹配的高分检测 → 新轨迹
        for &d in &high {
            if !matched_det[d] {
                self.tracks.push(TrackedPerson::new(self.next_id, detections[d], n_init));
                self.next_id += 1;
            }
        }

        let max_age = self.config.max_age;
        self.tracks.retain(|t| t.frames_lost <= max_age);

        self.tracks
            .iter()
            .filter(|t| t.frames_lost == 0)
            .map(TrackedPerson::to_track)
            .collect()
    }

    /// 贪心IOU匹配, 返回 (检测下标, 轨迹下标)
    fn associate(
        &self,
        detections: &[Detection],
        det_indices: &[usize],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        let mut candidates = Vec::new();
        for &d in det_indices {
            for &t in track_indices {
                let iou = detections[d].iou(&self.tracks[t].predicted());
                if iou >= iou_threshold {
                    candidates.push((iou, d, t));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut used_det = vec![false; detections.len()];
        let mut used_track = vec![false; self.tracks.len()];
        let mut assignments = Vec::new();
        for (_, d, t) in candidates {
            if !used_det[d] && !used_track[t] {
                used_det[d] = true;
                used_track[t] = true;
                assignments.push((d, t));
            }
        }
        assignments
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(x: f32, conf: f32) -> Detection {
        Detection::new(x, 100.0, x + 40.0, 200.0, conf, 0)
    }

    #[test]
    fn confirms_after_n_init_hits() {
        let mut tracker = ByteTracker::new(0.5, TrackerConfig::default());
        let flags: Vec<bool> = (0..4)
            .map(|i| tracker.update(&[person(100.0 + i as f32 * 2.0, 0.9)])[0].confirmed)
            .collect();
        assert_eq!(flags, vec![false, false, true, true]);
    }

    #[test]
    fn ids_are_stable_and_distinct() {
        let mut tracker = ByteTracker::new(0.5, TrackerConfig::default());
        let first = tracker.update(&[person(0.0, 0.9), person(300.0, 0.9)]);
        let second = tracker.update(&[person(302.0, 0.9), person(3.0, 0.9)]);
        let id_near = |tracks: &[Track], x: i32| {
            tracks
                .iter()
                .find(|t| (t.bbox.x1 - x).abs() < 10)
                .map(|t| t.id)
        };
        assert_eq!(id_near(&first, 0), id_near(&second, 3));
        assert_eq!(id_near(&first, 300), id_near(&second, 302));
        assert_ne!(id_near(&second, 3), id_near(&second, 302));
    }

    #[test]
    fn low_score_detection_rescues_track() {
        let mut tracker = ByteTracker::new(0.5, TrackerConfig::default());
        let id = tracker.update(&[person(50.0, 0.9)])[0].id;
        let rescued = tracker.update(&[person(51.0, 0.2)]);
        assert_eq!(rescued.len(), 1);
        assert_eq!(rescued[0].id, id);
        // 低分检测不会新建轨迹
        assert!(tracker.update(&[person(400.0, 0.2)]).is_empty());
    }

    #[test]
    fn lost_tracks_expire_after_max_age() {
        let config = TrackerConfig {
            max_age: 2,
            ..Default::default()
        };
        let mut tracker = ByteTracker::new(0.5, config);
        tracker.update(&[person(10.0, 0.9)]);
        for _ in 0..2 {
            assert!(tracker.update(&[]).is_empty());
            assert_eq!(tracker.track_count(), 1);
        }
        tracker.update(&[]);
        assert_eq!(tracker.track_count(), 0);
    }
}
