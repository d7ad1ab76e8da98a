//! 穿越与占用评估器 (Crossing & Occupancy Evaluator)
//!
//! 每个推理周期: 已确认的人体轨迹 → 中心点 → 线侧判定 → 边沿触发计数,
//! 计数框内人数作为实时量重新计算, 所有人体框进入马赛克集合。

use crate::detection::{Track, TrackId};
use crate::geometry::{BBox, Side};
use crate::zones::{BoxZone, LineKind, LineZone, ZoneSnapshot};

use super::memory::TrackMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingEvent {
    pub track_id: TrackId,
    pub kind: LineKind,
    pub from: Side,
    pub to: Side,
}

/// Result of one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub entries: u64,
    pub exits: u64,
    /// 计数框内的已确认人数, 无计数框时为0
    pub occupancy: u32,
    /// Boxes of every confirmed person, for the mosaic.
    pub redact: Vec<BBox>,
    pub events: Vec<CrossingEvent>,
    /// Tracks that fired both entry and exit in this cycle.
    pub anomalies: Vec<TrackId>,
}

/// Stateful evaluator. Owns the [`TrackMemory`] and is driven only by the
/// inference stage.
#[derive(Debug)]
pub struct Evaluator {
    memory: TrackMemory,
    entry_line: Option<LineZone>,
    exit_line: Option<LineZone>,
    occupancy_box: Option<BoxZone>,
}

impl Evaluator {
    pub fn new(memory_ttl_cycles: u64) -> Self {
        Self {
            memory: TrackMemory::new(memory_ttl_cycles),
            entry_line: None,
            exit_line: None,
            occupancy_box: None,
        }
    }

    pub fn memory(&self) -> &TrackMemory {
        &self.memory
    }

    /// 区域变化时清空对应记忆, 新线从首次观测重新初始化
    fn sync_zones(&mut self, zones: &ZoneSnapshot) {
        if self.entry_line != zones.entry_line {
            self.memory.reset_line(LineKind::Entry);
            self.entry_line = zones.entry_line;
        }
        if self.exit_line != zones.exit_line {
            self.memory.reset_line(LineKind::Exit);
            self.exit_line = zones.exit_line;
        }
        if self.occupancy_box != zones.occupancy_box {
            self.memory.reset_box();
            self.occupancy_box = zones.occupancy_box;
        }
    }

    pub fn evaluate(&mut self, zones: &ZoneSnapshot, tracks: &[Track]) -> CycleOutcome {
        self.sync_zones(zones);
        self.memory.begin_cycle();

        let lines: Vec<(LineKind, LineZone)> = [LineKind::Entry, LineKind::Exit]
            .into_iter()
            .filter_map(|kind| {
                let line = *zones.line(kind)?;
                match line.validate() {
                    Ok(()) => Some((kind, line)),
                    Err(err) => {
                        tracing::warn!(kind = kind.as_str(), error = %err, "skipping malformed line zone");
                        None
                    }
                }
            })
            .collect();
        let occupancy_box = zones.occupancy_box.filter(|b| match b.validate() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed occupancy box");
                false
            }
        });

        let mut outcome = CycleOutcome::default();

        for track in tracks.iter().filter(|t| t.confirmed && t.is_person()) {
            let center = track.bbox.center();
            self.memory.touch(track.id);
            outcome.redact.push(track.bbox);

            let mut fired = [false; 2];
            for &(kind, line) in &lines {
                let side = line.side(center);
                let Some((from, to)) = self.memory.transition(track.id, kind, side) else {
                    continue;
                };
                if !line.direction.counts(from, to) {
                    continue;
                }
                match kind {
                    LineKind::Entry => {
                        outcome.entries += 1;
                        fired[0] = true;
                    }
                    LineKind::Exit => {
                        outcome.exits += 1;
                        fired[1] = true;
                    }
                }
                tracing::info!(track_id = track.id, kind = kind.as_str(), ?center, "line crossed");
                outcome.events.push(CrossingEvent {
                    track_id: track.id,
                    kind,
                    from,
                    to,
                });
            }
            if fired[0] && fired[1] {
                tracing::warn!(track_id = track.id, ?center, "track crossed entry and exit lines in one cycle");
                outcome.anomalies.push(track.id);
            }

            if let Some(zone) = occupancy_box {
                let inside = zone.contains(center);
                let was_inside = self.memory.set_in_box(track.id, inside);
                if inside {
                    outcome.occupancy += 1;
                }
                if inside != was_inside {
                    tracing::debug!(track_id = track.id, inside, "occupancy membership changed");
                }
            }
        }

        let pruned = self.memory.prune();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = self.memory.len(), "pruned stale track memory");
        }
        outcome
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(150)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::PERSON_CLASS;
    use crate::geometry::Point;
    use crate::zones::CrossingDirection;

    fn person_at(id: TrackId, cx: i32, cy: i32) -> Track {
        Track::new(id, BBox::new(cx - 10, cy - 10, cx + 10, cy + 10), true, PERSON_CLASS)
    }

    fn entry_zone(direction: CrossingDirection) -> ZoneSnapshot {
        ZoneSnapshot {
            entry_line: Some(LineZone::horizontal(80, 0, 600, direction)),
            ..Default::default()
        }
    }

    #[test]
    fn downward_crossing_counts_once() {
        let zones = entry_zone(CrossingDirection::Down);
        let mut evaluator = Evaluator::default();
        assert_eq!(evaluator.evaluate(&zones, &[person_at(7, 100, 50)]).entries, 0);
        assert_eq!(evaluator.evaluate(&zones, &[person_at(7, 100, 90)]).entries, 1);
        for _ in 3..=10 {
            assert_eq!(evaluator.evaluate(&zones, &[person_at(7, 100, 90)]).entries, 0);
        }
    }

    #[test]
    fn wrong_direction_is_not_counted() {
        let zones = entry_zone(CrossingDirection::Up);
        let mut evaluator = Evaluator::default();
        evaluator.evaluate(&zones, &[person_at(1, 100, 50)]);
        assert_eq!(evaluator.evaluate(&zones, &[person_at(1, 100, 90)]).entries, 0);
        assert_eq!(evaluator.evaluate(&zones, &[person_at(1, 100, 50)]).entries, 1);
    }

    #[test]
    fn passing_through_the_line_counts_once() {
        let zones = entry_zone(CrossingDirection::Down);
        let mut evaluator = Evaluator::default();
        let total: u64 = [60, 80, 80, 100]
            .iter()
            .map(|&y| evaluator.evaluate(&zones, &[person_at(2, 0, y)]).entries)
            .sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn slanted_lines_count_the_same_way_around_45_degrees() {
        // 斜率略小于/等于/略大于 1 的三条线, 同一条路径的计数一致
        for end in [Point::new(101, 100), Point::new(100, 100), Point::new(100, 101)] {
            let zones = ZoneSnapshot {
                entry_line: Some(LineZone::new(Point::new(0, 0), end, CrossingDirection::Down)),
                exit_line: Some(LineZone::new(end, Point::new(0, 0), CrossingDirection::Up)),
                ..Default::default()
            };
            let mut evaluator = Evaluator::default();
            evaluator.evaluate(&zones, &[person_at(6, 50, 0)]);
            let down = evaluator.evaluate(&zones, &[person_at(6, 0, 50)]);
            assert_eq!((down.entries, down.exits), (1, 0), "line to {end:?}");
            let up = evaluator.evaluate(&zones, &[person_at(6, 50, 0)]);
            assert_eq!((up.entries, up.exits), (0, 1), "line to {end:?}");
        }
    }

    #[test]
    fn unconfirmed_and_non_person_tracks_are_ignored() {
        let zones = entry_zone(CrossingDirection::Down);
        let mut evaluator = Evaluator::default();
        let tentative = |y| Track::new(4, BBox::new(0, y - 5, 10, y + 5), false, PERSON_CLASS);
        let car = |y| Track::new(5, BBox::new(0, y - 5, 10, y + 5), true, 2);
        evaluator.evaluate(&zones, &[tentative(50), car(50)]);
        let outcome = evaluator.evaluate(&zones, &[tentative(90), car(90)]);
        assert_eq!(outcome.entries, 0);
        assert!(outcome.redact.is_empty());
    }

    #[test]
    fn occupancy_is_a_gauge() {
        let zones = ZoneSnapshot {
            occupancy_box: Some(BoxZone::new(100, 100, 500, 400)),
            ..Default::default()
        };
        let mut evaluator = Evaluator::default();
        assert_eq!(evaluator.evaluate(&zones, &[person_at(1, 200, 200)]).occupancy, 1);
        assert_eq!(evaluator.evaluate(&zones, &[person_at(1, 600, 600)]).occupancy, 0);
        let both = [person_at(1, 200, 200), person_at(2, 500, 400)];
        assert_eq!(evaluator.evaluate(&zones, &both).occupancy, 2);
    }

    #[test]
    fn simultaneous_entry_and_exit_is_flagged() {
        let line = LineZone::horizontal(80, 0, 600, CrossingDirection::Down);
        let zones = ZoneSnapshot {
            entry_line: Some(line),
            exit_line: Some(line),
            ..Default::default()
        };
        let mut evaluator = Evaluator::default();
        evaluator.evaluate(&zones, &[person_at(9, 10, 50)]);
        let outcome = evaluator.evaluate(&zones, &[person_at(9, 10, 90)]);
        assert_eq!((outcome.entries, outcome.exits), (1, 1));
        assert_eq!(outcome.anomalies, vec![9]);
    }

    #[test]
    fn moving_a_line_reinitializes_memory() {
        let mut evaluator = Evaluator::default();
        let first = entry_zone(CrossingDirection::Down);
        evaluator.evaluate(&first, &[person_at(3, 0, 50)]);

        // 新线在 y=40, 轨迹已在其下方: 首次观测不计数
        let moved = ZoneSnapshot {
            entry_line: Some(LineZone::horizontal(40, 0, 600, CrossingDirection::Down)),
            ..Default::default()
        };
        assert_eq!(evaluator.evaluate(&moved, &[person_at(3, 0, 50)]).entries, 0);
        assert_eq!(
            evaluator.memory().last_side(3, LineKind::Entry),
            Some(Side::Positive)
        );
    }

    #[test]
    fn every_confirmed_person_is_redacted_without_zones() {
        let mut evaluator = Evaluator::default();
        let outcome = evaluator.evaluate(
            &ZoneSnapshot::default(),
            &[person_at(1, 50, 50), person_at(2, 150, 150)],
        );
        assert_eq!(outcome.redact.len(), 2);
        assert_eq!(outcome.occupancy, 0);
        assert!(outcome.events.is_empty());
    }
}
