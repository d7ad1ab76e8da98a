//! 轨迹记忆: 记录每个ID相对各条线的最后一侧, 使穿越计数边沿触发

use std::collections::HashMap;

use crate::detection::TrackId;
use crate::geometry::Side;
use crate::zones::LineKind;

#[derive(Debug, Clone, Default)]
struct TrackRecord {
    entry_side: Option<Side>,
    exit_side: Option<Side>,
    in_box: bool,
    last_seen: u64,
}

impl TrackRecord {
    fn side_mut(&mut self, kind: LineKind) -> &mut Option<Side> {
        match kind {
            LineKind::Entry => &mut self.entry_side,
            LineKind::Exit => &mut self.exit_side,
        }
    }
}

/// Per-track crossing memory.
///
/// Records unseen for more than `ttl_cycles` evaluation cycles are dropped, so a
/// track that disappears and later reuses its id starts over.
#[derive(Debug, Clone)]
pub struct TrackMemory {
    records: HashMap<TrackId, TrackRecord>,
    ttl_cycles: u64,
    cycle: u64,
}

impl TrackMemory {
    pub fn new(ttl_cycles: u64) -> Self {
        Self {
            records: HashMap::new(),
            ttl_cycles: ttl_cycles.max(1),
            cycle: 0,
        }
    }

    /// 开始新一轮评估
    pub fn begin_cycle(&mut self) {
        self.cycle += 1;
    }

    /// Marks `id` as observed this cycle.
    pub fn touch(&mut self, id: TrackId) {
        let cycle = self.cycle;
        self.records.entry(id).or_default().last_seen = cycle;
    }

    /// Records the current side of `id` relative to a line.
    ///
    /// Returns the `(previous, current)` pair when the side changed from a known
    /// previous side. The first observation only initializes; `Side::On` leaves
    /// the memory untouched.
    pub fn transition(&mut self, id: TrackId, kind: LineKind, side: Side) -> Option<(Side, Side)> {
        if side == Side::On {
            return None;
        }
        let cycle = self.cycle;
        let record = self.records.entry(id).or_default();
        record.last_seen = cycle;
        let slot = record.side_mut(kind);
        match slot.replace(side) {
            Some(previous) if previous != side => Some((previous, side)),
            _ => None,
        }
    }

    /// 更新计数框成员关系, 返回之前的状态
    pub fn set_in_box(&mut self, id: TrackId, inside: bool) -> bool {
        let cycle = self.cycle;
        let record = self.records.entry(id).or_default();
        record.last_seen = cycle;
        std::mem::replace(&mut record.in_box, inside)
    }

    /// Forgets every recorded side for one line kind.
    pub fn reset_line(&mut self, kind: LineKind) {
        for record in self.records.values_mut() {
            *record.side_mut(kind) = None;
        }
    }

    pub fn reset_box(&mut self) {
        for record in self.records.values_mut() {
            record.in_box = false;
        }
    }

    /// 清理过期记录, 返回清理数量
    pub fn prune(&mut self) -> usize {
        let before = self.records.len();
        let (cycle, ttl) = (self.cycle, self.ttl_cycles);
        self.records
            .retain(|_, record| cycle.saturating_sub(record.last_seen) <= ttl);
        before - self.records.len()
    }

    pub fn last_side(&self, id: TrackId, kind: LineKind) -> Option<Side> {
        self.records.get(&id).and_then(|r| match kind {
            LineKind::Entry => r.entry_side,
            LineKind::Exit => r.exit_side,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for TrackMemory {
    fn default() -> Self {
        Self::new(150)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_initializes_only() {
        let mut memory = TrackMemory::new(10);
        memory.begin_cycle();
        assert_eq!(memory.transition(7, LineKind::Entry, Side::Negative), None);
        memory.begin_cycle();
        assert_eq!(
            memory.transition(7, LineKind::Entry, Side::Positive),
            Some((Side::Negative, Side::Positive))
        );
        memory.begin_cycle();
        assert_eq!(memory.transition(7, LineKind::Entry, Side::Positive), None);
    }

    #[test]
    fn on_line_keeps_previous_side() {
        let mut memory = TrackMemory::new(10);
        memory.begin_cycle();
        memory.transition(1, LineKind::Exit, Side::Negative);
        assert_eq!(memory.transition(1, LineKind::Exit, Side::On), None);
        assert_eq!(memory.last_side(1, LineKind::Exit), Some(Side::Negative));
        assert_eq!(
            memory.transition(1, LineKind::Exit, Side::Positive),
            Some((Side::Negative, Side::Positive))
        );
    }

    #[test]
    fn stale_records_are_pruned() {
        let mut memory = TrackMemory::new(2);
        memory.begin_cycle();
        memory.transition(1, LineKind::Entry, Side::Negative);
        memory.transition(2, LineKind::Entry, Side::Negative);
        for _ in 0..3 {
            memory.begin_cycle();
            memory.touch(2);
        }
        assert_eq!(memory.prune(), 1);
        assert_eq!(memory.last_side(1, LineKind::Entry), None);
        assert_eq!(memory.last_side(2, LineKind::Entry), Some(Side::Negative));
    }

    #[test]
    fn reset_line_is_per_kind() {
        let mut memory = TrackMemory::new(10);
        memory.begin_cycle();
        memory.transition(3, LineKind::Entry, Side::Negative);
        memory.transition(3, LineKind::Exit, Side::Positive);
        memory.reset_line(LineKind::Entry);
        assert_eq!(memory.last_side(3, LineKind::Entry), None);
        assert_eq!(memory.last_side(3, LineKind::Exit), Some(Side::Positive));
    }
}
