//! 区域存储 (Zone Store)
//!
//! 用户绘制的进入线/离开线/计数框。单区域策略: 每类最多一个, 新设置替换旧值。
//! 所有修改都经由 [`ZoneStore`], 每次修改递增 `revision`, 渲染端据此重绘叠加层。

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::ZoneValidationError;
use crate::geometry::{side_of_line, Point, Side};

/// 计数方向
///
/// `Down` counts a move from the negative to the positive side of the line
/// (to the lower side of any non-vertical line, rightward across an exactly
/// vertical one); `Up` counts the opposite move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossingDirection {
    #[default]
    #[serde(alias = "right")]
    Down,
    #[serde(alias = "left")]
    Up,
}

impl CrossingDirection {
    /// Whether moving from `from` to `to` is a crossing in this direction.
    pub fn counts(&self, from: Side, to: Side) -> bool {
        match self {
            CrossingDirection::Down => from == Side::Negative && to == Side::Positive,
            CrossingDirection::Up => from == Side::Positive && to == Side::Negative,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Entry,
    Exit,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Entry => "entry",
            LineKind::Exit => "exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineZone {
    pub start: Point,
    pub end: Point,
    #[serde(default)]
    pub direction: CrossingDirection,
}

impl LineZone {
    pub fn new(start: Point, end: Point, direction: CrossingDirection) -> Self {
        Self {
            start,
            end,
            direction,
        }
    }

    /// Horizontal line at `y` spanning `[x1, x2]`.
    pub fn horizontal(y: i32, x1: i32, x2: i32, direction: CrossingDirection) -> Self {
        Self::new(Point::new(x1, y), Point::new(x2, y), direction)
    }

    pub fn validate(&self) -> Result<(), ZoneValidationError> {
        if self.start == self.end {
            return Err(ZoneValidationError::ZeroLengthLine {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn side(&self, p: Point) -> Side {
        side_of_line(self.start, self.end, p)
    }
}

/// 计数框, 包含边界
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxZone {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoxZone {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }.normalized()
    }

    /// Box spanned by two drag corners in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    pub fn normalized(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    pub fn validate(&self) -> Result<(), ZoneValidationError> {
        if self.x1 == self.x2 || self.y1 == self.y2 {
            return Err(ZoneValidationError::ZeroAreaBox {
                x1: self.x1,
                y1: self.y1,
                x2: self.x2,
                y2: self.y2,
            });
        }
        Ok(())
    }

    pub fn contains(&self, p: Point) -> bool {
        let b = self.normalized();
        b.x1 <= p.x && p.x <= b.x2 && b.y1 <= p.y && p.y <= b.y2
    }
}

/// 区域判别联合体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Zone {
    Line(LineZone),
    Box(BoxZone),
}

impl Zone {
    pub fn validate(&self) -> Result<(), ZoneValidationError> {
        match self {
            Zone::Line(line) => line.validate(),
            Zone::Box(zone) => zone.validate(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearTarget {
    Entry,
    Exit,
    Box,
    All,
}

/// 某一时刻的区域配置 (按值拷贝, 评估周期内只读)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub entry_line: Option<LineZone>,
    pub exit_line: Option<LineZone>,
    pub occupancy_box: Option<BoxZone>,
    #[serde(skip)]
    pub revision: u64,
}

impl ZoneSnapshot {
    pub fn line(&self, kind: LineKind) -> Option<&LineZone> {
        match kind {
            LineKind::Entry => self.entry_line.as_ref(),
            LineKind::Exit => self.exit_line.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entry_line.is_none() && self.exit_line.is_none() && self.occupancy_box.is_none()
    }
}

/// 区域存储: 唯一的修改入口
#[derive(Debug, Default)]
pub struct ZoneStore {
    state: Mutex<ZoneSnapshot>,
}

impl ZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-populated from a snapshot, validating every zone.
    pub fn with_zones(zones: &ZoneSnapshot) -> Result<Self, ZoneValidationError> {
        let store = Self::new();
        if let Some(line) = zones.entry_line {
            store.set_line(LineKind::Entry, line)?;
        }
        if let Some(line) = zones.exit_line {
            store.set_line(LineKind::Exit, line)?;
        }
        if let Some(zone) = zones.occupancy_box {
            store.set_box(zone)?;
        }
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, ZoneSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 设置进入/离开线, 替换已有的同类线
    pub fn set_line(&self, kind: LineKind, line: LineZone) -> Result<(), ZoneValidationError> {
        line.validate()?;
        let mut state = self.lock();
        match kind {
            LineKind::Entry => state.entry_line = Some(line),
            LineKind::Exit => state.exit_line = Some(line),
        }
        state.revision += 1;
        tracing::info!(kind = kind.as_str(), ?line, "line zone set");
        Ok(())
    }

    /// 设置计数框, 替换已有的计数框
    pub fn set_box(&self, zone: BoxZone) -> Result<(), ZoneValidationError> {
        let zone = zone.normalized();
        zone.validate()?;
        let mut state = self.lock();
        state.occupancy_box = Some(zone);
        state.revision += 1;
        tracing::info!(?zone, "occupancy box set");
        Ok(())
    }

    /// Stores any zone kind; lines need to say whether they are entry or exit.
    pub fn set(&self, kind: LineKind, zone: Zone) -> Result<(), ZoneValidationError> {
        match zone {
            Zone::Line(line) => self.set_line(kind, line),
            Zone::Box(b) => self.set_box(b),
        }
    }

    pub fn clear(&self, target: ClearTarget) {
        let mut state = self.lock();
        let changed = match target {
            ClearTarget::Entry => state.entry_line.take().is_some(),
            ClearTarget::Exit => state.exit_line.take().is_some(),
            ClearTarget::Box => state.occupancy_box.take().is_some(),
            ClearTarget::All => {
                let had_any = !state.is_empty();
                state.entry_line = None;
                state.exit_line = None;
                state.occupancy_box = None;
                had_any
            }
        };
        if changed {
            state.revision += 1;
            tracing::info!(?target, "zones cleared");
        }
    }

    pub fn snapshot(&self) -> ZoneSnapshot {
        self.lock().clone()
    }

    /// 每次修改递增, 用作幂等重绘触发器
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_geometry_is_declined() {
        let store = ZoneStore::new();
        let p = Point::new(10, 10);
        let err = store
            .set_line(LineKind::Entry, LineZone::new(p, p, CrossingDirection::Down))
            .unwrap_err();
        assert!(matches!(err, ZoneValidationError::ZeroLengthLine { .. }));

        let err = store.set_box(BoxZone::new(5, 5, 5, 100)).unwrap_err();
        assert!(matches!(err, ZoneValidationError::ZeroAreaBox { .. }));

        assert!(store.snapshot().is_empty());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn setting_replaces_previous_zone() {
        let store = ZoneStore::new();
        store
            .set_line(LineKind::Entry, LineZone::horizontal(80, 0, 600, CrossingDirection::Down))
            .unwrap();
        store
            .set_line(LineKind::Entry, LineZone::horizontal(120, 0, 600, CrossingDirection::Up))
            .unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.entry_line.unwrap().start.y, 120);
        assert!(snap.exit_line.is_none());
        assert_eq!(snap.revision, 2);
    }

    #[test]
    fn box_corners_are_normalized() {
        let store = ZoneStore::new();
        store
            .set_box(BoxZone::from_corners(Point::new(500, 400), Point::new(100, 100)))
            .unwrap();
        assert_eq!(store.snapshot().occupancy_box, Some(BoxZone::new(100, 100, 500, 400)));
        assert!(BoxZone::new(100, 100, 500, 400).contains(Point::new(100, 400)));
        assert!(!BoxZone::new(100, 100, 500, 400).contains(Point::new(501, 200)));
    }

    #[test]
    fn clear_targets() {
        let store = ZoneStore::new();
        store
            .set_line(LineKind::Exit, LineZone::horizontal(300, 0, 600, CrossingDirection::Down))
            .unwrap();
        store.set_box(BoxZone::new(0, 0, 10, 10)).unwrap();
        let before = store.revision();

        store.clear(ClearTarget::Entry);
        assert_eq!(store.revision(), before, "clearing nothing is not a change");

        store.clear(ClearTarget::Exit);
        assert!(store.snapshot().exit_line.is_none());
        assert!(store.snapshot().occupancy_box.is_some());

        store.clear(ClearTarget::All);
        assert!(store.snapshot().is_empty());
        assert_eq!(store.revision(), before + 2);
    }

    #[test]
    fn zone_json_shape() {
        let zone: Zone = serde_json::from_str(
            r#"{"type":"line","start":{"x":0,"y":80},"end":{"x":600,"y":80},"direction":"up"}"#,
        )
        .unwrap();
        assert_eq!(
            zone,
            Zone::Line(LineZone::horizontal(80, 0, 600, CrossingDirection::Up))
        );
        let line: LineZone =
            serde_json::from_str(r#"{"start":{"x":0,"y":1},"end":{"x":5,"y":1}}"#).unwrap();
        assert_eq!(line.direction, CrossingDirection::Down);
    }
}
