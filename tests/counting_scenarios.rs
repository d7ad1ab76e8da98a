//! 计数场景: 回放轨迹 → 评估器 → 共享计数

use std::io::Cursor;

use zone_sentinel::counting::{Evaluator, SharedCounters};
use zone_sentinel::detection::{ReplayProvider, TrackProvider};
use zone_sentinel::input::Frame;
use zone_sentinel::zones::{BoxZone, CrossingDirection, LineKind, LineZone, ZoneStore};

fn replay_line(frame: u64, id: u32, cx: i32, cy: i32) -> String {
    format!(
        r#"{{"frame": {frame}, "tracks": [{{"id": {id}, "bbox": {{"x1": {}, "y1": {}, "x2": {}, "y2": {}}}, "confirmed": true}}]}}"#,
        cx - 10,
        cy - 10,
        cx + 10,
        cy + 10
    )
}

/// 逐帧驱动回放, 返回每帧之后的计数
fn drive(
    provider: &mut ReplayProvider,
    zones: &ZoneStore,
    frames: u64,
) -> Vec<(u64, u32, u64)> {
    let mut evaluator = Evaluator::new(150);
    let counters = SharedCounters::new(16);
    (0..frames)
        .map(|id| {
            let tracks = provider
                .detect_and_track(&Frame::blank(id, 640, 480))
                .unwrap();
            let outcome = evaluator.evaluate(&zones.snapshot(), &tracks);
            counters.apply(&outcome);
            let c = counters.current();
            (c.entry_count, c.stay_count, c.exit_count)
        })
        .collect()
}

#[test]
fn entry_crossing_then_loitering_counts_once() {
    let mut script = vec![replay_line(0, 7, 300, 50), replay_line(1, 7, 300, 90)];
    script.extend((2..10).map(|f| replay_line(f, 7, 300, 90)));
    let mut provider = ReplayProvider::from_reader(Cursor::new(script.join("\n"))).unwrap();

    let zones = ZoneStore::new();
    zones
        .set_line(
            LineKind::Entry,
            LineZone::horizontal(80, 0, 640, CrossingDirection::Down),
        )
        .unwrap();

    let counts = drive(&mut provider, &zones, 10);
    assert_eq!(counts[0].0, 0);
    assert_eq!(counts[1].0, 1);
    assert!(counts[2..].iter().all(|c| c.0 == 1));
}

#[test]
fn walking_back_out_counts_on_the_exit_line() {
    // 从上方进入, 再返回上方: 入口线计一次, 出口线 (方向 up) 计一次
    let script: Vec<_> = [50, 90, 90, 50, 50]
        .iter()
        .enumerate()
        .map(|(f, &y)| replay_line(f as u64, 4, 200, y))
        .collect();
    let mut provider = ReplayProvider::from_reader(Cursor::new(script.join("\n"))).unwrap();

    let zones = ZoneStore::new();
    zones
        .set_line(
            LineKind::Entry,
            LineZone::horizontal(80, 0, 640, CrossingDirection::Down),
        )
        .unwrap();
    zones
        .set_line(
            LineKind::Exit,
            LineZone::horizontal(70, 0, 640, CrossingDirection::Up),
        )
        .unwrap();

    let counts = drive(&mut provider, &zones, 5);
    assert_eq!(counts.last().map(|c| (c.0, c.2)), Some((1, 1)));
}

#[test]
fn occupancy_gauge_follows_the_box() {
    let script = [replay_line(0, 1, 200, 200), replay_line(1, 1, 600, 600)];
    let mut provider = ReplayProvider::from_reader(Cursor::new(script.join("\n"))).unwrap();

    let zones = ZoneStore::new();
    zones.set_box(BoxZone::new(100, 100, 500, 400)).unwrap();

    let counts = drive(&mut provider, &zones, 2);
    assert_eq!(counts[0].1, 1);
    assert_eq!(counts[1].1, 0);
}

#[test]
fn frames_without_tracks_keep_counts() {
    let script = [replay_line(0, 9, 100, 50), replay_line(3, 9, 100, 120)];
    let mut provider = ReplayProvider::from_reader(Cursor::new(script.join("\n"))).unwrap();

    let zones = ZoneStore::new();
    zones
        .set_line(
            LineKind::Entry,
            LineZone::horizontal(80, 0, 640, CrossingDirection::Down),
        )
        .unwrap();

    // 第1、2帧没有轨迹, 记忆保留, 第3帧仍计入
    let counts = drive(&mut provider, &zones, 5);
    assert_eq!(counts[2].0, 0);
    assert_eq!(counts[3].0, 1);
    assert_eq!(counts[4].0, 1);
}
