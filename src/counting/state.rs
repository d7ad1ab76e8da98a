//! 计数状态 (Counter State)
//!
//! 计数只由推理阶段通过 [`SharedCounters::apply`] 修改, 历史表只由渲染阶段追加。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::evaluator::CycleOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub timestamp: DateTime<Local>,
    pub entry_count: u64,
    /// 当前计数框内人数
    pub stay_count: u32,
    pub exit_count: u64,
}

/// One row of the counter table: `date, time, entry, stay, exit, total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub date: String,
    pub time: String,
    pub entry: u64,
    pub stay: u32,
    pub exit: u64,
    pub total: u64,
}

impl CounterSnapshot {
    pub fn table_row(&self) -> TableRow {
        TableRow {
            date: self.timestamp.format("%Y-%m-%d").to_string(),
            time: self.timestamp.format("%H:%M:%S").to_string(),
            entry: self.entry_count,
            stay: self.stay_count,
            exit: self.exit_count,
            // 总数即累计进入人数
            total: self.entry_count,
        }
    }
}

impl std::fmt::Display for TableRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} | entry {:>5} | stay {:>3} | exit {:>5} | total {:>5}",
            self.date, self.time, self.entry, self.stay, self.exit, self.total
        )
    }
}

#[derive(Debug, Clone)]
pub struct CounterState {
    pub entry_count: u64,
    pub exit_count: u64,
    pub current_occupancy: u32,
    history: VecDeque<CounterSnapshot>,
    history_capacity: usize,
}

impl CounterState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            entry_count: 0,
            exit_count: 0,
            current_occupancy: 0,
            history: VecDeque::new(),
            history_capacity: history_capacity.max(1),
        }
    }

    fn snapshot_at(&self, timestamp: DateTime<Local>) -> CounterSnapshot {
        CounterSnapshot {
            timestamp,
            entry_count: self.entry_count,
            stay_count: self.current_occupancy,
            exit_count: self.exit_count,
        }
    }
}

/// Lock-protected counters shared between the stages.
#[derive(Debug)]
pub struct SharedCounters {
    state: Mutex<CounterState>,
}

impl SharedCounters {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(CounterState::new(history_capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 应用一个评估周期的结果 (计数只增不减, 占用人数直接覆盖)
    pub fn apply(&self, outcome: &CycleOutcome) {
        let mut state = self.lock();
        state.entry_count += outcome.entries;
        state.exit_count += outcome.exits;
        state.current_occupancy = outcome.occupancy;
    }

    pub fn current(&self) -> CounterSnapshot {
        self.lock().snapshot_at(Local::now())
    }

    /// Appends the current tallies to the rolling history and returns the row.
    pub fn record_snapshot(&self) -> CounterSnapshot {
        let mut state = self.lock();
        let snapshot = state.snapshot_at(Local::now());
        if state.history.len() >= state.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(snapshot);
        snapshot
    }

    pub fn history(&self) -> Vec<CounterSnapshot> {
        self.lock().history.iter().copied().collect()
    }

    /// 用户显式重置: 清零计数与历史
    pub fn reset(&self) {
        let mut state = self.lock();
        let capacity = state.history_capacity;
        *state = CounterState::new(capacity);
        tracing::info!("counters reset");
    }
}

impl Default for SharedCounters {
    fn default() -> Self {
        Self::new(3600)
    }
}
