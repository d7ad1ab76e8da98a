//! 计数系统 (Counting)
//!
//! - memory:    轨迹记忆, 边沿触发
//! - evaluator: 穿越/占用评估
//! - state:     共享计数与快照历史
pub mod evaluator;
pub mod memory;
pub mod state;

pub use evaluator::{CrossingEvent, CycleOutcome, Evaluator};
pub use memory::TrackMemory;
pub use state::{CounterSnapshot, CounterState, SharedCounters, TableRow};
