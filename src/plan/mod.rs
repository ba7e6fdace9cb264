//! 规划与执行：计划类型、规划 prompt、Planner、Executor 与进度事件

pub mod events;
pub mod executor;
pub mod planner;
pub mod prompt;
pub mod types;

pub use events::{emit, ProgressEvent, ProgressSink};
pub use executor::{Executor, NestedQueryHandler};
pub use planner::{ensure_invocations, parse_plan, Planner};
pub use types::{AggregatedResult, ExecutionReport, Invocation, Plan};
