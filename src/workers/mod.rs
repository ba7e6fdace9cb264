//! Worker 层：统一的模块/集成契约、注册表、派发与内置 worker

pub mod dispatch;
pub mod echo;
pub mod general;
pub mod identity;
pub mod registry;
pub mod result;

pub use dispatch::{DispatchMode, WorkerDispatcher};
pub use echo::EchoWorker;
pub use general::GeneralWorker;
pub use registry::{
    Capabilities, ChunkStream, Worker, WorkerError, WorkerFeatures, WorkerKind, WorkerRegistry,
    WorkerSummary,
};
pub use result::{ChunkKind, NestedQuery, StepResult, StepStatus, StreamChunk};
