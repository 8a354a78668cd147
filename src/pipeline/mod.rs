pub mod analyzer;
pub mod bridge;
pub mod pool;
pub mod result;

pub use analyzer::{Analyzer, CodeAnalyzer, Listener, SingleFlight, Submit};
pub use bridge::{Lifecycle, LifecycleState, MainHandle, MainThread, ResultBridge};
pub use pool::{FrameBufferPool, PoolStats, PooledBuffer};
pub use result::{AnalyzeResult, Outcome};
