pub mod alloc;
pub mod cpu;
pub mod error;
pub mod gpu;
pub mod pooling;
pub mod scheduler;
pub mod tensor;
pub mod window;

pub use cpu::CpuInfo;
pub use error::{Result, SlidelyError};
pub use pooling::operator::{pool2d, PoolInfo, PoolingOperator};
pub use pooling::{OutputStage, PoolType, PoolingArgs, Requantize32};

/// Channel-count granularity used when partitioning global-pooling work
/// across threads.
pub const CHANNEL_BLOCK: usize = 16;
