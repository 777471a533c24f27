pub mod args;
pub mod context;
pub mod pooling;

pub use args::{
    num_arguments_per_1d_tensor, num_arguments_per_2d_tensor, num_arguments_per_3d_tensor,
    BufferHandle, KernelArgumentPack,
};
pub use context::{BuildOptions, GpuCommand, GpuRuntimeContext, NdRange, ProgramCompiler, ProgramHandle};
pub use pooling::GpuPoolingKernel;
