//! GPU argument-binding protocol: slot accounting across many tensors and
//! the full configure/run flow against a recording compile service.

use slidely::gpu::{
    num_arguments_per_1d_tensor, num_arguments_per_2d_tensor, num_arguments_per_3d_tensor,
    BufferHandle, BuildOptions, GpuCommand, GpuPoolingKernel, GpuRuntimeContext,
    KernelArgumentPack, ProgramCompiler, ProgramHandle,
};
use slidely::pooling::operator::PoolInfo;
use slidely::pooling::PoolType;
use slidely::tensor::{DataType, TensorDescriptor, TensorShape};
use slidely::window::{calculate_max_window, BorderSize, Steps};

use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingCompiler {
    requests: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    next: u64,
}

impl ProgramCompiler for RecordingCompiler {
    fn compile(&mut self, kernel_name: &str, build_options: &BuildOptions) -> ProgramHandle {
        self.requests.lock().unwrap().push((
            kernel_name.to_string(),
            build_options.iter().map(String::from).collect(),
        ));
        self.next += 1;
        ProgramHandle(self.next)
    }
}

#[test]
fn test_argument_index_never_drifts() {
    let desc = TensorDescriptor::new(TensorShape::new(&[16, 8, 4]), DataType::F32);
    let window =
        calculate_max_window(desc.shape(), &Steps::default(), false, BorderSize::default());

    let mut pack = KernelArgumentPack::new();
    let mut expected = 0;
    for i in 0..4u64 {
        pack.add_3d_tensor_argument(&desc, BufferHandle(i), i as u32, &window);
        expected += num_arguments_per_3d_tensor();
        assert_eq!(pack.current_index(), expected);

        pack.add_1d_tensor_argument(&desc, BufferHandle(100 + i), 10 + i as u32, &window);
        expected += num_arguments_per_1d_tensor();
        assert_eq!(pack.current_index(), expected);

        pack.add_2d_tensor_argument(&desc, BufferHandle(200 + i), 20 + i as u32, &window);
        expected += num_arguments_per_2d_tensor();
        assert_eq!(pack.current_index(), expected);
    }

    // Scalars after the tensors land contiguously
    pack.add_scalar_argument(7);
    pack.add_scalar_argument(8);
    assert_eq!(pack.current_index(), expected + 2);
    assert_eq!(pack.words()[expected], 7);
    assert_eq!(pack.words()[expected + 1], 8);
}

#[test]
fn test_configure_compiles_once_and_run_binds_both_tensors() {
    let compiler = RecordingCompiler::default();
    let requests = Arc::clone(&compiler.requests);
    let mut ctx = GpuRuntimeContext::new(Box::new(compiler));

    let mut src = TensorDescriptor::new(TensorShape::new(&[12, 12, 4]), DataType::F32);
    let mut dst = TensorDescriptor::new(TensorShape::new(&[6, 6, 4]), DataType::F32);
    let info = PoolInfo::new(PoolType::Average, (2, 2), (2, 2));

    let kernel = GpuPoolingKernel::configure(&mut ctx, &mut src, &mut dst, &info).unwrap();
    assert_eq!(kernel.kernel_name(), "pooling_layer_2");

    // A second configure with identical options hits the cache
    let mut src2 = TensorDescriptor::new(TensorShape::new(&[12, 12, 4]), DataType::F32);
    let mut dst2 = TensorDescriptor::new(TensorShape::new(&[6, 6, 4]), DataType::F32);
    let _ = GpuPoolingKernel::configure(&mut ctx, &mut src2, &mut dst2, &info).unwrap();

    {
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "pooling_layer_2");
        assert!(requests[0]
            .1
            .iter()
            .any(|opt| opt == "#define POOL_AVG"));
    }

    kernel.run(&mut ctx, (&src, BufferHandle(1)), (&dst, BufferHandle(2)));

    let commands = ctx.commands();
    assert_eq!(commands.len(), 1);
    let GpuCommand::Dispatch { arguments, ndrange, .. } = &commands[0] else {
        panic!("expected a dispatch");
    };
    assert_eq!(ndrange.global, [6, 6, 4]);
    assert_eq!(
        arguments.current_index(),
        2 * num_arguments_per_3d_tensor()
    );
    assert_eq!(
        arguments.bindings(),
        &[(0, BufferHandle(1)), (1, BufferHandle(2))]
    );
}

#[test]
fn test_dependent_dispatches_are_ordered_by_explicit_barriers() {
    let mut ctx = GpuRuntimeContext::new(Box::new(RecordingCompiler::default()));

    let mut src = TensorDescriptor::new(TensorShape::new(&[8, 8, 1]), DataType::F32);
    let mut mid = TensorDescriptor::new(TensorShape::new(&[4, 4, 1]), DataType::F32);
    let info = PoolInfo::new(PoolType::Max, (2, 2), (2, 2));
    let first = GpuPoolingKernel::configure(&mut ctx, &mut src, &mut mid, &info).unwrap();

    let mut mid_src = mid.clone();
    let mut dst = TensorDescriptor::new(TensorShape::new(&[2, 2, 1]), DataType::F32);
    let second = GpuPoolingKernel::configure(&mut ctx, &mut mid_src, &mut dst, &info).unwrap();

    first.run(&mut ctx, (&src, BufferHandle(0)), (&mid, BufferHandle(1)));
    ctx.memory_barrier();
    second.run(&mut ctx, (&mid_src, BufferHandle(1)), (&dst, BufferHandle(2)));

    let kinds: Vec<bool> = ctx
        .commands()
        .iter()
        .map(|c| matches!(c, GpuCommand::MemoryBarrier))
        .collect();
    assert_eq!(kinds, vec![false, true, false]);
}
