//! GPU pooling kernel glue: program selection, build options, window setup
//! and slice-wise dispatch.
//!
//! GPU tensors here are planar: dimension 0 is columns, 1 is rows, 2 is
//! planes (channels, with batches folded in by the caller). The numeric
//! shader source itself is an external collaborator selected by name.

use tracing::debug;

use crate::error::insufficient_padding;
use crate::pooling::operator::PoolInfo;
use crate::pooling::output_size;
use crate::tensor::{DataType, TensorDescriptor, ValidRegion};
use crate::window::{
    calculate_max_window, update_window_and_padding, AccessPattern, AccessWindowRectangle,
    BorderSize, Steps, TensorAccessBinding, Window,
};

use super::args::KernelArgumentPack;
use super::context::{BuildOptions, GpuRuntimeContext, NdRange, ProgramHandle};

use crate::error::configuration_error;

/// A configured GPU pooling kernel.
pub struct GpuPoolingKernel {
    program: ProgramHandle,
    kernel_name: &'static str,
    build_options: BuildOptions,
    window: Window,
}

impl GpuPoolingKernel {
    /// Validates geometry, selects and loads the shader program, computes
    /// the execution window and grows the source tensor's padding to cover
    /// the window's footprint. The destination's valid region is updated.
    pub fn configure(
        ctx: &mut GpuRuntimeContext,
        src: &mut TensorDescriptor,
        dst: &mut TensorDescriptor,
        info: &PoolInfo,
    ) -> crate::Result<Self> {
        let (pool_rows, pool_cols) = (
            if info.pool_size.0 == 0 {
                src.shape().dim(1)
            } else {
                info.pool_size.0
            },
            if info.pool_size.1 == 0 {
                src.shape().dim(0)
            } else {
                info.pool_size.1
            },
        );
        let (stride_rows, stride_cols) = info.stride;
        let padding = info.padding;

        let output_rows = output_size(
            src.shape().dim(1),
            pool_rows,
            stride_rows,
            padding.top,
            padding.bottom,
        );
        let output_cols = output_size(
            src.shape().dim(0),
            pool_cols,
            stride_cols,
            padding.left,
            padding.right,
        );
        if output_rows == 0 || output_cols == 0 {
            return Err(configuration_error(
                "pooling window does not fit the padded source plane",
            ));
        }
        if dst.shape().dim(0) != output_cols || dst.shape().dim(1) != output_rows {
            return Err(configuration_error(format!(
                "destination plane is {}x{}, inferred output is {}x{}",
                dst.shape().dim(1),
                dst.shape().dim(0),
                output_rows,
                output_cols,
            )));
        }
        if dst.shape().dim(2) != src.shape().dim(2) {
            return Err(configuration_error(
                "source and destination must have the same number of planes",
            ));
        }

        let square = pool_rows == pool_cols;
        let unit_stride = stride_rows == 1 && stride_cols == 1;
        let (kernel_name, elems_per_iteration): (&'static str, usize) = match pool_cols {
            2 if square => ("pooling_layer_2", 1),
            3 if square && unit_stride && src.data_type() == DataType::F32 => {
                ("pooling_layer_3_optimized", 4)
            }
            3 if square => ("pooling_layer_3", 1),
            7 if square => ("pooling_layer_7", 1),
            _ => ("pooling_layer_n", 1),
        };

        let mut build_options = BuildOptions::new();
        build_options.add(match src.data_type() {
            DataType::F32 => "#define DATA_TYPE_FP32",
            DataType::Q8 => "#define DATA_TYPE_QASYMM8",
        });
        build_options.add(match info.pool_type {
            crate::PoolType::Average => "#define POOL_AVG",
            crate::PoolType::Max => "#define POOL_MAX",
        });
        if info.exclude_padding {
            build_options.add("#define EXCLUDE_PADDING");
        }
        build_options.add(format!("#define POOL_SIZE_X {pool_cols}"));
        build_options.add(format!("#define POOL_SIZE_Y {pool_rows}"));
        build_options.add(format!("#define STRIDE_X {stride_cols}"));
        build_options.add(format!("#define STRIDE_Y {stride_rows}"));
        build_options.add(format!("#define PAD_X {}", padding.left));
        build_options.add(format!("#define PAD_Y {}", padding.top));

        // One iteration produces `elems_per_iteration` output columns; its
        // source footprint starts at the mirrored padded position
        let mut window = calculate_max_window(
            dst.shape(),
            &Steps::new(&[elems_per_iteration]),
            false,
            BorderSize::default(),
        );

        let src_footprint_cols = (elems_per_iteration - 1) * stride_cols + pool_cols;
        let src_access = AccessPattern::Rectangle(
            AccessWindowRectangle::new(
                -(padding.left as isize),
                -(padding.top as isize),
                src_footprint_cols,
                pool_rows,
            )
            .with_scale(stride_cols as f32, stride_rows as f32),
        );
        let dst_access =
            AccessPattern::Rectangle(AccessWindowRectangle::new(0, 0, elems_per_iteration, 1));

        let window_changed = update_window_and_padding(
            &mut window,
            &mut [
                TensorAccessBinding::new(src_access, src),
                TensorAccessBinding::new(dst_access, dst),
            ],
        );
        if window_changed {
            return Err(insufficient_padding(
                "source tensor cannot satisfy the pooling footprint",
            ));
        }

        dst_access.set_valid_region(
            dst,
            &window,
            ValidRegion::full(*dst.shape()),
            false,
            BorderSize::default(),
        );

        let program = ctx.load_program(kernel_name, &build_options);
        debug!(kernel = kernel_name, "gpu pooling kernel configured");

        Ok(GpuPoolingKernel {
            program,
            kernel_name,
            build_options,
            window,
        })
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel_name
    }

    pub fn build_options(&self) -> &BuildOptions {
        &self.build_options
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Walks 3D slices of the execution window, packing both tensors'
    /// arguments per slice and recording one dispatch each. Barriers
    /// against dependent kernels are the caller's responsibility.
    pub fn run(
        &self,
        ctx: &mut GpuRuntimeContext,
        src: (&TensorDescriptor, super::args::BufferHandle),
        dst: (&TensorDescriptor, super::args::BufferHandle),
    ) {
        for slice in self.window.slices(3) {
            let mut arguments = KernelArgumentPack::new();
            arguments.add_3d_tensor_argument(src.0, src.1, 0, &slice);
            arguments.add_3d_tensor_argument(dst.0, dst.1, 1, &slice);

            let ndrange = NdRange {
                global: [
                    slice.num_iterations(0),
                    slice.num_iterations(1),
                    slice.num_iterations(2),
                ],
                local: [1, 1, 1],
            };
            ctx.dispatch(self.program, ndrange, arguments);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::context::SequentialCompiler;
    use crate::pooling::PoolType;
    use crate::tensor::TensorShape;

    fn planar(cols: usize, rows: usize, planes: usize) -> TensorDescriptor {
        TensorDescriptor::new(TensorShape::new(&[cols, rows, planes]), DataType::F32)
    }

    fn ctx() -> GpuRuntimeContext {
        GpuRuntimeContext::new(Box::<SequentialCompiler>::default())
    }

    #[test]
    fn test_kernel_name_selection() {
        let mut ctx = ctx();

        let mut src = planar(8, 8, 2);
        let mut dst = planar(4, 4, 2);
        let info = PoolInfo::new(PoolType::Max, (2, 2), (2, 2));
        let kernel = GpuPoolingKernel::configure(&mut ctx, &mut src, &mut dst, &info).unwrap();
        assert_eq!(kernel.kernel_name(), "pooling_layer_2");

        let mut src = planar(8, 8, 2);
        let mut dst = planar(6, 6, 2);
        let info = PoolInfo::new(PoolType::Max, (3, 3), (1, 1));
        let kernel = GpuPoolingKernel::configure(&mut ctx, &mut src, &mut dst, &info).unwrap();
        assert_eq!(kernel.kernel_name(), "pooling_layer_3_optimized");

        let mut src = planar(9, 9, 1);
        let mut dst = planar(2, 2, 1);
        let info = PoolInfo::new(PoolType::Average, (5, 5), (4, 4));
        let kernel = GpuPoolingKernel::configure(&mut ctx, &mut src, &mut dst, &info).unwrap();
        assert_eq!(kernel.kernel_name(), "pooling_layer_n");
        assert!(kernel.build_options().contains("#define POOL_AVG"));
        assert!(kernel.build_options().contains("#define POOL_SIZE_X 5"));
    }

    #[test]
    fn test_configure_rejects_mismatched_destination() {
        let mut ctx = ctx();
        let mut src = planar(8, 8, 2);
        let mut dst = planar(5, 5, 2); // should be 4x4
        let info = PoolInfo::new(PoolType::Max, (2, 2), (2, 2));
        assert!(GpuPoolingKernel::configure(&mut ctx, &mut src, &mut dst, &info).is_err());
    }

    #[test]
    fn test_configure_grows_source_padding_for_borderful_windows() {
        let mut ctx = ctx();
        let mut src = planar(8, 8, 1);
        let mut dst = planar(8, 8, 1);
        let info = PoolInfo::new(PoolType::Average, (3, 3), (1, 1))
            .with_padding(crate::pooling::PaddingValues::uniform(1));

        let kernel = GpuPoolingKernel::configure(&mut ctx, &mut src, &mut dst, &info).unwrap();
        // The 3x3 window centred at (-1, -1) needs a one-element border,
        // and the 4-wide optimized variant reads further right
        assert!(src.padding().left >= 1);
        assert!(src.padding().top >= 1);
        assert!(src.padding().right >= 1);
        assert_eq!(kernel.kernel_name(), "pooling_layer_3_optimized");
    }

    #[test]
    fn test_run_records_one_dispatch_with_bound_tensors() {
        let mut ctx = ctx();
        let mut src = planar(8, 8, 3);
        let mut dst = planar(4, 4, 3);
        let info = PoolInfo::new(PoolType::Max, (2, 2), (2, 2));
        let kernel = GpuPoolingKernel::configure(&mut ctx, &mut src, &mut dst, &info).unwrap();

        kernel.run(
            &mut ctx,
            (&src, crate::gpu::BufferHandle(10)),
            (&dst, crate::gpu::BufferHandle(11)),
        );

        let commands = ctx.commands();
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            crate::gpu::GpuCommand::Dispatch {
                ndrange, arguments, ..
            } => {
                assert_eq!(ndrange.global, [4, 4, 3]);
                assert_eq!(
                    arguments.current_index(),
                    2 * crate::gpu::num_arguments_per_3d_tensor()
                );
                assert_eq!(arguments.bindings().len(), 2);
            }
            other => panic!("expected a dispatch, got {other:?}"),
        }
    }
}
