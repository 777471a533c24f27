//! User-facing operator wrapper: configure once, run many times.

use ndarray::{Array4, ArrayView4};

use crate::cpu::CpuInfo;
use crate::error::configuration_error;
use crate::scheduler;

use super::strategy::{PoolingCommon, TensorSpec};
use super::table::{self, TableElement};
use super::{
    OutputStage, PaddingValues, PoolType, PoolingArgs, PoolingConfig, PoolingStride, PoolingWindow,
};

/// External, user-facing pooling configuration; [`PoolingArgs`] is derived
/// from it together with the source shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolInfo {
    pub pool_type: PoolType,
    /// Window extents (rows, cols); zero means "pool everything".
    pub pool_size: (usize, usize),
    pub stride: (usize, usize),
    pub padding: PaddingValues,
    pub exclude_padding: bool,
    /// Optional strategy-name filter, an ops-level override hook.
    pub filter: Option<String>,
}

impl PoolInfo {
    pub fn new(pool_type: PoolType, pool_size: (usize, usize), stride: (usize, usize)) -> Self {
        PoolInfo {
            pool_type,
            pool_size,
            stride,
            padding: PaddingValues::default(),
            exclude_padding: false,
            filter: None,
        }
    }

    /// Pool the whole plane down to a single pixel per channel.
    pub fn global_pool(pool_type: PoolType) -> Self {
        PoolInfo::new(pool_type, (0, 0), (1, 1))
    }

    pub fn with_padding(mut self, padding: PaddingValues) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_exclude_padding(mut self, exclude: bool) -> Self {
        self.exclude_padding = exclude;
        self
    }

    fn to_args(
        &self,
        cpu_info: &CpuInfo,
        n_batches: usize,
        input_rows: usize,
        input_cols: usize,
        n_channels: usize,
    ) -> PoolingArgs {
        PoolingArgs::new(
            cpu_info,
            self.pool_type,
            PoolingWindow {
                rows: self.pool_size.0,
                cols: self.pool_size.1,
            },
            PoolingStride {
                rows: self.stride.0,
                cols: self.stride.1,
            },
            self.exclude_padding,
            n_batches,
            input_rows,
            input_cols,
            n_channels,
            self.padding,
            PoolingConfig {
                filter: self.filter.clone(),
            },
        )
    }
}

/// A configured pooling operator over dense NHWC tensors.
pub struct PoolingOperator<T: TableElement> {
    args: PoolingArgs,
    common: Box<dyn PoolingCommon<T>>,
    name: &'static str,
    n_threads: usize,
}

impl<T: TableElement> PoolingOperator<T> {
    /// Validates the configuration and selects a kernel. Fails with a
    /// `Status` when the geometry is malformed or no kernel in the catalog
    /// supports this configuration on this hardware.
    pub fn new(
        cpu_info: &CpuInfo,
        info: &PoolInfo,
        n_batches: usize,
        input_rows: usize,
        input_cols: usize,
        n_channels: usize,
        output_stage: OutputStage,
    ) -> crate::Result<Self> {
        let args = info.to_args(cpu_info, n_batches, input_rows, input_cols, n_channels);
        table::validate::<T>(&args, &output_stage)?;

        let implementation = table::find_implementation::<T>(&args, &output_stage)
            .expect("validate already checked for a table match");
        let common = (implementation.initialise)(&args, &output_stage);

        Ok(PoolingOperator {
            args,
            common,
            name: implementation.name,
            n_threads: cpu_info.num_threads_hint(),
        })
    }

    /// Side-effect-free feasibility check, usable before committing any
    /// resources.
    pub fn validate(
        cpu_info: &CpuInfo,
        info: &PoolInfo,
        n_batches: usize,
        input_rows: usize,
        input_cols: usize,
        n_channels: usize,
        output_stage: &OutputStage,
    ) -> crate::Result<()> {
        let args = info.to_args(cpu_info, n_batches, input_rows, input_cols, n_channels);
        table::validate::<T>(&args, output_stage)
    }

    pub fn args(&self) -> &PoolingArgs {
        &self.args
    }

    /// Name of the selected strategy, for diagnostics.
    pub fn implementation_name(&self) -> &'static str {
        self.name
    }

    /// Inferred output extents (rows, cols).
    pub fn output_shape(&self) -> (usize, usize) {
        (self.args.output_rows, self.args.output_cols)
    }

    pub fn set_num_threads(&mut self, n_threads: usize) {
        self.n_threads = n_threads.max(1);
    }

    fn input_len(&self) -> usize {
        self.args.n_batches * self.args.input_rows * self.args.input_cols * self.args.n_channels
    }

    fn output_len(&self) -> usize {
        self.args.n_batches * self.args.output_rows * self.args.output_cols * self.args.n_channels
    }

    /// Executes over dense NHWC slices.
    pub fn run(&self, input: &[T], output: &mut [T]) -> crate::Result<()> {
        if input.len() != self.input_len() {
            return Err(configuration_error(format!(
                "input slice holds {} elements, geometry needs {}",
                input.len(),
                self.input_len()
            )));
        }
        if output.len() != self.output_len() {
            return Err(configuration_error(format!(
                "output slice holds {} elements, geometry needs {}",
                output.len(),
                self.output_len()
            )));
        }

        let input_spec = TensorSpec::dense_nhwc(
            input.as_ptr(),
            self.args.input_rows,
            self.args.input_cols,
            self.args.n_channels,
        );
        let output_spec = TensorSpec::dense_nhwc(
            output.as_mut_ptr(),
            self.args.output_rows,
            self.args.output_cols,
            self.args.n_channels,
        );

        // Slices were just checked against the geometry; the driver's
        // partitioning keeps threads disjoint
        unsafe {
            scheduler::execute_parallel(self.common.as_ref(), input_spec, output_spec, self.n_threads)
        };
        Ok(())
    }
}

/// Pools an NHWC `(batch, rows, cols, channels)` array in one call.
pub fn pool2d(
    input: &ArrayView4<'_, f32>,
    info: &PoolInfo,
    cpu_info: &CpuInfo,
) -> crate::Result<Array4<f32>> {
    let (n_batches, input_rows, input_cols, n_channels) = input.dim();
    let operator = PoolingOperator::<f32>::new(
        cpu_info,
        info,
        n_batches,
        input_rows,
        input_cols,
        n_channels,
        OutputStage::Nothing,
    )?;
    let (output_rows, output_cols) = operator.output_shape();

    let input = input.as_standard_layout();
    let input_slice = input
        .as_slice()
        .expect("standard-layout arrays are contiguous");

    let mut output = vec![0.0f32; n_batches * output_rows * output_cols * n_channels];
    operator.run(input_slice, &mut output)?;

    Array4::from_shape_vec((n_batches, output_rows, output_cols, n_channels), output)
        .map_err(|e| configuration_error(format!("output shape mismatch: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_operator_reports_unsupported_configuration() {
        let info = PoolInfo::new(PoolType::Max, (3, 3), (0, 0));
        let result = PoolingOperator::<f32>::new(
            &CpuInfo::none(),
            &info,
            1,
            8,
            8,
            4,
            OutputStage::Nothing,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_run_rejects_wrong_slice_lengths() {
        let info = PoolInfo::new(PoolType::Max, (2, 2), (2, 2));
        let operator =
            PoolingOperator::<f32>::new(&CpuInfo::none(), &info, 1, 4, 4, 2, OutputStage::Nothing)
                .unwrap();

        let input = vec![0.0f32; 4 * 4 * 2];
        let mut short_output = vec![0.0f32; 3];
        assert!(operator.run(&input, &mut short_output).is_err());
    }

    #[test]
    fn test_global_pool_produces_single_pixel() {
        let info = PoolInfo::global_pool(PoolType::Average);
        let input = Array4::from_shape_fn((1, 4, 6, 3), |(_, r, c, ch)| {
            (r * 6 + c) as f32 + ch as f32 * 100.0
        });
        let output = pool2d(&input.view(), &info, &CpuInfo::none()).unwrap();

        assert_eq!(output.dim(), (1, 1, 1, 3));
        // Mean over r*6+c for 4x6 grid is 11.5
        assert!((output[(0, 0, 0, 0)] - 11.5).abs() < 1e-5);
        assert!((output[(0, 0, 0, 2)] - 211.5).abs() < 1e-5);
    }

    #[test]
    fn test_pool2d_max_identity_stride() {
        let info = PoolInfo::new(PoolType::Max, (1, 1), (1, 1));
        let input = Array4::from_shape_fn((2, 3, 3, 1), |(b, r, c, _)| (b * 100 + r * 3 + c) as f32);
        let output = pool2d(&input.view(), &info, &CpuInfo::none()).unwrap();
        assert_eq!(output, input);
    }
}
