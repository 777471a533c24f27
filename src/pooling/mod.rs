//! Pooling operator configuration and the depthfirst execution framework.
//!
//! A caller builds a [`PoolingArgs`] (usually through the [`operator`]
//! façade), the selection table in [`table`] picks the best kernel available
//! on the host, and the driver in [`depthfirst`] tiles and threads the work.

pub mod depthfirst;
pub mod direct;
pub mod generic;
pub mod kernels;
pub mod operator;
pub mod strategy;
pub mod table;

use crate::cpu::CpuInfo;

/// Pooling reduction applied over each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolType {
    Average,
    Max,
}

/// Pooling window extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolingWindow {
    pub rows: usize,
    pub cols: usize,
}

/// Pooling stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolingStride {
    pub rows: usize,
    pub cols: usize,
}

/// Logical zero-padding applied around the input plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaddingValues {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl PaddingValues {
    pub fn new(left: usize, top: usize, right: usize, bottom: usize) -> Self {
        PaddingValues {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn uniform(size: usize) -> Self {
        PaddingValues::new(size, size, size, size)
    }
}

/// Affine asymmetric-quantization rescale applied by quantized kernels:
/// left shift, Q31 doubling-high multiply, rounding right shift, offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requantize32 {
    pub input_offset: i32,
    pub output_offset: i32,
    pub per_layer_left_shift: i32,
    pub per_layer_right_shift: i32,
    pub per_layer_mul: i32,
}

impl Requantize32 {
    /// Parameters that map the accumulator straight through: useful when the
    /// input and output quantization match.
    pub fn identity() -> Self {
        Requantize32 {
            input_offset: 0,
            output_offset: 0,
            per_layer_left_shift: 1,
            per_layer_right_shift: 0,
            per_layer_mul: 1 << 30,
        }
    }
}

/// Kernel post-processing: nothing (float / plain integer kernels) or a
/// requantization stage forwarded unchanged to the numeric kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStage {
    Nothing,
    Requantize32(Requantize32),
}

/// Optional tuning knobs, currently just the ops-level strategy-name filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolingConfig {
    /// When set, only selection-table entries whose name contains this
    /// substring are considered.
    pub filter: Option<String>,
}

/// Immutable description of one configured pooling operator instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolingArgs {
    pub cpu_info: CpuInfo,
    pub pool_type: PoolType,
    pub pool_window: PoolingWindow,
    pub pool_stride: PoolingStride,
    pub exclude_padding: bool,
    pub n_batches: usize,
    pub input_rows: usize,
    pub input_cols: usize,
    pub n_channels: usize,
    pub output_rows: usize,
    pub output_cols: usize,
    pub padding: PaddingValues,
    pub config: PoolingConfig,
}

impl PoolingArgs {
    /// Builds the argument block and infers the output extents. A zero
    /// window extent means "pool everything" and is replaced by the matching
    /// input extent before anything else is derived.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cpu_info: &CpuInfo,
        pool_type: PoolType,
        pool_window: PoolingWindow,
        pool_stride: PoolingStride,
        exclude_padding: bool,
        n_batches: usize,
        input_rows: usize,
        input_cols: usize,
        n_channels: usize,
        padding: PaddingValues,
        config: PoolingConfig,
    ) -> Self {
        let pool_window = PoolingWindow {
            rows: if pool_window.rows == 0 {
                input_rows
            } else {
                pool_window.rows
            },
            cols: if pool_window.cols == 0 {
                input_cols
            } else {
                pool_window.cols
            },
        };

        let output_rows = output_size(
            input_rows,
            pool_window.rows,
            pool_stride.rows,
            padding.top,
            padding.bottom,
        );
        let output_cols = output_size(
            input_cols,
            pool_window.cols,
            pool_stride.cols,
            padding.left,
            padding.right,
        );

        PoolingArgs {
            cpu_info: *cpu_info,
            pool_type,
            pool_window,
            pool_stride,
            exclude_padding,
            n_batches,
            input_rows,
            input_cols,
            n_channels,
            output_rows,
            output_cols,
            padding,
            config,
        }
    }

    /// Geometry checks shared by `validate` and `configure` paths.
    pub fn validate_geometry(&self) -> crate::Result<()> {
        use crate::error::configuration_error;

        if self.pool_stride.rows == 0 || self.pool_stride.cols == 0 {
            return Err(configuration_error("pooling stride must be non-zero"));
        }
        if self.pool_window.rows == 0 || self.pool_window.cols == 0 {
            return Err(configuration_error("pooling window must be non-zero"));
        }
        if self.n_channels == 0 || self.n_batches == 0 {
            return Err(configuration_error(
                "tensor must have at least one batch and one channel",
            ));
        }
        if self.padding.top >= self.pool_window.rows
            || self.padding.bottom >= self.pool_window.rows
            || self.padding.left >= self.pool_window.cols
            || self.padding.right >= self.pool_window.cols
        {
            return Err(configuration_error(format!(
                "padding ({}, {}, {}, {}) must be smaller than the pooling window ({}x{})",
                self.padding.left,
                self.padding.top,
                self.padding.right,
                self.padding.bottom,
                self.pool_window.rows,
                self.pool_window.cols,
            )));
        }
        if self.output_rows == 0 || self.output_cols == 0 {
            return Err(configuration_error(format!(
                "window {}x{} with stride {}x{} does not fit the {}x{} input",
                self.pool_window.rows,
                self.pool_window.cols,
                self.pool_stride.rows,
                self.pool_stride.cols,
                self.input_rows,
                self.input_cols,
            )));
        }
        Ok(())
    }
}

/// Output extent of a strided sliding window over a padded input, zero when
/// the window does not fit at all.
pub fn output_size(
    input: usize,
    window: usize,
    stride: usize,
    pad_before: usize,
    pad_after: usize,
) -> usize {
    let padded = input + pad_before + pad_after;
    if stride == 0 || padded < window {
        return 0;
    }
    (padded - window) / stride + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size() {
        // 5x5 input, 3x3 window, stride 2, pad 1 all sides -> 3x3
        assert_eq!(output_size(5, 3, 2, 1, 1), 3);
        // 4x4 input, 3x3 window, stride 1, pad 1 -> 4
        assert_eq!(output_size(4, 3, 1, 1, 1), 4);
        // Window larger than padded input
        assert_eq!(output_size(2, 5, 1, 1, 1), 0);
        // Exact fit
        assert_eq!(output_size(3, 3, 7, 0, 0), 1);
    }

    #[test]
    fn test_pool_everything_substitution() {
        let args = PoolingArgs::new(
            &CpuInfo::none(),
            PoolType::Average,
            PoolingWindow { rows: 0, cols: 0 },
            PoolingStride { rows: 1, cols: 1 },
            false,
            1,
            7,
            9,
            32,
            PaddingValues::default(),
            PoolingConfig::default(),
        );
        assert_eq!(args.pool_window.rows, 7);
        assert_eq!(args.pool_window.cols, 9);
        assert_eq!(args.output_rows, 1);
        assert_eq!(args.output_cols, 1);
    }

    #[test]
    fn test_validate_geometry_rejects_bad_configs() {
        let mk = |window: usize, stride: usize, pad: usize| {
            PoolingArgs::new(
                &CpuInfo::none(),
                PoolType::Max,
                PoolingWindow {
                    rows: window,
                    cols: window,
                },
                PoolingStride {
                    rows: stride,
                    cols: stride,
                },
                false,
                1,
                8,
                8,
                4,
                PaddingValues::uniform(pad),
                PoolingConfig::default(),
            )
        };

        assert!(mk(3, 1, 1).validate_geometry().is_ok());
        assert!(mk(3, 0, 1).validate_geometry().is_err());
        // Padding as large as the window
        assert!(mk(2, 1, 2).validate_geometry().is_err());
    }

    #[test]
    fn test_identity_requantize_params() {
        let qp = Requantize32::identity();
        assert_eq!(qp.per_layer_mul, 1 << 30);
        assert_eq!(qp.per_layer_left_shift, 1);
    }
}
