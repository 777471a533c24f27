//! Tile adapter for generic (any window/stride) kernels.
//!
//! Generic kernels compute one output pixel per call from a list of pointers
//! to the *valid* cells of its pooling window, plus the `window_cells` value
//! averaging kernels divide by. This adapter owns the only two numerically
//! delicate decisions at tensor borders: which cells are valid, and what the
//! average divisor is under the padding-inclusion policy.
//!
//! Divisor rules: with `exclude_padding` the divisor is the count of
//! genuinely in-bounds cells. Without it, cells inside the declared zero
//! padding count too, but truncation past the padded extent does not: the
//! window is clipped to `[0, extent + pad_after)` per axis before counting.

use super::depthfirst::{DepthfirstDriver, TileCompute};
use super::kernels::{GenericKernelFn, GenericQuantKernelFn};
use super::strategy::{PoolElement, PoolingCommon, TensorSpec, ThreadWorkspace, WorkspaceLayout};
use super::{PoolType, PoolingArgs, Requantize32};

/// A generic kernel entry point, with or without a requantization payload.
#[derive(Clone, Copy)]
pub enum GenericKernel<T: PoolElement> {
    Plain(GenericKernelFn<T>),
    Requant(GenericQuantKernelFn<T>, Requantize32),
}

/// Depthfirst operator built around a generic kernel.
pub struct PoolingDepthfirstGeneric<T: PoolElement> {
    args: PoolingArgs,
    kernel: GenericKernel<T>,
}

impl<T: PoolElement> PoolingDepthfirstGeneric<T> {
    pub fn new(args: &PoolingArgs, kernel: GenericKernel<T>) -> Self {
        PoolingDepthfirstGeneric {
            args: args.clone(),
            kernel,
        }
    }

    #[inline(always)]
    unsafe fn invoke(
        &self,
        window_cells: u64,
        n_valid_cells: u64,
        n_channels: u64,
        inptrs: *const *const T,
        outptr: *mut T,
    ) {
        match self.kernel {
            GenericKernel::Plain(kernel) => {
                kernel(window_cells, n_valid_cells, n_channels, inptrs, outptr)
            }
            GenericKernel::Requant(kernel, qp) => {
                kernel(window_cells, n_valid_cells, n_channels, inptrs, outptr, &qp)
            }
        }
    }

    /// Valid-cell band of the window anchored at `out_pos` along one axis:
    /// `(first_valid, n_valid, n_captured)`.
    fn axis_window(
        &self,
        out_pos: usize,
        stride: usize,
        window: usize,
        pad_before: usize,
        pad_after: usize,
        extent: usize,
    ) -> (usize, usize, usize) {
        let start = (out_pos * stride) as isize - pad_before as isize;
        let end = start + window as isize;

        let valid_start = start.max(0);
        let valid_end = end.min(extent as isize);
        let n_valid = (valid_end - valid_start).max(0) as usize;

        // Cells inside the declared padding still count toward the divisor;
        // truncation past the padded extent does not.
        let captured_end = end.min((extent + pad_after) as isize);
        let n_captured = (captured_end - valid_start).max(0) as usize;

        (valid_start as usize, n_valid, n_captured)
    }
}

impl<T: PoolElement> TileCompute<T> for PoolingDepthfirstGeneric<T> {
    fn tile_rows(&self) -> usize {
        1
    }

    fn tile_cols(&self) -> usize {
        1
    }

    fn workspace_layout(&self) -> WorkspaceLayout {
        WorkspaceLayout {
            in_ptr_slots: self.args.pool_window.rows * self.args.pool_window.cols,
            out_ptr_slots: 0,
            n_channels: self.args.n_channels,
        }
    }

    fn fill_value(&self) -> T {
        match self.args.pool_type {
            PoolType::Max => T::MAX_IDENTITY,
            PoolType::Average => T::ZERO,
        }
    }

    unsafe fn compute_tile_padded(
        &self,
        input: TensorSpec<*const T>,
        output: TensorSpec<*mut T>,
        batch: usize,
        out_i: usize,
        out_j: usize,
        channel_start: usize,
        channel_end: usize,
        ws: &ThreadWorkspace<T>,
    ) {
        let args = &self.args;
        let (row0, valid_rows, captured_rows) = self.axis_window(
            out_i,
            args.pool_stride.rows,
            args.pool_window.rows,
            args.padding.top,
            args.padding.bottom,
            args.input_rows,
        );
        let (col0, valid_cols, captured_cols) = self.axis_window(
            out_j,
            args.pool_stride.cols,
            args.pool_window.cols,
            args.padding.left,
            args.padding.right,
            args.input_cols,
        );

        let mut n = 0;
        for r in row0..row0 + valid_rows {
            for c in col0..col0 + valid_cols {
                *ws.inptrs.add(n) = input.base.add(input.offset(batch, r, c, channel_start));
                n += 1;
            }
        }

        let mut window_cells = if args.exclude_padding {
            (valid_rows * valid_cols) as u64
        } else {
            (captured_rows * captured_cols) as u64
        };

        if n == 0 {
            // Fully padded window: read the fill buffer once so the kernel
            // still has a dereferenceable pointer
            *ws.inptrs.add(0) = ws.fill as *const T;
            n = 1;
            window_cells = 1;
        }

        let outptr = output
            .base
            .add(output.offset(batch, out_i, out_j, channel_start));
        self.invoke(
            window_cells,
            n as u64,
            (channel_end - channel_start) as u64,
            ws.inptrs,
            outptr,
        );
    }

    unsafe fn compute_row_padded_tile_row(
        &self,
        input: TensorSpec<*const T>,
        output: TensorSpec<*mut T>,
        batch: usize,
        out_i: usize,
        out_j: usize,
        n_tiles: usize,
        channel_start: usize,
        channel_end: usize,
        ws: &ThreadWorkspace<T>,
    ) {
        let args = &self.args;
        // Row geometry is shared by the whole run; columns are interior
        let (row0, valid_rows, captured_rows) = self.axis_window(
            out_i,
            args.pool_stride.rows,
            args.pool_window.rows,
            args.padding.top,
            args.padding.bottom,
            args.input_rows,
        );
        let window_cols = args.pool_window.cols;

        let window_cells = if args.exclude_padding {
            (valid_rows * window_cols) as u64
        } else {
            (captured_rows * window_cols) as u64
        };
        let n_valid = valid_rows * window_cols;
        let n_channels = (channel_end - channel_start) as u64;

        for t in 0..n_tiles {
            let col0 = (out_j + t) * args.pool_stride.cols - args.padding.left;

            let mut n = 0;
            for r in row0..row0 + valid_rows {
                for c in col0..col0 + window_cols {
                    *ws.inptrs.add(n) = input.base.add(input.offset(batch, r, c, channel_start));
                    n += 1;
                }
            }
            debug_assert_eq!(n, n_valid);

            let outptr = output
                .base
                .add(output.offset(batch, out_i, out_j + t, channel_start));
            self.invoke(window_cells, n_valid as u64, n_channels, ws.inptrs, outptr);
        }
    }

    unsafe fn compute_tiles_unpadded(
        &self,
        input: TensorSpec<*const T>,
        output: TensorSpec<*mut T>,
        batch: usize,
        out_i: usize,
        out_j: usize,
        n_tile_rows: usize,
        n_tile_cols: usize,
        channel_start: usize,
        channel_end: usize,
        ws: &ThreadWorkspace<T>,
    ) {
        let args = &self.args;
        let (window_rows, window_cols) = (args.pool_window.rows, args.pool_window.cols);
        let window_cells = (window_rows * window_cols) as u64;
        let n_channels = (channel_end - channel_start) as u64;

        for tr in 0..n_tile_rows {
            let row0 = (out_i + tr) * args.pool_stride.rows - args.padding.top;
            for tc in 0..n_tile_cols {
                let col0 = (out_j + tc) * args.pool_stride.cols - args.padding.left;

                let mut n = 0;
                for r in row0..row0 + window_rows {
                    for c in col0..col0 + window_cols {
                        *ws.inptrs.add(n) =
                            input.base.add(input.offset(batch, r, c, channel_start));
                        n += 1;
                    }
                }

                let outptr =
                    output
                        .base
                        .add(output.offset(batch, out_i + tr, out_j + tc, channel_start));
                self.invoke(window_cells, window_cells, n_channels, ws.inptrs, outptr);
            }
        }
    }
}

impl<T: PoolElement> PoolingCommon<T> for PoolingDepthfirstGeneric<T> {
    fn get_working_size(&self, n_threads: usize) -> usize {
        DepthfirstDriver::new(&self.args, self).working_size(n_threads)
    }

    unsafe fn execute(
        &self,
        input: TensorSpec<*const T>,
        output: TensorSpec<*mut T>,
        working_space: *mut u8,
        thread_id: usize,
        n_threads: usize,
    ) {
        DepthfirstDriver::new(&self.args, self).execute_internal(
            input,
            output,
            working_space,
            thread_id,
            n_threads,
        );
    }
}
