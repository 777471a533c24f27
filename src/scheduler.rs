//! CPU scheduling glue: fans a configured operator out over the rayon pool.
//!
//! Each worker is invoked exactly once with a distinct `thread_id`; the
//! driver's partitioning guarantees workers never write overlapping output
//! and only touch their own working-space slice, so no synchronization
//! beyond the fork-join itself is needed.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::alloc::WorkingSpace;
use crate::pooling::strategy::{PoolElement, PoolingCommon, TensorSpec};

/// Runs `common` across `n_threads` workers, allocating the working space it
/// asks for up front.
///
/// # Safety
///
/// `input`/`output` must satisfy the pointer contract of
/// [`PoolingCommon::execute`] for the operator's configured geometry.
pub unsafe fn execute_parallel<T: PoolElement>(
    common: &dyn PoolingCommon<T>,
    input: TensorSpec<*const T>,
    output: TensorSpec<*mut T>,
    n_threads: usize,
) {
    let n_threads = n_threads.max(1);
    let working_space = WorkingSpace::new(common.get_working_size(n_threads));

    if n_threads == 1 {
        common.execute(input, output, working_space.as_mut_ptr(), 0, 1);
        return;
    }

    // Raw pointers travel as addresses; every worker re-materializes its
    // own view
    let in_base = input.base as usize;
    let out_base = output.base as usize;
    let ws_base = working_space.as_mut_ptr() as usize;

    (0..n_threads).into_par_iter().for_each(|thread_id| {
        let thread_input = TensorSpec::new(
            in_base as *const T,
            input.ld_row,
            input.ld_col,
            input.ld_batch,
        );
        let thread_output = TensorSpec::new(
            out_base as *mut T,
            output.ld_row,
            output.ld_col,
            output.ld_batch,
        );
        unsafe {
            common.execute(
                thread_input,
                thread_output,
                ws_base as *mut u8,
                thread_id,
                n_threads,
            );
        }
    });
}
