//! NEON kernel bodies: 4-lane f32 channel loops with scalar tails.

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

const LANE_COUNT: usize = 4;

/// Generic MAX pooling, f32.
///
/// # Safety
///
/// `inptrs` must hold `n_valid_cells` pointers each valid for `n_channels`
/// reads; `outptr` must be valid for `n_channels` writes.
pub unsafe fn max_generic_f32(
    _window_cells: u64,
    n_valid_cells: u64,
    n_channels: u64,
    inptrs: *const *const f32,
    outptr: *mut f32,
) {
    let n_channels = n_channels as usize;
    let n_valid = n_valid_cells as usize;

    let mut c = 0;
    while c + LANE_COUNT <= n_channels {
        let mut best = vdupq_n_f32(f32::NEG_INFINITY);
        for p in 0..n_valid {
            best = vmaxq_f32(best, vld1q_f32((*inptrs.add(p)).add(c)));
        }
        vst1q_f32(outptr.add(c), best);
        c += LANE_COUNT;
    }

    while c < n_channels {
        let mut best = f32::NEG_INFINITY;
        for p in 0..n_valid {
            best = best.max(*(*inptrs.add(p)).add(c));
        }
        *outptr.add(c) = best;
        c += 1;
    }
}

/// Generic AVERAGE pooling, f32.
///
/// # Safety
///
/// As for [`max_generic_f32`]; `window_cells` must be non-zero.
pub unsafe fn avg_generic_f32(
    window_cells: u64,
    n_valid_cells: u64,
    n_channels: u64,
    inptrs: *const *const f32,
    outptr: *mut f32,
) {
    let n_channels = n_channels as usize;
    let n_valid = n_valid_cells as usize;
    let rescale = 1.0f32 / window_cells as f32;

    let mut c = 0;
    while c + LANE_COUNT <= n_channels {
        let mut sum = vdupq_n_f32(0.0);
        for p in 0..n_valid {
            sum = vaddq_f32(sum, vld1q_f32((*inptrs.add(p)).add(c)));
        }
        vst1q_f32(outptr.add(c), vmulq_n_f32(sum, rescale));
        c += LANE_COUNT;
    }

    while c < n_channels {
        let mut sum = 0.0f32;
        for p in 0..n_valid {
            sum += *(*inptrs.add(p)).add(c);
        }
        *outptr.add(c) = sum * rescale;
        c += 1;
    }
}

/// Direct MAX pooling, f32, 2x2 window, unit stride, 2x2 output tile.
///
/// # Safety
///
/// `inptrs` must hold 9 pointers and `outptrs` 4, each valid for
/// `n_channels` reads/writes.
pub unsafe fn max_2x2_s1_direct_f32(
    n_channels: u64,
    inptrs: *const *const f32,
    outptrs: *const *mut f32,
) {
    let n_channels = n_channels as usize;

    let mut c = 0;
    while c + LANE_COUNT <= n_channels {
        let cell = |r: usize, col: usize| vld1q_f32((*inptrs.add(r * 3 + col)).add(c));

        for tr in 0..2 {
            for tc in 0..2 {
                let top = vmaxq_f32(cell(tr, tc), cell(tr, tc + 1));
                let bottom = vmaxq_f32(cell(tr + 1, tc), cell(tr + 1, tc + 1));
                vst1q_f32(
                    (*outptrs.add(tr * 2 + tc)).add(c),
                    vmaxq_f32(top, bottom),
                );
            }
        }
        c += LANE_COUNT;
    }

    while c < n_channels {
        let cell = |r: usize, col: usize| *(*inptrs.add(r * 3 + col)).add(c);

        for tr in 0..2 {
            for tc in 0..2 {
                let m = cell(tr, tc)
                    .max(cell(tr, tc + 1))
                    .max(cell(tr + 1, tc))
                    .max(cell(tr + 1, tc + 1));
                *(*outptrs.add(tr * 2 + tc)).add(c) = m;
            }
        }
        c += 1;
    }
}
