//! Portable kernel bodies, compiled for every target.

use num::traits::{Float, FromPrimitive};

use crate::pooling::strategy::PoolElement;
use crate::pooling::Requantize32;

/// Generic MAX pooling.
///
/// # Safety
///
/// `inptrs` must hold `n_valid_cells` pointers each valid for `n_channels`
/// reads; `outptr` must be valid for `n_channels` writes.
pub unsafe fn max_generic<T: PoolElement>(
    _window_cells: u64,
    n_valid_cells: u64,
    n_channels: u64,
    inptrs: *const *const T,
    outptr: *mut T,
) {
    for c in 0..n_channels as usize {
        let mut best = T::MAX_IDENTITY;
        for p in 0..n_valid_cells as usize {
            let v = *(*inptrs.add(p)).add(c);
            if best < v {
                best = v;
            }
        }
        *outptr.add(c) = best;
    }
}

/// Generic AVERAGE pooling; `window_cells` is the divisor chosen by the
/// adapter under the padding-inclusion policy.
///
/// # Safety
///
/// As for [`max_generic`]; `window_cells` must be non-zero.
pub unsafe fn avg_generic<T: PoolElement + Float + FromPrimitive>(
    window_cells: u64,
    n_valid_cells: u64,
    n_channels: u64,
    inptrs: *const *const T,
    outptr: *mut T,
) {
    let divisor = T::from_u64(window_cells).expect("cell count must be representable");
    for c in 0..n_channels as usize {
        let mut sum = T::zero();
        for p in 0..n_valid_cells as usize {
            sum = sum + *(*inptrs.add(p)).add(c);
        }
        *outptr.add(c) = sum / divisor;
    }
}

/// Direct MAX pooling, 2x2 window, unit stride, 2x2 output tile: a 3x3
/// input patch (9 pointers) produces 4 outputs.
///
/// # Safety
///
/// `inptrs` must hold 9 pointers and `outptrs` 4, each valid for
/// `n_channels` reads/writes.
pub unsafe fn max_2x2_s1_direct<T: PoolElement>(
    n_channels: u64,
    inptrs: *const *const T,
    outptrs: *const *mut T,
) {
    #[inline(always)]
    unsafe fn max2<T: PoolElement>(a: T, b: T) -> T {
        if a < b {
            b
        } else {
            a
        }
    }

    for c in 0..n_channels as usize {
        let cell = |r: usize, col: usize| *(*inptrs.add(r * 3 + col)).add(c);

        for tr in 0..2 {
            for tc in 0..2 {
                let m = max2(
                    max2(cell(tr, tc), cell(tr, tc + 1)),
                    max2(cell(tr + 1, tc), cell(tr + 1, tc + 1)),
                );
                *(*outptrs.add(tr * 2 + tc)).add(c) = m;
            }
        }
    }
}

/// Generic MAX pooling over quantized u8 with an affine output rescale.
///
/// # Safety
///
/// As for [`max_generic`].
pub unsafe fn max_generic_q8(
    _window_cells: u64,
    n_valid_cells: u64,
    n_channels: u64,
    inptrs: *const *const u8,
    outptr: *mut u8,
    qp: &Requantize32,
) {
    for c in 0..n_channels as usize {
        let mut best = 0u8;
        for p in 0..n_valid_cells as usize {
            best = best.max(*(*inptrs.add(p)).add(c));
        }
        *outptr.add(c) = requantize(best as i32 + qp.input_offset, qp);
    }
}

/// Generic AVERAGE pooling over quantized u8: accumulates
/// `x + input_offset` in i32, computes a rounded integer average over
/// `window_cells`, then applies the affine rescale.
///
/// # Safety
///
/// As for [`max_generic`]; `window_cells` must be non-zero.
pub unsafe fn avg_generic_q8(
    window_cells: u64,
    n_valid_cells: u64,
    n_channels: u64,
    inptrs: *const *const u8,
    outptr: *mut u8,
    qp: &Requantize32,
) {
    let cells = window_cells as i32;
    for c in 0..n_channels as usize {
        let mut acc = 0i32;
        for p in 0..n_valid_cells as usize {
            acc += *(*inptrs.add(p)).add(c) as i32 + qp.input_offset;
        }
        let avg = if acc >= 0 {
            (acc + cells / 2) / cells
        } else {
            (acc - cells / 2) / cells
        };
        *outptr.add(c) = requantize(avg, qp);
    }
}

/// Applies the affine requantization sequence: left shift, Q31
/// doubling-high multiply, rounding right shift, output offset, saturate to
/// `[0, 255]`.
pub fn requantize(value: i32, qp: &Requantize32) -> u8 {
    let shifted = ((value as i64) << qp.per_layer_left_shift)
        .clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    let multiplied = saturating_rounding_doubling_high_mul(shifted, qp.per_layer_mul);
    let rescaled = rounding_right_shift(multiplied, qp.per_layer_right_shift);
    (rescaled + qp.output_offset).clamp(0, 255) as u8
}

/// `round(a * b / 2^31)` with saturation on the one overflowing case.
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let ab = a as i64 * b as i64;
    let nudge = if ab >= 0 { 1i64 << 30 } else { 1 - (1i64 << 30) };
    ((ab + nudge) >> 31) as i32
}

/// Arithmetic right shift rounding to nearest, ties away from zero.
pub fn rounding_right_shift(value: i32, shift: i32) -> i32 {
    if shift <= 0 {
        return value;
    }
    let mask = (1i64 << shift) - 1;
    let remainder = value as i64 & mask;
    let threshold = (mask >> 1) + i64::from(value < 0);
    ((value as i64 >> shift) + i64::from(remainder > threshold)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_generic_over_three_cells() {
        let a = [1.0f32, 9.0];
        let b = [5.0f32, 2.0];
        let c = [3.0f32, 4.0];
        let ptrs = [a.as_ptr(), b.as_ptr(), c.as_ptr()];
        let mut out = [0.0f32; 2];

        unsafe { max_generic(3, 3, 2, ptrs.as_ptr(), out.as_mut_ptr()) };
        assert_eq!(out, [5.0, 9.0]);
    }

    #[test]
    fn test_avg_generic_uses_the_given_divisor() {
        let a = [2.0f32];
        let b = [4.0f32];
        let ptrs = [a.as_ptr(), b.as_ptr()];
        let mut out = [0.0f32];

        // Two valid cells but a divisor of 4 (include-padding policy)
        unsafe { avg_generic(4, 2, 1, ptrs.as_ptr(), out.as_mut_ptr()) };
        assert_eq!(out, [1.5]);
    }

    #[test]
    fn test_rounding_right_shift() {
        assert_eq!(rounding_right_shift(5, 1), 3); // 2.5 rounds away
        assert_eq!(rounding_right_shift(4, 1), 2);
        assert_eq!(rounding_right_shift(-5, 1), -3);
        assert_eq!(rounding_right_shift(7, 2), 2); // 1.75 rounds to 2
        assert_eq!(rounding_right_shift(100, 0), 100);
    }

    #[test]
    fn test_doubling_high_mul_identity() {
        // (v << 1) * 2^30 / 2^31 == v
        for v in [-1000, -1, 0, 1, 12345] {
            assert_eq!(saturating_rounding_doubling_high_mul(v << 1, 1 << 30), v);
        }
        assert_eq!(
            saturating_rounding_doubling_high_mul(i32::MIN, i32::MIN),
            i32::MAX
        );
    }

    #[test]
    fn test_requantize_identity_params() {
        let qp = Requantize32::identity();
        assert_eq!(requantize(0, &qp), 0);
        assert_eq!(requantize(200, &qp), 200);
        assert_eq!(requantize(300, &qp), 255);
        assert_eq!(requantize(-5, &qp), 0);
    }

    #[test]
    fn test_q8_avg_rounds_to_nearest() {
        let a = [1u8];
        let b = [2u8];
        let ptrs = [a.as_ptr(), b.as_ptr()];
        let mut out = [0u8];
        let qp = Requantize32::identity();

        // (1 + 2 + 1) / 2 = 2 after rounding
        unsafe { avg_generic_q8(2, 2, 1, ptrs.as_ptr(), out.as_mut_ptr(), &qp) };
        assert_eq!(out, [2]);
    }

    #[test]
    fn test_q8_max_applies_offsets() {
        let a = [10u8];
        let b = [40u8];
        let ptrs = [a.as_ptr(), b.as_ptr()];
        let mut out = [0u8];
        let qp = Requantize32 {
            input_offset: -5,
            output_offset: 3,
            ..Requantize32::identity()
        };

        // max(10, 40) - 5, then +3 on the way out
        unsafe { max_generic_q8(2, 2, 1, ptrs.as_ptr(), out.as_mut_ptr(), &qp) };
        assert_eq!(out, [38]);
    }
}
