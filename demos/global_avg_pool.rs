//! Global average pooling over an NHWC ndarray, the usual classifier-head
//! reduction.
//!
//! ```bash
//! cargo run --example global_avg_pool
//! ```

use ndarray::Array4;

use slidely::pooling::operator::{pool2d, PoolInfo};
use slidely::pooling::PoolType;
use slidely::CpuInfo;

fn main() {
    let cpu = CpuInfo::detect();
    let input = Array4::from_shape_fn((2, 7, 7, 16), |(b, r, c, ch)| {
        (b + r + c) as f32 * 0.1 + ch as f32
    });

    let info = PoolInfo::global_pool(PoolType::Average);
    let output = pool2d(&input.view(), &info, &cpu).expect("global pooling is always supported");

    println!("input  shape: {:?}", input.dim());
    println!("output shape: {:?}", output.dim());
    println!(
        "batch 0, channels 0..4: {:?}",
        (0..4).map(|ch| output[(0, 0, 0, ch)]).collect::<Vec<_>>()
    );
}
