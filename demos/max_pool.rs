//! Runs a bordered 3x3/s2 max pool and prints which kernel the selection
//! table picked for this host.
//!
//! ```bash
//! cargo run --example max_pool
//! ```

use slidely::pooling::operator::{PoolInfo, PoolingOperator};
use slidely::pooling::{PaddingValues, PoolType};
use slidely::{CpuInfo, OutputStage};

fn main() {
    let cpu = CpuInfo::detect();
    let (rows, cols, channels) = (56usize, 56usize, 64usize);

    let info =
        PoolInfo::new(PoolType::Max, (3, 3), (2, 2)).with_padding(PaddingValues::uniform(1));
    let operator =
        PoolingOperator::<f32>::new(&cpu, &info, 1, rows, cols, channels, OutputStage::Nothing)
            .expect("3x3 max pooling is always supported");

    let input: Vec<f32> = (0..rows * cols * channels)
        .map(|x| ((x * 31) % 997) as f32 / 997.0)
        .collect();
    let (out_rows, out_cols) = operator.output_shape();
    let mut output = vec![0.0f32; out_rows * out_cols * channels];

    operator.run(&input, &mut output).expect("geometry checked");

    println!(
        "pooled {rows}x{cols}x{channels} -> {out_rows}x{out_cols}x{channels} using {}",
        operator.implementation_name()
    );
    println!("output[0][0][0..4] = {:?}", &output[..4]);
}
