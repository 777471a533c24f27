//! The kernel-selection table.
//!
//! One prioritized, `static` list of named strategies per element type; each
//! entry is a plain data record: a capability/geometry predicate, a coarse
//! cost estimate and a factory. The first matching entry wins, so order
//! encodes priority — the most specific/fastest specializations come before
//! the generic fallbacks. Entries for ISA-specific kernels exist only in
//! builds targeting that ISA and are additionally guarded by the runtime
//! capability mask in the arguments.

use std::sync::OnceLock;

use tracing::{debug, trace};

use crate::error::{configuration_error, unsupported_configuration};
use crate::tensor::DataType;

use super::direct::{DirectStrategy, PoolingDepthfirst};
use super::generic::{GenericKernel, PoolingDepthfirstGeneric};
use super::kernels::scalar;
use super::strategy::{PoolElement, PoolingCommon};
use super::{OutputStage, PoolType, PoolingArgs, Requantize32};

/// How an entry drives the depthfirst framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingMethod {
    /// Native-tile kernel behind [`PoolingDepthfirst`].
    Depthfirst,
    /// Any-geometry kernel behind [`PoolingDepthfirstGeneric`].
    DepthfirstGeneric,
}

/// One named, capability-guarded strategy.
#[derive(Clone, Copy)]
pub struct PoolingImplementation<T: PoolElement> {
    pub method: PoolingMethod,
    pub name: &'static str,
    pub is_supported: fn(&PoolingArgs, &OutputStage) -> bool,
    pub cycle_estimate: fn(&PoolingArgs, &OutputStage) -> u64,
    pub initialise: fn(&PoolingArgs, &OutputStage) -> Box<dyn PoolingCommon<T>>,
}

/// Element types that have a selection table.
pub trait TableElement: PoolElement {
    fn implementations() -> &'static [PoolingImplementation<Self>]
    where
        Self: Sized;
}

/// Linear scan honoring the config filter; first match wins.
fn scan<'a, T: PoolElement>(
    table: &'a [PoolingImplementation<T>],
    args: &PoolingArgs,
    output_stage: &OutputStage,
) -> Option<&'a PoolingImplementation<T>> {
    let filter = args.config.filter.as_deref();
    table.iter().find(|imp| {
        if let Some(filter) = filter {
            if !imp.name.contains(filter) {
                return false;
            }
        }
        let supported = (imp.is_supported)(args, output_stage);
        if !supported {
            trace!(name = imp.name, "pooling strategy rejected");
        }
        supported
    })
}

/// Finds the highest-priority strategy supporting this configuration, or
/// `None` when the operation is unsupported on this hardware.
pub fn find_implementation<T: TableElement>(
    args: &PoolingArgs,
    output_stage: &OutputStage,
) -> Option<&'static PoolingImplementation<T>> {
    let selected = scan(T::implementations(), args, output_stage);
    if let Some(imp) = selected {
        debug!(name = imp.name, "pooling strategy selected");
    }
    selected
}

/// Builds a configured operator for this configuration, or `None` when no
/// table entry matches.
pub fn pooling<T: TableElement>(
    args: &PoolingArgs,
    output_stage: &OutputStage,
) -> Option<Box<dyn PoolingCommon<T>>> {
    find_implementation::<T>(args, output_stage).map(|imp| (imp.initialise)(args, output_stage))
}

/// Side-effect-free validation: geometry, output-stage/data-type pairing,
/// and a strategy-table match. Callable before committing any resources.
pub fn validate<T: TableElement>(args: &PoolingArgs, output_stage: &OutputStage) -> crate::Result<()> {
    args.validate_geometry()?;

    match (T::DATA_TYPE, output_stage) {
        (DataType::F32, OutputStage::Nothing) => {}
        (DataType::Q8, OutputStage::Requantize32(_)) => {}
        (DataType::F32, OutputStage::Requantize32(_)) => {
            return Err(configuration_error(
                "requantization output stage is only valid for quantized data",
            ));
        }
        (DataType::Q8, OutputStage::Nothing) => {
            return Err(configuration_error(
                "quantized pooling requires a requantization output stage",
            ));
        }
    }

    if find_implementation::<T>(args, output_stage).is_none() {
        return Err(unsupported_configuration(format!(
            "no matching kernel for {:?} pooling, window {}x{}, stride {}x{} on this hardware",
            args.pool_type,
            args.pool_window.rows,
            args.pool_window.cols,
            args.pool_stride.rows,
            args.pool_stride.cols,
        )));
    }
    Ok(())
}

fn naive_cost(args: &PoolingArgs) -> u64 {
    (args.n_batches * args.output_rows * args.output_cols * args.n_channels) as u64
        * (args.pool_window.rows * args.pool_window.cols) as u64
}

fn is_max_2x2_s1(args: &PoolingArgs, output_stage: &OutputStage) -> bool {
    matches!(output_stage, OutputStage::Nothing)
        && args.pool_type == PoolType::Max
        && args.pool_window.rows == 2
        && args.pool_window.cols == 2
        && args.pool_stride.rows == 1
        && args.pool_stride.cols == 1
}

fn is_max(args: &PoolingArgs, output_stage: &OutputStage) -> bool {
    matches!(output_stage, OutputStage::Nothing) && args.pool_type == PoolType::Max
}

fn is_avg(args: &PoolingArgs, output_stage: &OutputStage) -> bool {
    matches!(output_stage, OutputStage::Nothing) && args.pool_type == PoolType::Average
}

fn requant_params(output_stage: &OutputStage) -> Requantize32 {
    match output_stage {
        OutputStage::Requantize32(qp) => *qp,
        // Unreachable through the table: every q8 predicate demands a
        // requantize stage
        OutputStage::Nothing => Requantize32::identity(),
    }
}

fn max_2x2_strategy(kernel: super::kernels::DirectKernelFn<f32>) -> DirectStrategy<f32> {
    DirectStrategy {
        window_rows: 2,
        window_cols: 2,
        stride_rows: 1,
        stride_cols: 1,
        out_rows: 2,
        out_cols: 2,
        kernel,
    }
}

fn init_scalar_max_2x2(args: &PoolingArgs, _os: &OutputStage) -> Box<dyn PoolingCommon<f32>> {
    Box::new(PoolingDepthfirst::new(
        args,
        max_2x2_strategy(scalar::max_2x2_s1_direct::<f32>),
    ))
}

fn init_scalar_max_generic(args: &PoolingArgs, _os: &OutputStage) -> Box<dyn PoolingCommon<f32>> {
    Box::new(PoolingDepthfirstGeneric::new(
        args,
        GenericKernel::Plain(scalar::max_generic::<f32>),
    ))
}

fn init_scalar_avg_generic(args: &PoolingArgs, _os: &OutputStage) -> Box<dyn PoolingCommon<f32>> {
    Box::new(PoolingDepthfirstGeneric::new(
        args,
        GenericKernel::Plain(scalar::avg_generic::<f32>),
    ))
}

impl TableElement for f32 {
    fn implementations() -> &'static [PoolingImplementation<f32>] {
        static TABLE: OnceLock<Vec<PoolingImplementation<f32>>> = OnceLock::new();
        TABLE.get_or_init(|| {
            let mut table = Vec::new();

            #[cfg(all(neon, target_arch = "aarch64"))]
            {
                use super::kernels::neon;

                fn is_max_2x2_s1_neon(args: &PoolingArgs, os: &OutputStage) -> bool {
                    args.cpu_info.has_neon() && is_max_2x2_s1(args, os)
                }
                fn is_max_neon(args: &PoolingArgs, os: &OutputStage) -> bool {
                    args.cpu_info.has_neon() && is_max(args, os)
                }
                fn is_avg_neon(args: &PoolingArgs, os: &OutputStage) -> bool {
                    args.cpu_info.has_neon() && is_avg(args, os)
                }
                fn init_neon_max_2x2(
                    args: &PoolingArgs,
                    _os: &OutputStage,
                ) -> Box<dyn PoolingCommon<f32>> {
                    Box::new(PoolingDepthfirst::new(
                        args,
                        max_2x2_strategy(neon::max_2x2_s1_direct_f32),
                    ))
                }
                fn init_neon_max_generic(
                    args: &PoolingArgs,
                    _os: &OutputStage,
                ) -> Box<dyn PoolingCommon<f32>> {
                    Box::new(PoolingDepthfirstGeneric::new(
                        args,
                        GenericKernel::Plain(neon::max_generic_f32),
                    ))
                }
                fn init_neon_avg_generic(
                    args: &PoolingArgs,
                    _os: &OutputStage,
                ) -> Box<dyn PoolingCommon<f32>> {
                    Box::new(PoolingDepthfirstGeneric::new(
                        args,
                        GenericKernel::Plain(neon::avg_generic_f32),
                    ))
                }

                table.push(PoolingImplementation {
                    method: PoolingMethod::Depthfirst,
                    name: "neon_fp32_nhwc_max_2x2_s1_output2x2_depthfirst",
                    is_supported: is_max_2x2_s1_neon,
                    cycle_estimate: |args, _| naive_cost(args) / 16,
                    initialise: init_neon_max_2x2,
                });
                table.push(PoolingImplementation {
                    method: PoolingMethod::DepthfirstGeneric,
                    name: "neon_fp32_nhwc_max_generic_depthfirst",
                    is_supported: is_max_neon,
                    cycle_estimate: |args, _| naive_cost(args) / 4,
                    initialise: init_neon_max_generic,
                });
                table.push(PoolingImplementation {
                    method: PoolingMethod::DepthfirstGeneric,
                    name: "neon_fp32_nhwc_avg_generic_depthfirst",
                    is_supported: is_avg_neon,
                    cycle_estimate: |args, _| naive_cost(args) / 4,
                    initialise: init_neon_avg_generic,
                });
            }

            #[cfg(all(avx2, target_arch = "x86_64"))]
            {
                use super::kernels::avx2;

                fn is_max_2x2_s1_avx2(args: &PoolingArgs, os: &OutputStage) -> bool {
                    args.cpu_info.has_avx2() && is_max_2x2_s1(args, os)
                }
                fn is_max_avx2(args: &PoolingArgs, os: &OutputStage) -> bool {
                    args.cpu_info.has_avx2() && is_max(args, os)
                }
                fn is_avg_avx2(args: &PoolingArgs, os: &OutputStage) -> bool {
                    args.cpu_info.has_avx2() && is_avg(args, os)
                }
                fn init_avx2_max_2x2(
                    args: &PoolingArgs,
                    _os: &OutputStage,
                ) -> Box<dyn PoolingCommon<f32>> {
                    Box::new(PoolingDepthfirst::new(
                        args,
                        max_2x2_strategy(avx2::max_2x2_s1_direct_f32),
                    ))
                }
                fn init_avx2_max_generic(
                    args: &PoolingArgs,
                    _os: &OutputStage,
                ) -> Box<dyn PoolingCommon<f32>> {
                    Box::new(PoolingDepthfirstGeneric::new(
                        args,
                        GenericKernel::Plain(avx2::max_generic_f32),
                    ))
                }
                fn init_avx2_avg_generic(
                    args: &PoolingArgs,
                    _os: &OutputStage,
                ) -> Box<dyn PoolingCommon<f32>> {
                    Box::new(PoolingDepthfirstGeneric::new(
                        args,
                        GenericKernel::Plain(avx2::avg_generic_f32),
                    ))
                }

                table.push(PoolingImplementation {
                    method: PoolingMethod::Depthfirst,
                    name: "avx2_fp32_nhwc_max_2x2_s1_output2x2_depthfirst",
                    is_supported: is_max_2x2_s1_avx2,
                    cycle_estimate: |args, _| naive_cost(args) / 32,
                    initialise: init_avx2_max_2x2,
                });
                table.push(PoolingImplementation {
                    method: PoolingMethod::DepthfirstGeneric,
                    name: "avx2_fp32_nhwc_max_generic_depthfirst",
                    is_supported: is_max_avx2,
                    cycle_estimate: |args, _| naive_cost(args) / 8,
                    initialise: init_avx2_max_generic,
                });
                table.push(PoolingImplementation {
                    method: PoolingMethod::DepthfirstGeneric,
                    name: "avx2_fp32_nhwc_avg_generic_depthfirst",
                    is_supported: is_avg_avx2,
                    cycle_estimate: |args, _| naive_cost(args) / 8,
                    initialise: init_avx2_avg_generic,
                });
            }

            table.push(PoolingImplementation {
                method: PoolingMethod::Depthfirst,
                name: "fallback_fp32_nhwc_max_2x2_s1_output2x2_depthfirst",
                is_supported: is_max_2x2_s1,
                cycle_estimate: |args, _| naive_cost(args) / 2,
                initialise: init_scalar_max_2x2,
            });
            table.push(PoolingImplementation {
                method: PoolingMethod::DepthfirstGeneric,
                name: "fallback_fp32_nhwc_max_generic_depthfirst",
                is_supported: is_max,
                cycle_estimate: |args, _| naive_cost(args),
                initialise: init_scalar_max_generic,
            });
            table.push(PoolingImplementation {
                method: PoolingMethod::DepthfirstGeneric,
                name: "fallback_fp32_nhwc_avg_generic_depthfirst",
                is_supported: is_avg,
                cycle_estimate: |args, _| naive_cost(args),
                initialise: init_scalar_avg_generic,
            });

            table
        })
    }
}

fn is_max_q8(args: &PoolingArgs, output_stage: &OutputStage) -> bool {
    matches!(output_stage, OutputStage::Requantize32(_)) && args.pool_type == PoolType::Max
}

fn is_avg_q8(args: &PoolingArgs, output_stage: &OutputStage) -> bool {
    matches!(output_stage, OutputStage::Requantize32(_)) && args.pool_type == PoolType::Average
}

fn init_scalar_max_q8(args: &PoolingArgs, os: &OutputStage) -> Box<dyn PoolingCommon<u8>> {
    Box::new(PoolingDepthfirstGeneric::new(
        args,
        GenericKernel::Requant(scalar::max_generic_q8, requant_params(os)),
    ))
}

fn init_scalar_avg_q8(args: &PoolingArgs, os: &OutputStage) -> Box<dyn PoolingCommon<u8>> {
    Box::new(PoolingDepthfirstGeneric::new(
        args,
        GenericKernel::Requant(scalar::avg_generic_q8, requant_params(os)),
    ))
}

impl TableElement for u8 {
    fn implementations() -> &'static [PoolingImplementation<u8>] {
        static TABLE: OnceLock<Vec<PoolingImplementation<u8>>> = OnceLock::new();
        TABLE.get_or_init(|| {
            vec![
                PoolingImplementation {
                    method: PoolingMethod::DepthfirstGeneric,
                    name: "fallback_u8q_nhwc_max_generic_depthfirst",
                    is_supported: is_max_q8,
                    cycle_estimate: |args, _| naive_cost(args),
                    initialise: init_scalar_max_q8,
                },
                PoolingImplementation {
                    method: PoolingMethod::DepthfirstGeneric,
                    name: "fallback_u8q_nhwc_avg_generic_depthfirst",
                    is_supported: is_avg_q8,
                    cycle_estimate: |args, _| naive_cost(args),
                    initialise: init_scalar_avg_q8,
                },
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuInfo;
    use crate::pooling::{PaddingValues, PoolingConfig, PoolingStride, PoolingWindow};

    fn args(pool_type: PoolType, window: usize, stride: usize) -> PoolingArgs {
        PoolingArgs::new(
            &CpuInfo::none(),
            pool_type,
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
            PaddingValues::default(),
            PoolingConfig::default(),
        )
    }

    #[test]
    fn test_selection_is_deterministic() {
        let args = args(PoolType::Max, 3, 2);
        let os = OutputStage::Nothing;
        let first = find_implementation::<f32>(&args, &os).map(|i| i.name);
        let second = find_implementation::<f32>(&args, &os).map(|i| i.name);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_order_encodes_priority() {
        // Two entries whose predicates both match: whichever is listed
        // first must win
        fn yes(_: &PoolingArgs, _: &OutputStage) -> bool {
            true
        }
        fn cost(_: &PoolingArgs, _: &OutputStage) -> u64 {
            1
        }
        let a = PoolingImplementation::<f32> {
            method: PoolingMethod::DepthfirstGeneric,
            name: "a",
            is_supported: yes,
            cycle_estimate: cost,
            initialise: init_scalar_max_generic,
        };
        let b = PoolingImplementation::<f32> {
            method: PoolingMethod::DepthfirstGeneric,
            name: "b",
            is_supported: yes,
            cycle_estimate: cost,
            initialise: init_scalar_max_generic,
        };

        let args = args(PoolType::Max, 3, 1);
        let os = OutputStage::Nothing;

        let forward = [a, b];
        assert_eq!(scan(&forward, &args, &os).map(|i| i.name), Some("a"));
        let reversed = [forward[1], forward[0]];
        assert_eq!(scan(&reversed, &args, &os).map(|i| i.name), Some("b"));
    }

    #[test]
    fn test_filter_overrides_priority() {
        let mut args = args(PoolType::Max, 2, 1);
        let os = OutputStage::Nothing;

        // Without a filter the specialized 2x2 entry wins
        let selected = find_implementation::<f32>(&args, &os).map(|i| i.name);
        assert!(selected.is_some_and(|name| name.contains("max_2x2_s1")));

        // The ops-level filter forces the generic kernel
        args.config.filter = Some("generic".to_string());
        let selected = find_implementation::<f32>(&args, &os).map(|i| i.name);
        assert!(selected.is_some_and(|name| name.contains("max_generic")));
    }

    #[test]
    fn test_avg_selects_average_kernel() {
        let args = args(PoolType::Average, 3, 1);
        let selected =
            find_implementation::<f32>(&args, &OutputStage::Nothing).map(|i| i.name);
        assert!(selected.is_some_and(|name| name.contains("avg_generic")));
    }

    #[test]
    fn test_no_match_yields_none_and_validate_reports_it() {
        // Quantized pooling without a requantize stage matches nothing
        let args = args(PoolType::Max, 3, 1);
        assert!(find_implementation::<u8>(&args, &OutputStage::Nothing).is_none());

        let err = validate::<u8>(&args, &OutputStage::Nothing).unwrap_err();
        let message = format!("{err}");
        assert!(message.contains("requantization"));

        // With the stage in place the same geometry validates
        let os = OutputStage::Requantize32(Requantize32::identity());
        assert!(validate::<u8>(&args, &os).is_ok());
    }

    #[test]
    fn test_cycle_estimates_rank_specializations_first() {
        let args = args(PoolType::Max, 2, 1);
        let os = OutputStage::Nothing;
        let table = <f32 as TableElement>::implementations();

        let selected = find_implementation::<f32>(&args, &os).unwrap();
        let generic = table
            .iter()
            .find(|i| i.name.contains("max_generic"))
            .unwrap();
        assert!((selected.cycle_estimate)(&args, &os) <= (generic.cycle_estimate)(&args, &os));
    }
}
