//! CPU capability probe.
//!
//! The build script selects the base ISA the crate is compiled for (`neon`,
//! `avx2`, `sse` or `fallback` cfg flags); this module adds the runtime side:
//! features the host may expose beyond the compile-time baseline, such as SVE
//! on AArch64. Strategy-table predicates key on a [`CpuInfo`] value, so tests
//! can construct arbitrary capability masks without caring about the host.

/// Capability mask consumed by kernel-selection predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuInfo {
    neon: bool,
    sve: bool,
    sve2: bool,
    sme2: bool,
    avx2: bool,
    fp16: bool,
}

impl CpuInfo {
    /// Probes the host CPU.
    pub fn detect() -> Self {
        let mut info = CpuInfo::default();

        #[cfg(target_arch = "aarch64")]
        {
            info.neon = std::arch::is_aarch64_feature_detected!("neon");
            info.sve = std::arch::is_aarch64_feature_detected!("sve");
            info.sve2 = std::arch::is_aarch64_feature_detected!("sve2");
            info.fp16 = std::arch::is_aarch64_feature_detected!("fp16");
        }

        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            info.avx2 = std::arch::is_x86_feature_detected!("avx2");
        }

        info
    }

    /// The portable baseline: no optional feature available.
    pub fn none() -> Self {
        CpuInfo::default()
    }

    pub fn has_neon(&self) -> bool {
        self.neon
    }

    pub fn has_sve(&self) -> bool {
        self.sve
    }

    pub fn has_sve2(&self) -> bool {
        self.sve2
    }

    pub fn has_sme2(&self) -> bool {
        self.sme2
    }

    pub fn has_avx2(&self) -> bool {
        self.avx2
    }

    pub fn has_fp16(&self) -> bool {
        self.fp16
    }

    pub fn with_neon(mut self, enabled: bool) -> Self {
        self.neon = enabled;
        self
    }

    pub fn with_sve(mut self, enabled: bool) -> Self {
        self.sve = enabled;
        self
    }

    pub fn with_sme2(mut self, enabled: bool) -> Self {
        self.sme2 = enabled;
        self
    }

    pub fn with_avx2(mut self, enabled: bool) -> Self {
        self.avx2 = enabled;
        self
    }

    /// How many worker threads the scheduler should use by default.
    pub fn num_threads_hint(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_has_nothing() {
        let info = CpuInfo::none();
        assert!(!info.has_neon());
        assert!(!info.has_sve());
        assert!(!info.has_sme2());
        assert!(!info.has_avx2());
    }

    #[test]
    fn test_builders_set_single_features() {
        let info = CpuInfo::none().with_neon(true).with_sve(true);
        assert!(info.has_neon());
        assert!(info.has_sve());
        assert!(!info.has_sme2());
    }

    #[test]
    fn test_detect_does_not_panic() {
        let info = CpuInfo::detect();
        assert!(info.num_threads_hint() >= 1);
    }
}
