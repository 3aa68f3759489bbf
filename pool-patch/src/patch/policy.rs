//! Pool sizing rules.
//!
//! The CPU pool default is replaced outright by a share of installed RAM
//! (rounded down to whole GiB first). The GPU pool default is only ever raised,
//! with 512MiB assumed when video memory can't be read or reads too low.

use super::probe::ResourceProbe;
use crate::options::FractionSource;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Assumed video memory when the adapter can't be queried
pub const MIN_GPU_POOL: u64 = 512 * 1024 * 1024;

pub const CPU_POOL_NAME: &str = "PoolCPU";
pub const GPU_POOL_NAME: &str = "PoolGPU";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Cpu,
    Gpu,
    Other,
}

impl PoolKind {
    /// Exact, case sensitive name match
    pub fn from_name(name: &str) -> Self {
        match name {
            CPU_POOL_NAME => Self::Cpu,
            GPU_POOL_NAME => Self::Gpu,
            _ => Self::Other,
        }
    }
}

fn as_gib(bytes: u64) -> f64 {
    bytes as f64 / GIB as f64
}

/// Stateless: the same probe results and fractions always give the same size.
#[derive(Debug, Clone)]
pub struct PoolSizePolicy<P, O> {
    probe: P,
    options: O,
}

impl<P: ResourceProbe, O: FractionSource> PoolSizePolicy<P, O> {
    pub fn new(probe: P, options: O) -> Self {
        Self { probe, options }
    }

    /// Size to request for pool `name` given the host's `default_size`
    pub fn adjust_size(&self, name: &str, default_size: u64) -> u64 {
        match PoolKind::from_name(name) {
            PoolKind::Cpu => self.cpu_pool_size(default_size),
            PoolKind::Gpu => self.gpu_pool_size(default_size),
            PoolKind::Other => default_size,
        }
    }

    fn cpu_pool_size(&self, default_size: u64) -> u64 {
        let installed = self.probe.cpu_memory_bytes();

        if installed == 0 {
            log::debug!("{}: RAM unknown, keeping {} bytes", CPU_POOL_NAME, default_size);
            return default_size;
        }

        let fraction = self.options.fractions().cpu;
        let installed_gib = installed / GIB;
        let size = (installed_gib as f32 * fraction * GIB as f32) as u64;

        log::info!(
            "CPU RAM: {}GB, using {:.2}GB, fraction: {}",
            installed_gib,
            as_gib(size),
            fraction
        );

        size
    }

    fn gpu_pool_size(&self, default_size: u64) -> u64 {
        let fraction = self.options.fractions().gpu;
        let reported = (self.probe.gpu_memory_bytes() as f64 * fraction as f64) as u64;
        let detected = reported.max(MIN_GPU_POOL);
        let size = default_size.max(detected);

        log::info!(
            "GPU VRAM: {:.2}GB, using {:.2}GB, fraction: {}",
            as_gib(detected),
            as_gib(size),
            fraction
        );

        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Fractions;

    const MIB: u64 = 1024 * 1024;

    struct Scripted {
        cpu: u64,
        gpu: u64,
    }

    impl ResourceProbe for Scripted {
        fn cpu_memory_bytes(&self) -> u64 {
            self.cpu
        }

        fn gpu_memory_bytes(&self) -> u64 {
            self.gpu
        }
    }

    fn policy(cpu: u64, gpu: u64, fractions: Fractions) -> PoolSizePolicy<Scripted, Fractions> {
        PoolSizePolicy::new(Scripted { cpu, gpu }, fractions)
    }

    fn half() -> Fractions {
        Fractions { cpu: 0.5, gpu: 0.5 }
    }

    #[test]
    fn test_cpu_pool_is_share_of_installed_ram() {
        let policy = policy(16 * GIB, 0, half());

        for default in [0, 1, 2 * GIB, 64 * GIB] {
            assert_eq!(policy.adjust_size(CPU_POOL_NAME, default), 8_589_934_592);
        }
    }

    #[test]
    fn test_cpu_ram_rounds_down_to_whole_gib() {
        // 15.9GiB reported counts as 15GiB
        let policy = policy(16 * GIB - 100 * MIB, 0, half());
        assert_eq!(policy.adjust_size(CPU_POOL_NAME, 0), 15 * GIB / 2);
    }

    #[test]
    fn test_cpu_pool_may_shrink_below_default() {
        let policy = policy(4 * GIB, 0, Fractions { cpu: 0.25, gpu: 1.0 });
        assert_eq!(policy.adjust_size(CPU_POOL_NAME, 3 * GIB), GIB);
    }

    #[test]
    fn test_cpu_share_rounds_in_single_precision() {
        let policy = policy(7 * GIB, 0, Fractions { cpu: 0.3, gpu: 1.0 });
        assert_eq!(policy.adjust_size(CPU_POOL_NAME, 0), 2_254_857_984);
    }

    #[test]
    fn test_cpu_probe_failure_keeps_default() {
        let policy = policy(0, 8 * GIB, half());
        assert_eq!(policy.adjust_size(CPU_POOL_NAME, 1234), 1234);
    }

    #[test]
    fn test_gpu_probe_failure_uses_floor() {
        let policy = policy(16 * GIB, 0, half());
        assert_eq!(policy.adjust_size(GPU_POOL_NAME, 256 * MIB), 512 * MIB);
    }

    #[test]
    fn test_gpu_pool_uses_share_of_vram() {
        let policy = policy(16 * GIB, 4 * GIB, half());
        assert_eq!(policy.adjust_size(GPU_POOL_NAME, GIB), 2 * GIB);
    }

    #[test]
    fn test_gpu_pool_never_goes_below_default() {
        let policy = policy(16 * GIB, 4 * GIB, half());
        assert_eq!(policy.adjust_size(GPU_POOL_NAME, 3 * GIB), 3 * GIB);
    }

    #[test]
    fn test_gpu_low_report_uses_floor() {
        let policy = policy(16 * GIB, 128 * MIB, Fractions { cpu: 0.5, gpu: 1.0 });
        assert_eq!(policy.adjust_size(GPU_POOL_NAME, 0), MIN_GPU_POOL);
    }

    #[test]
    fn test_other_pools_pass_through() {
        let policy = policy(16 * GIB, 4 * GIB, half());

        for default in [0, 1, 777, GIB, u64::MAX] {
            assert_eq!(policy.adjust_size("PoolOther", default), default);
            assert_eq!(policy.adjust_size("poolcpu", default), default);
            assert_eq!(policy.adjust_size("", default), default);
        }
    }

    #[test]
    fn test_same_inputs_same_output() {
        let policy = policy(32 * GIB, 8 * GIB, Fractions { cpu: 0.6, gpu: 0.9 });

        for name in [CPU_POOL_NAME, GPU_POOL_NAME, "PoolOther"] {
            let first = policy.adjust_size(name, GIB);
            let second = policy.adjust_size(name, GIB);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_pool_kind() {
        assert_eq!(PoolKind::from_name("PoolCPU"), PoolKind::Cpu);
        assert_eq!(PoolKind::from_name("PoolGPU"), PoolKind::Gpu);
        assert_eq!(PoolKind::from_name("PoolCPU "), PoolKind::Other);
    }
}
