//! The two-method GPU plugin boundary.
//!
//! No vendor-specific type (CUPTI, rocprofiler) crosses into this crate.
//! An external collaborator implements [`GpuPlugin`] against its own
//! vendor SDK and registers one instance with
//! [`crate::collector::GpuSampleCollector::install`].

/// Accumulated GPU time, folded into the owning process's macrosample at
/// region boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuMeasurements {
    /// Time spent executing kernels that did no useful overlapping work
    /// with a memory transfer (ns).
    pub useful_ns: i64,
    /// Time spent in memory transfers not overlapped by kernel execution
    /// (ns).
    pub communication_ns: i64,
    /// Time the device sat idle between GPU activity (ns), when the
    /// plugin is able to report it; zero otherwise.
    pub inactive_ns: i64,
}

impl GpuMeasurements {
    /// Fold `other` into `self` and reset `other` to zero, mirroring
    /// `flush_gpu_sample_to_macrosample`'s reset-after-read.
    pub fn drain_into(&mut self, other: &mut GpuMeasurements) {
        self.useful_ns += other.useful_ns;
        self.communication_ns += other.communication_ns;
        self.inactive_ns += other.inactive_ns;
        *other = GpuMeasurements::default();
    }
}

/// Opaque CPU affinity mask handed back by a plugin, if it can report one
/// (some GPU runtimes bind a preferred NUMA node per device).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuAffinity(pub Vec<u32>);

/// Boundary a GPU-vendor plugin implements.
///
/// `update_sample` is called from the collector's flush path and should
/// fold whatever the vendor SDK has measured since the last call into
/// `out`, using `out`'s existing values as a running total (i.e. add, don't
/// overwrite). `affinity` is queried once at plugin installation.
pub trait GpuPlugin: Send + Sync {
    /// Add this plugin's measurements since the last call into `out`.
    fn update_sample(&self, out: &mut GpuMeasurements);

    /// Preferred CPU affinity for the device(s) this plugin manages, if
    /// the vendor SDK can report one.
    fn affinity(&self) -> Option<CpuAffinity> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPlugin {
        sample: GpuMeasurements,
    }

    impl GpuPlugin for FixedPlugin {
        fn update_sample(&self, out: &mut GpuMeasurements) {
            out.useful_ns += self.sample.useful_ns;
            out.communication_ns += self.sample.communication_ns;
            out.inactive_ns += self.sample.inactive_ns;
        }
    }

    #[test]
    fn plugin_adds_into_existing_measurements() {
        let plugin = FixedPlugin {
            sample: GpuMeasurements {
                useful_ns: 100,
                communication_ns: 50,
                inactive_ns: 0,
            },
        };
        let mut out = GpuMeasurements {
            useful_ns: 10,
            ..Default::default()
        };
        plugin.update_sample(&mut out);
        assert_eq!(out.useful_ns, 110);
        assert_eq!(out.communication_ns, 50);
    }

    #[test]
    fn drain_into_resets_the_source() {
        let mut total = GpuMeasurements::default();
        let mut delta = GpuMeasurements {
            useful_ns: 5,
            communication_ns: 3,
            inactive_ns: 1,
        };
        total.drain_into(&mut delta);
        assert_eq!(total.useful_ns, 5);
        assert_eq!(delta, GpuMeasurements::default());
    }

    #[test]
    fn default_affinity_is_none() {
        struct NoAffinityPlugin;
        impl GpuPlugin for NoAffinityPlugin {
            fn update_sample(&self, _out: &mut GpuMeasurements) {}
        }
        assert_eq!(NoAffinityPlugin.affinity(), None);
    }
}
