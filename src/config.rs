/// Runtime configuration for the folder decode engine.
///
/// Passed by reference; never a global. A folder classifier consults it to
/// decide whether otherwise-supported methods should be treated as
/// [`Unsupported`](crate::Error::Unsupported).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Enables PPMd decoding. Even when the `ppmd` Cargo feature is
    /// compiled in, a folder using PPMd is rejected unless this is `true`.
    pub ppmd_support: bool,
    /// Enables LZMA2 decoding.
    pub lzma2_support: bool,
    /// Enables the branch filter family (BCJ/ARM/ARM64/ARMT/PPC/IA64/SPARC/
    /// RISC-V). When `false`, only Delta passes the classifier.
    pub filters_enabled: bool,
    /// Gate for ARM64/ARMT filter code paths when cross-compiled for a
    /// target that cannot exercise native alignment assumptions.
    pub native_arm_filters: bool,
    /// Upper bound, in KiB, on the memory a single primitive decoder may
    /// request (LZMA2 dictionary, PPMd model). Exceeding it is
    /// [`OutOfMemory`](crate::Error::OutOfMemory).
    pub max_mem_limit_kb: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ppmd_support: false,
            lzma2_support: true,
            filters_enabled: true,
            native_arm_filters: true,
            max_mem_limit_kb: crate::reader::MAX_MEM_LIMIT_KB,
        }
    }
}
