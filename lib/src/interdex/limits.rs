/// Distinct references of each kind a single dex can index (16-bit indices)
pub const FORMAT_REF_LIMIT: usize = 65536;

/// Per-dex reference and linear-alloc ceilings, as applied to admissions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RefLimits {
    pub method_refs: usize,
    pub field_refs: usize,
    pub type_refs: usize,
    pub linear_alloc: u64,
}

/// Headroom held back in every dex, for references added after packing
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservedRefs {
    pub fields: usize,
    pub types: usize,
    pub methods: usize,
}

/// Lower ceilings applying to apps which still run on older platform versions
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlatformRule {
    /// Rule applies when the minimum SDK is strictly below this
    pub below_min_sdk: u32,
    pub method_refs: usize,
    pub field_refs: usize,
    pub type_refs: usize,
}

/// Table of platform rules; when several apply, the lowest ceiling wins
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformPolicy {
    pub rules: Vec<PlatformRule>,
}

impl PlatformPolicy {
    /// No platform-specific ceilings at all
    pub fn unrestricted() -> PlatformPolicy {
        PlatformPolicy { rules: vec![] }
    }

    /// Ceilings `(method_refs, field_refs, type_refs)` for a minimum SDK, before reserves
    pub fn ceilings(&self, min_sdk: u32) -> (usize, usize, usize) {
        self.rules
            .iter()
            .filter(|rule| min_sdk < rule.below_min_sdk)
            .fold(
                (FORMAT_REF_LIMIT, FORMAT_REF_LIMIT, FORMAT_REF_LIMIT),
                |(methods, fields, types), rule| {
                    (
                        methods.min(rule.method_refs),
                        fields.min(rule.field_refs),
                        types.min(rule.type_refs),
                    )
                },
            )
    }
}

/// Pre-Lollipop verifiers can only deal with 15-bit type indices
impl Default for PlatformPolicy {
    fn default() -> Self {
        PlatformPolicy {
            rules: vec![PlatformRule {
                below_min_sdk: 21,
                method_refs: FORMAT_REF_LIMIT,
                field_refs: FORMAT_REF_LIMIT,
                type_refs: 1 << 15,
            }],
        }
    }
}

/// Settings for one packing run
///
/// Fixed once the [`super::PackingSequencer`] is constructed.
#[derive(Clone, Debug)]
pub struct PackerConfig {
    /// Linear-alloc budget of each dex, in bytes
    pub linear_alloc_limit: u64,

    /// References held back in every dex
    pub reserved: ReservedRefs,

    /// Oldest platform version the app runs on
    pub min_sdk: u32,

    /// Platform-dependent reference ceilings
    pub platform_policy: PlatformPolicy,

    /// Put every class into one dex, ignoring all budgets
    pub force_single_dex: bool,

    /// Add a `secondary/dexNN/Canary` marker class to each secondary dex
    pub emit_canaries: bool,

    /// Pack the primary dex classes under the usual budget checks
    ///
    /// Otherwise they are placed without checks, since the app can't start without them.
    pub normal_primary_dex: bool,
}

impl PackerConfig {
    pub const DEFAULT_LINEAR_ALLOC_LIMIT: u64 = 11600 * 1024;
    pub const DEFAULT_MIN_SDK: u32 = 21;

    pub fn new() -> PackerConfig {
        PackerConfig {
            linear_alloc_limit: Self::DEFAULT_LINEAR_ALLOC_LIMIT,
            reserved: ReservedRefs::default(),
            min_sdk: Self::DEFAULT_MIN_SDK,
            platform_policy: PlatformPolicy::default(),
            force_single_dex: false,
            emit_canaries: true,
            normal_primary_dex: false,
        }
    }
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self::new()
    }
}
