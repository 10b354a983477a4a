use super::{
    estimate_linear_alloc, CapacityUnit, ClassRefs, PackerConfig, PendingInitClasses, RefLimits,
};
use crate::dex::class_graph::{ClassId, TypeId};
use crate::init_classes::SideEffectResolver;
use crate::Error;
use bitflags::bitflags;
use std::collections::HashSet;

bitflags! {
    /// What a sealed dex is for
    ///
    /// None of these affect admission; they are reported alongside the dex.
    pub struct DexInfo: u8 {
        /// First dex, loaded before everything else
        const PRIMARY = 0b0000001;

        /// Classes needed during app launch
        const COLDSTART = 0b0000010;

        /// Classes needed by background startup work
        const BACKGROUND = 0b0000100;

        /// Startup-adjacent classes, after the last coldstart dex
        const EXTENDED = 0b0001000;

        /// Classes needed for the first scroll
        const SCROLL = 0b0010000;

        /// Order comes from a usage profile rather than from declaration order
        const BETAMAP_ORDERED = 0b0100000;

        /// Classes compiled in a different mode than the rest
        const MIXED_MODE = 0b1000000;
    }
}

impl Default for DexInfo {
    fn default() -> Self {
        DexInfo::empty()
    }
}

/// How many dexes of each kind have been sealed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DexesInfo {
    pub num_dexes: usize,
    pub num_secondary_dexes: usize,
    pub num_coldstart_dexes: usize,
    pub num_extended_set_dexes: usize,
    pub num_scroll_dexes: usize,
    pub num_background_dexes: usize,
    pub num_mixed_mode_dexes: usize,
}

/// Totals over every admitted class, for reporting
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DexesStats {
    pub num_static_meths: usize,
    pub num_dmethods: usize,
    pub num_vmethods: usize,
    pub num_mrefs: usize,
    pub num_frefs: usize,
}

/// Fills dexes one after another
///
/// There is always exactly one open [`CapacityUnit`]. Classes are offered to it one at a time;
/// when one doesn't fit, the caller seals the unit with [`Self::end_dex`] (which opens a fresh
/// one) and offers the class again. A class may only ever be admitted once per run.
pub struct PackingSequencer<'a, 'g> {
    config: PackerConfig,
    resolver: Option<&'a SideEffectResolver<'a, 'g>>,
    current_dex: CapacityUnit<'g>,
    classes: HashSet<ClassId<'g>>,
    info: DexesInfo,
    stats: DexesStats,
}

impl<'a, 'g> PackingSequencer<'a, 'g> {
    /// New sequencer, with an empty open dex
    ///
    /// Without a resolver, init-class instructions never cost anything.
    pub fn new(
        config: PackerConfig,
        resolver: Option<&'a SideEffectResolver<'a, 'g>>,
    ) -> PackingSequencer<'a, 'g> {
        PackingSequencer {
            config,
            resolver,
            current_dex: CapacityUnit::new(),
            classes: HashSet::new(),
            info: DexesInfo::default(),
            stats: DexesStats::default(),
        }
    }

    pub fn config(&self) -> &PackerConfig {
        &self.config
    }

    pub fn get_method_refs_limit(&self) -> usize {
        let (methods, _, _) = self.config.platform_policy.ceilings(self.config.min_sdk);
        methods.saturating_sub(self.config.reserved.methods)
    }

    pub fn get_field_refs_limit(&self) -> usize {
        let (_, fields, _) = self.config.platform_policy.ceilings(self.config.min_sdk);
        fields.saturating_sub(self.config.reserved.fields)
    }

    pub fn get_type_refs_limit(&self) -> usize {
        let (_, _, types) = self.config.platform_policy.ceilings(self.config.min_sdk);
        types.saturating_sub(self.config.reserved.types)
    }

    /// Ceilings every admission is checked against
    pub fn limits(&self) -> RefLimits {
        RefLimits {
            method_refs: self.get_method_refs_limit(),
            field_refs: self.get_field_refs_limit(),
            type_refs: self.get_type_refs_limit(),
            linear_alloc: self.config.linear_alloc_limit,
        }
    }

    fn pending_init_classes(&self, refs: &ClassRefs<'g>) -> PendingInitClasses<'g> {
        match self.resolver {
            Some(resolver) => self.current_dex.resolve_init_classes(resolver, refs),
            None => PendingInitClasses::default(),
        }
    }

    fn check_not_added(&self, class: ClassId<'g>) -> Result<(), Error> {
        if self.classes.contains(&class) {
            return Err(Error::DuplicateClass(class.name().to_owned()));
        }
        Ok(())
    }

    /// Try to admit a class (with its references) into the open dex
    ///
    /// `Ok(false)` means the class doesn't fit and nothing changed.
    pub fn add_class_to_current_dex(
        &mut self,
        refs: &ClassRefs<'g>,
        class: ClassId<'g>,
    ) -> Result<bool, Error> {
        self.check_not_added(class)?;

        let pending = self.pending_init_classes(refs);
        let limits = self.limits();
        let size_cost = estimate_linear_alloc(class);
        if !self
            .current_dex
            .add_class_if_fits(refs, &pending, &limits, size_cost, class)
        {
            return Ok(false);
        }

        self.register(refs, class);
        Ok(true)
    }

    /// Admit a class into the open dex without checking any budget
    pub fn add_class_no_checks(
        &mut self,
        refs: &ClassRefs<'g>,
        class: ClassId<'g>,
    ) -> Result<(), Error> {
        self.check_not_added(class)?;

        let pending = self.pending_init_classes(refs);
        let size_cost = estimate_linear_alloc(class);
        self.current_dex
            .add_class_no_checks(refs, &pending, size_cost, class);
        self.register(refs, class);
        Ok(())
    }

    /// Reserve room in the open dex for references no admitted class accounts for
    pub fn add_refs_no_checks(&mut self, refs: &ClassRefs<'g>) {
        let pending = self.pending_init_classes(refs);
        self.current_dex.add_refs_no_checks(refs, &pending);
    }

    fn register(&mut self, refs: &ClassRefs<'g>, class: ClassId<'g>) {
        self.classes.insert(class);

        self.stats.num_static_meths += class
            .dmethods
            .iter()
            .filter(|method| method.is_static())
            .count();
        self.stats.num_dmethods += class.dmethods.len();
        self.stats.num_vmethods += class.vmethods.len();
        self.stats.num_mrefs += refs.methods.len();
        self.stats.num_frefs += refs.fields.len();
    }

    /// Seal the open dex and open a fresh one
    pub fn end_dex(&mut self, dex_info: DexInfo) -> Vec<ClassId<'g>> {
        let sealed = std::mem::take(&mut self.current_dex);
        log::info!(
            "Terminating dex {} ({:?}): {} classes, {} method refs, {} field refs, {} type refs, \
             {} bytes of linear alloc",
            self.info.num_dexes,
            dex_info,
            sealed.classes().len(),
            sealed.method_refs_count(),
            sealed.field_refs_count(),
            sealed.type_refs_count(),
            sealed.linear_alloc_size()
        );

        if self.info.num_dexes > 0 {
            self.info.num_secondary_dexes += 1;
        }
        self.info.num_dexes += 1;
        if dex_info.contains(DexInfo::COLDSTART) {
            self.info.num_coldstart_dexes += 1;
        }
        if dex_info.contains(DexInfo::EXTENDED) {
            self.info.num_extended_set_dexes += 1;
        }
        if dex_info.contains(DexInfo::SCROLL) {
            self.info.num_scroll_dexes += 1;
        }
        if dex_info.contains(DexInfo::BACKGROUND) {
            self.info.num_background_dexes += 1;
        }
        if dex_info.contains(DexInfo::MIXED_MODE) {
            self.info.num_mixed_mode_dexes += 1;
        }

        sealed.take_all_classes()
    }

    /// Has this class been admitted into any dex so far?
    pub fn has_class(&self, class: ClassId<'g>) -> bool {
        self.classes.contains(&class)
    }

    /// Is this type already referenced by the open dex?
    pub fn current_dex_has_tref(&self, ty: TypeId<'g>) -> bool {
        self.current_dex.has_type_ref(ty)
    }

    pub fn current_dex(&self) -> &CapacityUnit<'g> {
        &self.current_dex
    }

    pub fn current_dex_classes(&self) -> &[ClassId<'g>] {
        self.current_dex.classes()
    }

    /// Number of classes admitted so far, over all dexes
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn info(&self) -> &DexesInfo {
        &self.info
    }

    pub fn stats(&self) -> &DexesStats {
        &self.stats
    }
}
