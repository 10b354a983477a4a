use super::{ClassRefs, ClassRefsTable, DexInfo, PackingSequencer};
use crate::dex::class_graph::{ClassData, ClassGraph, ClassId};
use crate::dex::{BinaryName, ClassAccessFlags, Name};
use crate::Error;
use std::fmt;

/// Highest dex number a canary name can carry
pub const MAX_DEX_NUM: usize = 99;

const CANARY_PREFIX: &str = "secondary/dex";
const CANARY_CLASS_NAME: &str = "Canary";

/// One line of the startup class order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderEntry {
    Class(BinaryName),

    /// Seal the current dex here (the last marker also ends the coldstart set)
    DexEndMarker,
    ScrollStart,
    ScrollEnd,
    BackgroundStart,
    BackgroundEnd,
}

/// A sealed dex
pub struct PackedDex<'g> {
    /// Position in the output, starting at 0 with the primary dex
    pub ordinal: usize,
    pub info: DexInfo,

    /// Classes in the order they must be written out (canary included)
    pub classes: Vec<ClassId<'g>>,
    pub canary: Option<ClassId<'g>>,
}

/// Renders as a line of the secondary dex manifest
impl<'g> fmt::Display for PackedDex<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canary {
            Some(canary) => write!(f, "{}", canary.ty)?,
            None => f.write_str("-")?,
        }
        let flag = |flag: DexInfo| u8::from(self.info.contains(flag));
        write!(
            f,
            ",ordinal={},coldstart={},extended={},primary={},scroll={},background={}",
            self.ordinal,
            flag(DexInfo::COLDSTART),
            flag(DexInfo::EXTENDED),
            flag(DexInfo::PRIMARY),
            flag(DexInfo::SCROLL),
            flag(DexInfo::BACKGROUND)
        )
    }
}

/// Name of the canary class of a dex (eg. `secondary/dex03/Canary`)
pub fn canary_name(ordinal: usize) -> Result<BinaryName, Error> {
    BinaryName::from_string(format!(
        "{}{:02}/{}",
        CANARY_PREFIX, ordinal, CANARY_CLASS_NAME
    ))
    .map_err(Error::MalformedName)
}

fn is_canary(class: ClassId) -> bool {
    let name = class.name();
    name.starts_with(CANARY_PREFIX) && name.ends_with(CANARY_CLASS_NAME)
}

/// Packs a whole program: primary dex, then the startup order, then everything else
///
/// Classes are offered to the [`PackingSequencer`] in that order. A class that doesn't fit seals
/// the current dex and is offered once more to the fresh one; failing again means it can't be
/// placed anywhere. Every secondary dex opens with its canary, so the canary's references count
/// against the dex's budget like any other class.
pub struct InterDex<'a, 'g> {
    class_graph: &'g ClassGraph<'g>,
    sequencer: PackingSequencer<'a, 'g>,
    refs: &'a ClassRefsTable<'g>,

    /// Flags picked up by every class admitted from now on
    mode: DexInfo,

    /// Flags of the open dex so far
    open_dex_info: DexInfo,

    /// Canary of the open dex, admitted before any of its classes
    open_canary: Option<ClassId<'g>>,
    dexes: Vec<PackedDex<'g>>,
}

impl<'a, 'g> InterDex<'a, 'g> {
    pub fn new(
        class_graph: &'g ClassGraph<'g>,
        sequencer: PackingSequencer<'a, 'g>,
        refs: &'a ClassRefsTable<'g>,
    ) -> InterDex<'a, 'g> {
        InterDex {
            class_graph,
            sequencer,
            refs,
            mode: DexInfo::empty(),
            open_dex_info: DexInfo::empty(),
            open_canary: None,
            dexes: vec![],
        }
    }

    pub fn sequencer(&self) -> &PackingSequencer<'a, 'g> {
        &self.sequencer
    }

    /// Pack every class in scope
    ///
    /// `primary` classes go first, then the classes of the startup `order`, then the rest of the
    /// scope in scope order. Classes already placed are skipped.
    pub fn run(
        &mut self,
        primary: &[ClassId<'g>],
        order: &[OrderEntry],
    ) -> Result<Vec<PackedDex<'g>>, Error> {
        let scope: Vec<ClassId<'g>> = self
            .class_graph
            .scope()
            .into_iter()
            .filter(|class| !class.is_external && !is_canary(*class))
            .collect();
        let betamap = self.betamap_classes(order);

        if self.sequencer.config().force_single_dex {
            return self.run_single_dex(primary, &betamap, &scope);
        }

        self.emit_primary_dex(primary)?;
        self.emit_betamap(order, &betamap)?;

        self.mode = DexInfo::empty();
        for class in scope {
            if !self.sequencer.has_class(class) {
                self.place(class)?;
            }
        }
        if !self.sequencer.current_dex_classes().is_empty() {
            self.seal()?;
        }

        let info = self.sequencer.info();
        log::info!(
            "Packed {} classes into {} dexes ({} secondary, {} coldstart, {} extended)",
            self.sequencer.num_classes(),
            info.num_dexes,
            info.num_secondary_dexes,
            info.num_coldstart_dexes,
            info.num_extended_set_dexes
        );
        Ok(std::mem::take(&mut self.dexes))
    }

    /// Resolve the classes of the startup order, dropping the ones that can't be packed
    fn betamap_classes(&self, order: &[OrderEntry]) -> Vec<Option<ClassId<'g>>> {
        order
            .iter()
            .map(|entry| match entry {
                OrderEntry::Class(name) => match self.class_graph.lookup_class(name) {
                    Some(class) if !class.is_external => Some(class),
                    Some(_) => None,
                    None => {
                        log::warn!("Class {} from the startup order is not in scope", name);
                        None
                    }
                },
                _ => None,
            })
            .collect()
    }

    fn run_single_dex(
        &mut self,
        primary: &[ClassId<'g>],
        betamap: &[Option<ClassId<'g>>],
        scope: &[ClassId<'g>],
    ) -> Result<Vec<PackedDex<'g>>, Error> {
        log::info!("Forcing all classes into a single dex");
        let ordered = primary
            .iter()
            .copied()
            .chain(betamap.iter().flatten().copied())
            .chain(scope.iter().copied());
        for class in ordered {
            if !self.sequencer.has_class(class) {
                self.sequencer
                    .add_class_no_checks(self.refs.get(class), class)?;
            }
        }

        let info = DexInfo::PRIMARY;
        let classes = self.sequencer.end_dex(info);
        Ok(vec![PackedDex {
            ordinal: 0,
            info,
            classes,
            canary: None,
        }])
    }

    fn emit_primary_dex(&mut self, primary: &[ClassId<'g>]) -> Result<(), Error> {
        if primary.is_empty() {
            return Ok(());
        }

        self.mode = DexInfo::PRIMARY;
        let normal = self.sequencer.config().normal_primary_dex;
        for class in primary {
            if normal {
                self.place(*class)?;
            } else {
                self.sequencer
                    .add_class_no_checks(self.refs.get(*class), *class)?;
                self.open_dex_info |= self.mode;
            }
        }
        self.mode = DexInfo::empty();
        if !self.sequencer.current_dex_classes().is_empty() {
            self.seal()?;
        }
        Ok(())
    }

    fn emit_betamap(
        &mut self,
        order: &[OrderEntry],
        betamap: &[Option<ClassId<'g>>],
    ) -> Result<(), Error> {
        let last_end_marker = order
            .iter()
            .rposition(|entry| *entry == OrderEntry::DexEndMarker);

        self.mode = DexInfo::COLDSTART | DexInfo::BETAMAP_ORDERED;
        for (idx, (entry, class)) in order.iter().zip(betamap).enumerate() {
            match entry {
                OrderEntry::Class(_) => {
                    if let Some(class) = class {
                        if !self.sequencer.has_class(*class) {
                            self.place(*class)?;
                        }
                    }
                }
                OrderEntry::DexEndMarker => {
                    if !self.sequencer.current_dex_classes().is_empty() {
                        self.seal()?;
                    }
                    if Some(idx) == last_end_marker {
                        self.mode.remove(DexInfo::COLDSTART);
                        self.mode.insert(DexInfo::EXTENDED);
                    }
                }
                OrderEntry::ScrollStart => self.mode.insert(DexInfo::SCROLL),
                OrderEntry::ScrollEnd => self.mode.remove(DexInfo::SCROLL),
                OrderEntry::BackgroundStart => self.mode.insert(DexInfo::BACKGROUND),
                OrderEntry::BackgroundEnd => self.mode.remove(DexInfo::BACKGROUND),
            }
        }
        Ok(())
    }

    /// Admit a class, sealing the current dex and retrying once if it doesn't fit
    fn place(&mut self, class: ClassId<'g>) -> Result<(), Error> {
        let refs_table = self.refs;
        let refs = refs_table.get(class);
        self.open_canary_if_needed()?;
        if !self.sequencer.add_class_to_current_dex(refs, class)? {
            if self.open_dex_is_empty() {
                return Err(Error::UnsatisfiableClass(class.name().to_owned()));
            }
            self.seal()?;
            self.open_canary_if_needed()?;
            if !self.sequencer.add_class_to_current_dex(refs, class)? {
                return Err(Error::UnsatisfiableClass(class.name().to_owned()));
            }
        }
        self.open_dex_info |= self.mode;
        Ok(())
    }

    /// Whether the open dex holds nothing besides its canary
    fn open_dex_is_empty(&self) -> bool {
        let canaries = usize::from(self.open_canary.is_some());
        self.sequencer.current_dex_classes().len() <= canaries
    }

    /// Seal the open dex
    fn seal(&mut self) -> Result<(), Error> {
        let ordinal = self.dexes.len();
        let info = self.open_dex_info;
        let canary = self.open_canary.take();

        let classes = self.sequencer.end_dex(info);
        self.dexes.push(PackedDex {
            ordinal,
            info,
            classes,
            canary,
        });
        self.open_dex_info = DexInfo::empty();

        // Overflow from the primary dex lands in ordinary dexes
        if self.mode.contains(DexInfo::PRIMARY) {
            log::warn!("Primary dex is full, remaining primary classes go to secondary dexes");
            self.mode.remove(DexInfo::PRIMARY);
        }
        Ok(())
    }

    /// Start a fresh secondary dex with its canary
    fn open_canary_if_needed(&mut self) -> Result<(), Error> {
        let fresh = self.sequencer.current_dex_classes().is_empty();
        let secondary = !self.mode.contains(DexInfo::PRIMARY);
        if fresh && secondary && self.sequencer.config().emit_canaries {
            let ordinal = self.dexes.len();
            self.open_canary = Some(self.add_canary(ordinal)?);
        }
        Ok(())
    }

    fn add_canary(&mut self, ordinal: usize) -> Result<ClassId<'g>, Error> {
        if ordinal > MAX_DEX_NUM {
            return Err(Error::TooManyDexes(ordinal));
        }

        let name = canary_name(ordinal)?;
        let canary = match self.class_graph.lookup_class(&name) {
            Some(canary) => canary,
            None => {
                let object = self.class_graph.intern_type(&BinaryName::OBJECT);
                let ty = self.class_graph.intern_type(&name);
                self.class_graph.add_class(ClassData::new(
                    ty,
                    Some(object),
                    ClassAccessFlags::PUBLIC
                        | ClassAccessFlags::INTERFACE
                        | ClassAccessFlags::ABSTRACT,
                ))?
            }
        };

        let refs = ClassRefs::of_definition(canary);
        self.sequencer.add_class_no_checks(&refs, canary)?;
        Ok(canary)
    }
}
