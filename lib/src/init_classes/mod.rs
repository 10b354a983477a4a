//! Which static initializers run when a type gets initialized
//!
//! Touching a class for the first time makes the VM run its `<clinit>`, which first runs the
//! `<clinit>` of its superclass, and so on up the chain. Most of those initializers only assign
//! their own static fields and can be run at any time, but the rest have observable side effects.
//! Code that must trigger those explicitly does so through an init-class marker, and that marker
//! ends up costing a field reference in whichever dex the code is placed.

use crate::dex::class_graph::{ClassGraph, ClassId, OverrideGraph, TypeId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod summary;

pub use summary::*;

/// Decides whether a class's static initializer is free of side effects
///
/// Implementations must be pure: asking twice about the same class must give the same answer.
/// The resolver is shared between threads, hence the `Sync` bound.
pub trait ClinitOracle<'g>: Sync {
    /// Only called on classes which have a static initializer
    fn clinit_has_no_side_effects(
        &self,
        class: ClassId<'g>,
        override_graph: Option<&OverrideGraph<'g>>,
    ) -> bool;
}

/// Classes whose static initializer has side effects, most derived first
pub type InitClasses<'g> = Vec<ClassId<'g>>;

/// Explicit init-class marker, naming the class whose initializer must run
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct InitClassMarker<'g> {
    pub class: ClassId<'g>,
}

impl<'g> fmt::Display for InitClassMarker<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "init-class {}", self.class.ty)
    }
}

/// Memoized side-effect chains for every type in a program
///
/// All classes in scope are computed up front (in parallel), so after construction lookups are
/// almost always cache hits. Lookups for anything else are computed on demand. Racing
/// computations of the same entry are harmless: both produce the same chain and the first one to
/// land in the cache is kept.
pub struct SideEffectResolver<'a, 'g> {
    classes: HashMap<TypeId<'g>, ClassId<'g>>,
    oracle: &'a dyn ClinitOracle<'g>,
    override_graph: Option<&'a OverrideGraph<'g>>,
    init_classes: DashMap<TypeId<'g>, Arc<InitClasses<'g>>>,
    trivial_init_classes: AtomicUsize,
    empty: Arc<InitClasses<'g>>,

    /// When unset, chains are still computed but no markers are handed out
    create_init_markers: bool,
}

impl<'a, 'g> SideEffectResolver<'a, 'g> {
    pub fn new(
        class_graph: &'g ClassGraph<'g>,
        oracle: &'a dyn ClinitOracle<'g>,
        override_graph: Option<&'a OverrideGraph<'g>>,
    ) -> SideEffectResolver<'a, 'g> {
        let scope = class_graph.scope();
        let resolver = SideEffectResolver {
            classes: scope.iter().map(|class| (class.ty, *class)).collect(),
            oracle,
            override_graph,
            init_classes: DashMap::new(),
            trivial_init_classes: AtomicUsize::new(0),
            empty: Arc::new(vec![]),
            create_init_markers: true,
        };

        scope
            .par_iter()
            .filter(|class| !class.is_external)
            .for_each(|class| {
                resolver.get(class.ty);
            });

        log::debug!(
            "Init classes: {} types resolved, {} trivial",
            resolver.init_classes.len(),
            resolver.trivial_init_classes()
        );
        resolver
    }

    /// Classes whose initializers with side effects run when `ty` is initialized
    ///
    /// Unknown types, external classes, and interfaces all produce an empty chain.
    pub fn get(&self, ty: TypeId<'g>) -> Arc<InitClasses<'g>> {
        if let Some(cached) = self.init_classes.get(&ty) {
            return Arc::clone(cached.value());
        }

        let class = match self.classes.get(&ty) {
            Some(class) if !class.is_external && !class.is_interface() => *class,
            _ => return Arc::clone(&self.empty),
        };

        // No guard on the map may be held here: computing recurses into `get`
        let computed = Arc::new(self.compute(class));

        match self.init_classes.entry(ty) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                if computed.is_empty() {
                    self.trivial_init_classes.fetch_add(1, Ordering::Relaxed);
                } else {
                    log::trace!("Init classes of {}: {:?}", ty, computed);
                }
                Arc::clone(&*vacant.insert(computed))
            }
        }
    }

    fn compute(&self, class: ClassId<'g>) -> InitClasses<'g> {
        let mut current = Some(class);
        while let Some(candidate) = current {
            if candidate.is_external {
                break;
            }
            if self.has_side_effects(candidate) {
                if candidate != class {
                    return self.get(candidate.ty).as_ref().clone();
                }
                let mut chain = vec![class];
                if let Some(superclass) = class.superclass {
                    chain.extend(self.get(superclass).iter().copied());
                }
                return chain;
            }
            current = candidate
                .superclass
                .and_then(|ty| self.classes.get(&ty).copied());
        }
        vec![]
    }

    fn has_side_effects(&self, class: ClassId<'g>) -> bool {
        class.clinit().is_some()
            && !self
                .oracle
                .clinit_has_no_side_effects(class, self.override_graph)
    }

    /// Most derived class in [`Self::get`], if any
    pub fn refine(&self, ty: TypeId<'g>) -> Option<ClassId<'g>> {
        self.get(ty).first().copied()
    }

    /// Turn marker creation on or off (on by default)
    pub fn with_init_markers(mut self, enabled: bool) -> SideEffectResolver<'a, 'g> {
        self.create_init_markers = enabled;
        self
    }

    /// Marker that triggers initialization of `ty`, if that does anything observable
    pub fn create_init_marker(&self, ty: TypeId<'g>) -> Option<InitClassMarker<'g>> {
        if !self.create_init_markers {
            return None;
        }
        self.refine(ty).map(|class| InitClassMarker { class })
    }

    /// Class definition of a type, if it is in scope
    pub fn class(&self, ty: TypeId<'g>) -> Option<ClassId<'g>> {
        self.classes.get(&ty).copied()
    }

    /// How many resolved types have no initializers with side effects at all
    pub fn trivial_init_classes(&self) -> usize {
        self.trivial_init_classes.load(Ordering::Relaxed)
    }
}
