use super::{
    set_difference_size, ClassRefs, FieldRefs, MethodRefs, PendingInitClasses, RefLimits, TypeRefs,
};
use crate::dex::class_graph::{ClassId, TypeId};
use crate::init_classes::SideEffectResolver;

/// The dex currently being filled
///
/// Tracks which references the classes admitted so far make, so that admitting a class can be
/// checked against the per-dex ceilings. A failed admission leaves the unit exactly as it was,
/// which is what lets the caller retry the same class against a fresh unit.
#[derive(Default)]
pub struct CapacityUnit<'g> {
    classes: Vec<ClassId<'g>>,
    mrefs: MethodRefs<'g>,
    frefs: FieldRefs<'g>,
    trefs: TypeRefs<'g>,

    /// Types for which an init-class field reference still has to be synthesized
    pending_init_class_fields: TypeRefs<'g>,

    /// Types only referenced through pending init-class fields
    pending_init_class_types: TypeRefs<'g>,

    linear_alloc_size: u64,
}

impl<'g> CapacityUnit<'g> {
    pub fn new() -> CapacityUnit<'g> {
        CapacityUnit::default()
    }

    /// Admit a class if all of its references still fit
    ///
    /// Returns `false` and leaves the unit untouched if any kind of reference would exceed its
    /// ceiling, or the linear-alloc estimate would exceed the budget.
    pub fn add_class_if_fits(
        &mut self,
        refs: &ClassRefs<'g>,
        pending: &PendingInitClasses<'g>,
        limits: &RefLimits,
        size_cost: u64,
        class: ClassId<'g>,
    ) -> bool {
        if self.linear_alloc_size + size_cost > limits.linear_alloc {
            log::debug!(
                "Linear alloc limit reached by {:?}: {} + {} > {}",
                class,
                self.linear_alloc_size,
                size_cost,
                limits.linear_alloc
            );
            return false;
        }

        let method_refs = self.mrefs.len() + set_difference_size(&refs.methods, &self.mrefs);
        if method_refs > limits.method_refs {
            log::debug!(
                "Method refs limit reached by {:?}: {} > {}",
                class,
                method_refs,
                limits.method_refs
            );
            return false;
        }

        let field_refs = self.frefs.len()
            + set_difference_size(&refs.fields, &self.frefs)
            + self.pending_init_class_fields.len()
            + set_difference_size(&pending.fields, &self.pending_init_class_fields);
        if field_refs > limits.field_refs {
            log::debug!(
                "Field refs limit reached by {:?}: {} > {}",
                class,
                field_refs,
                limits.field_refs
            );
            return false;
        }

        let type_refs = self.trefs.len()
            + set_difference_size(&refs.types, &self.trefs)
            + self.pending_init_class_types.len()
            + set_difference_size(&pending.types, &self.pending_init_class_types);
        if type_refs > limits.type_refs {
            log::debug!(
                "Type refs limit reached by {:?}: {} > {}",
                class,
                type_refs,
                limits.type_refs
            );
            return false;
        }

        self.add_class_no_checks(refs, pending, size_cost, class);
        true
    }

    /// Admit a class regardless of budget
    pub fn add_class_no_checks(
        &mut self,
        refs: &ClassRefs<'g>,
        pending: &PendingInitClasses<'g>,
        size_cost: u64,
        class: ClassId<'g>,
    ) {
        log::trace!("Adding {:?} ({} bytes of linear alloc)", class, size_cost);
        self.linear_alloc_size += size_cost;
        self.add_refs_no_checks(refs, pending);
        self.classes.push(class);
    }

    /// Account for references without admitting a class
    pub fn add_refs_no_checks(&mut self, refs: &ClassRefs<'g>, pending: &PendingInitClasses<'g>) {
        self.mrefs.extend(refs.methods.iter().copied());

        for field in &refs.fields {
            if self.frefs.insert(*field) && field.is_def() && field.is_static() {
                // A real static field of that class is now referenced: marker lowering can use it
                self.pending_init_class_fields.remove(&field.class);
            }
        }

        for ty in &refs.types {
            if self.trefs.insert(*ty) {
                self.pending_init_class_types.remove(ty);
            }
        }

        for ty in &pending.fields {
            let inserted = self.pending_init_class_fields.insert(*ty);
            debug_assert!(inserted, "{} is already pending", ty);
        }
        for ty in &pending.types {
            let inserted = self.pending_init_class_types.insert(*ty);
            debug_assert!(inserted, "{} is already pending", ty);
        }
    }

    /// Work out which extra references the init-class instructions of a class would need here
    ///
    /// Only refined types that the unit (or the class itself) doesn't already cover through one of
    /// their static fields get staged. Does not modify the unit.
    pub fn resolve_init_classes(
        &self,
        resolver: &SideEffectResolver<'_, 'g>,
        refs: &ClassRefs<'g>,
    ) -> PendingInitClasses<'g> {
        let mut pending = PendingInitClasses::default();
        for ty in &refs.init_types {
            let refined: TypeId<'g> = match resolver.refine(*ty) {
                Some(class) => class.ty,
                None => continue,
            };
            if pending.fields.contains(&refined)
                || self.pending_init_class_fields.contains(&refined)
            {
                continue;
            }
            let covered = resolver
                .class(refined)
                .map_or(false, |class| {
                    class
                        .sfields
                        .iter()
                        .any(|field| self.frefs.contains(field) || refs.fields.contains(field))
                });
            if covered {
                continue;
            }

            pending.fields.insert(refined);
            if !self.trefs.contains(&refined) && !refs.types.contains(&refined) {
                pending.types.insert(refined);
            }
        }
        pending
    }

    /// Is this type already referenced by the unit?
    pub fn has_type_ref(&self, ty: TypeId<'g>) -> bool {
        self.trefs.contains(&ty)
    }

    /// Admitted classes, in admission order
    pub fn classes(&self) -> &[ClassId<'g>] {
        &self.classes
    }

    pub fn method_refs_count(&self) -> usize {
        self.mrefs.len()
    }

    /// Field references, including the ones still to be synthesized for init-class markers
    pub fn field_refs_count(&self) -> usize {
        self.frefs.len() + self.pending_init_class_fields.len()
    }

    /// Type references, including the ones only needed by init-class markers
    pub fn type_refs_count(&self) -> usize {
        self.trefs.len() + self.pending_init_class_types.len()
    }

    pub fn linear_alloc_size(&self) -> u64 {
        self.linear_alloc_size
    }

    pub fn pending_init_classes(&self) -> PendingInitClasses<'g> {
        PendingInitClasses {
            fields: self.pending_init_class_fields.clone(),
            types: self.pending_init_class_types.clone(),
        }
    }

    /// Consume the unit, keeping only the admitted classes
    pub fn take_all_classes(self) -> Vec<ClassId<'g>> {
        self.classes
    }
}
