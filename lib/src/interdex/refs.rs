use crate::dex::class_graph::{ClassId, FieldId, MethodId, TypeId};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

pub type MethodRefs<'g> = HashSet<MethodId<'g>>;
pub type FieldRefs<'g> = HashSet<FieldId<'g>>;
pub type TypeRefs<'g> = HashSet<TypeId<'g>>;

/// References made by one class (its definitions and everything its code mentions)
#[derive(Clone, Debug, Default)]
pub struct ClassRefs<'g> {
    pub methods: MethodRefs<'g>,
    pub fields: FieldRefs<'g>,
    pub types: TypeRefs<'g>,

    /// Types named by init-class instructions, which may need an explicit trigger
    pub init_types: TypeRefs<'g>,
}

impl<'g> ClassRefs<'g> {
    /// References a class makes just by being defined: its own members and its supertypes
    pub fn of_definition(class: ClassId<'g>) -> ClassRefs<'g> {
        let mut refs = ClassRefs::default();
        refs.types.insert(class.ty);
        refs.types.extend(class.superclass);
        refs.types.extend(class.interfaces.iter().copied());
        refs.methods
            .extend(class.dmethods.iter().chain(&class.vmethods).copied());
        refs.fields
            .extend(class.sfields.iter().chain(&class.ifields).copied());
        refs
    }

    /// Add all references from `other`
    pub fn extend(&mut self, other: &ClassRefs<'g>) {
        self.methods.extend(other.methods.iter().copied());
        self.fields.extend(other.fields.iter().copied());
        self.types.extend(other.types.iter().copied());
        self.init_types.extend(other.init_types.iter().copied());
    }
}

/// References a class will need once its init-class instructions are lowered
///
/// Each pending field stands for one synthesized static field reference to that type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingInitClasses<'g> {
    pub fields: TypeRefs<'g>,
    pub types: TypeRefs<'g>,
}

impl<'g> PendingInitClasses<'g> {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.types.is_empty()
    }
}

/// Number of elements in `set` which aren't in `existing`
pub fn set_difference_size<T: Eq + Hash>(set: &HashSet<T>, existing: &HashSet<T>) -> usize {
    set.iter().filter(|elem| !existing.contains(elem)).count()
}

/// Precomputed [`ClassRefs`] for every class of a program
///
/// Reference extraction is independent per class, so it is all done in parallel ahead of the
/// (inherently sequential) packing.
pub struct ClassRefsTable<'g> {
    refs: HashMap<ClassId<'g>, ClassRefs<'g>>,
    empty: ClassRefs<'g>,
}

impl<'g> ClassRefsTable<'g> {
    pub fn build<F>(scope: &[ClassId<'g>], extract: F) -> ClassRefsTable<'g>
    where
        F: Fn(ClassId<'g>) -> ClassRefs<'g> + Sync,
    {
        let refs = scope
            .par_iter()
            .map(|class| (*class, extract(*class)))
            .collect::<HashMap<_, _>>();
        log::debug!("Collected references for {} classes", refs.len());
        ClassRefsTable {
            refs,
            empty: ClassRefs::default(),
        }
    }

    /// References of a class (none, for classes the table doesn't know about)
    pub fn get(&self, class: ClassId<'g>) -> &ClassRefs<'g> {
        self.refs.get(&class).unwrap_or(&self.empty)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::{set_difference_size, ClassRefs, ClassRefsTable};
    use crate::dex::class_graph::{ClassGraph, ClassGraphArenas};
    use crate::interdex::fixtures::Program;
    use std::collections::HashSet;

    #[test]
    fn difference_sizes() {
        let existing: HashSet<u32> = [1, 2, 3].into_iter().collect();
        let set: HashSet<u32> = [2, 3, 4, 5].into_iter().collect();
        assert_eq!(set_difference_size(&set, &existing), 2);
        assert_eq!(set_difference_size(&existing, &existing), 0);
        assert_eq!(set_difference_size(&HashSet::new(), &existing), 0);
    }

    #[test]
    fn definitions_and_table() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let program = Program::new(&graph);

        let base = program.class_with("com/example/Base", None, true, &["A", "B"]);
        let derived = program.class_with("com/example/Derived", Some(base.ty), false, &[]);
        let stray = program.class("com/example/Stray");

        let refs = ClassRefs::of_definition(base);
        assert_eq!(refs.types, HashSet::from([base.ty, program.object]));
        assert_eq!(refs.methods.len(), 1, "<clinit>");
        assert_eq!(refs.fields.len(), 2);

        let mut code = ClassRefs::default();
        code.fields.insert(base.sfields[0]);
        code.init_types.insert(base.ty);
        let table = ClassRefsTable::build(&[base, derived], |class| {
            let mut refs = ClassRefs::of_definition(class);
            if class.superclass == Some(base.ty) {
                refs.extend(&code);
            }
            refs
        });

        assert_eq!(table.len(), 2);
        let derived_refs = table.get(derived);
        assert_eq!(derived_refs.types, HashSet::from([derived.ty, base.ty]));
        assert_eq!(derived_refs.fields, HashSet::from([base.sfields[0]]));
        assert_eq!(derived_refs.init_types, HashSet::from([base.ty]));
        assert!(table.get(stray).types.is_empty(), "not in the table");
    }
}
