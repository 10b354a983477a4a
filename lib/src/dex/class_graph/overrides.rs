use super::{ClassGraph, ClassId, MethodId, TypeId};
use std::collections::{HashMap, HashSet};

/// Which virtual methods get overridden, and by whom
///
/// An edge `a -> b` means that `b` is declared in a subtype of `a`'s class with the same name and
/// prototype, so a virtual call to `a` may end up running `b`. Edges go from every ancestor
/// declaration (superclasses and interfaces alike) directly to the overriding method, so the
/// direct successors of a method are already all of its overrides.
pub struct OverrideGraph<'g> {
    overriders: HashMap<MethodId<'g>, Vec<MethodId<'g>>>,
    overrides_something: HashSet<MethodId<'g>>,
}

impl<'g> OverrideGraph<'g> {
    /// Build the graph for every class in scope
    pub fn build(class_graph: &'g ClassGraph<'g>) -> OverrideGraph<'g> {
        let mut overriders: HashMap<MethodId<'g>, Vec<MethodId<'g>>> = HashMap::new();
        let mut overrides_something = HashSet::new();

        for class in class_graph.scope() {
            if class.vmethods.is_empty() {
                continue;
            }
            for ancestor in Self::ancestors(class_graph, class) {
                for method in &class.vmethods {
                    let overridden = ancestor.vmethods.iter().find(|candidate| {
                        candidate.name == method.name && candidate.descriptor == method.descriptor
                    });
                    if let Some(overridden) = overridden {
                        overriders.entry(*overridden).or_default().push(*method);
                        overrides_something.insert(*method);
                    }
                }
            }
        }

        log::debug!(
            "Override graph: {} overridden methods, {} overriding methods",
            overriders.len(),
            overrides_something.len()
        );
        OverrideGraph {
            overriders,
            overrides_something,
        }
    }

    /// Strict supertypes of a class which have definitions, each visited once
    fn ancestors(class_graph: &'g ClassGraph<'g>, class: ClassId<'g>) -> Vec<ClassId<'g>> {
        let mut to_visit: Vec<TypeId<'g>> = vec![];
        let mut dont_revisit: HashSet<TypeId<'g>> = HashSet::new();
        dont_revisit.insert(class.ty);
        to_visit.extend(class.superclass);
        to_visit.extend(class.interfaces.iter().copied());

        let mut ancestors = vec![];
        while let Some(ty) = to_visit.pop() {
            if !dont_revisit.insert(ty) {
                continue;
            }
            if let Some(ancestor) = class_graph.type_class(ty) {
                to_visit.extend(ancestor.superclass);
                to_visit.extend(ancestor.interfaces.iter().copied());
                ancestors.push(ancestor);
            }
        }
        ancestors
    }

    /// Methods which override this one, in any subtype
    pub fn overriding_methods(&self, method: MethodId<'g>) -> &[MethodId<'g>] {
        self.overriders
            .get(&method)
            .map_or(&[], |overriders| overriders.as_slice())
    }

    /// Can a virtual call to this method dispatch somewhere else, or is it itself an override?
    ///
    /// Methods for which this is `false` behave like direct methods.
    pub fn is_true_virtual(&self, method: MethodId<'g>) -> bool {
        self.overriders.contains_key(&method) || self.overrides_something.contains(&method)
    }
}
