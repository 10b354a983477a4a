use super::ClinitOracle;
use crate::dex::class_graph::{ClassId, MethodId, OverrideGraph};
use bitflags::bitflags;
use std::collections::{HashMap, HashSet};

bitflags! {
    /// What a method body does, as far as class initialization is concerned
    pub struct Effects: u8 {
        /// Stores into static fields of the method's own class
        const WRITES_OWN_STATICS = 0b00001;

        /// Stores into anything else (other classes' statics, arrays, instance fields, ...)
        const WRITES_FOREIGN_STATE = 0b00010;

        /// May throw
        const THROWS = 0b00100;

        /// Calls into native code
        const NATIVE = 0b01000;

        /// Nothing is known
        const UNKNOWN = 0b10000;
    }
}

/// Call made from a method body
#[derive(Copy, Clone, Debug)]
pub struct Call<'g> {
    pub callee: MethodId<'g>,

    /// Dispatched through the vtable, so overrides of `callee` may run instead
    pub is_virtual: bool,
}

/// Local effects of one method, plus the calls it makes
#[derive(Clone, Debug, Default)]
pub struct MethodSummary<'g> {
    pub effects: Effects,
    pub calls: Vec<Call<'g>>,
}

impl Default for Effects {
    fn default() -> Self {
        Effects::empty()
    }
}

/// Side-effect oracle driven by per-method summaries
///
/// A static initializer is free of side effects when nothing it can reach does more than store
/// into the static fields of the class being initialized. Methods without a summary, and virtual
/// calls whose targets can't be enumerated (no override graph), count as side effects.
#[derive(Default)]
pub struct SummaryOracle<'g> {
    summaries: HashMap<MethodId<'g>, MethodSummary<'g>>,
}

impl<'g> SummaryOracle<'g> {
    pub fn new() -> SummaryOracle<'g> {
        SummaryOracle::default()
    }

    /// Record the summary of a method, replacing any previous one
    pub fn insert(&mut self, method: MethodId<'g>, summary: MethodSummary<'g>) {
        self.summaries.insert(method, summary);
    }

    pub fn summary(&self, method: MethodId<'g>) -> Option<&MethodSummary<'g>> {
        self.summaries.get(&method)
    }
}

impl<'g> ClinitOracle<'g> for SummaryOracle<'g> {
    fn clinit_has_no_side_effects(
        &self,
        class: ClassId<'g>,
        override_graph: Option<&OverrideGraph<'g>>,
    ) -> bool {
        let clinit = match class.clinit() {
            Some(clinit) => clinit,
            None => return true,
        };

        let mut to_visit: Vec<MethodId<'g>> = vec![clinit];
        let mut dont_revisit: HashSet<MethodId<'g>> = HashSet::new();
        while let Some(method) = to_visit.pop() {
            if !dont_revisit.insert(method) {
                continue;
            }

            let summary = match self.summaries.get(&method) {
                Some(summary) => summary,
                None => {
                    log::trace!("{:?} has no summary", method);
                    return false;
                }
            };
            let mut effects = summary.effects;
            if method.class == class.ty {
                effects.remove(Effects::WRITES_OWN_STATICS);
            }
            if !effects.is_empty() {
                log::trace!("{:?} has effects {:?}", method, effects);
                return false;
            }

            for call in &summary.calls {
                to_visit.push(call.callee);
                if call.is_virtual {
                    match override_graph {
                        Some(overrides) => to_visit
                            .extend(overrides.overriding_methods(call.callee).iter().copied()),
                        None => return false,
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::{Call, Effects, MethodSummary, SummaryOracle};
    use crate::dex::class_graph::{
        ClassData, ClassGraph, ClassGraphArenas, MethodData, MethodId, OverrideGraph, TypeId,
    };
    use crate::dex::{BinaryName, ClassAccessFlags, MethodAccessFlags, Name, UnqualifiedName};
    use crate::init_classes::ClinitOracle;

    fn method<'g>(
        graph: &'g ClassGraph<'g>,
        class: TypeId<'g>,
        name: &str,
        access_flags: MethodAccessFlags,
    ) -> MethodId<'g> {
        graph
            .add_method(MethodData {
                class,
                name: UnqualifiedName::from_string(name.to_owned()).unwrap(),
                descriptor: String::from("()V"),
                access_flags: Some(access_flags),
            })
            .unwrap()
    }

    fn ty<'g>(graph: &'g ClassGraph<'g>, name: &str) -> TypeId<'g> {
        graph.intern_type(&BinaryName::from_string(name.to_owned()).unwrap())
    }

    fn summary<'g>(effects: Effects, calls: Vec<Call<'g>>) -> MethodSummary<'g> {
        MethodSummary { effects, calls }
    }

    #[test]
    fn own_statics_are_benign() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let object = graph.insert_framework_types().unwrap().object.ty;

        let config = ty(&graph, "com/example/Config");
        let clinit = method(
            &graph,
            config,
            "<clinit>",
            MethodAccessFlags::STATIC | MethodAccessFlags::CONSTRUCTOR,
        );
        let helper = method(
            &graph,
            config,
            "defaults",
            MethodAccessFlags::STATIC | MethodAccessFlags::PRIVATE,
        );
        let mut data = ClassData::new(config, Some(object), ClassAccessFlags::PUBLIC);
        data.add_method(clinit);
        data.add_method(helper);
        let config_class = graph.add_class(data).unwrap();

        let mut oracle = SummaryOracle::new();
        oracle.insert(
            clinit,
            summary(
                Effects::WRITES_OWN_STATICS,
                vec![Call {
                    callee: helper,
                    is_virtual: false,
                }],
            ),
        );
        oracle.insert(helper, summary(Effects::WRITES_OWN_STATICS, vec![]));
        assert!(oracle.clinit_has_no_side_effects(config_class, None));

        oracle.insert(helper, summary(Effects::THROWS, vec![]));
        assert!(!oracle.clinit_has_no_side_effects(config_class, None));
    }

    #[test]
    fn foreign_statics_and_missing_summaries() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let object = graph.insert_framework_types().unwrap().object.ty;

        let registry = ty(&graph, "com/example/Registry");
        let plugin = ty(&graph, "com/example/Plugin");
        let register = method(
            &graph,
            registry,
            "register",
            MethodAccessFlags::STATIC | MethodAccessFlags::PUBLIC,
        );
        let clinit = method(
            &graph,
            plugin,
            "<clinit>",
            MethodAccessFlags::STATIC | MethodAccessFlags::CONSTRUCTOR,
        );
        let mut data = ClassData::new(plugin, Some(object), ClassAccessFlags::PUBLIC);
        data.add_method(clinit);
        let plugin_class = graph.add_class(data).unwrap();

        let mut oracle = SummaryOracle::new();
        oracle.insert(
            clinit,
            summary(
                Effects::empty(),
                vec![Call {
                    callee: register,
                    is_virtual: false,
                }],
            ),
        );
        assert!(
            !oracle.clinit_has_no_side_effects(plugin_class, None),
            "callee has no summary"
        );

        // `register` stores into `Registry`'s statics, which is foreign to `Plugin`
        oracle.insert(register, summary(Effects::WRITES_OWN_STATICS, vec![]));
        assert!(!oracle.clinit_has_no_side_effects(plugin_class, None));
    }

    #[test]
    fn virtual_calls_follow_overrides() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas);
        let object = graph.insert_framework_types().unwrap().object.ty;

        let shape = ty(&graph, "com/example/Shape");
        let circle = ty(&graph, "com/example/Circle");

        let shape_clinit = method(
            &graph,
            shape,
            "<clinit>",
            MethodAccessFlags::STATIC | MethodAccessFlags::CONSTRUCTOR,
        );
        let shape_area = method(&graph, shape, "area", MethodAccessFlags::PUBLIC);
        let circle_area = method(&graph, circle, "area", MethodAccessFlags::PUBLIC);

        let mut shape_data = ClassData::new(shape, Some(object), ClassAccessFlags::PUBLIC);
        shape_data.add_method(shape_clinit);
        shape_data.add_method(shape_area);
        let shape_class = graph.add_class(shape_data).unwrap();
        let mut circle_data = ClassData::new(circle, Some(shape), ClassAccessFlags::PUBLIC);
        circle_data.add_method(circle_area);
        graph.add_class(circle_data).unwrap();

        let overrides = OverrideGraph::build(&graph);

        let mut oracle = SummaryOracle::new();
        oracle.insert(
            shape_clinit,
            summary(
                Effects::empty(),
                vec![Call {
                    callee: shape_area,
                    is_virtual: true,
                }],
            ),
        );
        oracle.insert(shape_area, summary(Effects::empty(), vec![]));
        oracle.insert(circle_area, summary(Effects::empty(), vec![]));

        assert!(
            !oracle.clinit_has_no_side_effects(shape_class, None),
            "can't see overrides without the graph"
        );
        assert!(oracle.clinit_has_no_side_effects(shape_class, Some(&overrides)));

        oracle.insert(circle_area, summary(Effects::NATIVE, vec![]));
        assert!(
            !oracle.clinit_has_no_side_effects(shape_class, Some(&overrides)),
            "the override is what actually runs"
        );
    }
}
