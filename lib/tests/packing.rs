use dexpack::dex::class_graph::{
    ClassData, ClassGraph, ClassGraphArenas, ClassId, FieldData, MethodData, OverrideGraph, TypeId,
};
use dexpack::dex::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, Name, UnqualifiedName,
};
use dexpack::init_classes::{Call, Effects, MethodSummary, SideEffectResolver, SummaryOracle};
use dexpack::interdex::{
    ClassRefs, ClassRefsTable, DexInfo, InterDex, OrderEntry, PackerConfig, PackingSequencer,
    ReservedRefs, FORMAT_REF_LIMIT,
};
use std::collections::{HashMap, HashSet};

fn name(s: &str) -> BinaryName {
    BinaryName::from_string(s.to_owned()).unwrap()
}

fn unqualified(s: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(s.to_owned()).unwrap()
}

/// Defines a class with an optional `<clinit>`, a virtual `render()V`, and one static field
fn widget<'g>(
    graph: &'g ClassGraph<'g>,
    class_name: &str,
    superclass: TypeId<'g>,
    oracle: &mut SummaryOracle<'g>,
    clinit_effects: Option<Effects>,
) -> ClassId<'g> {
    let ty = graph.intern_type(&name(class_name));
    let mut data = ClassData::new(ty, Some(superclass), ClassAccessFlags::PUBLIC);

    let render = graph
        .add_method(MethodData {
            class: ty,
            name: unqualified("render"),
            descriptor: String::from("()V"),
            access_flags: Some(MethodAccessFlags::PUBLIC),
        })
        .unwrap();
    data.add_method(render);
    oracle.insert(render, MethodSummary::default());

    if let Some(effects) = clinit_effects {
        let clinit = graph
            .add_method(MethodData {
                class: ty,
                name: UnqualifiedName::CLINIT,
                descriptor: String::from("()V"),
                access_flags: Some(MethodAccessFlags::STATIC | MethodAccessFlags::CONSTRUCTOR),
            })
            .unwrap();
        data.add_method(clinit);
        oracle.insert(
            clinit,
            MethodSummary {
                effects,
                calls: vec![],
            },
        );
    }

    let field = graph
        .add_field(FieldData {
            class: ty,
            name: unqualified("DEFAULT"),
            descriptor: String::from("I"),
            access_flags: Some(FieldAccessFlags::STATIC | FieldAccessFlags::PUBLIC),
        })
        .unwrap();
    data.add_field(field);

    graph.add_class(data).unwrap()
}

#[test]
fn init_class_chain_through_the_whole_stack() {
    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let framework = graph.insert_framework_types().unwrap();
    let mut oracle = SummaryOracle::new();

    // Registry's initializer registers itself somewhere else: side effect
    let registry = widget(
        &graph,
        "app/Registry",
        framework.object.ty,
        &mut oracle,
        Some(Effects::WRITES_FOREIGN_STATE),
    );
    // Button's initializer only sets its own statics
    let button = widget(
        &graph,
        "app/Button",
        registry.ty,
        &mut oracle,
        Some(Effects::WRITES_OWN_STATICS),
    );
    let screen = widget(&graph, "app/Screen", framework.object.ty, &mut oracle, None);

    let overrides = OverrideGraph::build(&graph);
    assert!(overrides.is_true_virtual(registry.vmethods[0]));

    let resolver = SideEffectResolver::new(&graph, &oracle, Some(&overrides));
    assert_eq!(*resolver.get(button.ty), vec![registry]);
    assert_eq!(resolver.refine(screen.ty), None);

    // Screen's code initializes Button, which costs a field and a type ref for Registry
    let mut screen_code = ClassRefs::default();
    screen_code.types.insert(button.ty);
    screen_code.init_types.insert(button.ty);
    let scope = vec![registry, button, screen];
    let table = ClassRefsTable::build(&scope, |class| {
        let mut refs = ClassRefs::of_definition(class);
        if class == screen {
            refs.extend(&screen_code);
        }
        refs
    });

    let mut sequencer = PackingSequencer::new(PackerConfig::default(), Some(&resolver));
    assert!(sequencer
        .add_class_to_current_dex(table.get(screen), screen)
        .unwrap());
    assert!(!sequencer.current_dex_has_tref(registry.ty));
    let unit = sequencer.current_dex();
    // Screen, Object, Button + pending Registry
    assert_eq!(unit.type_refs_count(), 4);
    // Screen.DEFAULT + pending field for Registry
    assert_eq!(unit.field_refs_count(), 2);

    // Placing Registry itself supplies real references for both
    assert!(sequencer
        .add_class_to_current_dex(table.get(registry), registry)
        .unwrap());
    let unit = sequencer.current_dex();
    assert!(unit.pending_init_classes().is_empty());
    assert_eq!(unit.type_refs_count(), 4);
    assert_eq!(unit.field_refs_count(), 2);
}

#[test]
fn virtual_clinit_calls_consult_overrides() {
    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let framework = graph.insert_framework_types().unwrap();
    let mut oracle = SummaryOracle::new();

    let theme = widget(
        &graph,
        "app/Theme",
        framework.object.ty,
        &mut oracle,
        Some(Effects::empty()),
    );
    let dark = widget(&graph, "app/DarkTheme", theme.ty, &mut oracle, None);

    // Theme.<clinit> calls render() virtually, and DarkTheme's override is native
    let clinit = theme.clinit().unwrap();
    oracle.insert(
        clinit,
        MethodSummary {
            effects: Effects::empty(),
            calls: vec![Call {
                callee: theme.vmethods[0],
                is_virtual: true,
            }],
        },
    );
    let overrides = OverrideGraph::build(&graph);
    {
        let benign = SideEffectResolver::new(&graph, &oracle, Some(&overrides));
        assert!(benign.get(dark.ty).is_empty());
    }

    oracle.insert(
        dark.vmethods[0],
        MethodSummary {
            effects: Effects::NATIVE,
            calls: vec![],
        },
    );
    let resolver = SideEffectResolver::new(&graph, &oracle, Some(&overrides));
    assert_eq!(*resolver.get(dark.ty), vec![theme]);

    let unknown_targets = SideEffectResolver::new(&graph, &oracle, None);
    assert_eq!(unknown_targets.refine(theme.ty), Some(theme));
}

#[test]
fn sealed_dexes_respect_limits() {
    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let framework = graph.insert_framework_types().unwrap();
    let mut oracle = SummaryOracle::new();

    let mut scope = vec![];
    for i in 0..40 {
        let superclass = scope.last().map_or(framework.object.ty, |class: &ClassId| class.ty);
        let effects = if i % 5 == 0 {
            Some(Effects::THROWS)
        } else {
            None
        };
        let class_name = format!("app/W{}", i);
        scope.push(widget(&graph, &class_name, superclass, &mut oracle, effects));
    }

    // Every class calls into a shared helper, plus a handful of its own methods
    let mut code: HashMap<ClassId, ClassRefs> = HashMap::new();
    let util = graph.intern_type(&name("app/Util"));
    for (i, class) in scope.iter().enumerate() {
        let mut refs = ClassRefs::default();
        for j in 0..(i % 7) {
            let method_name = unqualified(&format!("m{}_{}", i, j));
            let method = graph
                .add_method(MethodData::reference(util, method_name, "()V"))
                .unwrap();
            refs.methods.insert(method);
        }
        refs.init_types.insert(class.ty);
        code.insert(*class, refs);
    }

    let overrides = OverrideGraph::build(&graph);
    let resolver = SideEffectResolver::new(&graph, &oracle, Some(&overrides));
    let table = ClassRefsTable::build(&scope, |class| {
        let mut refs = ClassRefs::of_definition(class);
        if let Some(code) = code.get(&class) {
            refs.extend(code);
        }
        refs
    });

    let config = PackerConfig {
        reserved: ReservedRefs {
            fields: FORMAT_REF_LIMIT - 12,
            types: FORMAT_REF_LIMIT - 15,
            methods: FORMAT_REF_LIMIT - 30,
        },
        emit_canaries: false,
        ..PackerConfig::default()
    };
    let sequencer = PackingSequencer::new(config, Some(&resolver));
    let limits = sequencer.limits();
    let mut interdex = InterDex::new(&graph, sequencer, &table);

    let order = vec![
        OrderEntry::Class(name("app/W3")),
        OrderEntry::Class(name("app/W1")),
        OrderEntry::DexEndMarker,
    ];
    let dexes = interdex.run(&[], &order).unwrap();

    assert!(dexes.len() > 2);
    assert_eq!(dexes[0].classes.len(), 2, "end marker seals the coldstart dex");
    assert_eq!(dexes[0].info, DexInfo::COLDSTART | DexInfo::BETAMAP_ORDERED);
    assert!(dexes[1].info.is_empty(), "rest of the scope isn't part of any startup set");

    let mut seen = HashSet::new();
    for dex in &dexes {
        assert!(dex.canary.is_none());

        // Replaying each dex's classes against an unlimited sequencer measures what it holds
        let mut replay = PackingSequencer::new(PackerConfig::default(), Some(&resolver));
        for class in &dex.classes {
            assert!(seen.insert(*class), "{:?} placed twice", class);
            replay.add_class_no_checks(table.get(*class), *class).unwrap();
        }
        let unit = replay.current_dex();
        assert!(unit.method_refs_count() <= limits.method_refs);
        assert!(unit.field_refs_count() <= limits.field_refs);
        assert!(unit.type_refs_count() <= limits.type_refs);
        assert!(unit.linear_alloc_size() <= limits.linear_alloc);
    }
    assert_eq!(seen.len(), scope.len());
}

#[test]
fn canaries_stay_within_the_type_ceiling() {
    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    let object = graph.insert_framework_types().unwrap().object.ty;

    let scope: Vec<ClassId> = (0..7)
        .map(|i| {
            let ty = graph.intern_type(&name(&format!("app/Screen{}", i)));
            graph
                .add_class(ClassData::new(ty, Some(object), ClassAccessFlags::PUBLIC))
                .unwrap()
        })
        .collect();
    let table = ClassRefsTable::build(&scope, ClassRefs::of_definition);

    // Canary and `java/lang/Object` take two type refs, two screens fill the rest exactly
    let config = PackerConfig {
        reserved: ReservedRefs {
            types: FORMAT_REF_LIMIT - 4,
            ..ReservedRefs::default()
        },
        ..PackerConfig::default()
    };
    assert!(config.emit_canaries);
    let sequencer = PackingSequencer::new(config, None);
    let limits = sequencer.limits();
    assert_eq!(limits.type_refs, 4);
    let mut interdex = InterDex::new(&graph, sequencer, &table);
    let dexes = interdex.run(&[], &[]).unwrap();

    let sizes: Vec<usize> = dexes.iter().map(|dex| dex.classes.len()).collect();
    assert_eq!(sizes, vec![3, 3, 3, 2]);

    let mut full_dexes = 0;
    for dex in &dexes {
        let canary = dex.canary.unwrap();
        assert_eq!(dex.classes[0], canary);

        let mut replay = PackingSequencer::new(PackerConfig::default(), None);
        for class in &dex.classes {
            let refs = if *class == canary {
                ClassRefs::of_definition(canary)
            } else {
                table.get(*class).clone()
            };
            replay.add_class_no_checks(&refs, *class).unwrap();
        }
        let type_refs = replay.current_dex().type_refs_count();
        assert!(type_refs <= limits.type_refs, "dex {} holds {} types", dex.ordinal, type_refs);
        if type_refs == limits.type_refs {
            full_dexes += 1;
        }
    }
    assert_eq!(full_dexes, 3);
}
