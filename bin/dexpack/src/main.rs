use dexpack::dex::class_graph::{ClassGraph, ClassGraphArenas, ClassId, OverrideGraph};
use dexpack::init_classes::SideEffectResolver;
use dexpack::interdex::{
    ClassRefs, ClassRefsTable, InterDex, OrderEntry, PackerConfig, PackingSequencer,
    ReservedRefs,
};

use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::fs;

mod error;
mod scope_file;

use error::CliError;

fn main() -> Result<(), CliError> {
    env_logger::init();

    let matches = Command::new("Multi-dex packer")
        .version(crate_version!())
        .about("Spread the classes of a program over as few dex files as possible")
        .arg(
            Arg::new("SCOPE")
                .help("Program description to pack")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("betamap")
                .long("betamap")
                .value_name("FILE")
                .help("Startup class order, with dex end markers"),
        )
        .arg(
            Arg::new("primary")
                .long("primary")
                .value_name("FILE")
                .help("Classes which must go into the primary dex"),
        )
        .arg(
            Arg::new("linear-alloc-limit")
                .long("linear-alloc-limit")
                .value_name("BYTES")
                .value_parser(value_parser!(u64))
                .help("Linear alloc budget of each dex"),
        )
        .arg(reserve_arg("reserved-frefs", "Field references to hold back in each dex"))
        .arg(reserve_arg("reserved-trefs", "Type references to hold back in each dex"))
        .arg(reserve_arg("reserved-mrefs", "Method references to hold back in each dex"))
        .arg(
            Arg::new("min-sdk")
                .long("min-sdk")
                .value_name("API_LEVEL")
                .value_parser(value_parser!(u32))
                .help("Oldest platform version the app supports"),
        )
        .arg(flag_arg("force-single-dex", "Put everything in one dex, ignoring all limits"))
        .arg(flag_arg("no-canaries", "Don't add canary classes to secondary dexes"))
        .arg(flag_arg(
            "normal-primary-dex",
            "Check primary dex classes against the usual limits",
        ))
        .get_matches();

    let config = packer_config(&matches);

    let class_graph_arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&class_graph_arenas);
    class_graph.insert_framework_types()?;

    let scope_path = matches
        .get_one::<String>("SCOPE")
        .map_or("", String::as_str);
    log::info!("Reading '{}'", scope_path);
    let decls = scope_file::parse_scope(scope_path, &fs::read_to_string(scope_path)?)?;
    let program = scope_file::load(&class_graph, &decls)?;

    let order = match matches.get_one::<String>("betamap") {
        Some(path) => scope_file::parse_class_list(path, &fs::read_to_string(path)?)?,
        None => vec![],
    };
    let primary = match matches.get_one::<String>("primary") {
        Some(path) => primary_classes(
            &class_graph,
            &scope_file::parse_class_list(path, &fs::read_to_string(path)?)?,
        ),
        None => vec![],
    };

    let override_graph = OverrideGraph::build(&class_graph);
    let resolver = SideEffectResolver::new(&class_graph, &program.oracle, Some(&override_graph));

    let code_refs = &program.code_refs;
    let refs = ClassRefsTable::build(&program.classes, |class| {
        let mut refs = ClassRefs::of_definition(class);
        if let Some(code) = code_refs.get(&class) {
            refs.extend(code);
        }
        refs
    });

    let sequencer = PackingSequencer::new(config, Some(&resolver));
    let mut interdex = InterDex::new(&class_graph, sequencer, &refs);
    let dexes = interdex.run(&primary, &order)?;

    for dex in &dexes {
        println!("{}", dex);
    }

    let stats = interdex.sequencer().stats();
    log::info!(
        "{} classes: {} static methods, {} direct methods, {} virtual methods, {} method refs, \
         {} field refs ({} trivial init classes)",
        interdex.sequencer().num_classes(),
        stats.num_static_meths,
        stats.num_dmethods,
        stats.num_vmethods,
        stats.num_mrefs,
        stats.num_frefs,
        resolver.trivial_init_classes()
    );

    Ok(())
}

fn reserve_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("COUNT")
        .value_parser(value_parser!(usize))
        .help(help)
}

fn flag_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .help(help)
}

fn packer_config(matches: &ArgMatches) -> PackerConfig {
    let defaults = PackerConfig::new();
    let reserved = |name: &str| matches.get_one::<usize>(name).copied().unwrap_or(0);
    PackerConfig {
        linear_alloc_limit: matches
            .get_one::<u64>("linear-alloc-limit")
            .copied()
            .unwrap_or(defaults.linear_alloc_limit),
        reserved: ReservedRefs {
            fields: reserved("reserved-frefs"),
            types: reserved("reserved-trefs"),
            methods: reserved("reserved-mrefs"),
        },
        min_sdk: matches
            .get_one::<u32>("min-sdk")
            .copied()
            .unwrap_or(defaults.min_sdk),
        force_single_dex: matches.get_flag("force-single-dex"),
        emit_canaries: !matches.get_flag("no-canaries"),
        normal_primary_dex: matches.get_flag("normal-primary-dex"),
        ..defaults
    }
}

/// Classes of the primary dex list which exist in the program
fn primary_classes<'g>(
    class_graph: &'g ClassGraph<'g>,
    entries: &[OrderEntry],
) -> Vec<ClassId<'g>> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            OrderEntry::Class(name) => {
                let class = class_graph.lookup_class(name);
                if class.is_none() {
                    log::warn!("Primary class {} is not in scope", name);
                }
                class
            }
            _ => None,
        })
        .collect()
}
