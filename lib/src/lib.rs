//! Multi-dex packing for optimized Android bytecode
//!
//! Once classes have been rewritten they need to be spread across a sequence of dex files. Every
//! dex addresses its method, field, and type references with 16-bit indices, and the runtime also
//! caps how much linear-alloc space the classes of one dex may consume. This crate decides which
//! dex each class lands in:
//!
//!   - [`dex::class_graph`] holds the whole program: interned types, classes, and members, all
//!     allocated in arenas and referred to by identity handles
//!   - [`init_classes`] works out which static initializers with side effects get triggered when a
//!     type is initialized, since those add references nobody wrote down explicitly
//!   - [`interdex`] tracks the budget of the dex being filled ([`interdex::CapacityUnit`]),
//!     sequences dexes ([`interdex::PackingSequencer`]), and drives a complete run over a
//!     startup-ordered class list ([`interdex::InterDex`])
//!
//! ### Example
//!
//! ```
//! use dexpack::dex::class_graph::{ClassData, ClassGraph, ClassGraphArenas};
//! use dexpack::dex::{BinaryName, ClassAccessFlags, Name};
//! use dexpack::interdex::{ClassRefs, DexInfo, PackerConfig, PackingSequencer};
//!
//! # fn main() -> Result<(), dexpack::Error> {
//! let arenas = ClassGraphArenas::new();
//! let graph = ClassGraph::new(&arenas);
//! let framework = graph.insert_framework_types()?;
//!
//! let name = BinaryName::from_string(String::from("com/example/Main")).unwrap();
//! let ty = graph.intern_type(&name);
//! let data = ClassData::new(ty, Some(framework.object.ty), ClassAccessFlags::PUBLIC);
//! let main = graph.add_class(data)?;
//!
//! let mut sequencer = PackingSequencer::new(PackerConfig::default(), None);
//! let mut refs = ClassRefs::default();
//! refs.types.insert(ty);
//! assert!(sequencer.add_class_to_current_dex(&refs, main)?);
//!
//! let classes = sequencer.end_dex(DexInfo::PRIMARY);
//! assert_eq!(classes, vec![main]);
//! # Ok(())
//! # }
//! ```

pub mod dex;
mod errors;
pub mod init_classes;
pub mod interdex;
pub mod util;

pub use errors::*;
