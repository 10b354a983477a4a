use thiserror::Error;

/// Errors raised while building the class graph or packing classes into dexes
///
/// Running out of room in the current dex is _not_ an error: admission checks report that as a
/// plain `false` so that the caller can seal the dex and retry.
#[derive(Error, Debug)]
pub enum Error {
    /// The same class was offered twice to one packing run (indicates a bug in the caller's
    /// priority order or class set)
    #[error("Can't emit the same class twice: {0}")]
    DuplicateClass(String),

    /// A second class definition was added for a type that already has one
    #[error("Type {0} is already defined")]
    DuplicateDefinition(String),

    /// A member definition clashes with an existing member of the same signature
    #[error("Member {0} conflicts with an existing member")]
    ConflictingMember(String),

    /// A class could not be placed even in a freshly opened dex
    #[error("Class {0} does not fit into an empty dex")]
    UnsatisfiableClass(String),

    /// Canary names only have room for two digits
    #[error("Too many secondary dexes: {0} (at most {max})", max = crate::interdex::MAX_DEX_NUM)]
    TooManyDexes(usize),

    /// A class, member, or type name failed validation
    #[error("Malformed name: {0}")]
    MalformedName(String),
}
