//! Spreading classes over a sequence of dexes
//!
//! [`CapacityUnit`] is the dex being filled, [`PackingSequencer`] seals full units and opens new
//! ones, and [`InterDex`] drives a whole run in startup order.

mod capacity_unit;
mod driver;
#[cfg(test)]
mod fixtures;
mod limits;
mod linear_alloc;
mod refs;
mod sequencer;

pub use capacity_unit::*;
pub use driver::*;
pub use limits::*;
pub use linear_alloc::*;
pub use refs::*;
pub use sequencer::*;
