//! Contains the building blocks the session engine is assembled from.
//!
//! The phase machine decides what happens on each second, the callout
//! scheduler decides when a technique is called, and the metronome keeps its
//! own beat clock with the help of the look-ahead scheduler and one-shot timers.

pub mod beat;
pub mod callout;
pub mod metronome;
pub mod phase;
pub(crate) mod timer;
