//! Bar consolidation.
//!
//! Each contract gets a [`ConsolidatorSet`] on its first event: one
//! [`BarConsolidator`] per requested resolution and data kind.
//!
//! ```text
//! Idle ──event──> Accumulating ──boundary / scan / final flush──> queued
//!                      ▲                                            │
//!                      └─────────────── next event ─────────────────┘
//! ```

mod consolidator;
mod set;

pub use consolidator::BarConsolidator;
pub use set::ConsolidatorSet;
