//! The phases of a patchpin run.
//!
//! ## Overview
//!
//! 1. Ref Resolution - pin the base, best-effort and upstream refs locally
//! 2. Commit Extraction - list the best-effort commits not in upstream or base
//! 3. External Patch Loading - read the must-apply patches a recipe declares
//! 4. Materialization - turn best-effort commits into labelled patches
//! 5. Simulation - apply both groups to a scratch index and decide the series
//! 6. Writing - emit the numbered series and its archive
//! 7. Rendering - fill the package manifest template
//!
//! Phases 2 and 3 are independent of each other; both only need phase 1.
//! [`orchestrator`] drives the sequence.

pub mod external;
pub mod extract;
pub mod materialize;
pub mod orchestrator;
pub mod render;
pub mod resolve;
pub mod simulate;
pub mod write;

pub use extract as phase2;
pub use external as phase3;
pub use materialize as phase4;
pub use render as phase7;
pub use resolve as phase1;
pub use simulate as phase5;
pub use write as phase6;
