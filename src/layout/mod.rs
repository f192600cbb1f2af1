//! Layout Module
//!
//! Runs the flexbox solver over a resolved tree and flattens the result
//! into the render units mount consumes.
//!
//! # Architecture
//!
//! The solver is [Taffy](https://github.com/DioxusLabs/taffy), used as a
//! black box. The pipeline:
//!
//! 1. Mirrors the resolved tree into a result arena and a Taffy tree
//! 2. Measures leaves and nested tree holders from the solver's callback,
//!    reusing earlier measurements wherever the specs repeat
//! 3. Extracts geometry back into the result arena
//! 4. Collects render units with stable output ids
//!
//! # Example
//!
//! ```ignore
//! use tessera::layout::{calculate_layout, LayoutOutcome};
//! use tessera::types::SizeSpec;
//!
//! let outcome = calculate_layout(&env, &tree, SizeSpec::exactly(320.0),
//!     SizeSpec::unspecified(), previous.as_ref(), false)?;
//! ```

mod collect;
mod engine;
mod layout_state;
mod output_id;
mod result;
mod taffy_bridge;

pub use engine::{LayoutOutcome, calculate_layout, measure_tree};
pub use layout_state::*;
pub use output_id::*;
pub use result::{LayoutResultTree, MeasureRecord, ResultNode};

pub(crate) use result::NestedResult;
