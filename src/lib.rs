//! Overlapping-model Wave Function Collapse.
//!
//! Extracts N×N patterns (optionally closed under flips and rotations) from
//! a source grid, builds the pairwise overlap relation between them, and
//! solves for a destination grid via AC-4 constraint propagation and
//! entropy-driven collapse. Image decoding, CLI argument parsing, and any
//! GUI/visualization loop are left to the caller — this crate only ever
//! reads and writes raw byte grids.
//!
//! ```no_run
//! use wfc_core::{generate, GridBuf, GridView, WfcOptions};
//!
//! let src_data = [0u8, 1, 1, 0, 1, 0, 0, 1, 1];
//! let src = GridView::new(3, 3, 1, &src_data).unwrap();
//! let mut dst = GridBuf::new(16, 16, 1);
//! let mut rng = wfc_core::default_rng();
//!
//! let status = generate(2, WfcOptions::ROTATE | WfcOptions::FLIP, 1, src, &mut dst, &mut rng).unwrap();
//! assert_eq!(status, wfc_core::Status::Completed);
//! ```

mod grid;
mod options;
mod overlap;
mod pattern;
mod rng;
mod state;
mod wave;

#[cfg(test)]
mod test_support;

pub use grid::{GridBuf, GridView};
pub use options::{Status, WfcError, WfcOptions};
pub use pattern::Transform;
pub use rng::{default_rng, RandRng, WfcRng};
pub use state::{generate, generate_ex, WfcState};
