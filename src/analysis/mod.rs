//! # Graph Analysis Module
//!
//! Analysis passes that process the assembled layer graph before any weights
//! are attached.
//!
//! ## Available Passes
//!
//! - [`ShapeResolver`](shape_inference::ShapeResolver): propagates output
//!   shapes through the graph in topological order and declares each layer's
//!   parameter shapes, detecting mismatches before binding.
//!
//! ## How It Works
//!
//! ```text
//! OrderedGraph (unresolved) -> Shape Resolution -> OrderedGraph (shapes + params)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use rustylayers::analysis::shape_inference::ShapeResolver;
//!
//! let mut graph = GraphAssembler::assemble(builder.into_nodes())?;
//! ShapeResolver::resolve(&mut graph)?;
//!
//! // Every node now carries its output shape and parameter declarations
//! ```

pub mod shape_inference;

pub use shape_inference::{ShapeError, ShapeResolver};
