//! Weft Resolver
//!
//! Turns a vertex's inbound edges and template fields into the parameters its
//! component is built with.
//!
//! Resolution happens in two passes:
//! 1. Edge pass: every inbound edge becomes a reference to an upstream output
//!    (a list of references for list fields, a keyed reference when the field
//!    holds a single-key mapping).
//! 2. Field pass: every remaining visible field is coerced according to its
//!    declared type (see [`FieldSpec`]).
//!
//! Upstream references stay symbolic until the engine calls
//! [`ResolvedParams::materialize`] with the values built so far.

mod error;
mod field;
mod literal;
mod params;
mod resolver;
mod table;

pub use error::ResolveError;
pub use field::FieldSpec;
pub use literal::{LiteralError, parse_literal};
pub use params::{ParamValue, ResolvedParams, Upstream};
pub use resolver::{Resolver, StandardResolver};
pub use table::Table;
