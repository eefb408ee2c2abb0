//! `tg-schema` — deterministic JSON-Schema generation for tool inputs.
//!
//! Host endpoints describe their input with a [`TypeShape`]; the
//! [`SchemaBuilder`] turns a shape into a JSON-Schema Draft 2020-12
//! document. Two invocations on the same shape yield byte-identical
//! JSON, and record schemas are cached behind a concurrent map.

mod builder;

pub use builder::{Field, SchemaBuilder, TypeShape};
