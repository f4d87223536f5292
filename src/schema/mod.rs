//! Parsed schema model and reflection views.
//!
//! A [`SchemaGraph`] is the immutable node arena produced by one parse. The
//! views ([`Schema`], [`StructSchema`], [`InterfaceSchema`], [`EnumSchema`])
//! are cheap handles that share the graph through an `Arc`, so they can be
//! handed to bindings, dynamic values and requests freely.

mod graph;
mod node;
pub mod parser;

pub use graph::{EnumSchema, InterfaceSchema, Method, Schema, SchemaGraph, StructSchema};
pub use node::{
    EnumNode, Field, FieldKind, InterfaceNode, MethodNode, NestedNode, NodeId, NodeKind,
    SchemaNode, StructNode, Type,
};
pub use parser::{
    graph_from_request, parse_code_generator_request, CompilerParser, PrecompiledParser,
    SchemaParser,
};
