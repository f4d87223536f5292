//! Schema node data as produced by the schema compiler front end.

use std::fmt;

/// 64-bit Cap'n Proto node id.
pub type NodeId = u64;

/// One node of a parsed schema: a file, struct, interface, enum, const or
/// annotation declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub id: NodeId,
    /// Fully qualified name, e.g. `calculator.capnp:Calculator.Expression`.
    pub display_name: String,
    /// Unqualified name, e.g. `Expression`.
    pub name: String,
    /// Id of the lexically enclosing node (0 for files).
    pub scope_id: NodeId,
    /// Named declarations nested inside this node, in declaration order.
    pub nested: Vec<NestedNode>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedNode {
    pub name: String,
    pub id: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    File,
    Struct(StructNode),
    Interface(InterfaceNode),
    Enum(EnumNode),
    Const,
    Annotation,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Struct(_) => "struct",
            NodeKind::Interface(_) => "interface",
            NodeKind::Enum(_) => "enum",
            NodeKind::Const => "const",
            NodeKind::Annotation => "annotation",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructNode {
    pub fields: Vec<Field>,
    /// Number of union members; zero when the struct has no unnamed union.
    pub discriminant_count: u16,
    /// Groups are structs that share their parent's storage.
    pub is_group: bool,
}

/// A struct field descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Ordinal of the field within the struct's field table.
    pub index: u16,
    pub name: String,
    pub code_order: u16,
    /// Union tag of the field, `None` when the field is not a union member.
    pub discriminant: Option<u16>,
    pub kind: FieldKind,
}

impl Field {
    pub fn is_union_member(&self) -> bool {
        self.discriminant.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Slot(Type),
    /// Group field whose members live in the referenced group node.
    Group(NodeId),
}

/// Declared type of a slot field or list element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Text,
    Data,
    List(Box<Type>),
    Enum(NodeId),
    Struct(NodeId),
    Interface(NodeId),
    AnyPointer,
}

impl Type {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
        )
    }

    /// Inclusive range representable by an integer type.
    pub(crate) fn integer_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self {
            Type::Int8 => (i8::MIN as i128, i8::MAX as i128),
            Type::Int16 => (i16::MIN as i128, i16::MAX as i128),
            Type::Int32 => (i32::MIN as i128, i32::MAX as i128),
            Type::Int64 => (i64::MIN as i128, i64::MAX as i128),
            Type::UInt8 => (0, u8::MAX as i128),
            Type::UInt16 => (0, u16::MAX as i128),
            Type::UInt32 => (0, u32::MAX as i128),
            Type::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(bounds)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("Void"),
            Type::Bool => f.write_str("Bool"),
            Type::Int8 => f.write_str("Int8"),
            Type::Int16 => f.write_str("Int16"),
            Type::Int32 => f.write_str("Int32"),
            Type::Int64 => f.write_str("Int64"),
            Type::UInt8 => f.write_str("UInt8"),
            Type::UInt16 => f.write_str("UInt16"),
            Type::UInt32 => f.write_str("UInt32"),
            Type::UInt64 => f.write_str("UInt64"),
            Type::Float32 => f.write_str("Float32"),
            Type::Float64 => f.write_str("Float64"),
            Type::Text => f.write_str("Text"),
            Type::Data => f.write_str("Data"),
            Type::List(element) => write!(f, "List({element})"),
            Type::Enum(id) => write!(f, "Enum({id:#x})"),
            Type::Struct(id) => write!(f, "Struct({id:#x})"),
            Type::Interface(id) => write!(f, "Interface({id:#x})"),
            Type::AnyPointer => f.write_str("AnyPointer"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceNode {
    pub methods: Vec<MethodNode>,
    pub superclasses: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    /// Method ordinal used on the wire.
    pub index: u16,
    pub name: String,
    pub code_order: u16,
    pub param_struct: NodeId,
    pub result_struct: NodeId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumNode {
    /// Enumerant names; the ordinal is the position.
    pub enumerants: Vec<String>,
}
