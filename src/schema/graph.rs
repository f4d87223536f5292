//! Immutable schema arena and the typed views handed out over it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::node::{EnumNode, Field, FieldKind, InterfaceNode, NodeId, NodeKind, SchemaNode, StructNode};
use crate::error::{Error, Result};

/// Arena of every node produced by one schema parse, rooted at the requested
/// file node.
///
/// Construction validates every id the views later dereference (nested
/// nodes, groups, method parameter and result structs, superclasses) and
/// that field and method ordinals match their table positions, so the views
/// never see a dangling reference to those.
#[derive(Debug)]
pub struct SchemaGraph {
    root: usize,
    nodes: Vec<SchemaNode>,
    index: HashMap<NodeId, usize>,
}

impl SchemaGraph {
    pub fn new(root: NodeId, nodes: Vec<SchemaNode>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id, position).is_some() {
                return Err(Error::schema_load(format!(
                    "duplicate node id {:#018x} ({})",
                    node.id, node.display_name
                )));
            }
        }
        let root = *index.get(&root).ok_or(Error::UnknownNode(root))?;

        let graph = Self { root, nodes, index };
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            for nested in &node.nested {
                self.expect_node(node, nested.id)?;
            }
            match &node.kind {
                NodeKind::Struct(st) => {
                    for (position, field) in st.fields.iter().enumerate() {
                        if usize::from(field.index) != position {
                            return Err(Error::schema_load(format!(
                                "field {}.{} has index {} at position {}",
                                node.display_name, field.name, field.index, position
                            )));
                        }
                        if let FieldKind::Group(group_id) = field.kind {
                            let group = self.expect_node(node, group_id)?;
                            if !matches!(group.kind, NodeKind::Struct(_)) {
                                return Err(Error::schema_load(format!(
                                    "group {}.{} does not refer to a struct node",
                                    node.display_name, field.name
                                )));
                            }
                        }
                    }
                }
                NodeKind::Interface(iface) => {
                    for (position, method) in iface.methods.iter().enumerate() {
                        if usize::from(method.index) != position {
                            return Err(Error::schema_load(format!(
                                "method {}.{} has ordinal {} at position {}",
                                node.display_name, method.name, method.index, position
                            )));
                        }
                        for id in [method.param_struct, method.result_struct] {
                            let target = self.expect_node(node, id)?;
                            if !matches!(target.kind, NodeKind::Struct(_)) {
                                return Err(Error::schema_load(format!(
                                    "method {}.{} refers to non-struct node {}",
                                    node.display_name, method.name, target.display_name
                                )));
                            }
                        }
                    }
                    for &id in &iface.superclasses {
                        let superclass = self.expect_node(node, id)?;
                        if !matches!(superclass.kind, NodeKind::Interface(_)) {
                            return Err(Error::schema_load(format!(
                                "superclass of {} is not an interface",
                                node.display_name
                            )));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn expect_node(&self, from: &SchemaNode, id: NodeId) -> Result<&SchemaNode> {
        self.node(id).map_err(|_| {
            Error::schema_load(format!(
                "{} references missing node {:#018x}",
                from.display_name, id
            ))
        })
    }

    pub fn root(&self) -> &SchemaNode {
        &self.nodes[self.root]
    }

    pub fn node(&self, id: NodeId) -> Result<&SchemaNode> {
        self.index
            .get(&id)
            .map(|&position| &self.nodes[position])
            .ok_or(Error::UnknownNode(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SchemaNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Handle to a single node of a shared [`SchemaGraph`].
#[derive(Clone)]
pub struct Schema {
    graph: Arc<SchemaGraph>,
    position: usize,
}

impl Schema {
    /// View of the graph's root node.
    pub fn root(graph: Arc<SchemaGraph>) -> Self {
        let position = graph.root;
        Self { graph, position }
    }

    /// View of an arbitrary node of the graph.
    pub fn of(graph: &Arc<SchemaGraph>, id: NodeId) -> Result<Self> {
        let position = *graph.index.get(&id).ok_or(Error::UnknownNode(id))?;
        Ok(Self {
            graph: Arc::clone(graph),
            position,
        })
    }

    pub fn graph(&self) -> &Arc<SchemaGraph> {
        &self.graph
    }

    pub fn proto(&self) -> &SchemaNode {
        &self.graph.nodes[self.position]
    }

    pub fn id(&self) -> NodeId {
        self.proto().id
    }

    /// Nested declaration by its schema name (not the capitalized binding key).
    pub fn nested(&self, name: &str) -> Result<Schema> {
        let nested = self
            .proto()
            .nested
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| {
                Error::BindingNotFound(format!("{}.{}", self.proto().display_name, name))
            })?;
        Schema::of(&self.graph, nested.id)
    }

    pub fn as_struct(&self) -> Result<StructSchema> {
        match self.proto().kind {
            NodeKind::Struct(_) => Ok(StructSchema {
                schema: self.clone(),
            }),
            ref other => Err(Error::type_mismatch(
                &self.proto().display_name,
                "struct",
                other.label(),
            )),
        }
    }

    pub fn as_interface(&self) -> Result<InterfaceSchema> {
        match self.proto().kind {
            NodeKind::Interface(_) => Ok(InterfaceSchema {
                schema: self.clone(),
            }),
            ref other => Err(Error::type_mismatch(
                &self.proto().display_name,
                "interface",
                other.label(),
            )),
        }
    }

    pub fn as_enum(&self) -> Result<EnumSchema> {
        match self.proto().kind {
            NodeKind::Enum(_) => Ok(EnumSchema {
                schema: self.clone(),
            }),
            ref other => Err(Error::type_mismatch(
                &self.proto().display_name,
                "enum",
                other.label(),
            )),
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("id", &format_args!("{:#018x}", self.id()))
            .field("name", &self.proto().display_name)
            .finish()
    }
}

/// Two views are equal when they name the same node id.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

/// Struct view: field table and union layout.
#[derive(Clone, Debug, PartialEq)]
pub struct StructSchema {
    schema: Schema,
}

impl StructSchema {
    fn node(&self) -> &StructNode {
        match &self.schema.proto().kind {
            NodeKind::Struct(node) => node,
            _ => unreachable!("StructSchema is only built over struct nodes"),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn id(&self) -> NodeId {
        self.schema.id()
    }

    pub fn name(&self) -> &str {
        &self.schema.proto().name
    }

    pub fn display_name(&self) -> &str {
        &self.schema.proto().display_name
    }

    pub fn fields(&self) -> &[Field] {
        &self.node().fields
    }

    pub fn find_field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Strict field lookup.
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.find_field_by_name(name)
            .ok_or_else(|| Error::field_not_found(self.name(), name))
    }

    pub fn field_by_index(&self, index: u16) -> Option<&Field> {
        self.fields().get(index as usize)
    }

    pub fn has_union(&self) -> bool {
        self.node().discriminant_count > 0
    }

    pub fn is_group(&self) -> bool {
        self.node().is_group
    }

    pub fn union_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields().iter().filter(|f| f.is_union_member())
    }

    pub fn non_union_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields().iter().filter(|f| !f.is_union_member())
    }

    pub fn field_for_discriminant(&self, discriminant: u16) -> Option<&Field> {
        self.union_fields()
            .find(|f| f.discriminant == Some(discriminant))
    }

    /// Resolve another struct node of the same graph (nested struct types,
    /// groups).
    pub fn struct_schema(&self, id: NodeId) -> Result<StructSchema> {
        Schema::of(self.schema.graph(), id)?.as_struct()
    }

    pub fn enum_schema(&self, id: NodeId) -> Result<EnumSchema> {
        Schema::of(self.schema.graph(), id)?.as_enum()
    }

    pub fn interface_schema(&self, id: NodeId) -> Result<InterfaceSchema> {
        Schema::of(self.schema.graph(), id)?.as_interface()
    }
}

/// Interface view: method table, including inherited methods.
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceSchema {
    schema: Schema,
}

impl InterfaceSchema {
    fn node(&self) -> &InterfaceNode {
        match &self.schema.proto().kind {
            NodeKind::Interface(node) => node,
            _ => unreachable!("InterfaceSchema is only built over interface nodes"),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn id(&self) -> NodeId {
        self.schema.id()
    }

    pub fn name(&self) -> &str {
        &self.schema.proto().name
    }

    pub fn display_name(&self) -> &str {
        &self.schema.proto().display_name
    }

    /// Methods declared directly on this interface.
    pub fn methods(&self) -> Result<Vec<Method>> {
        (0..self.node().methods.len())
            .map(|position| self.method_at(position))
            .collect()
    }

    fn method_at(&self, position: usize) -> Result<Method> {
        let node = &self.node().methods[position];
        let graph = self.schema.graph();
        Ok(Method {
            interface: self.clone(),
            ordinal: node.index,
            name: node.name.clone(),
            params: Schema::of(graph, node.param_struct)?.as_struct()?,
            results: Schema::of(graph, node.result_struct)?.as_struct()?,
        })
    }

    pub fn superclasses(&self) -> Result<Vec<InterfaceSchema>> {
        self.node()
            .superclasses
            .iter()
            .map(|&id| Schema::of(self.schema.graph(), id)?.as_interface())
            .collect()
    }

    /// Breadth-first walk of this interface and its ancestors, each visited once.
    fn lineage(&self) -> Result<Vec<InterfaceSchema>> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::from([self.clone()]);
        while let Some(iface) = queue.pop_front() {
            if !seen.insert(iface.id()) {
                continue;
            }
            queue.extend(iface.superclasses()?);
            order.push(iface);
        }
        Ok(order)
    }

    fn lookup_method(&self, name: &str) -> Result<Option<Method>> {
        for iface in self.lineage()? {
            if let Some(position) = iface.node().methods.iter().position(|m| m.name == name) {
                return iface.method_at(position).map(Some);
            }
        }
        Ok(None)
    }

    /// Non-failing lookup; own methods shadow inherited ones.
    pub fn find_method(&self, name: &str) -> Option<Method> {
        self.lookup_method(name).ok().flatten()
    }

    /// Strict lookup, failing with `MethodNotFound`.
    pub fn method(&self, name: &str) -> Result<Method> {
        self.lookup_method(name)?
            .ok_or_else(|| Error::MethodNotFound(name.to_string()))
    }

    pub fn method_by_ordinal(&self, ordinal: u16) -> Option<Method> {
        let position = self.node().methods.iter().position(|m| m.index == ordinal)?;
        self.method_at(position).ok()
    }

    /// True when `self` is `other` or inherits from it.
    pub fn extends(&self, other: &InterfaceSchema) -> bool {
        self.lineage()
            .map(|lineage| lineage.iter().any(|iface| iface.id() == other.id()))
            .unwrap_or(false)
    }
}

/// Descriptor of one interface method.
#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    interface: InterfaceSchema,
    ordinal: u16,
    name: String,
    params: StructSchema,
    results: StructSchema,
}

impl Method {
    /// Declaring interface.
    pub fn interface(&self) -> &InterfaceSchema {
        &self.interface
    }

    pub fn ordinal(&self) -> u16 {
        self.ordinal
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &StructSchema {
        &self.params
    }

    pub fn results(&self) -> &StructSchema {
        &self.results
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.interface.name(), self.name, self.ordinal)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumSchema {
    schema: Schema,
}

impl EnumSchema {
    fn node(&self) -> &EnumNode {
        match &self.schema.proto().kind {
            NodeKind::Enum(node) => node,
            _ => unreachable!("EnumSchema is only built over enum nodes"),
        }
    }

    pub fn id(&self) -> NodeId {
        self.schema.id()
    }

    pub fn name(&self) -> &str {
        &self.schema.proto().name
    }

    pub fn enumerants(&self) -> &[String] {
        &self.node().enumerants
    }

    pub fn ordinal_of(&self, name: &str) -> Option<u16> {
        self.enumerants()
            .iter()
            .position(|e| e == name)
            .map(|p| p as u16)
    }

    pub fn name_of(&self, ordinal: u16) -> Option<&str> {
        self.enumerants().get(ordinal as usize).map(String::as_str)
    }
}
