//! Binding namespaces built from parsed schemas.
//!
//! Loading a schema into a [`Namespace`] mirrors the schema's nesting as an
//! arena of [`Binding`]s. Every nested declaration gets a binding keyed by
//! its name with the first character upper-cased; struct and interface
//! declarations additionally carry their reflection schema.
//!
//! ```ignore
//! let mut ns = Namespace::new("Calculator");
//! ns.load_schema(&CompilerParser::new(), "calculator.capnp", &[])?;
//! let expression = ns.resolve("Calculator::Expression")?.new_message()?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::dynamic::{DynamicStruct, JsonCodec, MessageCodec};
use crate::error::{Error, Result};
use crate::schema::{
    InterfaceSchema, Method, NodeId, NodeKind, Schema, SchemaGraph, SchemaParser, StructSchema,
};

/// Separator for binding paths in [`Namespace::resolve`].
pub const PATH_SEPARATOR: &str = "::";

/// Index of a binding within its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(usize);

/// What a binding carries.
#[derive(Debug, Clone)]
pub enum BindingKind {
    /// Pure container (files, enums, consts, annotations, unloaded roots).
    Namespace,
    Struct(StructSchema),
    Interface(InterfaceSchema),
}

#[derive(Debug, Clone)]
pub struct Binding {
    id: BindingId,
    name: String,
    parent: Option<BindingId>,
    children: Vec<BindingId>,
    schema: Option<Schema>,
    kind: BindingKind,
}

impl Binding {
    fn container(id: BindingId, name: String) -> Self {
        Self {
            id,
            name,
            parent: None,
            children: Vec::new(),
            schema: None,
            kind: BindingKind::Namespace,
        }
    }

    fn bound(id: BindingId, name: String, parent: Option<BindingId>, schema: &Schema) -> Result<Self> {
        let kind = match schema.proto().kind {
            NodeKind::Struct(_) => BindingKind::Struct(schema.as_struct()?),
            NodeKind::Interface(_) => BindingKind::Interface(schema.as_interface()?),
            _ => BindingKind::Namespace,
        };
        Ok(Self {
            id,
            name,
            parent,
            children: Vec::new(),
            schema: Some(schema.clone()),
            kind,
        })
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    /// Binding key (capitalized nested name; the display name for the root).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<BindingId> {
        self.parent
    }

    pub fn children(&self) -> &[BindingId] {
        &self.children
    }

    pub fn kind(&self) -> &BindingKind {
        &self.kind
    }

    /// Schema node behind this binding; `None` only for an unloaded root.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.schema.as_ref().map(Schema::id)
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, BindingKind::Struct(_))
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, BindingKind::Interface(_))
    }

    pub fn as_struct(&self) -> Result<&StructSchema> {
        match &self.kind {
            BindingKind::Struct(schema) => Ok(schema),
            _ => Err(Error::type_mismatch(&self.name, "struct binding", self.kind_label())),
        }
    }

    pub fn as_interface(&self) -> Result<&InterfaceSchema> {
        match &self.kind {
            BindingKind::Interface(schema) => Ok(schema),
            _ => Err(Error::type_mismatch(&self.name, "interface binding", self.kind_label())),
        }
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            BindingKind::Namespace => "namespace",
            BindingKind::Struct(_) => "struct binding",
            BindingKind::Interface(_) => "interface binding",
        }
    }

    /// Non-failing method lookup; `None` on non-interface bindings.
    pub fn find_method(&self, name: &str) -> Option<Method> {
        match &self.kind {
            BindingKind::Interface(schema) => schema.find_method(name),
            _ => None,
        }
    }

    /// Strict method lookup.
    pub fn method(&self, name: &str) -> Result<Method> {
        self.as_interface()?.method(name)
    }

    /// Fresh root struct of this binding's type.
    pub fn new_message(&self) -> Result<DynamicStruct> {
        Ok(DynamicStruct::new(self.as_struct()?.clone()))
    }

    /// Read a message of this binding's type with the default codec.
    pub fn read_from(&self, input: &mut dyn Read) -> Result<DynamicStruct> {
        self.read_with(&JsonCodec, input)
    }

    pub fn read_with<C: MessageCodec + ?Sized>(
        &self,
        codec: &C,
        input: &mut dyn Read,
    ) -> Result<DynamicStruct> {
        codec.read_message(input, self.as_struct()?)
    }

    pub fn make_from_bytes(&self, mut bytes: &[u8]) -> Result<DynamicStruct> {
        self.read_from(&mut bytes)
    }

    pub fn read_packed_from(&self, input: &mut dyn Read) -> Result<DynamicStruct> {
        JsonCodec.read_packed_message(input, self.as_struct()?)
    }
}

/// Arena of bindings mirroring one schema file's nesting.
pub struct Namespace {
    display_name: String,
    bindings: Vec<Binding>,
    graph: Option<Arc<SchemaGraph>>,
}

impl Namespace {
    pub fn new<S: Into<String>>(display_name: S) -> Self {
        let display_name = display_name.into();
        Self {
            bindings: vec![Binding::container(BindingId(0), display_name.clone())],
            display_name,
            graph: None,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_loaded(&self) -> bool {
        self.graph.is_some()
    }

    pub fn schema_graph(&self) -> Option<&Arc<SchemaGraph>> {
        self.graph.as_ref()
    }

    /// Parse `file` and bind every nested declaration.
    ///
    /// The bindings are built aside and installed only when the whole walk
    /// succeeds; on error the namespace is left as it was. A namespace holds
    /// at most one schema.
    pub fn load_schema<P>(&mut self, parser: &P, file: impl AsRef<Path>, imports: &[PathBuf]) -> Result<()>
    where
        P: SchemaParser + ?Sized,
    {
        if self.is_loaded() {
            return Err(Error::AlreadyLoaded(self.display_name.clone()));
        }
        let file = file.as_ref();
        debug!(namespace = %self.display_name, file = %file.display(), "Loading schema");
        let graph = parser.parse_disk_file(&self.display_name, file, imports)?;
        self.load_graph(graph)
    }

    /// Bind an already-parsed graph.
    pub fn load_graph(&mut self, graph: SchemaGraph) -> Result<()> {
        if self.is_loaded() {
            return Err(Error::AlreadyLoaded(self.display_name.clone()));
        }
        let graph = Arc::new(graph);
        let bindings = bind(&graph, &self.display_name)?;
        info!(
            namespace = %self.display_name,
            nodes = graph.len(),
            bindings = bindings.len(),
            "Schema bound"
        );
        self.bindings = bindings;
        self.graph = Some(graph);
        Ok(())
    }

    pub fn root(&self) -> &Binding {
        &self.bindings[0]
    }

    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id.0)
    }

    pub fn child(&self, parent: BindingId, name: &str) -> Option<&Binding> {
        self.get(parent)?
            .children
            .iter()
            .map(|c| &self.bindings[c.0])
            .find(|b| b.name == name)
    }

    /// Look up a binding by `::`-separated path relative to the root, e.g.
    /// `Calculator::Expression`. The empty path is the root.
    pub fn resolve(&self, path: &str) -> Result<&Binding> {
        let mut current = self.root();
        for segment in path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            current = self
                .child(current.id, segment)
                .ok_or_else(|| Error::BindingNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Path of a binding relative to the root.
    pub fn path_of(&self, id: BindingId) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent {
            segments.push(current.name.as_str());
            current = self.get(parent)?;
        }
        segments.reverse();
        Some(segments.join(PATH_SEPARATOR))
    }

    /// All bindings in creation (depth-first) order, root first.
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    /// Number of bindings, counting the root. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("display_name", &self.display_name)
            .field("bindings", &self.bindings.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Upper-case the first character of a nested name.
pub fn binding_key(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn bind(graph: &Arc<SchemaGraph>, display_name: &str) -> Result<Vec<Binding>> {
    let root = Schema::root(Arc::clone(graph));
    let mut bindings = vec![Binding::bound(BindingId(0), display_name.to_string(), None, &root)?];
    let mut visited = HashSet::from([root.id()]);
    visit(&mut bindings, &mut visited, BindingId(0), &root)?;
    Ok(bindings)
}

fn visit(
    bindings: &mut Vec<Binding>,
    visited: &mut HashSet<NodeId>,
    slot: BindingId,
    schema: &Schema,
) -> Result<()> {
    for nested in &schema.proto().nested {
        if !visited.insert(nested.id) {
            return Err(Error::schema_load(format!(
                "node {:#018x} ({}) is nested more than once",
                nested.id, nested.name
            )));
        }
        let key = binding_key(&nested.name);
        let duplicate = bindings[slot.0]
            .children
            .iter()
            .any(|c| bindings[c.0].name == key);
        if duplicate {
            return Err(Error::schema_load(format!(
                "binding key {key} collides inside {}",
                schema.proto().display_name
            )));
        }

        let child_schema = Schema::of(schema.graph(), nested.id)?;
        let child = BindingId(bindings.len());
        bindings.push(Binding::bound(child, key, Some(slot), &child_schema)?);
        bindings[slot.0].children.push(child);
        visit(bindings, visited, child, &child_schema)?;
    }
    Ok(())
}
