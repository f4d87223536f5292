//! Schema compiler front end.
//!
//! Schema text is compiled by the `capnp` tool into a `CodeGeneratorRequest`
//! (the same message code generator plugins receive). This module decodes
//! that message into a [`SchemaGraph`]:
//!
//! - [`CompilerParser`] runs `capnp compile -o-` and decodes its stdout
//! - [`PrecompiledParser`] reads a request previously written to disk
//! - [`parse_code_generator_request`] decodes raw request bytes

use std::path::{Path, PathBuf};
use std::process::Command;

use capnp::message::ReaderOptions;
use capnp::schema_capnp::{code_generator_request, field, node, type_};
use capnp::serialize;
use tracing::{debug, trace};

use super::graph::SchemaGraph;
use super::node::{
    EnumNode, Field, FieldKind, InterfaceNode, MethodNode, NestedNode, NodeKind, SchemaNode,
    StructNode, Type,
};
use crate::config::SchemaSettings;
use crate::error::{Error, Result};

/// Discriminant value of fields outside any union.
const NO_DISCRIMINANT: u16 = 0xffff;

/// Source of parsed schema graphs.
///
/// `display_name` names the schema for diagnostics; `imports` are extra
/// directories searched for `import` statements.
pub trait SchemaParser {
    fn parse_disk_file(
        &self,
        display_name: &str,
        path: &Path,
        imports: &[PathBuf],
    ) -> Result<SchemaGraph>;
}

impl<F> SchemaParser for F
where
    F: Fn(&str, &Path, &[PathBuf]) -> Result<SchemaGraph>,
{
    fn parse_disk_file(
        &self,
        display_name: &str,
        path: &Path,
        imports: &[PathBuf],
    ) -> Result<SchemaGraph> {
        self(display_name, path, imports)
    }
}

/// Parses schema files by invoking the `capnp` compiler.
#[derive(Debug, Clone)]
pub struct CompilerParser {
    compiler: PathBuf,
    import_paths: Vec<PathBuf>,
    standard_imports: bool,
}

impl Default for CompilerParser {
    fn default() -> Self {
        Self::from_settings(&SchemaSettings::default())
    }
}

impl CompilerParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &SchemaSettings) -> Self {
        Self {
            compiler: settings.compiler.clone(),
            import_paths: settings.import_paths.clone(),
            standard_imports: settings.include_standard_imports,
        }
    }

    pub fn with_compiler<P: Into<PathBuf>>(mut self, compiler: P) -> Self {
        self.compiler = compiler.into();
        self
    }

    fn command(&self, path: &Path, imports: &[PathBuf]) -> Command {
        let mut cmd = Command::new(&self.compiler);
        cmd.arg("compile").arg("-o-");
        if !self.standard_imports {
            cmd.arg("--no-standard-import");
        }
        for dir in self.import_paths.iter().chain(imports) {
            cmd.arg(format!("--import-path={}", dir.display()));
        }
        cmd.arg(path);
        cmd
    }
}

impl SchemaParser for CompilerParser {
    fn parse_disk_file(
        &self,
        display_name: &str,
        path: &Path,
        imports: &[PathBuf],
    ) -> Result<SchemaGraph> {
        debug!(
            schema = display_name,
            file = %path.display(),
            compiler = %self.compiler.display(),
            "Compiling schema"
        );
        let output = self.command(path, imports).output().map_err(|e| {
            Error::schema_load(format!(
                "failed to run {}: {}",
                self.compiler.display(),
                e
            ))
        })?;
        if !output.status.success() {
            return Err(Error::schema_load(format!(
                "{} failed to compile {}: {}",
                self.compiler.display(),
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_code_generator_request(&output.stdout)
    }
}

/// Reads `CodeGeneratorRequest` files produced ahead of time with
/// `capnp compile -o- schema.capnp > schema.cgr`. Imports are already baked
/// into the request and are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecompiledParser;

impl SchemaParser for PrecompiledParser {
    fn parse_disk_file(
        &self,
        display_name: &str,
        path: &Path,
        _imports: &[PathBuf],
    ) -> Result<SchemaGraph> {
        debug!(schema = display_name, file = %path.display(), "Reading precompiled schema");
        let bytes = std::fs::read(path)?;
        parse_code_generator_request(&bytes)
    }
}

/// Decode a serialized `CodeGeneratorRequest` into a graph rooted at its
/// first requested file.
pub fn parse_code_generator_request(bytes: &[u8]) -> Result<SchemaGraph> {
    let message = serialize::read_message(bytes, ReaderOptions::new())?;
    let request = message.get_root::<code_generator_request::Reader>()?;
    graph_from_request(request)
}

/// Convert an already-decoded request.
pub fn graph_from_request(request: code_generator_request::Reader<'_>) -> Result<SchemaGraph> {
    let requested = request.get_requested_files()?;
    if requested.len() == 0 {
        return Err(Error::schema_load("code generator request names no file"));
    }
    let root = requested.get(0).get_id();

    let nodes = request
        .get_nodes()?
        .iter()
        .map(convert_node)
        .collect::<Result<Vec<_>>>()?;

    trace!(root = format_args!("{root:#018x}"), nodes = nodes.len(), "Decoded schema nodes");
    SchemaGraph::new(root, nodes)
}

fn read_text(text: capnp::Result<capnp::text::Reader<'_>>) -> Result<String> {
    text?
        .to_str()
        .map(str::to_string)
        .map_err(|e| Error::schema_load(format!("invalid utf-8 in schema: {e}")))
}

fn convert_node(reader: node::Reader<'_>) -> Result<SchemaNode> {
    let display_name = read_text(reader.get_display_name())?;
    let prefix = reader.get_display_name_prefix_length() as usize;
    let name = display_name
        .get(prefix..)
        .unwrap_or(display_name.as_str())
        .to_string();

    let nested = reader
        .get_nested_nodes()?
        .iter()
        .map(|n| {
            Ok(NestedNode {
                name: read_text(n.get_name())?,
                id: n.get_id(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let kind = match reader.which()? {
        node::File(()) => NodeKind::File,
        node::Struct(st) => NodeKind::Struct(convert_struct(st)?),
        node::Interface(iface) => NodeKind::Interface(convert_interface(iface)?),
        node::Enum(en) => NodeKind::Enum(EnumNode {
            enumerants: en
                .get_enumerants()?
                .iter()
                .map(|e| read_text(e.get_name()))
                .collect::<Result<Vec<_>>>()?,
        }),
        node::Const(_) => NodeKind::Const,
        node::Annotation(_) => NodeKind::Annotation,
    };

    Ok(SchemaNode {
        id: reader.get_id(),
        display_name,
        name,
        scope_id: reader.get_scope_id(),
        nested,
        kind,
    })
}

fn convert_struct(reader: node::struct_::Reader<'_>) -> Result<StructNode> {
    let mut fields = Vec::new();
    for (index, f) in reader.get_fields()?.iter().enumerate() {
        let discriminant = match f.get_discriminant_value() {
            NO_DISCRIMINANT => None,
            value => Some(value),
        };
        let kind = match f.which()? {
            field::Slot(slot) => FieldKind::Slot(convert_type(slot.get_type()?)?),
            field::Group(group) => FieldKind::Group(group.get_type_id()),
        };
        fields.push(Field {
            index: index as u16,
            name: read_text(f.get_name())?,
            code_order: f.get_code_order(),
            discriminant,
            kind,
        });
    }
    Ok(StructNode {
        fields,
        discriminant_count: reader.get_discriminant_count(),
        is_group: reader.get_is_group(),
    })
}

fn convert_interface(reader: node::interface::Reader<'_>) -> Result<InterfaceNode> {
    let methods = reader
        .get_methods()?
        .iter()
        .enumerate()
        .map(|(index, m)| {
            Ok(MethodNode {
                index: index as u16,
                name: read_text(m.get_name())?,
                code_order: m.get_code_order(),
                param_struct: m.get_param_struct_type(),
                result_struct: m.get_result_struct_type(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let superclasses = reader
        .get_superclasses()?
        .iter()
        .map(|s| s.get_id())
        .collect();
    Ok(InterfaceNode {
        methods,
        superclasses,
    })
}

fn convert_type(reader: type_::Reader<'_>) -> Result<Type> {
    let ty = match reader.which()? {
        type_::Void(()) => Type::Void,
        type_::Bool(()) => Type::Bool,
        type_::Int8(()) => Type::Int8,
        type_::Int16(()) => Type::Int16,
        type_::Int32(()) => Type::Int32,
        type_::Int64(()) => Type::Int64,
        type_::Uint8(()) => Type::UInt8,
        type_::Uint16(()) => Type::UInt16,
        type_::Uint32(()) => Type::UInt32,
        type_::Uint64(()) => Type::UInt64,
        type_::Float32(()) => Type::Float32,
        type_::Float64(()) => Type::Float64,
        type_::Text(()) => Type::Text,
        type_::Data(()) => Type::Data,
        type_::List(list) => Type::List(Box::new(convert_type(list.get_element_type()?)?)),
        type_::Enum(en) => Type::Enum(en.get_type_id()),
        type_::Struct(st) => Type::Struct(st.get_type_id()),
        type_::Interface(iface) => Type::Interface(iface.get_type_id()),
        type_::AnyPointer(_) => Type::AnyPointer,
    };
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_command_arguments() {
        let parser = CompilerParser {
            compiler: PathBuf::from("/opt/capnp/bin/capnp"),
            import_paths: vec![PathBuf::from("/usr/include")],
            standard_imports: false,
        };
        let cmd = parser.command(Path::new("calc.capnp"), &[PathBuf::from("schemas")]);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "compile",
                "-o-",
                "--no-standard-import",
                "--import-path=/usr/include",
                "--import-path=schemas",
                "calc.capnp",
            ]
        );
    }

    #[test]
    fn test_missing_compiler_is_load_error() {
        let parser = CompilerParser::new().with_compiler("/nonexistent/capnp-compiler");
        let err = parser
            .parse_disk_file("calc", Path::new("calc.capnp"), &[])
            .unwrap_err();
        assert!(matches!(err, Error::SchemaLoad(_)));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = parse_code_generator_request(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Capnp(_)));
    }
}
