//! Shared fixtures: a calculator schema encoded as a `CodeGeneratorRequest`
//! and an in-process calculator server built on it.
#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use capnp::message;
use capnp::schema_capnp::{code_generator_request, node, type_};
use futures::future::{BoxFuture, FutureExt};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

use capnp_dynamic::prelude::*;
use capnp_dynamic::schema::{parse_code_generator_request, InterfaceSchema, Method, SchemaGraph};

pub mod ids {
    pub const FILE: u64 = 0xa000_0000_0000_0000;
    pub const CALCULATOR: u64 = 0xa100_0000_0000_0000;
    pub const EXPRESSION: u64 = 0xa110_0000_0000_0000;
    pub const EXPRESSION_CALL: u64 = 0xa111_0000_0000_0000;
    pub const VALUE: u64 = 0xa120_0000_0000_0000;
    pub const FUNCTION: u64 = 0xa130_0000_0000_0000;
    pub const EVALUATE_PARAMS: u64 = 0xa140_0000_0000_0000;
    pub const EVALUATE_RESULTS: u64 = 0xa141_0000_0000_0000;
    pub const GET_OPERATOR_PARAMS: u64 = 0xa142_0000_0000_0000;
    pub const GET_OPERATOR_RESULTS: u64 = 0xa143_0000_0000_0000;
    pub const READ_PARAMS: u64 = 0xa150_0000_0000_0000;
    pub const READ_RESULTS: u64 = 0xa151_0000_0000_0000;
    pub const CALL_PARAMS: u64 = 0xa152_0000_0000_0000;
    pub const CALL_RESULTS: u64 = 0xa153_0000_0000_0000;
    pub const SCALED_VALUE: u64 = 0xa160_0000_0000_0000;
    pub const SCALE_PARAMS: u64 = 0xa161_0000_0000_0000;
    pub const SCALE_RESULTS: u64 = 0xa162_0000_0000_0000;
    pub const OPERATOR: u64 = 0xa200_0000_0000_0000;
    pub const PERSON: u64 = 0xa300_0000_0000_0000;
    pub const PHONE_NUMBER: u64 = 0xa310_0000_0000_0000;
    pub const PHONE_TYPE: u64 = 0xa311_0000_0000_0000;
    pub const PERSON_ADDRESS: u64 = 0xa320_0000_0000_0000;
    pub const PI: u64 = 0xa400_0000_0000_0000;
}

use ids::*;

/// Install a test-friendly subscriber; honours `RUST_LOG`.
pub fn setup_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .try_init();
}

enum Ty {
    Void,
    Bool,
    UInt8,
    UInt32,
    Float64,
    Text,
    Data,
    List(Box<Ty>),
    Struct(u64),
    Interface(u64),
    Enum(u64),
}

enum Member {
    Slot(Ty),
    Group(u64),
}

struct FieldDef {
    name: &'static str,
    discriminant: Option<u16>,
    member: Member,
}

fn slot(name: &'static str, ty: Ty) -> FieldDef {
    FieldDef {
        name,
        discriminant: None,
        member: Member::Slot(ty),
    }
}

fn union_slot(name: &'static str, discriminant: u16, ty: Ty) -> FieldDef {
    FieldDef {
        name,
        discriminant: Some(discriminant),
        member: Member::Slot(ty),
    }
}

enum Body {
    File,
    Const,
    Struct {
        fields: Vec<FieldDef>,
        discriminant_count: u16,
        is_group: bool,
    },
    Interface {
        methods: Vec<(&'static str, u64, u64)>,
        superclasses: Vec<u64>,
    },
    Enum(Vec<&'static str>),
}

struct NodeDef {
    id: u64,
    display_name: &'static str,
    scope: u64,
    nested: Vec<(&'static str, u64)>,
    body: Body,
}

fn def(id: u64, display_name: &'static str, scope: u64, nested: Vec<(&'static str, u64)>, body: Body) -> NodeDef {
    NodeDef {
        id,
        display_name,
        scope,
        nested,
        body,
    }
}

fn plain_struct(fields: Vec<FieldDef>) -> Body {
    Body::Struct {
        fields,
        discriminant_count: 0,
        is_group: false,
    }
}

/// Node table of:
///
/// ```capnp
/// interface Calculator {
///   evaluate @0 (expression :Expression) -> (value :Value);
///   getOperator @1 (op :Operator) -> (func :Function);
///
///   struct Expression {
///     union {
///       literal @0 :Float64;
///       previousResult @1 :Value;
///       parameter @2 :UInt32;
///       call :group { function @3 :Function; params @4 :List(Expression); }
///     }
///   }
///   interface Value { read @0 () -> (value :Float64); }
///   interface Function { call @0 (params :List(Float64)) -> (value :Float64); }
///   interface ScaledValue extends(Value) { scale @0 () -> (factor :Float64); }
/// }
/// enum Operator { add @0; subtract @1; multiply @2; divide @3; }
/// struct Person {
///   name @0 :Text; age @1 :UInt8; photo @2 :Data; phones @3 :List(PhoneNumber);
///   employment :union { unemployed @4 :Void; employer @5 :Text; school @6 :Text; }
///   address :group { street @7 :Text; city @8 :Text; }
///   verified @9 :Bool;
///   struct PhoneNumber { number @0 :Text; type @1 :Type; enum Type { mobile @0; home @1; work @2; } }
/// }
/// const pi :Float64 = 3.14159;
/// ```
///
/// `employment` is written as the top-level union of `Person` to exercise
/// `which`.
fn calculator_nodes() -> Vec<NodeDef> {
    vec![
        def(
            FILE,
            "calculator.capnp",
            0,
            vec![("Calculator", CALCULATOR), ("Operator", OPERATOR), ("Person", PERSON), ("pi", PI)],
            Body::File,
        ),
        def(
            CALCULATOR,
            "calculator.capnp:Calculator",
            FILE,
            vec![
                ("Expression", EXPRESSION),
                ("Value", VALUE),
                ("Function", FUNCTION),
                ("ScaledValue", SCALED_VALUE),
            ],
            Body::Interface {
                methods: vec![
                    ("evaluate", EVALUATE_PARAMS, EVALUATE_RESULTS),
                    ("getOperator", GET_OPERATOR_PARAMS, GET_OPERATOR_RESULTS),
                ],
                superclasses: vec![],
            },
        ),
        def(
            EXPRESSION,
            "calculator.capnp:Calculator.Expression",
            CALCULATOR,
            vec![],
            Body::Struct {
                fields: vec![
                    union_slot("literal", 0, Ty::Float64),
                    union_slot("previousResult", 1, Ty::Interface(VALUE)),
                    union_slot("parameter", 2, Ty::UInt32),
                    FieldDef {
                        name: "call",
                        discriminant: Some(3),
                        member: Member::Group(EXPRESSION_CALL),
                    },
                ],
                discriminant_count: 4,
                is_group: false,
            },
        ),
        def(
            EXPRESSION_CALL,
            "calculator.capnp:Calculator.Expression.call",
            EXPRESSION,
            vec![],
            Body::Struct {
                fields: vec![
                    slot("function", Ty::Interface(FUNCTION)),
                    slot("params", Ty::List(Box::new(Ty::Struct(EXPRESSION)))),
                ],
                discriminant_count: 0,
                is_group: true,
            },
        ),
        def(
            VALUE,
            "calculator.capnp:Calculator.Value",
            CALCULATOR,
            vec![],
            Body::Interface {
                methods: vec![("read", READ_PARAMS, READ_RESULTS)],
                superclasses: vec![],
            },
        ),
        def(
            FUNCTION,
            "calculator.capnp:Calculator.Function",
            CALCULATOR,
            vec![],
            Body::Interface {
                methods: vec![("call", CALL_PARAMS, CALL_RESULTS)],
                superclasses: vec![],
            },
        ),
        def(
            SCALED_VALUE,
            "calculator.capnp:Calculator.ScaledValue",
            CALCULATOR,
            vec![],
            Body::Interface {
                methods: vec![("scale", SCALE_PARAMS, SCALE_RESULTS)],
                superclasses: vec![VALUE],
            },
        ),
        def(
            EVALUATE_PARAMS,
            "calculator.capnp:Calculator.evaluate$Params",
            0,
            vec![],
            plain_struct(vec![slot("expression", Ty::Struct(EXPRESSION))]),
        ),
        def(
            EVALUATE_RESULTS,
            "calculator.capnp:Calculator.evaluate$Results",
            0,
            vec![],
            plain_struct(vec![slot("value", Ty::Interface(VALUE))]),
        ),
        def(
            GET_OPERATOR_PARAMS,
            "calculator.capnp:Calculator.getOperator$Params",
            0,
            vec![],
            plain_struct(vec![slot("op", Ty::Enum(OPERATOR))]),
        ),
        def(
            GET_OPERATOR_RESULTS,
            "calculator.capnp:Calculator.getOperator$Results",
            0,
            vec![],
            plain_struct(vec![slot("func", Ty::Interface(FUNCTION))]),
        ),
        def(
            READ_PARAMS,
            "calculator.capnp:Calculator.Value.read$Params",
            0,
            vec![],
            plain_struct(vec![]),
        ),
        def(
            READ_RESULTS,
            "calculator.capnp:Calculator.Value.read$Results",
            0,
            vec![],
            plain_struct(vec![slot("value", Ty::Float64)]),
        ),
        def(
            CALL_PARAMS,
            "calculator.capnp:Calculator.Function.call$Params",
            0,
            vec![],
            plain_struct(vec![slot("params", Ty::List(Box::new(Ty::Float64)))]),
        ),
        def(
            CALL_RESULTS,
            "calculator.capnp:Calculator.Function.call$Results",
            0,
            vec![],
            plain_struct(vec![slot("value", Ty::Float64)]),
        ),
        def(
            SCALE_PARAMS,
            "calculator.capnp:Calculator.ScaledValue.scale$Params",
            0,
            vec![],
            plain_struct(vec![]),
        ),
        def(
            SCALE_RESULTS,
            "calculator.capnp:Calculator.ScaledValue.scale$Results",
            0,
            vec![],
            plain_struct(vec![slot("factor", Ty::Float64)]),
        ),
        def(
            OPERATOR,
            "calculator.capnp:Operator",
            FILE,
            vec![],
            Body::Enum(vec!["add", "subtract", "multiply", "divide"]),
        ),
        def(
            PERSON,
            "calculator.capnp:Person",
            FILE,
            vec![("PhoneNumber", PHONE_NUMBER)],
            Body::Struct {
                fields: vec![
                    slot("name", Ty::Text),
                    slot("age", Ty::UInt8),
                    slot("photo", Ty::Data),
                    slot("phones", Ty::List(Box::new(Ty::Struct(PHONE_NUMBER)))),
                    union_slot("unemployed", 0, Ty::Void),
                    union_slot("employer", 1, Ty::Text),
                    union_slot("school", 2, Ty::Text),
                    FieldDef {
                        name: "address",
                        discriminant: None,
                        member: Member::Group(PERSON_ADDRESS),
                    },
                    slot("verified", Ty::Bool),
                ],
                discriminant_count: 3,
                is_group: false,
            },
        ),
        def(
            PHONE_NUMBER,
            "calculator.capnp:Person.PhoneNumber",
            PERSON,
            vec![("Type", PHONE_TYPE)],
            plain_struct(vec![
                slot("number", Ty::Text),
                slot("type", Ty::Enum(PHONE_TYPE)),
            ]),
        ),
        def(
            PHONE_TYPE,
            "calculator.capnp:Person.PhoneNumber.Type",
            PHONE_NUMBER,
            vec![],
            Body::Enum(vec!["mobile", "home", "work"]),
        ),
        def(
            PERSON_ADDRESS,
            "calculator.capnp:Person.address",
            PERSON,
            vec![],
            Body::Struct {
                fields: vec![slot("street", Ty::Text), slot("city", Ty::Text)],
                discriminant_count: 0,
                is_group: true,
            },
        ),
        def(PI, "calculator.capnp:pi", FILE, vec![], Body::Const),
    ]
}

fn write_type(mut builder: type_::Builder<'_>, ty: &Ty) {
    match ty {
        Ty::Void => builder.set_void(()),
        Ty::Bool => builder.set_bool(()),
        Ty::UInt8 => builder.set_uint8(()),
        Ty::UInt32 => builder.set_uint32(()),
        Ty::Float64 => builder.set_float64(()),
        Ty::Text => builder.set_text(()),
        Ty::Data => builder.set_data(()),
        Ty::List(element) => write_type(builder.init_list().init_element_type(), element),
        Ty::Struct(id) => builder.init_struct().set_type_id(*id),
        Ty::Interface(id) => builder.init_interface().set_type_id(*id),
        Ty::Enum(id) => builder.init_enum().set_type_id(*id),
    }
}

fn display_prefix(display_name: &str) -> u32 {
    match display_name.find(':') {
        None => 0,
        Some(_) => display_name
            .rfind(|c: char| c == ':' || c == '.')
            .map_or(0, |i| i as u32 + 1),
    }
}

fn write_node(mut node: node::Builder<'_>, def: &NodeDef) {
    node.set_id(def.id);
    node.set_display_name(def.display_name);
    node.set_display_name_prefix_length(display_prefix(def.display_name));
    node.set_scope_id(def.scope);
    {
        let mut nested = node.reborrow().init_nested_nodes(def.nested.len() as u32);
        for (i, (name, id)) in def.nested.iter().enumerate() {
            let mut entry = nested.reborrow().get(i as u32);
            entry.set_name(*name);
            entry.set_id(*id);
        }
    }

    match &def.body {
        Body::File => node.set_file(()),
        Body::Const => {
            let mut constant = node.init_const();
            constant.reborrow().init_type().set_float64(());
            constant.init_value().set_float64(3.14159);
        }
        Body::Struct {
            fields,
            discriminant_count,
            is_group,
        } => {
            let mut st = node.init_struct();
            st.set_discriminant_count(*discriminant_count);
            st.set_is_group(*is_group);
            let mut list = st.init_fields(fields.len() as u32);
            for (i, field_def) in fields.iter().enumerate() {
                let mut field = list.reborrow().get(i as u32);
                field.set_name(field_def.name);
                field.set_code_order(i as u16);
                if let Some(discriminant) = field_def.discriminant {
                    field.set_discriminant_value(discriminant);
                }
                match &field_def.member {
                    Member::Slot(ty) => write_type(field.init_slot().init_type(), ty),
                    Member::Group(id) => field.init_group().set_type_id(*id),
                }
            }
        }
        Body::Interface {
            methods,
            superclasses,
        } => {
            let mut iface = node.init_interface();
            {
                let mut list = iface.reborrow().init_methods(methods.len() as u32);
                for (i, (name, params, results)) in methods.iter().enumerate() {
                    let mut method = list.reborrow().get(i as u32);
                    method.set_name(*name);
                    method.set_code_order(i as u16);
                    method.set_param_struct_type(*params);
                    method.set_result_struct_type(*results);
                }
            }
            let mut supers = iface.init_superclasses(superclasses.len() as u32);
            for (i, id) in superclasses.iter().enumerate() {
                supers.reborrow().get(i as u32).set_id(*id);
            }
        }
        Body::Enum(names) => {
            let mut list = node.init_enum().init_enumerants(names.len() as u32);
            for (i, name) in names.iter().enumerate() {
                let mut enumerant = list.reborrow().get(i as u32);
                enumerant.set_name(*name);
                enumerant.set_code_order(i as u16);
            }
        }
    }
}

/// Serialized `CodeGeneratorRequest` for `calculator.capnp`.
pub fn calculator_request_bytes() -> Vec<u8> {
    let defs = calculator_nodes();
    let mut message = message::Builder::new_default();
    {
        let mut request = message.init_root::<code_generator_request::Builder>();
        {
            let mut nodes = request.reborrow().init_nodes(defs.len() as u32);
            for (i, def) in defs.iter().enumerate() {
                write_node(nodes.reborrow().get(i as u32), def);
            }
        }
        let mut requested = request.init_requested_files(1);
        let mut file = requested.reborrow().get(0);
        file.set_id(FILE);
        file.set_filename("calculator.capnp");
    }
    let mut bytes = Vec::new();
    capnp::serialize::write_message(&mut bytes, &message).expect("serialize fixture");
    bytes
}

pub fn calculator_graph() -> SchemaGraph {
    parse_code_generator_request(&calculator_request_bytes()).expect("decode fixture")
}

/// Fixture written to disk, as `capnp compile -o-` would leave it.
pub fn calculator_request_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(&calculator_request_bytes()).expect("write fixture");
    file
}

/// Parser that ignores its input path and returns the fixture graph.
pub fn fixture_parser() -> impl Fn(&str, &Path, &[PathBuf]) -> capnp_dynamic::Result<SchemaGraph> {
    |_display_name: &str, _path: &Path, _imports: &[PathBuf]| {
        parse_code_generator_request(&calculator_request_bytes())
    }
}

pub fn calculator_namespace() -> Namespace {
    let mut ns = Namespace::new("Calculator");
    ns.load_schema(&fixture_parser(), "calculator.capnp", &[])
        .expect("load fixture");
    ns
}

pub fn interface(ns: &Namespace, path: &str) -> InterfaceSchema {
    ns.resolve(path)
        .and_then(|b| b.as_interface().cloned())
        .expect("interface binding")
}

/// `Value` capability holding a constant.
pub fn value_client(iface: InterfaceSchema, value: f64) -> Client {
    CapabilityServer::new(iface)
        .method("read", move |_params, mut results| async move {
            results.set("value", value)?;
            Ok::<_, RpcFailure>(results)
        })
        .expect("read handler")
        .into_client()
}

/// `Function` capability applying a binary operator to its two params.
pub fn operator_client(iface: InterfaceSchema, op: u16) -> Client {
    CapabilityServer::new(iface)
        .method("call", move |params, mut results| async move {
            let args = params.get("params")?;
            let args = args
                .as_list()
                .ok_or_else(|| RpcFailure::failed("params is not a list"))?;
            let operands: Vec<f64> = args.iter().filter_map(Value::as_f64).collect();
            let &[a, b] = operands.as_slice() else {
                return Err(RpcFailure::failed("expected two operands"));
            };
            let value = match op {
                0 => a + b,
                1 => a - b,
                2 => a * b,
                _ => a / b,
            };
            results.set("value", value)?;
            Ok::<_, RpcFailure>(results)
        })
        .expect("call handler")
        .into_client()
}

#[derive(Clone)]
struct Evaluator {
    value: InterfaceSchema,
    read: Method,
    call: Method,
}

impl Evaluator {
    fn evaluate(self, expression: DynamicStruct) -> BoxFuture<'static, std::result::Result<f64, RpcFailure>> {
        async move {
            match expression.which()? {
                "literal" => Ok(expression.get("literal")?.as_f64().unwrap_or_default()),
                "previousResult" => {
                    let cap = expression.get("previousResult")?.into_capability()?;
                    let params = DynamicStruct::new(self.read.params().clone());
                    let response = cap.call(&self.read, params).response().await?;
                    Ok(response.get("value")?.as_f64().unwrap_or_default())
                }
                "call" => {
                    let call = expression.get("call")?.into_struct()?;
                    let function = call.get("function")?.into_capability()?;
                    let mut operands = Vec::new();
                    if let Some(list) = call.get("params")?.as_list() {
                        for item in list {
                            let item = item.clone().into_struct()?;
                            operands.push(Value::Float(self.clone().evaluate(item).await?));
                        }
                    }
                    let mut params = DynamicStruct::new(self.call.params().clone());
                    params.set("params", DynamicList::from_values(operands))?;
                    let response = function.call(&self.call, params).response().await?;
                    Ok(response.get("value")?.as_f64().unwrap_or_default())
                }
                other => Err(RpcFailure::failed(format!("cannot evaluate {other}"))),
            }
        }
        .boxed()
    }
}

/// In-process calculator. `evaluate` answers with a `Value` capability;
/// `getOperator` with a `Function` capability.
pub fn calculator_client(ns: &Namespace) -> DynamicCapabilityClient {
    let calculator = interface(ns, "Calculator");
    let value = interface(ns, "Calculator::Value");
    let function = interface(ns, "Calculator::Function");
    let evaluator = Evaluator {
        read: value.method("read").expect("read"),
        call: function.method("call").expect("call"),
        value,
    };

    let server = CapabilityServer::new(calculator.clone())
        .method("evaluate", move |params, mut results| {
            let evaluator = evaluator.clone();
            async move {
                let expression = params.get("expression")?.into_struct()?;
                let value = evaluator.clone().evaluate(expression).await?;
                results.set("value", value_client(evaluator.value.clone(), value))?;
                Ok::<_, RpcFailure>(results)
            }
        })
        .expect("evaluate handler")
        .method("getOperator", move |params, mut results| {
            let function = function.clone();
            async move {
                let op = match params.get("op")? {
                    Value::Enum(ordinal) => ordinal,
                    other => return Err(RpcFailure::failed(format!("bad operator {other}"))),
                };
                results.set("func", operator_client(function, op))?;
                Ok::<_, RpcFailure>(results)
            }
        })
        .expect("getOperator handler");

    DynamicCapabilityClient::new(server.into_client(), calculator)
}
