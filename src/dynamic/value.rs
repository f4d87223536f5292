//! Dynamically typed values and lists.

use std::fmt;
use std::sync::Arc;

use super::structs::DynamicStruct;
use crate::error::{Error, Result};
use crate::rpc::Client;
use crate::schema::{Schema, SchemaGraph, Type};

/// A value read from or written to a dynamic struct or list.
///
/// Integers are held widened: signed field types as `Int`, unsigned field
/// types as `UInt`. Assignments coerce between the two when the value fits
/// the declared type.
#[derive(Clone, Debug)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Data(Vec<u8>),
    /// Enumerant ordinal.
    Enum(u16),
    List(DynamicList),
    Struct(DynamicStruct),
    Capability(Client),
}

impl Value {
    /// Short name of the value's shape, used in type errors.
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Data(_) => "data",
            Value::Enum(_) => "enum",
            Value::List(_) => "list",
            Value::Struct(_) => "struct",
            Value::Capability(_) => "capability",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            Value::UInt(u) => i64::try_from(u).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt(u) => Some(u),
            Value::Int(i) => u64::try_from(i).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float(f) => Some(f),
            Value::Int(i) => Some(i as f64),
            Value::UInt(u) => Some(u as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&DynamicStruct> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut DynamicStruct> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&DynamicList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut DynamicList> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn into_struct(self) -> Result<DynamicStruct> {
        match self {
            Value::Struct(s) => Ok(s),
            other => Err(Error::type_mismatch("value", "struct", other.shape())),
        }
    }

    pub fn into_capability(self) -> Result<Client> {
        match self {
            Value::Capability(c) => Ok(c),
            other => Err(Error::type_mismatch("value", "capability", other.shape())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Data(a), Value::Data(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Capability(a), Value::Capability(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(t) => write!(f, "{t:?}"),
            Value::Data(d) => write!(f, "<{} bytes>", d.len()),
            Value::Enum(o) => write!(f, "enum#{o}"),
            Value::List(l) => write!(f, "<list of {}>", l.len()),
            Value::Struct(s) => write!(f, "<{}>", s.schema().name()),
            Value::Capability(_) => f.write_str("<capability>"),
        }
    }
}

macro_rules! value_from {
    ($variant:ident, $target:ty; $($source:ty),*) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Value::$variant(v as $target)
                }
            }
        )*
    };
}

value_from!(Int, i64; i8, i16, i32, i64);
value_from!(UInt, u64; u8, u16, u32, u64);
value_from!(Float, f64; f32, f64);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(d: Vec<u8>) -> Self {
        Value::Data(d)
    }
}

impl From<DynamicStruct> for Value {
    fn from(s: DynamicStruct) -> Self {
        Value::Struct(s)
    }
}

impl From<DynamicList> for Value {
    fn from(l: DynamicList) -> Self {
        Value::List(l)
    }
}

impl From<Client> for Value {
    fn from(c: Client) -> Self {
        Value::Capability(c)
    }
}

/// Default value of an unset slot of type `ty`.
pub(crate) fn default_value(ty: &Type, graph: &Arc<SchemaGraph>) -> Result<Value> {
    let value = match ty {
        Type::Void | Type::AnyPointer => Value::Void,
        Type::Bool => Value::Bool(false),
        Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64 => Value::Int(0),
        Type::UInt8 | Type::UInt16 | Type::UInt32 | Type::UInt64 => Value::UInt(0),
        Type::Float32 | Type::Float64 => Value::Float(0.0),
        Type::Text => Value::Text(String::new()),
        Type::Data => Value::Data(Vec::new()),
        Type::Enum(_) => Value::Enum(0),
        Type::List(element) => {
            Value::List(DynamicList::new(Arc::clone(graph), (**element).clone(), 0)?)
        }
        Type::Struct(id) => Value::Struct(DynamicStruct::new(Schema::of(graph, *id)?.as_struct()?)),
        Type::Interface(_) => Value::Capability(Client::null()),
    };
    Ok(value)
}

/// Convert `value` to the canonical representation of `ty`, or fail with
/// `TypeMismatch` naming `field`.
pub(crate) fn coerce(value: Value, ty: &Type, graph: &Arc<SchemaGraph>, field: &str) -> Result<Value> {
    let mismatch = |v: &Value| Error::type_mismatch(field, ty, v.shape());

    match (ty, value) {
        (Type::AnyPointer, v) => Ok(v),
        (Type::Void, Value::Void) => Ok(Value::Void),
        (Type::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
        (ty, v @ (Value::Int(_) | Value::UInt(_))) if ty.is_integer() => {
            let wide = match v {
                Value::Int(i) => i as i128,
                Value::UInt(u) => u as i128,
                _ => unreachable!(),
            };
            let (min, max) = ty.integer_bounds().ok_or_else(|| mismatch(&v))?;
            if wide < min || wide > max {
                return Err(Error::type_mismatch(
                    field,
                    ty,
                    format!("{wide} (out of range)"),
                ));
            }
            Ok(if ty.is_signed() {
                Value::Int(wide as i64)
            } else {
                Value::UInt(wide as u64)
            })
        }
        (Type::Float32, v @ (Value::Int(_) | Value::UInt(_) | Value::Float(_))) => {
            let x = v.as_f64().ok_or_else(|| mismatch(&v))?;
            Ok(Value::Float(x as f32 as f64))
        }
        (Type::Float64, v @ (Value::Int(_) | Value::UInt(_) | Value::Float(_))) => {
            let x = v.as_f64().ok_or_else(|| mismatch(&v))?;
            Ok(Value::Float(x))
        }
        (Type::Text, Value::Text(t)) => Ok(Value::Text(t)),
        (Type::Data, Value::Data(d)) => Ok(Value::Data(d)),
        (Type::Enum(id), v @ (Value::Enum(_) | Value::Text(_))) => {
            let schema = Schema::of(graph, *id)?.as_enum()?;
            let ordinal = match &v {
                Value::Enum(o) => Some(*o).filter(|o| schema.name_of(*o).is_some()),
                Value::Text(name) => schema.ordinal_of(name),
                _ => None,
            };
            ordinal.map(Value::Enum).ok_or_else(|| {
                Error::type_mismatch(field, format!("enumerant of {}", schema.name()), v.to_string())
            })
        }
        (Type::Struct(id), Value::Struct(s)) => {
            if s.schema().id() == *id {
                Ok(Value::Struct(s))
            } else {
                Err(Error::type_mismatch(field, ty, format!("struct {}", s.schema().name())))
            }
        }
        (Type::List(element), Value::List(list)) => {
            Ok(Value::List(list.retype(element, graph, field)?))
        }
        (Type::Interface(_), Value::Capability(c)) => Ok(Value::Capability(c)),
        (_, v) => Err(mismatch(&v)),
    }
}

/// A homogeneous list.
///
/// Lists built from a schema carry their element type and check every
/// element. Lists built with [`DynamicList::from_values`] are untyped until
/// assigned to a field, when every element is coerced to the field's element
/// type.
#[derive(Clone, Debug)]
pub struct DynamicList {
    element: Type,
    items: Vec<Value>,
    graph: Option<Arc<SchemaGraph>>,
}

impl DynamicList {
    /// List of `len` default elements.
    pub fn new(graph: Arc<SchemaGraph>, element: Type, len: usize) -> Result<Self> {
        let items = (0..len)
            .map(|_| default_value(&element, &graph))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            element,
            items,
            graph: Some(graph),
        })
    }

    /// Untyped list of caller-supplied values.
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            element: Type::AnyPointer,
            items: values.into_iter().map(Into::into).collect(),
            graph: None,
        }
    }

    pub fn element_type(&self) -> &Type {
        &self.element
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.items.len() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        Ok(())
    }

    fn coerce_element(&self, value: Value, index: usize) -> Result<Value> {
        match &self.graph {
            Some(graph) => coerce(value, &self.element, graph, &format!("[{index}]")),
            None => Ok(value),
        }
    }

    pub fn get(&self, index: usize) -> Result<&Value> {
        self.check_index(index)?;
        Ok(&self.items[index])
    }

    pub fn set<V: Into<Value>>(&mut self, index: usize, value: V) -> Result<()> {
        self.check_index(index)?;
        let value = self.coerce_element(value.into(), index)?;
        self.items[index] = value;
        Ok(())
    }

    pub fn push<V: Into<Value>>(&mut self, value: V) -> Result<()> {
        let value = self.coerce_element(value.into(), self.items.len())?;
        self.items.push(value);
        Ok(())
    }

    /// Replace element `index` with a fresh struct and return it.
    pub fn init(&mut self, index: usize) -> Result<&mut DynamicStruct> {
        self.check_index(index)?;
        let (Type::Struct(id), Some(graph)) = (&self.element, &self.graph) else {
            return Err(Error::unsupported(format!(
                "cannot init element of List({})",
                self.element
            )));
        };
        let fresh = DynamicStruct::new(Schema::of(graph, *id)?.as_struct()?);
        self.items[index] = Value::Struct(fresh);
        self.items[index]
            .as_struct_mut()
            .ok_or_else(|| Error::unsupported("list element is not a struct"))
    }

    /// Mutable struct element, for descending into list members.
    pub fn get_struct_mut(&mut self, index: usize) -> Result<&mut DynamicStruct> {
        self.check_index(index)?;
        let element = &mut self.items[index];
        let shape = element.shape();
        element
            .as_struct_mut()
            .ok_or_else(|| Error::type_mismatch(&format!("[{index}]"), "struct", shape))
    }

    /// Re-type this list to `element`, coercing every item.
    pub(crate) fn retype(self, element: &Type, graph: &Arc<SchemaGraph>, field: &str) -> Result<Self> {
        if self.graph.is_some() && &self.element == element {
            return Ok(self);
        }
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(i, v)| coerce(v, element, graph, &format!("{field}[{i}]")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            element: element.clone(),
            items,
            graph: Some(Arc::clone(graph)),
        })
    }
}

impl PartialEq for DynamicList {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<'a> IntoIterator for &'a DynamicList {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
