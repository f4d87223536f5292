//! Whole-message reading and writing.
//!
//! Message framing is delegated to a [`MessageCodec`]. [`JsonCodec`] maps
//! structs to JSON objects keyed by field name, following the Cap'n Proto
//! JSON conventions: enums as enumerant names, `Data` as byte arrays, only
//! the active union member emitted, and non-finite floats as strings.

use std::io::{Read, Write};
use std::sync::Arc;

use serde_json::{Map, Number, Value as Json};

use super::structs::DynamicStruct;
use super::value::{DynamicList, Value};
use crate::error::{Error, Result};
use crate::schema::{FieldKind, Schema, SchemaGraph, StructSchema, Type};

/// Reads and writes whole messages rooted at a struct.
pub trait MessageCodec {
    fn read_message(&self, input: &mut dyn Read, schema: &StructSchema) -> Result<DynamicStruct>;

    fn write_message(&self, output: &mut dyn Write, message: &DynamicStruct) -> Result<()>;

    /// Packed framing is not supported by default.
    fn read_packed_message(
        &self,
        _input: &mut dyn Read,
        _schema: &StructSchema,
    ) -> Result<DynamicStruct> {
        Err(Error::unsupported("reading packed messages"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode(&self, message: &DynamicStruct) -> Result<Json> {
        encode_struct(message)
    }

    pub fn decode(&self, json: &Json, schema: &StructSchema) -> Result<DynamicStruct> {
        let mut message = DynamicStruct::new(schema.clone());
        decode_into(&mut message, json)?;
        Ok(message)
    }
}

impl MessageCodec for JsonCodec {
    fn read_message(&self, input: &mut dyn Read, schema: &StructSchema) -> Result<DynamicStruct> {
        let json: Json = serde_json::from_reader(input)?;
        self.decode(&json, schema)
    }

    fn write_message(&self, output: &mut dyn Write, message: &DynamicStruct) -> Result<()> {
        serde_json::to_writer(output, &self.encode(message)?)?;
        Ok(())
    }
}

fn encode_struct(message: &DynamicStruct) -> Result<Json> {
    let mut object = Map::new();
    for (field, value) in message.fields()? {
        let ty = match &field.kind {
            FieldKind::Slot(ty) => ty.clone(),
            FieldKind::Group(id) => Type::Struct(*id),
        };
        object.insert(field.name.clone(), encode_value(&value, &ty, message.schema())?);
    }
    Ok(Json::Object(object))
}

fn encode_float(x: f64) -> Json {
    match Number::from_f64(x) {
        Some(n) => Json::Number(n),
        None if x.is_nan() => Json::String("NaN".into()),
        None if x > 0.0 => Json::String("Infinity".into()),
        None => Json::String("-Infinity".into()),
    }
}

fn encode_value(value: &Value, ty: &Type, scope: &StructSchema) -> Result<Json> {
    let json = match value {
        Value::Void => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::UInt(u) => Json::from(*u),
        Value::Float(x) => encode_float(*x),
        Value::Text(t) => Json::String(t.clone()),
        Value::Data(d) => Json::Array(d.iter().map(|b| Json::from(*b)).collect()),
        Value::Enum(ordinal) => match ty {
            Type::Enum(id) => {
                let schema = scope.enum_schema(*id)?;
                match schema.name_of(*ordinal) {
                    Some(name) => Json::String(name.to_string()),
                    None => Json::from(*ordinal),
                }
            }
            _ => Json::from(*ordinal),
        },
        Value::List(list) => {
            let element = match ty {
                Type::List(element) => (**element).clone(),
                _ => list.element_type().clone(),
            };
            Json::Array(
                list.iter()
                    .map(|item| encode_value(item, &element, scope))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        Value::Struct(s) => encode_struct(s)?,
        Value::Capability(_) => {
            return Err(Error::unsupported("capabilities cannot be encoded as JSON"))
        }
    };
    Ok(json)
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn decode_into(target: &mut DynamicStruct, json: &Json) -> Result<()> {
    let Json::Object(object) = json else {
        return Err(Error::type_mismatch(
            target.schema().name(),
            "object",
            json_kind(json),
        ));
    };
    for (name, item) in object {
        let field = target.schema().field(name)?.clone();
        match &field.kind {
            FieldKind::Group(_) | FieldKind::Slot(Type::Struct(_)) => {
                decode_into(target.get_struct_mut(name)?, item)?;
            }
            FieldKind::Slot(ty) => {
                let graph = Arc::clone(target.schema().schema().graph());
                let value = decode_value(item, ty, &graph, name)?;
                target.set(name, value)?;
            }
        }
    }
    Ok(())
}

fn decode_float(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

fn decode_value(json: &Json, ty: &Type, graph: &Arc<SchemaGraph>, field: &str) -> Result<Value> {
    let mismatch = || Error::type_mismatch(field, ty, json_kind(json));

    let value = match ty {
        Type::Void => match json {
            Json::Null => Value::Void,
            _ => return Err(mismatch()),
        },
        Type::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
        ty if ty.is_integer() => match (json.as_i64(), json.as_u64()) {
            (Some(i), _) => Value::Int(i),
            (None, Some(u)) => Value::UInt(u),
            _ => return Err(mismatch()),
        },
        Type::Float32 | Type::Float64 => Value::Float(decode_float(json).ok_or_else(mismatch)?),
        Type::Text => Value::Text(json.as_str().ok_or_else(mismatch)?.to_string()),
        Type::Data => {
            let bytes = json.as_array().ok_or_else(mismatch)?;
            Value::Data(
                bytes
                    .iter()
                    .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(mismatch)?,
            )
        }
        Type::Enum(_) => match json {
            Json::String(name) => Value::Text(name.clone()),
            Json::Number(n) => Value::Enum(
                n.as_u64()
                    .and_then(|n| u16::try_from(n).ok())
                    .ok_or_else(mismatch)?,
            ),
            _ => return Err(mismatch()),
        },
        Type::List(element) => {
            let items = json.as_array().ok_or_else(mismatch)?;
            let mut list = DynamicList::new(Arc::clone(graph), (**element).clone(), 0)?;
            for (i, item) in items.iter().enumerate() {
                let name = format!("{field}[{i}]");
                list.push(decode_value(item, element, graph, &name)?)?;
            }
            Value::List(list)
        }
        Type::Struct(id) => {
            let schema = Schema::of(graph, *id)?.as_struct()?;
            Value::Struct(JsonCodec.decode(json, &schema)?)
        }
        Type::Interface(_) | Type::AnyPointer => {
            return Err(Error::unsupported(format!(
                "decoding {ty} field {field} from JSON"
            )))
        }
        _ => return Err(mismatch()),
    };
    Ok(value)
}
