//! Reflection-based access to struct instances by field name.

use std::sync::Arc;

use super::value::{coerce, default_value, DynamicList, Value};
use crate::error::{Error, Result};
use crate::schema::{Field, FieldKind, SchemaGraph, StructSchema, Type};

/// A struct instance whose layout is only known at runtime.
///
/// Fields are resolved by name against the [`StructSchema`] on every call.
/// Union members share one slot of state: setting or initializing a member
/// makes it active and clears the others.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicStruct {
    schema: StructSchema,
    slots: Vec<Option<Value>>,
    discriminant: u16,
}

impl DynamicStruct {
    pub fn new(schema: StructSchema) -> Self {
        let slots = vec![None; schema.fields().len()];
        Self {
            schema,
            slots,
            discriminant: 0,
        }
    }

    pub fn schema(&self) -> &StructSchema {
        &self.schema
    }

    fn graph(&self) -> &Arc<SchemaGraph> {
        self.schema.schema().graph()
    }

    fn field(&self, name: &str) -> Result<Field> {
        self.schema.field(name).cloned()
    }

    fn is_active(&self, field: &Field) -> bool {
        field.discriminant.map_or(true, |d| d == self.discriminant)
    }

    fn activate(&mut self, field: &Field) {
        let Some(discriminant) = field.discriminant else {
            return;
        };
        if discriminant == self.discriminant {
            return;
        }
        for member in self.schema.union_fields() {
            self.slots[member.index as usize] = None;
        }
        self.discriminant = discriminant;
    }

    fn default_for(&self, field: &Field) -> Result<Value> {
        match &field.kind {
            FieldKind::Slot(ty) => default_value(ty, self.graph()),
            FieldKind::Group(id) => Ok(Value::Struct(DynamicStruct::new(
                self.schema.struct_schema(*id)?,
            ))),
        }
    }

    /// Read a field. Unset fields read as their type's default.
    pub fn get(&self, name: &str) -> Result<Value> {
        let field = self.field(name)?;
        if !self.is_active(&field) {
            return Err(Error::InactiveUnionMember {
                field: name.to_string(),
                active: self.which()?.to_string(),
            });
        }
        match &self.slots[field.index as usize] {
            Some(value) => Ok(value.clone()),
            None => self.default_for(&field),
        }
    }

    /// Whether a field has been explicitly set (and, for union members, is
    /// the active one).
    pub fn has(&self, name: &str) -> Result<bool> {
        let field = self.field(name)?;
        Ok(self.is_active(&field) && self.slots[field.index as usize].is_some())
    }

    /// Assign a field. On failure the struct is left unchanged.
    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) -> Result<()> {
        let field = self.field(name)?;
        let value = match &field.kind {
            FieldKind::Slot(ty) => coerce(value.into(), ty, self.graph(), name)?,
            FieldKind::Group(id) => coerce(value.into(), &Type::Struct(*id), self.graph(), name)?,
        };
        self.activate(&field);
        self.slots[field.index as usize] = Some(value);
        Ok(())
    }

    /// Name of the active union member.
    pub fn which(&self) -> Result<&str> {
        if !self.schema.has_union() {
            return Err(Error::NoUnion(self.schema.name().to_string()));
        }
        self.schema
            .field_for_discriminant(self.discriminant)
            .map(|f| f.name.as_str())
            .ok_or_else(|| {
                Error::unsupported(format!(
                    "discriminant {} of {} is not in the schema",
                    self.discriminant,
                    self.schema.name()
                ))
            })
    }

    /// `which() == name`. Names outside the union compare false.
    pub fn is(&self, name: &str) -> Result<bool> {
        Ok(self.which()? == name)
    }

    /// Allocate a fresh value for a struct, group, list, text or data field.
    ///
    /// Struct and group fields take no arguments; list, text and data fields
    /// take a single size argument.
    pub fn init(&mut self, name: &str, args: &[Value]) -> Result<&mut Value> {
        let field = self.field(name)?;
        let arity_error = || Error::UnsupportedArity {
            name: name.to_string(),
            arity: args.len(),
        };

        let fresh = match (&field.kind, args) {
            (FieldKind::Group(id), []) | (FieldKind::Slot(Type::Struct(id)), []) => {
                Value::Struct(DynamicStruct::new(self.schema.struct_schema(*id)?))
            }
            (FieldKind::Group(_), _) | (FieldKind::Slot(Type::Struct(_)), _) => {
                return Err(arity_error())
            }
            (FieldKind::Slot(Type::List(element)), [size]) => Value::List(DynamicList::new(
                Arc::clone(self.graph()),
                (**element).clone(),
                size_argument(name, size)?,
            )?),
            (FieldKind::Slot(Type::Text), [size]) => {
                Value::Text("\0".repeat(size_argument(name, size)?))
            }
            (FieldKind::Slot(Type::Data), [size]) => {
                Value::Data(vec![0; size_argument(name, size)?])
            }
            (FieldKind::Slot(Type::List(_) | Type::Text | Type::Data), _) => {
                return Err(arity_error())
            }
            (FieldKind::Slot(other), _) => {
                return Err(Error::unsupported(format!(
                    "cannot init {name}: {other} fields are not initializable"
                )))
            }
        };

        self.activate(&field);
        Ok(self.slots[field.index as usize].insert(fresh))
    }

    pub fn init_struct(&mut self, name: &str) -> Result<&mut DynamicStruct> {
        let value = self.init(name, &[])?;
        let shape = value.shape();
        value
            .as_struct_mut()
            .ok_or_else(|| Error::type_mismatch(name, "struct", shape))
    }

    pub fn init_list(&mut self, name: &str, size: usize) -> Result<&mut DynamicList> {
        let value = self.init(name, &[Value::UInt(size as u64)])?;
        let shape = value.shape();
        value
            .as_list_mut()
            .ok_or_else(|| Error::type_mismatch(name, "list", shape))
    }

    /// Mutable access to a struct or group field, initializing it when unset
    /// or when it is an inactive union member.
    pub fn get_struct_mut(&mut self, name: &str) -> Result<&mut DynamicStruct> {
        let field = self.field(name)?;
        let target = match &field.kind {
            FieldKind::Group(id) | FieldKind::Slot(Type::Struct(id)) => *id,
            FieldKind::Slot(other) => return Err(Error::type_mismatch(name, "struct", other)),
        };

        let index = field.index as usize;
        if !self.is_active(&field) || self.slots[index].is_none() {
            let fresh = DynamicStruct::new(self.schema.struct_schema(target)?);
            self.activate(&field);
            self.slots[index] = Some(Value::Struct(fresh));
        }

        match self.slots[index].as_mut() {
            Some(Value::Struct(s)) => Ok(s),
            Some(other) => Err(Error::type_mismatch(name, "struct", other.shape())),
            None => Err(Error::field_not_found(self.schema.name(), name)),
        }
    }

    /// Mutable access to an already-set list field.
    pub fn get_list_mut(&mut self, name: &str) -> Result<&mut DynamicList> {
        let field = self.field(name)?;
        let FieldKind::Slot(Type::List(_)) = &field.kind else {
            return Err(Error::type_mismatch(name, "list", "non-list field"));
        };
        if !self.is_active(&field) || self.slots[field.index as usize].is_none() {
            return self.init_list(name, 0);
        }
        match self.slots[field.index as usize].as_mut() {
            Some(Value::List(list)) => Ok(list),
            Some(other) => Err(Error::type_mismatch(name, "list", other.shape())),
            None => Err(Error::field_not_found(self.schema.name(), name)),
        }
    }

    /// Fields that are set, plus the active union member (read as its
    /// default when unset), in field table order.
    pub fn fields(&self) -> Result<Vec<(&Field, Value)>> {
        let mut out = Vec::new();
        for field in self.schema.fields() {
            if !self.is_active(field) {
                continue;
            }
            match &self.slots[field.index as usize] {
                Some(value) => out.push((field, value.clone())),
                None if field.is_union_member() => out.push((field, self.default_for(field)?)),
                None => {}
            }
        }
        Ok(out)
    }
}

fn size_argument(name: &str, size: &Value) -> Result<usize> {
    size.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| Error::type_mismatch(name, "size", size.shape()))
}
