//! Name-based accessor dispatch.
//!
//! Scripting front ends address struct members by operation name:
//! `label` reads, `label=` writes, `circle?` tests the union tag and
//! `initOrigin` allocates a sub-struct. [`classify`] turns such a name into
//! an [`Accessor`], and [`invoke`] / [`invoke_reader`] route it to the
//! matching [`DynamicAccess`] method.

use super::structs::DynamicStruct;
use super::value::Value;
use crate::error::{Error, Result};

/// Whether the target may be mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reader,
    Builder,
}

/// Operation requested by an accessor name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Get(String),
    Set(String),
    Is(String),
    Init(String),
    /// Name with no field part, e.g. `?` or `=`.
    Unsupported(String),
}

/// Classify an operation name.
///
/// Readers only know `name?` (union test) and `name` (read). Builders check,
/// in order: `init` followed by a capitalized remainder, a trailing `=`, a
/// trailing `?`, and fall back to a read.
pub fn classify(name: &str, role: Role) -> Accessor {
    if role == Role::Builder {
        if let Some(rest) = name.strip_prefix("init") {
            if rest.starts_with(|c: char| c.is_uppercase()) {
                return Accessor::Init(uncapitalize(rest));
            }
        }
        if let Some(base) = name.strip_suffix('=') {
            return non_empty(name, base, Accessor::Set);
        }
    }
    if let Some(base) = name.strip_suffix('?') {
        return non_empty(name, base, Accessor::Is);
    }
    non_empty(name, name, Accessor::Get)
}

fn non_empty(name: &str, base: &str, make: fn(String) -> Accessor) -> Accessor {
    if base.is_empty() {
        Accessor::Unsupported(name.to_string())
    } else {
        make(base.to_string())
    }
}

fn uncapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The four operations a dynamic target supports.
pub trait DynamicAccess {
    fn get(&self, name: &str) -> Result<Value>;
    fn is(&self, name: &str) -> Result<bool>;
    fn set(&mut self, name: &str, value: Value) -> Result<()>;
    fn init(&mut self, name: &str, args: &[Value]) -> Result<&mut Value>;
}

impl DynamicAccess for DynamicStruct {
    fn get(&self, name: &str) -> Result<Value> {
        DynamicStruct::get(self, name)
    }

    fn is(&self, name: &str) -> Result<bool> {
        DynamicStruct::is(self, name)
    }

    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        DynamicStruct::set(self, name, value)
    }

    fn init(&mut self, name: &str, args: &[Value]) -> Result<&mut Value> {
        DynamicStruct::init(self, name, args)
    }
}

/// Outcome of a builder-side invocation.
#[derive(Debug)]
pub enum Invocation<'a> {
    Value(Value),
    Flag(bool),
    Assigned,
    Initialized(&'a mut Value),
}

fn expect_no_args(name: &str, args: &[Value]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(Error::UnsupportedArity {
            name: name.to_string(),
            arity: args.len(),
        })
    }
}

/// Dispatch `name(args...)` against a mutable target.
pub fn invoke<'a, T>(target: &'a mut T, name: &str, args: Vec<Value>) -> Result<Invocation<'a>>
where
    T: DynamicAccess + ?Sized,
{
    match classify(name, Role::Builder) {
        Accessor::Get(field) => {
            expect_no_args(name, &args)?;
            Ok(Invocation::Value(target.get(&field)?))
        }
        Accessor::Is(field) => {
            expect_no_args(name, &args)?;
            Ok(Invocation::Flag(target.is(&field)?))
        }
        Accessor::Set(field) => {
            let arity = args.len();
            let [value]: [Value; 1] = args.try_into().map_err(|_| Error::UnsupportedArity {
                name: name.to_string(),
                arity,
            })?;
            target.set(&field, value)?;
            Ok(Invocation::Assigned)
        }
        Accessor::Init(field) => Ok(Invocation::Initialized(target.init(&field, &args)?)),
        Accessor::Unsupported(name) => Err(Error::unsupported(format!("accessor {name:?}"))),
    }
}

/// Dispatch `name(args...)` against a read-only target. Union tests come
/// back as `Value::Bool`.
pub fn invoke_reader<T>(target: &T, name: &str, args: &[Value]) -> Result<Value>
where
    T: DynamicAccess + ?Sized,
{
    match classify(name, Role::Reader) {
        Accessor::Get(field) => {
            expect_no_args(name, args)?;
            target.get(&field)
        }
        Accessor::Is(field) => {
            expect_no_args(name, args)?;
            Ok(Value::Bool(target.is(&field)?))
        }
        Accessor::Set(_) | Accessor::Init(_) | Accessor::Unsupported(_) => {
            Err(Error::unsupported(format!("accessor {name:?} on a reader")))
        }
    }
}
