//! Dynamic values: structs, lists and name-based accessors over them.

pub mod codec;
pub mod dispatch;
mod structs;
mod value;

pub use codec::{JsonCodec, MessageCodec};
pub use dispatch::{classify, invoke, invoke_reader, Accessor, DynamicAccess, Invocation, Role};
pub use structs::DynamicStruct;
pub use value::{DynamicList, Value};
