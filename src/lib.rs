pub mod api;
pub mod ast;
pub mod coerce;
pub mod dump;
pub mod error;
pub mod loader;
pub mod parser;
mod records;
pub mod resolver;
pub mod scanner;
mod serialization;
pub mod utils;

pub use api::{dump_objects, parse, parse_with, ParseOptions, ParseResult};
pub use ast::{Mode, Record, Schema, TypeDef, Value};
pub use dump::DumpOptions;
pub use error::{ErrorCode, MaxiError, Warning};
pub use loader::{FsLoader, SchemaLoader};
