pub mod collection;
pub mod http_exec;
pub mod parser;

pub use collection::*;
pub use http_exec::*;
pub use parser::*;
