pub mod catalog;
pub mod dispatcher;
pub mod schema;

pub use catalog::ToolCatalog;
pub use dispatcher::{BoundTool, RemoteTool};
pub use schema::{CallSchema, FunctionDeclaration, ParamSchema, ParamType};
