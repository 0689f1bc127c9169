//! Generated API documentation: doc-comment parsing, operation synthesis and the
//! Documentation Object that is rendered as OpenAPI.

pub mod parse;
pub mod registry;
pub mod synth;

pub use parse::{doc_head, parse_doc, DocBlock};
pub use registry::{
    axum_path, swagger_path, validate_definitions, validate_path_item, DocRegistry, OperationDoc,
    ParamDoc, ParamIn, ResponseDoc,
};
