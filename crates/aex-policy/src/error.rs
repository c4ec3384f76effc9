// Path: crates/aex-policy/src/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("plugin dependency cycle detected among: {0:?}")]
    CyclicDependency(Vec<String>),
    #[error("plugin '{plugin}' depends on unknown plugin '{dependency}'")]
    UnknownDependency { plugin: String, dependency: String },
    #[error("canonicalization error: {0}")]
    Encode(#[from] aex_types::error::TypesError),
}
