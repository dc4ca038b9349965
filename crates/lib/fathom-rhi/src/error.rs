#[derive(Debug, thiserror::Error)]
pub enum RhiError {
    #[error("View creation failed for {name:?}: {info:?}")]
    ViewCreation { name: String, info: String },

    #[error("Invalid resource access: {info:?}")]
    ResourceAccess { info: String },
}
