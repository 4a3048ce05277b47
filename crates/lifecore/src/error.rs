use thiserror::Error;

/// Failure taxonomy shared by the kernel and the business logic plugged into it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("Access rights: {0}")]
    AccessRights(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Persistency error: {0}")]
    Persistency(String),

    #[error("Object already exists: {0}")]
    ObjectAlreadyExists(String),

    #[error("Object cannot be updated: {0}")]
    ObjectCannotBeUpdated(String),

    #[error("Cannot manage: {0}")]
    CannotManage(String),

    #[error("Invalid collection modification: {0}")]
    InvalidCollectionModification(String),
}

impl KernelError {
    pub fn access(msg: impl Into<String>) -> Self {
        KernelError::AccessRights(msg.into())
    }

    pub fn transition(msg: impl Into<String>) -> Self {
        KernelError::InvalidTransition(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        KernelError::InvalidData(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        KernelError::ObjectNotFound(msg.into())
    }

    pub fn persistency(msg: impl Into<String>) -> Self {
        KernelError::Persistency(msg.into())
    }

    /// Short name of the variant, used in logs and in the CLI report.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::AccessRights(_) => "AccessRights",
            KernelError::InvalidTransition(_) => "InvalidTransition",
            KernelError::InvalidData(_) => "InvalidData",
            KernelError::ObjectNotFound(_) => "ObjectNotFound",
            KernelError::Persistency(_) => "Persistency",
            KernelError::ObjectAlreadyExists(_) => "ObjectAlreadyExists",
            KernelError::ObjectCannotBeUpdated(_) => "ObjectCannotBeUpdated",
            KernelError::CannotManage(_) => "CannotManage",
            KernelError::InvalidCollectionModification(_) => "InvalidCollectionModification",
        }
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self {
        KernelError::InvalidData(format!("Serialization error: {}", e))
    }
}
