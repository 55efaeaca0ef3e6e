//! Object store errors

use thiserror::Error;

/// Errors that can occur when reading or writing objects
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The object's version changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An object with this name already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Caller is not allowed to perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Object cannot be written as given (missing name, version, status)
    #[error("Invalid object: {0}")]
    Invalid(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other Kubernetes API or transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),
}

impl StoreError {
    /// True for optimistic-concurrency failures.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound(resp.message.clone()),
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                StoreError::AlreadyExists(resp.message.clone())
            }
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict(resp.message.clone()),
            kube::Error::Api(resp) if resp.code == 403 => StoreError::Forbidden(resp.message.clone()),
            _ => StoreError::Kube(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_conflict() {
        assert!(StoreError::Conflict("stale".to_string()).is_conflict());
        assert!(!StoreError::AlreadyExists("taken".to_string()).is_conflict());
        assert!(!StoreError::NotFound("gone".to_string()).is_conflict());
    }
}
