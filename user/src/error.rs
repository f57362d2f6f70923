use thiserror::Error;

#[derive(Error, Debug)]
pub enum UserError {
    #[error("Authorization error: {0}")]
    Authz(#[from] authz::AuthzError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User secret not found: {0}")]
    SecretNotFound(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Some errors occurred while updating users: [{0}]")]
    Update(String),
}

pub type Result<T> = std::result::Result<T, UserError>;
