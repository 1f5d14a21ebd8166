use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthError {
    #[error("Config error: {0}")]
    #[diagnostic(code(portcullis::config))]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    #[diagnostic(code(portcullis::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(portcullis::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Invalid condition expression: {0}")]
    #[diagnostic(
        code(portcullis::invalid_condition),
        help("Supported operators: ==, !=, >, <, >=, <=, and, or. Operands are literals or {{attribute}} placeholders")
    )]
    InvalidCondition(String),

    #[error("Attribute `{0}` is missing from the subject record")]
    #[diagnostic(code(portcullis::missing_attribute))]
    MissingAttribute(String),

    #[error("Session storage error: {0}")]
    #[diagnostic(code(portcullis::session))]
    Session(String),
}
