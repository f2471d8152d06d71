use thiserror::Error;

/// Failure to run a verification script at all.
///
/// Messages follow the wording a Python interpreter would use so that the
/// feedback handed back to the Proposer reads naturally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("invalid syntax: {message} (line {line})")]
    Syntax { line: usize, message: String },
    #[error("unexpected indent (line {line})")]
    Indentation { line: usize },
    #[error("name '{0}' is not defined")]
    Name(String),
    #[error("{0}")]
    Type(String),
    #[error("{0}")]
    Value(String),
    #[error("division by zero")]
    ZeroDivision,
    #[error("'{owner}' object has no attribute '{attr}'")]
    Attribute { owner: String, attr: String },
    #[error("module 'sympy' has no attribute '{0}'")]
    ModuleAttribute(String),
    #[error("import of '{0}' is not allowed in verification scripts")]
    Import(String),
    #[error("assertion failed{}", assertion_suffix(.0))]
    Assertion(String),
    #[error("index out of range")]
    Index,
    #[error("{0} is not supported by the verification sandbox")]
    Unsupported(String),
    #[error("script exceeded the execution budget of {0} steps")]
    Budget(u64),
    #[error("maximum recursion depth exceeded")]
    Recursion,
    #[error("script is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

pub type ScriptResult<T> = Result<T, ScriptError>;

fn assertion_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {message}")
    }
}

pub(crate) fn type_error(message: impl Into<String>) -> ScriptError {
    ScriptError::Type(message.into())
}
