use std::{error::Error, fmt};

/// Conditions the interpreter can fail with. In strict mode every one of
/// these escapes the top-level driver; in non-strict mode each raise site
/// recovers with a conservative fallback instead of constructing the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpError {
    UnknownFunction(String),
    UnknownConstant(String),
    UnknownClass(String),
    UnknownMethod {
        name: String,
        class: String,
        candidates: Vec<String>,
    },
    UnknownObject(String),
    LostControl(String),
    Impossible(String),
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFunction(name) => write!(f, "unknown function: {}", name),
            Self::UnknownConstant(name) => write!(f, "unknown constant: {}", name),
            Self::UnknownClass(name) => write!(f, "unknown class: {}", name),
            Self::UnknownMethod {
                name,
                class,
                candidates,
            } => write!(
                f,
                "unknown method: {}::{} (have: {})",
                class,
                name,
                candidates.join(", ")
            ),
            Self::UnknownObject(what) => write!(f, "member access on non-object: {}", what),
            Self::LostControl(what) => write!(f, "lost control of dynamic call: {}", what),
            Self::Impossible(what) => write!(f, "broken invariant: {}", what),
        }
    }
}

impl Error for InterpError {}

pub type Result<T> = std::result::Result<T, InterpError>;
