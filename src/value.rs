use std::fmt;

use crate::types::Type;

/// A Clite value.
///
/// Declared variables start as [`Value::Undefined`], which remembers the
/// declared type but has no content; reading the content fails.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Bool(bool),
    Char(char),
    Float(f32),
    Undefined(Type),
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl Value {
    pub fn undefined(ty: Type) -> Value {
        Value::Undefined(ty)
    }

    pub fn ty(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Bool(_) => Type::Bool,
            Value::Char(_) => Type::Char,
            Value::Float(_) => Type::Float,
            Value::Undefined(ty) => *ty,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined(_))
    }

    pub fn as_int(&self) -> Result<i32> {
        match *self {
            Value::Int(v) => Ok(v),
            other => Err(other.access_error(Type::Int)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match *self {
            Value::Bool(v) => Ok(v),
            other => Err(other.access_error(Type::Bool)),
        }
    }

    pub fn as_char(&self) -> Result<char> {
        match *self {
            Value::Char(v) => Ok(v),
            other => Err(other.access_error(Type::Char)),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match *self {
            Value::Float(v) => Ok(v),
            other => Err(other.access_error(Type::Float)),
        }
    }

    fn access_error(self, expected: Type) -> Error {
        match self {
            Value::Undefined(ty) => Error::Undefined(ty),
            other => Error::Mismatch {
                expected,
                actual: other.ty(),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v:?}"),
            // Debug keeps the fractional part of whole floats (`3.0`).
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Undefined(ty) => write!(f, "undef {ty}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("read of undefined {0} value")]
    Undefined(Type),
    #[error("expected {expected} value, but got {actual}")]
    Mismatch { expected: Type, actual: Type },
}
