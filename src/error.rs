// ABOUTME: Parse and runtime error types, plus the non-error control-flow channel

use crate::value::Value;
use thiserror::Error;

/// Errors reported while turning tokens into an AST. Lexical errors surface
/// here too: the lexer embeds them as error tokens and the parser reports
/// them when it reaches one.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Lexical error at '{0}'")]
    Lexical(String),

    #[error("Expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Expected expression, found {0}")]
    ExpectedExpression(String),

    #[error("First operand is not assignable")]
    NotAssignable,

    #[error("'break' outside of a loop")]
    BreakOutsideLoop,

    #[error("'continue' outside of a loop")]
    ContinueOutsideLoop,

    #[error("'return' outside of a function")]
    ReturnOutsideFunction,

    #[error("No parameters may follow a varargs parameter")]
    ParameterAfterVarargs,
}

/// Errors detected while evaluating a program. The first one to reach the
/// top level halts evaluation of the remaining statements.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("{context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("{callee}: expected {expected} argument{}, got {actual}", if *.expected == "1" { "" } else { "s" })]
    ArityMismatch {
        callee: String,
        expected: String,
        actual: usize,
    },

    #[error("Unresolved identifier '{0}'")]
    UnresolvedIdentifier(String),

    #[error("'{0}' is already declared in this scope")]
    Redeclaration(String),

    #[error("Attempt to assign to constant '{0}'")]
    ConstantAssignment(String),

    #[error("Undefined member '{member}' on {target}")]
    UndefinedMember { member: String, target: String },

    #[error("Undefined method '{method}' on {target}")]
    UndefinedMethod { method: String, target: String },

    #[error("'{method}' requires an instance of the class")]
    RequiresInstance { method: String },

    #[error("Index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("Value of type {0} is not callable")]
    NotCallable(String),

    #[error("'init' must not return a value")]
    InitializerReturn,

    #[error("'super' requires 'self' from a subclass initializer")]
    SuperOutsideInitializer,

    #[error("'{0}' has no superclass initializer")]
    NoSuperInitializer(String),

    #[error("Failed to write program output: {0}")]
    Output(String),

    #[error("{0}")]
    Custom(String),
}

impl RuntimeError {
    /// Type mismatch with the offending value's type filled in.
    pub fn type_error(context: impl Into<String>, expected: &str, actual: &Value) -> Self {
        RuntimeError::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
        }
    }

    pub fn arity_error(callee: &str, expected: impl Into<String>, actual: usize) -> Self {
        RuntimeError::ArityMismatch {
            callee: callee.to_string(),
            expected: expected.into(),
            actual,
        }
    }

    pub fn undefined_member(member: &str, target: impl Into<String>) -> Self {
        RuntimeError::UndefinedMember {
            member: member.to_string(),
            target: target.into(),
        }
    }

    pub fn undefined_method(method: &str, target: impl Into<String>) -> Self {
        RuntimeError::UndefinedMethod {
            method: method.to_string(),
            target: target.into(),
        }
    }
}

/// Outcome of evaluating one node. `break`, `continue`, and `return` travel
/// here rather than through the error channel: loops and call frames react
/// to them, every other node just propagates them outward.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Value(Value),
    Break,
    Continue,
    Return(Value),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_error_names_the_actual_type() {
        let err = RuntimeError::type_error("if condition", "boolean", &Value::Number(1.0));
        assert_eq!(err.to_string(), "if condition: expected boolean, got number");
    }

    #[test]
    fn test_arity_error_pluralizes() {
        let one = RuntimeError::arity_error("f", "1", 3);
        assert_eq!(one.to_string(), "f: expected 1 argument, got 3");

        let many = RuntimeError::arity_error("g", "2", 0);
        assert_eq!(many.to_string(), "g: expected 2 arguments, got 0");

        let at_least = RuntimeError::arity_error("h", "at least 2", 1);
        assert_eq!(at_least.to_string(), "h: expected at least 2 arguments, got 1");
    }

    #[test]
    fn test_constant_assignment_message() {
        let err = RuntimeError::ConstantAssignment("x".to_string());
        assert_eq!(err.to_string(), "Attempt to assign to constant 'x'");
    }
}
