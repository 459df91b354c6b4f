//! A front-end and tree-walking evaluator for Clite, a small C-like teaching
//! language.
//!
//! Source flows through [`lexer`], [`parser`], [`type_checker`],
//! [`transformer`] and [`interpreter`], in that order. [`compile`] and [`run`]
//! drive the whole pipeline.

use tracing::debug;

use crate::{
    ast::{Generic, Program, Specialized},
    config::Config,
    state::State,
    token::{Span, Spanned, Token},
    types::TypeMap,
};

/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The type checker validates the typing rules of an AST and computes the type
/// maps.
pub mod type_checker;

/// The transformer maps a validated AST into one with explicit conversions and
/// type-tagged operators.
pub mod transformer;

/// The interpreter runs a transformed AST, producing the final state.
pub mod interpreter;

pub mod ast;
pub mod config;
pub mod state;
pub mod token;
pub mod types;
pub mod value;

pub mod util {
    pub mod fmt;
    #[cfg(test)]
    pub(crate) mod test_utils;
}

/// The products of the static stages.
#[derive(Debug)]
pub struct Compiled {
    pub tokens: Vec<Token>,
    pub program: Program<Generic>,
    /// Types of the global variables.
    pub types: TypeMap,
    pub transformed: Program<Specialized>,
}

/// Parses, validates and transforms a program.
pub fn compile(src: &str, config: &Config) -> Result<Compiled, Error> {
    let mut tokens = Vec::with_capacity(lexer::SUGGESTED_TOKENS_CAPACITY);
    let program = parser::parse_program(src, &mut tokens)?;
    debug!(tokens = tokens.len(), "parsed program");

    type_checker::validate_with(&program, config)?;
    let types = type_checker::typing(&program.globals);
    debug!(globals = types.len(), "validated program");

    let transformed = transformer::transform(program.clone(), &types)?;
    Ok(Compiled {
        tokens,
        program,
        types,
        transformed,
    })
}

/// The products of every stage, ending with the final state.
#[derive(Debug)]
pub struct Artifacts {
    pub compiled: Compiled,
    pub state: State,
}

/// Compiles and interprets a program.
pub fn run(src: &str, config: &Config) -> Result<Artifacts, Error> {
    let compiled = compile(src, config)?;
    let state = interpreter::interpret(&compiled.transformed)?;
    debug!(variables = state.len(), "finished run");
    Ok(Artifacts { compiled, state })
}

/// An error from any stage. The alternate form (`{:#}`) prefixes the span.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parser(#[from] Spanned<parser::Error>),
    #[error(transparent)]
    TypeChecker(#[from] Spanned<type_checker::Error>),
    #[error(transparent)]
    Transformer(#[from] Spanned<transformer::Error>),
    #[error(transparent)]
    Interpreter(#[from] Spanned<interpreter::Error>),
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Error::Parser(e) => e.span,
            Error::TypeChecker(e) => e.span,
            Error::Transformer(e) => e.span,
            Error::Interpreter(e) => e.span,
        }
    }
}
