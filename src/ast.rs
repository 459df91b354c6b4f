// program     ::= { type ID ( decl_rest | function ) }
// decl_rest   ::= { ',' ID } ';'
// function    ::= '(' [type ID { ',' type ID }] ')' '{' declaration* stmt* '}'
// declaration ::= type ID { ',' ID } ';'
// stmt        ::= ';'
//               | '{' stmt* '}'
//               | ID '=' expr ';'
//               | if '(' expr ')' stmt [else stmt]
//               | while '(' expr ')' stmt
//               | ID '(' [expr { ',' expr }] ')' ';'
//               | return expr ';'
// expr        ::= expr '||' expr
//               | expr '&&' expr
//               | expr ('==' | '!=') expr
//               | expr ('<' | '<=' | '>' | '>=') expr
//               | expr ('+' | '-') expr
//               | expr ('*' | '/') expr
//               | ('!' | '-') primary
//               | primary
// primary     ::= ID | ID '(' [expr { ',' expr }] ')' | literal
//               | '(' expr ')' | (int | float | char) '(' expr ')'

// Precedence (tightest first)
//
// unary ! -
// * /
// + -
// < <= > >=
// == !=
// &&
// ||

use std::{
    cmp::Ordering,
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use crate::{token::Span, types::Type, value::Value};

/// The pipeline stage of an AST, which decides what operator tags look like.
pub trait Stage {
    type Tag: Copy + fmt::Debug + PartialEq;
}

/// Parser output: operators are not yet tied to operand types.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Generic;

impl Stage for Generic {
    type Tag = ();
}

/// Transformer output: every operator carries the type it operates on.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Specialized;

impl Stage for Specialized {
    type Tag = Type;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program<S: Stage> {
    pub globals: Declarations,
    pub functions: Functions<S>,
}

impl<S: Stage> Program<S> {
    pub fn main(&self) -> Option<&Function<S>> {
        self.functions.get(MAIN)
    }
}

pub const MAIN: &str = "main";

#[derive(Clone, Debug, PartialEq)]
pub struct Function<S: Stage> {
    pub return_ty: Type,
    pub name: Variable,
    pub params: Declarations,
    pub locals: Declarations,
    pub body: Block<S>,
}

/// Functions in definition order, addressable by name.
#[derive(Clone, Debug, PartialEq)]
pub struct Functions<S: Stage> {
    list: Vec<Function<S>>,
    index: HashMap<Rc<str>, usize>,
}

impl<S: Stage> Default for Functions<S> {
    fn default() -> Self {
        Functions {
            list: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<S: Stage> Functions<S> {
    /// Registers a function.
    ///
    /// Fails with the name of the earlier definition if the name is taken.
    pub fn insert(&mut self, function: Function<S>) -> Result<(), Variable> {
        if let Some(&i) = self.index.get(function.name.name()) {
            return Err(self.list[i].name.clone());
        }
        self.index
            .insert(Rc::clone(&function.name.name), self.list.len());
        self.list.push(function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Function<S>> {
        self.index.get(name).map(|&i| &self.list[i])
    }

    /// Rewrites every function in order. `f` must keep the function names.
    pub fn try_map<T: Stage, E>(
        self,
        f: impl FnMut(Function<S>) -> Result<Function<T>, E>,
    ) -> Result<Functions<T>, E> {
        let Functions { list, index } = self;
        let list = list.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Functions { list, index })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Function<S>> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl<S: Stage> IntoIterator for Functions<S> {
    type Item = Function<S>;
    type IntoIter = std::vec::IntoIter<Function<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.into_iter()
    }
}

impl<'a, S: Stage> IntoIterator for &'a Functions<S> {
    type Item = &'a Function<S>;
    type IntoIter = std::slice::Iter<'a, Function<S>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    pub var: Variable,
    pub ty: Type,
}

impl Declaration {
    pub fn new(var: Variable, ty: Type) -> Declaration {
        Declaration { var, ty }
    }
}

/// Declarations of a single scope, in source order. Names are unique.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Declarations {
    decls: Vec<Declaration>,
}

impl Declarations {
    /// Fails with the earlier declaration if the name is already declared.
    pub fn insert(&mut self, decl: Declaration) -> Result<(), &Declaration> {
        match self.decls.iter().position(|d| d.var == decl.var) {
            Some(i) => Err(&self.decls[i]),
            None => {
                self.decls.push(decl);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.decls.iter().find(|d| d.var.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Declaration> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

impl<'a> IntoIterator for &'a Declarations {
    type Item = &'a Declaration;
    type IntoIter = std::slice::Iter<'a, Declaration>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block<S: Stage> {
    pub stmts: Vec<Stmt<S>>,
}

impl<S: Stage> Default for Block<S> {
    fn default() -> Self {
        Block { stmts: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt<S: Stage> {
    Skip,
    Block(Block<S>),
    Assignment {
        target: Variable,
        value: Expr<S>,
    },
    Conditional {
        test: Expr<S>,
        then_branch: Box<Stmt<S>>,
        /// [`Stmt::Skip`] when the source has no `else`.
        else_branch: Box<Stmt<S>>,
    },
    Loop {
        test: Expr<S>,
        body: Box<Stmt<S>>,
    },
    Call(Call<S>),
    Return {
        value: Expr<S>,
        /// Span of the `return` keyword.
        span: Span,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Call<S: Stage> {
    pub callee: Variable,
    pub args: Vec<Expr<S>>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr<S: Stage> {
    pub kind: ExprKind<S>,
    pub span: Span,
}

impl<S: Stage> Expr<S> {
    pub fn new(kind: ExprKind<S>, span: Span) -> Expr<S> {
        Expr { kind, span }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind<S: Stage> {
    Value(Value),
    Var(Variable),
    Binary {
        op: BinaryOperator,
        ty: S::Tag,
        lhs: Box<Expr<S>>,
        rhs: Box<Expr<S>>,
    },
    Unary {
        op: UnaryOperator,
        ty: S::Tag,
        expr: Box<Expr<S>>,
    },
    Call(Call<S>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOperator {
    pub fn is_boolean(self) -> bool {
        matches!(self, BinaryOperator::Or | BinaryOperator::And)
    }

    pub fn is_relational(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Eq | Ne | Lt | Le | Gt | Ge)
    }

    pub fn is_arithmetic(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Add | Sub | Mul | Div)
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Or => "||",
            And => "&&",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Neg,
    IntCast,
    FloatCast,
    CharCast,
}

impl UnaryOperator {
    /// The cast pseudo-operator producing the given type, if any.
    pub fn cast_to(ty: Type) -> Option<UnaryOperator> {
        match ty {
            Type::Int => Some(UnaryOperator::IntCast),
            Type::Float => Some(UnaryOperator::FloatCast),
            Type::Char => Some(UnaryOperator::CharCast),
            Type::Bool | Type::Void => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Neg => "-",
            UnaryOperator::IntCast => "(int)",
            UnaryOperator::FloatCast => "(float)",
            UnaryOperator::CharCast => "(char)",
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A variable reference. Two variables are the same if they have the same
/// name, wherever they appear in the source.
#[derive(Clone)]
pub struct Variable {
    name: Rc<str>,
    pub span: Span,
}

impl Variable {
    pub fn new(name: &str, span: Span) -> Variable {
        Variable {
            name: Rc::from(name),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable({}, {})", self.name, self.span)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl std::borrow::Borrow<str> for Variable {
    fn borrow(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Variable {
        Variable::new(name, Span::default())
    }

    #[test]
    fn variables_compare_by_name() {
        let a = Variable::new("a", Span::new_of_length(0, 1));
        let b = Variable::new("a", Span::new_of_length(10, 1));
        assert_eq!(a, b);
        assert_ne!(a, var("b"));
    }

    #[test]
    fn declarations_reject_duplicates() {
        let mut decls = Declarations::default();
        assert!(decls.insert(Declaration::new(var("x"), Type::Int)).is_ok());
        assert!(decls.insert(Declaration::new(var("y"), Type::Int)).is_ok());
        let earlier = decls
            .insert(Declaration::new(var("x"), Type::Float))
            .unwrap_err();
        assert_eq!(earlier.ty, Type::Int);
        assert_eq!(decls.len(), 2);
        assert_eq!(decls.get("y").map(|d| d.ty), Some(Type::Int));
    }

    #[test]
    fn functions_reject_duplicates() {
        let function = |name: &str| Function::<Generic> {
            return_ty: Type::Void,
            name: var(name),
            params: Declarations::default(),
            locals: Declarations::default(),
            body: Block::default(),
        };
        let mut functions = Functions::default();
        assert!(functions.insert(function("f")).is_ok());
        assert!(functions.insert(function("main")).is_ok());
        assert_eq!(functions.insert(function("f")), Err(var("f")));
        assert_eq!(functions.len(), 2);
        assert!(functions.get(MAIN).is_some());
    }
}
