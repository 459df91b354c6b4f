use tracing::debug;

use crate::{
    ast::{
        BinaryOperator, Call, Declarations, Expr, ExprKind, Function, Functions, Generic,
        Program, Stmt, UnaryOperator, Variable, MAIN,
    },
    config::Config,
    token::{Span, Spanned},
    types::{Type, TypeMap},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Builds the type map of a declaration list.
pub fn typing(decls: &Declarations) -> TypeMap {
    TypeMap::new().overlay(decls)
}

/// Fails with `error` unless `condition` holds.
pub fn check<E>(condition: bool, error: Spanned<E>) -> Result<(), Spanned<E>> {
    if condition {
        Ok(())
    } else {
        Err(error)
    }
}

/// Computes the static type of an expression, assuming its operands are
/// well-typed. Only variables and callees are resolved.
pub fn type_of(
    expr: &Expr<Generic>,
    functions: &Functions<Generic>,
    tm: &TypeMap,
) -> Result<Type> {
    match &expr.kind {
        ExprKind::Value(value) => Ok(value.ty()),
        ExprKind::Var(var) => lookup(var, tm),
        ExprKind::Binary { op, lhs, rhs, .. } => {
            let lhs = type_of(lhs, functions, tm)?;
            let rhs = type_of(rhs, functions, tm)?;
            Ok(binary_type(*op, lhs, rhs))
        }
        ExprKind::Unary { op, expr, .. } => {
            let operand = type_of(expr, functions, tm)?;
            Ok(unary_type(*op, operand))
        }
        ExprKind::Call(call) => callee(call, functions).map(|f| f.return_ty),
    }
}

/// Validates the program with the default configuration.
pub fn validate(program: &Program<Generic>) -> Result<()> {
    validate_with(program, &Config::default())
}

/// Validates the program, stopping at the first violation.
pub fn validate_with(program: &Program<Generic>, config: &Config) -> Result<()> {
    let Some(main) = program.main() else {
        return Err(Span::default().wrap(Error::MissingMain));
    };
    check(
        main.params.is_empty(),
        main.name.span.wrap(Error::MainWithParameters),
    )?;

    let globals = typing(&program.globals);
    let checker = Checker {
        functions: &program.functions,
        config,
    };
    for function in &program.functions {
        checker.validate_function(function, &globals)?;
    }
    Ok(())
}

struct Checker<'p> {
    functions: &'p Functions<Generic>,
    config: &'p Config,
}

impl Checker<'_> {
    fn validate_function(&self, function: &Function<Generic>, globals: &TypeMap) -> Result<()> {
        debug!(name = %function.name, ty = %function.return_ty, "validating function");
        validate_returns(function)?;

        let tm = globals.overlay(&function.params).overlay(&function.locals);
        for stmt in &function.body.stmts {
            self.validate_stmt(stmt, function, &tm)?;
        }
        Ok(())
    }

    fn validate_stmt(
        &self,
        stmt: &Stmt<Generic>,
        function: &Function<Generic>,
        tm: &TypeMap,
    ) -> Result<()> {
        match stmt {
            Stmt::Skip => Ok(()),
            Stmt::Block(block) => {
                for stmt in &block.stmts {
                    self.validate_stmt(stmt, function, tm)?;
                }
                Ok(())
            }
            Stmt::Assignment { target, value } => {
                let dst = lookup(target, tm)?;
                let src = self.validate_expr(value, tm)?;
                let error = Error::Unassignable {
                    target: target.clone(),
                    dst,
                    src,
                };
                check(
                    self.assignable(dst, src),
                    target.span.to(value.span).wrap(error),
                )
            }
            Stmt::Conditional {
                test,
                then_branch,
                else_branch,
            } => {
                self.validate_test(test, tm)?;
                self.validate_stmt(then_branch, function, tm)?;
                self.validate_stmt(else_branch, function, tm)
            }
            Stmt::Loop { test, body } => {
                self.validate_test(test, tm)?;
                self.validate_stmt(body, function, tm)
            }
            Stmt::Call(call) => self.validate_call(call, tm).map(|_| ()),
            Stmt::Return { value, .. } => {
                let actual = self.validate_expr(value, tm)?;
                let expected = function.return_ty;
                let error = Error::ReturnMismatch { expected, actual };
                check(actual == expected, value.span.wrap(error))
            }
        }
    }

    fn validate_test(&self, test: &Expr<Generic>, tm: &TypeMap) -> Result<()> {
        let actual = self.validate_expr(test, tm)?;
        check(
            actual == Type::Bool,
            test.span.wrap(Error::NonBoolCondition { actual }),
        )
    }

    /// Validates an expression and returns its type.
    fn validate_expr(&self, expr: &Expr<Generic>, tm: &TypeMap) -> Result<Type> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Value(value) => Ok(value.ty()),
            ExprKind::Var(var) => lookup(var, tm),
            ExprKind::Binary { op, lhs, rhs, .. } => {
                let op = *op;
                let l = self.validate_expr(lhs, tm)?;
                let r = self.validate_expr(rhs, tm)?;
                if op.is_arithmetic() {
                    let error = Error::ArithmeticOperands { op, lhs: l, rhs: r };
                    check(l.is_numeric() && r.is_numeric(), span.wrap(error))?;
                } else if op.is_relational() {
                    let error = Error::RelationalOperands { op, lhs: l, rhs: r };
                    check(comparable(op, l, r), span.wrap(error))?;
                } else {
                    let error = Error::BooleanOperands { op, lhs: l, rhs: r };
                    check(l == Type::Bool && r == Type::Bool, span.wrap(error))?;
                }
                Ok(binary_type(op, l, r))
            }
            ExprKind::Unary { op, expr, .. } => {
                let operand = self.validate_expr(expr, tm)?;
                let (valid, error) = match op {
                    UnaryOperator::Not => (operand == Type::Bool, Error::NotOperand(operand)),
                    UnaryOperator::Neg => (operand.is_numeric(), Error::NegateOperand(operand)),
                    UnaryOperator::IntCast => (
                        matches!(operand, Type::Float | Type::Char),
                        Error::InvalidCast {
                            cast: Type::Int,
                            from: operand,
                        },
                    ),
                    UnaryOperator::FloatCast | UnaryOperator::CharCast => (
                        operand == Type::Int,
                        Error::InvalidCast {
                            cast: unary_type(*op, operand),
                            from: operand,
                        },
                    ),
                };
                check(valid, span.wrap(error))?;
                Ok(unary_type(*op, operand))
            }
            ExprKind::Call(call) => self.validate_call(call, tm),
        }
    }

    /// Validates a call and returns the callee's return type.
    fn validate_call(&self, call: &Call<Generic>, tm: &TypeMap) -> Result<Type> {
        let function = callee(call, self.functions)?;
        let expected = function.params.len();
        let actual = call.args.len();
        let error = Error::IncorrectNumberOfArguments {
            name: call.callee.clone(),
            expected,
            actual,
        };
        check(expected == actual, call.span.wrap(error))?;

        for (arg, param) in call.args.iter().zip(&function.params) {
            let actual = self.validate_expr(arg, tm)?;
            let error = Error::ArgumentMismatch {
                param: param.var.clone(),
                expected: param.ty,
                actual,
            };
            check(actual == param.ty, arg.span.wrap(error))?;
        }
        Ok(function.return_ty)
    }

    /// Whether a value of type `src` may be stored in a `dst` variable.
    fn assignable(&self, dst: Type, src: Type) -> bool {
        match (dst, src) {
            _ if dst == src => true,
            (Type::Float, Type::Int) | (Type::Int, Type::Char) => true,
            (Type::Int, Type::Float) => self.config.narrowing,
            _ => false,
        }
    }
}

/// Checks the placement of `return` statements. Their types are checked along
/// with the other statements.
fn validate_returns(function: &Function<Generic>) -> Result<()> {
    let name = &function.name;
    let stmts = &function.body.stmts;

    if function.return_ty == Type::Void {
        return match stmts.iter().find_map(first_return) {
            Some(span) => Err(span.wrap(Error::ReturnInVoid(name.clone()))),
            None => Ok(()),
        };
    }

    let mut top_level = stmts.iter().enumerate().filter_map(|(i, stmt)| match stmt {
        Stmt::Return { span, .. } => Some((i, *span)),
        _ => None,
    });
    match (top_level.next(), top_level.next()) {
        (Some(_), Some((_, second))) => {
            Err(second.wrap(Error::MultipleReturns(name.clone())))
        }
        (Some((i, span)), None) => check(
            i + 1 == stmts.len(),
            span.wrap(Error::ReturnNotLast(name.clone())),
        ),
        (None, _) => check(
            name.name() == MAIN,
            name.span.wrap(Error::MissingReturn(name.clone())),
        ),
    }
}

fn lookup(var: &Variable, tm: &TypeMap) -> Result<Type> {
    tm.get(var)
        .ok_or_else(|| var.span.wrap(Error::UndeclaredVariable(var.clone())))
}

fn callee<'f>(
    call: &Call<Generic>,
    functions: &'f Functions<Generic>,
) -> Result<&'f Function<Generic>> {
    functions
        .get(call.callee.name())
        .ok_or_else(|| call.callee.span.wrap(Error::UndefinedFunction(call.callee.clone())))
}

/// Numeric operands compare with each other; `char` only with `char`; `bool`
/// only for (in)equality.
fn comparable(op: BinaryOperator, lhs: Type, rhs: Type) -> bool {
    match (lhs, rhs) {
        _ if lhs.is_numeric() && rhs.is_numeric() => true,
        (Type::Char, Type::Char) => true,
        (Type::Bool, Type::Bool) => matches!(op, BinaryOperator::Eq | BinaryOperator::Ne),
        _ => false,
    }
}

pub(crate) fn binary_type(op: BinaryOperator, lhs: Type, rhs: Type) -> Type {
    if !op.is_arithmetic() {
        Type::Bool
    } else if lhs == Type::Float || rhs == Type::Float {
        Type::Float
    } else {
        Type::Int
    }
}

pub(crate) fn unary_type(op: UnaryOperator, operand: Type) -> Type {
    match op {
        UnaryOperator::Not => Type::Bool,
        UnaryOperator::Neg => operand,
        UnaryOperator::IntCast => Type::Int,
        UnaryOperator::FloatCast => Type::Float,
        UnaryOperator::CharCast => Type::Char,
    }
}

/// Span of the first `return` in the statement, at any depth.
fn first_return(stmt: &Stmt<Generic>) -> Option<Span> {
    match stmt {
        Stmt::Return { span, .. } => Some(*span),
        Stmt::Block(block) => block.stmts.iter().find_map(first_return),
        Stmt::Conditional {
            then_branch,
            else_branch,
            ..
        } => first_return(then_branch).or_else(|| first_return(else_branch)),
        Stmt::Loop { body, .. } => first_return(body),
        Stmt::Skip | Stmt::Assignment { .. } | Stmt::Call(_) => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("program has no main function")]
    MissingMain,
    #[error("main function can't take parameters")]
    MainWithParameters,
    #[error("{0} is not declared")]
    UndeclaredVariable(Variable),
    #[error("function {0} is not defined")]
    UndefinedFunction(Variable),
    #[error("type {src} is not assignable to {target} of type {dst}")]
    Unassignable {
        target: Variable,
        dst: Type,
        src: Type,
    },
    #[error("expected condition of type bool, but got {actual}")]
    NonBoolCondition { actual: Type },
    #[error("operator {op} expects numeric operands, but got {lhs} and {rhs}")]
    ArithmeticOperands {
        op: BinaryOperator,
        lhs: Type,
        rhs: Type,
    },
    #[error("operator {op} can't compare {lhs} and {rhs}")]
    RelationalOperands {
        op: BinaryOperator,
        lhs: Type,
        rhs: Type,
    },
    #[error("operator {op} expects bool operands, but got {lhs} and {rhs}")]
    BooleanOperands {
        op: BinaryOperator,
        lhs: Type,
        rhs: Type,
    },
    #[error("operator ! expects a bool operand, but got {0}")]
    NotOperand(Type),
    #[error("operator - expects a numeric operand, but got {0}")]
    NegateOperand(Type),
    #[error("can't cast {from} to {cast}")]
    InvalidCast { cast: Type, from: Type },
    #[error("incorrect number of arguments to {name}. expected {expected}, but got {actual}")]
    IncorrectNumberOfArguments {
        name: Variable,
        expected: usize,
        actual: usize,
    },
    #[error("argument for {param} expected type {expected}, but got {actual}")]
    ArgumentMismatch {
        param: Variable,
        expected: Type,
        actual: Type,
    },
    #[error("function {0} has more than one return statement")]
    MultipleReturns(Variable),
    #[error("return must be the last statement of function {0}")]
    ReturnNotLast(Variable),
    #[error("function {0} must end with a return statement")]
    MissingReturn(Variable),
    #[error("void function {0} can't return a value")]
    ReturnInVoid(Variable),
    #[error("expected return type {expected}, but got {actual}")]
    ReturnMismatch { expected: Type, actual: Type },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{parser, util::test_utils::tree_tests};

    fn parse(src: &str) -> Program<Generic> {
        parser::parse_program(src, &mut Vec::new()).expect("failed to parse")
    }

    fn expr_type(src: &str, tm: &TypeMap) -> Result<Type> {
        let expr = parser::parse_expr(src, &mut Vec::new()).expect("failed to parse");
        type_of(&expr, &Functions::default(), tm)
    }

    #[test]
    fn test_typing_maps_every_declaration() {
        let program = parse("int x, y; bool b; char c; float f; int main() { }");
        let tm = typing(&program.globals);
        assert_eq!(tm.len(), 5);
        assert_eq!(tm.to_string(), "b: bool\nc: char\nf: float\nx: int\ny: int\n");
    }

    #[test]
    fn test_type_of() {
        let program = parse("int i; float f; char c; bool b; int main() { }");
        let tm = typing(&program.globals);
        let cases = [
            ("1 + 2.5", Type::Float),
            ("2.5 * i", Type::Float),
            ("i / 2", Type::Int),
            ("i < f", Type::Bool),
            ("b && true", Type::Bool),
            ("!b", Type::Bool),
            ("-f", Type::Float),
            ("-i", Type::Int),
            ("int(f)", Type::Int),
            ("float(i)", Type::Float),
            ("char(i + 1)", Type::Char),
            ("c", Type::Char),
        ];
        for (src, expected) in cases {
            assert_eq!(expr_type(src, &tm), Ok(expected), "expr: {src:?}");
        }
        let error = expr_type("i + z", &tm).unwrap_err();
        assert_eq!(format!("{error:#}"), "4..5: z is not declared");
    }

    #[test]
    fn test_check() {
        let error = Span::default().wrap(Error::MissingMain);
        assert_eq!(check(true, error.clone()), Ok(()));
        assert_eq!(check(false, error.clone()), Err(error));
    }

    #[test]
    fn test_sample_programs_validate() {
        for src in [
            include_str!("../programs/fibonacci.clite"),
            include_str!("../programs/gcd.clite"),
            include_str!("../programs/coercions.clite"),
        ] {
            assert_eq!(validate(&parse(src)), Ok(()));
        }
    }

    #[test]
    fn test_strict_rejects_narrowing() {
        let program = parse("int main() { int i; i = 2.7; }");
        assert_eq!(validate(&program), Ok(()));
        let error = validate_with(&program, &Config::strict()).unwrap_err();
        assert_eq!(
            format!("{error:#}"),
            "20..27: type float is not assignable to i of type int"
        );
    }

    tree_tests!(
        use checker;

        fn test_valid_program() {
            let program = "
                int g; float f; char c;
                float half(int n) { return n / 2.0; }
                int main() {
                    int x; bool done;
                    x = c;
                    f = x;
                    g = f;
                    done = x < f && c == 'a' || !(done != true);
                    if (done) { x = int(half(x)) + -x; } else x = 0;
                    while (x > 0) x = x - 1;
                    return x;
                }
            ";
            let types_ok = "
                c: char
                f: float
                g: int
            ";
        }

        fn test_main_without_return() {
            let program = "void main() { }";
            let types_ok = "";
        }

        fn test_nested_returns_before_last() {
            let program = "
                int sign(int n) {
                    if (n < 0) return -1;
                    while (n == 0) return 0;
                    return 1;
                }
                int main() { }
            ";
            let types_ok = "";
        }

        fn test_missing_main() {
            let program = "int f() { return 1; }";
            let expected_errors = &["0..0: program has no main function"];
        }

        fn test_main_with_parameters() {
            let program = "int main(int a) { }";
            let expected_errors = &["4..8: main function can't take parameters"];
        }

        fn test_undeclared_target() {
            let program = "int main() { x = 1; }";
            let expected_errors = &["13..14: x is not declared"];
        }

        fn test_undeclared_in_expr() {
            let program = "int main() { int x; x = y + 1; }";
            let expected_errors = &["24..25: y is not declared"];
        }

        fn test_unassignable() {
            let program = "int main() { bool b; b = 1; }";
            let expected_errors = &["21..26: type int is not assignable to b of type bool"];
        }

        fn test_int_to_char_is_unassignable() {
            let program = "int main() { char c; c = 65; }";
            let expected_errors = &["21..27: type int is not assignable to c of type char"];
        }

        fn test_non_bool_condition() {
            let program = "int main() { int x; while (x) x = 0; }";
            let expected_errors = &["27..28: expected condition of type bool, but got int"];
        }

        fn test_non_bool_if() {
            let program = "int main() { if (1 + 2) ; }";
            let expected_errors = &["17..22: expected condition of type bool, but got int"];
        }

        fn test_arithmetic_operands() {
            let program = "int main() { int x; x = 1 + true; }";
            let expected_errors = &["24..32: operator + expects numeric operands, but got int and bool"];
        }

        fn test_relational_operands() {
            let program = "int main() { bool b; b = 'a' < 1; }";
            let expected_errors = &["25..32: operator < can't compare char and int"];
        }

        fn test_bool_ordering() {
            let program = "int main() { bool b; b = true < false; }";
            let expected_errors = &["25..37: operator < can't compare bool and bool"];
        }

        fn test_boolean_operands() {
            let program = "int main() { bool b; b = 1 && true; }";
            let expected_errors = &["25..34: operator && expects bool operands, but got int and bool"];
        }

        fn test_not_operand() {
            let program = "int main() { bool b; b = !1; }";
            let expected_errors = &["25..27: operator ! expects a bool operand, but got int"];
        }

        fn test_negate_operand() {
            let program = "int main() { bool b; b = -true; }";
            let expected_errors = &["25..30: operator - expects a numeric operand, but got bool"];
        }

        fn test_invalid_cast() {
            let program = "int main() { char c; c = char(1.5); }";
            let expected_errors = &["25..34: can't cast float to char"];
        }

        fn test_invalid_int_cast() {
            let program = "int main() { int i; i = int(true); }";
            let expected_errors = &["24..33: can't cast bool to int"];
        }

        fn test_undefined_function() {
            let program = "int main() { f(); }";
            let expected_errors = &["13..14: function f is not defined"];
        }

        fn test_incorrect_number_of_arguments() {
            let program = "void f(int a) { } int main() { f(); }";
            let expected_errors = &["31..34: incorrect number of arguments to f. expected 1, but got 0"];
        }

        fn test_argument_mismatch() {
            let program = "void f(int a) { } int main() { f(1.5); }";
            let expected_errors = &["33..36: argument for a expected type int, but got float"];
        }

        fn test_multiple_returns() {
            let program = "int f() { return 1; return 2; } int main() { }";
            let expected_errors = &["20..26: function f has more than one return statement"];
        }

        fn test_return_not_last() {
            let program = "int f() { return 1; ; } int main() { }";
            let expected_errors = &["10..16: return must be the last statement of function f"];
        }

        fn test_missing_return() {
            let program = "int f() { } int main() { }";
            let expected_errors = &["4..5: function f must end with a return statement"];
        }

        fn test_return_in_void() {
            let program = "void f() { if (true) return 1; } int main() { }";
            let expected_errors = &["21..27: void function f can't return a value"];
        }

        fn test_return_mismatch() {
            let program = "int f() { return true; } int main() { }";
            let expected_errors = &["17..21: expected return type int, but got bool"];
        }

        fn test_nested_return_mismatch() {
            let program = "int f() { if (true) return 1.5; return 1; } int main() { }";
            let expected_errors = &["27..30: expected return type int, but got float"];
        }

        fn test_void_call_is_not_a_value() {
            let program = "void f() { } int main() { int x; x = f(); }";
            let expected_errors = &["33..40: type void is not assignable to x of type int"];
        }

    );
}
