use std::cmp::Ordering;

use tracing::debug;

use crate::{
    ast::{
        BinaryOperator, Block, Call, Declarations, Expr, ExprKind, Function, Functions, Program,
        Specialized, Stmt, UnaryOperator, Variable,
    },
    state::State,
    token::{Span, Spanned},
    types::Type,
    value::{self, Value},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Maximum number of active call frames, `main` included. Each frame nests
/// several host stack frames, so deeper recursion would overflow the thread's
/// stack.
pub const MAX_CALL_DEPTH: usize = 256;

/// Runs the program's `main` function.
///
/// The final state holds the globals and the variables of `main`, which
/// shadow globals of the same name.
pub fn interpret(program: &Program<Specialized>) -> Result<State> {
    let Some(main) = program.main() else {
        return Err(Span::default().wrap(Error::MissingMain));
    };
    let interpreter = Interpreter {
        functions: &program.functions,
    };
    let mut env = Env {
        globals: undefined(&program.globals),
        frames: Vec::with_capacity(16),
    };

    env.push(main, Vec::new())
        .map_err(|e| main.name.span.wrap(e))?;
    let completion = interpreter.exec_block(&main.body, &mut env);
    let frame = env.pop();
    completion?;

    Ok(env.globals.merge(frame))
}

/// How a statement finished.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Completion {
    Normal,
    Returned(Value),
}

/// Global variables plus one frame per active call.
struct Env {
    globals: State,
    frames: Vec<State>,
}

impl Env {
    fn push(&mut self, function: &Function<Specialized>, args: Vec<Value>) -> Result<(), Error> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(Error::StackOverflow {
                depth: MAX_CALL_DEPTH,
            });
        }
        let params = function.params.iter().zip(args);
        let frame = params.fold(undefined(&function.locals), |frame, (param, arg)| {
            frame.onion(param.var.clone(), arg)
        });
        self.frames.push(frame);
        debug!(function = %function.name, depth = self.frames.len(), "pushed call frame");
        Ok(())
    }

    fn pop(&mut self) -> State {
        debug!(depth = self.frames.len(), "popped call frame");
        self.frames.pop().unwrap_or_default()
    }

    fn lookup(&self, var: &Variable) -> Option<Value> {
        self.frames
            .last()
            .and_then(|frame| frame.get(var))
            .or_else(|| self.globals.get(var))
    }

    /// Stores `value` in the innermost variable named `var`.
    fn assign(&mut self, var: &Variable, value: Value) -> bool {
        let slot = match self.frames.last_mut() {
            Some(frame) if frame.contains(var) => frame.get_mut(var),
            _ => self.globals.get_mut(var),
        };
        match slot {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

fn undefined(decls: &Declarations) -> State {
    decls.iter().fold(State::new(), |state, decl| {
        state.onion(decl.var.clone(), Value::undefined(decl.ty))
    })
}

struct Interpreter<'p> {
    functions: &'p Functions<Specialized>,
}

impl Interpreter<'_> {
    fn exec_block(&self, block: &Block<Specialized>, env: &mut Env) -> Result<Completion> {
        for stmt in &block.stmts {
            if let Completion::Returned(value) = self.exec(stmt, env)? {
                return Ok(Completion::Returned(value));
            }
        }
        Ok(Completion::Normal)
    }

    fn exec(&self, stmt: &Stmt<Specialized>, env: &mut Env) -> Result<Completion> {
        match stmt {
            Stmt::Skip => Ok(Completion::Normal),
            Stmt::Block(block) => self.exec_block(block, env),
            Stmt::Assignment { target, value } => {
                let value = self.eval(value, env)?;
                if !env.assign(target, value) {
                    let error = Error::UnboundVariable(target.clone());
                    return Err(target.span.wrap(error));
                }
                Ok(Completion::Normal)
            }
            Stmt::Conditional {
                test,
                then_branch,
                else_branch,
            } => {
                if self.eval_test(test, env)? {
                    self.exec(then_branch, env)
                } else {
                    self.exec(else_branch, env)
                }
            }
            Stmt::Loop { test, body } => {
                while self.eval_test(test, env)? {
                    if let Completion::Returned(value) = self.exec(body, env)? {
                        return Ok(Completion::Returned(value));
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Call(call) => {
                self.call(call, env)?;
                Ok(Completion::Normal)
            }
            Stmt::Return { value, .. } => Ok(Completion::Returned(self.eval(value, env)?)),
        }
    }

    fn eval_test(&self, test: &Expr<Specialized>, env: &mut Env) -> Result<bool> {
        let value = self.eval(test, env)?;
        value.as_bool().map_err(|e| test.span.wrap(e.into()))
    }

    /// Calls a function, returning the value of its `return`, if any.
    fn call(&self, call: &Call<Specialized>, env: &mut Env) -> Result<Option<Value>> {
        let Some(function) = self.functions.get(call.callee.name()) else {
            let error = Error::UndefinedFunction(call.callee.clone());
            return Err(call.callee.span.wrap(error));
        };
        let args = call
            .args
            .iter()
            .map(|arg| self.eval(arg, env))
            .collect::<Result<Vec<_>>>()?;

        env.push(function, args)
            .map_err(|e| call.span.wrap(e))?;
        let completion = self.exec_block(&function.body, env);
        env.pop();

        match completion? {
            Completion::Returned(value) => Ok(Some(value)),
            Completion::Normal => Ok(None),
        }
    }

    fn eval(&self, expr: &Expr<Specialized>, env: &mut Env) -> Result<Value> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Value(value) => Ok(*value),
            ExprKind::Var(var) => env
                .lookup(var)
                .ok_or_else(|| span.wrap(Error::UnboundVariable(var.clone()))),
            ExprKind::Binary { op, ty, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                binary(*op, *ty, lhs, rhs).map_err(|e| span.wrap(e))
            }
            ExprKind::Unary { op, ty, expr } => {
                let operand = self.eval(expr, env)?;
                unary(*op, *ty, operand).map_err(|e| span.wrap(e))
            }
            ExprKind::Call(call) => self.call(call, env)?.ok_or_else(|| {
                let error = Error::MissingReturnValue(call.callee.clone());
                span.wrap(error)
            }),
        }
    }
}

fn binary(op: BinaryOperator, ty: Type, lhs: Value, rhs: Value) -> Result<Value, Error> {
    use BinaryOperator::*;

    let unsupported = || Error::Unsupported {
        op: op.symbol(),
        ty,
    };
    let value = match ty {
        Type::Int => {
            let (a, b) = (lhs.as_int()?, rhs.as_int()?);
            match op {
                Add => Value::Int(a.wrapping_add(b)),
                Sub => Value::Int(a.wrapping_sub(b)),
                Mul => Value::Int(a.wrapping_mul(b)),
                Div if b == 0 => return Err(Error::DivisionByZero),
                Div => Value::Int(a.wrapping_div(b)),
                _ => compare(op, a.partial_cmp(&b)).ok_or_else(unsupported)?,
            }
        }
        Type::Float => {
            let (a, b) = (lhs.as_float()?, rhs.as_float()?);
            match op {
                Add => Value::Float(a + b),
                Sub => Value::Float(a - b),
                Mul => Value::Float(a * b),
                Div => Value::Float(a / b),
                _ => compare(op, a.partial_cmp(&b)).ok_or_else(unsupported)?,
            }
        }
        Type::Char => {
            let (a, b) = (lhs.as_char()?, rhs.as_char()?);
            compare(op, a.partial_cmp(&b)).ok_or_else(unsupported)?
        }
        Type::Bool => {
            let (a, b) = (lhs.as_bool()?, rhs.as_bool()?);
            match op {
                And => Value::Bool(a && b),
                Or => Value::Bool(a || b),
                Eq => Value::Bool(a == b),
                Ne => Value::Bool(a != b),
                _ => return Err(unsupported()),
            }
        }
        Type::Void => return Err(unsupported()),
    };
    Ok(value)
}

/// Applies a relational operator to an ordering. `None` for other operators.
///
/// An unordered comparison (NaN) is only true for `!=`.
fn compare(op: BinaryOperator, ordering: Option<Ordering>) -> Option<Value> {
    use BinaryOperator::*;

    let result = match (op, ordering) {
        (Eq, o) => o == Some(Ordering::Equal),
        (Ne, o) => o != Some(Ordering::Equal),
        (Lt, o) => o == Some(Ordering::Less),
        (Le, o) => matches!(o, Some(Ordering::Less | Ordering::Equal)),
        (Gt, o) => o == Some(Ordering::Greater),
        (Ge, o) => matches!(o, Some(Ordering::Greater | Ordering::Equal)),
        _ => return None,
    };
    Some(Value::Bool(result))
}

/// Applies a unary operator; `ty` is the operand type.
fn unary(op: UnaryOperator, ty: Type, operand: Value) -> Result<Value, Error> {
    let value = match (op, ty) {
        (UnaryOperator::Not, Type::Bool) => Value::Bool(!operand.as_bool()?),
        (UnaryOperator::Neg, Type::Int) => Value::Int(operand.as_int()?.wrapping_neg()),
        (UnaryOperator::Neg, Type::Float) => Value::Float(-operand.as_float()?),
        (UnaryOperator::FloatCast, Type::Int) => Value::Float(operand.as_int()? as f32),
        // Truncates toward zero, saturating at the `int` bounds.
        (UnaryOperator::IntCast, Type::Float) => Value::Int(operand.as_float()? as i32),
        (UnaryOperator::IntCast, Type::Char) => Value::Int(operand.as_char()? as i32),
        (UnaryOperator::CharCast, Type::Int) => {
            let code = operand.as_int()?;
            let c = u32::try_from(code).ok().and_then(char::from_u32);
            Value::Char(c.ok_or(Error::InvalidCharCode(code))?)
        }
        _ => {
            return Err(Error::Unsupported {
                op: op.symbol(),
                ty,
            })
        }
    };
    Ok(value)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Value(#[from] value::Error),
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid character code {0}")]
    InvalidCharCode(i32),
    #[error("{0} is not bound")]
    UnboundVariable(Variable),
    #[error("function {0} is not defined")]
    UndefinedFunction(Variable),
    #[error("function {0} finished without returning a value")]
    MissingReturnValue(Variable),
    #[error("program has no main function")]
    MissingMain,
    #[error("stack overflow: call depth exceeds {depth}")]
    StackOverflow { depth: usize },
    #[error("operator {op} is not supported on {ty}")]
    Unsupported { op: &'static str, ty: Type },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::util::test_utils::tree_tests;

    #[test]
    fn test_binary_operators() {
        use BinaryOperator::*;
        let cases = [
            (Add, Type::Int, Value::Int(i32::MAX), Value::Int(1), Value::Int(i32::MIN)),
            (Div, Type::Int, Value::Int(-7), Value::Int(2), Value::Int(-3)),
            (Div, Type::Float, Value::Float(1.0), Value::Float(4.0), Value::Float(0.25)),
            (Le, Type::Float, Value::Float(1.5), Value::Float(1.5), Value::Bool(true)),
            (Lt, Type::Char, Value::Char('a'), Value::Char('b'), Value::Bool(true)),
            (Ne, Type::Char, Value::Char('a'), Value::Char('a'), Value::Bool(false)),
            (And, Type::Bool, Value::Bool(true), Value::Bool(false), Value::Bool(false)),
            (Or, Type::Bool, Value::Bool(false), Value::Bool(true), Value::Bool(true)),
            (Eq, Type::Bool, Value::Bool(false), Value::Bool(false), Value::Bool(true)),
        ];
        for (op, ty, lhs, rhs, expected) in cases {
            assert_eq!(binary(op, ty, lhs, rhs), Ok(expected), "{lhs} {ty}{op} {rhs}");
        }
        assert_eq!(
            binary(Div, Type::Int, Value::Int(1), Value::Int(0)),
            Err(Error::DivisionByZero)
        );
        assert_eq!(
            binary(Add, Type::Char, Value::Char('a'), Value::Char('b')),
            Err(Error::Unsupported {
                op: "+",
                ty: Type::Char
            })
        );
        assert_eq!(
            binary(Add, Type::Int, Value::undefined(Type::Int), Value::Int(1)),
            Err(Error::Value(value::Error::Undefined(Type::Int)))
        );
    }

    #[test]
    fn test_unary_operators() {
        use UnaryOperator::*;
        let cases = [
            (Not, Type::Bool, Value::Bool(true), Value::Bool(false)),
            (Neg, Type::Int, Value::Int(4), Value::Int(-4)),
            (Neg, Type::Float, Value::Float(4.5), Value::Float(-4.5)),
            (FloatCast, Type::Int, Value::Int(3), Value::Float(3.0)),
            (IntCast, Type::Float, Value::Float(2.7), Value::Int(2)),
            (IntCast, Type::Float, Value::Float(-2.7), Value::Int(-2)),
            (IntCast, Type::Float, Value::Float(1e20), Value::Int(i32::MAX)),
            (IntCast, Type::Char, Value::Char('A'), Value::Int(65)),
            (CharCast, Type::Int, Value::Int(97), Value::Char('a')),
        ];
        for (op, ty, operand, expected) in cases {
            assert_eq!(unary(op, ty, operand), Ok(expected), "{ty}{op} {operand}");
        }
        assert_eq!(
            unary(CharCast, Type::Int, Value::Int(0xD800)),
            Err(Error::InvalidCharCode(0xD800))
        );
    }

    tree_tests!(
        use interpreter;

        fn test_while_loop() {
            let program = "int main(){ int x; x = 0; while (x < 3) { x = x + 1; } }";
            let state_ok = "x: 3";
        }

        fn test_call_does_not_leak_parameters() {
            let program = "
                int add(int a, int b){ return a + b; }
                int main(){ int r; r = add(2,3); }
            ";
            let state_ok = "r: 5";
        }

        fn test_widening_assignment() {
            let program = "int main() { int i; float f; i = 3; f = i; }";
            let state_ok = "
                f: 3.0
                i: 3
            ";
        }

        fn test_narrowing_assignment() {
            let program = "int main() { float g; int j; g = 2.7; j = g; }";
            let state_ok = "
                g: 2.7
                j: 2
            ";
        }

        fn test_mixed_arithmetic() {
            let program = "int main() { int x; float y; x = 3; y = x + 1.5; }";
            let state_ok = "
                x: 3
                y: 4.5
            ";
        }

        fn test_boolean_and_char_comparison() {
            let program = "bool a, b; int main() { a = true && false; b = 'a' < 'b'; }";
            let state_ok = "
                a: false
                b: true
            ";
        }

        fn test_copying_undefined_is_not_an_error() {
            let program = "int g; int main() { int x, y; y = x; }";
            let state_ok = "
                g: undef int
                x: undef int
                y: undef int
            ";
        }

        fn test_call_statement_updates_globals() {
            let program = "
                int g;
                void bump(int by) { g = g + by; }
                int main() { g = 1; bump(2); bump(3); }
            ";
            let state_ok = "g: 6";
        }

        fn test_locals_shadow_globals() {
            let program = "
                int x;
                void set() { int x; x = 5; }
                int main() { x = 1; set(); }
            ";
            let state_ok = "x: 1";
        }

        fn test_locals_are_fresh_per_call() {
            let program = "
                int seen;
                void f(bool first) { int l; if (first) l = 7; else seen = l; }
                int main() { f(true); f(false); }
            ";
            let state_ok = "seen: undef int";
        }

        fn test_return_stops_loops() {
            let program = "
                int root(int n) {
                    int i;
                    i = 0;
                    while (true) {
                        if (i * i >= n) { return i; }
                        i = i + 1;
                    }
                    return -1;
                }
                int main() { int r; r = root(10); }
            ";
            let state_ok = "r: 4";
        }

        fn test_main_return_stops_execution() {
            let program = "int main() { int x; x = 1; if (x == 1) return 0; x = 2; }";
            let state_ok = "x: 1";
        }

        fn test_no_short_circuit() {
            let program = "
                int calls;
                bool touch() { calls = calls + 1; return true; }
                int main() { bool b; calls = 0; b = false && touch() || touch(); }
            ";
            let state_ok = "
                b: true
                calls: 2
            ";
        }

        fn test_call_statement_discards_return_value() {
            let program = "
                int g;
                int f() { g = 1; if (true) return 5; g = 2; return 0; }
                int main() { f(); }
            ";
            let state_ok = "g: 1";
        }

        fn test_recursion_within_depth_limit() {
            let program = "
                int down(int n) { int r; r = 0; if (n > 0) r = down(n - 1); return r + 1; }
                int main() { int r; r = down(200); }
            ";
            let state_ok = "r: 201";
        }

        fn test_recursion_past_depth_limit() {
            let program = "
                int down(int n) { int r; r = 0; if (n > 0) r = down(n - 1); return r; }
                int main() { int r; r = down(300); }
            ";
            let expected_errors = &["64..75: stack overflow: call depth exceeds 256"];
        }

        fn test_fibonacci() {
            let program = include_str!("../programs/fibonacci.clite");
            let state_ok = "
                a: 55
                b: 89
                calls: 177
                i: 10
                rec: 55
                t: 89
            ";
        }

        fn test_gcd() {
            let program = include_str!("../programs/gcd.clite");
            let state_ok = "
                coprime: true
                g: 12
            ";
        }

        fn test_coercions() {
            let program = include_str!("../programs/coercions.clite");
            let state_ok = "
                c: 'C'
                code: 65
                f: 3.0
                g: 6.5
                i: 3
                j: 6
                scale: 3.0
            ";
        }

        fn test_undefined_read() {
            let program = "int main() { int x, y; y = x + 1; }";
            let expected_errors = &["27..32: read of undefined int value"];
        }

        fn test_undefined_condition() {
            let program = "int main() { bool b; if (b) ; }";
            let expected_errors = &["25..26: read of undefined bool value"];
        }

        fn test_division_by_zero() {
            let program = "int main() { int x; x = 0; x = 7 / x; }";
            let expected_errors = &["31..36: division by zero"];
        }

        fn test_invalid_char_code() {
            let program = "int main() { char c; c = char(-1); }";
            let expected_errors = &["25..33: invalid character code -1"];
        }
    );
}
