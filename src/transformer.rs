use std::collections::HashMap;

use tracing::trace;

use crate::{
    ast::{
        Block, Call, Expr, ExprKind, Function, Generic, Program, Specialized, Stmt,
        UnaryOperator, Variable,
    },
    token::Spanned,
    type_checker::{binary_type, check, unary_type},
    types::{Type, TypeMap},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Tags every operator of a validated program with its operand type and makes
/// implicit conversions explicit.
///
/// Int operands of mixed int/float arithmetic and comparisons get a `float`
/// cast. Assignments get a `float` cast when widening from int, and an `int`
/// cast when the source is a char or a float.
pub fn transform(program: Program<Generic>, globals: &TypeMap) -> Result<Program<Specialized>> {
    let returns: HashMap<Variable, Type> = program
        .functions
        .iter()
        .map(|f| (f.name.clone(), f.return_ty))
        .collect();

    let functions = program.functions.try_map(|function| -> Result<_> {
        let tm = globals.overlay(&function.params).overlay(&function.locals);
        let transformer = Transformer {
            returns: &returns,
            tm: &tm,
        };
        let body = transformer.transform_block(function.body)?;
        Ok(Function {
            return_ty: function.return_ty,
            name: function.name,
            params: function.params,
            locals: function.locals,
            body,
        })
    })?;

    Ok(Program {
        globals: program.globals,
        functions,
    })
}

struct Transformer<'a> {
    returns: &'a HashMap<Variable, Type>,
    tm: &'a TypeMap,
}

impl Transformer<'_> {
    fn transform_block(&self, block: Block<Generic>) -> Result<Block<Specialized>> {
        let stmts = block
            .stmts
            .into_iter()
            .map(|stmt| self.transform_stmt(stmt))
            .collect::<Result<_>>()?;
        Ok(Block { stmts })
    }

    fn transform_stmt(&self, stmt: Stmt<Generic>) -> Result<Stmt<Specialized>> {
        let stmt = match stmt {
            Stmt::Skip => Stmt::Skip,
            Stmt::Block(block) => Stmt::Block(self.transform_block(block)?),
            Stmt::Assignment { target, value } => {
                let dst = self.lookup(&target)?;
                let (value, src) = self.transform_expr(value)?;
                let (value, src) = coerce(value, src, dst);
                let span = target.span.to(value.span);
                let error = Error::Inconsistent {
                    target: target.clone(),
                    dst,
                    src,
                };
                check(src == dst, span.wrap(error))?;
                Stmt::Assignment { target, value }
            }
            Stmt::Conditional {
                test,
                then_branch,
                else_branch,
            } => Stmt::Conditional {
                test: self.transform_expr(test)?.0,
                then_branch: Box::new(self.transform_stmt(*then_branch)?),
                else_branch: Box::new(self.transform_stmt(*else_branch)?),
            },
            Stmt::Loop { test, body } => Stmt::Loop {
                test: self.transform_expr(test)?.0,
                body: Box::new(self.transform_stmt(*body)?),
            },
            Stmt::Call(call) => Stmt::Call(self.transform_call(call)?.0),
            Stmt::Return { value, span } => Stmt::Return {
                value: self.transform_expr(value)?.0,
                span,
            },
        };
        Ok(stmt)
    }

    /// Returns the specialized expression along with its type.
    fn transform_expr(&self, expr: Expr<Generic>) -> Result<(Expr<Specialized>, Type)> {
        let span = expr.span;
        let (kind, ty) = match expr.kind {
            ExprKind::Value(value) => (ExprKind::Value(value), value.ty()),
            ExprKind::Var(var) => {
                let ty = self.lookup(&var)?;
                (ExprKind::Var(var), ty)
            }
            ExprKind::Binary { op, lhs, rhs, .. } => {
                let (mut lhs, mut l) = self.transform_expr(*lhs)?;
                let (mut rhs, mut r) = self.transform_expr(*rhs)?;
                let tag = if op.is_boolean() {
                    Type::Bool
                } else {
                    match (l, r) {
                        (Type::Int, Type::Float) => {
                            lhs = float_cast(lhs);
                            l = Type::Float;
                        }
                        (Type::Float, Type::Int) => {
                            rhs = float_cast(rhs);
                            r = Type::Float;
                        }
                        _ => {}
                    }
                    l
                };
                trace!(op = %op, ty = %tag, "specialized binary operator");
                let binary = ExprKind::Binary {
                    op,
                    ty: tag,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                };
                (binary, binary_type(op, l, r))
            }
            ExprKind::Unary { op, expr, .. } => {
                let (expr, operand) = self.transform_expr(*expr)?;
                // Casts are tagged with their source type.
                let tag = match op {
                    UnaryOperator::Not => Type::Bool,
                    _ => operand,
                };
                trace!(op = %op, ty = %tag, "specialized unary operator");
                let unary = ExprKind::Unary {
                    op,
                    ty: tag,
                    expr: Box::new(expr),
                };
                (unary, unary_type(op, operand))
            }
            ExprKind::Call(call) => {
                let (call, ty) = self.transform_call(call)?;
                (ExprKind::Call(call), ty)
            }
        };
        Ok((Expr::new(kind, span), ty))
    }

    fn transform_call(&self, call: Call<Generic>) -> Result<(Call<Specialized>, Type)> {
        let Some(&ty) = self.returns.get(&call.callee) else {
            let error = Error::UnknownFunction(call.callee.clone());
            return Err(call.callee.span.wrap(error));
        };
        let args = call
            .args
            .into_iter()
            .map(|arg| self.transform_expr(arg).map(|(arg, _)| arg))
            .collect::<Result<_>>()?;
        let call = Call {
            callee: call.callee,
            args,
            span: call.span,
        };
        Ok((call, ty))
    }

    fn lookup(&self, var: &Variable) -> Result<Type> {
        self.tm
            .get(var)
            .ok_or_else(|| var.span.wrap(Error::UnknownVariable(var.clone())))
    }
}

/// Makes an assignment conversion explicit, returning the new source type.
fn coerce(value: Expr<Specialized>, src: Type, dst: Type) -> (Expr<Specialized>, Type) {
    match (dst, src) {
        (Type::Float, Type::Int) => (float_cast(value), Type::Float),
        (Type::Int, Type::Char | Type::Float) => {
            trace!(from = %src, "inserted int cast");
            (cast(UnaryOperator::IntCast, src, value), Type::Int)
        }
        _ => (value, src),
    }
}

fn float_cast(expr: Expr<Specialized>) -> Expr<Specialized> {
    trace!("inserted float cast");
    cast(UnaryOperator::FloatCast, Type::Int, expr)
}

fn cast(op: UnaryOperator, from: Type, expr: Expr<Specialized>) -> Expr<Specialized> {
    let span = expr.span;
    let unary = ExprKind::Unary {
        op,
        ty: from,
        expr: Box::new(expr),
    };
    Expr::new(unary, span)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("internal error: {target} of type {dst} is assigned a {src} after coercion")]
    Inconsistent {
        target: Variable,
        dst: Type,
        src: Type,
    },
    #[error("internal error: {0} has no type")]
    UnknownVariable(Variable),
    #[error("internal error: function {0} is not defined")]
    UnknownFunction(Variable),
}
