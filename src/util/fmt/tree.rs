use std::io::Write;

use crate::{ast::*, types::Type};

const INDENT_WIDTH: usize = 2;

pub fn print_program_string<S: TagWriter>(program: &Program<S>) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_program(&mut buf, program).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_expr_string<S: TagWriter>(expr: &Expr<S>) -> String {
    let mut buf = Vec::with_capacity(512);
    print_expr(&mut buf, 0, expr).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_program<S: TagWriter>(
    w: &mut impl Write,
    program: &Program<S>,
) -> std::io::Result<()> {
    for Declaration { var, ty } in &program.globals {
        writeln!(w, "global {ty} {var}")?;
    }
    for function in &program.functions {
        print_function(w, 0, function)?;
    }
    Ok(())
}

fn print_function<S: TagWriter>(
    w: &mut impl Write,
    i: usize,
    function: &Function<S>,
) -> std::io::Result<()> {
    sp(w, i)?;
    writeln!(w, "function {} {}", function.return_ty, function.name)?;
    for Declaration { var, ty } in &function.params {
        sp(w, i + 1)?;
        writeln!(w, "param {ty} {var}")?;
    }
    for Declaration { var, ty } in &function.locals {
        sp(w, i + 1)?;
        writeln!(w, "local {ty} {var}")?;
    }
    print_block(w, i + 1, &function.body)
}

fn print_block<S: TagWriter>(
    w: &mut impl Write,
    i: usize,
    block: &Block<S>,
) -> std::io::Result<()> {
    sp(w, i)?;
    writeln!(w, "block")?;
    for stmt in &block.stmts {
        print_stmt(w, i + 1, stmt)?;
    }
    Ok(())
}

fn print_stmt<S: TagWriter>(w: &mut impl Write, i: usize, stmt: &Stmt<S>) -> std::io::Result<()> {
    match stmt {
        Stmt::Skip => {
            sp(w, i)?;
            writeln!(w, "skip")?;
        }
        Stmt::Block(block) => print_block(w, i, block)?,
        Stmt::Assignment { target, value } => {
            sp(w, i)?;
            writeln!(w, "assign {target}")?;
            print_expr(w, i + 1, value)?;
        }
        Stmt::Conditional {
            test,
            then_branch,
            else_branch,
        } => {
            sp(w, i)?;
            writeln!(w, "if")?;
            print_expr(w, i + 1, test)?;
            print_stmt(w, i + 1, then_branch)?;
            print_stmt(w, i + 1, else_branch)?;
        }
        Stmt::Loop { test, body } => {
            sp(w, i)?;
            writeln!(w, "while")?;
            print_expr(w, i + 1, test)?;
            print_stmt(w, i + 1, body)?;
        }
        Stmt::Call(call) => print_call(w, i, call)?,
        Stmt::Return { value, .. } => {
            sp(w, i)?;
            writeln!(w, "return")?;
            print_expr(w, i + 1, value)?;
        }
    }
    Ok(())
}

pub fn print_expr<S: TagWriter>(w: &mut impl Write, i: usize, expr: &Expr<S>) -> std::io::Result<()> {
    match &expr.kind {
        ExprKind::Value(value) => {
            sp(w, i)?;
            writeln!(w, "{} {value}", value.ty())?;
        }
        ExprKind::Var(var) => {
            sp(w, i)?;
            writeln!(w, "var {var}")?;
        }
        ExprKind::Binary { op, ty, lhs, rhs } => {
            sp(w, i)?;
            writeln!(w, "binary {}{op}", S::write(*ty))?;
            print_expr(w, i + 1, lhs)?;
            print_expr(w, i + 1, rhs)?;
        }
        ExprKind::Unary { op, ty, expr } => {
            sp(w, i)?;
            writeln!(w, "unary {}{op}", S::write(*ty))?;
            print_expr(w, i + 1, expr)?;
        }
        ExprKind::Call(call) => print_call(w, i, call)?,
    }
    Ok(())
}

fn print_call<S: TagWriter>(w: &mut impl Write, i: usize, call: &Call<S>) -> std::io::Result<()> {
    sp(w, i)?;
    writeln!(w, "call {}", call.callee)?;
    for arg in &call.args {
        print_expr(w, i + 1, arg)?;
    }
    Ok(())
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}

/// Renders the operator tag of a stage.
pub trait TagWriter: Stage {
    fn write(tag: Self::Tag) -> &'static str;
}

impl TagWriter for Generic {
    fn write((): ()) -> &'static str {
        ""
    }
}

impl TagWriter for Specialized {
    fn write(ty: Type) -> &'static str {
        ty.name()
    }
}

impl<S: TagWriter> std::fmt::Display for Program<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&print_program_string(self))
    }
}
