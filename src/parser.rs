use tracing::debug;

use crate::{
    ast::{
        BinaryOperator, Block, Call, Declaration, Declarations, Expr, ExprKind, Function,
        Functions, Generic, Program, Stmt, UnaryOperator, Variable,
    },
    lexer::{self, extract},
    token::{Span, Spanned, Token, TokenKind},
    types::Type,
    value::Value,
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Lexes and parses a whole program. The tokens buffer must be empty.
pub fn parse_program(src: &str, tokens: &mut Vec<Token>) -> Result<Program<Generic>> {
    parse(src, tokens, |p| p.parse_program())
}

/// Lexes and parses a single expression spanning the whole input.
pub fn parse_expr(src: &str, tokens: &mut Vec<Token>) -> Result<Expr<Generic>> {
    parse(src, tokens, |p| {
        let expr = p.parse_expr()?;
        p.consume(TokenKind::Eof)?;
        Ok(expr)
    })
}

fn parse<T>(
    src: &str,
    tokens: &mut Vec<Token>,
    f: impl FnOnce(&mut Parser<'_, '_>) -> Result<T>,
) -> Result<T> {
    lexer::lex(src, tokens).map_err(|e| e.map(Error::Lexer))?;
    let mut p = Parser::new(src, tokens);
    f(&mut p)
}

struct Parser<'src, 'tok> {
    src: &'src str,
    tokens: &'tok [Token],
    cursor: usize,
}

impl Parser<'_, '_> {
    fn parse_program(&mut self) -> Result<Program<Generic>> {
        let mut globals = Declarations::default();
        let mut functions = Functions::default();

        while self.except([]) {
            let ty = self.parse_type()?;
            let name = self.parse_ident()?;

            if self.is(TokenKind::LParen) {
                let function = self.parse_function(ty, name)?;
                let span = function.name.span;
                debug!(
                    name = %function.name,
                    params = function.params.len(),
                    locals = function.locals.len(),
                    "registered function"
                );
                if let Err(earlier) = functions.insert(function) {
                    let error = Error::DuplicateFunction {
                        earlier: earlier.span,
                        name: earlier,
                    };
                    return Err(span.wrap(error));
                }
            } else {
                Self::declare(&mut globals, name, ty)?;
                while self.take(TokenKind::Comma) {
                    let name = self.parse_ident()?;
                    Self::declare(&mut globals, name, ty)?;
                }
                self.consume(TokenKind::Semicolon)?;
            }
        }
        self.consume(TokenKind::Eof)?;

        Ok(Program { globals, functions })
    }

    fn parse_function(&mut self, return_ty: Type, name: Variable) -> Result<Function<Generic>> {
        self.consume(TokenKind::LParen)?;
        let formals = self.parse_list(TokenKind::RParen, TokenKind::Comma, |p| {
            let ty = p.parse_type()?;
            let var = p.parse_ident()?;
            Ok((var, ty))
        })?;
        self.consume(TokenKind::RParen)?;

        let mut params = Declarations::default();
        for (var, ty) in formals {
            Self::declare(&mut params, var, ty)?;
        }

        self.consume(TokenKind::LBrace)?;
        let mut locals = Declarations::default();
        while self.peek().kind.is_type() {
            let ty = self.parse_type()?;
            loop {
                let var = self.parse_ident()?;
                if let Some(earlier) = params.get(var.name()) {
                    let error = Error::DuplicateDeclaration {
                        name: var.clone(),
                        earlier: earlier.var.span,
                    };
                    return Err(var.span.wrap(error));
                }
                Self::declare(&mut locals, var, ty)?;
                if !self.take(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::Semicolon)?;
        }
        let body = self.parse_statements(TokenKind::RBrace)?;
        self.consume(TokenKind::RBrace)?;

        Ok(Function {
            return_ty,
            name,
            params,
            locals,
            body,
        })
    }

    /// Registers a variable, rejecting `void` variables and names already
    /// present in `decls`.
    fn declare(decls: &mut Declarations, var: Variable, ty: Type) -> Result<()> {
        let span = var.span;
        if ty == Type::Void {
            return Err(span.wrap(Error::VoidVariable(var)));
        }
        decls
            .insert(Declaration::new(var, ty))
            .map_err(|earlier| {
                span.wrap(Error::DuplicateDeclaration {
                    name: earlier.var.clone(),
                    earlier: earlier.var.span,
                })
            })
    }

    /// Parses statements until `end_delim`, which is **NOT** consumed.
    fn parse_statements(&mut self, end_delim: TokenKind) -> Result<Block<Generic>> {
        let mut stmts = Vec::new();
        while self.except([end_delim]) {
            stmts.push(self.parse_statement()?);
        }
        Ok(Block { stmts })
    }

    fn parse_statement(&mut self) -> Result<Stmt<Generic>> {
        let token = self.peek();
        match token.kind {
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Skip)
            }
            TokenKind::LBrace => {
                self.advance();
                let block = self.parse_statements(TokenKind::RBrace)?;
                self.consume(TokenKind::RBrace)?;
                Ok(Stmt::Block(block))
            }
            TokenKind::If => {
                self.advance();
                let test = self.parse_parenthesized()?;
                let then_branch = self.parse_statement()?;
                let else_branch = if self.take(TokenKind::Else) {
                    self.parse_statement()?
                } else {
                    Stmt::Skip
                };
                Ok(Stmt::Conditional {
                    test,
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                })
            }
            TokenKind::While => {
                self.advance();
                let test = self.parse_parenthesized()?;
                let body = self.parse_statement()?;
                Ok(Stmt::Loop {
                    test,
                    body: Box::new(body),
                })
            }
            TokenKind::Return => {
                self.advance();
                let value = self.parse_expr()?;
                self.consume(TokenKind::Semicolon)?;
                Ok(Stmt::Return {
                    value,
                    span: token.span(),
                })
            }
            TokenKind::Identifier => {
                let target = self.parse_ident()?;
                if self.is(TokenKind::LParen) {
                    let call = self.parse_call(target)?;
                    self.consume(TokenKind::Semicolon)?;
                    return Ok(Stmt::Call(call));
                }
                self.consume(TokenKind::Assign)?;
                let value = self.parse_expr()?;
                self.consume(TokenKind::Semicolon)?;
                Ok(Stmt::Assignment { target, value })
            }
            other => {
                let error = Error::UnexpectedTokenInStatement { token: other };
                Err(token.span().wrap(error))
            }
        }
    }

    fn parse_parenthesized(&mut self) -> Result<Expr<Generic>> {
        self.consume(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.consume(TokenKind::RParen)?;
        Ok(expr)
    }

    fn parse_call(&mut self, callee: Variable) -> Result<Call<Generic>> {
        self.consume(TokenKind::LParen)?;
        let args = self.parse_list(TokenKind::RParen, TokenKind::Comma, Parser::parse_expr)?;
        let end = self.consume(TokenKind::RParen)?;
        let span = callee.span.to(end.span());
        Ok(Call { callee, args, span })
    }

    fn parse_expr(&mut self) -> Result<Expr<Generic>> {
        const OPS: &[(TokenKind, BinaryOperator)] = &[(TokenKind::Or, BinaryOperator::Or)];
        self.parse_binary(OPS, Parser::parse_conjunction)
    }

    fn parse_conjunction(&mut self) -> Result<Expr<Generic>> {
        const OPS: &[(TokenKind, BinaryOperator)] = &[(TokenKind::And, BinaryOperator::And)];
        self.parse_binary(OPS, Parser::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr<Generic>> {
        const OPS: &[(TokenKind, BinaryOperator)] = &[
            (TokenKind::EqEq, BinaryOperator::Eq),
            (TokenKind::NotEq, BinaryOperator::Ne),
        ];
        self.parse_binary(OPS, Parser::parse_relation)
    }

    fn parse_relation(&mut self) -> Result<Expr<Generic>> {
        const OPS: &[(TokenKind, BinaryOperator)] = &[
            (TokenKind::Less, BinaryOperator::Lt),
            (TokenKind::LessEq, BinaryOperator::Le),
            (TokenKind::Greater, BinaryOperator::Gt),
            (TokenKind::GreaterEq, BinaryOperator::Ge),
        ];
        self.parse_binary(OPS, Parser::parse_addition)
    }

    fn parse_addition(&mut self) -> Result<Expr<Generic>> {
        const OPS: &[(TokenKind, BinaryOperator)] = &[
            (TokenKind::Plus, BinaryOperator::Add),
            (TokenKind::Minus, BinaryOperator::Sub),
        ];
        self.parse_binary(OPS, Parser::parse_term)
    }

    fn parse_term(&mut self) -> Result<Expr<Generic>> {
        const OPS: &[(TokenKind, BinaryOperator)] = &[
            (TokenKind::Star, BinaryOperator::Mul),
            (TokenKind::Slash, BinaryOperator::Div),
        ];
        self.parse_binary(OPS, Parser::parse_factor)
    }

    /// Parses one left-associative precedence tier: `next {op next}`.
    fn parse_binary(
        &mut self,
        ops: &[(TokenKind, BinaryOperator)],
        next: impl Fn(&mut Self) -> Result<Expr<Generic>>,
    ) -> Result<Expr<Generic>> {
        let mut lhs = next(self)?;
        loop {
            let current = self.peek().kind;
            let Some(&(_, op)) = ops.iter().find(|(kind, _)| *kind == current) else {
                break;
            };
            self.advance(); // Operator
            let rhs = next(self)?;
            let span = lhs.span.to(rhs.span);
            let binary = ExprKind::Binary {
                op,
                ty: (),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
            lhs = Expr::new(binary, span);
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr<Generic>> {
        let token = self.peek();
        let op = match token.kind {
            TokenKind::Not => UnaryOperator::Not,
            TokenKind::Minus => UnaryOperator::Neg,
            _ => return self.parse_primary(),
        };
        self.advance();
        let expr = self.parse_primary()?;
        let span = token.span().to(expr.span);
        let unary = ExprKind::Unary {
            op,
            ty: (),
            expr: Box::new(expr),
        };
        Ok(Expr::new(unary, span))
    }

    fn parse_primary(&mut self) -> Result<Expr<Generic>> {
        let token = self.advance();
        let span = token.span();
        let kind = match token.kind {
            TokenKind::Identifier => {
                let var = self.variable(token);
                if self.is(TokenKind::LParen) {
                    let call = self.parse_call(var)?;
                    let span = call.span;
                    return Ok(Expr::new(ExprKind::Call(call), span));
                }
                ExprKind::Var(var)
            }
            TokenKind::IntLiteral => {
                let Ok(parsed) = extract::int(token, self.src) else {
                    return Err(span.wrap(Error::ParseInt));
                };
                ExprKind::Value(Value::Int(parsed))
            }
            TokenKind::FloatLiteral => {
                let Ok(parsed) = extract::float(token, self.src) else {
                    return Err(span.wrap(Error::ParseFloat));
                };
                ExprKind::Value(Value::Float(parsed))
            }
            TokenKind::CharLiteral => ExprKind::Value(Value::Char(extract::char(token, self.src))),
            TokenKind::True => ExprKind::Value(Value::Bool(true)),
            TokenKind::False => ExprKind::Value(Value::Bool(false)),

            // Grouping: ( expr )
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.consume(TokenKind::RParen)?;
                return Ok(expr);
            }

            // Cast: type ( expr )
            kind if kind.is_type() => {
                let ty = keyword_type(kind).unwrap_or(Type::Void);
                let Some(op) = UnaryOperator::cast_to(ty) else {
                    return Err(span.wrap(Error::InvalidCast(ty)));
                };
                self.consume(TokenKind::LParen)?;
                let expr = self.parse_expr()?;
                let end = self.consume(TokenKind::RParen)?;
                let unary = ExprKind::Unary {
                    op,
                    ty: (),
                    expr: Box::new(expr),
                };
                return Ok(Expr::new(unary, span.to(end.span())));
            }

            other => {
                let error = Error::UnexpectedTokenInExpr { token: other };
                return Err(span.wrap(error));
            }
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_type(&mut self) -> Result<Type> {
        let token = self.peek();
        let Some(ty) = keyword_type(token.kind) else {
            let error = Error::ExpectedType { actual: token.kind };
            return Err(token.span().wrap(error));
        };
        self.advance();
        Ok(ty)
    }

    fn parse_ident(&mut self) -> Result<Variable> {
        let token = self.consume(TokenKind::Identifier)?;
        Ok(self.variable(token))
    }

    fn variable(&self, token: Token) -> Variable {
        Variable::new(extract::ident(token, self.src), token.span())
    }

    /// Parses `[item {separator item}]` until `end_delim` is found. Does
    /// **NOT** consume the end delimiter.
    fn parse_list<T>(
        &mut self,
        end_delim: TokenKind,
        separator: TokenKind,
        parse_item: impl Fn(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        debug_assert_ne!(end_delim, separator);

        let mut items = Vec::new();
        if self.is(end_delim) {
            return Ok(items);
        }
        loop {
            items.push(parse_item(self)?);
            if !self.take(separator) {
                break;
            }
        }
        Ok(items)
    }
}

impl Parser<'_, '_> {
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok [Token]) -> Parser<'src, 'tok> {
        Parser {
            src,
            tokens,
            cursor: 0,
        }
    }

    /// Returns the current token.
    #[inline]
    fn peek(&self) -> Token {
        match self.tokens.get(self.cursor) {
            Some(token) => *token,
            None => Token::new(TokenKind::Eof, Span::new_of_length(self.src.len(), 0)),
        }
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Token {
        let c = self.peek();
        if !c.is_eof() {
            self.cursor += 1;
        }
        c
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not, fails.
    fn consume(&mut self, expect: TokenKind) -> Result<Token> {
        let c = self.peek();
        if c.kind == expect {
            self.advance();
            Ok(c)
        } else {
            let error = Error::Unexpected {
                actual: c.kind,
                expected: expect,
            };
            Err(c.span().wrap(error))
        }
    }

    /// Returns true while the current token does *not* match one of the
    /// provided ones. [`TokenKind::Eof`] is implicitly included in the list.
    ///
    /// This won't advance the cursor.
    fn except(&self, except: impl IntoIterator<Item = TokenKind>) -> bool {
        let c = self.peek().kind;
        c != TokenKind::Eof && except.into_iter().all(|e| c != e)
    }
}

fn keyword_type(kind: TokenKind) -> Option<Type> {
    let ty = match kind {
        TokenKind::Int => Type::Int,
        TokenKind::Bool => Type::Bool,
        TokenKind::Char => Type::Char,
        TokenKind::Float => Type::Float,
        TokenKind::Void => Type::Void,
        _ => return None,
    };
    Some(ty)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lexer(lexer::Error),
    #[error("unexpected token {token:?} in expression")]
    UnexpectedTokenInExpr { token: TokenKind },
    #[error("unexpected token {token:?} in statement")]
    UnexpectedTokenInStatement { token: TokenKind },
    #[error("expected token {expected:?}, but got {actual:?}")]
    Unexpected {
        actual: TokenKind,
        expected: TokenKind,
    },
    #[error("expected a type, but got {actual:?}")]
    ExpectedType { actual: TokenKind },
    #[error("variable {name} already declared at {earlier}")]
    DuplicateDeclaration { name: Variable, earlier: Span },
    #[error("function {name} already defined at {earlier}")]
    DuplicateFunction { name: Variable, earlier: Span },
    #[error("variable {0} can't have type void")]
    VoidVariable(Variable),
    #[error("can't cast to type {0}")]
    InvalidCast(Type),
    #[error("parse int error, out of bounds")]
    ParseInt,
    #[error("invalid float literal")]
    ParseFloat,
}
