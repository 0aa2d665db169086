use super::ast::{Expr, ExprKind, FunctionDecl, OperatorKind, Prototype, SourceLocation};
use super::error::Error;
use super::lexer::Lexer;
use super::operators::OperatorTable;
use super::token::Token;

/// Name given to the function wrapping a top-level expression.
pub const ANON_EXPR: &str = "__anon_expr";

/// Recursive descent parser with one token of lookahead.
///
/// Binary expressions go through precedence climbing over an
/// `OperatorTable` handed in by the caller, so operators defined by
/// earlier declarations are visible to later ones.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    loc: SourceLocation,
}

type ParseResult<T> = Result<T, Error>;

impl<'a> Parser<'a> {
    /// Primes the lookahead with the first token.
    pub fn new(src: &'a str) -> ParseResult<Self> {
        let mut p = Parser {
            lexer: Lexer::new(src),
            current: Token::Eof,
            loc: SourceLocation::default(),
        };
        p.advance()?;
        Ok(p)
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    /// A syntax error at the current token.
    fn error(&self, msg: &str) -> Error {
        Error::syntax(msg).at(self.loc)
    }

    fn advance(&mut self) -> ParseResult<()> {
        self.current = self.lexer.next_token()?;
        self.loc = self.lexer.location();
        Ok(())
    }

    /// Drops the current token; this is how the driver recovers from a
    /// failed declaration.
    pub fn skip_token(&mut self) -> ParseResult<()> {
        self.advance()
    }

    fn expect(&mut self, tok: Token, msg: &str) -> ParseResult<()> {
        if self.current != tok {
            return Err(self.error(msg));
        }
        self.advance()
    }

    fn ident(&mut self, msg: &str) -> ParseResult<String> {
        match &self.current {
            Token::Ident(id) => {
                let id = id.clone();
                self.advance()?;
                Ok(id)
            }
            _ => Err(self.error(msg)),
        }
    }

    fn current_precedence(&self, ops: &OperatorTable) -> i32 {
        match self.current {
            Token::Kwd(c) if c.is_ascii() => ops.precedence(c),
            _ => -1,
        }
    }

    /// expression ::= unary binoprhs
    pub fn parse_expression(&mut self, ops: &OperatorTable) -> ParseResult<Expr> {
        let lhs = self.parse_unary(ops)?;
        self.parse_binary_rhs(ops, 0, lhs)
    }

    /// binoprhs ::= (binop unary)*
    fn parse_binary_rhs(
        &mut self,
        ops: &OperatorTable,
        min_prec: i32,
        mut lhs: Expr,
    ) -> ParseResult<Expr> {
        loop {
            let prec = self.current_precedence(ops);
            let op = match self.current {
                Token::Kwd(c) if prec >= min_prec => c,
                _ => return Ok(lhs),
            };
            let loc = self.loc;
            self.advance()?;

            let mut rhs = self.parse_unary(ops)?;

            if prec < self.current_precedence(ops) {
                rhs = self.parse_binary_rhs(ops, prec + 1, rhs)?;
            }

            lhs = Expr::new(loc, ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
    }

    /// unary ::= primary | op unary
    fn parse_unary(&mut self, ops: &OperatorTable) -> ParseResult<Expr> {
        let op = match self.current {
            Token::Kwd(c) if c.is_ascii() && c != '(' && c != ',' => c,
            _ => return self.parse_primary(ops),
        };
        let loc = self.loc;
        self.advance()?;
        let operand = self.parse_unary(ops)?;
        Ok(Expr::new(loc, ExprKind::Unary(op, Box::new(operand))))
    }

    /// primary ::= number | identifierexpr | parenexpr | ifexpr | forexpr | varexpr
    pub fn parse_primary(&mut self, ops: &OperatorTable) -> ParseResult<Expr> {
        match self.current {
            Token::Ident(_) => self.call_or_variable(ops),
            Token::Number(n) => {
                let e = Expr::new(self.loc, ExprKind::Number(n));
                self.advance()?;
                Ok(e)
            }
            Token::Kwd('(') => self.paren(ops),
            Token::If => self.parse_if(ops),
            Token::For => self.parse_for(ops),
            Token::Var => self.parse_var(ops),
            _ => Err(self.error("unknown token when expecting an expression")),
        }
    }

    fn paren(&mut self, ops: &OperatorTable) -> ParseResult<Expr> {
        self.advance()?;
        let e = self.parse_expression(ops)?;
        self.expect(Token::Kwd(')'), "expected ')'")?;
        Ok(e)
    }

    fn call_or_variable(&mut self, ops: &OperatorTable) -> ParseResult<Expr> {
        let loc = self.loc;
        let id = self.ident("expected identifier")?;

        if self.current != Token::Kwd('(') {
            return Ok(Expr::new(loc, ExprKind::Variable(id)));
        }
        self.advance()?;

        let aa = self.args(ops)?;
        Ok(Expr::new(loc, ExprKind::Call(id, aa)))
    }

    /// Comma separated, consumes the closing `)`.
    fn args(&mut self, ops: &OperatorTable) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.current != Token::Kwd(')') {
            loop {
                args.push(self.parse_expression(ops)?);

                if self.current == Token::Kwd(')') {
                    break;
                }
                self.expect(Token::Kwd(','), "Expected ')' or ',' in argument list")?;
            }
        }
        self.advance()?;
        Ok(args)
    }

    /// ifexpr ::= 'if' expression 'then' expression 'else' expression
    fn parse_if(&mut self, ops: &OperatorTable) -> ParseResult<Expr> {
        let loc = self.loc;
        self.advance()?;

        let cond = self.parse_expression(ops)?;
        self.expect(Token::Then, "expected then")?;
        let then = self.parse_expression(ops)?;
        self.expect(Token::Else, "expected else")?;
        let else_ = self.parse_expression(ops)?;

        Ok(Expr::new(
            loc,
            ExprKind::If {
                cond: Box::new(cond),
                then: Box::new(then),
                else_: Box::new(else_),
            },
        ))
    }

    /// forexpr ::= 'for' identifier '=' expr ',' expr (',' expr)? 'in' expression
    fn parse_for(&mut self, ops: &OperatorTable) -> ParseResult<Expr> {
        let loc = self.loc;
        self.advance()?;

        let var = self.ident("expected identifier after for")?;
        self.expect(Token::Kwd('='), "expected '=' after for")?;
        let start = self.parse_expression(ops)?;
        self.expect(Token::Kwd(','), "expected ',' after for start value")?;
        let end = self.parse_expression(ops)?;

        let step = if self.current == Token::Kwd(',') {
            self.advance()?;
            Some(Box::new(self.parse_expression(ops)?))
        } else {
            None
        };

        self.expect(Token::In, "expected 'in' after for")?;
        let body = self.parse_expression(ops)?;

        Ok(Expr::new(
            loc,
            ExprKind::For {
                var,
                start: Box::new(start),
                end: Box::new(end),
                step,
                body: Box::new(body),
            },
        ))
    }

    /// varexpr ::= 'var' identifier ('=' expression)?
    ///                 (',' identifier ('=' expression)?)* 'in' expression
    fn parse_var(&mut self, ops: &OperatorTable) -> ParseResult<Expr> {
        let loc = self.loc;
        self.advance()?;

        let mut bindings = Vec::new();
        loop {
            let name = self.ident("expected identifier after var")?;
            let init = if self.current == Token::Kwd('=') {
                self.advance()?;
                Some(self.parse_expression(ops)?)
            } else {
                None
            };
            bindings.push((name, init));

            if self.current != Token::Kwd(',') {
                break;
            }
            self.advance()?;
        }

        self.expect(Token::In, "expected 'in' keyword after 'var'")?;
        let body = self.parse_expression(ops)?;

        Ok(Expr::new(
            loc,
            ExprKind::Var {
                bindings,
                body: Box::new(body),
            },
        ))
    }

    /// prototype ::= id '(' id* ')'
    ///           ::= 'unary' LETTER '(' id ')'
    ///           ::= 'binary' LETTER number? '(' id id ')'
    pub fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let loc = self.loc;

        let (name, kind, operands) = match self.current.clone() {
            Token::Ident(id) => {
                self.advance()?;
                (id, OperatorKind::Function, None)
            }
            Token::Unary => {
                self.advance()?;
                let op = self.operator_symbol("Expected unary operator")?;
                (format!("unary{}", op), OperatorKind::Unary, Some(1))
            }
            Token::Binary => {
                self.advance()?;
                let op = self.operator_symbol("Expected binary operator")?;
                let mut prec = 30;
                if let Token::Number(n) = self.current {
                    if n < 1.0 || n > 100.0 {
                        return Err(self.error("Invalid precedence: must be 1..100"));
                    }
                    prec = n as i32;
                    self.advance()?;
                }
                (format!("binary{}", op), OperatorKind::Binary(prec), Some(2))
            }
            _ => return Err(self.error("Expected function name in prototype")),
        };

        self.expect(Token::Kwd('('), "Expected '(' in prototype")?;

        let mut params = Vec::new();
        while let Token::Ident(id) = &self.current {
            params.push(id.clone());
            self.advance()?;
        }

        self.expect(Token::Kwd(')'), "Expected ')' in prototype")?;

        if let Some(n) = operands {
            if params.len() != n {
                return Err(self.error("Invalid number of operands for operator"));
            }
        }

        Ok(Prototype::new(name, params, kind, loc))
    }

    fn operator_symbol(&mut self, msg: &str) -> ParseResult<char> {
        match self.current {
            Token::Kwd(c) if c.is_ascii() => {
                self.advance()?;
                Ok(c)
            }
            _ => Err(self.error(msg)),
        }
    }

    /// definition ::= 'def' prototype expression
    pub fn parse_definition(&mut self, ops: &OperatorTable) -> ParseResult<FunctionDecl> {
        self.advance()?;
        let proto = self.parse_prototype()?;
        let body = self.parse_expression(ops)?;
        Ok(FunctionDecl::new(proto, Some(body)))
    }

    /// external ::= 'extern' prototype
    pub fn parse_extern(&mut self) -> ParseResult<FunctionDecl> {
        self.advance()?;
        let proto = self.parse_prototype()?;
        Ok(FunctionDecl::new(proto, None))
    }

    /// toplevelexpr ::= expression, wrapped in a nullary anonymous function.
    pub fn parse_top_level_expr(&mut self, ops: &OperatorTable) -> ParseResult<FunctionDecl> {
        let loc = self.loc;
        let body = self.parse_expression(ops)?;
        let proto = Prototype::new(ANON_EXPR.to_owned(), vec![], OperatorKind::Function, loc);
        Ok(FunctionDecl::new(proto, Some(body)))
    }
}
