/// Recursive-descent parser producing the arena AST.
///
/// Grammar notes:
///   - `(e)` is a parenthesised expression; `()`, `(e,)` and `(a, b)` are
///     tuple literals; `.l = e` fields are labelled and must follow all
///     positional fields.
///   - `fn f(...) => e;` lowers to a `Return(e)` body; without an explicit
///     `->` clause the return type is `auto` in that form and the empty
///     tuple for block bodies.
///   - `if`/`while`/match-clause bodies are always wrapped in a `Block`
///     node so each body gets its own scope.
///   - In pattern position, `name : T` is a variable binding, `(...)` is a
///     tuple pattern, `fnty (...) -> p` is a function-type pattern, a
///     postfix expression followed by a parenthesised pattern list is a
///     constructor pattern, and any other expression is an atom.
use thiserror::Error;

use crate::ast::{
    Ast, Binding, BinaryOp, ChoiceAlternative, ChoiceDecl, DeclKind, DeclaredType, ExprId,
    ExprKind, FieldId, FunctionDecl, Initialization, MatchClause, PatternId, PatternKind,
    ReturnForm, StmtId, StmtKind, StructDecl, StructMember, TupleOf, UnaryOp,
};
use crate::lexer::{Token, TokenKind};
use crate::source::SourceRegion;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Parse error [{site}]: {msg}")]
    Error { msg: String, site: SourceRegion },
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    ast: Ast,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            ast: Ast::new(),
        }
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError::Error {
            msg: msg.into(),
            site: self.current().site.clone(),
        }
    }

    fn current(&self) -> &Token {
        if self.pos < self.tokens.len() {
            &self.tokens[self.pos]
        } else {
            self.tokens.last().unwrap()
        }
    }

    fn peek(&self, offset: usize) -> &Token {
        let idx = self.pos + offset;
        if idx < self.tokens.len() {
            &self.tokens[idx]
        } else {
            self.tokens.last().unwrap()
        }
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn site(&self) -> SourceRegion {
        self.current().site.clone()
    }

    fn prev_site(&self) -> SourceRegion {
        if self.pos == 0 {
            self.site()
        } else {
            self.tokens[self.pos - 1].site.clone()
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {}, found {:?}",
                what,
                self.current().kind
            )))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(String, SourceRegion), ParseError> {
        match self.current().kind.clone() {
            TokenKind::Ident(name) => {
                let site = self.site();
                self.advance();
                Ok((name, site))
            }
            other => Err(self.error(format!("expected {}, found {:?}", what, other))),
        }
    }

    // -----------------------------------------------------------------------
    // Top level
    // -----------------------------------------------------------------------

    pub fn parse(mut self) -> Result<Ast, ParseError> {
        while !self.at(&TokenKind::Eof) {
            self.parse_declaration()?;
        }
        Ok(self.ast)
    }

    fn parse_declaration(&mut self) -> Result<(), ParseError> {
        match self.current().kind {
            TokenKind::Fn => self.parse_fn_decl(),
            TokenKind::Struct => self.parse_struct_decl(),
            TokenKind::Choice => self.parse_choice_decl(),
            TokenKind::Var => {
                let start = self.site();
                let init = self.parse_var_init()?;
                let site = start.to(&self.prev_site());
                self.ast.add_decl(DeclKind::Init(init), site);
                Ok(())
            }
            _ => Err(self.error(format!(
                "expected a declaration, found {:?}",
                self.current().kind
            ))),
        }
    }

    fn parse_fn_decl(&mut self) -> Result<(), ParseError> {
        let start = self.site();
        self.expect(&TokenKind::Fn, "'fn'")?;
        let (name, name_site) = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let params = self.parse_pattern_fields(&TokenKind::RParen)?;
        self.expect(&TokenKind::RParen, "')'")?;

        let mut ret = if self.eat(&TokenKind::Arrow) {
            if self.at(&TokenKind::Auto) {
                let site = self.site();
                self.advance();
                ReturnForm::Auto(site)
            } else {
                ReturnForm::Expr(self.parse_expr()?)
            }
        } else {
            ReturnForm::Omitted
        };

        let body = if self.at(&TokenKind::LBrace) {
            Some(self.parse_block()?)
        } else if self.at(&TokenKind::FatArrow) {
            let arrow_site = self.site();
            self.advance();
            let value = self.parse_expr()?;
            self.expect(&TokenKind::Semi, "';'")?;
            if matches!(ret, ReturnForm::Omitted) {
                ret = ReturnForm::Auto(arrow_site.clone());
            }
            let site = arrow_site.to(&self.prev_site());
            Some(self.ast.add_stmt(StmtKind::Return(value), site))
        } else {
            self.expect(&TokenKind::Semi, "function body or ';'")?;
            None
        };

        let site = start.to(&self.prev_site());
        self.ast.add_decl(
            DeclKind::Function(FunctionDecl {
                name,
                name_site,
                params,
                ret,
                body,
            }),
            site,
        );
        Ok(())
    }

    fn parse_struct_decl(&mut self) -> Result<(), ParseError> {
        let start = self.site();
        self.expect(&TokenKind::Struct, "'struct'")?;
        let (name, name_site) = self.expect_ident("struct name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut members = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let member_start = self.site();
            self.expect(&TokenKind::Var, "'var'")?;
            let (member_name, _) = self.expect_ident("member name")?;
            self.expect(&TokenKind::Colon, "':'")?;
            let type_expr = self.parse_expr()?;
            self.expect(&TokenKind::Semi, "';'")?;
            members.push(StructMember {
                name: member_name,
                type_expr,
                site: member_start.to(&self.prev_site()),
            });
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        let site = start.to(&self.prev_site());
        self.ast.add_decl(
            DeclKind::Struct(StructDecl {
                name,
                name_site,
                members,
            }),
            site,
        );
        Ok(())
    }

    fn parse_choice_decl(&mut self) -> Result<(), ParseError> {
        let start = self.site();
        self.expect(&TokenKind::Choice, "'choice'")?;
        let (name, name_site) = self.expect_ident("choice name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut alternatives = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let alt_start = self.site();
            let (alt_name, _) = self.expect_ident("alternative name")?;
            let payload = if self.eat(&TokenKind::LParen) {
                let fields = self.parse_expr_fields(&TokenKind::RParen)?;
                self.expect(&TokenKind::RParen, "')'")?;
                fields
            } else {
                TupleOf::new()
            };
            alternatives.push(ChoiceAlternative {
                name: alt_name,
                payload,
                site: alt_start.to(&self.prev_site()),
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        let site = start.to(&self.prev_site());
        self.ast.add_decl(
            DeclKind::Choice(ChoiceDecl {
                name,
                name_site,
                alternatives,
            }),
            site,
        );
        Ok(())
    }

    fn parse_var_init(&mut self) -> Result<Initialization, ParseError> {
        self.expect(&TokenKind::Var, "'var'")?;
        let pattern = self.parse_pattern()?;
        self.expect(&TokenKind::Assign, "'='")?;
        let initializer = self.parse_expr()?;
        self.expect(&TokenKind::Semi, "';'")?;
        Ok(Initialization {
            pattern,
            initializer,
        })
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn parse_block(&mut self) -> Result<StmtId, ParseError> {
        let start = self.site();
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        let site = start.to(&self.prev_site());
        Ok(self.ast.add_stmt(StmtKind::Block(stmts), site))
    }

    /// A loop or branch body: a block, or a single statement wrapped in a
    /// fresh block so it still introduces its own scope.
    fn parse_body(&mut self) -> Result<StmtId, ParseError> {
        if self.at(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            let stmt = self.parse_stmt()?;
            let site = self.ast.stmt(stmt).site.clone();
            Ok(self.ast.add_stmt(StmtKind::Block(vec![stmt]), site))
        }
    }

    fn parse_stmt(&mut self) -> Result<StmtId, ParseError> {
        let start = self.site();
        match self.current().kind {
            TokenKind::Var => {
                let init = self.parse_var_init()?;
                let site = start.to(&self.prev_site());
                Ok(self.ast.add_stmt(StmtKind::Init(init), site))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                self.expect(&TokenKind::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let body = self.parse_body()?;
                let site = start.to(&self.prev_site());
                Ok(self.ast.add_stmt(StmtKind::While { cond, body }, site))
            }
            TokenKind::Match => self.parse_match(),
            TokenKind::Break => {
                self.advance();
                self.expect(&TokenKind::Semi, "';'")?;
                let site = start.to(&self.prev_site());
                Ok(self.ast.add_stmt(StmtKind::Break, site))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(&TokenKind::Semi, "';'")?;
                let site = start.to(&self.prev_site());
                Ok(self.ast.add_stmt(StmtKind::Continue, site))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.at(&TokenKind::Semi) {
                    self.ast
                        .add_expr(ExprKind::TupleLit(TupleOf::new()), start.clone())
                } else {
                    self.parse_expr()?
                };
                self.expect(&TokenKind::Semi, "';'")?;
                let site = start.to(&self.prev_site());
                Ok(self.ast.add_stmt(StmtKind::Return(value), site))
            }
            TokenKind::LBrace => self.parse_block(),
            _ => {
                let expr = self.parse_expr()?;
                if self.eat(&TokenKind::Assign) {
                    let source = self.parse_expr()?;
                    self.expect(&TokenKind::Semi, "';'")?;
                    let site = start.to(&self.prev_site());
                    Ok(self.ast.add_stmt(
                        StmtKind::Assign {
                            target: expr,
                            source,
                        },
                        site,
                    ))
                } else {
                    self.expect(&TokenKind::Semi, "';'")?;
                    let site = start.to(&self.prev_site());
                    Ok(self.ast.add_stmt(StmtKind::Expr(expr), site))
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<StmtId, ParseError> {
        let start = self.site();
        self.expect(&TokenKind::If, "'if'")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let then_body = self.parse_body()?;
        let else_body = if self.eat(&TokenKind::Else) {
            if self.at(&TokenKind::If) {
                Some(self.parse_if()?)
            } else {
                Some(self.parse_body()?)
            }
        } else {
            None
        };
        let site = start.to(&self.prev_site());
        Ok(self.ast.add_stmt(
            StmtKind::If {
                cond,
                then_body,
                else_body,
            },
            site,
        ))
    }

    fn parse_match(&mut self) -> Result<StmtId, ParseError> {
        let start = self.site();
        self.expect(&TokenKind::Match, "'match'")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let subject = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut clauses = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let clause_start = self.site();
            let pattern = if self.eat(&TokenKind::Case) {
                let p = self.parse_pattern()?;
                Some(p)
            } else if self.eat(&TokenKind::Default) {
                None
            } else {
                return Err(self.error(format!(
                    "expected 'case' or 'default', found {:?}",
                    self.current().kind
                )));
            };
            self.expect(&TokenKind::FatArrow, "'=>'")?;
            let body = self.parse_body()?;
            clauses.push(MatchClause {
                pattern,
                body,
                site: clause_start.to(&self.prev_site()),
            });
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        let site = start.to(&self.prev_site());
        Ok(self
            .ast
            .add_stmt(StmtKind::Match { subject, clauses }, site))
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub(crate) fn parse_expr(&mut self) -> Result<ExprId, ParseError> {
        self.parse_or()
    }

    fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let site = self
            .ast
            .expr(lhs)
            .site
            .clone()
            .to(&self.ast.expr(rhs).site.clone());
        self.ast.add_expr(ExprKind::Binary(op, lhs, rhs), site)
    }

    fn parse_or(&mut self) -> Result<ExprId, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            lhs = self.binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<ExprId, ParseError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_equality()?;
            lhs = self.binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<ExprId, ParseError> {
        let mut lhs = self.parse_additive()?;
        while self.eat(&TokenKind::EqEq) {
            let rhs = self.parse_additive()?;
            lhs = self.binary(BinaryOp::Eq, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<ExprId, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.eat(&TokenKind::Plus) {
                let rhs = self.parse_unary()?;
                lhs = self.binary(BinaryOp::Add, lhs, rhs);
            } else if self.eat(&TokenKind::Minus) {
                let rhs = self.parse_unary()?;
                lhs = self.binary(BinaryOp::Sub, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<ExprId, ParseError> {
        let start = self.site();
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            let site = start.to(&self.ast.expr(operand).site.clone());
            Ok(self.ast.add_expr(ExprKind::Unary(UnaryOp::Neg, operand), site))
        } else if self.eat(&TokenKind::Not) {
            let operand = self.parse_unary()?;
            let site = start.to(&self.ast.expr(operand).site.clone());
            Ok(self.ast.add_expr(ExprKind::Unary(UnaryOp::Not, operand), site))
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<ExprId, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            expr = match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let (member, member_site) = self.expect_ident("member name")?;
                    let site = self.ast.expr(expr).site.clone().to(&member_site);
                    self.ast.add_expr(ExprKind::Member { base: expr, member }, site)
                }
                TokenKind::LBracket => {
                    self.advance();
                    let offset = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    let site = self.ast.expr(expr).site.clone().to(&self.prev_site());
                    self.ast
                        .add_expr(ExprKind::Index { base: expr, offset }, site)
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_expr_fields(&TokenKind::RParen)?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    let site = self.ast.expr(expr).site.clone().to(&self.prev_site());
                    self.ast.add_expr(ExprKind::Call { callee: expr, args }, site)
                }
                _ => return Ok(expr),
            };
        }
    }

    fn parse_primary(&mut self) -> Result<ExprId, ParseError> {
        let start = self.site();
        match self.current().kind.clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(self.ast.add_expr(ExprKind::IntLit(n), start))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.ast.add_expr(ExprKind::BoolLit(true), start))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.ast.add_expr(ExprKind::BoolLit(false), start))
            }
            TokenKind::IntType => {
                self.advance();
                Ok(self.ast.add_expr(ExprKind::IntType, start))
            }
            TokenKind::BoolType => {
                self.advance();
                Ok(self.ast.add_expr(ExprKind::BoolType, start))
            }
            TokenKind::TypeType => {
                self.advance();
                Ok(self.ast.add_expr(ExprKind::TypeType, start))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(self.ast.add_expr(ExprKind::Name(name), start))
            }
            TokenKind::Fnty => {
                let (params, ret) = self.parse_fnty()?;
                let site = start.to(&self.prev_site());
                Ok(self
                    .ast
                    .add_expr(ExprKind::FunctionType { params, ret }, site))
            }
            TokenKind::LParen => self.parse_tuple_or_paren(),
            other => Err(self.error(format!("expected an expression, found {:?}", other))),
        }
    }

    fn parse_tuple_or_paren(&mut self) -> Result<ExprId, ParseError> {
        let start = self.site();
        self.expect(&TokenKind::LParen, "'('")?;
        if self.eat(&TokenKind::RParen) {
            let site = start.to(&self.prev_site());
            return Ok(self.ast.add_expr(ExprKind::TupleLit(TupleOf::new()), site));
        }
        if self.at(&TokenKind::Dot) {
            let fields = self.parse_expr_fields(&TokenKind::RParen)?;
            self.expect(&TokenKind::RParen, "')'")?;
            let site = start.to(&self.prev_site());
            return Ok(self.ast.add_expr(ExprKind::TupleLit(fields), site));
        }

        let first = self.parse_expr()?;
        if self.eat(&TokenKind::RParen) {
            // Parenthesised expression, not a 1-tuple.
            return Ok(first);
        }
        self.expect(&TokenKind::Comma, "',' or ')'")?;
        let mut fields = TupleOf::new();
        fields.push(FieldId::Position(0), first);
        if !self.at(&TokenKind::RParen) {
            let rest = self.parse_expr_fields(&TokenKind::RParen)?;
            for field in rest.fields {
                let id = match field.id {
                    FieldId::Position(n) => FieldId::Position(n + 1),
                    label => label,
                };
                fields.push(id, field.value);
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        let site = start.to(&self.prev_site());
        Ok(self.ast.add_expr(ExprKind::TupleLit(fields), site))
    }

    /// Comma-separated tuple fields up to (not including) `close`:
    /// positional values first, then `.label = value` fields.
    fn parse_expr_fields(&mut self, close: &TokenKind) -> Result<TupleOf<ExprId>, ParseError> {
        let mut fields = TupleOf::new();
        let mut position = 0usize;
        let mut seen_label = false;
        while !self.at(close) {
            if self.at(&TokenKind::Dot) && matches!(self.peek(1).kind, TokenKind::Ident(_)) {
                self.advance();
                let (label, _) = self.expect_ident("field label")?;
                self.expect(&TokenKind::Assign, "'='")?;
                let value = self.parse_expr()?;
                fields.push(FieldId::Label(label), value);
                seen_label = true;
            } else {
                if seen_label {
                    return Err(
                        self.error("positional tuple fields must precede labeled fields")
                    );
                }
                let value = self.parse_expr()?;
                fields.push(FieldId::Position(position), value);
                position += 1;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(fields)
    }

    // -----------------------------------------------------------------------
    // Patterns
    // -----------------------------------------------------------------------

    fn parse_fnty(&mut self) -> Result<(TupleOf<PatternId>, PatternId), ParseError> {
        self.expect(&TokenKind::Fnty, "'fnty'")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let params = self.parse_pattern_fields(&TokenKind::RParen)?;
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::Arrow, "'->'")?;
        let ret = self.parse_pattern()?;
        Ok((params, ret))
    }

    pub(crate) fn parse_pattern(&mut self) -> Result<PatternId, ParseError> {
        let start = self.site();
        match self.current().kind.clone() {
            TokenKind::LParen => {
                self.advance();
                let fields = self.parse_pattern_fields(&TokenKind::RParen)?;
                self.expect(&TokenKind::RParen, "')'")?;
                let site = start.to(&self.prev_site());
                Ok(self.ast.add_pattern(PatternKind::Tuple(fields), site))
            }
            TokenKind::Fnty => {
                let (params, ret) = self.parse_fnty()?;
                let site = start.to(&self.prev_site());
                Ok(self
                    .ast
                    .add_pattern(PatternKind::FunctionType { params, ret }, site))
            }
            TokenKind::Ident(name) if self.peek(1).kind == TokenKind::Colon => {
                let name_site = self.site();
                self.advance();
                self.advance();
                let declared = if self.at(&TokenKind::Auto) {
                    self.advance();
                    DeclaredType::Auto
                } else {
                    DeclaredType::Expr(self.parse_expr()?)
                };
                let site = start.to(&self.prev_site());
                let binding = self.ast.add_binding(Binding {
                    name,
                    declared,
                    site: name_site,
                });
                Ok(self.ast.add_pattern(PatternKind::Variable(binding), site))
            }
            _ => self.parse_expr_pattern(),
        }
    }

    /// An expression pattern: a postfix chain that turns into a constructor
    /// pattern when followed by a parenthesised pattern list, and an atom
    /// otherwise.
    fn parse_expr_pattern(&mut self) -> Result<PatternId, ParseError> {
        let start = self.site();
        if self.at(&TokenKind::Minus) || self.at(&TokenKind::Not) {
            let expr = self.parse_unary()?;
            let site = start.to(&self.prev_site());
            return Ok(self.ast.add_pattern(PatternKind::Atom(expr), site));
        }

        let mut expr = self.parse_primary()?;
        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let (member, member_site) = self.expect_ident("member name")?;
                    let site = self.ast.expr(expr).site.clone().to(&member_site);
                    expr = self
                        .ast
                        .add_expr(ExprKind::Member { base: expr, member }, site);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let offset = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    let site = self.ast.expr(expr).site.clone().to(&self.prev_site());
                    expr = self
                        .ast
                        .add_expr(ExprKind::Index { base: expr, offset }, site);
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_pattern_fields(&TokenKind::RParen)?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    let site = start.to(&self.prev_site());
                    return Ok(self
                        .ast
                        .add_pattern(PatternKind::Call { callee: expr, args }, site));
                }
                _ => break,
            }
        }
        let site = self.ast.expr(expr).site.clone();
        Ok(self.ast.add_pattern(PatternKind::Atom(expr), site))
    }

    fn parse_pattern_fields(&mut self, close: &TokenKind) -> Result<TupleOf<PatternId>, ParseError> {
        let mut fields = TupleOf::new();
        let mut position = 0usize;
        let mut seen_label = false;
        while !self.at(close) {
            if self.at(&TokenKind::Dot) && matches!(self.peek(1).kind, TokenKind::Ident(_)) {
                self.advance();
                let (label, _) = self.expect_ident("field label")?;
                self.expect(&TokenKind::Assign, "'='")?;
                let value = self.parse_pattern()?;
                fields.push(FieldId::Label(label), value);
                seen_label = true;
            } else {
                if seen_label {
                    return Err(
                        self.error("positional tuple fields must precede labeled fields")
                    );
                }
                let value = self.parse_pattern()?;
                fields.push(FieldId::Position(position), value);
                position += 1;
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(fields)
    }
}
