#![allow(clippy::cast_possible_truncation)]
//! Hand-written recursive-descent parser for Muni.
//!
//! One token of lookahead suffices everywhere except the classic `<`
//! ambiguity between comparison and generic argument lists. There the parser
//! commits by scanning ahead for a matching `>` separated only by valid type
//! tokens and commas, and only treats the sequence as type arguments when it
//! is followed by `(` or `.` (constructor and static-method positions).
//!
//! The parser recovers at top-level declaration boundaries so one run reports
//! every declaration's first error. Node ids are assigned sequentially in
//! parse order; id 0 is reserved for invalid nodes.

use crate::errors::{ParseError, SyntaxError};
use crate::lexer::{self, Keyword, Token, TokenKind};
use crate::nodes::{
    AliasDecl, ArrayLiteral, ArrayType, AssignOp, AssignStatement, BinaryExpression, BinaryOp,
    Block, BoolLiteral, BreakStatement, CallExpression, CharLiteral, ConstructorDecl,
    ConstructorExpression, ContinueStatement, Declaration, DoWhileStatement, Expression,
    ExpressionStatement, FieldAccessExpression, FieldDecl, FileImportDecl, ForStatement,
    FunctionDecl, HostImportDecl, Identifier, IfStatement, IndexExpression, IntLiteral, Location,
    MethodCallExpression, NamedType, NullLiteral, Parameter, ReturnStatement, SourceFile,
    Statement, StaticCallExpression, StringLiteral, StructureDecl, ThisExpression, TypeExpr,
    UnaryExpression, UnaryOp, UntilStatement, VarDeclStatement, VoidType, WhileStatement,
};

/// Parse a whole source file, lexing first.
///
/// # Errors
///
/// Returns every lexical error, or (when lexing succeeds) every parse error
/// collected with declaration-level recovery.
pub fn parse_source(source: &str, source_name: &str) -> Result<SourceFile, Vec<SyntaxError>> {
    let tokens = lexer::tokenize(source, source_name)
        .map_err(|errors| errors.into_iter().map(SyntaxError::Lex).collect::<Vec<_>>())?;
    Parser::new(tokens)
        .parse_program()
        .map_err(|errors| errors.into_iter().map(SyntaxError::Parse).collect())
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: u32,
    errors: Vec<ParseError>,
}

impl Parser {
    /// The token stream must end with an `Eof` token, as `lexer::tokenize`
    /// guarantees.
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        assert!(
            matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)),
            "token stream must be terminated by Eof"
        );
        Self {
            tokens,
            pos: 0,
            next_id: 1,
            errors: Vec::new(),
        }
    }

    /// Parse the token stream into a [`SourceFile`].
    ///
    /// # Errors
    ///
    /// Returns all parse errors found, one per failed declaration.
    pub fn parse_program(mut self) -> Result<SourceFile, Vec<ParseError>> {
        let start = self.current().location.clone();
        let mut declarations = Vec::new();
        while !self.at_eof() {
            match self.parse_declaration() {
                Ok(declaration) => declarations.push(declaration),
                Err(error) => {
                    self.errors.push(error);
                    self.synchronize_declaration();
                }
            }
        }
        if self.errors.is_empty() {
            let location = Location::span(&start, &self.current().location);
            Ok(SourceFile {
                id: self.make_id(),
                location,
                declarations,
            })
        } else {
            Err(self.errors)
        }
    }

    // ---- token plumbing ----------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self, ahead: usize) -> &Token {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)]
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.current().kind == *kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn prev_location(&self) -> Location {
        if self.pos == 0 {
            self.current().location.clone()
        } else {
            self.tokens[self.pos - 1].location.clone()
        }
    }

    fn span_from(&self, start: &Location) -> Location {
        Location::span(start, &self.prev_location())
    }

    fn make_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        if matches!(token.kind, TokenKind::Eof) {
            ParseError::UnexpectedEof {
                expected: expected.to_string(),
                location: token.location.clone(),
            }
        } else {
            ParseError::UnexpectedToken {
                found: token.describe(),
                expected: expected.to_string(),
                location: token.location.clone(),
            }
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, ParseError> {
        if matches!(self.current().kind, TokenKind::Keyword(kw) if kw == keyword) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("`{}`", keyword.as_str())))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<Identifier, ParseError> {
        if let TokenKind::Identifier(name) = &self.current().kind {
            let name = name.clone();
            let token = self.advance();
            Ok(Identifier {
                id: self.make_id(),
                location: token.location,
                name,
            })
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Skip to a plausible declaration boundary after an error: the closing
    /// brace of the enclosing declaration, a terminating `;`, or a keyword
    /// that starts a declaration. A `;` directly followed by `}` is treated
    /// as the tail of a broken block, so the brace is consumed too.
    fn synchronize_declaration(&mut self) {
        let mut depth: u32 = 0;
        while !self.at_eof() {
            match self.current().kind {
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    if !self.at(&TokenKind::RBrace) {
                        return;
                    }
                }
                TokenKind::Keyword(
                    Keyword::Structure | Keyword::Alias | Keyword::Import,
                ) if depth == 0 => {
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ---- declarations ------------------------------------------------------

    fn parse_declaration(&mut self) -> Result<Declaration, ParseError> {
        match self.current().kind {
            TokenKind::Keyword(Keyword::Structure) => {
                self.parse_structure().map(Declaration::Structure)
            }
            TokenKind::Keyword(Keyword::Alias) => self.parse_alias().map(Declaration::Alias),
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            _ => self.parse_function(false).map(Declaration::Function),
        }
    }

    fn parse_function(&mut self, is_static: bool) -> Result<FunctionDecl, ParseError> {
        let start = self.current().location.clone();
        let return_type = self.parse_type()?;
        let name = self.expect_identifier("a function name")?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let params = self.parse_params()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        let body = self.parse_block()?;
        Ok(FunctionDecl {
            id: self.make_id(),
            location: self.span_from(&start),
            return_type,
            name,
            params,
            body,
            is_static,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Parameter>, ParseError> {
        let mut params = Vec::new();
        if self.at(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let start = self.current().location.clone();
            let ty = self.parse_type()?;
            let name = self.expect_identifier("a parameter name")?;
            params.push(Parameter {
                id: self.make_id(),
                location: self.span_from(&start),
                ty,
                name,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_structure(&mut self) -> Result<StructureDecl, ParseError> {
        let start = self.current().location.clone();
        self.expect_keyword(Keyword::Structure)?;
        let name = self.expect_identifier("a structure name")?;
        let type_params = self.parse_type_params()?;
        self.expect(&TokenKind::LBrace, "`{`")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut constructor: Option<ConstructorDecl> = None;
        while !self.at(&TokenKind::RBrace) && !self.at_eof() {
            if matches!(self.current().kind, TokenKind::Keyword(Keyword::Static)) {
                self.advance();
                methods.push(self.parse_function(true)?);
                continue;
            }
            // A member whose name equals the structure and is directly
            // followed by `(` is the constructor.
            let is_ctor = matches!(&self.current().kind, TokenKind::Identifier(n) if *n == name.name)
                && matches!(self.peek(1).kind, TokenKind::LParen);
            if is_ctor {
                if constructor.is_some() {
                    return Err(self.unexpected("a field or method (constructor already declared)"));
                }
                let ctor_start = self.current().location.clone();
                self.advance();
                self.expect(&TokenKind::LParen, "`(`")?;
                let params = self.parse_params()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                let body = self.parse_block()?;
                constructor = Some(ConstructorDecl {
                    id: self.make_id(),
                    location: self.span_from(&ctor_start),
                    params,
                    body,
                });
                continue;
            }
            let member_start = self.current().location.clone();
            let ty = self.parse_type()?;
            let member_name = self.expect_identifier("a member name")?;
            if self.eat(&TokenKind::Semicolon) {
                fields.push(FieldDecl {
                    id: self.make_id(),
                    location: self.span_from(&member_start),
                    ty,
                    name: member_name,
                });
            } else if self.at(&TokenKind::LParen) {
                self.advance();
                let params = self.parse_params()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                let body = self.parse_block()?;
                methods.push(FunctionDecl {
                    id: self.make_id(),
                    location: self.span_from(&member_start),
                    return_type: ty,
                    name: member_name,
                    params,
                    body,
                    is_static: false,
                });
            } else {
                return Err(self.unexpected("`;` or `(`"));
            }
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(StructureDecl {
            id: self.make_id(),
            location: self.span_from(&start),
            name,
            type_params,
            fields,
            constructor,
            methods,
        })
    }

    fn parse_type_params(&mut self) -> Result<Vec<Identifier>, ParseError> {
        let mut params = Vec::new();
        if !self.eat(&TokenKind::Lt) {
            return Ok(params);
        }
        loop {
            params.push(self.expect_identifier("a type parameter name")?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Gt, "`>`")?;
        Ok(params)
    }

    fn parse_alias(&mut self) -> Result<AliasDecl, ParseError> {
        let start = self.current().location.clone();
        self.expect_keyword(Keyword::Alias)?;
        let name = self.expect_identifier("an alias name")?;
        let type_params = self.parse_type_params()?;
        self.expect(&TokenKind::Assign, "`=`")?;
        let body = self.parse_type()?;
        self.expect(&TokenKind::Semicolon, "`;`")?;
        Ok(AliasDecl {
            id: self.make_id(),
            location: self.span_from(&start),
            name,
            type_params,
            body,
        })
    }

    fn parse_import(&mut self) -> Result<Declaration, ParseError> {
        let start = self.current().location.clone();
        self.expect_keyword(Keyword::Import)?;
        if self.eat(&TokenKind::Lt) {
            // File import: reconstruct the path from raw lexemes up to `>`.
            let mut path = String::new();
            while !self.at(&TokenKind::Gt) {
                if self.at_eof() || self.at(&TokenKind::Semicolon) {
                    return Err(self.unexpected("`>` to close the import path"));
                }
                path.push_str(&self.advance().lexeme);
            }
            self.expect(&TokenKind::Gt, "`>`")?;
            self.eat(&TokenKind::Semicolon);
            return Ok(Declaration::FileImport(FileImportDecl {
                id: self.make_id(),
                location: self.span_from(&start),
                path,
            }));
        }
        let module = self.expect_identifier("a host module name")?;
        self.expect(&TokenKind::Dot, "`.`")?;
        let name = self.expect_identifier("a host function name")?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                params.push(self.parse_type()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        self.expect(&TokenKind::Arrow, "`->`")?;
        let return_type = self.parse_type()?;
        self.expect(&TokenKind::Semicolon, "`;`")?;
        Ok(Declaration::HostImport(HostImportDecl {
            id: self.make_id(),
            location: self.span_from(&start),
            module,
            name,
            params,
            return_type,
        }))
    }

    // ---- types -------------------------------------------------------------

    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let start = self.current().location.clone();
        match &self.current().kind {
            TokenKind::Keyword(Keyword::Void) => {
                self.advance();
                Ok(TypeExpr::Void(VoidType {
                    id: self.make_id(),
                    location: self.span_from(&start),
                }))
            }
            TokenKind::Identifier(name) if name == "array" => {
                self.advance();
                self.expect(&TokenKind::Lt, "`<` (array element type)")?;
                let element = self.parse_type()?;
                self.expect(&TokenKind::Gt, "`>`")?;
                Ok(TypeExpr::Array(Box::new(ArrayType {
                    id: self.make_id(),
                    location: self.span_from(&start),
                    element,
                })))
            }
            TokenKind::Identifier(_) => {
                let name = self.expect_identifier("a type name")?;
                let mut type_args = Vec::new();
                if self.eat(&TokenKind::Lt) {
                    loop {
                        type_args.push(self.parse_type()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::Gt, "`>`")?;
                }
                Ok(TypeExpr::Named(NamedType {
                    id: self.make_id(),
                    location: self.span_from(&start),
                    name,
                    type_args,
                }))
            }
            _ => Err(self.unexpected("a type")),
        }
    }

    // ---- statements --------------------------------------------------------

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.current().location.clone();
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut statements = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at_eof() {
            statements.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(Block {
            id: self.make_id(),
            location: self.span_from(&start),
            statements,
        })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.current().kind {
            TokenKind::LBrace => self.parse_block().map(Statement::Block),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Until) => self.parse_until(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => {
                let start = self.current().location.clone();
                self.advance();
                self.expect(&TokenKind::Semicolon, "`;`")?;
                Ok(Statement::Break(BreakStatement {
                    id: self.make_id(),
                    location: self.span_from(&start),
                }))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let start = self.current().location.clone();
                self.advance();
                self.expect(&TokenKind::Semicolon, "`;`")?;
                Ok(Statement::Continue(ContinueStatement {
                    id: self.make_id(),
                    location: self.span_from(&start),
                }))
            }
            _ => self.parse_simple_statement(true),
        }
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        let start = self.current().location.clone();
        self.expect_keyword(Keyword::If)?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        let then_branch = self.parse_statement()?;
        let else_branch = if matches!(self.current().kind, TokenKind::Keyword(Keyword::Else)) {
            self.advance();
            Some(self.parse_statement()?)
        } else {
            None
        };
        Ok(Statement::If(Box::new(IfStatement {
            id: self.make_id(),
            location: self.span_from(&start),
            condition,
            then_branch,
            else_branch,
        })))
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        let start = self.current().location.clone();
        self.expect_keyword(Keyword::While)?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        let body = self.parse_statement()?;
        Ok(Statement::While(Box::new(WhileStatement {
            id: self.make_id(),
            location: self.span_from(&start),
            condition,
            body,
        })))
    }

    fn parse_until(&mut self) -> Result<Statement, ParseError> {
        let start = self.current().location.clone();
        self.expect_keyword(Keyword::Until)?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        let body = self.parse_statement()?;
        Ok(Statement::Until(Box::new(UntilStatement {
            id: self.make_id(),
            location: self.span_from(&start),
            condition,
            body,
        })))
    }

    fn parse_do_while(&mut self) -> Result<Statement, ParseError> {
        let start = self.current().location.clone();
        self.expect_keyword(Keyword::Do)?;
        let body = self.parse_statement()?;
        self.expect_keyword(Keyword::While)?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        self.expect(&TokenKind::Semicolon, "`;`")?;
        Ok(Statement::DoWhile(Box::new(DoWhileStatement {
            id: self.make_id(),
            location: self.span_from(&start),
            body,
            condition,
        })))
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        let start = self.current().location.clone();
        self.expect_keyword(Keyword::For)?;
        self.expect(&TokenKind::LParen, "`(`")?;
        let init = if self.eat(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement(true)?))
        };
        let condition = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon, "`;`")?;
        let step = if self.at(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement(false)?))
        };
        self.expect(&TokenKind::RParen, "`)`")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::For(Box::new(ForStatement {
            id: self.make_id(),
            location: self.span_from(&start),
            init,
            condition,
            step,
            body,
        })))
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        let start = self.current().location.clone();
        self.expect_keyword(Keyword::Return)?;
        let value = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon, "`;`")?;
        Ok(Statement::Return(ReturnStatement {
            id: self.make_id(),
            location: self.span_from(&start),
            value,
        }))
    }

    /// Variable declaration, assignment, or expression statement. The
    /// for-loop step reuses this with `require_semi = false`.
    fn parse_simple_statement(&mut self, require_semi: bool) -> Result<Statement, ParseError> {
        let start = self.current().location.clone();

        // Speculate on a variable declaration: a type followed by a name.
        if matches!(
            self.current().kind,
            TokenKind::Identifier(_) | TokenKind::Keyword(Keyword::Void)
        ) {
            let saved_pos = self.pos;
            let saved_id = self.next_id;
            if let Ok(ty) = self.parse_type() {
                if matches!(self.current().kind, TokenKind::Identifier(_)) {
                    let name = self.expect_identifier("a variable name")?;
                    let value = if self.eat(&TokenKind::Assign) {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    if require_semi {
                        self.expect(&TokenKind::Semicolon, "`;`")?;
                    }
                    return Ok(Statement::VarDecl(VarDeclStatement {
                        id: self.make_id(),
                        location: self.span_from(&start),
                        ty,
                        name,
                        value,
                    }));
                }
            }
            self.pos = saved_pos;
            self.next_id = saved_id;
        }

        let expression = self.parse_expression()?;
        let op = match self.current().kind {
            TokenKind::Assign => Some(AssignOp::Assign),
            TokenKind::PlusAssign => Some(AssignOp::AddAssign),
            TokenKind::MinusAssign => Some(AssignOp::SubAssign),
            TokenKind::StarAssign => Some(AssignOp::MulAssign),
            TokenKind::SlashAssign => Some(AssignOp::DivAssign),
            _ => None,
        };
        if let Some(op) = op {
            if !matches!(
                expression,
                Expression::Identifier(_) | Expression::FieldAccess(_) | Expression::Index(_)
            ) {
                return Err(ParseError::InvalidAssignmentTarget {
                    location: expression.location().clone(),
                });
            }
            self.advance();
            let value = self.parse_expression()?;
            if require_semi {
                self.expect(&TokenKind::Semicolon, "`;`")?;
            }
            return Ok(Statement::Assign(AssignStatement {
                id: self.make_id(),
                location: self.span_from(&start),
                target: expression,
                op,
                value,
            }));
        }
        if require_semi {
            self.expect(&TokenKind::Semicolon, "`;`")?;
        }
        Ok(Statement::Expression(ExpressionStatement {
            id: self.make_id(),
            location: self.span_from(&start),
            expression,
        }))
    }

    // ---- expressions -------------------------------------------------------

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_binary(0)
    }

    /// Precedence climbing over the binary operator tiers, low to high:
    /// `||`, `&&`, equality, relational, additive, multiplicative.
    fn parse_binary(&mut self, min_level: u8) -> Result<Expression, ParseError> {
        let start = self.current().location.clone();
        let mut left = if min_level >= 6 {
            self.parse_unary()?
        } else {
            self.parse_binary(min_level + 1)?
        };
        loop {
            let op = match (min_level, &self.current().kind) {
                (0, TokenKind::OrOr) => BinaryOp::Or,
                (1, TokenKind::AndAnd) => BinaryOp::And,
                (2, TokenKind::EqEq) => BinaryOp::Eq,
                (2, TokenKind::BangEq) => BinaryOp::Ne,
                (3, TokenKind::Lt) => BinaryOp::Lt,
                (3, TokenKind::Le) => BinaryOp::Le,
                (3, TokenKind::Gt) => BinaryOp::Gt,
                (3, TokenKind::Ge) => BinaryOp::Ge,
                (4, TokenKind::Plus) => BinaryOp::Add,
                (4, TokenKind::Minus) => BinaryOp::Sub,
                (5, TokenKind::Star) => BinaryOp::Mul,
                (5, TokenKind::Slash) => BinaryOp::Div,
                (5, TokenKind::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = if min_level >= 6 {
                self.parse_unary()?
            } else {
                self.parse_binary(min_level + 1)?
            };
            left = Expression::Binary(Box::new(BinaryExpression {
                id: self.make_id(),
                location: self.span_from(&start),
                left,
                operator: op,
                right,
            }));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let start = self.current().location.clone();
        match self.current().kind {
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expression::Unary(Box::new(UnaryExpression {
                    id: self.make_id(),
                    location: self.span_from(&start),
                    operator: UnaryOp::Not,
                    operand,
                })))
            }
            TokenKind::Minus => {
                // Fold `-<literal>` so i32::MIN is representable.
                if let TokenKind::Int(value) = &self.peek(1).kind {
                    let value = *value;
                    self.advance();
                    let literal = self.advance();
                    return self.make_int_literal(-value, &literal, &start);
                }
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expression::Unary(Box::new(UnaryExpression {
                    id: self.make_id(),
                    location: self.span_from(&start),
                    operator: UnaryOp::Neg,
                    operand,
                })))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let start = self.current().location.clone();
        let mut expression = self.parse_primary()?;
        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_identifier("a field or method name")?;
                    if self.at(&TokenKind::LParen) {
                        let arguments = self.parse_call_args()?;
                        expression = Expression::MethodCall(Box::new(MethodCallExpression {
                            id: self.make_id(),
                            location: self.span_from(&start),
                            receiver: expression,
                            method: member,
                            arguments,
                        }));
                    } else {
                        expression = Expression::FieldAccess(Box::new(FieldAccessExpression {
                            id: self.make_id(),
                            location: self.span_from(&start),
                            receiver: expression,
                            field: member,
                        }));
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "`]`")?;
                    expression = Expression::Index(Box::new(IndexExpression {
                        id: self.make_id(),
                        location: self.span_from(&start),
                        receiver: expression,
                        index,
                    }));
                }
                _ => break,
            }
        }
        Ok(expression)
    }

    #[allow(clippy::too_many_lines)]
    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let start = self.current().location.clone();
        match self.current().kind.clone() {
            TokenKind::Int(value) => {
                let literal = self.advance();
                self.make_int_literal(value, &literal, &start)
            }
            TokenKind::Char(value) => {
                let token = self.advance();
                Ok(Expression::CharLiteral(CharLiteral {
                    id: self.make_id(),
                    location: token.location,
                    value,
                }))
            }
            TokenKind::Str(value) => {
                let token = self.advance();
                Ok(Expression::StringLiteral(StringLiteral {
                    id: self.make_id(),
                    location: token.location,
                    value,
                }))
            }
            TokenKind::Keyword(Keyword::True) => {
                let token = self.advance();
                Ok(Expression::BoolLiteral(BoolLiteral {
                    id: self.make_id(),
                    location: token.location,
                    value: true,
                }))
            }
            TokenKind::Keyword(Keyword::False) => {
                let token = self.advance();
                Ok(Expression::BoolLiteral(BoolLiteral {
                    id: self.make_id(),
                    location: token.location,
                    value: false,
                }))
            }
            TokenKind::Keyword(Keyword::Null) => {
                let token = self.advance();
                Ok(Expression::Null(NullLiteral {
                    id: self.make_id(),
                    location: token.location,
                }))
            }
            TokenKind::Keyword(Keyword::This) => {
                let token = self.advance();
                Ok(Expression::This(ThisExpression {
                    id: self.make_id(),
                    location: token.location,
                }))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.at(&TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBracket, "`]`")?;
                Ok(Expression::ArrayLiteral(ArrayLiteral {
                    id: self.make_id(),
                    location: self.span_from(&start),
                    elements,
                }))
            }
            TokenKind::Identifier(name) => {
                if name == "array" && matches!(self.peek(1).kind, TokenKind::Lt) {
                    let ty = self.parse_type()?;
                    let arguments = self.parse_call_args()?;
                    return Ok(Expression::Constructor(Box::new(ConstructorExpression {
                        id: self.make_id(),
                        location: self.span_from(&start),
                        ty,
                        arguments,
                    })));
                }
                if matches!(self.peek(1).kind, TokenKind::Lt) && self.looks_like_type_args() {
                    let ty = self.parse_type()?;
                    if self.at(&TokenKind::LParen) {
                        let arguments = self.parse_call_args()?;
                        return Ok(Expression::Constructor(Box::new(ConstructorExpression {
                            id: self.make_id(),
                            location: self.span_from(&start),
                            ty,
                            arguments,
                        })));
                    }
                    self.expect(&TokenKind::Dot, "`(` or `.`")?;
                    let method = self.expect_identifier("a static method name")?;
                    if !self.at(&TokenKind::LParen) {
                        return Err(self.unexpected("`(`"));
                    }
                    let arguments = self.parse_call_args()?;
                    return Ok(Expression::StaticCall(Box::new(StaticCallExpression {
                        id: self.make_id(),
                        location: self.span_from(&start),
                        ty,
                        method,
                        arguments,
                    })));
                }
                let identifier = self.expect_identifier("an identifier")?;
                if self.at(&TokenKind::LParen) {
                    let arguments = self.parse_call_args()?;
                    return Ok(Expression::Call(Box::new(CallExpression {
                        id: self.make_id(),
                        location: self.span_from(&start),
                        callee: identifier,
                        arguments,
                    })));
                }
                Ok(Expression::Identifier(identifier))
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn make_int_literal(
        &mut self,
        value: i64,
        literal: &Token,
        start: &Location,
    ) -> Result<Expression, ParseError> {
        if value > i64::from(i32::MAX) || value < i64::from(i32::MIN) {
            return Err(ParseError::IntegerLiteralOutOfRange {
                literal: literal.lexeme.clone(),
                location: self.span_from(start),
            });
        }
        Ok(Expression::IntLiteral(IntLiteral {
            id: self.make_id(),
            location: self.span_from(start),
            value: value as i32,
        }))
    }

    /// Caller guarantees the current token is `(`.
    fn parse_call_args(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut arguments = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                arguments.push(self.parse_expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(arguments)
    }

    /// Decide whether the `<` after the current identifier opens a generic
    /// argument list. Scans for the matching `>` allowing only identifiers,
    /// commas, and nested angle brackets, then requires `(` or `.` after it.
    fn looks_like_type_args(&self) -> bool {
        let mut depth = 0usize;
        let mut index = self.pos + 1;
        loop {
            let Some(token) = self.tokens.get(index) else {
                return false;
            };
            match token.kind {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return self
                            .tokens
                            .get(index + 1)
                            .is_some_and(|after| {
                                matches!(after.kind, TokenKind::LParen | TokenKind::Dot)
                            });
                    }
                }
                TokenKind::Identifier(_) | TokenKind::Comma => {}
                _ => return false,
            }
            index += 1;
        }
    }
}
