// ABOUTME: Pratt parser translating the token stream into AST nodes

use crate::ast::{BinaryOp, LambdaDef, Node};
use crate::error::ParseError;
use crate::token::{Token, TokenKind};
use std::rc::Rc;

/// Binding strength of each token when it appears in infix position, from
/// loosest to tightest. The ordering drives the Pratt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// One level tighter. Binary operators parse their right operand here,
    /// which is what makes them left-associative.
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

type PrefixFn = fn(&mut Parser) -> Result<Node, ParseError>;
type InfixFn = fn(&mut Parser, Node) -> Result<Node, ParseError>;

struct ParseRule {
    prefix: Option<PrefixFn>,
    infix: Option<InfixFn>,
    precedence: Precedence,
}

macro_rules! rule {
    ($prefix:expr, $infix:expr, $precedence:expr) => {
        ParseRule {
            prefix: $prefix,
            infix: $infix,
            precedence: $precedence,
        }
    };
}

/// The dispatch table: how each token behaves in prefix and infix position.
fn rule(kind: TokenKind) -> ParseRule {
    use TokenKind::*;
    match kind {
        //                          Prefix                        Infix                       Precedence
        LeftParen => rule!(Some(Parser::grouping), Some(Parser::invocation), Precedence::Call),
        LeftBracket => rule!(Some(Parser::list_literal), Some(Parser::subscript), Precedence::Call),
        Dot => rule!(None, Some(Parser::member), Precedence::Call),
        Pipe => rule!(Some(Parser::lambda), None, Precedence::None),
        Minus => rule!(Some(Parser::unary), Some(Parser::binary), Precedence::Term),
        Plus => rule!(None, Some(Parser::binary), Precedence::Term),
        Star | Slash => rule!(None, Some(Parser::binary), Precedence::Factor),
        Bang => rule!(Some(Parser::unary), None, Precedence::None),
        EqualEqual | BangEqual => rule!(None, Some(Parser::binary), Precedence::Equality),
        Less | Greater | LessEqual | GreaterEqual => {
            rule!(None, Some(Parser::binary), Precedence::Comparison)
        }
        DotDot | DotDotEqual => rule!(None, Some(Parser::range), Precedence::Comparison),
        And => rule!(None, Some(Parser::binary), Precedence::And),
        Or => rule!(None, Some(Parser::binary), Precedence::Or),
        Equal => rule!(None, Some(Parser::assignment), Precedence::Assignment),
        Identifier => rule!(Some(Parser::identifier), None, Precedence::None),
        NilLiteral | BoolLiteral | NumberLiteral | StringLiteral | CharLiteral => {
            rule!(Some(Parser::literal), None, Precedence::None)
        }
        _ => rule!(None, None, Precedence::None),
    }
}

/// Parses a whole token stream. Statement-level failures are collected, the
/// parser resynchronizes past the next end of statement, and parsing
/// continues; a program with any recorded error yields `Err` and is never
/// executed.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Node>, Vec<ParseError>> {
    let mut parser = Parser::new(tokens);
    let mut nodes = Vec::new();
    while !parser.check(TokenKind::Eof) {
        match parser.statement() {
            Ok(node) => nodes.push(node),
            Err(error) => {
                parser.errors.push(error);
                parser.synchronize();
            }
        }
    }
    if parser.errors.is_empty() {
        Ok(nodes)
    } else {
        Err(parser.errors)
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
    loop_depth: usize,
    lambda_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(
            tokens.last().map(|t| t.kind),
            Some(TokenKind::Eof)
        ));
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
            loop_depth: 0,
            lambda_depth: 0,
        }
    }

    // ------------------------------------------------------------------
    // Token navigation
    // ------------------------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos - 1]
    }

    fn advance(&mut self) {
        if self.current().kind != TokenKind::Eof {
            self.pos += 1;
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            return Ok(());
        }
        Err(self.unexpected(expected))
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        if self.check(TokenKind::Identifier) {
            self.advance();
            return Ok(self.previous().source.clone());
        }
        Err(self.unexpected(expected))
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current().describe(),
        }
    }

    /// A statement ends at the line's synthetic terminator. A block-bodied
    /// lambda consumes the terminator of its header line itself, in which
    /// case the terminator we would expect here has already gone by.
    fn end_statement(&mut self) -> Result<(), ParseError> {
        if self.matches(TokenKind::EndStatement) || self.check(TokenKind::Eof) {
            return Ok(());
        }
        if self.pos > 0 && self.previous().kind == TokenKind::EndStatement {
            return Ok(());
        }
        Err(self.unexpected("end of statement"))
    }

    /// Skips forward until just past the next end of statement.
    fn synchronize(&mut self) {
        loop {
            match self.current().kind {
                TokenKind::Eof => return,
                TokenKind::EndStatement => {
                    self.advance();
                    return;
                }
                _ => self.advance(),
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> Result<Node, ParseError> {
        match self.current().kind {
            TokenKind::Var => self.var_statement(),
            TokenKind::Const => self.const_statement(),
            TokenKind::Fn => self.fn_statement(),
            TokenKind::Class => self.class_statement(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Break => self.break_statement(),
            TokenKind::Continue => self.continue_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Print => self.print_statement(),
            TokenKind::Super => self.super_statement(),
            _ => self.expression_statement(),
        }
    }

    fn var_statement(&mut self) -> Result<Node, ParseError> {
        self.advance();
        let name = self.expect_identifier("a variable name")?;
        let node = if self.matches(TokenKind::Equal) {
            let init = self.expression()?;
            Node::VariableInstantiation {
                name,
                init: Box::new(init),
            }
        } else {
            Node::VariableDeclaration(name)
        };
        self.end_statement()?;
        Ok(node)
    }

    fn const_statement(&mut self) -> Result<Node, ParseError> {
        self.advance();
        let name = self.expect_identifier("a constant name")?;
        self.expect(TokenKind::Equal, "'='")?;
        let init = self.expression()?;
        self.end_statement()?;
        Ok(Node::ConstantInstantiation {
            name,
            init: Box::new(init),
        })
    }

    /// `fn NAME(params)` followed by an indented body. Sugar for a named
    /// lambda bound as a constant.
    fn fn_statement(&mut self) -> Result<Node, ParseError> {
        let def = self.function(self.current().indent)?;
        let name = def.name.clone().expect("fn declarations are named");
        Ok(Node::ConstantInstantiation {
            name,
            init: Box::new(Node::Lambda(def)),
        })
    }

    /// Parses `fn NAME(params) <eos> BLOCK` starting at the `fn` keyword.
    fn function(&mut self, header_indent: usize) -> Result<Rc<LambdaDef>, ParseError> {
        self.expect(TokenKind::Fn, "'fn'")?;
        let name = self.expect_identifier("a function name")?;
        let (params, varargs) = self.parameter_list()?;
        self.end_statement()?;
        self.lambda_depth += 1;
        let body = self.block(header_indent);
        self.lambda_depth -= 1;
        Ok(Rc::new(LambdaDef {
            name: Some(name),
            params,
            varargs,
            body: body?,
        }))
    }

    /// `(a, b, *rest)` — a trailing `*IDENT` collects remaining arguments.
    fn parameter_list(&mut self) -> Result<(Vec<String>, bool), ParseError> {
        self.expect(TokenKind::LeftParen, "'('")?;
        let mut params = Vec::new();
        let mut varargs = false;
        if !self.check(TokenKind::RightParen) {
            loop {
                if varargs {
                    return Err(ParseError::ParameterAfterVarargs);
                }
                if self.matches(TokenKind::Star) {
                    varargs = true;
                }
                params.push(self.expect_identifier("a parameter name")?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "')'")?;
        Ok((params, varargs))
    }

    /// `class NAME [( SUPER )]` with an indented body of `fn` declarations;
    /// a `class.` prefix marks a class method.
    fn class_statement(&mut self) -> Result<Node, ParseError> {
        let header_indent = self.current().indent;
        self.advance();
        let name = self.expect_identifier("a class name")?;
        let super_name = if self.matches(TokenKind::LeftParen) {
            let super_name = self.expect_identifier("a superclass name")?;
            self.expect(TokenKind::RightParen, "')'")?;
            Some(super_name)
        } else {
            None
        };
        self.end_statement()?;

        let mut methods = Vec::new();
        let mut class_methods = Vec::new();
        while !self.check(TokenKind::Eof) && self.current().indent > header_indent {
            let method_indent = self.current().indent;
            let is_class_method = if self.check(TokenKind::Class) {
                self.advance();
                self.expect(TokenKind::Dot, "'.'")?;
                true
            } else {
                false
            };
            let def = self.function(method_indent)?;
            if is_class_method {
                class_methods.push(def);
            } else {
                methods.push(def);
            }
        }

        Ok(Node::ClassDeclaration {
            name,
            super_name,
            methods,
            class_methods,
        })
    }

    /// Handles `if` and, through recursion, each `elif` arm; a trailing
    /// `else` becomes the innermost else-block.
    fn if_statement(&mut self) -> Result<Node, ParseError> {
        let header_indent = self.current().indent;
        self.advance();
        let condition = self.expression()?;
        self.end_statement()?;
        let then_block = self.block(header_indent)?;

        let else_block = if self.check(TokenKind::Elif) && self.current().indent == header_indent {
            Some(Box::new(self.if_statement()?))
        } else if self.check(TokenKind::Else) && self.current().indent == header_indent {
            self.advance();
            self.end_statement()?;
            Some(Box::new(self.block(header_indent)?))
        } else {
            None
        };

        Ok(Node::If {
            condition: Box::new(condition),
            then_block: Box::new(then_block),
            else_block,
        })
    }

    fn while_statement(&mut self) -> Result<Node, ParseError> {
        let header_indent = self.current().indent;
        self.advance();
        let condition = self.expression()?;
        self.end_statement()?;
        self.loop_depth += 1;
        let body = self.block(header_indent);
        self.loop_depth -= 1;
        Ok(Node::While {
            condition: Box::new(condition),
            body: Box::new(body?),
        })
    }

    /// `for ITER [, COUNTER] in ITERABLE` with an indented body.
    fn for_statement(&mut self) -> Result<Node, ParseError> {
        let header_indent = self.current().indent;
        self.advance();
        let binding = self.expect_identifier("a loop variable name")?;
        let counter = if self.matches(TokenKind::Comma) {
            Some(self.expect_identifier("a counter name")?)
        } else {
            None
        };
        self.expect(TokenKind::In, "'in'")?;
        let iterable = self.expression()?;
        self.end_statement()?;
        self.loop_depth += 1;
        let body = self.block(header_indent);
        self.loop_depth -= 1;
        Ok(Node::For {
            binding,
            counter,
            iterable: Box::new(iterable),
            body: Box::new(body?),
        })
    }

    fn break_statement(&mut self) -> Result<Node, ParseError> {
        if self.loop_depth == 0 {
            return Err(ParseError::BreakOutsideLoop);
        }
        self.advance();
        self.end_statement()?;
        Ok(Node::Break)
    }

    fn continue_statement(&mut self) -> Result<Node, ParseError> {
        if self.loop_depth == 0 {
            return Err(ParseError::ContinueOutsideLoop);
        }
        self.advance();
        self.end_statement()?;
        Ok(Node::Continue)
    }

    fn return_statement(&mut self) -> Result<Node, ParseError> {
        if self.lambda_depth == 0 {
            return Err(ParseError::ReturnOutsideFunction);
        }
        self.advance();
        let expr = if self.check(TokenKind::EndStatement) || self.check(TokenKind::Eof) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.end_statement()?;
        Ok(Node::Return(expr))
    }

    fn print_statement(&mut self) -> Result<Node, ParseError> {
        self.advance();
        let expr = self.expression()?;
        self.end_statement()?;
        Ok(Node::Print(Box::new(expr)))
    }

    /// `super(args)` — whether a superclass initializer actually exists is
    /// checked at evaluation time.
    fn super_statement(&mut self) -> Result<Node, ParseError> {
        self.advance();
        self.expect(TokenKind::LeftParen, "'('")?;
        let args = self.arguments()?;
        self.end_statement()?;
        Ok(Node::SuperStatement(args))
    }

    fn expression_statement(&mut self) -> Result<Node, ParseError> {
        let expr = self.expression()?;
        self.end_statement()?;
        Ok(expr)
    }

    /// Statements on the following lines belong to the block for as long as
    /// they are indented deeper than the header line. There is no closing
    /// keyword.
    fn block(&mut self, header_indent: usize) -> Result<Node, ParseError> {
        let mut nodes = Vec::new();
        while !self.check(TokenKind::Eof) && self.current().indent > header_indent {
            nodes.push(self.statement()?);
        }
        Ok(Node::Block(nodes))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<Node, ParseError> {
        self.parse_precedence(Precedence::Assignment)
    }

    /// The Pratt core: run the prefix rule of the next token, then fold in
    /// infix rules for as long as they bind at least as tightly as `p`.
    fn parse_precedence(&mut self, p: Precedence) -> Result<Node, ParseError> {
        self.advance();
        let lead_kind = self.previous().kind;
        if lead_kind == TokenKind::Error {
            return Err(ParseError::Lexical(self.previous().source.clone()));
        }
        let prefix = rule(lead_kind)
            .prefix
            .ok_or_else(|| ParseError::ExpectedExpression(self.previous().describe()))?;
        let mut node = prefix(self)?;

        while p <= rule(self.current().kind).precedence {
            self.advance();
            let infix = rule(self.previous().kind)
                .infix
                .expect("a token with infix precedence has an infix rule");
            node = infix(self, node)?;
        }
        Ok(node)
    }

    fn literal(&mut self) -> Result<Node, ParseError> {
        let literal = self
            .previous()
            .literal
            .clone()
            .expect("literal tokens carry their value");
        Ok(Node::Literal(literal))
    }

    fn identifier(&mut self) -> Result<Node, ParseError> {
        Ok(Node::Identifier(self.previous().source.clone()))
    }

    fn grouping(&mut self) -> Result<Node, ParseError> {
        let node = self.expression()?;
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(node)
    }

    fn list_literal(&mut self) -> Result<Node, ParseError> {
        let mut items = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                items.push(self.expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightBracket, "']'")?;
        Ok(Node::ListExpression(items))
    }

    /// `|params| expr` on one line, or `|params|` followed by an indented
    /// block body.
    fn lambda(&mut self) -> Result<Node, ParseError> {
        let mut params = Vec::new();
        let mut varargs = false;
        if !self.check(TokenKind::Pipe) {
            loop {
                if varargs {
                    return Err(ParseError::ParameterAfterVarargs);
                }
                if self.matches(TokenKind::Star) {
                    varargs = true;
                }
                params.push(self.expect_identifier("a parameter name")?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::Pipe, "'|'")?;
        let header_indent = self.previous().indent;

        self.lambda_depth += 1;
        let body = if self.check(TokenKind::EndStatement) {
            self.advance();
            self.block(header_indent)
        } else {
            self.expression()
        };
        self.lambda_depth -= 1;

        Ok(Node::Lambda(Rc::new(LambdaDef {
            name: None,
            params,
            varargs,
            body: body?,
        })))
    }

    fn unary(&mut self) -> Result<Node, ParseError> {
        let op = self.previous().kind;
        let operand = self.parse_precedence(Precedence::Unary)?;
        Ok(match op {
            TokenKind::Bang => Node::Not(Box::new(operand)),
            TokenKind::Minus => Node::Negation(Box::new(operand)),
            _ => unreachable!("only '!' and '-' have the unary prefix rule"),
        })
    }

    fn binary(&mut self, lhs: Node) -> Result<Node, ParseError> {
        let op_kind = self.previous().kind;
        let rhs = self.parse_precedence(rule(op_kind).precedence.next())?;
        let op = match op_kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::EqualEqual => BinaryOp::Equal,
            TokenKind::BangEqual => BinaryOp::NotEqual,
            TokenKind::Or => BinaryOp::Or,
            TokenKind::And => BinaryOp::And,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            _ => unreachable!("token has no binary rule"),
        };
        Ok(Node::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn range(&mut self, lhs: Node) -> Result<Node, ParseError> {
        let inclusive = self.previous().kind == TokenKind::DotDotEqual;
        let rhs = self.parse_precedence(rule(self.previous().kind).precedence.next())?;
        Ok(Node::Range {
            lo: Box::new(lhs),
            hi: Box::new(rhs),
            inclusive,
        })
    }

    /// `=` reparses at its own precedence, making assignment
    /// right-associative, then shapes the node by what stood on the left.
    fn assignment(&mut self, lhs: Node) -> Result<Node, ParseError> {
        let rhs = self.parse_precedence(Precedence::Assignment)?;
        match lhs {
            Node::Identifier(name) => Ok(Node::VariableAssignment {
                name,
                rhs: Box::new(rhs),
            }),
            Node::Subscript { list, index } => Ok(Node::SubscriptAssignment {
                list,
                index,
                rhs: Box::new(rhs),
            }),
            Node::MemberReference { receiver, member } => Ok(Node::MemberAssignment {
                receiver,
                member,
                rhs: Box::new(rhs),
            }),
            _ => Err(ParseError::NotAssignable),
        }
    }

    /// After `.` and a name: a following `(` makes this a bound method call,
    /// anything else a plain member reference.
    fn member(&mut self, lhs: Node) -> Result<Node, ParseError> {
        let member = self.expect_identifier("a member name")?;
        if self.matches(TokenKind::LeftParen) {
            let args = self.arguments()?;
            Ok(Node::Invocation {
                callee: Box::new(Node::BoundMethod {
                    receiver: Box::new(lhs),
                    member,
                }),
                args,
            })
        } else {
            Ok(Node::MemberReference {
                receiver: Box::new(lhs),
                member,
            })
        }
    }

    fn invocation(&mut self, callee: Node) -> Result<Node, ParseError> {
        let args = self.arguments()?;
        Ok(Node::Invocation {
            callee: Box::new(callee),
            args,
        })
    }

    fn subscript(&mut self, lhs: Node) -> Result<Node, ParseError> {
        let index = self.expression()?;
        self.expect(TokenKind::RightBracket, "']'")?;
        Ok(Node::Subscript {
            list: Box::new(lhs),
            index: Box::new(index),
        })
    }

    /// Comma-separated expressions up to the closing parenthesis, which is
    /// consumed.
    fn arguments(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "')'")?;
        Ok(args)
    }
}
