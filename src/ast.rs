// ABOUTME: Abstract syntax tree node types produced by the parser

use crate::token::Literal;
use std::rc::Rc;

/// A function definition shared between the AST and runtime lambda values.
/// Named functions and methods carry their name; lambda literals do not.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    /// When set, the last parameter collects all remaining arguments into a
    /// list.
    pub varargs: bool,
    pub body: Node,
}

impl LambdaDef {
    /// Name used in arity and type error messages.
    pub fn describe(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Or,
    And,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl BinaryOp {
    /// The operator as written in source, for error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
        }
    }
}

/// One closed variant per language construct. Every variant owns its
/// children, except lambda bodies, which are reference-counted so runtime
/// lambda values can share them with the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Literal),
    Identifier(String),

    Block(Vec<Node>),
    ListExpression(Vec<Node>),
    SuperStatement(Vec<Node>),

    VariableDeclaration(String),
    VariableInstantiation {
        name: String,
        init: Box<Node>,
    },
    ConstantInstantiation {
        name: String,
        init: Box<Node>,
    },

    VariableAssignment {
        name: String,
        rhs: Box<Node>,
    },
    SubscriptAssignment {
        list: Box<Node>,
        index: Box<Node>,
        rhs: Box<Node>,
    },
    MemberAssignment {
        receiver: Box<Node>,
        member: String,
        rhs: Box<Node>,
    },

    If {
        condition: Box<Node>,
        then_block: Box<Node>,
        else_block: Option<Box<Node>>,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
    },
    For {
        binding: String,
        counter: Option<String>,
        iterable: Box<Node>,
        body: Box<Node>,
    },

    Break,
    Continue,
    Return(Option<Box<Node>>),
    Print(Box<Node>),

    Lambda(Rc<LambdaDef>),
    ClassDeclaration {
        name: String,
        super_name: Option<String>,
        methods: Vec<Rc<LambdaDef>>,
        class_methods: Vec<Rc<LambdaDef>>,
    },

    MemberReference {
        receiver: Box<Node>,
        member: String,
    },
    /// A method reference paired with its receiver. Only ever built as the
    /// callee of an `Invocation`.
    BoundMethod {
        receiver: Box<Node>,
        member: String,
    },

    Not(Box<Node>),
    Negation(Box<Node>),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Subscript {
        list: Box<Node>,
        index: Box<Node>,
    },
    Invocation {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Range {
        lo: Box<Node>,
        hi: Box<Node>,
        inclusive: bool,
    },
}
