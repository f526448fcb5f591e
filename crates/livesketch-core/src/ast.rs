//! Owned syntax tree for the sketch dialect.
//!
//! Every node family is a closed sum type, so the transform passes match
//! exhaustively over the node kinds they consume. Function nodes sit behind
//! `Rc` because the interpreter shares them with every closure created from
//! them; passes that rewrite a function body go through `Rc::make_mut`,
//! which never copies while the tree is still being transformed.

use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Source position, 1-based line and 0-based column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub line: u32,
    pub column: u32,
}

impl Loc {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub loc: Loc,
}

impl Identifier {
    /// A synthesized identifier with no source position.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loc: Loc::default(),
        }
    }

    pub fn at(name: impl Into<String>, loc: Loc) -> Self {
        Self {
            name: name.into(),
            loc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub body: Vec<Statement>,
}

impl Block {
    pub fn new(body: Vec<Statement>) -> Self {
        Self { body }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    Variable(VariableDeclaration),
    Function(Rc<Function>),
    Block(Block),
    If(IfStatement),
    For(ForStatement),
    ForIn(ForInStatement),
    While(WhileStatement),
    DoWhile(DoWhileStatement),
    Return(Option<Expression>),
    Break,
    Continue,
    Throw(Expression),
    Try(TryStatement),
    Switch(SwitchStatement),
    Empty,
}

impl Statement {
    pub fn expression(expression: Expression) -> Self {
        Statement::Expression(expression)
    }

    /// Statement kind name, as used in risk-site locations.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Expression(_) => "ExpressionStatement",
            Statement::Variable(_) => "VariableDeclaration",
            Statement::Function(_) => "FunctionDeclaration",
            Statement::Block(_) => "BlockStatement",
            Statement::If(_) => "IfStatement",
            Statement::For(_) => "ForStatement",
            Statement::ForIn(stmt) if stmt.of => "ForOfStatement",
            Statement::ForIn(_) => "ForInStatement",
            Statement::While(_) => "WhileStatement",
            Statement::DoWhile(_) => "DoWhileStatement",
            Statement::Return(_) => "ReturnStatement",
            Statement::Break => "BreakStatement",
            Statement::Continue => "ContinueStatement",
            Statement::Throw(_) => "ThrowStatement",
            Statement::Try(_) => "TryStatement",
            Statement::Switch(_) => "SwitchStatement",
            Statement::Empty => "EmptyStatement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

impl DeclarationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeclarationKind::Var => "var",
            DeclarationKind::Let => "let",
            DeclarationKind::Const => "const",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub kind: DeclarationKind,
    pub declarations: Vec<VariableDeclarator>,
    pub loc: Loc,
}

impl VariableDeclaration {
    pub fn var(declarations: Vec<VariableDeclarator>) -> Self {
        Self {
            kind: DeclarationKind::Var,
            declarations,
            loc: Loc::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclarator {
    pub id: Identifier,
    pub init: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Declaration,
    Expression,
    Arrow,
}

impl FunctionKind {
    pub fn node_type(self) -> &'static str {
        match self {
            FunctionKind::Declaration => "FunctionDeclaration",
            FunctionKind::Expression => "FunctionExpression",
            FunctionKind::Arrow => "ArrowFunctionExpression",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Block),
    /// Concise arrow body, `x => x * 2`.
    Expression(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub kind: FunctionKind,
    pub id: Option<Identifier>,
    pub params: Vec<Identifier>,
    pub body: FunctionBody,
    pub loc: Loc,
}

impl Function {
    /// Turns a concise arrow body into a block that returns the expression.
    pub fn ensure_block_body(&mut self) -> &mut Block {
        if let FunctionBody::Expression(expr) = &mut self.body {
            let expr = std::mem::replace(expr.as_mut(), Expression::Literal(Literal::Null));
            self.body = FunctionBody::Block(Block::new(vec![Statement::Return(Some(expr))]));
        }
        match &mut self.body {
            FunctionBody::Block(block) => block,
            FunctionBody::Expression(_) => unreachable!("body converted above"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub test: Expression,
    pub consequent: Box<Statement>,
    pub alternate: Option<Box<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Declaration(VariableDeclaration),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Box<Statement>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInLeft {
    Declaration(VariableDeclaration),
    Target(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForInStatement {
    pub left: ForInLeft,
    pub right: Expression,
    pub body: Box<Statement>,
    /// `for (x of xs)` rather than `for (x in obj)`.
    pub of: bool,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub test: Expression,
    pub body: Box<Statement>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoWhileStatement {
    pub body: Box<Statement>,
    pub test: Expression,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryStatement {
    pub block: Block,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Identifier>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expression>,
    pub consequent: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Identifier(Identifier),
    String(String),
    Number(f64),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: PropertyKey,
    pub value: Expression,
    /// Written as `{ x }`; printed back that way only while the value is
    /// still the bare identifier.
    pub shorthand: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    /// `object.name`
    Static(Identifier),
    /// `object[expr]`
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

impl UnaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::Not => "!",
            UnaryOperator::BitNot => "~",
            UnaryOperator::Typeof => "typeof",
            UnaryOperator::Void => "void",
            UnaryOperator::Delete => "delete",
        }
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            UnaryOperator::Typeof | UnaryOperator::Void | UnaryOperator::Delete
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

impl UpdateOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateOperator::Increment => "++",
            UpdateOperator::Decrement => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Exponent,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    In,
    Instanceof,
}

impl BinaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Remainder => "%",
            BinaryOperator::Exponent => "**",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::StrictEqual => "===",
            BinaryOperator::StrictNotEqual => "!==",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::ShiftLeft => "<<",
            BinaryOperator::ShiftRight => ">>",
            BinaryOperator::UnsignedShiftRight => ">>>",
            BinaryOperator::In => "in",
            BinaryOperator::Instanceof => "instanceof",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Nullish,
}

impl LogicalOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalOperator::And => "&&",
            LogicalOperator::Or => "||",
            LogicalOperator::Nullish => "??",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Exponent,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    BitAnd,
    BitOr,
    BitXor,
}

impl AssignmentOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentOperator::Assign => "=",
            AssignmentOperator::Add => "+=",
            AssignmentOperator::Subtract => "-=",
            AssignmentOperator::Multiply => "*=",
            AssignmentOperator::Divide => "/=",
            AssignmentOperator::Remainder => "%=",
            AssignmentOperator::Exponent => "**=",
            AssignmentOperator::ShiftLeft => "<<=",
            AssignmentOperator::ShiftRight => ">>=",
            AssignmentOperator::UnsignedShiftRight => ">>>=",
            AssignmentOperator::BitAnd => "&=",
            AssignmentOperator::BitOr => "|=",
            AssignmentOperator::BitXor => "^=",
        }
    }

    /// The binary operator a compound assignment applies, `None` for `=`.
    pub fn binary(self) -> Option<BinaryOperator> {
        match self {
            AssignmentOperator::Assign => None,
            AssignmentOperator::Add => Some(BinaryOperator::Add),
            AssignmentOperator::Subtract => Some(BinaryOperator::Subtract),
            AssignmentOperator::Multiply => Some(BinaryOperator::Multiply),
            AssignmentOperator::Divide => Some(BinaryOperator::Divide),
            AssignmentOperator::Remainder => Some(BinaryOperator::Remainder),
            AssignmentOperator::Exponent => Some(BinaryOperator::Exponent),
            AssignmentOperator::ShiftLeft => Some(BinaryOperator::ShiftLeft),
            AssignmentOperator::ShiftRight => Some(BinaryOperator::ShiftRight),
            AssignmentOperator::UnsignedShiftRight => Some(BinaryOperator::UnsignedShiftRight),
            AssignmentOperator::BitAnd => Some(BinaryOperator::BitAnd),
            AssignmentOperator::BitOr => Some(BinaryOperator::BitOr),
            AssignmentOperator::BitXor => Some(BinaryOperator::BitXor),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(Identifier),
    Literal(Literal),
    /// `None` entries are holes, `[1, , 3]`.
    Array(Vec<Option<Expression>>),
    Object(Vec<Property>),
    Function(Rc<Function>),
    This,
    Unary(UnaryOperator, Box<Expression>),
    Update {
        operator: UpdateOperator,
        prefix: bool,
        argument: Box<Expression>,
    },
    Binary(BinaryOperator, Box<Expression>, Box<Expression>),
    Logical(LogicalOperator, Box<Expression>, Box<Expression>),
    Assignment(AssignmentOperator, Box<Expression>, Box<Expression>),
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    Call(Box<Expression>, Vec<Expression>),
    New(Box<Expression>, Vec<Expression>),
    Member(Box<Expression>, MemberProperty),
    Sequence(Vec<Expression>),
}

// Builders used by the transform passes.
impl Expression {
    pub fn identifier(name: impl Into<String>) -> Self {
        Expression::Identifier(Identifier::new(name))
    }

    pub fn number(value: f64) -> Self {
        Expression::Literal(Literal::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    /// `object.name`
    pub fn member(object: Expression, name: impl Into<String>) -> Self {
        Expression::Member(
            Box::new(object),
            MemberProperty::Static(Identifier::new(name)),
        )
    }

    pub fn call(callee: Expression, arguments: Vec<Expression>) -> Self {
        Expression::Call(Box::new(callee), arguments)
    }

    pub fn assign(target: Expression, value: Expression) -> Self {
        Expression::Assignment(AssignmentOperator::Assign, Box::new(target), Box::new(value))
    }

    pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary(operator, Box::new(left), Box::new(right))
    }

    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            Expression::Identifier(id) => Some(id),
            _ => None,
        }
    }

    /// Matches `handle.name` with a static property and returns `name`.
    pub fn as_handle_member(&self, handle: &str) -> Option<&Identifier> {
        match self {
            Expression::Member(object, MemberProperty::Static(property)) => match object.as_ref() {
                Expression::Identifier(id) if id.name == handle => Some(property),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_block_body_wraps_concise_arrow() {
        let mut function = Function {
            kind: FunctionKind::Arrow,
            id: None,
            params: vec![Identifier::new("x")],
            body: FunctionBody::Expression(Box::new(Expression::identifier("x"))),
            loc: Loc::default(),
        };

        let block = function.ensure_block_body();
        assert_eq!(
            block.body,
            vec![Statement::Return(Some(Expression::identifier("x")))]
        );
    }

    #[test]
    fn test_handle_member_matching() {
        let expr = Expression::member(Expression::identifier("__env__"), "fill");
        assert_eq!(expr.as_handle_member("__env__").map(|id| id.name.as_str()), Some("fill"));
        assert!(expr.as_handle_member("other").is_none());
    }

    #[test]
    fn test_compound_assignment_maps_to_binary() {
        assert_eq!(AssignmentOperator::Add.binary(), Some(BinaryOperator::Add));
        assert_eq!(AssignmentOperator::Assign.binary(), None);
    }
}
