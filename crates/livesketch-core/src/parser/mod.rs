//! Lexer and recursive-descent parser for the sketch dialect.
//!
//! The accepted language is the slice of JavaScript that live drawing
//! scripts are written in. Anything outside it (regular expressions,
//! template literals, classes, destructuring, spread, labels) is rejected
//! with a [`ParseError`] rather than being half-parsed.

mod expressions;
pub mod lexer;
mod statements;

use crate::ast::{Identifier, Loc, Program};
use crate::errors::ParseError;
use lexer::{Lexer, Token, TokenKind};

/// Words that can never be used as binding or reference names.
const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "false", "finally", "for", "function", "if", "import", "in",
    "instanceof", "let", "new", "null", "return", "super", "switch", "this", "throw", "true",
    "try", "typeof", "var", "void", "while", "with", "yield",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Parses a complete script.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Cleared while parsing a `for` head so `in` is not taken as an operator.
    allow_in: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            allow_in: true,
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn loc(&self) -> Loc {
        self.peek().loc
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Punct(p) if p == punct)
    }

    fn is_punct_at(&self, offset: usize, punct: &str) -> bool {
        matches!(self.peek_at(offset).kind, TokenKind::Punct(p) if p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> Result<Loc, ParseError> {
        if self.is_punct(punct) {
            Ok(self.advance().loc)
        } else {
            Err(self.unexpected(&format!("expected `{punct}`")))
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(name) if name == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<Loc, ParseError> {
        if self.is_keyword(keyword) {
            Ok(self.advance().loc)
        } else {
            Err(self.unexpected(&format!("expected `{keyword}`")))
        }
    }

    /// A binding or reference name; reserved words are rejected.
    fn expect_identifier(&mut self) -> Result<Identifier, ParseError> {
        let token = self.peek();
        if let TokenKind::Name(name) = &token.kind {
            if !is_reserved(name) {
                let id = Identifier::at(name.clone(), token.loc);
                self.advance();
                return Ok(id);
            }
        }
        Err(self.unexpected("expected an identifier"))
    }

    /// Any name, including reserved words, as allowed after `.` and in
    /// object literal keys.
    fn expect_property_name(&mut self) -> Result<Identifier, ParseError> {
        let token = self.peek();
        if let TokenKind::Name(name) = &token.kind {
            let id = Identifier::at(name.clone(), token.loc);
            self.advance();
            return Ok(id);
        }
        Err(self.unexpected("expected a property name"))
    }

    /// Semicolon, or an inserted one before `}`, end of input or a line break.
    fn consume_semicolon(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(";") {
            return Ok(());
        }
        if self.is_punct("}") || self.at_eof() || self.peek().newline_before {
            return Ok(());
        }
        Err(self.unexpected("expected `;`"))
    }

    fn unexpected(&self, expectation: &str) -> ParseError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Name(name) => format!("`{name}`"),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::String(s) => format!("string {s:?}"),
            TokenKind::Punct(p) => format!("`{p}`"),
            TokenKind::Eof => "end of input".to_string(),
        };
        ParseError::new(
            format!("Unexpected {found}, {expectation}"),
            token.loc.line,
            token.loc.column,
        )
    }

    fn unsupported(&self, what: &str) -> ParseError {
        let loc = self.loc();
        ParseError::new(format!("{what} are not supported"), loc.line, loc.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn single_statement(source: &str) -> Statement {
        let mut program = parse(source).unwrap();
        assert_eq!(program.body.len(), 1, "expected one statement in {source:?}");
        program.body.remove(0)
    }

    #[test]
    fn test_multi_declarator_var() {
        let Statement::Variable(decl) = single_statement("var x = 5, y = 10, z;") else {
            panic!("expected a declaration");
        };
        let names: Vec<_> = decl.declarations.iter().map(|d| d.id.name.as_str()).collect();
        assert_eq!(names, ["x", "y", "z"]);
        assert!(decl.declarations[2].init.is_none());
    }

    #[test]
    fn test_semicolon_insertion_at_newline() {
        let program = parse("var a = 1\nvar b = 2\nfill(a, b)").unwrap();
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn test_return_newline_restriction() {
        let program = parse("var f = function() { return\n5; };").unwrap();
        let Statement::Variable(decl) = &program.body[0] else {
            panic!("expected a declaration");
        };
        let Some(Expression::Function(function)) = &decl.declarations[0].init else {
            panic!("expected a function");
        };
        let FunctionBody::Block(block) = &function.body else {
            panic!("expected a block body");
        };
        assert_eq!(block.body[0], Statement::Return(None));
    }

    #[test]
    fn test_precedence_and_associativity() {
        let Statement::Expression(expr) = single_statement("a - b - c * d;") else {
            panic!("expected an expression statement");
        };
        let Expression::Binary(BinaryOperator::Subtract, left, right) = expr else {
            panic!("expected subtraction at the root");
        };
        assert!(matches!(*left, Expression::Binary(BinaryOperator::Subtract, _, _)));
        assert!(matches!(*right, Expression::Binary(BinaryOperator::Multiply, _, _)));
    }

    #[test]
    fn test_arrow_functions() {
        let Statement::Expression(Expression::Call(_, args)) =
            single_statement("xs.map((a, b) => a + b);")
        else {
            panic!("expected a call");
        };
        let Expression::Function(function) = &args[0] else {
            panic!("expected an arrow");
        };
        assert_eq!(function.kind, FunctionKind::Arrow);
        assert_eq!(function.params.len(), 2);
        assert!(matches!(function.body, FunctionBody::Expression(_)));
    }

    #[test]
    fn test_for_in_with_declaration() {
        let Statement::ForIn(stmt) = single_statement("for (var k in obj) { println(k); }") else {
            panic!("expected for-in");
        };
        assert!(!stmt.of);
        assert!(matches!(stmt.left, ForInLeft::Declaration(_)));
    }

    #[test]
    fn test_for_head_does_not_treat_in_as_operator() {
        let Statement::For(stmt) = single_statement("for (var i = 0, j = 1; i < 3; i++) {}") else {
            panic!("expected for");
        };
        let Some(ForInit::Declaration(decl)) = &stmt.init else {
            panic!("expected a declaration init");
        };
        assert_eq!(decl.declarations.len(), 2);
    }

    #[test]
    fn test_sparse_array_holes() {
        let Statement::Expression(Expression::Array(elements)) = single_statement("[1, , 3];")
        else {
            panic!("expected an array");
        };
        assert_eq!(elements.len(), 3);
        assert!(elements[1].is_none());
    }

    #[test]
    fn test_object_literal_forms() {
        let Statement::Variable(decl) =
            single_statement("var o = { a: 1, 'b': 2, 3: x, y, m() { return 1; }, [k]: 4 };")
        else {
            panic!("expected a declaration");
        };
        let Some(Expression::Object(props)) = &decl.declarations[0].init else {
            panic!("expected an object");
        };
        assert_eq!(props.len(), 6);
        assert!(props[3].shorthand);
        assert!(matches!(props[4].value, Expression::Function(_)));
        assert!(matches!(props[5].key, PropertyKey::Computed(_)));
    }

    #[test]
    fn test_new_with_member_callee() {
        let Statement::Expression(expr) = single_statement("new a.B(1).go();") else {
            panic!("expected an expression statement");
        };
        let Expression::Call(callee, _) = expr else {
            panic!("expected a call");
        };
        let Expression::Member(object, _) = *callee else {
            panic!("expected member access");
        };
        assert!(matches!(*object, Expression::New(_, _)));
    }

    #[test]
    fn test_reserved_word_as_binding_is_rejected() {
        let err = parse("var new = 1;").unwrap_err();
        assert!(err.message.contains("expected an identifier"));
    }

    #[test]
    fn test_function_location_is_keyword_position() {
        let Statement::Function(function) = single_statement("\n  function f() {}") else {
            panic!("expected a function declaration");
        };
        assert_eq!(function.loc, Loc::new(2, 2));
    }

    #[test]
    fn test_unsupported_syntax_is_reported() {
        assert!(parse("class A {}").is_err());
        assert!(parse("var s = `x`;").is_err());
        assert!(parse("outer: while (true) {}").is_err());
    }
}
