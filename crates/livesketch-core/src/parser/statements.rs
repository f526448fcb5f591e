use super::lexer::TokenKind;
use super::Parser;
use crate::ast::*;
use crate::errors::ParseError;
use std::rc::Rc;

impl Parser {
    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if self.is_punct("{") {
            return Ok(Statement::Block(self.parse_block()?));
        }
        if self.eat_punct(";") {
            return Ok(Statement::Empty);
        }

        let keyword = match &self.peek().kind {
            TokenKind::Name(name) => Some(name.clone()),
            _ => None,
        };
        match keyword.as_deref() {
            Some("var") | Some("let") | Some("const") => {
                let decl = self.parse_variable_declaration()?;
                self.consume_semicolon()?;
                Ok(Statement::Variable(decl))
            }
            Some("function") => {
                let function = self.parse_function(FunctionKind::Declaration)?;
                Ok(Statement::Function(Rc::new(function)))
            }
            Some("if") => self.parse_if_statement(),
            Some("for") => self.parse_for_statement(),
            Some("while") => self.parse_while_statement(),
            Some("do") => self.parse_do_while_statement(),
            Some("return") => self.parse_return_statement(),
            Some("break") | Some("continue") => self.parse_jump_statement(),
            Some("throw") => self.parse_throw_statement(),
            Some("try") => self.parse_try_statement(),
            Some("switch") => self.parse_switch_statement(),
            Some("class") => Err(self.unsupported("Classes")),
            Some("import") | Some("export") => Err(self.unsupported("Modules")),
            Some("with") => Err(self.unsupported("`with` statements")),
            Some(_) if self.is_punct_at(1, ":") => Err(self.unsupported("Labels")),
            _ => {
                let expression = self.parse_expression()?;
                self.consume_semicolon()?;
                Ok(Statement::Expression(expression))
            }
        }
    }

    pub(super) fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("expected `}`"));
            }
            body.push(self.parse_statement()?);
        }
        self.expect_punct("}")?;
        Ok(Block::new(body))
    }

    fn parse_variable_declaration(&mut self) -> Result<VariableDeclaration, ParseError> {
        let loc = self.loc();
        let kind = match &self.advance().kind {
            TokenKind::Name(name) if name == "let" => DeclarationKind::Let,
            TokenKind::Name(name) if name == "const" => DeclarationKind::Const,
            _ => DeclarationKind::Var,
        };

        let mut declarations = Vec::new();
        loop {
            let id = self.expect_identifier()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            declarations.push(VariableDeclarator { id, init });
            if !self.eat_punct(",") {
                break;
            }
        }

        Ok(VariableDeclaration {
            kind,
            declarations,
            loc,
        })
    }

    /// `function [name](params) { body }`; the name is required for declarations.
    pub(super) fn parse_function(&mut self, kind: FunctionKind) -> Result<Function, ParseError> {
        let loc = self.expect_keyword("function")?;
        if self.is_punct("*") {
            return Err(self.unsupported("Generators"));
        }
        let id = if kind == FunctionKind::Declaration || !self.is_punct("(") {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let params = self.parse_parameters()?;
        let body = self.parse_function_body()?;
        Ok(Function {
            kind,
            id,
            params,
            body: FunctionBody::Block(body),
            loc,
        })
    }

    pub(super) fn parse_parameters(&mut self) -> Result<Vec<Identifier>, ParseError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.is_punct(")") {
            if self.is_punct("...") {
                return Err(self.unsupported("Rest parameters"));
            }
            params.push(self.expect_identifier()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    pub(super) fn parse_function_body(&mut self) -> Result<Block, ParseError> {
        // A function body always accepts `in`, even inside a `for` head.
        let allow_in = std::mem::replace(&mut self.allow_in, true);
        let body = self.parse_block();
        self.allow_in = allow_in;
        body
    }

    fn parse_if_statement(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("if")?;
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat_keyword("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If(IfStatement {
            test,
            consequent,
            alternate,
        }))
    }

    fn parse_for_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.expect_keyword("for")?;
        self.expect_punct("(")?;

        let allow_in = std::mem::replace(&mut self.allow_in, false);
        let head = self.parse_for_head();
        self.allow_in = allow_in;
        let init = head?;

        if self.is_keyword("in") || self.is_keyword("of") {
            let of = self.is_keyword("of");
            self.advance();
            let left = match init {
                Some(ForInit::Declaration(decl)) => {
                    if decl.declarations.len() != 1 || decl.declarations[0].init.is_some() {
                        return Err(ParseError::new(
                            "Invalid left-hand side in for-in loop",
                            loc.line,
                            loc.column,
                        ));
                    }
                    ForInLeft::Declaration(decl)
                }
                Some(ForInit::Expression(expr)) if is_assignment_target(&expr) => {
                    ForInLeft::Target(expr)
                }
                _ => {
                    return Err(ParseError::new(
                        "Invalid left-hand side in for-in loop",
                        loc.line,
                        loc.column,
                    ))
                }
            };
            let right = if of {
                self.parse_assignment()?
            } else {
                self.parse_expression()?
            };
            self.expect_punct(")")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Statement::ForIn(ForInStatement {
                left,
                right,
                body,
                of,
                loc,
            }));
        }

        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::For(ForStatement {
            init,
            test,
            update,
            body,
            loc,
        }))
    }

    fn parse_for_head(&mut self) -> Result<Option<ForInit>, ParseError> {
        if self.is_punct(";") {
            return Ok(None);
        }
        if self.is_keyword("var") || self.is_keyword("let") || self.is_keyword("const") {
            return Ok(Some(ForInit::Declaration(
                self.parse_variable_declaration()?,
            )));
        }
        Ok(Some(ForInit::Expression(self.parse_expression()?)))
    }

    fn parse_while_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.expect_keyword("while")?;
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While(WhileStatement { test, body, loc }))
    }

    fn parse_do_while_statement(&mut self) -> Result<Statement, ParseError> {
        let loc = self.expect_keyword("do")?;
        let body = Box::new(self.parse_statement()?);
        self.expect_keyword("while")?;
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        self.eat_punct(";");
        Ok(Statement::DoWhile(DoWhileStatement { body, test, loc }))
    }

    fn parse_return_statement(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("return")?;
        let ends_here = self.is_punct(";")
            || self.is_punct("}")
            || self.at_eof()
            || self.peek().newline_before;
        let argument = if ends_here {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon()?;
        Ok(Statement::Return(argument))
    }

    fn parse_jump_statement(&mut self) -> Result<Statement, ParseError> {
        let is_break = self.is_keyword("break");
        self.advance();
        if matches!(self.peek().kind, TokenKind::Name(_)) && !self.peek().newline_before {
            return Err(self.unsupported("Labels"));
        }
        self.consume_semicolon()?;
        Ok(if is_break {
            Statement::Break
        } else {
            Statement::Continue
        })
    }

    fn parse_throw_statement(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("throw")?;
        if self.peek().newline_before {
            return Err(self.unexpected("expected an expression after `throw`"));
        }
        let argument = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Statement::Throw(argument))
    }

    fn parse_try_statement(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("try")?;
        let block = self.parse_block()?;
        let handler = if self.eat_keyword("catch") {
            let param = if self.eat_punct("(") {
                let param = self.expect_identifier()?;
                self.expect_punct(")")?;
                Some(param)
            } else {
                None
            };
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat_keyword("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.unexpected("expected `catch` or `finally`"));
        }
        Ok(Statement::Try(TryStatement {
            block,
            handler,
            finalizer,
        }))
    }

    fn parse_switch_statement(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword("switch")?;
        self.expect_punct("(")?;
        let discriminant = self.parse_expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;

        let mut cases = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.eat_keyword("case") {
                Some(self.parse_expression()?)
            } else {
                self.expect_keyword("default")?;
                None
            };
            self.expect_punct(":")?;
            let mut consequent = Vec::new();
            while !self.is_keyword("case") && !self.is_keyword("default") && !self.is_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected("expected `}`"));
                }
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, consequent });
        }

        Ok(Statement::Switch(SwitchStatement {
            discriminant,
            cases,
        }))
    }
}

pub(super) fn is_assignment_target(expr: &Expression) -> bool {
    matches!(expr, Expression::Identifier(_) | Expression::Member(_, _))
}
