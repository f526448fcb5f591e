use super::lexer::TokenKind;
use super::statements::is_assignment_target;
use super::{is_reserved, Parser};
use crate::ast::*;
use crate::errors::ParseError;
use std::rc::Rc;

impl Parser {
    /// Comma-separated expressions.
    pub(super) fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        let first = self.parse_assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat_punct(",") {
            expressions.push(self.parse_assignment()?);
        }
        Ok(Expression::Sequence(expressions))
    }

    pub(super) fn parse_assignment(&mut self) -> Result<Expression, ParseError> {
        if self.at_arrow_function() {
            return self.parse_arrow_function();
        }

        let loc = self.loc();
        let target = self.parse_conditional()?;
        let Some(operator) = self.assignment_operator() else {
            return Ok(target);
        };
        if !is_assignment_target(&target) {
            return Err(ParseError::new(
                "Invalid assignment target",
                loc.line,
                loc.column,
            ));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expression::Assignment(
            operator,
            Box::new(target),
            Box::new(value),
        ))
    }

    fn assignment_operator(&self) -> Option<AssignmentOperator> {
        let TokenKind::Punct(punct) = self.peek().kind else {
            return None;
        };
        let operator = match punct {
            "=" => AssignmentOperator::Assign,
            "+=" => AssignmentOperator::Add,
            "-=" => AssignmentOperator::Subtract,
            "*=" => AssignmentOperator::Multiply,
            "/=" => AssignmentOperator::Divide,
            "%=" => AssignmentOperator::Remainder,
            "**=" => AssignmentOperator::Exponent,
            "<<=" => AssignmentOperator::ShiftLeft,
            ">>=" => AssignmentOperator::ShiftRight,
            ">>>=" => AssignmentOperator::UnsignedShiftRight,
            "&=" => AssignmentOperator::BitAnd,
            "|=" => AssignmentOperator::BitOr,
            "^=" => AssignmentOperator::BitXor,
            _ => return None,
        };
        Some(operator)
    }

    /// `x =>` or a parenthesized list whose closing paren is followed by `=>`.
    fn at_arrow_function(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Name(name) if !is_reserved(name) => self.is_punct_at(1, "=>"),
            TokenKind::Punct("(") => {
                let mut depth = 0usize;
                let mut offset = 0;
                loop {
                    match self.peek_at(offset).kind {
                        TokenKind::Punct("(") => depth += 1,
                        TokenKind::Punct(")") => {
                            depth -= 1;
                            if depth == 0 {
                                return self.is_punct_at(offset + 1, "=>");
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    offset += 1;
                }
            }
            _ => false,
        }
    }

    fn parse_arrow_function(&mut self) -> Result<Expression, ParseError> {
        let loc = self.loc();
        let params = if self.is_punct("(") {
            self.parse_parameters()?
        } else {
            vec![self.expect_identifier()?]
        };
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.parse_function_body()?)
        } else {
            FunctionBody::Expression(Box::new(self.parse_assignment()?))
        };
        Ok(Expression::Function(Rc::new(Function {
            kind: FunctionKind::Arrow,
            id: None,
            params,
            body,
            loc,
        })))
    }

    fn parse_conditional(&mut self) -> Result<Expression, ParseError> {
        let test = self.parse_binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        // The middle operand always accepts `in`.
        let allow_in = std::mem::replace(&mut self.allow_in, true);
        let consequent = self.parse_assignment();
        self.allow_in = allow_in;
        let consequent = consequent?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Expression::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary_operator(&self) -> Option<(BinaryOp, u8)> {
        let op = match &self.peek().kind {
            TokenKind::Punct(punct) => match *punct {
                "??" => (BinaryOp::Logical(LogicalOperator::Nullish), 1),
                "||" => (BinaryOp::Logical(LogicalOperator::Or), 1),
                "&&" => (BinaryOp::Logical(LogicalOperator::And), 2),
                "|" => (BinaryOp::Binary(BinaryOperator::BitOr), 3),
                "^" => (BinaryOp::Binary(BinaryOperator::BitXor), 4),
                "&" => (BinaryOp::Binary(BinaryOperator::BitAnd), 5),
                "==" => (BinaryOp::Binary(BinaryOperator::Equal), 6),
                "!=" => (BinaryOp::Binary(BinaryOperator::NotEqual), 6),
                "===" => (BinaryOp::Binary(BinaryOperator::StrictEqual), 6),
                "!==" => (BinaryOp::Binary(BinaryOperator::StrictNotEqual), 6),
                "<" => (BinaryOp::Binary(BinaryOperator::LessThan), 7),
                "<=" => (BinaryOp::Binary(BinaryOperator::LessThanOrEqual), 7),
                ">" => (BinaryOp::Binary(BinaryOperator::GreaterThan), 7),
                ">=" => (BinaryOp::Binary(BinaryOperator::GreaterThanOrEqual), 7),
                "<<" => (BinaryOp::Binary(BinaryOperator::ShiftLeft), 8),
                ">>" => (BinaryOp::Binary(BinaryOperator::ShiftRight), 8),
                ">>>" => (BinaryOp::Binary(BinaryOperator::UnsignedShiftRight), 8),
                "+" => (BinaryOp::Binary(BinaryOperator::Add), 9),
                "-" => (BinaryOp::Binary(BinaryOperator::Subtract), 9),
                "*" => (BinaryOp::Binary(BinaryOperator::Multiply), 10),
                "/" => (BinaryOp::Binary(BinaryOperator::Divide), 10),
                "%" => (BinaryOp::Binary(BinaryOperator::Remainder), 10),
                "**" => (BinaryOp::Binary(BinaryOperator::Exponent), 11),
                _ => return None,
            },
            TokenKind::Name(name) => match name.as_str() {
                "instanceof" => (BinaryOp::Binary(BinaryOperator::Instanceof), 7),
                "in" if self.allow_in => (BinaryOp::Binary(BinaryOperator::In), 7),
                _ => return None,
            },
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing; `**` is the only right-associative level.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some((op, precedence)) = self.binary_operator() {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let next = if matches!(op, BinaryOp::Binary(BinaryOperator::Exponent)) {
                precedence
            } else {
                precedence + 1
            };
            let right = self.parse_binary(next)?;
            left = match op {
                BinaryOp::Binary(operator) => Expression::binary(operator, left, right),
                BinaryOp::Logical(operator) => {
                    Expression::Logical(operator, Box::new(left), Box::new(right))
                }
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let operator = match &self.peek().kind {
            TokenKind::Punct("!") => Some(UnaryOperator::Not),
            TokenKind::Punct("-") => Some(UnaryOperator::Minus),
            TokenKind::Punct("+") => Some(UnaryOperator::Plus),
            TokenKind::Punct("~") => Some(UnaryOperator::BitNot),
            TokenKind::Name(name) if name == "typeof" => Some(UnaryOperator::Typeof),
            TokenKind::Name(name) if name == "void" => Some(UnaryOperator::Void),
            TokenKind::Name(name) if name == "delete" => Some(UnaryOperator::Delete),
            _ => None,
        };
        if let Some(operator) = operator {
            self.advance();
            let argument = self.parse_unary()?;
            return Ok(Expression::Unary(operator, Box::new(argument)));
        }

        if self.is_punct("++") || self.is_punct("--") {
            let operator = if self.is_punct("++") {
                UpdateOperator::Increment
            } else {
                UpdateOperator::Decrement
            };
            let loc = self.advance().loc;
            let argument = self.parse_unary()?;
            if !is_assignment_target(&argument) {
                return Err(ParseError::new(
                    "Invalid update target",
                    loc.line,
                    loc.column,
                ));
            }
            return Ok(Expression::Update {
                operator,
                prefix: true,
                argument: Box::new(argument),
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let loc = self.loc();
        let expr = self.parse_left_hand_side()?;
        let newline = self.peek().newline_before;
        let operator = if newline {
            None
        } else if self.is_punct("++") {
            Some(UpdateOperator::Increment)
        } else if self.is_punct("--") {
            Some(UpdateOperator::Decrement)
        } else {
            None
        };
        let Some(operator) = operator else {
            return Ok(expr);
        };
        if !is_assignment_target(&expr) {
            return Err(ParseError::new(
                "Invalid update target",
                loc.line,
                loc.column,
            ));
        }
        self.advance();
        Ok(Expression::Update {
            operator,
            prefix: false,
            argument: Box::new(expr),
        })
    }

    /// Member access, calls and `new`.
    fn parse_left_hand_side(&mut self) -> Result<Expression, ParseError> {
        let mut expr = if self.is_keyword("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };

        loop {
            if self.eat_punct(".") {
                let name = self.expect_property_name()?;
                expr = Expression::Member(Box::new(expr), MemberProperty::Static(name));
            } else if self.eat_punct("[") {
                let allow_in = std::mem::replace(&mut self.allow_in, true);
                let property = self.parse_expression();
                self.allow_in = allow_in;
                let property = property?;
                self.expect_punct("]")?;
                expr = Expression::Member(
                    Box::new(expr),
                    MemberProperty::Computed(Box::new(property)),
                );
            } else if self.is_punct("(") {
                let arguments = self.parse_arguments()?;
                expr = Expression::Call(Box::new(expr), arguments);
            } else {
                return Ok(expr);
            }
        }
    }

    /// `new Callee(args)`; the callee binds member accesses but not calls.
    fn parse_new(&mut self) -> Result<Expression, ParseError> {
        self.expect_keyword("new")?;
        let mut callee = if self.is_keyword("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(".") {
                let name = self.expect_property_name()?;
                callee = Expression::Member(Box::new(callee), MemberProperty::Static(name));
            } else if self.eat_punct("[") {
                let property = self.parse_expression()?;
                self.expect_punct("]")?;
                callee = Expression::Member(
                    Box::new(callee),
                    MemberProperty::Computed(Box::new(property)),
                );
            } else {
                break;
            }
        }
        let arguments = if self.is_punct("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expression::New(Box::new(callee), arguments))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.expect_punct("(")?;
        let allow_in = std::mem::replace(&mut self.allow_in, true);
        let arguments = self.parse_argument_list();
        self.allow_in = allow_in;
        arguments
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut arguments = Vec::new();
        while !self.is_punct(")") {
            if self.is_punct("...") {
                return Err(self.unsupported("Spread elements"));
            }
            arguments.push(self.parse_assignment()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(arguments)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expression::number(value))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expression::string(value))
            }
            TokenKind::Name(name) => match name.as_str() {
                "this" => {
                    self.advance();
                    Ok(Expression::This)
                }
                "null" => {
                    self.advance();
                    Ok(Expression::Literal(Literal::Null))
                }
                "true" | "false" => {
                    self.advance();
                    Ok(Expression::Literal(Literal::Boolean(name == "true")))
                }
                "function" => {
                    let function = self.parse_function(FunctionKind::Expression)?;
                    Ok(Expression::Function(Rc::new(function)))
                }
                "class" => Err(self.unsupported("Classes")),
                _ => Ok(Expression::Identifier(self.expect_identifier()?)),
            },
            TokenKind::Punct("(") => {
                self.advance();
                let allow_in = std::mem::replace(&mut self.allow_in, true);
                let expr = self.parse_expression();
                self.allow_in = allow_in;
                let expr = expr?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => self.parse_array_literal(),
            TokenKind::Punct("{") => self.parse_object_literal(),
            TokenKind::Punct("/") | TokenKind::Punct("/=") => {
                Err(self.unsupported("Regular expression literals"))
            }
            _ => Err(self.unexpected("expected an expression")),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expression, ParseError> {
        self.expect_punct("[")?;
        let allow_in = std::mem::replace(&mut self.allow_in, true);
        let elements = self.parse_array_elements();
        self.allow_in = allow_in;
        Ok(Expression::Array(elements?))
    }

    fn parse_array_elements(&mut self) -> Result<Vec<Option<Expression>>, ParseError> {
        let mut elements = Vec::new();
        loop {
            if self.eat_punct("]") {
                return Ok(elements);
            }
            if self.eat_punct(",") {
                elements.push(None);
                continue;
            }
            if self.is_punct("...") {
                return Err(self.unsupported("Spread elements"));
            }
            elements.push(Some(self.parse_assignment()?));
            if !self.is_punct("]") {
                self.expect_punct(",")?;
            }
        }
    }

    fn parse_object_literal(&mut self) -> Result<Expression, ParseError> {
        self.expect_punct("{")?;
        let allow_in = std::mem::replace(&mut self.allow_in, true);
        let properties = self.parse_object_properties();
        self.allow_in = allow_in;
        Ok(Expression::Object(properties?))
    }

    fn parse_object_properties(&mut self) -> Result<Vec<Property>, ParseError> {
        let mut properties = Vec::new();
        while !self.eat_punct("}") {
            properties.push(self.parse_property()?);
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(properties)
    }

    fn parse_property(&mut self) -> Result<Property, ParseError> {
        if self.is_punct("...") {
            return Err(self.unsupported("Spread properties"));
        }
        let token = self.peek().clone();
        let is_accessor = matches!(&token.kind, TokenKind::Name(name) if name == "get" || name == "set")
            && matches!(self.peek_at(1).kind, TokenKind::Name(_) | TokenKind::String(_));
        if is_accessor {
            return Err(self.unsupported("Accessor properties"));
        }

        let key = match token.kind {
            TokenKind::Name(_) => PropertyKey::Identifier(self.expect_property_name()?),
            TokenKind::String(value) => {
                self.advance();
                PropertyKey::String(value)
            }
            TokenKind::Number(value) => {
                self.advance();
                PropertyKey::Number(value)
            }
            TokenKind::Punct("[") => {
                self.advance();
                let key = self.parse_assignment()?;
                self.expect_punct("]")?;
                PropertyKey::Computed(Box::new(key))
            }
            _ => return Err(self.unexpected("expected a property key")),
        };

        if self.eat_punct(":") {
            let value = self.parse_assignment()?;
            return Ok(Property {
                key,
                value,
                shorthand: false,
            });
        }

        if self.is_punct("(") {
            let params = self.parse_parameters()?;
            let body = self.parse_function_body()?;
            let value = Expression::Function(Rc::new(Function {
                kind: FunctionKind::Expression,
                id: None,
                params,
                body: FunctionBody::Block(body),
                loc: token.loc,
            }));
            return Ok(Property {
                key,
                value,
                shorthand: false,
            });
        }

        match key {
            PropertyKey::Identifier(id)
                if !is_reserved(&id.name) && (self.is_punct(",") || self.is_punct("}")) =>
            {
                Ok(Property {
                    key: PropertyKey::Identifier(id.clone()),
                    value: Expression::Identifier(id),
                    shorthand: true,
                })
            }
            _ => Err(self.unexpected("expected `:`")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    Binary(BinaryOperator),
    Logical(LogicalOperator),
}
