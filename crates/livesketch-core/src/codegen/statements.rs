use super::CodeGenerator;
use crate::ast::*;

impl CodeGenerator {
    pub fn generate_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Expression(expr) => {
                self.write_indent();
                let text = self.expression_to_string(expr);
                // A leading `function` or `{` would be read back as a declaration or block.
                if text.starts_with("function ") || text.starts_with("function(") || text.starts_with('{') {
                    self.write("(");
                    self.write(&text);
                    self.write(")");
                } else {
                    self.write(&text);
                }
                self.writeln(";");
            }
            Statement::Variable(decl) => {
                self.write_indent();
                self.generate_variable_declaration(decl);
                self.writeln(";");
            }
            Statement::Function(function) => {
                self.write_indent();
                self.generate_function(function);
                self.writeln("");
            }
            Statement::Block(block) => {
                self.write_indent();
                self.generate_block(block);
                self.writeln("");
            }
            Statement::If(if_stmt) => {
                self.write_indent();
                self.generate_if_statement(if_stmt);
            }
            Statement::For(for_stmt) => self.generate_for_statement(for_stmt),
            Statement::ForIn(for_in) => self.generate_for_in_statement(for_in),
            Statement::While(while_stmt) => {
                self.write_indent();
                self.write("while (");
                self.generate_expression(&while_stmt.test);
                self.write(")");
                self.finish_clause(&while_stmt.body);
            }
            Statement::DoWhile(do_while) => {
                self.write_indent();
                self.write("do");
                if self.generate_clause(&do_while.body) {
                    self.write(" ");
                } else {
                    self.write_indent();
                }
                self.write("while (");
                self.generate_expression(&do_while.test);
                self.writeln(");");
            }
            Statement::Return(argument) => {
                self.write_indent();
                self.write("return");
                if let Some(argument) = argument {
                    self.write(" ");
                    self.generate_expression(argument);
                }
                self.writeln(";");
            }
            Statement::Break => {
                self.write_indent();
                self.writeln("break;");
            }
            Statement::Continue => {
                self.write_indent();
                self.writeln("continue;");
            }
            Statement::Throw(argument) => {
                self.write_indent();
                self.write("throw ");
                self.generate_expression(argument);
                self.writeln(";");
            }
            Statement::Try(try_stmt) => self.generate_try_statement(try_stmt),
            Statement::Switch(switch) => self.generate_switch_statement(switch),
            Statement::Empty => {
                self.write_indent();
                self.writeln(";");
            }
        }
    }

    /// `{ ... }` starting at the current position, without a trailing newline.
    pub fn generate_block(&mut self, block: &Block) {
        if block.body.is_empty() {
            self.write("{}");
            return;
        }
        self.writeln("{");
        self.indent();
        self.generate_statements(&block.body);
        self.dedent();
        self.write_indent();
        self.write("}");
    }

    /// Writes a loop or branch body. Blocks stay on the header line and
    /// return `true`; other statements go on their own indented line.
    fn generate_clause(&mut self, body: &Statement) -> bool {
        match body {
            Statement::Block(block) => {
                self.write(" ");
                self.generate_block(block);
                true
            }
            other => {
                self.writeln("");
                self.indent();
                self.generate_statement(other);
                self.dedent();
                false
            }
        }
    }

    fn finish_clause(&mut self, body: &Statement) {
        if self.generate_clause(body) {
            self.writeln("");
        }
    }

    pub(super) fn generate_variable_declaration(&mut self, decl: &VariableDeclaration) {
        self.write(decl.kind.as_str());
        self.write(" ");
        for (i, declarator) in decl.declarations.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.write(&declarator.id.name);
            if let Some(init) = &declarator.init {
                self.write(" = ");
                self.generate_expression_at(init, super::expressions::ASSIGNMENT);
            }
        }
    }

    fn generate_if_statement(&mut self, if_stmt: &IfStatement) {
        self.write("if (");
        self.generate_expression(&if_stmt.test);
        self.write(")");
        let inline = self.generate_clause(&if_stmt.consequent);

        let Some(alternate) = &if_stmt.alternate else {
            if inline {
                self.writeln("");
            }
            return;
        };
        if inline {
            self.write(" else");
        } else {
            self.write_indent();
            self.write("else");
        }
        match alternate.as_ref() {
            Statement::If(nested) => {
                self.write(" ");
                self.generate_if_statement(nested);
            }
            other => self.finish_clause(other),
        }
    }

    fn generate_for_statement(&mut self, for_stmt: &ForStatement) {
        self.write_indent();
        self.write("for (");
        match &for_stmt.init {
            Some(ForInit::Declaration(decl)) => self.generate_variable_declaration(decl),
            Some(ForInit::Expression(expr)) => self.generate_expression(expr),
            None => {}
        }
        self.write(";");
        if let Some(test) = &for_stmt.test {
            self.write(" ");
            self.generate_expression(test);
        }
        self.write(";");
        if let Some(update) = &for_stmt.update {
            self.write(" ");
            self.generate_expression(update);
        }
        self.write(")");
        self.finish_clause(&for_stmt.body);
    }

    fn generate_for_in_statement(&mut self, for_in: &ForInStatement) {
        self.write_indent();
        self.write("for (");
        match &for_in.left {
            ForInLeft::Declaration(decl) => self.generate_variable_declaration(decl),
            ForInLeft::Target(target) => {
                self.generate_expression_at(target, super::expressions::CALL)
            }
        }
        self.write(if for_in.of { " of " } else { " in " });
        self.generate_expression(&for_in.right);
        self.write(")");
        self.finish_clause(&for_in.body);
    }

    fn generate_try_statement(&mut self, try_stmt: &TryStatement) {
        self.write_indent();
        self.write("try ");
        self.generate_block(&try_stmt.block);
        if let Some(handler) = &try_stmt.handler {
            self.write(" catch ");
            if let Some(param) = &handler.param {
                self.write("(");
                self.write(&param.name);
                self.write(") ");
            }
            self.generate_block(&handler.body);
        }
        if let Some(finalizer) = &try_stmt.finalizer {
            self.write(" finally ");
            self.generate_block(finalizer);
        }
        self.writeln("");
    }

    fn generate_switch_statement(&mut self, switch: &SwitchStatement) {
        self.write_indent();
        self.write("switch (");
        self.generate_expression(&switch.discriminant);
        self.writeln(") {");
        self.indent();
        for case in &switch.cases {
            self.write_indent();
            match &case.test {
                Some(test) => {
                    self.write("case ");
                    self.generate_expression(test);
                    self.writeln(":");
                }
                None => self.writeln("default:"),
            }
            self.indent();
            self.generate_statements(&case.consequent);
            self.dedent();
        }
        self.dedent();
        self.write_indent();
        self.writeln("}");
    }

    /// `function name(params) { body }`, or `(params) => body` for arrows.
    pub fn generate_function(&mut self, function: &Function) {
        if function.kind == FunctionKind::Arrow {
            self.generate_parameters(&function.params);
            self.write(" => ");
            match &function.body {
                FunctionBody::Block(block) => self.generate_block(block),
                FunctionBody::Expression(expr) => {
                    let text = self.expression_to_string_at(expr, super::expressions::ASSIGNMENT);
                    if text.starts_with('{') {
                        self.write("(");
                        self.write(&text);
                        self.write(")");
                    } else {
                        self.write(&text);
                    }
                }
            }
            return;
        }

        self.write("function ");
        if let Some(id) = &function.id {
            self.write(&id.name);
        }
        self.generate_parameters(&function.params);
        self.write(" ");
        match &function.body {
            FunctionBody::Block(block) => self.generate_block(block),
            FunctionBody::Expression(expr) => {
                self.writeln("{");
                self.indent();
                self.write_indent();
                self.write("return ");
                self.generate_expression(expr);
                self.writeln(";");
                self.dedent();
                self.write_indent();
                self.write("}");
            }
        }
    }

    fn generate_parameters(&mut self, params: &[Identifier]) {
        self.write("(");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.write(&param.name);
        }
        self.write(")");
    }
}
