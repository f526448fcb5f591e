//! Source generator: turns a (transformed) tree back into script text.
//!
//! Output is normalized rather than layout-preserving: four-space indent,
//! explicit semicolons, and parentheses only where precedence needs them.

mod expressions;
mod statements;

pub use expressions::format_number;

use crate::ast::{Expression, Function, Program, Statement};

const INDENT: &str = "    ";

pub struct CodeGenerator {
    output: String,
    indent_level: usize,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
        }
    }

    pub fn finish(self) -> String {
        self.output
    }

    pub fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn writeln(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }

    pub fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str(INDENT);
        }
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    pub fn generate_program(&mut self, program: &Program) {
        self.generate_statements(&program.body);
    }

    pub fn generate_statements(&mut self, statements: &[Statement]) {
        for stmt in statements {
            self.generate_statement(stmt);
        }
    }
}

/// Prints a whole program.
pub fn generate(program: &Program) -> String {
    let mut generator = CodeGenerator::new();
    generator.generate_program(program);
    generator.finish()
}

pub fn generate_statements(statements: &[Statement]) -> String {
    let mut generator = CodeGenerator::new();
    generator.generate_statements(statements);
    generator.finish()
}

pub fn generate_expression(expr: &Expression) -> String {
    let mut generator = CodeGenerator::new();
    generator.expression_to_string(expr)
}

/// Source text of a function, as `Function.prototype.toString` reports it.
pub fn function_source(function: &Function) -> String {
    let mut generator = CodeGenerator::new();
    generator.generate_function(function);
    generator.finish()
}
