//! Lexical scope tracking for the rewrite passes.

use crate::ast::*;
use rustc_hash::FxHashSet;

/// Where a reference resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Declared in an enclosing function frame (index > 0), or a catch parameter.
    Local(usize),
    /// Declared in frame 0.
    Global,
    Unresolved,
}

#[derive(Debug, Default)]
struct Frame {
    names: FxHashSet<String>,
    /// Active catch parameters, innermost last. They shadow without a frame.
    catch_names: Vec<String>,
}

/// Stack of function frames; frame 0 is global and is never popped.
#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.frames.push(Frame {
            names: names.into_iter().map(Into::into).collect(),
            catch_names: Vec::new(),
        });
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn declare(&mut self, name: impl Into<String>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.names.insert(name.into());
        }
    }

    pub fn push_catch(&mut self, name: impl Into<String>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.catch_names.push(name.into());
        }
    }

    pub fn pop_catch(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.catch_names.pop();
        }
    }

    pub fn resolve(&self, name: &str) -> Resolution {
        for (index, frame) in self.frames.iter().enumerate().rev() {
            if frame.catch_names.iter().any(|n| n == name) {
                return Resolution::Local(index);
            }
            if frame.names.contains(name) {
                return if index == 0 {
                    Resolution::Global
                } else {
                    Resolution::Local(index)
                };
            }
        }
        Resolution::Unresolved
    }
}

/// Names a function body (or the program) declares, wherever they sit in
/// its nested blocks, without descending into inner functions.
pub fn hoisted_names(statements: &[Statement]) -> Vec<String> {
    let mut names = Vec::new();
    collect_hoisted(statements, &mut names);
    names
}

fn collect_hoisted(statements: &[Statement], names: &mut Vec<String>) {
    for stmt in statements {
        collect_hoisted_statement(stmt, names);
    }
}

fn collect_declaration(decl: &VariableDeclaration, names: &mut Vec<String>) {
    names.extend(decl.declarations.iter().map(|d| d.id.name.clone()));
}

fn collect_hoisted_statement(stmt: &Statement, names: &mut Vec<String>) {
    match stmt {
        Statement::Variable(decl) => collect_declaration(decl, names),
        Statement::Function(function) => {
            if let Some(id) = &function.id {
                names.push(id.name.clone());
            }
        }
        Statement::Block(block) => collect_hoisted(&block.body, names),
        Statement::If(if_stmt) => {
            collect_hoisted_statement(&if_stmt.consequent, names);
            if let Some(alternate) = &if_stmt.alternate {
                collect_hoisted_statement(alternate, names);
            }
        }
        Statement::For(for_stmt) => {
            if let Some(ForInit::Declaration(decl)) = &for_stmt.init {
                collect_declaration(decl, names);
            }
            collect_hoisted_statement(&for_stmt.body, names);
        }
        Statement::ForIn(for_in) => {
            if let ForInLeft::Declaration(decl) = &for_in.left {
                collect_declaration(decl, names);
            }
            collect_hoisted_statement(&for_in.body, names);
        }
        Statement::While(while_stmt) => collect_hoisted_statement(&while_stmt.body, names),
        Statement::DoWhile(do_while) => collect_hoisted_statement(&do_while.body, names),
        Statement::Try(try_stmt) => {
            collect_hoisted(&try_stmt.block.body, names);
            if let Some(handler) = &try_stmt.handler {
                collect_hoisted(&handler.body.body, names);
            }
            if let Some(finalizer) = &try_stmt.finalizer {
                collect_hoisted(&finalizer.body, names);
            }
        }
        Statement::Switch(switch) => {
            for case in &switch.cases {
                collect_hoisted(&case.consequent, names);
            }
        }
        Statement::Expression(_)
        | Statement::Return(_)
        | Statement::Break
        | Statement::Continue
        | Statement::Throw(_)
        | Statement::Empty => {}
    }
}

/// Names bound when a function's frame opens: parameters, its own name for
/// function expressions, and its hoisted declarations.
pub fn function_frame_names(function: &Function) -> Vec<String> {
    let mut names: Vec<String> = function.params.iter().map(|p| p.name.clone()).collect();
    if function.kind != FunctionKind::Declaration {
        if let Some(id) = &function.id {
            names.push(id.name.clone());
        }
    }
    if let FunctionBody::Block(block) = &function.body {
        names.extend(hoisted_names(&block.body));
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_resolution_order() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x");
        assert_eq!(scopes.resolve("x"), Resolution::Global);

        scopes.push(["x"]);
        assert_eq!(scopes.resolve("x"), Resolution::Local(1));
        assert_eq!(scopes.resolve("y"), Resolution::Unresolved);

        scopes.pop();
        assert_eq!(scopes.resolve("x"), Resolution::Global);
        assert_eq!(scopes.depth(), 1);
    }

    #[test]
    fn test_global_frame_is_never_popped() {
        let mut scopes = ScopeStack::new();
        scopes.pop();
        scopes.pop();
        assert_eq!(scopes.depth(), 1);
    }

    #[test]
    fn test_catch_parameter_shadows_global() {
        let mut scopes = ScopeStack::new();
        scopes.declare("e");
        scopes.push_catch("e");
        assert_eq!(scopes.resolve("e"), Resolution::Local(0));
        scopes.pop_catch();
        assert_eq!(scopes.resolve("e"), Resolution::Global);
    }

    #[test]
    fn test_hoisted_names_skip_inner_functions() {
        let program = parse(
            "var a; if (x) { let b = 1; } for (var i = 0;;) {} function f() { var inner; } try {} catch (e) { const c = 2; }",
        )
        .unwrap();
        assert_eq!(hoisted_names(&program.body), ["a", "b", "i", "f", "c"]);
    }
}
