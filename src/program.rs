/// The immutable bundle handed to the interpreter: the AST arena, the
/// resolution tables, the checker's static-type map and auxiliary indices,
/// plus the lookup helpers evaluation needs.
use std::rc::Rc;

use crate::ast::{Ast, BindingId, DeclId, DeclKind, ExprId, FunctionDecl, TupleOf};
use crate::diagnostics::Diagnostic;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::resolver::{resolve_program, Resolution};
use crate::source::SourceRegion;
use crate::typechecker::{run_type_check, TypeTables};
use crate::types::{NominalId, Type};

#[derive(Debug)]
pub struct ExecutableProgram {
    pub ast: Ast,
    pub resolution: Resolution,
    pub tables: TypeTables,
    pub main: DeclId,
}

impl ExecutableProgram {
    pub fn static_type(&self, e: ExprId) -> Option<&Type> {
        self.tables.static_types.get(&e)
    }

    pub fn binding_type(&self, b: BindingId) -> Option<&Type> {
        self.tables.binding_types.get(&b)
    }

    pub fn function(&self, d: DeclId) -> Option<&FunctionDecl> {
        match &self.ast.decl(d).kind {
            DeclKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn nominal(&self, d: DeclId) -> NominalId {
        NominalId::new(d, self.ast.decl(d).name().unwrap_or(""))
    }

    /// Alternative of a choice declaration by name.
    pub fn find_alternative(&self, choice: DeclId, name: &str) -> Option<usize> {
        match &self.ast.decl(choice).kind {
            DeclKind::Choice(c) => c.alternatives.iter().position(|a| a.name == name),
            _ => None,
        }
    }

    pub fn alternative_name(&self, choice: DeclId, index: usize) -> Option<Rc<str>> {
        match &self.ast.decl(choice).kind {
            DeclKind::Choice(c) => c
                .alternatives
                .get(index)
                .map(|a| Rc::from(a.name.as_str())),
            _ => None,
        }
    }

    pub fn alternative_payload(&self, choice: DeclId, index: usize) -> TupleOf<Type> {
        self.tables
            .alternative_payloads
            .get(&(choice, index))
            .cloned()
            .unwrap_or_default()
    }

    /// Labeled tuple of a struct's member types.
    pub fn initializer_parameters(&self, strukt: DeclId) -> TupleOf<Type> {
        let mut params = TupleOf::new();
        if let Some(members) = self.tables.struct_members.get(&strukt) {
            for (name, ty) in members {
                params.push(crate::ast::FieldId::Label(name.clone()), ty.clone());
            }
        }
        params
    }
}

/// Run the front half of the pipeline: lex, parse, resolve, type check.
///
/// Passes are all-or-nothing: any diagnostic from one pass stops the
/// pipeline before the next, and lexer/parser failures are converted into a
/// single diagnostic.
pub fn compile(file: &str, source: &str) -> Result<ExecutableProgram, Vec<Diagnostic>> {
    let tokens = Lexer::new(source, file)
        .tokenize()
        .map_err(|e| vec![Diagnostic::new(e.to_string(), SourceRegion::empty())])?;
    let ast = Parser::new(tokens)
        .parse()
        .map_err(|e| vec![Diagnostic::new(e.to_string(), SourceRegion::empty())])?;

    let (resolution, errors) = resolve_program(&ast);
    if !errors.is_empty() {
        return Err(errors);
    }

    let (tables, errors) = run_type_check(&ast, &resolution);
    if !errors.is_empty() {
        return Err(errors);
    }

    let main = resolution
        .main
        .ok_or_else(|| vec![Diagnostic::new("'main' function not found", SourceRegion::empty())])?;

    Ok(ExecutableProgram {
        ast,
        resolution,
        tables,
        main,
    })
}
