//! Declaration collection for scope instantiation.
//!
//! The compiler materializes one binding group per lexical scope;
//! these walkers gather the names: `var` declarations hoist through
//! blocks up to the function boundary, lexical declarations and
//! function declarations belong to the block they appear in.

use crate::ast::*;

/// Names bound by a pattern, in source order.
pub fn pattern_names(pattern: &Pattern, out: &mut Vec<String>) {
    match pattern {
        Pattern::Ident(name) => out.push(name.clone()),
        Pattern::Array { elements, rest } => {
            for el in elements.iter().flatten() {
                pattern_names(&el.pattern, out);
            }
            if let Some(r) = rest {
                pattern_names(r, out);
            }
        }
        Pattern::Object { props, rest } => {
            for p in props {
                pattern_names(&p.value, out);
            }
            if let Some(r) = rest {
                pattern_names(r, out);
            }
        }
    }
}

/// `var` names declared anywhere inside `stmts`, stopping at nested
/// function boundaries.
pub fn hoisted_var_names(stmts: &[Stmt]) -> Vec<String> {
    let mut out = Vec::new();
    for stmt in stmts {
        collect_vars(stmt, &mut out);
    }
    out.dedup();
    out
}

fn collect_vars(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::VarDecl {
            kind: DeclKind::Var,
            decls,
            ..
        } => {
            for d in decls {
                pattern_names(&d.pattern, out);
            }
        }
        Stmt::Block(body) => {
            for s in body {
                collect_vars(s, out);
            }
        }
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            collect_vars(consequent, out);
            if let Some(a) = alternate {
                collect_vars(a, out);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Labeled { body, .. } => {
            collect_vars(body, out);
        }
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::VarDecl {
                kind: DeclKind::Var,
                decls,
            }) = init
            {
                for d in decls {
                    pattern_names(&d.pattern, out);
                }
            }
            collect_vars(body, out);
        }
        Stmt::ForIn { left, body, .. } | Stmt::ForOf { left, body, .. } => {
            if let ForTarget::Decl {
                kind: DeclKind::Var,
                pattern,
            } = left
            {
                pattern_names(pattern, out);
            }
            collect_vars(body, out);
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
        } => {
            for s in block {
                collect_vars(s, out);
            }
            if let Some(h) = handler {
                for s in &h.body {
                    collect_vars(s, out);
                }
            }
            if let Some(f) = finalizer {
                for s in f {
                    collect_vars(s, out);
                }
            }
        }
        Stmt::Switch { cases, .. } => {
            for c in cases {
                for s in &c.body {
                    collect_vars(s, out);
                }
            }
        }
        Stmt::ExportDecl(inner) => collect_vars(inner, out),
        _ => {}
    }
}

/// Lexical (`let`/`const`/`class`) names declared directly in
/// `stmts`, paired with their const-ness.
pub fn lexical_decl_names(stmts: &[Stmt]) -> Vec<(String, bool)> {
    let mut out = Vec::new();
    for stmt in stmts {
        lexical_of(stmt, &mut out);
    }
    out
}

fn lexical_of(stmt: &Stmt, out: &mut Vec<(String, bool)>) {
    match stmt {
        Stmt::VarDecl {
            kind: kind @ (DeclKind::Let | DeclKind::Const),
            decls,
            ..
        } => {
            let mut names = Vec::new();
            for d in decls {
                pattern_names(&d.pattern, &mut names);
            }
            let is_const = *kind == DeclKind::Const;
            out.extend(names.into_iter().map(|n| (n, is_const)));
        }
        Stmt::ClassDecl { name, .. } => out.push((name.clone(), false)),
        Stmt::ExportDecl(inner) => lexical_of(inner, out),
        _ => {}
    }
}

/// Function declarations directly in `stmts`.
pub fn function_decls(stmts: &[Stmt]) -> Vec<(&String, &FunctionExpr)> {
    let mut out = Vec::new();
    for stmt in stmts {
        match stmt {
            Stmt::FunctionDecl { name, func } => out.push((name, func)),
            Stmt::ExportDecl(inner) => {
                if let Stmt::FunctionDecl { name, func } = inner.as_ref() {
                    out.push((name, func));
                }
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;

    #[test]
    fn test_var_hoisting_through_blocks() {
        let p = parse_script("var a; { var b; if (x) { var c; } } function f() { var hidden; }")
            .unwrap();
        let vars = hoisted_var_names(&p.body);
        assert_eq!(vars, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_lexical_only_at_this_level() {
        let p = parse_script("let a; { let inner; } const b = 1; class C {}").unwrap();
        let lex = lexical_decl_names(&p.body);
        assert_eq!(
            lex,
            vec![
                ("a".to_string(), false),
                ("b".to_string(), true),
                ("C".to_string(), false)
            ]
        );
    }

    #[test]
    fn test_pattern_names_nested() {
        let p = parse_script("let {a, b: [c, d = 1], ...r} = x;").unwrap();
        let lex = lexical_decl_names(&p.body);
        let names: Vec<&str> = lex.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "d", "r"]);
    }

    #[test]
    fn test_for_var_hoists() {
        let p = parse_script("for (var i = 0; i < 3; i++) {} for (var k in o) {}").unwrap();
        assert_eq!(hoisted_var_names(&p.body), vec!["i", "k"]);
    }
}
