//! Hoisting pass
//!
//! Function declarations move to the front of their body; every `var` leaves
//! a value-less placeholder ahead of the remaining instructions while its
//! initializer stays where it was written.

use super::super::types::{DeclKind, Instruction, InstructionKind};

/// Hoist a top-level body and prefix it with the synthetic marker (line 0).
pub(super) fn hoist_program(body: Vec<Instruction>) -> Vec<Instruction> {
    let hoisted = hoist_body(body);

    let functions = hoisted
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::FunctionDeclaration { function } => {
                Some(function.display_name().to_string())
            }
            _ => None,
        })
        .collect();
    let variables = hoisted
        .iter()
        .filter_map(|i| match &i.kind {
            InstructionKind::HoistedVar { name } => Some(name.clone()),
            _ => None,
        })
        .collect();

    let mut out = Vec::with_capacity(hoisted.len() + 1);
    out.push(Instruction::new(
        0,
        InstructionKind::HoistingMarker {
            functions,
            variables,
        },
    ));
    out.extend(hoisted);
    out
}

/// Order: function declarations, hoisted vars (first occurrence wins), rest.
pub(super) fn hoist_body(body: Vec<Instruction>) -> Vec<Instruction> {
    let mut functions = Vec::new();
    let mut vars: Vec<Instruction> = Vec::new();
    let mut rest = Vec::with_capacity(body.len());

    for instruction in body {
        if let Some(name) = var_name(&instruction.kind) {
            let seen = vars.iter().any(|v| {
                matches!(&v.kind, InstructionKind::HoistedVar { name: existing } if existing == name)
            });
            if !seen {
                vars.push(Instruction::new(
                    instruction.line,
                    InstructionKind::HoistedVar {
                        name: name.to_string(),
                    },
                ));
            }
        }

        match instruction.kind {
            InstructionKind::FunctionDeclaration { .. } => functions.push(instruction),
            _ => rest.push(instruction),
        }
    }

    functions.extend(vars);
    functions.extend(rest);
    functions
}

fn var_name(kind: &InstructionKind) -> Option<&str> {
    match kind {
        InstructionKind::VariableDeclaration {
            kind: DeclKind::Var,
            name,
            ..
        }
        | InstructionKind::ObjectConstruction {
            declaration: Some(DeclKind::Var),
            name,
            ..
        } => Some(name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::types::Expr;

    fn var(line: usize, name: &str) -> Instruction {
        Instruction::new(
            line,
            InstructionKind::VariableDeclaration {
                kind: DeclKind::Var,
                name: name.to_string(),
                init: Some(Expr::num(1.0)),
            },
        )
    }

    #[test]
    fn duplicate_vars_hoist_once() {
        let out = hoist_body(vec![var(1, "a"), var(2, "a"), var(3, "b")]);
        let placeholders: Vec<_> = out
            .iter()
            .filter(|i| matches!(i.kind, InstructionKind::HoistedVar { .. }))
            .collect();
        assert_eq!(placeholders.len(), 2);
        // initializers stay in place
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn empty_program_still_has_marker() {
        let out = hoist_program(Vec::new());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].line, 0);
        assert!(matches!(
            &out[0].kind,
            InstructionKind::HoistingMarker { functions, variables }
                if functions.is_empty() && variables.is_empty()
        ));
    }
}
