//! End-to-end structure recovery over small COBOL fixtures.

use cobolt_core::structure::{StructureConfig, StructuredProgram, Tree};
use cobolt_core::common::diagnostics::DiagnosticKind;

fn structured(source: &str) -> StructuredProgram {
    cobolt_core::structure_source(source, "test.cbl", &StructureConfig::default())
        .expect("pipeline succeeds")
}

fn count(trees: &[Tree], pred: &dyn Fn(&Tree) -> bool) -> usize {
    let mut total = 0;
    for tree in trees {
        if pred(tree) {
            total += 1;
        }
        match tree {
            Tree::Seq(children) |
            Tree::Forever { body: children, .. } |
            Tree::While { body: children, .. } |
            Tree::Label { body: children, .. } => total += count(children, pred),
            Tree::If { then_branch, else_branch, .. } => {
                total += count(then_branch, pred);
                total += count(else_branch, pred);
            }
            _ => {}
        }
    }
    total
}

fn collect_leaf_stmts(trees: &[Tree], out: &mut Vec<cobolt_core::cfg::StmtId>) {
    for tree in trees {
        match tree {
            Tree::Leaf { stmts } => out.extend(stmts.iter().copied()),
            Tree::PerformCall { stmt, .. } => out.push(*stmt),
            Tree::Seq(children) |
            Tree::Forever { body: children, .. } |
            Tree::While { body: children, .. } |
            Tree::Label { body: children, .. } => collect_leaf_stmts(children, out),
            Tree::If { then_branch, else_branch, .. } => {
                collect_leaf_stmts(then_branch, out);
                collect_leaf_stmts(else_branch, out);
            }
            _ => {}
        }
    }
}

#[test]
fn test_straight_line_section() {
    let result = structured(
        "procedure division.\n\
         sub section.\n\
         move 'x' to a.\n\
         perform helper.\n\
         exit program.\n\
         helper section.\n\
         move 1 to b.\n",
    );

    let body = &result.sections[0].body;
    assert!(matches!(&body[0], Tree::Leaf { stmts } if stmts.len() == 1));
    assert!(matches!(&body[1], Tree::PerformCall { target, .. } if target == "helper"));
    assert!(matches!(body[2], Tree::Return));
    assert_eq!(count(body, &|t| matches!(t, Tree::Goto(_) | Tree::Label { .. })), 0);
}

#[test]
fn test_goto_to_exit_absorbed_into_early_return() {
    let result = structured(
        "procedure division.\n\
         sub section.\n\
         if a = 'x'\n\
            move 1 to b\n\
            go to sub-exit.\n\
         move 2 to b.\n\
         sub-exit.\n\
         exit.\n",
    );

    let body = &result.sections[0].body;
    let Tree::If { condition, then_branch, else_branch, .. } = &body[0] else {
        panic!("expected if, got {:?}", body[0]);
    };
    assert_eq!(condition.text, "a = 'x'");
    assert!(matches!(then_branch.last(), Some(Tree::Return)));
    assert!(else_branch.is_empty());
    assert!(matches!(body.last(), Some(Tree::Return)));
    assert_eq!(count(body, &|t| matches!(t, Tree::Goto(_) | Tree::Label { .. })), 0);
}

#[test]
fn test_nested_if_with_mixed_exits_and_next_sentence() {
    let result = structured(
        "procedure division.\n\
         sub section.\n\
         if a not = 'x'\n\
            if a = 'y'\n\
               move 0 to b\n\
               go to sub-exit\n\
            else\n\
               next sentence\n\
         else\n\
            move 1 to b\n\
            go to sub-exit.\n\
         move 2 to b.\n\
         sub-exit.\n\
         exit.\n",
    );

    let body = &result.sections[0].body;
    // fully structured: both gotos become early returns, `next sentence`
    // falls through past the sentence end
    assert_eq!(count(body, &|t| matches!(t, Tree::Goto(_) | Tree::Label { .. })), 0);
    assert!(count(body, &|t| matches!(t, Tree::If { .. })) >= 2);
    assert!(count(body, &|t| matches!(t, Tree::Return)) >= 2);

    // move 2 is reached both via `next sentence` and after the outer if
    let mut leaves = Vec::new();
    collect_leaf_stmts(body, &mut leaves);
    assert!(leaves.iter().any(|s| result.stmt(*s).source.text == "move 2 to b"));
}

#[test]
fn test_nested_loops() {
    let result = structured(
        "procedure division.\n\
         nested-loops section.\n\
         outer-start.\n\
         move 0 to b.\n\
         inner-start.\n\
         if b < 3\n\
            add 1 to b\n\
            go to inner-start.\n\
         if a < 10\n\
            add 1 to a\n\
            go to outer-start.\n\
         exit program.\n",
    );

    let body = &result.sections[0].body;
    // two recovered loops, no residual gotos
    let loops = count(body, &|t| matches!(t, Tree::While { .. } | Tree::Forever { .. }));
    assert_eq!(loops, 2);
    assert_eq!(count(body, &|t| matches!(t, Tree::Goto(_) | Tree::Label { .. })), 0);
    // one continue per original back edge
    assert_eq!(count(body, &|t| matches!(t, Tree::Continue(_))), 2);
}

#[test]
fn test_infinite_loop_with_unreachable_tail() {
    let result = structured(
        "procedure division.\n\
         infinite section.\n\
         perform a.\n\
         loop-p.\n\
         perform b.\n\
         go to loop-p.\n\
         perform unreached.\n\
         exit.\n\
         a section.\n\
         move 1 to x.\n\
         b section.\n\
         move 2 to x.\n\
         unreached section.\n\
         move 3 to x.\n",
    );

    let body = &result.sections[0].body;
    assert!(matches!(&body[0], Tree::PerformCall { target, .. } if target == "a"));
    let Tree::Forever { body: loop_body, .. } = &body[1] else {
        panic!("expected forever, got {:?}", body[1]);
    };
    assert!(matches!(&loop_body[0], Tree::PerformCall { target, .. } if target == "b"));
    assert!(matches!(loop_body.last(), Some(Tree::Continue(_))));
    assert_eq!(body.len(), 2, "nothing follows a loop that never exits");

    // the unreachable tail lands in the report, not in the tree
    assert!(result
        .unreachable
        .iter()
        .any(|s| result.stmt(*s).source.text == "perform unreached"));
    assert!(result
        .diagnostics
        .iter()
        .any(|d| matches!(d.kind, DiagnosticKind::UnreachableCode)));
    // the never-performed section is not structured at all
    assert!(result.sections.iter().all(|s| s.name != "unreached"));
}

#[test]
fn test_irreducible_crossed_branches() {
    let result = structured(
        "procedure division.\n\
         tangled section.\n\
         start-p.\n\
         perform clean.\n\
         if x = 1 go to l2.\n\
         go to l1.\n\
         l1.\n\
         move 1 to a.\n\
         go to l2.\n\
         l2.\n\
         move 2 to a.\n\
         go to l1.\n\
         clean section.\n\
         move 9 to z.\n\
         exit program.\n",
    );

    // the tangled section degrades to labeled gotos, with a diagnostic
    let tangled = &result.sections[0].body;
    assert!(count(tangled, &|t| matches!(t, Tree::Label { .. })) >= 2);
    assert!(count(tangled, &|t| matches!(t, Tree::Goto(_))) >= 2);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| matches!(d.kind, DiagnosticKind::IrreducibleControlFlow)));

    // the performed section next to it stays fully structured
    let clean = result.sections.iter().find(|s| s.name == "clean").expect("clean is reachable");
    assert_eq!(count(&clean.body, &|t| matches!(t, Tree::Goto(_) | Tree::Label { .. })), 0);
    assert!(matches!(clean.body.last(), Some(Tree::Return)));
}

#[test]
fn test_leaf_coverage_matches_reachable_statements() {
    let result = structured(
        "procedure division.\n\
         sub section.\n\
         if a = 'x'\n\
            move 1 to b\n\
            go to sub-exit.\n\
         move 2 to b.\n\
         perform helper.\n\
         sub-exit.\n\
         exit.\n\
         helper section.\n\
         move 9 to z.\n\
         display z.\n",
    );

    let mut leaves = Vec::new();
    for section in &result.sections {
        collect_leaf_stmts(&section.body, &mut leaves);
    }

    // every reachable non-transfer statement shows up in the tree at
    // least once (duplication may add more)
    for (idx, stmt) in result.stmts.iter().enumerate() {
        let id = cobolt_core::cfg::StmtId(idx as u32);
        if result.unreachable.contains(&id) || stmt.kind.is_transfer() {
            continue;
        }
        assert!(
            leaves.contains(&id),
            "statement {:?} missing from the tree",
            stmt.source.text
        );
    }
}

#[test]
fn test_determinism_across_runs() {
    let source = "procedure division.\n\
         s section.\n\
         again.\n\
         perform work.\n\
         if a = 0 go to finish.\n\
         go to again.\n\
         finish.\n\
         exit program.\n\
         work section.\n\
         subtract 1 from a.\n";

    let a = structured(source);
    let b = structured(source);
    assert_eq!(
        serde_json::to_string(&a.sections).expect("sections serialize"),
        serde_json::to_string(&b.sections).expect("sections serialize"),
    );
}

#[test]
fn test_unresolved_label_aborts_the_pipeline() {
    let err = cobolt_core::structure_source(
        "procedure division.\ns section.\ngo to nowhere.\n",
        "test.cbl",
        &StructureConfig::default(),
    )
    .expect_err("unresolved target is fatal");
    assert!(matches!(
        err,
        cobolt_core::Error::Cfg(cobolt_core::cfg::Error::UnresolvedLabel { .. })
    ));
}
