use shared::domain::{Sequence, Step, StepKind};

use crate::error::EditError;
use crate::sequences::{builtin_sequences, SequenceWorkspace, StepEdit};

fn server_sequence(id: &str, editable: bool, steps: Vec<Step>) -> Sequence {
    Sequence {
        id: id.to_string(),
        name: format!("Server {id}"),
        description: String::new(),
        editable,
        steps,
    }
}

fn delay(name: &str, delay_ms: u64) -> Step {
    Step::Delay {
        name: name.to_string(),
        delay_ms,
    }
}

fn step_names(sequence: &Sequence) -> Vec<String> {
    sequence
        .steps
        .iter()
        .map(|step| step.name().to_string())
        .collect()
}

#[test]
fn resolve_prefers_server_over_builtin_on_id_collision() {
    let mut workspace = SequenceWorkspace::new();
    let shadow = server_sequence("demo_basic_power", true, vec![delay("server wins", 1)]);
    workspace.set_server_sequences(vec![shadow.clone()]);

    let resolved = workspace.resolve("demo_basic_power").expect("resolves");
    assert_eq!(resolved, shadow);

    // The other builtin is still reachable.
    assert!(workspace.resolve("demo_full_functional").is_some());
    assert!(workspace.resolve("no_such_sequence").is_none());
}

#[test]
fn edit_step_copies_on_write_and_leaves_canonical_untouched() {
    let mut workspace = SequenceWorkspace::new();
    let canonical = workspace.resolve("demo_basic_power").expect("builtin");

    workspace
        .edit_step("demo_basic_power", 0, StepEdit::Voltage(3.3))
        .expect("editable builtin");
    assert!(workspace.is_modified("demo_basic_power"));

    let edited = workspace.resolve("demo_basic_power").expect("overlay");
    let Step::PowerSupply { voltage, .. } = &edited.steps[0] else {
        panic!("step kind changed");
    };
    assert!((voltage - 3.3).abs() < f64::EPSILON);

    // Every other step is identical to the canonical one.
    assert_eq!(edited.steps[1..], canonical.steps[1..]);

    // The canonical source itself never moved.
    assert_eq!(
        builtin_sequences()[0].steps,
        canonical.steps,
    );
}

#[test]
fn edit_rejects_field_that_does_not_apply() {
    let mut workspace = SequenceWorkspace::new();
    // Step 1 of demo_basic_power is a measurement; voltage is a power
    // supply field.
    let err = workspace
        .edit_step("demo_basic_power", 1, StepEdit::Voltage(5.0))
        .expect_err("field mismatch");
    assert_eq!(
        err,
        EditError::FieldMismatch {
            field: "voltage",
            step_kind: "measurement"
        }
    );
    assert!(!workspace.is_modified("demo_basic_power"));
}

#[test]
fn name_edit_applies_to_every_step_kind() {
    let mut workspace = SequenceWorkspace::new();
    for index in 0..3 {
        workspace
            .edit_step(
                "demo_full_functional",
                index,
                StepEdit::Name(format!("renamed {index}")),
            )
            .expect("name always applies");
    }
    let edited = workspace.resolve("demo_full_functional").expect("overlay");
    assert_eq!(edited.steps[2].name(), "renamed 2");
}

#[test]
fn add_step_appends() {
    let mut workspace = SequenceWorkspace::new();
    let before = workspace.resolve("demo_basic_power").expect("builtin");
    workspace
        .add_step("demo_basic_power", Step::default_of(StepKind::Delay))
        .expect("editable");
    let after = workspace.resolve("demo_basic_power").expect("overlay");
    assert_eq!(after.steps.len(), before.steps.len() + 1);
    assert_eq!(after.steps.last().map(Step::kind), Some(StepKind::Delay));
}

#[test]
fn delete_last_step_is_rejected_and_sequence_unchanged() {
    let mut workspace = SequenceWorkspace::new();
    workspace.set_server_sequences(vec![server_sequence(
        "single",
        true,
        vec![delay("only step", 10)],
    )]);

    let err = workspace.delete_step("single", 0).expect_err("last step");
    assert_eq!(err, EditError::LastStep);
    assert!(!workspace.is_modified("single"));

    let unchanged = workspace.resolve("single").expect("still resolves");
    assert_eq!(unchanged.steps.len(), 1);
}

#[test]
fn delete_step_shrinks_overlay() {
    let mut workspace = SequenceWorkspace::new();
    workspace
        .delete_step("demo_basic_power", 2)
        .expect("five steps");
    let edited = workspace.resolve("demo_basic_power").expect("overlay");
    assert_eq!(edited.steps.len(), 4);
    assert_eq!(edited.steps[2].name(), "Measure 12V rail");
}

#[test]
fn reorder_relocates_exactly_one_element_for_all_valid_pairs() {
    let steps: Vec<Step> = (0..4u64).map(|n| delay(&format!("s{n}"), n)).collect();
    for from in 0..4 {
        for to in 0..4 {
            let mut workspace = SequenceWorkspace::new();
            workspace.set_server_sequences(vec![server_sequence(
                "perm",
                true,
                steps.clone(),
            )]);
            workspace.reorder("perm", from, to).expect("valid indices");

            let result = workspace.resolve("perm").expect("overlay");
            let names = step_names(&result);
            let moved = format!("s{from}");

            // The moved element sits at the target index.
            assert_eq!(names[to], moved, "from={from} to={to}");

            // Everything else keeps its original relative order.
            let rest: Vec<&String> = names.iter().filter(|name| **name != moved).collect();
            let expected: Vec<String> = (0..4)
                .filter(|n| *n != from)
                .map(|n| format!("s{n}"))
                .collect();
            assert_eq!(rest, expected.iter().collect::<Vec<_>>());
        }
    }
}

#[test]
fn reorder_rejects_out_of_range_indices() {
    let mut workspace = SequenceWorkspace::new();
    let err = workspace
        .reorder("demo_basic_power", 0, 9)
        .expect_err("out of range");
    assert_eq!(err, EditError::InvalidIndex { index: 9, len: 5 });
    assert!(!workspace.is_modified("demo_basic_power"));
}

#[test]
fn reset_restores_canonical_deep_equal() {
    let mut workspace = SequenceWorkspace::new();
    let canonical = workspace.resolve("demo_basic_power").expect("builtin");

    workspace
        .edit_step("demo_basic_power", 0, StepEdit::Voltage(9.9))
        .expect("edit");
    workspace
        .add_step("demo_basic_power", Step::default_of(StepKind::Measurement))
        .expect("add");
    assert!(workspace.is_modified("demo_basic_power"));

    assert!(workspace.reset("demo_basic_power"));
    assert!(!workspace.is_modified("demo_basic_power"));
    assert_eq!(
        workspace.resolve("demo_basic_power").expect("canonical"),
        canonical
    );
    // Nothing left to reset.
    assert!(!workspace.reset("demo_basic_power"));
}

#[test]
fn editability_gate_is_enforced_on_every_mutation() {
    let mut workspace = SequenceWorkspace::new();
    workspace.set_server_sequences(vec![server_sequence(
        "locked",
        false,
        vec![delay("a", 1), delay("b", 2)],
    )]);

    let not_editable = EditError::NotEditable("locked".to_string());
    assert_eq!(
        workspace.edit_step("locked", 0, StepEdit::DelayMs(5)),
        Err(not_editable.clone())
    );
    assert_eq!(
        workspace.add_step("locked", Step::default_of(StepKind::Delay)),
        Err(not_editable.clone())
    );
    assert_eq!(workspace.delete_step("locked", 0), Err(not_editable.clone()));
    assert_eq!(workspace.reorder("locked", 0, 1), Err(not_editable));
    assert!(!workspace.is_modified("locked"));
}

#[test]
fn demo_prefix_overrides_missing_editable_flag() {
    let mut workspace = SequenceWorkspace::new();
    workspace.set_server_sequences(vec![server_sequence(
        "demo_server_provided",
        false,
        vec![delay("a", 1), delay("b", 2)],
    )]);
    workspace
        .edit_step("demo_server_provided", 0, StepEdit::DelayMs(50))
        .expect("demo prefix is editable");
    assert!(workspace.is_modified("demo_server_provided"));
}

#[test]
fn overlays_survive_catalog_refresh() {
    let mut workspace = SequenceWorkspace::new();
    workspace.set_server_sequences(vec![server_sequence(
        "board_check",
        true,
        vec![delay("a", 1), delay("b", 2)],
    )]);
    workspace
        .edit_step("board_check", 0, StepEdit::DelayMs(99))
        .expect("edit");

    workspace.set_server_sequences(vec![server_sequence(
        "board_check",
        true,
        vec![delay("a", 1), delay("b", 2), delay("c", 3)],
    )]);
    assert!(workspace.is_modified("board_check"));
    let resolved = workspace.resolve("board_check").expect("overlay");
    assert_eq!(resolved.steps.len(), 2, "overlay shadows refreshed catalog");
}

#[test]
fn summaries_merge_sources_and_flag_modifications() {
    let mut workspace = SequenceWorkspace::new();
    workspace.set_server_sequences(vec![
        server_sequence("demo_basic_power", true, vec![delay("shadowing", 1)]),
        server_sequence("board_check", false, vec![delay("a", 1)]),
    ]);
    workspace
        .edit_step("demo_basic_power", 0, StepEdit::DelayMs(2))
        .expect("edit");

    let summaries = workspace.summaries();
    // Collision appears once; both builtins and the extra server entry
    // are present.
    assert_eq!(summaries.len(), 3);

    let shadowed = summaries
        .iter()
        .find(|summary| summary.id == "demo_basic_power")
        .expect("present");
    assert!(shadowed.modified);
    assert_eq!(shadowed.steps, 1, "server entry shadows the builtin");

    let locked = summaries
        .iter()
        .find(|summary| summary.id == "board_check")
        .expect("present");
    assert!(!locked.editable);
    assert!(!locked.modified);
}
