//! End-to-end notebook event scenarios

use pretty_assertions::assert_eq;
use verdant_history::{ChangeType, CheckpointType, HistoryConfig, SearchKind};
use verdant_nodey::{Lineage, NodeName};
use verdant_stage::StageError;
use verdant_test_utils::{code, code_with_stdout, image_output, loaded_session, markdown, rendered, sample_notebook, session_with};

#[test]
fn edit_rerun_and_delete_of_a_single_cell() {
    let session = loaded_session(vec![code("print(1)")]);
    let history = session.history();
    assert_eq!(rendered(history, NodeName::new(0, 0, 0)), "print(1)");

    let edit = session.edit_cell(0, code("print(2)")).unwrap();
    assert_eq!(edit.checkpoint_type, CheckpointType::Edit);
    assert_eq!(edit.target_cells[0].node, "0.0.1");
    assert_eq!(edit.target_cells[0].change_type, ChangeType::Changed);
    assert_eq!(rendered(history, NodeName::new(0, 0, 1)), "print(2)");

    let versions = history.store().version_count();
    let rerun = session.run_cell(0, code("print(2)")).unwrap();
    assert_eq!(rerun.target_cells[0].change_type, ChangeType::Same);
    assert_eq!(history.store().version_count(), versions);

    let delete = session.delete_cell(0).unwrap();
    assert_eq!(delete.checkpoint_type, CheckpointType::Delete);
    assert_eq!(delete.target_cells[0].node, "0.0.1");
    assert_eq!(history.store().version_count(), versions);
    assert!(session.cells().is_empty());
}

#[test]
fn run_with_new_output_is_changed_then_same() {
    let session = loaded_session(vec![code("print(2)")]);

    let first = session.run_cell(0, code_with_stdout("print(2)", "2\n")).unwrap();
    assert_eq!(first.target_cells[0].change_type, ChangeType::Changed);
    assert_eq!(first.target_cells[0].new_output.len(), 1);

    let second = session.run_cell(0, code_with_stdout("print(2)", "2\n")).unwrap();
    assert_eq!(second.target_cells[0].change_type, ChangeType::Same);
    assert!(second.target_cells[0].new_output.is_empty());

    let outputs = session.history().store().get_output(Lineage::cell_root(0)).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs.latest().unwrap().as_output().unwrap().parent, NodeName::new(0, 0, 0));
}

#[test]
fn prior_versions_chain_through_edits() {
    let session = loaded_session(vec![code("total = 1")]);
    session.edit_cell(0, code("total = 2")).unwrap();
    session.edit_cell(0, code("total = 3")).unwrap();

    let store = session.history().store();
    let prior = store.get_prior_version(&NodeName::new(0, 0, 2)).unwrap();
    assert_eq!(prior.name(), NodeName::new(0, 0, 1));
    assert!(store.get_prior_version(&NodeName::new(0, 0, 0)).is_none());
    assert_eq!(store.get_versions_for(Lineage::cell_root(0)).len(), 3);
}

#[test]
fn search_groups_hits_by_cell() {
    let session = loaded_session(sample_notebook());
    session.edit_cell(2, code("print(area, radius)")).unwrap();

    let history = session.history();
    let hits = history.find_code("print");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].len(), 2);

    assert_eq!(history.find_markdown("exploration").len(), 1);
    assert_eq!(history.search(SearchKind::Output, "12.566").len(), 1);
    assert!(history.find_code("nothing_like_this").is_empty());
}

#[test]
fn structural_events_track_cell_order() {
    let session = loaded_session(vec![code("a = 1"), code("b = 2")]);

    let add = session.add_cell(1, markdown("## middle")).unwrap();
    assert_eq!(add.target_cells[0].node, "2.0.0");
    assert_eq!(
        session.cells(),
        vec![Lineage::cell_root(0), Lineage::cell_root(2), Lineage::cell_root(1)]
    );

    let moved = session.move_cell(2, 0).unwrap();
    assert_eq!(moved.checkpoint_type, CheckpointType::Moved);
    assert_eq!(
        session.cells(),
        vec![Lineage::cell_root(1), Lineage::cell_root(0), Lineage::cell_root(2)]
    );
}

#[test]
fn failed_events_abandon_their_checkpoint() {
    let session = loaded_session(vec![code("x = 1")]);
    let ledger = session.history().checkpoints();
    let before = ledger.all_resolved().len();

    let err = session.edit_cell(4, code("y")).unwrap_err();
    assert!(matches!(err, StageError::IndexOutOfRange { index: 4, len: 1 }));
    let err = session.add_cell(9, code("y")).unwrap_err();
    assert!(matches!(err, StageError::IndexOutOfRange { index: 9, .. }));

    assert_eq!(ledger.all_resolved().len(), before);
    assert!(!session.stage().has_pending());
    assert!(session.edit_cell(0, code("x = 2")).is_ok());
}

#[test]
fn large_outputs_are_kept_offsite() {
    let session = session_with(HistoryConfig::default().with_offsite_threshold(1024));
    session.load(vec![code("show()")], false).unwrap();

    let stage = session.stage();
    let checkpoint = session.history().checkpoints().generate_checkpoint(CheckpointType::Run);
    stage.mark_as_edited(
        Lineage::cell_root(0),
        code("show()").with_outputs(vec![image_output(4096)]),
    );
    let outcome = stage.commit(&checkpoint).unwrap();

    assert_eq!(outcome.offsite.len(), 1);
    assert_eq!(outcome.offsite[0].reference.file_type, "png");
    let (_, name) = outcome.new_outputs[0];
    let output = session.history().store().get(&name).unwrap();
    assert!(output.as_output().unwrap().has_offsite());
}

#[test]
fn checkpoints_are_indexed_by_notebook_version() {
    let session = loaded_session(vec![code("a")]);
    let edit = session.edit_cell(0, code("b")).unwrap();
    let version = edit.notebook.unwrap();

    let events = session.history().checkpoints().get_by_notebook(version);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, edit.id);
}

#[test]
fn events_commit_only_what_they_staged() {
    let session = loaded_session(vec![code("a = 1"), code("print(1)")]);
    let stage = session.stage();
    stage.mark_as_edited(Lineage::cell_root(1), code("print(3)"));

    let edit = session.edit_cell(0, code("a = 2")).unwrap();
    assert_eq!(edit.target_cells.len(), 1);
    assert_eq!(edit.target_cells[0].node, "0.0.1");
    let store = session.history().store();
    assert_eq!(store.get_versions_for(Lineage::cell_root(1)).len(), 1);
    assert!(stage.has_pending());

    let run = session.run_cell(1, code("print(3)")).unwrap();
    assert_eq!(run.target_cells[0].node, "1.0.1");
    assert_eq!(run.target_cells[0].change_type, ChangeType::Changed);
}

#[test]
fn failed_events_keep_flags_staged_directly() {
    let session = loaded_session(vec![code("x = 1")]);
    session
        .stage()
        .mark_as_edited(Lineage::cell_root(0), code("x = 5"));

    assert!(session.add_cell(3, code("y")).is_err());
    assert!(session.stage().has_pending());

    let checkpoint = session.history().checkpoints().generate_checkpoint(CheckpointType::Edit);
    let outcome = session.stage().commit(&checkpoint).unwrap();
    assert_eq!(outcome.changed_cells, vec![NodeName::new(0, 0, 1)]);
    assert_eq!(rendered(session.history(), NodeName::new(0, 0, 1)), "x = 5");
}
