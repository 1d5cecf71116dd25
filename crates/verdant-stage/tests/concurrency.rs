//! Events from several threads on one session

use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use verdant_history::{ChangeType, Checkpoint, CheckpointType};
use verdant_nodey::Lineage;
use verdant_stage::NotebookSession;
use verdant_test_utils::{code, code_with_stdout, loaded_session};

const ROUNDS: usize = 24;

fn spawn_events<F>(session: &Arc<NotebookSession>, event: F) -> thread::JoinHandle<Vec<Checkpoint>>
where
    F: Fn(&NotebookSession, usize) -> Checkpoint + Send + 'static,
{
    let session = Arc::clone(session);
    thread::spawn(move || (1..=ROUNDS).map(|round| event(&session, round)).collect())
}

#[test]
fn concurrent_events_claim_exactly_their_versions() {
    let session = Arc::new(loaded_session(vec![code("a = 0"), code("b = 0")]));

    let edits = spawn_events(&session, |session, round| {
        session.edit_cell(0, code(&format!("a = {round}"))).unwrap()
    });
    let runs = spawn_events(&session, |session, round| {
        session
            .run_cell(1, code_with_stdout(&format!("b = {round}"), &format!("{round}\n")))
            .unwrap()
    });
    let edits = edits.join().unwrap();
    let runs = runs.join().unwrap();

    for (checkpoints, cell) in [(&edits, Lineage::cell_root(0)), (&runs, Lineage::cell_root(1))] {
        for checkpoint in checkpoints {
            assert_eq!(checkpoint.target_cells.len(), 1);
            assert!(checkpoint.touches(cell));
            assert_eq!(checkpoint.target_cells[0].change_type, ChangeType::Changed);
        }
    }
    assert!(runs.iter().all(|run| run.target_cells[0].new_output.len() == 1));
    assert!(edits.iter().all(|edit| edit.checkpoint_type == CheckpointType::Edit));

    let store = session.history().store();
    let ledger = session.history().checkpoints();
    for cell in [Lineage::cell_root(0), Lineage::cell_root(1)] {
        let mut versions = store.get_versions_for(cell);
        assert_eq!(versions.len(), ROUNDS + 1);
        if let Some(outputs) = store.get_output(cell) {
            versions.extend(outputs.versions().iter().cloned());
        }
        for nodey in versions {
            let created = ledger.get(nodey.meta().created).unwrap();
            assert!(created.is_resolved());
            assert!(created.touches(cell), "{} published by {} without a target", nodey.name(), created.id);
        }
    }
    assert_eq!(store.get_output(Lineage::cell_root(1)).unwrap().len(), ROUNDS);

    let ids: BTreeSet<_> = ledger.all_resolved().iter().map(|checkpoint| checkpoint.id).collect();
    assert_eq!(ids.len(), 1 + 2 * ROUNDS);
    assert!(!session.stage().has_pending());
}
