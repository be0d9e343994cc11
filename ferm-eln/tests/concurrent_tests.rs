//! Concurrent transitions on the same batch
//!
//! Guard transactions claim the batch row first, so racing requests are serialized
//! by SQLite and the loser sees the winner's effects.

mod helpers;

use ferm_common::Error;
use ferm_eln::BatchStatus;
use helpers::*;
use tokio::task::JoinSet;

#[tokio::test]
async fn test_concurrent_closures_exactly_one_wins() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 1).await;
    add_samples(&nb, batch.id, 8).await;

    let mut join_set = JoinSet::new();
    for _ in 0..2 {
        let notebook = nb.notebook.clone();
        let input = closure_input(batch.id, engineer());
        join_set.spawn(async move { notebook.accept_closure(input).await });
    }

    let mut successes = 0;
    while let Some(result) = join_set.join_next().await {
        match result.expect("Task panicked") {
            Ok(accepted) => {
                assert_eq!(accepted.batch_status, BatchStatus::Complete);
                successes += 1;
            }
            Err(Error::DuplicateRecord { .. }) | Err(Error::StaleWrite { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(nb.closures(batch.id).await.unwrap().len(), 1);
    assert_eq!(nb.batch(batch.id).await.unwrap().status, BatchStatus::Complete);
}

#[tokio::test]
async fn test_concurrent_inoculations_exactly_one_wins() {
    let nb = notebook().await;
    let batch = create_batch(&nb, 2).await;
    calibrate_required(&nb, batch.id).await;

    let mut join_set = JoinSet::new();
    for _ in 0..4 {
        let notebook = nb.notebook.clone();
        let input = inoculation_input(batch.id);
        join_set.spawn(async move { notebook.accept_inoculation(input).await });
    }

    let mut successes = 0;
    while let Some(result) = join_set.join_next().await {
        match result.expect("Task panicked") {
            Ok(_) => successes += 1,
            Err(Error::DuplicateRecord { .. }) | Err(Error::StaleWrite { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(nb.inoculations(batch.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_samples_all_recorded() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 3).await;

    let mut join_set = JoinSet::new();
    for i in 0..10 {
        let notebook = nb.notebook.clone();
        let input = sample_input(batch.id, i + 1);
        join_set.spawn(async move { notebook.accept_sample(input).await });
    }

    while let Some(result) = join_set.join_next().await {
        result.expect("Task panicked").unwrap();
    }

    assert_eq!(nb.samples(batch.id).await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_abort_racing_closure_leaves_one_terminal_state() {
    let nb = notebook().await;
    let batch = running_batch(&nb, 4).await;
    add_samples(&nb, batch.id, 8).await;

    let closer = nb.notebook.clone();
    let closure = closure_input(batch.id, engineer());
    let close = tokio::spawn(async move { closer.accept_closure(closure).await.map(|a| a.batch_status) });

    let aborter = nb.notebook.clone();
    let batch_id = batch.id;
    let abort = tokio::spawn(async move {
        aborter
            .abort_batch(&engineer(), batch_id, "Operator stop")
            .await
            .map(|b| b.status)
    });

    let outcomes = [close.await.unwrap(), abort.await.unwrap()];
    let winners: Vec<BatchStatus> = outcomes.iter().filter_map(|o| o.as_ref().ok().copied()).collect();
    assert_eq!(winners.len(), 1, "outcomes: {:?}", outcomes);

    let final_status = nb.batch(batch.id).await.unwrap().status;
    assert_eq!(final_status, winners[0]);
    for outcome in &outcomes {
        if let Err(e) = outcome {
            assert!(
                matches!(e, Error::InvalidStateTransition { .. } | Error::StaleWrite { .. }),
                "unexpected error: {:?}",
                e
            );
        }
    }
}
