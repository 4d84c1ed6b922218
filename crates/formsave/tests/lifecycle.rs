use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use formsave::{AutoSaveConfig, AutoSaveError, AutoSaveSession, SaveOutcome, SaveStatus};
use tokio::time;

fn counting_session(config: AutoSaveConfig) -> (AutoSaveSession, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let session = AutoSaveSession::with_config(config, move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    (session, calls)
}

fn slow_session(
    config: AutoSaveConfig,
    latency: Duration,
) -> (AutoSaveSession, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let session = AutoSaveSession::with_config(config, move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            time::sleep(latency).await;
            Ok(())
        }
    });
    (session, calls)
}

fn failing_session(config: AutoSaveConfig) -> (AutoSaveSession, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let session = AutoSaveSession::with_config(config, move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("persist failed".into())
        }
    });
    (session, calls)
}

#[tokio::test(start_paused = true)]
async fn save_now_flushes_a_pending_debounce() {
    let (session, calls) = counting_session(AutoSaveConfig::default());

    session.mark_dirty();
    time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.save_now().await.unwrap(), SaveOutcome::Saved);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The cancelled debounce never fires a second save.
    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn save_now_without_changes_is_a_noop() {
    let (session, calls) = counting_session(AutoSaveConfig::default());

    session.mark_dirty();
    assert_eq!(session.save_now().await.unwrap(), SaveOutcome::Saved);
    assert_eq!(session.save_now().await.unwrap(), SaveOutcome::NothingToSave);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Same on a session that was never edited at all.
    let (clean, clean_calls) = counting_session(AutoSaveConfig::default());
    assert_eq!(clean.save_now().await.unwrap(), SaveOutcome::NothingToSave);
    assert_eq!(clean_calls.load(Ordering::SeqCst), 0);
    assert_eq!(clean.status(), SaveStatus::Pristine);
}

#[tokio::test(start_paused = true)]
async fn only_one_save_runs_at_a_time() {
    let (session, calls) = slow_session(AutoSaveConfig::default(), Duration::from_millis(300));

    session.mark_dirty();
    let (first, second) = tokio::join!(session.save_now(), session.save_now());

    assert_eq!(first.unwrap(), SaveOutcome::Saved);
    assert_eq!(second.unwrap(), SaveOutcome::InFlight);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn midflight_edits_start_a_fresh_unsaved_batch() {
    let (session, _calls) = slow_session(AutoSaveConfig::default(), Duration::from_millis(300));

    session.mark_dirty();
    time::sleep(Duration::from_millis(400)).await;
    assert_eq!(session.ms_since_first_unsaved(), Some(400));

    let (saved, ()) = tokio::join!(session.save_now(), async {
        time::sleep(Duration::from_millis(100)).await;
        session.mark_dirty();
        // Until the save lands, the old batch is still unsaved and keeps
        // the anchor.
        assert_eq!(session.ms_since_first_unsaved(), Some(500));
    });
    assert_eq!(saved.unwrap(), SaveOutcome::Saved);

    // The persisted batch no longer counts: the unsaved batch began with
    // the mid-flight edit at t=500, not the original edit at t=0.
    assert!(session.is_dirty());
    assert_eq!(session.ms_since_first_unsaved(), Some(200));

    // The mid-flight edit's timer fires at t=2000 and saves the new batch.
    time::sleep(Duration::from_millis(1650)).await;
    assert_eq!(session.status(), SaveStatus::Saved);
    assert_eq!(session.ms_since_first_unsaved(), None);
}

#[tokio::test(start_paused = true)]
async fn saved_indicator_decays_to_pristine() {
    let (session, _calls) = counting_session(AutoSaveConfig::default());

    session.mark_dirty();
    session.save_now().await.unwrap();
    assert_eq!(session.status(), SaveStatus::Saved);

    time::sleep(Duration::from_millis(2999)).await;
    assert_eq!(session.status(), SaveStatus::Saved);

    time::sleep(Duration::from_millis(2)).await;
    assert_eq!(session.status(), SaveStatus::Pristine);
    assert!(!session.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn a_new_edit_suppresses_the_indicator_decay() {
    // Large debounce so no automatic save interferes.
    let config = AutoSaveConfig::default().with_debounce_ms(10_000);
    let (session, _calls) = counting_session(config);

    session.mark_dirty();
    session.save_now().await.unwrap();

    time::sleep(Duration::from_millis(1000)).await;
    session.mark_dirty();

    // Past the original decay deadline; the edit must win.
    time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(session.status(), SaveStatus::Pending);
    assert!(session.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn a_second_save_restarts_the_indicator_window() {
    let config = AutoSaveConfig::default().with_debounce_ms(10_000);
    let (session, _calls) = counting_session(config);

    session.mark_dirty();
    session.save_now().await.unwrap();

    time::sleep(Duration::from_millis(1000)).await;
    session.mark_dirty();
    session.save_now().await.unwrap();

    // t=3500: past the first save's decay deadline, inside the second's.
    time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(session.status(), SaveStatus::Saved);

    time::sleep(Duration::from_millis(501)).await;
    assert_eq!(session.status(), SaveStatus::Pristine);
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_a_pending_debounce() {
    let (session, calls) = counting_session(AutoSaveConfig::default());

    session.mark_dirty();
    time::sleep(Duration::from_millis(1000)).await;
    session.dispose();

    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // No status movement after teardown either.
    assert_eq!(session.status(), SaveStatus::Pending);

    // Disposed sessions ignore edits and refuse manual saves.
    session.mark_dirty();
    let err = session.save_now().await.unwrap_err();
    assert!(matches!(err, AutoSaveError::Disposed));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn dispose_abandons_an_in_flight_retry_loop() {
    let (session, calls) = failing_session(AutoSaveConfig::default());

    session.mark_dirty();
    let (result, ()) = tokio::join!(session.save_now(), async {
        // Attempts run at t=0 and t=1000; tear down inside the second
        // backoff, before the t=3000 attempt.
        time::sleep(Duration::from_millis(1200)).await;
        session.dispose();
    });

    assert!(matches!(result.unwrap_err(), AutoSaveError::Disposed));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_session_cancels_timers() {
    let (session, calls) = counting_session(AutoSaveConfig::default());

    session.mark_dirty();
    drop(session);

    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn status_transitions_reach_subscribers_in_order() {
    let (session, _calls) = slow_session(AutoSaveConfig::default(), Duration::from_millis(10));

    let mut status_rx = session.subscribe();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let collector = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            sink.lock().unwrap().push(*status_rx.borrow_and_update());
        }
    });

    session.mark_dirty();
    tokio::task::yield_now().await;
    session.save_now().await.unwrap();
    tokio::task::yield_now().await;
    time::sleep(Duration::from_millis(3001)).await;
    drop(session);

    collector.await.unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            SaveStatus::Pending,
            SaveStatus::Saving,
            SaveStatus::Saved,
            SaveStatus::Pristine,
        ]
    );
}
