use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::core::events::ChangeScope;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::services::session;

/// Spawns the session watcher: one task reacting to invalidation signals,
/// one ticking the deadline sweep.
///
/// Subscribes before spawning, so a signal published right after this
/// returns is already covered.
pub(crate) fn spawn(state: AppState, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let signals = state.feed().subscribe();
    vec![
        tokio::spawn(invalidation_loop(state.clone(), signals, shutdown.clone())),
        tokio::spawn(sweep_loop(state, shutdown)),
    ]
}

async fn invalidation_loop(
    state: AppState,
    mut signals: broadcast::Receiver<ChangeScope>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let scope = tokio::select! {
            _ = shutdown.changed() => break,
            received = signals.recv() => match received {
                Ok(scope) => Some(scope),
                // Dropped signals are indistinguishable from one signal; the
                // revalidation re-fetches everything either way.
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Invalidation feed lagged");
                    None
                }
                Err(RecvError::Closed) => break,
            },
        };

        match session::revalidate_active(state.store(), state.sessions(), primitive_now_utc())
            .await
        {
            Ok(aborted) if aborted > 0 => {
                tracing::info!(aborted, scope = ?scope, "Revalidation aborted sessions");
            }
            Ok(_) => {}
            // Sessions stay up on store failure; the next signal retries.
            Err(err) => tracing::error!(error = %err, "Failed to revalidate active sessions"),
        }
    }
}

async fn sweep_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(state.settings().exam().sweep_interval_seconds));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let swept = session::sweep_expired(state.sessions(), primitive_now_utc());
                if swept > 0 {
                    tracing::info!(swept, "Swept sessions past their deadline");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::macros::datetime;
    use tokio::sync::watch;

    use crate::core::config::Settings;
    use crate::core::events::ChangeScope;
    use crate::core::redis::RedisHandle;
    use crate::core::state::AppState;
    use crate::db::types::ExamAccess;
    use crate::services::session::{self, SessionState, StartOutcome};
    use crate::services::store::PortalStore;
    use crate::test_support::{
        self, exam_with_grants, paper_with_questions, student_profile, MemoryStore,
    };

    fn build_state(store: Arc<dyn PortalStore>) -> AppState {
        let settings = Settings::load().expect("settings");
        let db = sqlx::PgPool::connect_lazy(&settings.database().database_url()).expect("pool");
        let redis = RedisHandle::new(settings.redis().redis_url());
        AppState::new(settings, db, redis, store, None)
    }

    #[tokio::test]
    async fn block_signal_aborts_the_active_session() {
        let _guard = test_support::env_lock();
        std::env::set_var("SECRET_KEY", "test-secret");

        let memory = Arc::new(
            MemoryStore::new()
                .with_profile(student_profile("stu-1", "9A"))
                .with_exam(
                    exam_with_grants("exam-1", ExamAccess::OpenToAll, &[])
                        .window(datetime!(2025-06-01 08:00), datetime!(2025-06-01 10:00)),
                )
                .with_paper(paper_with_questions("exam-1", &[("q1", "math", "a")])),
        );
        let state = build_state(memory.clone());

        let outcome = session::start(
            state.store(),
            state.sessions(),
            "exam-1",
            "stu-1",
            datetime!(2025-06-01 09:00),
        )
        .await
        .expect("start");
        let StartOutcome::Started(started) = outcome else {
            panic!("expected a started session");
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = super::spawn(state.clone(), shutdown_rx);

        memory.block_profile("stu-1");
        state.feed().publish(ChangeScope::Profiles);

        // Single-threaded test runtime: the watcher only runs while we await.
        let mut live = None;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            live = state.sessions().find("stu-1", &started.id);
            if live.as_ref().map(|session| session.state) == Some(SessionState::Aborted) {
                break;
            }
        }
        assert_eq!(live.expect("session present").state, SessionState::Aborted);

        shutdown_tx.send(true).expect("signal shutdown");
        for handle in handles {
            handle.await.expect("watcher task joins");
        }
    }
}
