use tokio::sync::broadcast;

/// Which backing collection changed. Signals carry no payload; subscribers
/// are expected to re-fetch whatever they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChangeScope {
    Profiles,
    Exams,
    Grants,
    Submissions,
}

impl ChangeScope {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Exams => "exams",
            Self::Grants => "grants",
            Self::Submissions => "submissions",
        }
    }
}

/// In-process invalidation feed. Every mutation of profiles, exams, grants
/// or submissions publishes its scope here; the session watcher re-evaluates
/// active sessions on each signal. Lagged subscribers lose old signals,
/// which is safe: a re-fetch after the newest signal sees current state.
#[derive(Clone)]
pub(crate) struct ChangeFeed {
    tx: broadcast::Sender<ChangeScope>,
}

impl ChangeFeed {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn publish(&self, scope: ChangeScope) {
        metrics::counter!("change_signals_total", "scope" => scope.as_str()).increment(1);
        // send only fails when nobody is subscribed, which is fine
        let _ = self.tx.send(scope);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChangeScope> {
        self.tx.subscribe()
    }
}
