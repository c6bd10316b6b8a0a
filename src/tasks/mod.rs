pub(crate) mod watcher;
