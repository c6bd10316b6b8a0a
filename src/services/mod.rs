pub(crate) mod access;
pub(crate) mod guard;
pub(crate) mod scoring;
pub(crate) mod session;
pub(crate) mod storage;
pub(crate) mod store;
pub(crate) mod transcript;
