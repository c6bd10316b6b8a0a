pub(crate) mod auth;
pub(crate) mod errors;
pub(crate) mod exams;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod pagination;
pub(crate) mod profile;
pub(crate) mod router;
pub(crate) mod sessions;
pub(crate) mod users;
pub(crate) mod validation;
