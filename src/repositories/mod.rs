pub(crate) mod exams;
pub(crate) mod grants;
pub(crate) mod profiles;
pub(crate) mod questions;
pub(crate) mod submissions;
