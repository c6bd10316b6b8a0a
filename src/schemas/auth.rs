use serde::Serialize;

use crate::schemas::profile::ProfileResponse;

#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) token_type: String,
    pub(crate) user: ProfileResponse,
}
