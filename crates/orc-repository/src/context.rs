//! Ambient request context: tenant id, role, and request id threaded
//! explicitly through every port method rather than carried as global
//! mutable state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Contributor,
    Operator,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: String,
    pub role: Role,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(tenant_id: impl Into<String>, role: Role, request_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            role,
            request_id: request_id.into(),
        }
    }
}
