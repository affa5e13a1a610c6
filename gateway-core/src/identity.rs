//! The caller identity carried from an inbound JWT into outbound gRPC
//! metadata, grounded on `internal/auth/jwt.go`'s `UserInfo`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerIdentity {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

impl CallerIdentity {
    /// Serializes to the compact JSON form carried, base64-encoded, in the
    /// outbound `user` metadata key (`internal/rpc/invoke.go`'s
    /// `userInfo.Marshal()`).
    pub fn to_metadata_value(&self) -> String {
        use base64::Engine as _;
        let json = serde_json::to_vec(self).expect("CallerIdentity always serializes");
        base64::engine::general_purpose::STANDARD.encode(json)
    }
}
