use super::{Check, CheckOutcome};
use crate::engine::model::Response;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Passes iff the SHA-1 digest of the raw body equals `sha1_hex`
/// (case-insensitive hex comparison).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub sha1_hex: String,
}

impl Check for Identity {
    fn execute(&self, response: &Response) -> CheckOutcome {
        let digest = Sha1::digest(&response.body);
        let actual = hex_encode(&digest);
        if actual.eq_ignore_ascii_case(&self.sha1_hex) {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Fail(format!(
                "expected sha1 '{}', got '{actual}'",
                self.sha1_hex
            ))
        }
    }

    fn name(&self) -> &'static str {
        "Identity"
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
