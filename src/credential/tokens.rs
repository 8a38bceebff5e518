// src/credential/tokens.rs
use crate::error::{CredentialError, Result};

pub const BOOTSTRAP_USER: &str = "kubelet-bootstrap";
pub const BOOTSTRAP_UID: &str = "10001";
pub const BOOTSTRAP_GROUP: &str = "system:kubelet-bootstrap";

const TOKEN_BYTES: usize = 32;

/// 32 random bytes, hex encoded.
pub fn generate_bootstrap_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    openssl::rand::rand_bytes(&mut bytes)
        .map_err(|e| CredentialError::issuance("generating bootstrap token", e))?;
    Ok(hex::encode(bytes))
}

/// One line of the API server's static token file:
/// `token,user,uid` followed by a quoted group list when there is more than
/// one group.
pub fn auth_token_line(token: &str, user: &str, uid: &str, groups: &[&str]) -> String {
    match groups {
        [] => format!("{},{},{}", token, user, uid),
        [group] => format!("{},{},{},{}", token, user, uid, group),
        _ => format!("{},{},{},\"{}\"", token, user, uid, groups.join(",")),
    }
}

pub fn bootstrap_token_line(token: &str) -> String {
    auth_token_line(token, BOOTSTRAP_USER, BOOTSTRAP_UID, &[BOOTSTRAP_GROUP])
}
