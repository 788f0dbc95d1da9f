use std::env::var;

/// Base URL used when building voter invite links.
pub const DEFAULT_INVITE_BASE: &str = "https://vote.example.com";

/// Invite-link base, overridable through `VEILVOTE_INVITE_BASE`.
pub fn invite_base_url() -> String {
    match var("VEILVOTE_INVITE_BASE") {
        Ok(val) => val,
        Err(_e) => DEFAULT_INVITE_BASE.to_owned(),
    }
}
