//! Process-scoped identity token stamped into outbound requests.

use std::env;
use std::process;
use std::thread;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};

/// Digest bytes kept; 12 bytes encode to 16 Base64 characters.
const TOKEN_BYTES: usize = 12;

static PROCESS_HASH: OnceCell<String> = OnceCell::new();

/// Returns the token for this process, computing it on first use.
///
/// The token distinguishes process instances that share a client id, for
/// example across restarts.
pub fn process_hash() -> &'static str {
    PROCESS_HASH.get_or_init(compute)
}

fn compute() -> String {
    let mut hasher = Sha256::new();
    hasher.update(env!("CARGO_PKG_NAME"));
    hasher.update(process::id().to_string());
    hasher.update(format!("{:?}", thread::current().id()));
    hasher.update(
        time::OffsetDateTime::now_utc()
            .unix_timestamp_nanos()
            .to_string(),
    );
    hasher.update(login_name());

    let digest = hasher.finalize();
    let token: Vec<u8> = digest.iter().take(TOKEN_BYTES).copied().collect();
    STANDARD.encode(token)
}

fn login_name() -> String {
    env::var("USER")
        .or_else(|_| env::var("LOGNAME"))
        .unwrap_or_else(|_| "system".to_owned())
}
