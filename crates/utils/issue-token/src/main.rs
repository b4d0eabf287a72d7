//! # Issue Token Utility
//!
//! Prints a signed chat token for a username. Accounts live elsewhere; this is
//! for local development against a running server.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --package issue-token --bin issue_token -- alice
//! ```
//!
//! Reads `JWT_SECRET` and `JWT_EXPIRATION_HOURS` (default 24) from the
//! environment or `.env`. Connect with `ws://<host>/api/ws/chat?token=<output>`.

use anyhow::bail;
use lib_auth::encode_jwt;
use lib_utils::envs::{get_env, get_env_parse_or};
use lib_utils::validate_username;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let Some(username) = std::env::args().nth(1) else {
        bail!("usage: issue_token <username>");
    };
    validate_username(&username).map_err(anyhow::Error::msg)?;

    let secret = get_env("JWT_SECRET")?;
    let hours: i64 = get_env_parse_or("JWT_EXPIRATION_HOURS", 24)?;

    let token = encode_jwt(&username, &secret, hours)?;
    println!("{}", token);
    Ok(())
}
