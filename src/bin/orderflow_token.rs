//! orderflow-token: mint a bearer token for the order API
//!
//! Usage: `orderflow-token <user_id> [role]`
//!
//! Signs with the configured `auth.signing_key` and prints the token.

use orderflow::auth::JwtAuth;
use orderflow::config::Config;

const DEFAULT_ROLE: &str = "admin";

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut args = std::env::args().skip(1);
    let Some(user_id) = args.next() else {
        eprintln!("Usage: orderflow-token <user_id> [role]");
        std::process::exit(2);
    };
    let role = args.next().unwrap_or_else(|| DEFAULT_ROLE.to_string());

    let config = Config::load(None)?;
    if config.auth.uses_dev_key() {
        eprintln!("warning: signing with the built-in development key");
    }

    let token = JwtAuth::from_config(&config.auth).issue_token(&user_id, &role)?;
    println!("{}", token);
    Ok(())
}
