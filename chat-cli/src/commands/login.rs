//! Sign in and remember the identity.

use anyhow::{Context as _, Result};
use chat_client::{Authenticator, Credentials, HttpAuthenticator, LocalAuthenticator};

use super::Context;
use crate::config::StoredIdentity;

/// Run the login command.
///
/// With an email address the server's login endpoint is asked first;
/// without one the name is accepted locally.
pub async fn run(ctx: &Context, username: &str, email: Option<&str>) -> Result<()> {
    let mut credentials = Credentials::new(username);
    if let Some(email) = email {
        credentials = credentials.with_email(email);
    }

    let identity = match credentials.email.as_ref() {
        Some(_) if !ctx.mock => {
            let auth = HttpAuthenticator::new(&ctx.config.server.login_url)
                .context("Invalid login url")?;
            auth.authenticate(&credentials).await
        }
        _ => LocalAuthenticator.authenticate(&credentials).await,
    }
    .context("Sign-in failed")?;

    if let Ok(previous) = StoredIdentity::load(&ctx.data_dir).await {
        if previous.username != identity.as_str() {
            println!("Signing out {}", previous.username);
        }
    }

    let email = credentials.email.map(|e| e.trim().to_string());
    StoredIdentity::new(&identity, email)
        .save(&ctx.data_dir)
        .await?;

    println!("Signed in as {}", identity);
    Ok(())
}
