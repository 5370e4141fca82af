//! Forget the signed-in identity.

use anyhow::Result;

use super::Context;
use crate::config::StoredIdentity;

/// Run the logout command.
///
/// Read cursors stay on disk and apply again at the next sign-in.
pub async fn run(ctx: &Context) -> Result<()> {
    if !StoredIdentity::exists(&ctx.data_dir) {
        println!("Not signed in");
        return Ok(());
    }

    let who = StoredIdentity::load(&ctx.data_dir).await.ok();
    StoredIdentity::remove(&ctx.data_dir).await?;
    match who {
        Some(who) => println!("Signed out {}", who.username),
        None => println!("Signed out"),
    }
    Ok(())
}
