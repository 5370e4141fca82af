//! Show sign-in and local state.

use anyhow::Result;
use chat_client::JsonFileStore;
use chat_core::ReadCursorStore;

use super::{format_time, Context};
use crate::config::StoredIdentity;

/// Run the status command.
pub async fn run(ctx: &Context) -> Result<()> {
    println!("=== parlor status ===");
    println!();

    let stored = match StoredIdentity::load(&ctx.data_dir).await {
        Ok(stored) => stored,
        Err(_) => {
            println!("Identity: NOT SIGNED IN");
            println!();
            println!("Run 'parlor login <name>' to sign in.");
            return Ok(());
        }
    };
    let identity = stored.identity()?;

    println!("Identity:");
    println!("  Name:   {}", identity);
    if let Some(email) = &stored.email {
        println!("  Email:  {}", email);
    }
    println!("  Since:  {}", format_time(&stored.signed_in_at));
    println!();

    println!("Server:");
    println!("  History: {}", ctx.config.server.history_url);
    println!("  Feed:    {}", ctx.config.server.feed_url);
    println!("  Retry:   every {} ms", ctx.config.feed.reconnect_delay_ms);
    println!();

    let path = ctx.config.cursor_path(&ctx.data_dir);
    let store = JsonFileStore::open(&path)?;
    let cursors = ReadCursorStore::load_all(store, &identity)?;
    println!("Read cursors ({}):", path.display());
    if cursors.snapshot().is_empty() {
        println!("  none");
    }
    for (peer, at) in cursors.snapshot().iter() {
        println!("  {}  read up to {}", peer, format_time(at));
    }

    Ok(())
}
