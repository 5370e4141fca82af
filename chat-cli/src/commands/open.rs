//! Open a conversation, print it and mark it read.

use anyhow::{Context as _, Result};
use chat_types::Identity;

use super::{message_line, Context};

/// Run the open command.
pub async fn run(ctx: &Context, peer: &str) -> Result<()> {
    let peer = Identity::parse(peer).context("Invalid peer name")?;
    let session = ctx.open_session().await?;
    ctx.await_history(&session).await;

    let result = session.select(peer.clone()).await;
    if result.is_ok() {
        let view = session.view();
        println!("--- {} ---", peer);
        if view.visible.is_empty() {
            println!("  no messages yet");
        }
        for message in &view.visible {
            println!("  {}", message_line(message, &view.identity));
        }
    }

    session.logout().await;
    result.with_context(|| format!("Could not open conversation with {}", peer))
}
