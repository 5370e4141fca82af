//! Send one message.

use anyhow::{Context as _, Result};
use chat_types::Identity;

use super::Context;

/// Run the send command.
pub async fn run(ctx: &Context, peer: &str, text: &str) -> Result<()> {
    let peer = Identity::parse(peer).context("Invalid peer name")?;
    if text.trim().is_empty() {
        anyhow::bail!("Message is empty");
    }

    let session = ctx.open_session().await?;
    let result = async {
        ctx.await_connection(&session).await?;
        session.select(peer.clone()).await?;
        session.send(text).await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;
    session.logout().await;

    result.with_context(|| format!("Could not send to {}", peer))?;
    println!("Sent to {}", peer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{mock_context, signed_in};
    use chat_client::JsonFileStore;
    use chat_core::KeyValueStore;

    #[tokio::test]
    async fn send_through_mock_feed() {
        let (_dir, ctx) = signed_in("alice").await;
        run(&ctx, "bob", "hello").await.unwrap();

        let store = JsonFileStore::open(ctx.config.cursor_path(&ctx.data_dir)).unwrap();
        assert!(store.get("read_cursor/alice/bob").unwrap().is_some());
    }

    #[tokio::test]
    async fn send_refuses_blank_text() {
        let (_dir, ctx) = signed_in("alice").await;
        assert!(run(&ctx, "bob", "  ").await.is_err());
    }

    #[tokio::test]
    async fn send_requires_sign_in() {
        let (_dir, ctx) = mock_context();
        assert!(run(&ctx, "bob", "hello").await.is_err());
    }
}
