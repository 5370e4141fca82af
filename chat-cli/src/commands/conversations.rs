//! List conversations, newest first.

use anyhow::Result;
use chat_client::SessionView;

use super::{connectivity, summary_line, Context};

/// Run the conversations command.
pub async fn run(ctx: &Context) -> Result<()> {
    let session = ctx.open_session().await?;
    let view = ctx.await_history(&session).await;
    print!("{}", render(&view));
    session.logout().await;
    Ok(())
}

fn render(view: &SessionView) -> String {
    let mut out = format!(
        "{}  [{}]  {} unread\n",
        view.identity,
        connectivity(view),
        view.total_unread
    );
    if view.summaries.is_empty() {
        out.push_str("  no conversations yet\n");
    }
    for summary in &view.summaries {
        out.push_str("  ");
        out.push_str(&summary_line(summary));
        out.push('\n');
    }
    out
}
