//! Follow the conversation list live.

use std::future::Future;

use anyhow::{Context as _, Result};
use chat_client::{Session, SessionView};
use chat_types::Identity;

use super::{connectivity, summary_line, Context};

/// Run the watch command until Ctrl-C.
///
/// With a peer, that conversation is opened first.
pub async fn run(ctx: &Context, peer: Option<&str>) -> Result<()> {
    let peer = peer
        .map(Identity::parse)
        .transpose()
        .context("Invalid peer name")?;
    let session = ctx.open_session().await?;

    if let Some(peer) = peer {
        if let Err(e) = session.select(peer.clone()).await {
            session.logout().await;
            return Err(e).with_context(|| format!("Could not open conversation with {}", peer));
        }
    }

    println!("Watching as {} (Ctrl-C to stop)", session.identity());
    let stop = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    follow(&session, stop, |line| println!("{}", line)).await;

    session.logout().await;
    Ok(())
}

/// Emit a line for every connectivity change and every conversation that
/// gained a message, until `stop` completes or the session closes.
async fn follow(session: &Session, stop: impl Future<Output = ()>, mut emit: impl FnMut(String)) {
    let mut views = session.subscribe();
    let mut previous: Option<SessionView> = None;
    tokio::pin!(stop);

    loop {
        let current = views.borrow_and_update().clone();
        for line in changes(previous.as_ref(), &current) {
            emit(line);
        }
        previous = Some(current);

        tokio::select! {
            _ = &mut stop => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

fn changes(previous: Option<&SessionView>, current: &SessionView) -> Vec<String> {
    let mut lines = Vec::new();
    if previous.map_or(true, |p| p.connected != current.connected) {
        lines.push(format!("[{}]", connectivity(current)));
    }
    for summary in &current.summaries {
        let before = previous.and_then(|p| p.summaries.iter().find(|s| s.peer == summary.peer));
        let moved = before.map_or(true, |b| {
            b.last_time != summary.last_time || b.last_message != summary.last_message
        });
        if moved {
            lines.push(summary_line(summary));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::signed_in;
    use chat_client::HistoryStatus;
    use chat_core::ConversationSummary;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn view(connected: bool, rows: &[(&str, &str, u32)]) -> SessionView {
        SessionView {
            identity: Identity::parse("alice").unwrap(),
            connected,
            history: HistoryStatus::Loaded,
            summaries: rows
                .iter()
                .map(|(peer, text, minute)| ConversationSummary {
                    peer: Identity::parse(peer).unwrap(),
                    last_message: text.to_string(),
                    last_time: Utc.with_ymd_and_hms(2024, 5, 1, 10, *minute, 0).unwrap(),
                    unread_count: 1,
                })
                .collect(),
            active: None,
            visible: vec![],
            total_unread: rows.len(),
        }
    }

    #[test]
    fn first_view_prints_everything() {
        let lines = changes(None, &view(false, &[("bob", "hi", 0)]));
        assert_eq!(lines, vec!["[Connecting…]", "2024-05-01 10:00  bob (1 unread)  hi"]);
    }

    #[test]
    fn only_moved_conversations_are_printed() {
        let before = view(true, &[("bob", "hi", 0), ("carol", "yo", 1)]);
        let after = view(true, &[("bob", "again", 2), ("carol", "yo", 1)]);
        assert_eq!(
            changes(Some(&before), &after),
            vec!["2024-05-01 10:02  bob (1 unread)  again"]
        );
    }

    #[test]
    fn connectivity_change_is_printed() {
        let before = view(true, &[]);
        let after = view(false, &[]);
        assert_eq!(changes(Some(&before), &after), vec!["[Connecting…]"]);
        assert!(changes(Some(&after), &after).is_empty());
    }

    #[tokio::test]
    async fn follow_reports_connection() {
        let (_dir, ctx) = signed_in("alice").await;
        let session = ctx.open_session().await.unwrap();

        let mut lines = Vec::new();
        let stop = tokio::time::sleep(Duration::from_millis(200));
        follow(&session, stop, |line| lines.push(line)).await;
        session.logout().await;

        assert!(lines.contains(&"[Connected]".to_string()));
    }
}
