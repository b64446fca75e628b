//! Per-viewer HTML rendering of the queue
//!
//! The same queue state renders differently per viewer: admins get remove
//! controls on every entry, a regular user only on their own. Rendering is
//! always done fresh per subscriber at publish time; nothing here is cached.

use crate::db::{QueueEntry, QueueStatus};

/// Render the queue fragment for one viewer
pub fn queue_fragment(entries: &[QueueEntry], viewer: Option<&str>, is_admin: bool) -> String {
    if entries.is_empty() {
        return r#"<ul class="queue-list"><li class="queue-empty">The queue is empty</li></ul>"#
            .to_string();
    }

    let mut html = String::from("<ul class=\"queue-list\">\n");
    for entry in entries {
        let playing = entry.status == QueueStatus::Playing;
        let can_remove = is_admin || viewer == Some(entry.username.as_str());

        html.push_str(&format!(
            "<li class=\"queue-item{}\" data-queue-id=\"{}\">",
            if playing { " now-playing" } else { "" },
            entry.id
        ));
        if playing {
            html.push_str("<span class=\"status-badge\">▶ Now playing</span>");
        }
        html.push_str(&format!(
            "<span class=\"title\">{}</span><span class=\"singer\">{}</span>",
            escape(&entry.title),
            escape(&entry.username)
        ));
        if let Some(duration) = entry.duration {
            html.push_str(&format!(
                "<span class=\"duration\">{}</span>",
                format_duration(duration)
            ));
        }
        if can_remove {
            html.push_str(&format!(
                "<button class=\"remove-btn\" data-queue-id=\"{}\">Remove</button>",
                entry.id
            ));
        }
        html.push_str("</li>\n");
    }
    html.push_str("</ul>");
    html
}

/// Minimal HTML escaping for text placed into element content
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Seconds as m:ss
fn format_duration(secs: i64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: i64, title: &str, username: &str, status: QueueStatus) -> QueueEntry {
        QueueEntry {
            id,
            video_id: format!("vid{}", id),
            title: title.to_string(),
            thumbnail_url: None,
            duration: Some(185),
            views: None,
            username: username.to_string(),
            added_at: Utc::now(),
            status,
        }
    }

    #[test]
    fn test_empty_queue() {
        let html = queue_fragment(&[], None, false);
        assert!(html.contains("queue-empty"));
    }

    #[test]
    fn test_admin_sees_all_remove_buttons() {
        let entries = vec![
            entry(1, "Song A", "alice", QueueStatus::Queued),
            entry(2, "Song B", "bob", QueueStatus::Queued),
        ];
        let html = queue_fragment(&entries, Some("admin"), true);
        assert_eq!(html.matches("remove-btn").count(), 2);
    }

    #[test]
    fn test_user_sees_only_own_remove_button() {
        let entries = vec![
            entry(1, "Song A", "alice", QueueStatus::Queued),
            entry(2, "Song B", "bob", QueueStatus::Queued),
        ];
        let html = queue_fragment(&entries, Some("alice"), false);
        assert_eq!(html.matches("remove-btn").count(), 1);
        assert!(html.contains("data-queue-id=\"1\">Remove"));
    }

    #[test]
    fn test_anonymous_sees_no_remove_buttons() {
        let entries = vec![entry(1, "Song A", "alice", QueueStatus::Queued)];
        let html = queue_fragment(&entries, None, false);
        assert!(!html.contains("remove-btn"));
    }

    #[test]
    fn test_playing_badge() {
        let entries = vec![entry(1, "Song A", "alice", QueueStatus::Playing)];
        let html = queue_fragment(&entries, None, false);
        assert!(html.contains("now-playing"));
        assert!(html.contains("Now playing"));
    }

    #[test]
    fn test_html_is_escaped() {
        let entries = vec![entry(1, "<script>alert(1)</script>", "a&b", QueueStatus::Queued)];
        let html = queue_fragment(&entries, None, false);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a&amp;b"));
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(185), "3:05");
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(600), "10:00");
    }
}
