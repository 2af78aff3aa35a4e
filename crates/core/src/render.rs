//! Alert message rendering (Telegram HTML).
//!
//! Layout, top to bottom: header, timestamp, identifier, descriptive
//! fields, headline score, one block per list group, any fields the schema
//! does not know about, and finally the "What changed" section when the
//! alert carries change blocks. Every field of the record appears somewhere
//! in the message.

use chrono::Local;

use crate::diff::{Alert, ChangeBlock};
use crate::schema::{FieldSpec, ListGroup, MonitorSchema};
use crate::snapshot::RecordSnapshot;
use crate::types::Timestamp;

/// Shown in place of an empty list or value.
pub const EMPTY_PLACEHOLDER: &str = "(none)";

/// Separates the record body from the change section.
const SECTION_RULE: &str = "━━━━━━━━━━━━━━━━";

/// Items listed per list before the rest is summarized as "+N more".
pub const MAX_LISTED_ITEMS: usize = 20;

/// Telegram's message limit, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Appended when trailing lines are dropped to fit [`MAX_MESSAGE_LEN`].
const TRUNCATED_NOTE: &str = "… <i>message truncated</i>";

/// Human timestamp format, in local time.
const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Render an alert produced by the diff engine.
pub fn render_alert(schema: &MonitorSchema, alert: &Alert, at: Timestamp) -> String {
    compose(
        schema,
        &alert.id,
        &alert.record,
        &alert.changes,
        alert.first_sighting,
        at,
    )
}

/// Render one record and its change blocks.
pub fn render(
    schema: &MonitorSchema,
    id: &str,
    record: &RecordSnapshot,
    changes: &[ChangeBlock],
    at: Timestamp,
) -> String {
    compose(schema, id, record, changes, false, at)
}

/// Format `at` the way message headers show it.
pub fn format_timestamp(at: Timestamp) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

fn compose(
    schema: &MonitorSchema,
    id: &str,
    record: &RecordSnapshot,
    changes: &[ChangeBlock],
    first_sighting: bool,
    at: Timestamp,
) -> String {
    let mut lines = vec![
        format!("⚠️ <b>{}</b>", escape_html(&schema.header)),
        String::new(),
        format!("🕒 {}", format_timestamp(at)),
    ];
    if first_sighting {
        lines.push("🆕 <i>New record, no previous baseline</i>".to_string());
    }
    lines.push(String::new());

    lines.push(format!(
        "📌 <b>{}:</b> {}",
        escape_html(&schema.id_label),
        escape_html(id)
    ));
    for field in &schema.fields {
        lines.push(field_line(field, record));
    }
    lines.push(String::new());

    lines.push(format!(
        "{}<b>{}:</b> <b>{}</b>",
        icon_prefix(schema.score.icon.as_deref()),
        escape_html(&schema.score.label),
        value_text(record, &schema.score.key)
    ));

    for group in &schema.groups {
        lines.push(String::new());
        lines.extend(group_lines(group, record));
    }

    let extra: Vec<String> = record
        .iter()
        .filter(|(key, _)| !schema.is_known_key(key))
        .map(|(key, value)| {
            format!("• {}: {}", escape_html(key), escape_html(&value.to_string()))
        })
        .collect();
    if !extra.is_empty() {
        lines.push(String::new());
        lines.push("📎 <b>Other fields</b>".to_string());
        lines.extend(extra);
    }

    if !changes.is_empty() {
        lines.push(String::new());
        lines.push(SECTION_RULE.to_string());
        lines.push("🔄 <b>What changed</b>".to_string());
        for block in changes {
            lines.push(String::new());
            let icon = schema
                .groups
                .iter()
                .find(|g| g.key == block.group_key)
                .and_then(|g| g.icon.as_deref());
            lines.extend(change_lines(block, icon));
        }
    }

    fit_message(lines)
}

/// Join lines, dropping whole lines from the end once the message would
/// exceed [`MAX_MESSAGE_LEN`]. Tags never span lines, so the markup stays
/// balanced.
fn fit_message(lines: Vec<String>) -> String {
    let budget = MAX_MESSAGE_LEN - TRUNCATED_NOTE.encode_utf16().count() - 1;
    let total: usize = lines.iter().map(|l| l.encode_utf16().count() + 1).sum();
    if total <= MAX_MESSAGE_LEN + 1 {
        return lines.join("\n");
    }

    let mut used = 0;
    let mut kept = Vec::new();
    for line in lines {
        let len = line.encode_utf16().count() + 1;
        if used + len > budget {
            break;
        }
        used += len;
        kept.push(line);
    }
    kept.push(TRUNCATED_NOTE.to_string());
    kept.join("\n")
}

fn icon_prefix(icon: Option<&str>) -> String {
    icon.map(|i| format!("{i} ")).unwrap_or_default()
}

fn value_text(record: &RecordSnapshot, key: &str) -> String {
    match record.get(key) {
        Some(value) if !value.is_empty() => escape_html(&value.to_string()),
        _ => EMPTY_PLACEHOLDER.to_string(),
    }
}

fn field_line(field: &FieldSpec, record: &RecordSnapshot) -> String {
    let value = match (record.get(&field.key), field.suffix.as_deref()) {
        (Some(v), Some(suffix)) if !v.is_empty() => {
            format!("{} {}", escape_html(&v.to_string()), escape_html(suffix))
        }
        _ => value_text(record, &field.key),
    };
    format!(
        "{}<b>{}:</b> {}",
        icon_prefix(field.icon.as_deref()),
        escape_html(&field.label),
        value
    )
}

fn group_lines(group: &ListGroup, record: &RecordSnapshot) -> Vec<String> {
    let items = record.items(&group.key);
    let count = match &group.count {
        Some(count) => value_text(record, &count.key),
        None => items.len().to_string(),
    };

    let mut lines = vec![format!(
        "{}<b>{}:</b> {}",
        icon_prefix(group.icon.as_deref()),
        escape_html(&group.label),
        count
    )];
    if items.is_empty() {
        lines.push(EMPTY_PLACEHOLDER.to_string());
    } else {
        lines.extend(
            items
                .iter()
                .take(MAX_LISTED_ITEMS)
                .map(|item| format!("• {}", escape_html(item))),
        );
        if items.len() > MAX_LISTED_ITEMS {
            lines.push(format!("… +{} more", items.len() - MAX_LISTED_ITEMS));
        }
    }
    lines
}

fn change_lines(block: &ChangeBlock, icon: Option<&str>) -> Vec<String> {
    let mut lines = vec![
        format!("{}<b>{}</b>", icon_prefix(icon), escape_html(&block.label)),
        format!("before: {}", join_items(&block.previous)),
        format!("now: {}", join_items(&block.current)),
    ];
    if !block.added.is_empty() {
        lines.push(format!("➕ added: {}", join_items(&block.added)));
    }
    if !block.removed.is_empty() {
        lines.push(format!("➖ removed: {}", join_items(&block.removed)));
    }
    lines
}

fn join_items(items: &[String]) -> String {
    if items.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        let mut shown: Vec<String> = items
            .iter()
            .take(MAX_LISTED_ITEMS)
            .map(|item| escape_html(item))
            .collect();
        if items.len() > MAX_LISTED_ITEMS {
            shown.push(format!("… +{} more", items.len() - MAX_LISTED_ITEMS));
        }
        shown.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
