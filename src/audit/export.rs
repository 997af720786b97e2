//! Bulk export rendering for audit entries.

use anyhow::{Context, Result};

use crate::audit::models::AuditLogEntry;

const CSV_HEADER: &str = "id,created_at,event_type,actor_type,actor_id,actor_email,\
target_type,target_id,action,status,ip_address,user_agent,session_id,request_id,metadata";

/// Render entries as a JSON array.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn to_json(entries: &[AuditLogEntry]) -> Result<String> {
    serde_json::to_string(entries).context("failed to serialize audit export")
}

/// Render entries as CSV, one row per entry, header first.
#[must_use]
pub fn to_csv(entries: &[AuditLogEntry]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for entry in entries {
        let metadata = entry
            .metadata
            .as_ref()
            .map(std::string::ToString::to_string)
            .unwrap_or_default();
        let fields = [
            entry.id.to_string(),
            entry.created_at.to_rfc3339(),
            entry.event_type.clone(),
            entry.actor_type.as_str().to_string(),
            optional(entry.actor_id.map(|id| id.to_string())),
            optional(entry.actor_email.clone()),
            optional(entry.target_type.clone()),
            optional(entry.target_id.clone()),
            entry.action.clone(),
            entry.status.as_str().to_string(),
            optional(entry.ip_address.clone()),
            optional(entry.user_agent.clone()),
            optional(entry.session_id.map(|id| id.to_string())),
            optional(entry.request_id.clone()),
            metadata,
        ];
        let row: Vec<String> = fields.iter().map(|field| escape_field(field)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_default()
}

/// Quote and quote-escape a field when it contains a comma, quote, or newline.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::models::{ActorType, AuditStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(action: &str) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::nil(),
            created_at: Utc::now(),
            event_type: "LOGIN_FAILURE".to_string(),
            actor_type: ActorType::Customer,
            actor_id: None,
            actor_email: Some("a@b.com".to_string()),
            target_type: None,
            target_id: None,
            action: action.to_string(),
            status: AuditStatus::Failure,
            ip_address: Some("1.2.3.4".to_string()),
            user_agent: None,
            session_id: None,
            request_id: None,
            metadata: None,
        }
    }

    #[test]
    fn plain_fields_stay_unquoted() {
        assert_eq!(escape_field("login"), "login");
    }

    #[test]
    fn commas_quotes_and_newlines_are_quoted() {
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn csv_has_header_and_one_row_per_entry() {
        let csv = to_csv(&[entry("login"), entry("logout")]);
        let lines: Vec<&str> = csv.trim_end().split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,created_at,event_type"));
        assert!(lines[1].contains("LOGIN_FAILURE"));
    }

    #[test]
    fn csv_escapes_embedded_commas() {
        let csv = to_csv(&[entry("update,cart")]);
        assert!(csv.contains("\"update,cart\""));
    }

    #[test]
    fn json_export_is_an_array() {
        let json = to_json(&[entry("login")]).expect("serialize");
        assert!(json.starts_with('['));
        assert!(json.contains("\"LOGIN_FAILURE\""));
    }
}
