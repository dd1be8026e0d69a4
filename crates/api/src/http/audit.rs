use serde::Serialize;
use serde_json::{Map, Value};
use uniadmin_auth::Principal;
use uniadmin_contracts::{AuditAction, AuditRecord, EntityKind};
use uniadmin_store::AuditSink;

use super::AppState;

/// Fields that change on every write and carry no information.
const IGNORED_FIELDS: &[&str] = &["updated_at"];

/// `{field: {old, new}}` for every top-level field that differs.
pub fn changes<T: Serialize>(before: &T, after: &T) -> Option<Value> {
    let (Ok(Value::Object(before)), Ok(Value::Object(after))) =
        (serde_json::to_value(before), serde_json::to_value(after))
    else {
        return None;
    };

    let mut diff = Map::new();
    for (key, new) in &after {
        if IGNORED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let old = before.get(key).cloned().unwrap_or(Value::Null);
        if &old != new {
            diff.insert(key.clone(), serde_json::json!({"old": old, "new": new}));
        }
    }
    (!diff.is_empty()).then_some(Value::Object(diff))
}

pub fn deleted(object_id: i64, display_name: String) -> Value {
    serde_json::json!({
        "deleted_id": object_id,
        "deleted_str": display_name,
    })
}

/// Emits the audit event and persists it. Persistence failures are logged only.
pub async fn record(
    state: &AppState,
    principal: &Principal,
    action: AuditAction,
    kind: EntityKind,
    object_id: i64,
    changes: Option<Value>,
    extra: Option<Value>,
) {
    let record = AuditRecord {
        timestamp: chrono::Utc::now(),
        user: principal.username.clone(),
        action,
        model: kind.model_name().to_string(),
        object_id,
        changes,
        extra,
    };

    let changed_fields = record
        .changes
        .as_ref()
        .and_then(Value::as_object)
        .map(|fields| fields.keys().cloned().collect::<Vec<_>>().join(","))
        .unwrap_or_default();

    tracing::info!(
        target: "audit",
        timestamp = %record.timestamp.to_rfc3339(),
        user = %record.user,
        action = record.action.as_str(),
        model = %record.model,
        object_id = record.object_id,
        changed_fields = %changed_fields,
        "[AUDIT] {} | {} | {} | ID:{}",
        record.user,
        record.action.as_str(),
        record.model,
        record.object_id,
    );

    if let Err(err) = state.store.append_audit(&record).await {
        tracing::warn!(
            action = record.action.as_str(),
            model = %record.model,
            object_id = record.object_id,
            error = %err,
            "failed to persist audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Snapshot {
        name: &'static str,
        is_active: bool,
        updated_at: &'static str,
    }

    #[test]
    fn changes_skip_unchanged_and_timestamp_fields() {
        let before = Snapshot {
            name: "Old",
            is_active: true,
            updated_at: "2024-01-01T00:00:00Z",
        };
        let after = Snapshot {
            name: "New",
            is_active: true,
            updated_at: "2024-01-02T00:00:00Z",
        };

        assert_eq!(
            changes(&before, &after),
            Some(json!({"name": {"old": "Old", "new": "New"}}))
        );
        assert_eq!(changes(&after, &after), None);
    }

    #[test]
    fn deleted_payload_names_the_record() {
        assert_eq!(
            deleted(7, "CNTT - Information Technology".to_string()),
            json!({"deleted_id": 7, "deleted_str": "CNTT - Information Technology"})
        );
    }
}
