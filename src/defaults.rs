use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

/// Resource collections whose create payloads get server-expected defaults.
///
/// The list is closed: a path is recognised only when it is exactly one of
/// the collection paths below.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKind {
    Project,
    Task,
    Sprint,
    User,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [Self::Project, Self::Task, Self::Sprint, Self::User];

    pub fn collection_path(self) -> &'static str {
        match self {
            Self::Project => "/projects",
            Self::Task => "/tasks",
            Self::Sprint => "/sprints",
            Self::User => "/users",
        }
    }

    /// Matches `/tasks` or `/tasks/`, but not `/tasks/7` or `/subtasks`.
    pub fn for_collection_path(path: &str) -> Option<Self> {
        let path = path.split('?').next().unwrap_or(path);
        let trimmed = path.strip_suffix('/').unwrap_or(path);
        Self::ALL
            .into_iter()
            .find(|kind| kind.collection_path() == trimmed)
    }

    /// Fields inserted when absent from a create payload.
    pub fn defaults(self, now: DateTime<Utc>) -> Map<String, Value> {
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut fields = Map::new();
        fields.insert("createdAt".to_owned(), json!(timestamp));
        fields.insert("updatedAt".to_owned(), json!(timestamp));

        let specific = match self {
            Self::Project => json!({ "status": "active", "progress": 0, "tags": [] }),
            Self::Task => json!({ "status": "todo", "priority": "medium" }),
            Self::Sprint => json!({ "status": "planned", "taskIds": [] }),
            Self::User => json!({ "role": "member", "active": true }),
        };
        if let Value::Object(specific) = specific {
            fields.extend(specific);
        }
        fields
    }
}

/// Fills in defaults for known collections without overwriting caller fields.
///
/// Bodies that are not JSON objects, and paths outside the closed list, are
/// returned unchanged.
pub fn apply_create_defaults(path: &str, body: Value, now: DateTime<Utc>) -> Value {
    let Some(kind) = ResourceKind::for_collection_path(path) else {
        return body;
    };
    match body {
        Value::Object(mut object) => {
            for (key, value) in kind.defaults(now) {
                object.entry(key).or_insert(value);
            }
            Value::Object(object)
        }
        other => other,
    }
}
