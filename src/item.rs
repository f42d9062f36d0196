//! Item data extracted from `op` JSON output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The parts of an item the shell prints for `get` and `search`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemSummary {
    /// Item ID
    pub id: String,

    /// Item title
    pub title: String,

    /// Primary website
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Value of the username field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Value of the password field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ItemSummary {
    /// Reduces a full `op item get --format=json` document.
    ///
    /// Returns `None` when the document has no `id`.
    ///
    /// # Example
    ///
    /// ```
    /// use oppy::item::ItemSummary;
    /// use serde_json::json;
    ///
    /// let raw = json!({
    ///     "id": "abc",
    ///     "title": "GitHub",
    ///     "urls": [{"href": "https://github.com", "primary": true}],
    ///     "fields": [
    ///         {"id": "username", "purpose": "USERNAME", "value": "octocat"},
    ///         {"id": "password", "purpose": "PASSWORD", "value": "hunter2"}
    ///     ]
    /// });
    /// let item = ItemSummary::from_json(&raw).unwrap();
    /// assert_eq!(item.username.as_deref(), Some("octocat"));
    /// ```
    pub fn from_json(raw: &Value) -> Option<Self> {
        let id = raw.get("id")?.as_str()?.to_string();

        Some(Self {
            id,
            title: title_of(raw).unwrap_or_default().to_string(),
            url: primary_url(raw).map(str::to_string),
            username: field_with_purpose(raw, "USERNAME").map(str::to_string),
            password: field_with_purpose(raw, "PASSWORD").map(str::to_string),
        })
    }
}

/// Title of an item from `op item list` or `op item get`.
pub fn title_of(raw: &Value) -> Option<&str> {
    raw.get("title").and_then(Value::as_str)
}

/// The primary URL, falling back to the first URL.
pub fn primary_url(raw: &Value) -> Option<&str> {
    fn href(url: &Value) -> Option<&str> {
        url.get("href").and_then(Value::as_str)
    }

    let urls = raw.get("urls")?.as_array()?;

    urls.iter()
        .find(|u| u.get("primary").and_then(Value::as_bool) == Some(true))
        .and_then(href)
        .or_else(|| urls.iter().find_map(href))
}

/// Label shown when asking the user to pick among several matches.
pub fn choice_label(raw: &Value) -> String {
    format!(
        "{} :: {}",
        title_of(raw).unwrap_or("-"),
        primary_url(raw).unwrap_or("-")
    )
}

fn field_with_purpose<'a>(raw: &'a Value, purpose: &str) -> Option<&'a str> {
    raw.get("fields")?
        .as_array()?
        .iter()
        .find(|f| f.get("purpose").and_then(Value::as_str) == Some(purpose))
        .and_then(|f| f.get("value"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_from_login() {
        let raw = json!({
            "id": "k3",
            "title": "Mail",
            "urls": [
                {"href": "https://old.example.com"},
                {"href": "https://mail.example.com", "primary": true}
            ],
            "fields": [
                {"id": "notesPlain", "purpose": "NOTES", "value": ""},
                {"id": "username", "purpose": "USERNAME", "value": "me@example.com"},
                {"id": "password", "purpose": "PASSWORD", "value": "pw"}
            ]
        });

        let item = ItemSummary::from_json(&raw).unwrap();
        assert_eq!(item.id, "k3");
        assert_eq!(item.title, "Mail");
        assert_eq!(item.url.as_deref(), Some("https://mail.example.com"));
        assert_eq!(item.username.as_deref(), Some("me@example.com"));
        assert_eq!(item.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_summary_of_secure_note_omits_fields() {
        let raw = json!({"id": "n1", "title": "Note", "category": "SECURE_NOTE"});
        let item = ItemSummary::from_json(&raw).unwrap();

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, json!({"id": "n1", "title": "Note"}));
    }

    #[test]
    fn test_summary_requires_id() {
        assert!(ItemSummary::from_json(&json!({"title": "x"})).is_none());
    }

    #[test]
    fn test_primary_url_falls_back_to_first() {
        let raw = json!({"urls": [{"label": "no href"}, {"href": "https://a"}, {"href": "https://b"}]});
        assert_eq!(primary_url(&raw), Some("https://a"));

        let raw = json!({"urls": [{"href": "https://a"}, {"href": "https://b", "primary": true}]});
        assert_eq!(primary_url(&raw), Some("https://b"));

        assert_eq!(primary_url(&json!({"urls": []})), None);
        assert_eq!(primary_url(&json!({"title": "x"})), None);
    }

    #[test]
    fn test_choice_label() {
        let raw = json!({"id": "a", "title": "Bank", "urls": [{"href": "https://bank"}]});
        assert_eq!(choice_label(&raw), "Bank :: https://bank");
        assert_eq!(choice_label(&json!({"id": "b", "title": "Pin"})), "Pin :: -");
    }
}
