//! Conversion between session objects and stored records.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One stored session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier, the table's primary key.
    pub id: String,

    /// Epoch milliseconds after which the record is dead.
    pub expires: i64,

    /// Serialized session object. Never inspected by the store.
    pub session: String,
}

impl SessionRecord {
    /// Create a record from its parts.
    pub fn new(id: impl Into<String>, expires: i64, session: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            expires,
            session: session.into(),
        }
    }

    /// Whether a sweep at `now_millis` removes this record.
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expires < now_millis
    }
}

/// Session objects that may carry their own lifetime.
pub trait CookieMaxAge {
    /// The cookie's original max-age. `None` falls back to the store's
    /// session timeout.
    fn original_max_age(&self) -> Option<Duration>;
}

/// Cookie settings carried inside a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Max-age in milliseconds the cookie was issued with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_max_age: Option<u64>,

    /// Remaining cookie attributes, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A session object in the shape session middleware usually produces: a
/// `cookie` object plus arbitrary application data at the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub cookie: Cookie,

    /// Application data.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cookie max-age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.cookie.original_max_age = Some(u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Insert a data field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Read a data field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

impl CookieMaxAge for Session {
    fn original_max_age(&self) -> Option<Duration> {
        // A zero max-age means "unset", as it does for the cookie itself.
        self.cookie
            .original_max_age
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

impl CookieMaxAge for Value {
    fn original_max_age(&self) -> Option<Duration> {
        self.pointer("/cookie/originalMaxAge")
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Encodes session objects into records and back.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    session_timeout: Duration,
}

impl RecordCodec {
    /// Create a codec that falls back to `session_timeout` for sessions
    /// without a cookie max-age.
    pub fn new(session_timeout: Duration) -> Self {
        Self { session_timeout }
    }

    /// The fallback expiry window.
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Encode a session stamped with the current time.
    pub fn encode<S>(&self, id: &str, session: &S) -> Result<SessionRecord, CodecError>
    where
        S: Serialize + CookieMaxAge,
    {
        self.encode_at(id, session, now_millis())
    }

    /// Encode a session as if written at `now_millis`.
    pub fn encode_at<S>(
        &self,
        id: &str,
        session: &S,
        now_millis: i64,
    ) -> Result<SessionRecord, CodecError>
    where
        S: Serialize + CookieMaxAge,
    {
        let lifetime = session.original_max_age().unwrap_or(self.session_timeout);
        let lifetime_ms = i64::try_from(lifetime.as_millis()).unwrap_or(i64::MAX);

        Ok(SessionRecord {
            id: id.to_string(),
            expires: now_millis.saturating_add(lifetime_ms),
            session: serde_json::to_string(session)?,
        })
    }

    /// Decode the session stored in a record.
    pub fn decode<S: DeserializeOwned>(&self, record: &SessionRecord) -> Result<S, CodecError> {
        Ok(serde_json::from_str(&record.session)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DAY: Duration = Duration::from_millis(86_400_000);

    #[test]
    fn test_expires_from_cookie_max_age() {
        let codec = RecordCodec::new(DAY);
        let session = Session::new()
            .with_max_age(Duration::from_millis(5000))
            .with("data", "x");

        let record = codec.encode_at("u1", &session, 1_000).unwrap();
        assert_eq!(record.id, "u1");
        assert_eq!(record.expires, 6_000);
    }

    #[test]
    fn test_expires_falls_back_to_timeout() {
        let codec = RecordCodec::new(DAY);
        let record = codec.encode_at("u1", &Session::new(), 0).unwrap();
        assert_eq!(record.expires, 86_400_000);

        let zero = Session {
            cookie: Cookie {
                original_max_age: Some(0),
                ..Cookie::default()
            },
            ..Session::default()
        };
        let record = codec.encode_at("u1", &zero, 0).unwrap();
        assert_eq!(record.expires, 86_400_000);
    }

    #[test]
    fn test_payload_shape() {
        let codec = RecordCodec::new(DAY);
        let session = Session::new()
            .with_max_age(Duration::from_millis(5000))
            .with("data", "x");

        let record = codec.encode_at("u1", &session, 0).unwrap();
        let payload: Value = serde_json::from_str(&record.session).unwrap();
        assert_eq!(
            payload,
            json!({"cookie": {"originalMaxAge": 5000}, "data": "x"})
        );
    }

    #[test]
    fn test_decode_preserves_unknown_fields() {
        let codec = RecordCodec::new(DAY);
        let record = SessionRecord::new(
            "u1",
            0,
            r#"{"cookie":{"originalMaxAge":null,"httpOnly":true,"path":"/"},"user":{"id":7}}"#,
        );

        let session: Session = codec.decode(&record).unwrap();
        assert_eq!(session.cookie.original_max_age, None);
        assert_eq!(session.cookie.extra.get("httpOnly"), Some(&json!(true)));
        assert_eq!(session.get("user"), Some(&json!({"id": 7})));
    }

    #[test]
    fn test_decode_malformed_payload() {
        let codec = RecordCodec::new(DAY);
        let record = SessionRecord::new("u1", 0, "{not json");

        let result: Result<Session, _> = codec.decode(&record);
        assert!(matches!(result, Err(CodecError::Serialization(_))));
    }

    #[test]
    fn test_json_value_max_age() {
        let value = json!({"cookie": {"originalMaxAge": 250}});
        assert_eq!(value.original_max_age(), Some(Duration::from_millis(250)));
        assert_eq!(json!({"data": 1}).original_max_age(), None);
    }

    #[test]
    fn test_huge_max_age_saturates() {
        let session = Session::new().with_max_age(Duration::MAX);
        assert_eq!(session.cookie.original_max_age, Some(u64::MAX));

        let record = RecordCodec::new(Duration::from_secs(60))
            .encode_at("u1", &session, 1_000)
            .unwrap();
        assert_eq!(record.expires, i64::MAX);
    }

    #[test]
    fn test_is_expired_at() {
        let record = SessionRecord::new("u1", 100, "{}");
        assert!(!record.is_expired_at(100));
        assert!(record.is_expired_at(101));
    }
}
