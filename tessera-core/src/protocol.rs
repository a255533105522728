//! Wire protocol message shapes.
//!
//! Three message families cross the channel, all keyed to a named store
//! instance: requests (client to service), responses (service to client, one
//! per request), and notifications (service to client, asynchronous, not in
//! response to anything). These are shapes only - no logic lives here.

use serde::{Deserialize, Serialize};

use crate::Entry;

/// A request message. Every store operation maps to exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request<K, V> {
    /// Point lookup. Keys not present are absent from the result, not errors.
    Get { keys: Vec<K> },
    /// Up to `limit` entries with key >= `bound` (from the start if unset),
    /// in ascending key order.
    GetStartingFrom { bound: Option<K>, limit: usize },
    /// Up to `limit` entries with key <= `bound` (from the end if unset),
    /// in descending key order.
    GetEndingAt { bound: Option<K>, limit: usize },
    /// Upsert. Last write wins per key within the call.
    Set { entries: Vec<Entry<K, V>> },
    /// Remove the given keys.
    Delete { keys: Vec<K> },
    /// Remove every entry in the table.
    DeleteAll,
}

impl<K, V> Request<K, V> {
    /// Request kind as a string, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Get { .. } => "get",
            Request::GetStartingFrom { .. } => "get_starting_from",
            Request::GetEndingAt { .. } => "get_ending_at",
            Request::Set { .. } => "set",
            Request::Delete { .. } => "delete",
            Request::DeleteAll => "delete_all",
        }
    }

    /// Whether this request expects a `Response::Set` payload back.
    pub fn expects_entries(&self) -> bool {
        matches!(
            self,
            Request::Get { .. } | Request::GetStartingFrom { .. } | Request::GetEndingAt { .. }
        )
    }
}

/// A response message, paired one-to-one with a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response<K, V> {
    /// Result entries for the read family of requests.
    Set { entries: Vec<Entry<K, V>> },
    /// Empty success for the write family of requests.
    Ok,
}

/// An asynchronous, service-originated change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification<K, V> {
    /// Entries were inserted or updated.
    Set { entries: Vec<Entry<K, V>> },
    /// Keys were removed.
    Delete { keys: Vec<K> },
}

impl<K, V> Notification<K, V> {
    /// Notification kind as a string, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Set { .. } => "set",
            Notification::Delete { .. } => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tagged_shape() {
        let req: Request<u32, String> = Request::GetStartingFrom {
            bound: Some(7),
            limit: 100,
        };
        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(json["type"], "get_starting_from");
        assert_eq!(json["bound"], 7);
        assert_eq!(json["limit"], 100);
    }

    #[test]
    fn test_delete_all_has_no_payload() {
        let req: Request<u32, String> = Request::DeleteAll;
        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(json, serde_json::json!({ "type": "delete_all" }));
    }

    #[test]
    fn test_response_roundtrip() {
        let resp: Response<u32, String> = Response::Set {
            entries: vec![Entry::new(1, "one".to_string())],
        };
        let json = serde_json::to_string(&resp).expect("serialize");
        let back: Response<u32, String> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(resp, back);
    }

    #[test]
    fn test_notification_kinds() {
        let set: Notification<u32, String> = Notification::Set { entries: vec![] };
        let delete: Notification<u32, String> = Notification::Delete { keys: vec![3] };
        assert_eq!(set.kind(), "set");
        assert_eq!(delete.kind(), "delete");
    }

    #[test]
    fn test_read_family_expects_entries() {
        let get: Request<u32, String> = Request::Get { keys: vec![1] };
        let set: Request<u32, String> = Request::Set { entries: vec![] };
        assert!(get.expects_entries());
        assert!(!set.expects_entries());
    }
}
