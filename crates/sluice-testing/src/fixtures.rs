//! Builders for test messages and naming schemes.

use bytes::Bytes;
use sluice_core::storage::KeySpec;
use uuid::Uuid;

/// One text message with a caller-chosen id.
pub fn text_message(id: &str, body: &str) -> (String, Bytes) {
    (id.to_owned(), Bytes::from(body.to_owned()))
}

/// `count` numbered messages, ids `msg-000`, `msg-001`, ...
pub fn message_batch(count: usize) -> Vec<(String, Bytes)> {
    (0..count)
        .map(|i| (format!("msg-{i:03}"), Bytes::from(format!("{{\"seq\":{i}}}"))))
        .collect()
}

/// Globally unique message id for tests that must not collide.
pub fn unique_message_id() -> String {
    format!("msg-{}", Uuid::new_v4().simple())
}

/// Naming scheme used across the test suites.
pub fn key_spec() -> KeySpec {
    KeySpec::new("raw", "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_are_unique_and_ordered() {
        let batch = message_batch(3);
        let ids: Vec<_> = batch.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["msg-000", "msg-001", "msg-002"]);
    }

    #[test]
    fn unique_ids_do_not_collide() {
        assert_ne!(unique_message_id(), unique_message_id());
    }
}
