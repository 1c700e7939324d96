use crate::types::{Message, Role};

/// Returns the pending messages that no confirmed message accounts for yet.
///
/// A confirmation is a user message with exactly the same content. The
/// server assigns its own id on insert, so ids cannot be correlated; two
/// pending messages with identical text are both settled by one match.
pub fn reconcile(confirmed: &[Message], pending: &[Message]) -> Vec<Message> {
    pending
        .iter()
        .filter(|candidate| !is_confirmed(confirmed, candidate.content.as_deref()))
        .cloned()
        .collect()
}

pub fn is_confirmed(confirmed: &[Message], content: Option<&str>) -> bool {
    let Some(content) = content else {
        return false;
    };
    confirmed
        .iter()
        .any(|msg| msg.role == Role::User && msg.content.as_deref() == Some(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageId, MessageStatus};
    use time::macros::datetime;

    fn pending(id: i64, content: &str) -> Message {
        Message::optimistic(MessageId::Int(id), content, datetime!(2024-03-05 10:00 UTC))
    }

    fn confirmed(id: i64, role: Role, content: &str) -> Message {
        Message::confirmed(id, role, content, datetime!(2024-03-05 10:00 UTC))
    }

    #[test]
    fn matching_user_message_settles_pending() {
        let pending = vec![pending(1, "hi")];
        assert_eq!(pending[0].status, Some(MessageStatus::Sending));
        let confirmed = vec![confirmed(10, Role::User, "hi")];
        assert!(reconcile(&confirmed, &pending).is_empty());
    }

    #[test]
    fn assistant_echo_does_not_confirm() {
        let pending = vec![pending(1, "hi")];
        let confirmed = vec![confirmed(10, Role::Assistant, "hi")];
        assert_eq!(reconcile(&confirmed, &pending), pending);
    }

    #[test]
    fn matching_is_exact() {
        let pending = vec![pending(1, "hi"), pending(2, "Hi ")];
        let confirmed = vec![confirmed(10, Role::User, "hi")];
        let remaining = reconcile(&confirmed, &pending);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, MessageId::Int(2));
    }

    #[test]
    fn ids_are_not_used_for_matching() {
        let pending = vec![pending(10, "hello")];
        let confirmed = vec![confirmed(10, Role::User, "different")];
        assert_eq!(reconcile(&confirmed, &pending).len(), 1);
    }

    // Duplicate texts are ambiguous: one server row settles every pending
    // copy, even if the second send has not been persisted yet.
    #[test]
    fn duplicate_texts_are_all_settled_by_one_confirmation() {
        let pending = vec![pending(1, "ok"), pending(2, "ok")];
        let confirmed = vec![confirmed(10, Role::User, "ok")];
        assert!(reconcile(&confirmed, &pending).is_empty());
    }

    #[test]
    fn empty_confirmed_keeps_everything() {
        let pending = vec![pending(1, "a"), pending(2, "b")];
        assert_eq!(reconcile(&[], &pending), pending);
    }
}
