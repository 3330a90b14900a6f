//! Staging events inside the local transaction that produced them.

use async_trait::async_trait;
use serde::Serialize;

use crate::{NewStagedEvent, Result, StagedEventId};

/// An event body that can be staged in the outbox.
pub trait OutboxEvent: Serialize {
    /// Event type name stored on the row.
    fn event_type(&self) -> &'static str;

    /// Topic the relay publishes the event to.
    fn topic(&self) -> &'static str;

    /// Business ID the event is about.
    fn correlation_key(&self) -> String;
}

/// An open local transaction that an outbox row can be written into.
///
/// The row becomes visible only if the transaction commits, together with
/// whatever business mutation was made through the same transaction.
#[async_trait]
pub trait StagingTransaction: Send {
    /// Inserts a PENDING row.
    async fn insert_staged(&mut self, event: NewStagedEvent) -> Result<StagedEventId>;
}

/// Serializes an event into a row ready for insertion.
pub fn stage<E: OutboxEvent>(event: &E) -> Result<NewStagedEvent> {
    Ok(NewStagedEvent {
        correlation_key: event.correlation_key(),
        topic: event.topic().to_string(),
        event_type: event.event_type().to_string(),
        payload: serde_json::to_string(event)?,
    })
}

/// Appends events to the outbox of an open transaction.
///
/// A serialization failure is returned before anything is written; callers
/// propagate it with `?`, which drops the transaction uncommitted, so neither
/// the business mutation nor the event survive.
#[async_trait]
pub trait OutboxAppender: StagingTransaction {
    async fn append<E>(&mut self, event: &E) -> Result<StagedEventId>
    where
        E: OutboxEvent + Sync,
    {
        let staged = stage(event)?;
        let topic = staged.topic.clone();
        let correlation_key = staged.correlation_key.clone();

        let id = self.insert_staged(staged).await?;

        metrics::counter!("outbox_staged_total", "topic" => topic.clone()).increment(1);
        tracing::debug!(%id, %topic, %correlation_key, "event staged");
        Ok(id)
    }
}

// Blanket implementation for all staging transactions
impl<T: StagingTransaction + ?Sized> OutboxAppender for T {}

#[cfg(test)]
mod tests {
    use serde::Serializer;

    use super::*;
    use crate::OutboxError;

    #[derive(Serialize)]
    struct Greeting {
        id: u32,
        text: &'static str,
    }

    impl OutboxEvent for Greeting {
        fn event_type(&self) -> &'static str {
            "Greeting"
        }

        fn topic(&self) -> &'static str {
            "greetings"
        }

        fn correlation_key(&self) -> String {
            self.id.to_string()
        }
    }

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot encode"))
        }
    }

    impl OutboxEvent for Unencodable {
        fn event_type(&self) -> &'static str {
            "Unencodable"
        }

        fn topic(&self) -> &'static str {
            "nowhere"
        }

        fn correlation_key(&self) -> String {
            "0".to_string()
        }
    }

    #[test]
    fn test_stage_serializes_body_and_routing() {
        let staged = stage(&Greeting { id: 7, text: "hi" }).unwrap();
        assert_eq!(staged.correlation_key, "7");
        assert_eq!(staged.topic, "greetings");
        assert_eq!(staged.event_type, "Greeting");
        assert_eq!(staged.payload, r#"{"id":7,"text":"hi"}"#);
    }

    #[test]
    fn test_stage_surfaces_serialization_error() {
        assert!(matches!(
            stage(&Unencodable),
            Err(OutboxError::Serialization(_))
        ));
    }
}
