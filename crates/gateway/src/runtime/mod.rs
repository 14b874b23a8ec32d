//! Runtime core: ingress dispatch, session actors, turn driving, and the
//! permission broker.

pub mod actor;
pub mod coordinator;
pub mod dispatcher;
pub mod permission;
pub(crate) mod turn;

use std::sync::Arc;

use rb_domain::message::PlatformMessage;
use rb_domain::trigger::Trigger;

use coordinator::Coordinator;
use dispatcher::{DispatchItem, EventDispatcher};

/// Put one trigger on the ingress queue, serialized by its session key.
///
/// If the queue is full the trigger is dropped and, when a reply sink can
/// be built for it, the conversation is told so.
pub fn enqueue_trigger(
    dispatcher: &EventDispatcher,
    coordinator: Arc<Coordinator>,
    trigger: Trigger,
) -> bool {
    let name = format!("route:{}", trigger.platform);
    let session_key = trigger.session_key.clone();

    let overload_sink = coordinator
        .listener(&trigger.platform)
        .and_then(|l| l.create_reply_sink(&trigger.reply_context).ok());

    let work = {
        let coordinator = coordinator.clone();
        Box::pin(async move {
            coordinator.route(trigger).await;
            Ok(())
        })
    };

    let mut item = DispatchItem::new(name, Some(session_key), work);
    if let Some(sink) = overload_sink {
        item = item.with_on_drop(Box::pin(async move {
            let _ = sink
                .send(PlatformMessage::text(
                    "⚠️ Too many messages in flight, this one was dropped. Try again shortly.",
                ))
                .await;
        }));
    }
    dispatcher.enqueue(item)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::commands::CommandRegistry;
    use crate::platform::mock::{MockListener, TurnMode};
    use crate::runtime::actor::ActorContext;
    use crate::runtime::permission::PermissionBroker;
    use rb_domain::config::DispatcherConfig;
    use rb_domain::config::PermissionsConfig;
    use rb_sessions::SessionStore;
    use std::time::Duration;

    #[tokio::test]
    async fn overloaded_queue_notifies_the_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ActorContext {
            broker: Arc::new(PermissionBroker::new(
                &PermissionsConfig::default(),
                dir.path(),
            )),
            store: Arc::new(SessionStore::open(dir.path(), 7).unwrap()),
            commands: Arc::new(CommandRegistry::new()),
            soft_timeout: Duration::from_millis(200),
            hard_timeout: Duration::from_millis(200),
        };
        let coordinator = Arc::new(Coordinator::new(ctx));
        let listener = Arc::new(MockListener::new("mock", TurnMode::Instant("hi".into())));
        coordinator.register_listener(listener.clone()).unwrap();

        let dispatcher = EventDispatcher::new_paused(&DispatcherConfig {
            workers: 2,
            max_queue: 1,
            warn_queue: 1,
        });

        let t = |p: &str| Trigger::user("mock", "mock:1", p);
        assert!(enqueue_trigger(&dispatcher, coordinator.clone(), t("fits")));
        assert!(!enqueue_trigger(&dispatcher, coordinator.clone(), t("dropped")));

        for _ in 0..200 {
            if !listener.sink.texts().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let texts = listener.sink.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("dropped"));
    }
}
