use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use topicbus_error::{PubSubError, PubSubResult};

use super::{
    broker::Detach,
    path::{topic_key, TopicKey},
    PubSub, PubSubMsg, SubscriberId,
};

/// Получатель сообщений синхронной подписки.
///
/// `process_pub_msg` вызывается в потоке, который разбирает очередь топика
/// (обычно это поток публикующего), без удерживаемых блокировок шины. Сообщение можно сохранить (оно уже клон конверта) или
/// просто отпустить.
pub trait PubSubscriber: Send + Sync {
    fn process_pub_msg(
        &self,
        msg: PubSubMsg,
    );
}

/// Право подписываться на топики.
///
/// Встраивается в компонент-владелец. Шина хранит только `Weak` на цель
/// доставки, поэтому подписка не продлевает жизнь владельцу. При
/// уничтожении подписка отписывается от всех путей.
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use topicbus::pubsub::{PubSub, STRING};
///
/// let bus = PubSub::default();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let sub = bus.subscription_fn(move |msg| {
///     sink.lock().unwrap().push(msg.msg_id());
/// });
///
/// sub.subscribe_to_topic("chat.lobby", false).unwrap();
/// let topic = bus.create_topic("chat.lobby", &STRING).unwrap();
/// topic.publish(String::from("hi")).unwrap();
///
/// assert_eq!(*seen.lock().unwrap(), vec![1]);
/// ```
pub struct Subscription {
    bus: PubSub,
    target: Weak<dyn PubSubscriber>,
    _handler: Option<Arc<dyn PubSubscriber>>,
    state: Mutex<SubscriptionState>,
}

/// Id и подписанные пути. Меняется только под блокировкой реестра.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionState {
    pub(crate) id: Option<SubscriberId>,
    paths: Vec<SubscribedPath>,
}

#[derive(Debug)]
struct SubscribedPath {
    key: TopicKey,
    path: String,
}

struct FnSubscriber<F>(F);

impl<F> PubSubscriber for FnSubscriber<F>
where
    F: Fn(PubSubMsg) + Send + Sync,
{
    fn process_pub_msg(
        &self,
        msg: PubSubMsg,
    ) {
        (self.0)(msg)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Subscription {
    /// Подписка для владельца, который сам реализует [`PubSubscriber`].
    ///
    /// Владелец обычно строится через `Arc::new_cyclic`, чтобы получить
    /// `Weak` на себя до того, как подписка окажется внутри него.
    pub fn new(
        bus: PubSub,
        target: Weak<dyn PubSubscriber>,
    ) -> Self {
        Self {
            bus,
            target,
            _handler: None,
            state: Mutex::new(SubscriptionState::default()),
        }
    }

    /// Подписка, которая сама владеет обработчиком.
    pub fn with_handler(
        bus: PubSub,
        handler: Arc<dyn PubSubscriber>,
    ) -> Self {
        Self {
            bus,
            target: Arc::downgrade(&handler),
            _handler: Some(handler),
            state: Mutex::new(SubscriptionState::default()),
        }
    }

    pub fn from_fn<F>(
        bus: PubSub,
        handler: F,
    ) -> Self
    where
        F: Fn(PubSubMsg) + Send + Sync + 'static,
    {
        Self::with_handler(bus, Arc::new(FnSubscriber(handler)))
    }

    /// Подписывает на путь.
    ///
    /// При `must_exist == false` путь может ещё не существовать: подписка
    /// подключится к топику, когда его создадут. Повторная подписка на тот
    /// же путь ничего не меняет.
    pub fn subscribe_to_topic(
        &self,
        path: &str,
        must_exist: bool,
    ) -> PubSubResult<()> {
        self.bus
            .attach(&self.target, &self.state, path, must_exist)
            .map(|_| ())
    }

    /// Отписывает от пути. Отписка от незнакомого пути ничего не делает.
    pub fn unsubscribe_from_topic(
        &self,
        path: &str,
    ) {
        self.bus.detach(&self.state, Detach::Path(path));
    }

    /// Отписывает от всех путей; id подписчика сохраняется.
    pub fn unsubscribe_all(&self) {
        self.bus.detach(&self.state, Detach::All);
    }

    pub fn is_subscribed_to_topic(
        &self,
        path: &str,
    ) -> bool {
        match topic_key(path) {
            Ok(key) => self.state.lock().contains(&key),
            Err(_) => false,
        }
    }

    /// Id подписчика; `None` до первой подписки.
    pub fn subscriber_id(&self) -> Option<SubscriberId> {
        self.state.lock().id
    }

    pub fn checked_subscriber_id(&self) -> PubSubResult<SubscriberId> {
        self.subscriber_id()
            .ok_or(PubSubError::NotReady {
                what: "subscription",
            })
    }

    /// Пути в том написании, в котором на них подписывались.
    pub fn topic_paths(&self) -> Vec<String> {
        self.state
            .lock()
            .paths
            .iter()
            .map(|p| p.path.clone())
            .collect()
    }

    pub fn bus(&self) -> &PubSub {
        &self.bus
    }
}

impl SubscriptionState {
    fn contains(
        &self,
        key: &TopicKey,
    ) -> bool {
        self.paths.iter().any(|p| p.key == *key)
    }

    pub(crate) fn add_path(
        &mut self,
        key: TopicKey,
        path: &str,
    ) {
        if !self.contains(&key) {
            self.paths.push(SubscribedPath {
                key,
                path: path.to_string(),
            });
        }
    }

    pub(crate) fn remove_path(
        &mut self,
        key: &TopicKey,
    ) -> bool {
        let before = self.paths.len();
        self.paths.retain(|p| p.key != *key);
        self.paths.len() != before
    }

    pub(crate) fn take_paths(&mut self) -> Vec<TopicKey> {
        self.paths.drain(..).map(|p| p.key).collect()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для Subscription
////////////////////////////////////////////////////////////////////////////////

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.detach(&self.state, Detach::Retire);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Subscription")
            .field("subscriber_id", &state.id)
            .field("paths", &state.paths.len())
            .field("target_alive", &(self.target.strong_count() > 0))
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::pubsub::{FLOAT, OBJECT};

    fn counter(bus: &PubSub) -> (Subscription, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = hits.clone();
        let sub = bus.subscription_fn(move |_msg| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        (sub, hits)
    }

    /// Тест проверяет, что id назначается лениво и не меняется.
    #[test]
    fn test_lazy_subscriber_id() {
        let bus = PubSub::default();
        let (sub, _) = counter(&bus);
        assert_eq!(sub.subscriber_id(), None);
        assert!(matches!(
            sub.checked_subscriber_id(),
            Err(PubSubError::NotReady { .. })
        ));

        sub.subscribe_to_topic("a", false).unwrap();
        let id = sub.checked_subscriber_id().unwrap();
        sub.subscribe_to_topic("b", false).unwrap();
        assert_eq!(sub.subscriber_id(), Some(id));
    }

    #[test]
    fn test_must_exist() {
        let bus = PubSub::default();
        let (sub, _) = counter(&bus);

        let err = sub.subscribe_to_topic("evt.none", true).unwrap_err();
        assert_eq!(
            err,
            PubSubError::NotFound {
                what: "topic",
                name: "evt.none".to_string()
            }
        );
        assert!(!sub.is_subscribed_to_topic("evt.none"));
        assert_eq!(sub.subscriber_id(), None);
    }

    /// Тест проверяет, что повторная подписка не дублирует доставку.
    #[test]
    fn test_duplicate_subscribe_is_noop() {
        let bus = PubSub::default();
        let topic = bus.create_topic("evt.a", &FLOAT).unwrap();
        let (sub, hits) = counter(&bus);

        sub.subscribe_to_topic("evt.a", true).unwrap();
        sub.subscribe_to_topic("EVT.A", true).unwrap();
        assert_eq!(sub.topic_paths(), vec!["evt.a".to_string()]);
        assert_eq!(topic.sub_count().unwrap(), 1);

        topic.publish(1.0f64).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = PubSub::default();
        let topic = bus.create_topic("evt.a", &OBJECT).unwrap();
        let (sub, hits) = counter(&bus);

        sub.unsubscribe_from_topic("evt.a");
        sub.subscribe_to_topic("evt.a", true).unwrap();
        sub.unsubscribe_from_topic("evt.a");
        sub.unsubscribe_from_topic("evt.a");
        sub.unsubscribe_from_topic("");

        assert!(!sub.is_subscribed_to_topic("evt.a"));
        assert_eq!(topic.sub_count().unwrap(), 0);
        topic.publish(5u8).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    /// Тест проверяет, что уничтожение подписки снимает её со всех топиков.
    #[test]
    fn test_drop_unsubscribes_everywhere() {
        let bus = PubSub::default();
        let a = bus.create_topic("a", &OBJECT).unwrap();
        let b = bus.create_topic("b", &OBJECT).unwrap();
        let (sub, _) = counter(&bus);
        sub.subscribe_to_topic("a", true).unwrap();
        sub.subscribe_to_topic("b", true).unwrap();
        sub.subscribe_to_topic("pending", false).unwrap();

        drop(sub);
        assert_eq!(a.sub_count().unwrap(), 0);
        assert_eq!(b.sub_count().unwrap(), 0);

        let stats = bus.stats();
        assert_eq!(stats.subscribers, 0);
        assert_eq!(stats.interest_paths, 0);
    }

    #[test]
    fn test_unsubscribe_all_keeps_id() {
        let bus = PubSub::default();
        let topic = bus.create_topic("a", &OBJECT).unwrap();
        let (sub, hits) = counter(&bus);
        sub.subscribe_to_topic("a", true).unwrap();
        let id = sub.subscriber_id();

        sub.unsubscribe_all();
        assert!(sub.topic_paths().is_empty());
        assert_eq!(sub.subscriber_id(), id);

        sub.subscribe_to_topic("a", true).unwrap();
        topic.publish(1i32).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    struct Owner {
        sub: Subscription,
        hits: AtomicUsize,
    }

    impl PubSubscriber for Owner {
        fn process_pub_msg(
            &self,
            _msg: PubSubMsg,
        ) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Тест проверяет встраивание подписки во владельца через
    /// `Arc::new_cyclic`.
    #[test]
    fn test_embedded_owner() {
        let bus = PubSub::default();
        let topic = bus.create_topic("evt.owner", &OBJECT).unwrap();

        let owner = Arc::new_cyclic(|me: &Weak<Owner>| {
            let target: Weak<dyn PubSubscriber> = me.clone();
            Owner {
                sub: Subscription::new(bus.clone(), target),
                hits: AtomicUsize::new(0),
            }
        });
        owner.sub.subscribe_to_topic("evt.owner", true).unwrap();

        topic.publish(1u64).unwrap();
        topic.publish(2u64).unwrap();
        assert_eq!(owner.hits.load(Ordering::SeqCst), 2);

        drop(owner);
        assert_eq!(topic.sub_count().unwrap(), 0);
        assert_eq!(topic.publish(3u64).unwrap().delivered, 0);
    }
}
