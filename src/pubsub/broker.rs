use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::{Arc, Weak},
    time::Instant,
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use topicbus_error::{BusResult, GenericError, PubSubError, PubSubResult, StackError, StatusCode};
use tracing::debug;

use super::{
    metrics::BusMetrics,
    path::{topic_key, TopicKey},
    subscriber::SubscriptionState,
    topic::TopicImpl,
    AsyncOptions, AsyncSubscriber, BusStats, PayloadType, PubSubMsg, PubSubTopic, PubSubscriber,
    ScavengeReport, SubscriberId, Subscription, TopicId,
};
use crate::config::PubSubConfig;

static GLOBAL: OnceCell<PubSub> = OnceCell::new();

/// Шина pub/sub: реестр топиков и таблица подписчиков.
///
/// Дешёвый в клонировании дескриптор. Каждый топик и каждая подписка
/// держат свою копию, поэтому шина живёт, пока жив хотя бы один из них.
/// Для кода, которому нужна одна шина на процесс, есть [`PubSub::global`].
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<BusInner>,
}

pub(crate) struct BusInner {
    config: PubSubConfig,
    registry: Mutex<RegistryState>,
    metrics: BusMetrics,
}

/// Всё, что защищено блокировкой реестра.
pub(crate) struct RegistryState {
    /// Живые и ещё не вычищенные мёртвые топики.
    pub(super) topics: HashMap<TopicKey, Weak<TopicImpl>>,
    /// Цели доставки по id подписчика.
    pub(super) subscribers: HashMap<SubscriberId, Weak<dyn PubSubscriber>>,
    /// Кто на какой путь подписан; набор подписчиков любого живого топика
    /// совпадает с этим отображением для его пути.
    pub(super) interest: HashMap<TopicKey, BTreeSet<SubscriberId>>,
    next_topic_id: TopicId,
    next_subscriber_id: SubscriberId,
    pub(super) last_scavenge: Instant,
}

/// Что отписывать в [`PubSub::detach`].
#[derive(Clone, Copy)]
pub(crate) enum Detach<'a> {
    /// Один путь.
    Path(&'a str),
    /// Все пути; id и запись в таблице остаются.
    All,
    /// Все пути и запись в таблице: подписка уничтожается.
    Retire,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PubSub {
    pub fn new(config: PubSubConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                registry: Mutex::new(RegistryState::new()),
                metrics: BusMetrics::default(),
            }),
        }
    }

    /// Как [`PubSub::new`], но сначала проверяет конфигурацию.
    pub fn try_new(config: PubSubConfig) -> BusResult<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Глобальная шина процесса. Создаётся при первом обращении с
    /// конфигурацией по умолчанию, если до этого не был вызван
    /// [`PubSub::install_global`].
    pub fn global() -> &'static PubSub {
        GLOBAL.get_or_init(|| PubSub::new(PubSubConfig::default()))
    }

    /// Устанавливает глобальную шину с заданной конфигурацией.
    ///
    /// Возвращает ошибку `AlreadyExists`, если глобальная шина уже была
    /// создана.
    pub fn install_global(config: PubSubConfig) -> BusResult<&'static PubSub> {
        config.validate()?;
        let mut installed = false;
        let bus = GLOBAL.get_or_init(|| {
            installed = true;
            PubSub::new(config)
        });
        if !installed {
            return Err(StackError::new(GenericError::new(
                StatusCode::AlreadyExists,
                "global bus is already initialised",
            )));
        }
        debug!("Global bus installed");
        Ok(bus)
    }

    pub fn config(&self) -> &PubSubConfig {
        &self.inner.config
    }

    /// `true`, если топик с таким путём существует и жив.
    pub fn topic_exists(
        &self,
        path: &str,
    ) -> bool {
        let Ok(key) = topic_key(path) else {
            return false;
        };
        let live = self.inner.registry.lock().live_topic(&key);
        live.is_some()
    }

    /// Создаёт топик и возвращает первый дескриптор на него.
    ///
    /// Подписчики, заранее подписавшиеся на этот путь, подключаются сразу.
    pub fn create_topic(
        &self,
        path: &str,
        payload_type: &'static PayloadType,
    ) -> PubSubResult<PubSubTopic> {
        let key = topic_key(path)?;
        self.maybe_scavenge();

        let topic = {
            let mut reg = self.inner.registry.lock();
            if reg.live_topic(&key).is_some() {
                return Err(PubSubError::AlreadyExists {
                    path: path.to_string(),
                });
            }

            let limit = self.inner.config.max_topics;
            if reg.topics.len() >= limit {
                reg.topics.retain(|_, topic| topic.strong_count() > 0);
                if reg.topics.len() >= limit {
                    return Err(PubSubError::LimitExceeded {
                        what: "topic",
                        limit,
                    });
                }
            }

            let id = reg.alloc_topic_id();
            let seeded: Vec<SubscriberId> = reg
                .interest
                .get(&key)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default();
            let topic = Arc::new(TopicImpl::new(id, path, key.clone(), payload_type, seeded));
            reg.topics.insert(key, Arc::downgrade(&topic));
            topic
        };

        self.inner.metrics.topic_created();
        debug!(
            topic = path,
            topic_id = topic.id(),
            payload_type = payload_type.name(),
            "Topic created"
        );
        Ok(PubSubTopic::attached(self.clone(), topic))
    }

    /// Новый дескриптор на уже существующий топик.
    pub fn join_topic(
        &self,
        path: &str,
    ) -> PubSubResult<PubSubTopic> {
        let key = topic_key(path)?;
        let topic = self.inner.registry.lock().live_topic(&key);
        match topic {
            Some(topic) => Ok(PubSubTopic::attached(self.clone(), topic)),
            None => Err(PubSubError::NotFound {
                what: "topic",
                name: path.to_string(),
            }),
        }
    }

    /// Подписка с обработчиком, которым владеет сама подписка.
    pub fn subscription(
        &self,
        handler: Arc<dyn PubSubscriber>,
    ) -> Subscription {
        Subscription::with_handler(self.clone(), handler)
    }

    /// Подписка, вызывающая замыкание на каждое сообщение.
    pub fn subscription_fn<F>(
        &self,
        handler: F,
    ) -> Subscription
    where
        F: Fn(PubSubMsg) + Send + Sync + 'static,
    {
        Subscription::from_fn(self.clone(), handler)
    }

    pub fn async_subscriber(
        &self,
        options: AsyncOptions,
    ) -> AsyncSubscriber {
        AsyncSubscriber::new(self.clone(), options)
    }

    pub fn stats(&self) -> BusStats {
        let mut stats = {
            let reg = self.inner.registry.lock();
            BusStats {
                live_topics: reg.topics.values().filter(|t| t.strong_count() > 0).count(),
                subscribers: reg.subscribers.len(),
                interest_paths: reg.interest.len(),
                ..BusStats::default()
            }
        };
        self.inner.metrics.fill(&mut stats);
        stats
    }

    /// `true`, если оба дескриптора указывают на одну шину.
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn metrics(&self) -> &BusMetrics {
        &self.inner.metrics
    }

    pub(crate) fn downgrade(&self) -> Weak<BusInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<BusInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn registry(&self) -> &Mutex<RegistryState> {
        &self.inner.registry
    }

    /// Отпускает ссылку на реализацию топика. Если ссылка была последней,
    /// убирает запись из реестра, если та ещё указывает на мёртвый топик.
    pub(crate) fn release_topic(
        &self,
        topic: Arc<TopicImpl>,
    ) {
        let Some(topic) = Arc::into_inner(topic) else {
            return;
        };

        let removed = {
            let mut reg = self.inner.registry.lock();
            let dead = reg
                .topics
                .get(topic.key())
                .is_some_and(|entry| entry.strong_count() == 0);
            if dead {
                reg.topics.remove(topic.key());
            }
            dead
        };

        if removed {
            debug!(topic = %topic.key(), topic_id = topic.id(), "Topic destroyed");
        }
    }

    /// Подписывает на путь. Вся работа выполняется под блокировкой реестра,
    /// поэтому создание топика и подписка на его путь не гоняются.
    pub(crate) fn attach(
        &self,
        target: &Weak<dyn PubSubscriber>,
        state: &Mutex<SubscriptionState>,
        path: &str,
        must_exist: bool,
    ) -> PubSubResult<SubscriberId> {
        let key = topic_key(path)?;
        self.maybe_scavenge();

        let (id, fresh) = {
            let mut reg = self.inner.registry.lock();
            let live = reg.live_topic(&key);
            if live.is_none() && must_exist {
                return Err(PubSubError::NotFound {
                    what: "topic",
                    name: path.to_string(),
                });
            }

            let mut sub = state.lock();
            let (id, fresh) = match sub.id {
                Some(id) => (id, false),
                None => {
                    let limit = self.inner.config.max_subscribers;
                    if reg.subscribers.len() >= limit {
                        return Err(PubSubError::LimitExceeded {
                            what: "subscriber",
                            limit,
                        });
                    }
                    let id = reg.alloc_subscriber_id();
                    reg.subscribers.insert(id, target.clone());
                    sub.id = Some(id);
                    (id, true)
                }
            };
            sub.add_path(key.clone(), path);
            drop(sub);

            reg.interest.entry(key).or_default().insert(id);
            if let Some(topic) = &live {
                topic.add_subscriber(id);
            }
            (id, fresh)
        };

        if fresh {
            self.inner.metrics.subscriber_registered();
            debug!(subscriber_id = id, "Subscriber registered");
        }
        debug!(subscriber_id = id, topic = path, "Subscribed");
        Ok(id)
    }

    /// Отписывает от одного пути или от всех. Идемпотентна.
    pub(crate) fn detach(
        &self,
        state: &Mutex<SubscriptionState>,
        scope: Detach<'_>,
    ) {
        let mut reg = self.inner.registry.lock();
        let mut sub = state.lock();
        let Some(id) = sub.id else {
            return;
        };

        let keys = match scope {
            Detach::Path(path) => match topic_key(path) {
                Ok(key) if sub.remove_path(&key) => vec![key],
                _ => Vec::new(),
            },
            Detach::All | Detach::Retire => sub.take_paths(),
        };
        if matches!(scope, Detach::Retire) {
            sub.id = None;
        }
        drop(sub);

        for key in &keys {
            if let Some(ids) = reg.interest.get_mut(key) {
                ids.remove(&id);
                if ids.is_empty() {
                    reg.interest.remove(key);
                }
            }
            if let Some(topic) = reg.live_topic(key) {
                topic.remove_subscriber(id);
            }
        }

        if matches!(scope, Detach::Retire) {
            reg.subscribers.remove(&id);
        }
        drop(reg);

        for key in &keys {
            debug!(subscriber_id = id, topic = %key, "Unsubscribed");
        }
    }

    fn maybe_scavenge(&self) {
        let interval = self.inner.config.scavenge_interval();
        if interval.is_zero() {
            return;
        }
        let due = self.inner.registry.lock().last_scavenge.elapsed() >= interval;
        if due {
            self.scavenge();
        }
    }
}

impl RegistryState {
    fn new() -> Self {
        Self {
            topics: HashMap::new(),
            subscribers: HashMap::new(),
            interest: HashMap::new(),
            next_topic_id: 1,
            next_subscriber_id: 1,
            last_scavenge: Instant::now(),
        }
    }

    /// Живой топик по ключу; мёртвая запись удаляется попутно.
    pub(super) fn live_topic(
        &mut self,
        key: &TopicKey,
    ) -> Option<Arc<TopicImpl>> {
        let topic = self.topics.get(key).and_then(Weak::upgrade);
        if topic.is_none() {
            self.topics.remove(key);
        }
        topic
    }

    /// Разрешает id подписчиков топика в живые цели доставки.
    ///
    /// Id, которые уже отписаны от пути или чей владелец исчез,
    /// пропускаются и считаются промахами. Возвращённые `Arc` должны
    /// отпускаться вне блокировки реестра.
    pub(crate) fn resolve_targets(
        &self,
        key: &TopicKey,
        ids: &[SubscriberId],
    ) -> (Vec<Arc<dyn PubSubscriber>>, usize) {
        let interested = self.interest.get(key);
        let mut targets = Vec::with_capacity(ids.len());
        let mut missed = 0;

        for id in ids {
            let target = interested
                .filter(|set| set.contains(id))
                .and_then(|_| self.subscribers.get(id))
                .and_then(Weak::upgrade);
            match target {
                Some(target) => targets.push(target),
                None => missed += 1,
            }
        }
        (targets, missed)
    }

    fn alloc_topic_id(&mut self) -> TopicId {
        let id = self.next_topic_id;
        self.next_topic_id = self.next_topic_id.checked_add(1).unwrap_or(1);
        id
    }

    fn alloc_subscriber_id(&mut self) -> SubscriberId {
        loop {
            let id = self.next_subscriber_id;
            self.next_subscriber_id = self.next_subscriber_id.checked_add(1).unwrap_or(1);
            if !self.subscribers.contains_key(&id) {
                return id;
            }
        }
    }

    /// Одна уборка: мёртвые топики, мёртвые цели доставки и их id в живых
    /// топиках. Возвращает временные ссылки на живые топики, которые
    /// вызывающий отпускает вне блокировки.
    pub(super) fn sweep(&mut self) -> (ScavengeReport, Vec<Arc<TopicImpl>>) {
        let mut report = ScavengeReport::default();

        let before = self.topics.len();
        self.topics.retain(|_, topic| topic.strong_count() > 0);
        report.dead_topics = before - self.topics.len();

        let dead: Vec<SubscriberId> = self
            .subscribers
            .iter()
            .filter(|(_, target)| target.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            self.subscribers.remove(id);
        }
        report.dead_subscribers = dead.len();

        let subscribers = &self.subscribers;
        self.interest.retain(|_, ids| {
            ids.retain(|id| subscribers.contains_key(id));
            !ids.is_empty()
        });

        let live: Vec<Arc<TopicImpl>> = self.topics.values().filter_map(Weak::upgrade).collect();
        if !dead.is_empty() {
            for topic in &live {
                report.detached_ids += topic.remove_subscribers(&dead);
            }
        }

        self.last_scavenge = Instant::now();
        (report, live)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для PubSub
////////////////////////////////////////////////////////////////////////////////

impl Default for PubSub {
    fn default() -> Self {
        Self::new(PubSubConfig::default())
    }
}

impl fmt::Debug for PubSub {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let reg = self.inner.registry.lock();
        f.debug_struct("PubSub")
            .field("topics", &reg.topics.len())
            .field("subscribers", &reg.subscribers.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::{FLOAT, OBJECT, STRING};

    fn bus() -> PubSub {
        PubSub::new(PubSubConfig::default())
    }

    #[test]
    fn test_create_and_exists() {
        let bus = bus();
        assert!(!bus.topic_exists("evt.temp"));

        let topic = bus.create_topic("evt.temp", &FLOAT).unwrap();
        assert!(bus.topic_exists("evt.temp"));
        assert!(bus.topic_exists("EVT.TEMP"));
        assert_eq!(topic.topic_id().unwrap(), 1);
        assert_eq!(topic.path(), "evt.temp");
    }

    /// Тест проверяет, что повторное создание живого топика запрещено,
    /// в том числе при другом регистре.
    #[test]
    fn test_create_duplicate() {
        let bus = bus();
        let _topic = bus.create_topic("evt.temp", &FLOAT).unwrap();

        let err = bus.create_topic("Evt.Temp", &STRING).unwrap_err();
        assert_eq!(
            err,
            PubSubError::AlreadyExists {
                path: "Evt.Temp".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_path() {
        let bus = bus();
        assert!(matches!(
            bus.create_topic("  ", &OBJECT),
            Err(PubSubError::InvalidPath { .. })
        ));
        assert!(!bus.topic_exists(""));
    }

    /// Тест проверяет, что после уничтожения топик можно пересоздать и
    /// он получит новый id.
    #[test]
    fn test_recreate_gets_new_id() {
        let bus = bus();
        let first = bus.create_topic("evt.temp", &FLOAT).unwrap();
        let first_id = first.topic_id().unwrap();
        drop(first);
        assert!(!bus.topic_exists("evt.temp"));

        let second = bus.create_topic("evt.temp", &FLOAT).unwrap();
        assert_ne!(second.topic_id().unwrap(), first_id);
    }

    #[test]
    fn test_join_topic() {
        let bus = bus();
        assert!(matches!(
            bus.join_topic("evt.none"),
            Err(PubSubError::NotFound { what: "topic", .. })
        ));

        let owner = bus.create_topic("evt.joined", &OBJECT).unwrap();
        let joined = bus.join_topic("EVT.JOINED").unwrap();
        assert_eq!(owner.topic_id().unwrap(), joined.topic_id().unwrap());
        assert_eq!(owner.ref_count().unwrap(), 2);

        drop(owner);
        assert!(bus.topic_exists("evt.joined"));
    }

    #[test]
    fn test_topic_limit() {
        let config = PubSubConfig {
            max_topics: 2,
            ..PubSubConfig::default()
        };
        let bus = PubSub::new(config);
        let _a = bus.create_topic("a", &OBJECT).unwrap();
        let b = bus.create_topic("b", &OBJECT).unwrap();

        let err = bus.create_topic("c", &OBJECT).unwrap_err();
        assert_eq!(
            err,
            PubSubError::LimitExceeded {
                what: "topic",
                limit: 2
            }
        );

        drop(b);
        assert!(bus.create_topic("c", &OBJECT).is_ok());
    }

    #[test]
    fn test_stats_counts() {
        let bus = bus();
        let _a = bus.create_topic("a", &OBJECT).unwrap();
        let sub = bus.subscription_fn(|_msg| {});
        sub.subscribe_to_topic("a", true).unwrap();
        sub.subscribe_to_topic("pending", false).unwrap();

        let stats = bus.stats();
        assert_eq!(stats.live_topics, 1);
        assert_eq!(stats.subscribers, 1);
        assert_eq!(stats.interest_paths, 2);
        assert_eq!(stats.topics_created, 1);
        assert_eq!(stats.subscribers_registered, 1);
    }

    #[test]
    fn test_try_new_validates() {
        let config = PubSubConfig {
            async_queue_capacity: 0,
            ..PubSubConfig::default()
        };
        let err = PubSub::try_new(config).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
    }

    #[test]
    fn test_clone_is_same_bus() {
        let bus = bus();
        let other = bus.clone();
        assert!(bus.ptr_eq(&other));
        assert!(!bus.ptr_eq(&PubSub::default()));
    }
}
