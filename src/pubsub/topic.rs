use std::{collections::VecDeque, fmt, mem, sync::Arc};

use parking_lot::Mutex;
use topicbus_error::{PubSubError, PubSubResult};
use tracing::{error, trace};

use super::{
    path::TopicKey, MsgId, Payload, PayloadType, PubSub, PubSubMsg, PubSubscriber, SubscriberId,
    TopicId,
};

/// Реализация топика. Разделяется всеми дескрипторами [`PubSubTopic`];
/// реестр держит на неё только `Weak`.
pub(crate) struct TopicImpl {
    id: TopicId,
    path: Arc<str>,
    key: TopicKey,
    payload_type: &'static PayloadType,
    state: Mutex<TopicState>,
}

struct TopicState {
    next_msg_id: MsgId,
    subscribers: Vec<SubscriberId>,
    /// Конверты в порядке выдачи id, ещё не переданные подписчикам.
    pending: VecDeque<Dispatch>,
    /// Какой-то поток сейчас разбирает `pending`.
    dispatching: bool,
}

struct Dispatch {
    msg: PubSubMsg,
    targets: Vec<Arc<dyn PubSubscriber>>,
}

/// Снимает флаг `dispatching`, если разбор очереди прервался паникой
/// колбэка. Оставшиеся конверты выбрасываются вне блокировки.
struct DrainGuard<'a> {
    topic: &'a TopicImpl,
    armed: bool,
}

/// Итог одной публикации.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Id выданного сообщения; `None`, если подписчиков не было и id не
    /// расходовался.
    pub msg_id: Option<MsgId>,
    /// Скольким подписчикам передан конверт.
    pub delivered: usize,
    /// Сколько id из снимка уже не разрешились в живых подписчиков.
    pub missed: usize,
    /// Топик в этот момент разбирал другой поток или внешний колбэк:
    /// конверт поставлен в очередь за предыдущими и будет доставлен тем,
    /// кто разбирает очередь.
    pub deferred: bool,
}

/// Дескриптор топика: право публиковать и считаемая ссылка на топик.
///
/// `clone()` добавляет ссылку, [`PubSubTopic::drop_topic`] или `drop()`
/// отпускает её. Когда отпущена последняя, топик исчезает из реестра.
/// Дескриптор по умолчанию ни к чему не привязан.
#[derive(Default)]
pub struct PubSubTopic {
    link: Option<TopicLink>,
    path: String,
}

#[derive(Clone)]
struct TopicLink {
    bus: PubSub,
    topic: Arc<TopicImpl>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl TopicImpl {
    pub(crate) fn new(
        id: TopicId,
        path: &str,
        key: TopicKey,
        payload_type: &'static PayloadType,
        subscribers: Vec<SubscriberId>,
    ) -> Self {
        Self {
            id,
            path: Arc::from(path),
            key,
            payload_type,
            state: Mutex::new(TopicState {
                next_msg_id: 1,
                subscribers,
                pending: VecDeque::new(),
                dispatching: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> TopicId {
        self.id
    }

    pub(crate) fn key(&self) -> &TopicKey {
        &self.key
    }

    /// Повторное добавление игнорируется.
    pub(crate) fn add_subscriber(
        &self,
        id: SubscriberId,
    ) {
        let mut state = self.state.lock();
        if !state.subscribers.contains(&id) {
            state.subscribers.push(id);
        }
    }

    /// Возвращает `true`, если id действительно был в топике.
    pub(crate) fn remove_subscriber(
        &self,
        id: SubscriberId,
    ) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| *s != id);
        state.subscribers.len() != before
    }

    /// Убирает все перечисленные id, возвращает число удалённых.
    pub(crate) fn remove_subscribers(
        &self,
        ids: &[SubscriberId],
    ) -> usize {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| !ids.contains(s));
        before - state.subscribers.len()
    }

    fn sub_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Передаёт подписчикам всё из `pending`, пока очередь не опустеет.
    /// Вызывается только потоком, поднявшим `dispatching`. Ни одна
    /// блокировка не держится во время колбэков.
    fn drain(&self) {
        let mut guard = DrainGuard {
            topic: self,
            armed: true,
        };
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        state.dispatching = false;
                        guard.armed = false;
                        return;
                    }
                }
            };
            for target in &next.targets {
                target.process_pub_msg(next.msg.clone());
            }
            drop(next);
        }
    }
}

impl PubSubTopic {
    pub(crate) fn attached(
        bus: PubSub,
        topic: Arc<TopicImpl>,
    ) -> Self {
        let path = topic.path.to_string();
        Self {
            link: Some(TopicLink { bus, topic }),
            path,
        }
    }

    /// Публикует объект в топик.
    ///
    /// Тип объекта должен совпадать с объявленным типом топика или быть его
    /// потомком. Обычно колбэки синхронных подписчиков выполняются в этом
    /// потоке до возврата из метода. Если топик в этот момент уже разбирает
    /// другой поток или внешний колбэк, конверт встаёт в очередь за
    /// предыдущими, доставляет его тот, кто разбирает очередь, а в отчёте
    /// выставлен `deferred`. Так каждый подписчик видит id по возрастанию.
    pub fn publish<P: Payload>(
        &self,
        payload: P,
    ) -> PubSubResult<PublishReport> {
        self.publish_boxed(Box::new(payload))
    }

    pub fn publish_boxed(
        &self,
        payload: Box<dyn Payload>,
    ) -> PubSubResult<PublishReport> {
        let link = self.link()?;
        let topic = &link.topic;

        let actual = payload.payload_type();
        if !actual.is_descendant_of(topic.payload_type) {
            link.bus.metrics().type_mismatch();
            return Err(PubSubError::TypeMismatch {
                actual: actual.name(),
                expected: topic.payload_type.name(),
            });
        }

        let issued = {
            let reg = link.bus.registry().lock();
            let mut state = topic.state.lock();
            if state.subscribers.is_empty() {
                // `payload` отпускается при выходе из метода, уже без блокировок.
                None
            } else {
                let msg_id = state.next_msg_id;
                state.next_msg_id += 1;
                let (targets, missed) = reg.resolve_targets(&topic.key, &state.subscribers);
                let delivered = targets.len();
                let msg = PubSubMsg::new(msg_id, topic.path.clone(), payload);
                state.pending.push_back(Dispatch { msg, targets });
                let deferred = mem::replace(&mut state.dispatching, true);
                Some((msg_id, delivered, missed, deferred))
            }
        };

        let Some((msg_id, delivered, missed, deferred)) = issued else {
            trace!(topic = %topic.path, "Publish skipped: no subscribers");
            return Ok(PublishReport::default());
        };

        if !deferred {
            topic.drain();
        }

        link.bus.metrics().published(delivered, missed);
        trace!(topic = %topic.path, msg_id, delivered, missed, deferred, "Published");

        Ok(PublishReport {
            msg_id: Some(msg_id),
            delivered,
            missed,
            deferred,
        })
    }

    /// Отпускает ссылку на топик. Повторный вызов ничего не делает.
    pub fn drop_topic(&mut self) {
        if let Some(TopicLink { bus, topic }) = self.link.take() {
            bus.release_topic(topic);
        }
    }

    pub fn is_published(&self) -> bool {
        self.link.is_some()
    }

    /// Путь, с которым топик был создан. Для отпущенного дескриптора
    /// сохраняется последний путь.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn topic_id(&self) -> PubSubResult<TopicId> {
        Ok(self.link()?.topic.id)
    }

    pub fn payload_type(&self) -> PubSubResult<&'static PayloadType> {
        Ok(self.link()?.topic.payload_type)
    }

    pub fn sub_count(&self) -> PubSubResult<usize> {
        Ok(self.link()?.topic.sub_count())
    }

    /// Число живых ссылок на реализацию топика. Может временно включать
    /// внутренние ссылки шины.
    pub fn ref_count(&self) -> PubSubResult<usize> {
        Ok(Arc::strong_count(&self.link()?.topic))
    }

    /// Id, который получит следующее сообщение.
    pub fn next_msg_id(&self) -> PubSubResult<MsgId> {
        Ok(self.link()?.topic.state.lock().next_msg_id)
    }

    fn link(&self) -> PubSubResult<&TopicLink> {
        self.link
            .as_ref()
            .ok_or(PubSubError::NotReady { what: "topic" })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для PubSubTopic
////////////////////////////////////////////////////////////////////////////////

impl Clone for PubSubTopic {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            path: self.path.clone(),
        }
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let dropped = {
            let mut state = self.topic.state.lock();
            state.dispatching = false;
            mem::take(&mut state.pending)
        };
        error!(
            topic = %self.topic.path,
            discarded = dropped.len(),
            "Subscriber callback panicked during dispatch"
        );
        drop(dropped);
    }
}

impl Drop for PubSubTopic {
    fn drop(&mut self) {
        self.drop_topic();
    }
}

impl fmt::Debug for PubSubTopic {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut debug = f.debug_struct("PubSubTopic");
        debug.field("path", &self.path);
        if let Some(link) = &self.link {
            debug
                .field("topic_id", &link.topic.id)
                .field("payload_type", &link.topic.payload_type.name());
        } else {
            debug.field("published", &false);
        }
        debug.finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
