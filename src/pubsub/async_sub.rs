use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use topicbus_error::{PubSubError, PubSubResult};
use tracing::warn;

use super::{
    wait::{wait_until, WaitEvent},
    PubSub, PubSubMsg, PubSubscriber, Subscription,
};

/// Параметры асинхронного подписчика.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsyncOptions {
    /// Ёмкость очереди; при `None` берётся значение из конфигурации шины.
    pub capacity: Option<usize>,
    /// Создать [`WaitEvent`], отражающий непустоту очереди.
    pub create_event: bool,
}

/// Подписчик, складывающий сообщения в ограниченную очередь.
///
/// Публикующий только кладёт конверт в очередь; потребитель забирает его
/// через [`AsyncSubscriber::get_next_msg`] в своём потоке. При
/// переполнении выбрасывается самое старое непрочитанное сообщение.
pub struct AsyncSubscriber {
    subscription: Subscription,
    queue: Arc<AsyncQueue>,
}

struct AsyncQueue {
    msgs: Mutex<VecDeque<PubSubMsg>>,
    ready: Condvar,
    capacity: usize,
    event: Option<WaitEvent>,
    dropped: AtomicU64,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl AsyncOptions {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn with_event(mut self) -> Self {
        self.create_event = true;
        self
    }
}

impl AsyncSubscriber {
    pub fn new(
        bus: PubSub,
        options: AsyncOptions,
    ) -> Self {
        let capacity = options
            .capacity
            .unwrap_or(bus.config().async_queue_capacity)
            .max(1);
        let queue = Arc::new(AsyncQueue {
            msgs: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            capacity,
            event: options.create_event.then(|| WaitEvent::new(false)),
            dropped: AtomicU64::new(0),
        });
        let subscription = Subscription::with_handler(bus, queue.clone());
        Self {
            subscription,
            queue,
        }
    }

    pub fn subscribe_to(
        &self,
        path: &str,
        must_exist: bool,
    ) -> PubSubResult<()> {
        self.subscription.subscribe_to_topic(path, must_exist)
    }

    pub fn unsubscribe_from(
        &self,
        path: &str,
    ) {
        self.subscription.unsubscribe_from_topic(path);
    }

    pub fn is_subscribed_to(
        &self,
        path: &str,
    ) -> bool {
        self.subscription.is_subscribed_to_topic(path)
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Забирает следующее сообщение, ожидая не дольше `timeout`.
    ///
    /// `Duration::ZERO` означает опрос без ожидания, `Ok(None)` означает таймаут.
    /// Возвращает `NotFound`, если подписчик ещё ни на что не подписывался.
    pub fn get_next_msg(
        &self,
        timeout: Duration,
    ) -> PubSubResult<Option<PubSubMsg>> {
        if self.subscription.subscriber_id().is_none() {
            return Err(PubSubError::NotFound {
                what: "subscription",
                name: "async subscriber".to_string(),
            });
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut msgs = self.queue.msgs.lock();
        if !timeout.is_zero() {
            while msgs.is_empty() {
                if !wait_until(&self.queue.ready, &mut msgs, deadline) {
                    break;
                }
            }
        }

        let msg = msgs.pop_front();
        if msg.is_some() && msgs.is_empty() {
            if let Some(event) = &self.queue.event {
                event.reset();
            }
        }
        Ok(msg)
    }

    pub fn msg_count(&self) -> usize {
        self.queue.msgs.lock().len()
    }

    /// Сколько сообщений выброшено из-за переполнения.
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity
    }

    /// Выбрасывает всё, что лежит в очереди. Возвращает число выброшенных.
    pub fn flush_msgs(&self) -> usize {
        let drained: Vec<PubSubMsg> = {
            let mut msgs = self.queue.msgs.lock();
            if let Some(event) = &self.queue.event {
                event.reset();
            }
            msgs.drain(..).collect()
        };
        drained.len()
    }

    /// Событие, отражающее непустоту очереди.
    pub fn event(&self) -> PubSubResult<WaitEvent> {
        self.queue
            .event
            .clone()
            .ok_or(PubSubError::NotReady { what: "event" })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl PubSubscriber for AsyncQueue {
    fn process_pub_msg(
        &self,
        msg: PubSubMsg,
    ) {
        let evicted = {
            let mut msgs = self.msgs.lock();
            let was_empty = msgs.is_empty();
            let evicted = if msgs.len() >= self.capacity {
                msgs.pop_front()
            } else {
                None
            };
            msgs.push_back(msg);
            if was_empty {
                if let Some(event) = &self.event {
                    event.set();
                }
            }
            self.ready.notify_one();
            evicted
        };

        if let Some(old) = evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                topic = old.src_topic_path(),
                msg_id = old.msg_id(),
                capacity = self.capacity,
                "Async subscriber queue full, dropping oldest message"
            );
        }
    }
}

impl fmt::Debug for AsyncSubscriber {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("AsyncSubscriber")
            .field("subscriber_id", &self.subscription.subscriber_id())
            .field("queued", &self.msg_count())
            .field("capacity", &self.queue.capacity)
            .field("dropped", &self.dropped_count())
            .field("has_event", &self.queue.event.is_some())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
