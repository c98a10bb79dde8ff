use std::{fmt, sync::Arc};

use topicbus_error::{PubSubError, PubSubResult};

use super::{MsgId, Payload, PayloadType};

/// Конверт опубликованного сообщения.
///
/// Один конверт разделяется всеми подписчиками, получившими публикацию:
/// `clone()` добавляет читателя, `drop()` (или [`PubSubMsg::discard`])
/// убирает его. Нагрузка уничтожается ровно один раз, вместе с последней
/// ссылкой, и больше никогда не изменяется после публикации.
#[derive(Clone)]
pub struct PubSubMsg {
    inner: Arc<MsgImpl>,
}

struct MsgImpl {
    msg_id: MsgId,
    src_topic_path: Arc<str>,
    payload: Box<dyn Payload>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PubSubMsg {
    pub(crate) fn new(
        msg_id: MsgId,
        src_topic_path: Arc<str>,
        payload: Box<dyn Payload>,
    ) -> Self {
        Self {
            inner: Arc::new(MsgImpl {
                msg_id,
                src_topic_path,
                payload,
            }),
        }
    }

    /// Идентификатор сообщения, уникальный в пределах топика-источника.
    pub fn msg_id(&self) -> MsgId {
        self.inner.msg_id
    }

    /// Путь топика, из которого пришло сообщение.
    ///
    /// Остаётся валидным, даже если сам топик уже уничтожен.
    pub fn src_topic_path(&self) -> &str {
        &self.inner.src_topic_path
    }

    pub fn payload(&self) -> &dyn Payload {
        self.inner.payload.as_ref()
    }

    pub fn payload_type(&self) -> &'static PayloadType {
        self.inner.payload.payload_type()
    }

    /// Нагрузка, приведённая к конкретному типу `T`.
    pub fn payload_as<T: Payload>(&self) -> PubSubResult<&T> {
        self.inner
            .payload
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| PubSubError::TypeMismatch {
                actual: self.payload_type().name(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Число живых ссылок на конверт (включая эту).
    pub fn reader_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// `true`, если оба значения ссылаются на один и тот же конверт.
    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Явно отпускает ссылку на сообщение. Эквивалентно `drop(msg)`.
    pub fn discard(self) {}
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для PubSubMsg
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for PubSubMsg {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PubSubMsg")
            .field("msg_id", &self.inner.msg_id)
            .field("src_topic_path", &self.inner.src_topic_path)
            .field("payload_type", &self.payload_type().name())
            .field("readers", &self.reader_count())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
