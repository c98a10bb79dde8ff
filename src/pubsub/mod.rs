//! Подсистема Publish–Subscribe (pub/sub).
//!
//! Внутрипроцессная шина сообщений:
//!
//! - `broker`: шина [`PubSub`], реестр топиков и таблица подписчиков.
//! - `topic`: дескриптор топика [`PubSubTopic`] и публикация.
//! - `message`: конверт сообщения [`PubSubMsg`] со счётчиком ссылок.
//! - `payload`: дескрипторы типов нагрузки и трейт [`Payload`].
//! - `subscriber`: трейт [`PubSubscriber`] и право подписки [`Subscription`].
//! - `async_sub`: [`AsyncSubscriber`] с ограниченной очередью.
//! - `wait`: [`WaitEvent`] и [`WaitSet`] для ожидания нескольких очередей.
//! - `scavenger`: уборка мёртвых записей реестра.
//! - `metrics` (приватный): счётчики шины.
//! - `path` (приватный): нормализация путей топиков.
//!
//! Порядок блокировок: затвор публикации топика → реестр → состояние
//! топика или подписки. Код подписчиков и деструкторы нагрузки никогда не
//! выполняются под блокировками реестра, топика или подписки.

pub mod async_sub;
pub mod broker;
pub mod message;
mod metrics;
mod path;
pub mod payload;
pub mod scavenger;
pub mod subscriber;
pub mod topic;
pub mod wait;

// Публичный экспорт всех типов из вложенных модулей, чтобы упростить
// доступ к ним из внешнего кода.
pub use async_sub::*;
pub use broker::PubSub;
pub use message::*;
pub use metrics::BusStats;
pub use payload::*;
pub use scavenger::*;
pub use subscriber::{PubSubscriber, Subscription};
pub use topic::{PubSubTopic, PublishReport};
pub use wait::{WaitEvent, WaitSet};

/// Id топика, уникальный в пределах шины.
pub type TopicId = u32;
/// Id подписчика, уникальный в пределах шины.
pub type SubscriberId = u32;
/// Id сообщения, уникальный в пределах топика.
pub type MsgId = u64;
