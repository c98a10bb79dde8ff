//! Внутрипроцессная шина publish/subscribe.
//!
//! Компоненты публикуют неизменяемые объекты в именованные типизированные
//! топики. Подписчики получают их синхронно (колбэк в потоке публикующего)
//! или асинхронно (ограниченная очередь, которую вычитывает свой поток).
//!
//! ```
//! use std::time::Duration;
//!
//! use topicbus::{AsyncOptions, PubSub, FLOAT};
//!
//! let bus = PubSub::default();
//! let reader = bus.async_subscriber(AsyncOptions::default());
//! reader.subscribe_to("sensor.temp", false).unwrap();
//!
//! let topic = bus.create_topic("sensor.temp", &FLOAT).unwrap();
//! topic.publish(21.5f64).unwrap();
//!
//! let msg = reader.get_next_msg(Duration::from_millis(100)).unwrap().unwrap();
//! assert_eq!(*msg.payload_as::<f64>().unwrap(), 21.5);
//! assert_eq!(msg.src_topic_path(), "sensor.temp");
//! ```

/// Bus configuration loading.
pub mod config;
/// Logging bootstrap (formatting, filters, sinks).
pub mod logging;
/// Pub/Sub: bus, topics, envelopes, subscriptions.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use self::config::PubSubConfig;
/// Logging bootstrap.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Pub/Sub API.
pub use pubsub::{
    AsyncOptions, AsyncSubscriber, BusStats, MsgId, Payload, PayloadType, PubSub, PubSubMsg,
    PubSubTopic, PubSubscriber, PublishReport, ScavengeReport, ScavengerHandle, SubscriberId,
    Subscription, TopicId, WaitEvent, WaitSet, BOOLEAN, BYTES, FLOAT, INTEGER, OBJECT, STRING,
};
/// Error types and result aliases.
pub use topicbus_error::{BusResult, ErrorExt, PubSubError, PubSubResult, StackError, StatusCode};
