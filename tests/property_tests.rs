//! Property-based тесты для шины pub/sub.
//!
//! Генерируют случайные последовательности публикаций, подписок и отписок
//! и проверяют порядок id, однократное уничтожение нагрузки и поведение
//! ограниченной очереди.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use proptest::prelude::*;
use topicbus::{impl_payload, AsyncOptions, PayloadType, PubSub, PubSubMsg, OBJECT};

const PROPTEST_CASES: u32 = 128;

static COUNTED: PayloadType = PayloadType::derived("Counted", &OBJECT);

struct Counted(Arc<AtomicUsize>);

impl Drop for Counted {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl_payload!(Counted => COUNTED);

#[derive(Debug, Clone)]
enum Step {
    Publish,
    Subscribe(usize),
    Unsubscribe(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => Just(Step::Publish),
        1 => (0..3usize).prop_map(Step::Subscribe),
        1 => (0..3usize).prop_map(Step::Unsubscribe),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: PROPTEST_CASES,
        ..ProptestConfig::default()
    })]

    /// Каждый подписчик видит строго возрастающие id, а пока он
    /// подписан непрерывно, без пропусков.
    #[test]
    fn prop_ids_strictly_increasing(steps in prop::collection::vec(step(), 1..80)) {
        let bus = PubSub::default();
        let topic = bus.create_topic("prop.ids", &OBJECT).unwrap();

        let logs: Vec<Arc<Mutex<Vec<u64>>>> = (0..3).map(|_| Arc::default()).collect();
        let subs: Vec<_> = logs
            .iter()
            .map(|log| {
                let log = log.clone();
                bus.subscription_fn(move |msg: PubSubMsg| log.lock().unwrap().push(msg.msg_id()))
            })
            .collect();

        let mut issued = Vec::new();
        let mut subscribed = [false; 3];
        let mut expected: Vec<Vec<u64>> = vec![Vec::new(); 3];

        for step in steps {
            match step {
                Step::Publish => {
                    let report = topic.publish(1u8).unwrap();
                    if let Some(id) = report.msg_id {
                        issued.push(id);
                        for (i, on) in subscribed.iter().enumerate() {
                            if *on {
                                expected[i].push(id);
                            }
                        }
                    }
                    prop_assert_eq!(report.delivered, subscribed.iter().filter(|s| **s).count());
                }
                Step::Subscribe(i) => {
                    subs[i].subscribe_to_topic("prop.ids", true).unwrap();
                    subscribed[i] = true;
                }
                Step::Unsubscribe(i) => {
                    subs[i].unsubscribe_from_topic("prop.ids");
                    subscribed[i] = false;
                }
            }
        }

        prop_assert!(issued.windows(2).all(|w| w[1] == w[0] + 1));
        for (log, want) in logs.iter().zip(&expected) {
            let got = log.lock().unwrap().clone();
            prop_assert!(got.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(&got, want);
        }
    }

    /// Нагрузка уничтожается ровно один раз после того, как её отпустили все
    /// K читателей, в любом порядке.
    #[test]
    fn prop_destroyed_exactly_once(
        readers in 1..6usize,
        order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let bus = PubSub::default();
        let topic = bus.create_topic("prop.drop", &COUNTED).unwrap();
        let subs: Vec<_> = (0..readers)
            .map(|_| {
                let sub = bus.async_subscriber(AsyncOptions::default());
                sub.subscribe_to("prop.drop", true).unwrap();
                sub
            })
            .collect();

        let drops = Arc::new(AtomicUsize::new(0));
        topic.publish(Counted(drops.clone())).unwrap();

        let mut msgs: Vec<Option<PubSubMsg>> = subs
            .iter()
            .map(|s| s.get_next_msg(Duration::ZERO).unwrap())
            .collect();

        let release: Vec<usize> = order.into_iter().filter(|i| *i < readers).collect();
        for (n, i) in release.iter().enumerate() {
            prop_assert_eq!(drops.load(Ordering::SeqCst), 0);
            msgs[*i].take().unwrap().discard();
            if n + 1 < readers {
                prop_assert_eq!(drops.load(Ordering::SeqCst), 0);
            }
        }
        prop_assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    /// Переполненная очередь хранит последние `capacity` сообщений, а
    /// каждая выброшенная нагрузка уничтожается ровно один раз.
    #[test]
    fn prop_overflow_keeps_newest(capacity in 1..8usize, published in 0..32usize) {
        let bus = PubSub::default();
        let topic = bus.create_topic("prop.queue", &COUNTED).unwrap();
        let reader = bus.async_subscriber(AsyncOptions::with_capacity(capacity));
        reader.subscribe_to("prop.queue", true).unwrap();

        let drops = Arc::new(AtomicUsize::new(0));
        for _ in 0..published {
            topic.publish(Counted(drops.clone())).unwrap();
        }

        let kept = published.min(capacity);
        let dropped = published - kept;
        prop_assert_eq!(reader.msg_count(), kept);
        prop_assert_eq!(reader.dropped_count(), dropped as u64);
        prop_assert_eq!(drops.load(Ordering::SeqCst), dropped);

        let ids: Vec<u64> = std::iter::from_fn(|| reader.get_next_msg(Duration::ZERO).unwrap())
            .map(|m| m.msg_id())
            .collect();
        let want: Vec<u64> = ((dropped as u64 + 1)..=(published as u64)).collect();
        prop_assert_eq!(ids, want);
        prop_assert_eq!(drops.load(Ordering::SeqCst), published);
    }
}
