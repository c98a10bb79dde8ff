use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Счётчики шины. Обновляются без блокировок.
#[derive(Debug, Default)]
pub(crate) struct BusMetrics {
    topics_created: AtomicU64,
    subscribers_registered: AtomicU64,
    messages_published: AtomicU64,
    deliveries: AtomicU64,
    missed_deliveries: AtomicU64,
    type_mismatches: AtomicU64,
    scavenge_runs: AtomicU64,
}

/// Снимок состояния шины.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Топики, у которых есть хотя бы один живой дескриптор.
    pub live_topics: usize,
    /// Записи в таблице подписчиков (включая ещё не вычищенные мёртвые).
    pub subscribers: usize,
    /// Пути, на которые кто-то подписан (вне зависимости от наличия топика).
    pub interest_paths: usize,
    pub topics_created: u64,
    pub subscribers_registered: u64,
    pub messages_published: u64,
    pub deliveries: u64,
    pub missed_deliveries: u64,
    pub type_mismatches: u64,
    pub scavenge_runs: u64,
}

impl BusMetrics {
    pub(crate) fn topic_created(&self) {
        self.topics_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscriber_registered(&self) {
        self.subscribers_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn published(
        &self,
        delivered: usize,
        missed: usize,
    ) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.missed_deliveries
            .fetch_add(missed as u64, Ordering::Relaxed);
    }

    pub(crate) fn type_mismatch(&self) {
        self.type_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn scavenged(&self) {
        self.scavenge_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// Заполняет счётчики в снимке; размеры таблиц добавляет вызывающий.
    pub(crate) fn fill(
        &self,
        stats: &mut BusStats,
    ) {
        stats.topics_created = self.topics_created.load(Ordering::Relaxed);
        stats.subscribers_registered = self.subscribers_registered.load(Ordering::Relaxed);
        stats.messages_published = self.messages_published.load(Ordering::Relaxed);
        stats.deliveries = self.deliveries.load(Ordering::Relaxed);
        stats.missed_deliveries = self.missed_deliveries.load(Ordering::Relaxed);
        stats.type_mismatches = self.type_mismatches.load(Ordering::Relaxed);
        stats.scavenge_runs = self.scavenge_runs.load(Ordering::Relaxed);
    }
}
