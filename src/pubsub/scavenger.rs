use std::{
    sync::{Arc, Weak},
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};
use topicbus_error::BusResult;
use tracing::{debug, error};

use super::{broker::BusInner, PubSub};

/// Результат одной уборки.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScavengeReport {
    /// Записи реестра, указывавшие на уже уничтоженные топики.
    pub dead_topics: usize,
    /// Записи таблицы подписчиков, чей владелец уже уничтожен.
    pub dead_subscribers: usize,
    /// Сколько раз мёртвый id был убран из набора подписчиков живого топика.
    pub detached_ids: usize,
}

/// Фоновый поток уборки. Останавливается при `stop()` или `drop()`.
pub struct ScavengerHandle {
    stop: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ScavengeReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

impl PubSub {
    /// Убирает мёртвые записи реестра.
    ///
    /// Корректность доставки от уборки не зависит: это только
    /// освобождение памяти. Вызывается также попутно из `create_topic` и
    /// `subscribe_to_topic`, когда истёк `scavenge_interval`.
    pub fn scavenge(&self) -> ScavengeReport {
        let (report, live) = self.registry().lock().sweep();
        drop(live);

        self.metrics().scavenged();
        if !report.is_clean() {
            debug!(
                dead_topics = report.dead_topics,
                dead_subscribers = report.dead_subscribers,
                detached_ids = report.detached_ids,
                "Scavenged registry"
            );
        }
        report
    }

    /// Запускает уборку в фоновом потоке с заданным периодом.
    ///
    /// Поток держит только `Weak` на шину и завершается сам, когда шина
    /// уничтожена.
    pub fn spawn_scavenger(
        &self,
        interval: Duration,
    ) -> BusResult<ScavengerHandle> {
        let stop = Arc::new(StopSignal::default());
        let bus = self.downgrade();
        let signal = stop.clone();

        let thread = thread::Builder::new()
            .name("topicbus-scavenger".to_string())
            .spawn(move || run_scavenger(bus, signal, interval))?;

        debug!(?interval, "Scavenger started");
        Ok(ScavengerHandle {
            stop,
            thread: Some(thread),
        })
    }
}

fn run_scavenger(
    bus: Weak<BusInner>,
    signal: Arc<StopSignal>,
    interval: Duration,
) {
    loop {
        {
            let mut stopped = signal.stopped.lock();
            if !*stopped {
                signal.cond.wait_for(&mut stopped, interval);
            }
            if *stopped {
                break;
            }
        }

        match bus.upgrade() {
            Some(inner) => {
                PubSub::from_inner(inner).scavenge();
            }
            None => break,
        }
    }
    debug!("Scavenger stopped");
}

impl ScavengerHandle {
    /// Останавливает поток и дожидается его завершения.
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        *self.stop.stopped.lock() = true;
        self.stop.cond.notify_all();
        if thread.join().is_err() {
            error!("Scavenger thread panicked");
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ScavengerHandle
////////////////////////////////////////////////////////////////////////////////

impl Drop for ScavengerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
