use std::{
    fmt,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Событие с ручным сбросом.
///
/// Остаётся установленным, пока его явно не сбросят. Асинхронный подписчик
/// устанавливает своё событие, когда очередь становится непустой, и
/// сбрасывает, когда её вычитали.
#[derive(Clone)]
pub struct WaitEvent {
    inner: Arc<EventInner>,
}

struct EventInner {
    state: Mutex<EventState>,
    cond: Condvar,
}

struct EventState {
    signaled: bool,
    watchers: Vec<Weak<WaitSetInner>>,
}

/// Ожидание любого из нескольких событий.
///
/// ```
/// use std::time::Duration;
///
/// use topicbus::pubsub::{WaitEvent, WaitSet};
///
/// let a = WaitEvent::new(false);
/// let b = WaitEvent::new(false);
/// let mut set = WaitSet::new();
/// set.add(&a);
/// let idx = set.add(&b);
///
/// b.set();
/// assert_eq!(set.wait_any(Duration::from_millis(10)), Some(idx));
/// ```
#[derive(Default)]
pub struct WaitSet {
    inner: Arc<WaitSetInner>,
    events: Vec<WaitEvent>,
}

#[derive(Default)]
struct WaitSetInner {
    generation: Mutex<u64>,
    cond: Condvar,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl WaitEvent {
    pub fn new(initially_set: bool) -> Self {
        Self {
            inner: Arc::new(EventInner {
                state: Mutex::new(EventState {
                    signaled: initially_set,
                    watchers: Vec::new(),
                }),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn set(&self) {
        let watchers = {
            let mut state = self.inner.state.lock();
            if state.signaled {
                return;
            }
            state.signaled = true;
            self.inner.cond.notify_all();
            state.watchers.retain(|w| w.strong_count() > 0);
            state.watchers.clone()
        };

        for watcher in watchers {
            if let Some(set) = watcher.upgrade() {
                set.wake();
            }
        }
    }

    pub fn reset(&self) {
        self.inner.state.lock().signaled = false;
    }

    pub fn is_set(&self) -> bool {
        self.inner.state.lock().signaled
    }

    /// Ждёт установки события. Возвращает `true`, если событие установлено.
    pub fn wait(
        &self,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.state.lock();
        while !state.signaled {
            if !wait_until(&self.inner.cond, &mut state, deadline) {
                break;
            }
        }
        state.signaled
    }

    pub fn ptr_eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Мёртвые наборы вычищаются здесь же, иначе событие, которое долго
    /// не устанавливают, копило бы их без предела.
    fn watch(
        &self,
        set: &Arc<WaitSetInner>,
    ) {
        let mut state = self.inner.state.lock();
        state.watchers.retain(|w| w.strong_count() > 0);
        state.watchers.push(Arc::downgrade(set));
    }
}

impl WaitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет событие и возвращает его индекс в наборе.
    pub fn add(
        &mut self,
        event: &WaitEvent,
    ) -> usize {
        event.watch(&self.inner);
        self.events.push(event.clone());
        self.events.len() - 1
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Ждёт, пока установится любое событие набора. Возвращает индекс
    /// первого установленного или `None` по таймауту.
    pub fn wait_any(
        &self,
        timeout: Duration,
    ) -> Option<usize> {
        let deadline = Instant::now().checked_add(timeout);
        let mut generation = self.inner.generation.lock();
        loop {
            if let Some(idx) = self.first_set() {
                return Some(idx);
            }
            if !wait_until(&self.inner.cond, &mut generation, deadline) {
                return self.first_set();
            }
        }
    }

    fn first_set(&self) -> Option<usize> {
        self.events.iter().position(WaitEvent::is_set)
    }
}

impl WaitSetInner {
    fn wake(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }
}

/// Одно ожидание на condvar с необязательным дедлайном. Возвращает
/// `false`, если дедлайн прошёл.
pub(crate) fn wait_until<T>(
    cond: &Condvar,
    guard: &mut MutexGuard<'_, T>,
    deadline: Option<Instant>,
) -> bool {
    match deadline {
        Some(deadline) => !cond.wait_until(guard, deadline).timed_out(),
        None => {
            cond.wait(guard);
            true
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for WaitEvent {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for WaitEvent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WaitEvent")
            .field("signaled", &self.is_set())
            .finish()
    }
}

impl fmt::Debug for WaitSet {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WaitSet")
            .field("events", &self.events)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
