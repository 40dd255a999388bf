//! Observable values that notify subscribers when they change.

use std::fmt::{self, Debug};
use std::ops::{Add, AddAssign, Not};
use std::sync::Arc;

use alot::{LotId, Lots};
use parking_lot::Mutex;

/// An instance of a value that provides APIs to observe and react to its
/// contents.
///
/// Cloning a `Dynamic` produces another handle to the same value. Change
/// callbacks are invoked synchronously, one pass at a time. A change made
/// while a pass is running, by a callback or by another thread, is delivered
/// by that pass once it finishes, so the last contents observed by every
/// callback are always the current contents.
pub struct Dynamic<T>(Arc<DynamicData<T>>);

struct DynamicData<T> {
    state: Mutex<State<T>>,
    callbacks: Arc<ChangeCallbacks<T>>,
}

struct State<T> {
    value: T,
    generation: Generation,
}

impl<T> Dynamic<T>
where
    T: Send + 'static,
{
    /// Creates a new instance wrapping `value`.
    pub fn new(value: T) -> Self {
        Self(Arc::new(DynamicData {
            state: Mutex::new(State {
                value,
                generation: Generation::default(),
            }),
            callbacks: Arc::default(),
        }))
    }

    /// Returns a clone of the currently contained value.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.map_ref(T::clone)
    }

    /// Maps the contents with read-only access.
    pub fn map_ref<R>(&self, map: impl FnOnce(&T) -> R) -> R {
        let state = self.0.state.lock();
        map(&state.value)
    }

    /// Maps the contents with exclusive access. Subscribers are notified
    /// after `map` returns, even if the value was not modified.
    pub fn map_mut<R>(&self, map: impl FnOnce(&mut T) -> R) -> R
    where
        T: Clone,
    {
        let mut state = self.0.state.lock();
        let result = map(&mut state.value);
        state.generation = state.generation.next();
        drop(state);
        self.notify();
        result
    }

    /// Stores `new_value`, returning the previous value if the contents were
    /// changed.
    ///
    /// If `new_value` is equal to the current contents, nothing is stored, no
    /// subscriber is notified, and `None` is returned.
    pub fn replace(&self, new_value: T) -> Option<T>
    where
        T: PartialEq + Clone,
    {
        let mut state = self.0.state.lock();
        if state.value == new_value {
            return None;
        }
        let old = std::mem::replace(&mut state.value, new_value);
        state.generation = state.generation.next();
        drop(state);
        self.notify();
        Some(old)
    }

    /// Stores `new_value`, notifying subscribers if the contents changed.
    pub fn set(&self, new_value: T)
    where
        T: PartialEq + Clone,
    {
        let _old = self.replace(new_value);
    }

    /// Returns the number of times this value has been changed.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.0.state.lock().generation
    }

    /// Invokes `for_each` each time this value changes.
    ///
    /// `for_each` is not invoked with the current contents. The callback stays
    /// installed until the returned handle is dropped.
    pub fn for_each<F>(&self, for_each: F) -> CallbackHandle
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = self
            .0
            .callbacks
            .callbacks
            .lock()
            .push(Arc::new(Mutex::new(Box::new(for_each))));
        CallbackHandle(CallbackHandleInner::Single(CallbackHandleData {
            id: Some(id),
            callbacks: self.0.callbacks.clone(),
        }))
    }

    /// Returns a new dynamic that stores the result of `map` for each value
    /// this dynamic contains.
    ///
    /// The returned value stays connected to `self` for as long as `self` is
    /// alive.
    pub fn map_each<R, F>(&self, mut map: F) -> Dynamic<R>
    where
        F: FnMut(&T) -> R + Send + 'static,
        R: PartialEq + Clone + Send + 'static,
    {
        let mapped = Dynamic::new(self.map_ref(&mut map));
        self.for_each({
            let mapped = mapped.clone();
            move |value| mapped.set(map(value))
        })
        .persist();
        mapped
    }

    fn notify(&self)
    where
        T: Clone,
    {
        let callbacks = &self.0.callbacks;
        {
            let mut pass = callbacks.pass.lock();
            if pass.running {
                // Only one pass runs at a time, whether it was started by a
                // callback of this value or by another thread. The running
                // pass delivers the latest contents once it finishes.
                pass.pending = true;
                return;
            }
            pass.running = true;
        }
        let _running = PassGuard(&callbacks.pass);

        loop {
            let value = self.get();
            let installed = callbacks
                .callbacks
                .lock()
                .entries()
                .map(|(id, callback)| (id, callback.clone()))
                .collect::<Vec<_>>();
            for (id, callback) in installed {
                // Skip callbacks that were uninstalled by an earlier callback
                // in this pass.
                if callbacks.callbacks.lock().get(id).is_none() {
                    continue;
                }
                let mut callback = callback.lock();
                callback(&value);
            }

            let mut pass = callbacks.pass.lock();
            if !pass.pending {
                pass.running = false;
                break;
            }
            pass.pending = false;
        }
    }
}

impl Dynamic<bool> {
    /// Inverts the contained boolean.
    pub fn toggle(&self) {
        self.map_mut(|value| *value = value.not());
    }
}

impl<T> Clone for Dynamic<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Dynamic<T>
where
    T: Default + Send + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Debug for Dynamic<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.lock();
        f.debug_struct("Dynamic")
            .field("value", &state.value)
            .field("generation", &state.generation)
            .finish()
    }
}

impl<T> PartialEq for Dynamic<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for Dynamic<T> {}

impl From<&str> for Dynamic<String> {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for Dynamic<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A counter that increments each time a [`Dynamic`] is changed.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Generation(usize);

impl Generation {
    /// Returns the next generation.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

type BoxedCallback<T> = Arc<Mutex<Box<dyn FnMut(&T) + Send>>>;

struct ChangeCallbacks<T> {
    callbacks: Mutex<Lots<BoxedCallback<T>>>,
    pass: Mutex<PassState>,
}

impl<T> Default for ChangeCallbacks<T> {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(Lots::new()),
            pass: Mutex::default(),
        }
    }
}

#[derive(Default)]
struct PassState {
    running: bool,
    pending: bool,
}

/// Ends the pass if a callback panics.
struct PassGuard<'a>(&'a Mutex<PassState>);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            *self.0.lock() = PassState::default();
        }
    }
}

trait CallbackCollection: Send + Sync + 'static {
    fn remove(&self, id: LotId);
}

impl<T> CallbackCollection for ChangeCallbacks<T>
where
    T: Send + 'static,
{
    fn remove(&self, id: LotId) {
        // The boxed callback may be the one currently executing; dropping our
        // reference is enough since the executor holds its own clone.
        let removed = self.callbacks.lock().remove(id);
        drop(removed);
    }
}

/// A handle to a callback installed on a [`Dynamic`]. When dropped, the
/// callback will be uninstalled.
///
/// To prevent the callback from ever being uninstalled, use
/// [`Self::persist()`].
#[must_use = "Callbacks are disconnected once the associated CallbackHandle is dropped. Consider using `CallbackHandle::persist()` to prevent the callback from being disconnected."]
#[derive(Default)]
pub struct CallbackHandle(CallbackHandleInner);

#[derive(Default)]
enum CallbackHandleInner {
    #[default]
    None,
    Single(CallbackHandleData),
    Multi(Vec<CallbackHandleData>),
}

struct CallbackHandleData {
    id: Option<LotId>,
    callbacks: Arc<dyn CallbackCollection>,
}

impl CallbackHandle {
    /// Persists the callback so that it will always be invoked until the
    /// dynamic is freed.
    pub fn persist(self) {
        match self.0 {
            CallbackHandleInner::None => {}
            CallbackHandleInner::Single(handle) => handle.persist(),
            CallbackHandleInner::Multi(handles) => {
                for handle in handles {
                    handle.persist();
                }
            }
        }
    }

    /// Returns the number of callbacks this handle keeps installed.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.0 {
            CallbackHandleInner::None => 0,
            CallbackHandleInner::Single(_) => 1,
            CallbackHandleInner::Multi(handles) => handles.len(),
        }
    }

    /// Returns true if this handle keeps no callbacks installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple("CallbackHandle");
        match &self.0 {
            CallbackHandleInner::None => {}
            CallbackHandleInner::Single(handle) => {
                tuple.field(&handle.id);
            }
            CallbackHandleInner::Multi(handles) => {
                for handle in handles {
                    tuple.field(&handle.id);
                }
            }
        }

        tuple.finish()
    }
}

impl CallbackHandleData {
    fn persist(mut self) {
        let _id = self.id.take();
        drop(self);
    }
}

impl Drop for CallbackHandleData {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.callbacks.remove(id);
        }
    }
}

impl Add for CallbackHandle {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign for CallbackHandle {
    fn add_assign(&mut self, rhs: Self) {
        let this = std::mem::take(&mut self.0);
        self.0 = match (this, rhs.0) {
            (this, CallbackHandleInner::None) => this,
            (CallbackHandleInner::None, other) => other,
            (CallbackHandleInner::Single(this), CallbackHandleInner::Single(other)) => {
                CallbackHandleInner::Multi(vec![this, other])
            }
            (CallbackHandleInner::Single(this), CallbackHandleInner::Multi(mut others)) => {
                others.insert(0, this);
                CallbackHandleInner::Multi(others)
            }
            (CallbackHandleInner::Multi(mut these), CallbackHandleInner::Single(other)) => {
                these.push(other);
                CallbackHandleInner::Multi(these)
            }
            (CallbackHandleInner::Multi(mut these), CallbackHandleInner::Multi(others)) => {
                these.extend(others);
                CallbackHandleInner::Multi(these)
            }
        };
    }
}

#[test]
fn set_notifies_only_on_change() {
    let value = Dynamic::new(1);
    let observed = Arc::new(Mutex::new(Vec::new()));
    let _handle = value.for_each({
        let observed = observed.clone();
        move |value| observed.lock().push(*value)
    });

    value.set(1);
    value.set(2);
    value.set(2);
    value.set(3);
    assert_eq!(*observed.lock(), [2, 3]);
    assert_eq!(value.generation(), Generation::default().next().next());
}

#[test]
fn dropping_handle_uninstalls_callback() {
    let value = Dynamic::new(false);
    let count = Dynamic::new(0_usize);
    let handle = value.for_each({
        let count = count.clone();
        move |_| count.map_mut(|count| *count += 1)
    });

    value.toggle();
    assert_eq!(count.get(), 1);
    drop(handle);
    value.toggle();
    assert_eq!(count.get(), 1);
}

#[test]
fn persisted_callback_keeps_running() {
    let value = Dynamic::new(0);
    let doubled = value.map_each(|value| value * 2);
    value.set(21);
    assert_eq!(doubled.get(), 42);
}

#[test]
fn callback_may_change_observed_value() {
    let value = Dynamic::new(0_u32);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _handle = value.for_each({
        let value = value.clone();
        let seen = seen.clone();
        move |current| {
            seen.lock().push(*current);
            if *current < 3 {
                value.set(current + 1);
            }
        }
    });

    value.set(1);
    assert_eq!(value.get(), 3);
    assert_eq!(*seen.lock(), [1, 2, 3]);
}

#[test]
fn changes_from_other_threads_are_delivered_in_order() {
    use std::sync::Barrier;

    let value = Dynamic::new(0);
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _handle = value.for_each({
        let entered = entered.clone();
        let release = release.clone();
        let seen = seen.clone();
        move |current| {
            if *current == 1 {
                entered.wait();
                release.wait();
            }
            seen.lock().push(*current);
        }
    });

    let first = std::thread::spawn({
        let value = value.clone();
        move || value.set(1)
    });
    entered.wait();
    // The first pass is still delivering 1.
    value.set(2);
    release.wait();
    first.join().unwrap();

    assert_eq!(*seen.lock(), [1, 2]);
    assert_eq!(seen.lock().last().copied(), Some(value.get()));
}

#[test]
fn callback_may_drop_its_own_handle() {
    let value = Dynamic::new(0);
    let slot = Arc::new(Mutex::new(None::<CallbackHandle>));
    let count = Arc::new(Mutex::new(0));
    *slot.lock() = Some(value.for_each({
        let slot = slot.clone();
        let count = count.clone();
        move |_| {
            *count.lock() += 1;
            drop(slot.lock().take());
        }
    }));

    value.set(1);
    value.set(2);
    assert_eq!(*count.lock(), 1);
}

#[test]
fn combined_handles() {
    let a = Dynamic::new(0);
    let b = Dynamic::new(0);
    let mut handles = CallbackHandle::default();
    assert!(handles.is_empty());
    handles += a.for_each(|_| {});
    handles += b.for_each(|_| {});
    assert_eq!(handles.len(), 2);
}
