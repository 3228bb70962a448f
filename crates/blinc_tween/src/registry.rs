//! Tween Registry
//!
//! The registry owns every scheduled tweenable and is advanced by the host,
//! once per frame or at whatever rate it chooses. Callers keep a
//! [`TweenHandle`] to control and observe a tween without touching its
//! internal timing state.
//!
//! User callbacks run without the registry lock held. A tween that is being
//! advanced (or is running a command) is marked busy; commands aimed at a busy
//! tween, and unregistrations issued during a pass, are queued and applied
//! once it is safe. Tweens registered during a pass join on the next one.

use crate::config::{validate_time_scale, RegistryConfig, TweenConfig};
use crate::curve::{CurveId, CurveTable, EaseCurve, SampledCurve};
use crate::error::{CallbackFailure, CallbackKind, Result, TweenError};
use crate::lifecycle::{guard, Failures, TweenState};
use crate::tween::{Tween, Tweenable};
use crate::values::Interpolate;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

// ============================================================================
// Global Registry
// ============================================================================

static GLOBAL_REGISTRY: OnceLock<RegistryHandle> = OnceLock::new();

/// Install a process-wide default registry handle.
///
/// The registry itself stays owned by the host; this only stores a weak
/// handle for call sites that cannot receive one explicitly.
pub fn set_global_registry(handle: RegistryHandle) -> Result<()> {
    GLOBAL_REGISTRY
        .set(handle)
        .map_err(|_| TweenError::GlobalRegistryAlreadySet)
}

/// The default registry handle, if one was installed
pub fn try_global_registry() -> Option<RegistryHandle> {
    GLOBAL_REGISTRY.get().cloned()
}

pub fn is_global_registry_set() -> bool {
    GLOBAL_REGISTRY.get().is_some()
}

new_key_type! {
    /// Stable identity of a registered tweenable
    pub struct TweenId;
}

/// Last observed state of a registered tweenable
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TweenStatus {
    pub state: TweenState,
    pub progress: f32,
}

impl TweenStatus {
    fn of(tweenable: &dyn Tweenable) -> Self {
        Self {
            state: tweenable.state(),
            progress: tweenable.progress(),
        }
    }
}

/// Receives callback failures caught during a pass or a command
pub type DiagnosticsSink = Arc<dyn Fn(&CallbackFailure) + Send + Sync>;

fn default_sink() -> DiagnosticsSink {
    Arc::new(|failure: &CallbackFailure| tracing::error!("{}", failure))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type TweenCell = Arc<Mutex<Box<dyn Tweenable>>>;
type StatusCell = Arc<Mutex<TweenStatus>>;

struct Slot {
    tween: TweenCell,
    status: StatusCell,
}

/// Call into a tweenable and refresh its status cell.
///
/// Returns `None` when the call panicked; the entry is then stopped and marked
/// completed so the next prune drops it.
fn drive<R>(
    cell: &TweenCell,
    status: &StatusCell,
    f: impl FnOnce(&mut dyn Tweenable) -> R,
) -> (Option<R>, Failures) {
    let mut tween = lock(cell);
    match guard(CallbackKind::Tweenable, || f(&mut **tween)) {
        Ok(outcome) => {
            *lock(status) = TweenStatus::of(&**tween);
            (Some(outcome), tween.take_failures())
        }
        Err(failure) => {
            let mut failures = guard(CallbackKind::Tweenable, || {
                tween.stop(true);
                tween.take_failures()
            })
            .unwrap_or_else(|stop_failure| {
                let mut failures = Failures::new();
                failures.push(stop_failure);
                failures
            });
            failures.insert(0, failure);
            lock(status).state = TweenState::Completed;
            (None, failures)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Command {
    Play,
    Pause,
    Resume,
    Stop { invoke_end: bool },
    Reset,
    Unregister,
}

enum Deferred {
    Tween(TweenId, Command),
    Clear { invoke_end: bool, close: bool },
}

struct RegistryState {
    config: RegistryConfig,
    slots: SlotMap<TweenId, Slot>,
    /// Registration order of tweens taking part in passes
    order: Vec<TweenId>,
    /// Registered during the current pass; appended to `order` when it ends
    joining: Vec<TweenId>,
    deferred: VecDeque<Deferred>,
    /// Tweens whose lock is currently held by the registry
    busy: SmallVec<[TweenId; 4]>,
    advancing: bool,
    shutting_down: bool,
    curves: CurveTable,
    diagnostics: DiagnosticsSink,
}

impl RegistryState {
    fn is_quiet(&self) -> bool {
        !self.advancing && self.busy.is_empty()
    }

    fn release(&mut self, id: TweenId) {
        self.busy.retain(|busy| *busy != id);
    }

    /// Ids in registration order, including tweens joining this pass
    fn ordered_ids(&self) -> impl Iterator<Item = TweenId> + '_ {
        self.order.iter().chain(self.joining.iter()).copied()
    }
}

struct Shared {
    state: Mutex<RegistryState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        lock(&self.state)
    }

    fn insert(self: &Arc<Self>, tweenable: Box<dyn Tweenable>) -> Result<TweenHandle> {
        let status = Arc::new(Mutex::new(TweenStatus::of(&*tweenable)));
        let mut state = self.lock();
        if state.shutting_down {
            return Err(TweenError::ShuttingDown);
        }

        let id = state.slots.insert(Slot {
            tween: Arc::new(Mutex::new(tweenable)),
            status: status.clone(),
        });
        if state.advancing {
            state.joining.push(id);
        } else {
            state.order.push(id);
        }
        tracing::debug!("registered tween {:?}", id);

        Ok(TweenHandle {
            id,
            status,
            registry: Arc::downgrade(self),
        })
    }

    fn handle_for(self: &Arc<Self>, id: TweenId) -> Option<TweenHandle> {
        self.lock().slots.get(id).map(|slot| TweenHandle {
            id,
            status: slot.status.clone(),
            registry: Arc::downgrade(self),
        })
    }

    /// Run a command now, or queue it when the target is busy.
    ///
    /// `Ok(false)` means the command was ignored because of the tween's state.
    fn apply(&self, id: TweenId, command: Command) -> Result<bool> {
        let (cell, status) = {
            let mut state = self.lock();
            let slot = state.slots.get(id).ok_or(TweenError::UnknownTween(id))?;
            let (cell, status) = (slot.tween.clone(), slot.status.clone());

            let defer = state.busy.contains(&id)
                || (command == Command::Unregister && state.advancing);
            if defer {
                let outcome = predict(command, lock(&status).state)?;
                state.deferred.push_back(Deferred::Tween(id, command));
                tracing::trace!("deferred {:?} on tween {:?}", command, id);
                return Ok(outcome);
            }

            if command == Command::Unregister {
                state.slots.remove(id);
                state.order.retain(|other| *other != id);
                state.joining.retain(|other| *other != id);
                tracing::debug!("unregistered tween {:?}", id);
            } else {
                state.busy.push(id);
            }
            (cell, status)
        };

        let (outcome, failures) = drive(&cell, &status, |tween| match command {
            Command::Play => tween.play().map(|_| true),
            Command::Pause => Ok(tween.pause()),
            Command::Resume => Ok(tween.resume()),
            Command::Stop { invoke_end } => {
                tween.stop(invoke_end);
                Ok(true)
            }
            Command::Reset => {
                tween.reset();
                Ok(true)
            }
            Command::Unregister => {
                tween.stop(false);
                Ok(true)
            }
        });

        if command != Command::Unregister {
            self.lock().release(id);
        }
        self.report(id, failures);
        self.flush_deferred();
        outcome.unwrap_or(Ok(false))
    }

    fn advance(&self, delta: f32) -> usize {
        self.flush_deferred();

        let (snapshot, delta) = {
            let mut state = self.lock();
            if state.advancing {
                tracing::warn!("advance() called during a pass; ignored");
                return 0;
            }
            state.advancing = true;
            let delta = scaled_delta(&state.config, delta);
            (state.order.clone(), delta)
        };
        let mut pass = Pass {
            shared: self,
            current: None,
        };

        let mut advanced = 0;
        for id in snapshot {
            let (cell, status) = {
                let mut state = self.lock();
                if state.busy.contains(&id) {
                    continue;
                }
                let Some(slot) = state.slots.get(id) else {
                    continue;
                };
                let entry = (slot.tween.clone(), slot.status.clone());
                state.busy.push(id);
                entry
            };
            pass.current = Some(id);

            let (_, failures) = drive(&cell, &status, |tween| tween.advance(delta));
            advanced += 1;

            self.lock().release(id);
            pass.current = None;
            self.report(id, failures);
        }

        let pruned = {
            let mut state = self.lock();
            let state = &mut *state;
            let before = state.order.len();
            let slots = &mut state.slots;
            let deferred = &state.deferred;
            state.order.retain(|id| {
                let terminal = slots
                    .get(*id)
                    .map(|slot| lock(&slot.status).state.is_terminal())
                    .unwrap_or(true);
                // Queued commands (a reset from an end callback) get to run first
                let queued = deferred
                    .iter()
                    .any(|d| matches!(d, Deferred::Tween(other, _) if other == id));
                if terminal && !queued {
                    slots.remove(*id);
                    return false;
                }
                slots.contains_key(*id)
            });
            let pruned = before - state.order.len();
            let joining = std::mem::take(&mut state.joining);
            state.order.extend(joining);
            state.advancing = false;
            pruned
        };
        drop(pass);
        tracing::trace!("registry pass advanced {} tweens, pruned {}", advanced, pruned);

        self.flush_deferred();
        advanced
    }

    fn clear(&self, invoke_end: bool, close: bool) {
        let removed: Vec<(TweenId, Slot)> = {
            let mut state = self.lock();
            if !state.is_quiet() {
                state.shutting_down |= close;
                state.deferred.push_back(Deferred::Clear { invoke_end, close });
                return;
            }
            state.shutting_down = true;
            let ids: Vec<TweenId> = state.ordered_ids().collect();
            let removed: Vec<(TweenId, Slot)> = ids
                .into_iter()
                .filter_map(|id| state.slots.remove(id).map(|slot| (id, slot)))
                .collect();
            state.slots.clear();
            state.order.clear();
            state.joining.clear();
            state.deferred.clear();
            removed
        };

        let count = removed.len();
        for (id, slot) in removed {
            let (_, failures) = drive(&slot.tween, &slot.status, |tween| tween.stop(invoke_end));
            self.report(id, failures);
        }

        self.lock().shutting_down = close;
        tracing::debug!(
            "registry cleared {} tweens (invoke_end: {}, closed: {})",
            count,
            invoke_end,
            close
        );
    }

    /// Apply queued commands while nothing is busy
    fn flush_deferred(&self) {
        loop {
            let next = {
                let mut state = self.lock();
                if !state.is_quiet() {
                    return;
                }
                match state.deferred.pop_front() {
                    Some(next) => next,
                    None => return,
                }
            };

            match next {
                Deferred::Tween(id, command) => {
                    if let Err(err) = self.apply(id, command) {
                        tracing::debug!("deferred {:?} on tween {:?} dropped: {}", command, id, err);
                    }
                }
                Deferred::Clear { invoke_end, close } => self.clear(invoke_end, close),
            }
        }
    }

    fn report(&self, id: TweenId, failures: Failures) {
        if failures.is_empty() {
            return;
        }
        let sink = self.lock().diagnostics.clone();
        for mut failure in failures {
            failure.tween = Some(id);
            if panic::catch_unwind(AssertUnwindSafe(|| sink(&failure))).is_err() {
                tracing::error!("diagnostics sink panicked while reporting: {}", failure);
            }
        }
    }

    fn count(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|slot| !lock(&slot.status).state.is_terminal())
            .count()
    }

    fn running_tweens(self: &Arc<Self>) -> RunningTweens {
        let state = self.lock();
        let handles: Vec<TweenHandle> = state
            .ordered_ids()
            .filter_map(|id| {
                let slot = state.slots.get(id)?;
                if !lock(&slot.status).state.is_active() {
                    return None;
                }
                Some(TweenHandle {
                    id,
                    status: slot.status.clone(),
                    registry: Arc::downgrade(self),
                })
            })
            .collect();
        RunningTweens {
            inner: handles.into_iter(),
        }
    }

    fn set_all(&self, command: Command) -> usize {
        let ids: Vec<TweenId> = {
            let state = self.lock();
            state
                .ordered_ids()
                .filter(|id| {
                    state
                        .slots
                        .get(*id)
                        .is_some_and(|slot| lock(&slot.status).state.is_active())
                })
                .collect()
        };
        ids.into_iter()
            .filter(|id| matches!(self.apply(*id, command), Ok(true)))
            .count()
    }
}

/// Marks a pass in progress and leaves the registry usable if it unwinds
struct Pass<'a> {
    shared: &'a Shared,
    /// Tween currently marked busy by this pass
    current: Option<TweenId>,
}

impl Drop for Pass<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let mut state = self.shared.lock();
        if let Some(id) = self.current.take() {
            state.release(id);
        }
        let joining = std::mem::take(&mut state.joining);
        state.order.extend(joining);
        state.advancing = false;
        tracing::error!("registry pass unwound; state restored");
    }
}

/// Outcome reported for a command that had to be queued
fn predict(command: Command, state: TweenState) -> Result<bool> {
    match command {
        Command::Play if state.is_terminal() => Err(TweenError::Terminal),
        Command::Pause | Command::Resume if !state.is_active() => {
            tracing::warn!("{:?} ignored on {:?} tween", command, state);
            Ok(false)
        }
        _ => Ok(true),
    }
}

/// Reject negative or non-finite deltas, clamp, then apply the time scale
fn scaled_delta(config: &RegistryConfig, delta: f32) -> f32 {
    let mut delta = if delta.is_finite() && delta >= 0.0 {
        delta
    } else {
        tracing::warn!("invalid tick delta {}; treating as 0", delta);
        0.0
    };
    if let Some(max) = config.max_delta {
        delta = delta.min(max.max(0.0));
    }
    delta * config.time_scale
}

// ============================================================================
// Registry
// ============================================================================

/// Owns and advances every registered tweenable
pub struct Registry {
    shared: Arc<Shared>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::from_config_unchecked(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config_unchecked(config))
    }

    fn from_config_unchecked(config: RegistryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState {
                    config,
                    slots: SlotMap::with_key(),
                    order: Vec::new(),
                    joining: Vec::new(),
                    deferred: VecDeque::new(),
                    busy: SmallVec::new(),
                    advancing: false,
                    shutting_down: false,
                    curves: CurveTable::new(),
                    diagnostics: default_sink(),
                }),
            }),
        }
    }

    /// Weak handle for components that register or observe tweens
    pub fn handle(&self) -> RegistryHandle {
        RegistryHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Take ownership of a tweenable and start it.
    ///
    /// Pending tweenables are played on registration; running and paused ones
    /// keep their state. Terminal ones must be reset first.
    pub fn register(&self, tweenable: impl Tweenable + 'static) -> Result<TweenHandle> {
        register(&self.shared, Box::new(tweenable))
    }

    /// Take ownership of a tweenable without starting it
    pub fn spawn(&self, tweenable: impl Tweenable + 'static) -> Result<TweenHandle> {
        spawn(&self.shared, Box::new(tweenable))
    }

    /// Build a tween from a config and register it as pending; call
    /// [`TweenHandle::play`] to start it
    pub fn create_tween<T, S>(
        &self,
        start: T,
        end: T,
        setter: S,
        config: &TweenConfig,
    ) -> Result<TweenHandle>
    where
        T: Interpolate + Send + 'static,
        S: FnMut(T) + Send + 'static,
    {
        create_tween(&self.shared, Tween::interpolate(start, end, setter), config)
    }

    /// Like [`Registry::create_tween`] with an explicit lerp function
    pub fn create_tween_with<T, F, S>(
        &self,
        start: T,
        end: T,
        lerp: F,
        setter: S,
        config: &TweenConfig,
    ) -> Result<TweenHandle>
    where
        T: Send + 'static,
        F: Fn(&T, &T, f32) -> T + Send + Sync + 'static,
        S: FnMut(T) + Send + 'static,
    {
        create_tween(&self.shared, Tween::new(start, end, lerp, setter), config)
    }

    /// Remove a tweenable without firing its end callbacks.
    ///
    /// During a pass the removal takes effect once the pass ends. Returns
    /// false when the id is not registered.
    pub fn unregister(&self, id: TweenId) -> bool {
        self.shared.apply(id, Command::Unregister).is_ok()
    }

    // =========================================================================
    // Ticking
    // =========================================================================

    /// Advance every registered tweenable by `delta` seconds, in
    /// registration order, and prune the ones that reached a terminal state.
    ///
    /// Returns the number of tweenables visited. Calling this from inside a
    /// tween callback is refused.
    pub fn advance(&self, delta: f32) -> usize {
        self.shared.advance(delta)
    }

    /// Stop and remove every tweenable; registration stays open afterwards
    pub fn clear(&self, invoke_end: bool) {
        self.shared.clear(invoke_end, false);
    }

    /// Stop and remove every tweenable and refuse further registrations
    pub fn shutdown(&self, invoke_end: bool) {
        self.shared.clear(invoke_end, true);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.lock().shutting_down
    }

    /// Pause every running tween; returns how many changed
    pub fn pause_all(&self) -> usize {
        self.shared.set_all(Command::Pause)
    }

    /// Resume every paused tween; returns how many changed
    pub fn resume_all(&self) -> usize {
        self.shared.set_all(Command::Resume)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Registered tweenables that are not terminal
    pub fn count(&self) -> usize {
        self.shared.count()
    }

    /// Snapshot of running and paused tweens, in registration order
    pub fn running_tweens(&self) -> RunningTweens {
        self.shared.running_tweens()
    }

    pub fn state(&self, id: TweenId) -> Option<TweenState> {
        let state = self.shared.lock();
        let slot = state.slots.get(id)?;
        let current = lock(&slot.status).state;
        Some(current)
    }

    pub fn contains(&self, id: TweenId) -> bool {
        self.shared.lock().slots.contains_key(id)
    }

    pub fn handle_for(&self, id: TweenId) -> Option<TweenHandle> {
        self.shared.handle_for(id)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn config(&self) -> RegistryConfig {
        self.shared.lock().config.clone()
    }

    pub fn set_time_scale(&self, scale: f32) -> Result<()> {
        validate_time_scale(scale)?;
        self.shared.lock().config.time_scale = scale;
        Ok(())
    }

    pub fn time_scale(&self) -> f32 {
        self.shared.lock().config.time_scale
    }

    /// Clamp applied to a single tick before scaling; `None` disables it
    pub fn set_max_delta(&self, max_delta: Option<f32>) {
        self.shared.lock().config.max_delta = max_delta;
    }

    /// Replace the sink that receives callback failures
    pub fn set_diagnostics<F>(&self, sink: F)
    where
        F: Fn(&CallbackFailure) + Send + Sync + 'static,
    {
        self.shared.lock().diagnostics = Arc::new(sink);
    }

    // =========================================================================
    // Curves
    // =========================================================================

    pub fn register_curve(&self, curve: SampledCurve) -> CurveId {
        self.shared.lock().curves.register(curve)
    }

    /// Tweens already built with the curve keep their copy
    pub fn remove_curve(&self, id: CurveId) -> bool {
        self.shared.lock().curves.remove(id).is_some()
    }

    /// Evaluate a named or registered curve at `t` (unclamped)
    pub fn evaluate_curve(&self, ease: EaseCurve, t: f32) -> Result<f32> {
        self.shared.lock().curves.evaluate(ease, t)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Registry")
            .field("config", &state.config)
            .field("registered", &state.slots.len())
            .field("advancing", &state.advancing)
            .field("shutting_down", &state.shutting_down)
            .finish_non_exhaustive()
    }
}

fn register(shared: &Arc<Shared>, mut tweenable: Box<dyn Tweenable>) -> Result<TweenHandle> {
    match tweenable.state() {
        TweenState::Pending => tweenable.play()?,
        state if state.is_terminal() => return Err(TweenError::Terminal),
        _ => {}
    }
    shared.insert(tweenable)
}

fn spawn(shared: &Arc<Shared>, tweenable: Box<dyn Tweenable>) -> Result<TweenHandle> {
    if tweenable.is_finished() {
        return Err(TweenError::Terminal);
    }
    shared.insert(tweenable)
}

fn create_tween<T: Send + 'static>(
    shared: &Arc<Shared>,
    tween: Tween<T>,
    config: &TweenConfig,
) -> Result<TweenHandle> {
    let tween = {
        let state = shared.lock();
        tween.with_config(config, &state.curves)?
    };
    spawn(shared, Box::new(tween))
}

// ============================================================================
// Handles
// ============================================================================

/// Weak handle to a [`Registry`]
///
/// Handed to components that create tweens. It does not keep the registry
/// alive; every call fails with [`TweenError::RegistryDropped`] once the
/// registry is gone.
#[derive(Clone, Default)]
pub struct RegistryHandle {
    shared: Weak<Shared>,
}

impl RegistryHandle {
    fn shared(&self) -> Result<Arc<Shared>> {
        self.shared.upgrade().ok_or(TweenError::RegistryDropped)
    }

    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }

    pub fn register(&self, tweenable: impl Tweenable + 'static) -> Result<TweenHandle> {
        register(&self.shared()?, Box::new(tweenable))
    }

    pub fn spawn(&self, tweenable: impl Tweenable + 'static) -> Result<TweenHandle> {
        spawn(&self.shared()?, Box::new(tweenable))
    }

    pub fn create_tween<T, S>(
        &self,
        start: T,
        end: T,
        setter: S,
        config: &TweenConfig,
    ) -> Result<TweenHandle>
    where
        T: Interpolate + Send + 'static,
        S: FnMut(T) + Send + 'static,
    {
        create_tween(
            &self.shared()?,
            Tween::interpolate(start, end, setter),
            config,
        )
    }

    pub fn count(&self) -> usize {
        self.shared().map(|shared| shared.count()).unwrap_or(0)
    }

    pub fn running_tweens(&self) -> RunningTweens {
        match self.shared() {
            Ok(shared) => shared.running_tweens(),
            Err(_) => RunningTweens {
                inner: Vec::new().into_iter(),
            },
        }
    }

    pub fn handle_for(&self, id: TweenId) -> Option<TweenHandle> {
        self.shared().ok()?.handle_for(id)
    }
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Control and observation handle for one registered tweenable
///
/// Observation reads a status cell refreshed after every tick and command,
/// so it is cheap to poll and never blocks on a tween that is mid-update.
/// After the tween is pruned the handle keeps reporting its final state.
#[derive(Clone)]
pub struct TweenHandle {
    id: TweenId,
    status: StatusCell,
    registry: Weak<Shared>,
}

impl TweenHandle {
    pub fn id(&self) -> TweenId {
        self.id
    }

    fn apply(&self, command: Command) -> Result<bool> {
        let shared = self.registry.upgrade().ok_or(TweenError::RegistryDropped)?;
        shared.apply(self.id, command)
    }

    /// Start the tween, restarting it when already running or paused
    pub fn play(&self) -> Result<()> {
        self.apply(Command::Play).map(|_| ())
    }

    /// Returns false (and logs) when the tween is not running or paused
    pub fn pause(&self) -> bool {
        self.apply_lenient(Command::Pause)
    }

    /// Returns false (and logs) when the tween is not running or paused
    pub fn resume(&self) -> bool {
        self.apply_lenient(Command::Resume)
    }

    /// Force a terminal state; no-op on a finished or pruned tween
    pub fn stop(&self, invoke_end: bool) {
        if let Err(err) = self.apply(Command::Stop { invoke_end }) {
            tracing::debug!("stop() on tween {:?} ignored: {}", self.id, err);
        }
    }

    /// Return a registered tween to `Pending` so it can be played again
    pub fn reset(&self) -> Result<()> {
        self.apply(Command::Reset).map(|_| ())
    }

    /// Remove the tween from its registry without firing end callbacks
    pub fn unregister(&self) -> bool {
        self.apply(Command::Unregister).is_ok()
    }

    fn apply_lenient(&self, command: Command) -> bool {
        match self.apply(command) {
            Ok(applied) => applied,
            Err(err) => {
                tracing::warn!("{:?} on tween {:?} ignored: {}", command, self.id, err);
                false
            }
        }
    }

    pub fn status(&self) -> TweenStatus {
        *lock(&self.status)
    }

    pub fn state(&self) -> TweenState {
        self.status().state
    }

    /// Progress through the current iteration, 0 to 1
    pub fn progress(&self) -> f32 {
        self.status().progress
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TweenState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state() == TweenState::Paused
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }
}

impl fmt::Debug for TweenHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TweenHandle")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl PartialEq for TweenHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.registry, &other.registry)
    }
}

/// Snapshot of running and paused tweens taken when it was requested.
///
/// Clone it to iterate the same snapshot again.
#[derive(Clone, Debug)]
pub struct RunningTweens {
    inner: std::vec::IntoIter<TweenHandle>,
}

impl Iterator for RunningTweens {
    type Item = TweenHandle;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RunningTweens {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallbackKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recording(registry: &Registry, end: f32) -> (TweenHandle, Arc<Mutex<Vec<f32>>>) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = values.clone();
        let handle = registry
            .create_tween(
                0.0_f32,
                end,
                move |v| sink.lock().unwrap().push(v),
                &TweenConfig::default(),
            )
            .unwrap();
        (handle, values)
    }

    #[test]
    fn test_create_and_play() {
        let registry = Registry::new();
        let (handle, values) = recording(&registry, 10.0);
        assert_eq!(handle.state(), TweenState::Pending);
        assert_eq!(registry.count(), 1);

        handle.play().unwrap();
        registry.advance(0.5);
        assert!((values.lock().unwrap()[0] - 5.0).abs() < 1e-5);
        assert!(handle.is_playing());
        assert!((handle.progress() - 0.5).abs() < 1e-5);

        registry.advance(0.5);
        assert_eq!(*values.lock().unwrap().last().unwrap(), 10.0);
        assert_eq!(handle.state(), TweenState::Completed);
        assert_eq!(registry.count(), 0);
        assert!(!registry.contains(handle.id()));
    }

    #[test]
    fn test_register_plays_pending() {
        let registry = Registry::new();
        let handle = registry
            .register(Tween::interpolate(0.0_f32, 1.0, |_| {}))
            .unwrap();
        assert!(handle.is_playing());
        assert_eq!(registry.state(handle.id()), Some(TweenState::Running));
    }

    #[test]
    fn test_register_rejects_terminal() {
        let registry = Registry::new();
        let mut tween = Tween::interpolate(0.0_f32, 1.0, |_| {});
        tween.play().unwrap();
        tween.stop(false);
        assert_eq!(registry.register(tween).err(), Some(TweenError::Terminal));
    }

    #[test]
    fn test_pause_resume_through_handle() {
        let registry = Registry::new();
        let (handle, values) = recording(&registry, 10.0);
        handle.play().unwrap();
        registry.advance(0.25);

        assert!(handle.pause());
        assert!(handle.is_paused());
        registry.advance(0.5);
        assert_eq!(values.lock().unwrap().len(), 1);

        assert!(handle.resume());
        registry.advance(0.25);
        assert!((values.lock().unwrap()[1] - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_pause_on_finished_is_a_noop() {
        let registry = Registry::new();
        let (handle, _) = recording(&registry, 1.0);
        handle.play().unwrap();
        registry.advance(2.0);

        assert!(!handle.pause());
        assert!(!handle.resume());
        assert_eq!(handle.state(), TweenState::Completed);
    }

    #[test]
    fn test_time_scale_and_max_delta() {
        let registry = Registry::with_config(RegistryConfig {
            time_scale: 0.5,
            max_delta: Some(0.5),
        })
        .unwrap();
        let (handle, values) = recording(&registry, 10.0);
        handle.play().unwrap();

        registry.advance(4.0);
        assert!((values.lock().unwrap()[0] - 2.5).abs() < 1e-5);

        registry.set_time_scale(0.0).unwrap();
        registry.advance(0.5);
        assert!((values.lock().unwrap()[1] - 2.5).abs() < 1e-5);
        assert!(registry.set_time_scale(-1.0).is_err());
    }

    #[test]
    fn test_invalid_delta_is_ignored() {
        let registry = Registry::new();
        let (handle, values) = recording(&registry, 10.0);
        handle.play().unwrap();

        registry.advance(-1.0);
        registry.advance(f32::NAN);
        assert!(values.lock().unwrap().iter().all(|v| *v == 0.0));
        assert!(handle.is_playing());
    }

    #[test]
    fn test_failure_reaches_sink_with_id() {
        let registry = Registry::new();
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        registry.set_diagnostics(move |failure| sink.lock().unwrap().push(failure.clone()));

        let handle = registry
            .register(Tween::interpolate(0.0_f32, 1.0, |_| panic!("nope")))
            .unwrap();
        registry.advance(0.1);

        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].tween, Some(handle.id()));
        assert_eq!(reported[0].kind, CallbackKind::Setter);
        assert_eq!(handle.state(), TweenState::Completed);
    }

    #[test]
    fn test_clear_stops_everything() {
        let registry = Registry::new();
        let ended = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ended = ended.clone();
            registry
                .register(Tween::interpolate(0.0_f32, 1.0, |_| {}).on_end(move || {
                    ended.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        registry.clear(true);
        assert_eq!(registry.count(), 0);
        assert_eq!(ended.load(Ordering::SeqCst), 3);
        assert!(!registry.is_shutting_down());
        assert!(registry
            .register(Tween::interpolate(0.0_f32, 1.0, |_| {}))
            .is_ok());
    }

    #[test]
    fn test_shutdown_rejects_registration() {
        let registry = Registry::new();
        registry.shutdown(false);
        assert!(registry.is_shutting_down());
        assert_eq!(
            registry
                .register(Tween::interpolate(0.0_f32, 1.0, |_| {}))
                .err(),
            Some(TweenError::ShuttingDown)
        );
    }

    #[test]
    fn test_running_tweens_snapshot() {
        let registry = Registry::new();
        let a = registry
            .register(Tween::interpolate(0.0_f32, 1.0, |_| {}))
            .unwrap();
        let (pending, _) = recording(&registry, 1.0);
        let c = registry
            .register(Tween::interpolate(0.0_f32, 1.0, |_| {}))
            .unwrap();
        c.pause();

        let running = registry.running_tweens();
        assert_eq!(running.len(), 2);
        let ids: Vec<TweenId> = running.clone().map(|h| h.id()).collect();
        assert_eq!(ids, vec![a.id(), c.id()]);
        assert!(!ids.contains(&pending.id()));

        // The snapshot does not follow later changes
        a.stop(false);
        assert_eq!(running.count(), 2);
    }

    #[test]
    fn test_pause_all_resume_all() {
        let registry = Registry::new();
        for _ in 0..3 {
            registry
                .register(Tween::interpolate(0.0_f32, 1.0, |_| {}))
                .unwrap();
        }
        assert_eq!(registry.pause_all(), 3);
        assert!(registry.running_tweens().all(|h| h.is_paused()));
        assert_eq!(registry.resume_all(), 3);
        assert!(registry.running_tweens().all(|h| h.is_playing()));
    }

    #[test]
    fn test_unregister_removes_without_end() {
        let registry = Registry::new();
        let ended = Arc::new(AtomicUsize::new(0));
        let e = ended.clone();
        let handle = registry
            .register(Tween::interpolate(0.0_f32, 1.0, |_| {}).on_end(move || {
                e.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(registry.unregister(handle.id()));
        assert!(!registry.contains(handle.id()));
        assert_eq!(ended.load(Ordering::SeqCst), 0);
        assert!(!registry.unregister(handle.id()));
        assert_eq!(handle.play(), Err(TweenError::UnknownTween(handle.id())));
    }

    #[test]
    fn test_handle_outlives_registry() {
        let registry = Registry::new();
        let weak = registry.handle();
        let handle = weak
            .register(Tween::interpolate(0.0_f32, 1.0, |_| {}))
            .unwrap();
        assert_eq!(weak.count(), 1);

        drop(registry);
        assert!(!weak.is_alive());
        assert_eq!(weak.count(), 0);
        assert!(!handle.pause());
        assert_eq!(handle.play(), Err(TweenError::RegistryDropped));
        assert!(handle.is_playing());
    }

    #[test]
    fn test_reset_and_replay_before_prune() {
        let registry = Registry::new();
        let (handle, values) = recording(&registry, 10.0);
        handle.play().unwrap();
        handle.stop(false);
        assert!(handle.is_finished());

        handle.reset().unwrap();
        handle.play().unwrap();
        registry.advance(1.0);
        assert_eq!(*values.lock().unwrap().last().unwrap(), 10.0);
    }

    #[test]
    fn test_custom_curve_through_registry() {
        let registry = Registry::new();
        let curve = registry.register_curve(
            SampledCurve::new([(0.0, 0.0), (0.5, 1.0), (1.0, 1.0)]).unwrap(),
        );
        assert!((registry.evaluate_curve(curve.into(), 0.5).unwrap() - 1.0).abs() < 1e-5);

        let config = TweenConfig::new().with_ease(curve);
        assert!(registry
            .create_tween(0.0_f32, 1.0, |_| {}, &config)
            .is_ok());

        assert!(registry.remove_curve(curve));
        assert_eq!(
            registry.create_tween(0.0_f32, 1.0, |_| {}, &config).err(),
            Some(TweenError::UnknownCurve(curve))
        );
        assert_eq!(
            registry.evaluate_curve(curve.into(), 0.5),
            Err(TweenError::UnknownCurve(curve))
        );
    }
}
