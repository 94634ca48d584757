//! Process-wide orchestrator.
//!
//! `Control` owns the connection, the channel registry, the breakpoint
//! set and the simulated clock, and runs two threads:
//!
//! - the *dispatch* thread routes every received message to the queue
//!   named by its channel field, creating queues on first use;
//! - the *command* thread processes the reserved `"ctrl"` channel
//!   (tick/tock keep-alive, break scheduling, configuration, shutdown)
//!   and emits periodic profiling output.
//!
//! There is no hidden global instance: the embedding application creates
//! exactly one `Control` at startup and passes it to whatever needs it
//! (players, recorders, its own clock callback).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use cosim_common::logging::{self, Severity};
use cosim_common::time::freq_to_period;
use cosim_common::{SimFreq, SimTime};
use cosim_wire::{
    decode_loglevel, BreakKind, CtrlMessage, Message, CFG_LOGLEVEL, CTRL_CHANNEL,
};

use crate::breaks::{Break, BreakSet};
use crate::config::BridgeConfig;
use crate::connection::Connection;
use crate::error::BridgeError;
use crate::queue::MessageQueue;

/// Scope tag for control log lines.
const SCOPE: &str = "control";

/// Poll slice of the command and dispatch loops.
const POLL: Duration = Duration::from_millis(100);

/// How long a hold-waiter sleeps before logging that it is still holding.
const HOLD_NOTICE: Duration = Duration::from_secs(2);

/// Profiling bookkeeping, all wall-clock side.
struct Profile {
    wall_start: Instant,
    last_wall: Instant,
    last_sim: SimTime,
    ticks: u64,
}

/// The bridge's central context object. Create one per process with
/// [`Control::start`] and share it as an `Arc`.
pub struct Control {
    connection: Connection,
    channels: Mutex<HashMap<String, Arc<MessageQueue>>>,
    now_ps: AtomicU64,
    tick_period_ps: AtomicU64,
    breaks: BreakSet,
    in_shutdown: AtomicBool,
    profile: Mutex<Profile>,
    profile_interval: Option<Duration>,
}

impl Control {
    /// Create the connection and start the command and dispatch threads.
    pub fn start(config: BridgeConfig) -> Arc<Control> {
        let now = Instant::now();
        let control = Arc::new(Control {
            connection: Connection::new(&config.socket_path),
            channels: Mutex::new(HashMap::new()),
            now_ps: AtomicU64::new(0),
            tick_period_ps: AtomicU64::new(config.tick_period.as_ps()),
            breaks: BreakSet::new(),
            in_shutdown: AtomicBool::new(false),
            profile: Mutex::new(Profile {
                wall_start: now,
                last_wall: now,
                last_sim: SimTime::ZERO,
                ticks: 0,
            }),
            profile_interval: config.profile_interval,
        });

        {
            let control = Arc::clone(&control);
            thread::Builder::new()
                .name("cosim-control".into())
                .spawn(move || control.command_loop())
                .expect("failed to spawn control thread");
        }
        {
            let control = Arc::clone(&control);
            thread::Builder::new()
                .name("cosim-dispatch".into())
                .spawn(move || control.dispatch_loop())
                .expect("failed to spawn dispatch thread");
        }
        control
    }

    /// The queue of a named channel, created on first lookup. Once a name
    /// is referenced it maps to the same queue for the rest of the
    /// process.
    pub fn queue(&self, channel: &str) -> Arc<MessageQueue> {
        let mut channels = self.channels.lock();
        match channels.entry(channel.to_string()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                debug!(channel, "new channel");
                Arc::clone(entry.insert(Arc::new(MessageQueue::new())))
            }
        }
    }

    /// The current simulated time.
    pub fn now(&self) -> SimTime {
        SimTime::from_ps(self.now_ps.load(Ordering::Relaxed))
    }

    /// Record the simulated time the simulator has reached.
    pub fn report_time(&self, now: SimTime) {
        self.now_ps.store(now.as_ps(), Ordering::Relaxed);
    }

    /// Expected simulated time between keep-alive ticks.
    pub fn tick_period(&self) -> SimTime {
        SimTime::from_ps(self.tick_period_ps.load(Ordering::Relaxed))
    }

    /// Configure the expected tick spacing directly.
    pub fn set_tick_period(&self, period: SimTime) {
        self.tick_period_ps.store(period.as_ps(), Ordering::Relaxed);
    }

    /// Configure the expected tick spacing from a tick frequency.
    pub fn set_tick_frequency(&self, freq: SimFreq) {
        self.set_tick_period(freq_to_period(freq));
    }

    /// Whether shutdown has been requested. Adapters poll this between
    /// retries of a timed-out value fetch.
    pub fn is_shutdown(&self) -> bool {
        self.in_shutdown.load(Ordering::SeqCst)
    }

    /// Wall-clock time since the control was started.
    pub fn wall_elapsed(&self) -> Duration {
        self.profile.lock().wall_start.elapsed()
    }

    /// Queue a message for transmission to the peer.
    pub fn push(&self, msg: Message) {
        self.connection.push(msg);
    }

    /// Request shutdown: tell the peer, mark shutdown-in-progress and let
    /// the connection drain its outstanding sends before it stops.
    pub fn shutdown(&self) {
        info!("shutting down");
        self.push(CtrlMessage::Shutdown.to_message());
        self.in_shutdown.store(true, Ordering::SeqCst);
        self.connection.drain();
        // hold-waiters must wake up and observe the shutdown
        self.breaks.cond.notify_all();
    }

    /// Schedule a break.
    pub fn add_break(&self, id: u32, kind: BreakKind, thresh: SimTime, relative: bool) {
        debug!(id, %kind, thresh = %thresh, relative, "add break");
        self.breaks.add(Break::new(id, kind, thresh, relative));
    }

    /// Remove a break. Unknown ids are a hard error — the caller and the
    /// bridge disagree about what is scheduled.
    pub fn remove_break(&self, id: u32) -> Result<(), BridgeError> {
        debug!(id, "remove break");
        self.breaks.remove(id)
    }

    /// A snapshot of the scheduled breaks.
    pub fn breaks(&self) -> Vec<Break> {
        self.breaks.snapshot()
    }

    /// Advance the break state machine and report whether any break of
    /// the given kind is at or past the current time.
    ///
    /// Every pending break (of any kind) is acknowledged here: a relative
    /// threshold is resolved against the current time exactly once,
    /// clamped to not precede it, and reported to the peer. A break of
    /// the queried kind whose threshold has been reached makes the call
    /// return true and is reported as hit the first time.
    pub fn check_break(&self, kind: BreakKind) -> bool {
        let mut list = self.breaks.list.lock();
        self.scan_breaks(kind, &mut list)
    }

    fn scan_breaks(&self, kind: BreakKind, list: &mut [Break]) -> bool {
        let now = self.now();
        let mut active = false;
        for brk in list.iter_mut() {
            if !brk.acked {
                if brk.relative {
                    brk.thresh = now.saturating_add(brk.thresh);
                }
                if brk.thresh < now {
                    brk.thresh = now;
                }
                brk.acked = true;
                debug!(id = brk.id, thresh = %brk.thresh, kind = %brk.kind, "ack break");
                self.push(
                    CtrlMessage::AckBreak {
                        id: brk.id,
                        thresh: brk.thresh,
                    }
                    .to_message(),
                );
            }
            if brk.kind == kind && brk.thresh <= now {
                active = true;
                if !brk.hit {
                    brk.hit = true;
                    info!(id = brk.id, now = %now, thresh = %brk.thresh, "hitting break");
                    self.push(CtrlMessage::HitBreak { id: brk.id, now }.to_message());
                }
            }
        }
        active
    }

    /// Block while any hold break is active. Re-checks on every break-set
    /// change, logs a notice every couple of seconds while held, and
    /// returns early when shutdown is requested.
    pub fn wait_hold(&self) {
        let mut list = self.breaks.list.lock();
        while !self.is_shutdown() && self.scan_breaks(BreakKind::Hold, &mut list) {
            let result = self.breaks.cond.wait_for(&mut list, HOLD_NOTICE);
            if result.timed_out() {
                info!(now = %self.now(), "holding...");
            }
        }
    }

    /// Apply a named configuration value from `set`-command arguments.
    pub fn apply_config(&self, name: &str, args: &[u8]) -> Result<(), BridgeError> {
        match name {
            CFG_LOGLEVEL => {
                let (scope, code) = decode_loglevel(args)?;
                let level = Severity::from_code(code);
                info!(scope = %scope, %level, "setting log level");
                logging::set_level(&scope, level);
                Ok(())
            }
            other => Err(BridgeError::UnknownConfig(other.to_string())),
        }
    }

    fn dispatch_loop(&self) {
        debug!("dispatcher started");
        loop {
            if !self.connection.wait_received(POLL) {
                if self.is_shutdown() && !self.connection.is_running() {
                    break;
                }
                continue;
            }
            let Some(msg) = self.connection.try_pop_received() else {
                continue;
            };
            let queue = self.queue(msg.channel());
            if msg.channel() == CTRL_CHANNEL {
                if logging::enabled(SCOPE, Severity::Trace) {
                    trace!(channel = msg.channel(), "dispatching message");
                }
            } else if logging::enabled(SCOPE, Severity::Debug) {
                debug!(channel = msg.channel(), "dispatching message");
            }
            queue.push(msg);
        }
        debug!("dispatcher stopped");
    }

    fn command_loop(&self) {
        debug!("command processing started");
        let ctrl_queue = self.queue(CTRL_CHANNEL);
        loop {
            if ctrl_queue.wait(POLL) {
                if let Some(msg) = ctrl_queue.try_pop() {
                    self.process_ctrl(&msg);
                }
            }
            self.profile();
            if self.is_shutdown() && !self.connection.is_running() {
                break;
            }
        }
        debug!("command processing stopped");
    }

    fn process_ctrl(&self, msg: &Message) {
        let cmd = match CtrlMessage::decode(msg.payload()) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!("bad control message: {err}");
                return;
            }
        };
        match cmd {
            CtrlMessage::Tick => {
                if logging::enabled(SCOPE, Severity::Trace) {
                    trace!("received tick");
                }
                self.push(CtrlMessage::Tock { now: self.now() }.to_message());
                self.profile.lock().ticks += 1;
            }
            CtrlMessage::AddBreak {
                id,
                thresh,
                cycles: _,
                kind,
                relative,
            } => {
                self.add_break(id, kind, thresh, relative);
            }
            CtrlMessage::RemBreak { id } => {
                if let Err(err) = self.remove_break(id) {
                    error!("remove break: {err}");
                }
            }
            CtrlMessage::Shutdown => {
                info!("received shutdown command");
                self.shutdown();
            }
            CtrlMessage::Set { name, args } => {
                if let Err(err) = self.apply_config(&name, &args) {
                    warn!("set command: {err}");
                }
            }
            CtrlMessage::Exit => {
                warn!("exit command is not supported");
            }
            other => {
                warn!(?other, "unexpected command from peer");
            }
        }
    }

    /// Emit a profiling line when the configured interval has elapsed:
    /// simulated-time throughput, tick pacing against the configured tick
    /// period, and the status of every break.
    fn profile(&self) {
        let Some(interval) = self.profile_interval else {
            return;
        };
        let now_sim = self.now();
        let mut profile = self.profile.lock();
        let spent = profile.last_wall.elapsed();
        if spent < interval {
            return;
        }
        let progressed = now_sim.saturating_sub(profile.last_sim);
        let secs = spent.as_secs_f64();
        let sim_rate = SimTime::from_ps((progressed.as_ps() as f64 / secs) as u64);
        let ticks = profile.ticks;
        let tick_rate = (ticks as f64 / secs) as u64;
        let avg_tick = if ticks > 0 {
            SimTime::from_ps(progressed.as_ps() / ticks)
        } else {
            SimTime::ZERO
        };
        let uptime = profile.wall_start.elapsed().as_secs();
        let wall = format!("{:.1}s", secs);
        let rate = format!("{}/sec", sim_rate);
        // progress is worth an info line; a stalled simulation only debug
        let loud = progressed != SimTime::ZERO;
        if loud {
            info!(
                wall = %wall,
                uptime,
                sim = %progressed,
                rate = %rate,
                ticks,
                tick_rate,
                avg_tick = %avg_tick,
                period = %self.tick_period(),
                "profile"
            );
        } else {
            debug!(wall = %wall, uptime, ticks, "profile: no progress");
        }
        for brk in self.breaks.snapshot() {
            let line = format!(
                "break {} {} @{} acked:{} hit:{}",
                brk.id, brk.kind, brk.thresh, brk.acked, brk.hit
            );
            if loud {
                info!("{line}");
            } else {
                debug!("{line}");
            }
        }
        profile.last_wall = Instant::now();
        profile.last_sim = now_sim;
        profile.ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn start_control() -> (Arc<Control>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig {
            socket_path: dir.path().join("ctl.sock"),
            profile_interval: None,
            ..BridgeConfig::default()
        };
        (Control::start(config), dir)
    }

    #[test]
    fn test_time_reporting() {
        let (control, _dir) = start_control();
        assert_eq!(control.now(), SimTime::ZERO);
        control.report_time(SimTime::from_ns(42));
        assert_eq!(control.now(), SimTime::from_ns(42));
    }

    #[test]
    fn test_channel_registry_grows_once() {
        let (control, _dir) = start_control();
        let a = control.queue("d0");
        let b = control.queue("d0");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_ack_before_hit_and_relative_freeze() {
        let (control, _dir) = start_control();
        control.report_time(SimTime::from_ns(100));
        control.add_break(1, BreakKind::Stop, SimTime::from_ns(50), true);

        // first query acknowledges and resolves 100 + 50
        assert!(!control.check_break(BreakKind::Stop));
        let brk = &control.breaks()[0];
        assert!(brk.acked);
        assert!(!brk.hit);
        assert_eq!(brk.thresh, SimTime::from_ns(150));

        // advancing time must not move an acknowledged threshold
        control.report_time(SimTime::from_ns(140));
        assert!(!control.check_break(BreakKind::Stop));
        assert_eq!(control.breaks()[0].thresh, SimTime::from_ns(150));

        control.report_time(SimTime::from_ns(150));
        assert!(control.check_break(BreakKind::Stop));
        assert!(control.breaks()[0].hit);

        // stays active from then on
        control.report_time(SimTime::from_ns(500));
        assert!(control.check_break(BreakKind::Stop));
    }

    #[test]
    fn test_stale_absolute_threshold_clamps_to_now() {
        let (control, _dir) = start_control();
        control.report_time(SimTime::from_us(10));
        control.add_break(2, BreakKind::Stop, SimTime::from_us(1), false);
        assert!(control.check_break(BreakKind::Stop));
        assert_eq!(control.breaks()[0].thresh, SimTime::from_us(10));
    }

    #[test]
    fn test_break_kinds_check_independently() {
        let (control, _dir) = start_control();
        control.add_break(3, BreakKind::Finish, SimTime::ZERO, false);
        assert!(!control.check_break(BreakKind::Stop));
        assert!(control.check_break(BreakKind::Finish));
    }

    #[test]
    fn test_remove_unknown_break() {
        let (control, _dir) = start_control();
        assert!(matches!(
            control.remove_break(77),
            Err(BridgeError::BreakNotFound(77))
        ));
    }

    #[test]
    fn test_wait_hold_blocks_until_release() {
        let (control, _dir) = start_control();
        control.add_break(4, BreakKind::Hold, SimTime::ZERO, false);

        let released = Arc::new(AtomicBool::new(false));
        let waiter = {
            let control = Arc::clone(&control);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                control.wait_hold();
                released.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!released.load(Ordering::SeqCst));

        control.remove_break(4).unwrap();
        waiter.join().unwrap();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wait_hold_returns_on_shutdown() {
        let (control, _dir) = start_control();
        control.add_break(5, BreakKind::Hold, SimTime::ZERO, false);

        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.wait_hold())
        };
        thread::sleep(Duration::from_millis(50));
        control.shutdown();
        waiter.join().unwrap();
        assert!(control.is_shutdown());
    }

    #[test]
    fn test_apply_config_unknown_name() {
        let (control, _dir) = start_control();
        assert!(matches!(
            control.apply_config("nonsense", &[]),
            Err(BridgeError::UnknownConfig(_))
        ));
    }

    #[test]
    fn test_tick_frequency_sets_period() {
        let (control, _dir) = start_control();
        control.set_tick_frequency(cosim_common::time::GHZ);
        assert_eq!(control.tick_period(), SimTime::from_ps(1_000));
    }
}
