//! [`Master`] – supervisor over a fleet of robots.
//!
//! [`Master::start`] installs the interrupt trap, starts every robot in
//! insertion order and, when `auto_run` is set, waits until the trap fires
//! or [`Master::stop`] is called, then halts every robot in reverse order.
//!
//! The trap is a plain function that receives the sender half of a channel
//! and arranges for a value to be sent when the process should shut down.
//! The default one waits for Ctrl-C; tests install a synthetic one with
//! [`Master::set_trap`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use botkit_middleware::{Commander, Eventer};
use botkit_types::{BotError, ConfigError, MasterSummary, ShutdownError, Value};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::robot::Robot;

/// Built-in command returning the names of every registered robot.
pub const ROBOTS_COMMAND: &str = "master.robots";

/// Installs the shutdown trigger. Called once per [`Master::start`].
pub type Trap = Arc<dyn Fn(mpsc::Sender<()>) + Send + Sync>;

/// Trap that fires on Ctrl-C. Must be called inside a Tokio runtime.
///
/// The listening task ends once [`Master::start`] returns and drops the
/// receiving end.
pub fn ctrl_c_trap() -> Trap {
    signal_trap(tokio::signal::ctrl_c)
}

fn signal_trap<S, F>(signal: S) -> Trap
where
    S: Fn() -> F + Send + Sync + 'static,
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    Arc::new(move |tx: mpsc::Sender<()>| {
        let signal = signal();
        tokio::spawn(async move {
            tokio::select! {
                received = signal => match received {
                    Ok(()) => {
                        let _ = tx.send(()).await;
                    }
                    Err(e) => warn!(error = %e, "cannot listen for ctrl-c"),
                },
                () = tx.closed() => debug!("interrupt trap released"),
            }
        });
    })
}

/// Supervisor that starts and stops a fleet of [`Robot`]s together.
pub struct Master {
    robots: Arc<RwLock<Vec<Arc<Robot>>>>,
    commander: Commander,
    eventer: Eventer,
    auto_run: AtomicBool,
    running: AtomicBool,
    /// Set from the first robot start until the matching stop.
    frozen: AtomicBool,
    trap: RwLock<Trap>,
    shutdown: watch::Sender<bool>,
}

impl Default for Master {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Master {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Master")
            .field("robots", &self.robots.read().len())
            .field("auto_run", &self.auto_run())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Master {
    /// Empty master with `auto_run` on and the Ctrl-C trap installed.
    pub fn new() -> Self {
        let robots: Arc<RwLock<Vec<Arc<Robot>>>> = Arc::default();
        let commander = Commander::new();
        let names = robots.clone();
        // Fresh commander: neither frozen nor holding this name.
        let _ = commander.add_command(ROBOTS_COMMAND, move |_| {
            Value::from(
                names
                    .read()
                    .iter()
                    .map(|r| r.name().to_string())
                    .collect::<Vec<_>>(),
            )
        });

        Self {
            robots,
            commander,
            eventer: Eventer::new(),
            auto_run: AtomicBool::new(true),
            running: AtomicBool::new(false),
            frozen: AtomicBool::new(false),
            trap: RwLock::new(ctrl_c_trap()),
            shutdown: watch::Sender::new(false),
        }
    }

    // ── configuration ───────────────────────────────────────────────────────

    /// Register `robot`. Robots start in insertion order.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::Frozen`] while the master is starting or running.
    /// * [`ConfigError::DuplicateName`] when a robot of the same name exists.
    pub fn add_robot(&self, robot: impl Into<Arc<Robot>>) -> Result<Arc<Robot>, ConfigError> {
        let robot = robot.into();
        let mut robots = self.robots.write();
        if self.frozen.load(Ordering::SeqCst) {
            warn!(robot = %robot.name(), "robot rejected: master is running");
            return Err(ConfigError::Frozen {
                what: "robot list".to_string(),
            });
        }
        if robots.iter().any(|r| r.name() == robot.name()) {
            return Err(ConfigError::DuplicateName {
                kind: "robot",
                name: robot.name().to_string(),
            });
        }
        debug!(robot = %robot.name(), "robot registered");
        robots.push(robot.clone());
        Ok(robot)
    }

    /// The robot registered under `name`.
    pub fn robot(&self, name: &str) -> Option<Arc<Robot>> {
        self.robots.read().iter().find(|r| r.name() == name).cloned()
    }

    /// Every robot, in insertion order.
    pub fn robots(&self) -> Vec<Arc<Robot>> {
        self.robots.read().clone()
    }

    /// Master-level commands, including [`ROBOTS_COMMAND`].
    pub fn commander(&self) -> &Commander {
        &self.commander
    }

    /// Master-level event topics.
    pub fn eventer(&self) -> &Eventer {
        &self.eventer
    }

    /// Whether [`Master::start`] waits for the trap before stopping.
    pub fn auto_run(&self) -> bool {
        self.auto_run.load(Ordering::SeqCst)
    }

    /// With `auto_run` off, [`Master::start`] returns as soon as every robot
    /// is running.
    pub fn set_auto_run(&self, auto_run: bool) {
        self.auto_run.store(auto_run, Ordering::SeqCst);
    }

    /// Replace the interrupt trap.
    pub fn set_trap<F>(&self, trap: F)
    where
        F: Fn(mpsc::Sender<()>) + Send + Sync + 'static,
    {
        *self.trap.write() = Arc::new(trap);
    }

    /// `true` between a successful start and the next stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// JSON-ready view of every robot and the master's commands.
    pub fn summary(&self) -> MasterSummary {
        MasterSummary {
            robots: self.robots.read().iter().map(|r| r.summary()).collect(),
            commands: self.commander.commands(),
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    /// Start every robot, then (with `auto_run`) wait for the trap or
    /// [`Master::stop`] and stop everything.
    ///
    /// # Errors
    ///
    /// The first robot start failure, tagged with the robot name, after the
    /// robots already started were stopped again. With `auto_run`, the
    /// aggregated shutdown error if halting failed.
    pub async fn start(&self) -> Result<(), BotError> {
        let auto_run = self.auto_run();
        self.shutdown.send_replace(false);
        let mut shutdown = self.shutdown.subscribe();

        let (tx, mut interrupt) = mpsc::channel(1);
        if auto_run {
            let trap = self.trap.read().clone();
            trap(tx);
        }

        let robots = {
            let robots = self.robots.write();
            self.frozen.store(true, Ordering::SeqCst);
            robots.clone()
        };
        info!(robots = robots.len(), "starting master");
        for (index, robot) in robots.iter().enumerate() {
            if let Err(e) = robot.start().await {
                error!(robot = %robot.name(), error = %e, "robot failed to start");
                for started in robots[..index].iter().rev() {
                    if let Err(stop_err) = started.stop().await {
                        warn!(robot = %started.name(), error = %stop_err, "error while stopping after failed start");
                    }
                }
                self.frozen.store(false, Ordering::SeqCst);
                return Err(e.in_robot(robot.name()));
            }
        }

        self.commander.freeze();
        self.eventer.freeze();
        self.running.store(true, Ordering::SeqCst);
        info!("master running");

        if !auto_run {
            return Ok(());
        }

        tokio::select! {
            Some(()) = interrupt.recv() => info!("interrupt received"),
            () = requested(&mut shutdown) => debug!("stop requested"),
        }
        self.stop().await
    }

    /// Stop every robot in reverse order. Idempotent.
    ///
    /// # Errors
    ///
    /// [`BotError::Shutdown`] holding each failing robot's error.
    pub async fn stop(&self) -> Result<(), BotError> {
        self.shutdown.send_replace(true);
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            info!("stopping master");
        }

        let mut errors = ShutdownError::default();
        for robot in self.robots().iter().rev() {
            if let Err(e) = robot.stop().await {
                errors.push(e.in_robot(robot.name()));
            }
        }

        self.commander.thaw();
        self.eventer.thaw();
        self.frozen.store(false, Ordering::SeqCst);
        if !errors.is_empty() {
            warn!(error = %errors, "master stopped with errors");
        }
        errors.into_result()
    }
}

/// Resolves once a stop has been requested. Pending forever when the sender
/// is gone, which cannot happen while the master is alive.
async fn requested(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
