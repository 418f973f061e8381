//! The TCR control loop.
//!
//! A single sequential thread drives the state machine
//! `Idle → Watching → Running → Committing|Reverting → Watching | Stopped`.
//! The engine blocks only while waiting for a trigger and while the
//! external build/test process runs; commit/revert always follows a
//! completed outcome, so build, test, VCS mutations and watch enumeration
//! never overlap.

use std::path::PathBuf;
use std::time::Duration;

use crossbeam_channel::{after, bounded, never, select, Receiver};
use tracing::{error, info, warn};

use ratchet_core::config;
use ratchet_core::language::{Language, LanguageError, LanguageRegistry};
use ratchet_core::params::{checked_dir, Params};
use ratchet_core::toolchain::{Toolchain, ToolchainError, ToolchainRegistry};
use ratchet_core::watcher::watch_for_change;
use ratchet_vcs::{factory, Vcs, VcsError};

use crate::cycle::{run_build_and_test, CycleOutcome};
use crate::timer::MobTimer;
use crate::variant::{UnsupportedVariantError, Variant};

/// Commit message headers. The header is what `ratchet log`-style tools
/// key on, so it stays stable across versions.
pub const COMMIT_MESSAGE_OK: &str = "\u{2705} TCR - tests passing";
pub const COMMIT_MESSAGE_FAIL: &str = "\u{274c} TCR - tests failing";
pub const COMMIT_MESSAGE_REVERT: &str = "\u{23ea} TCR - revert changes";

/// Waiting time before re-arming the watcher after a cycle, so the
/// watcher does not get retriggered by the commit/revert's own file
/// mutations. Shortened only in tests.
const DEFAULT_REARM_DELAY: Duration = Duration::from_secs(2);

/// Polling period used by the navigator role when none is configured.
const DEFAULT_NAVIGATOR_POLLING: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Language(#[from] LanguageError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Variant(#[from] UnsupportedVariantError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

/// Control-loop states. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Watching,
    Running,
    Committing,
    Reverting,
    Stopped,
}

/// What woke the engine up from `Watching`.
#[derive(Debug, PartialEq, Eq)]
enum Trigger {
    /// A watched file changed.
    Change,
    /// The polling period elapsed with no local change (navigator-style
    /// synthetic trigger: pull then re-check).
    Poll,
    Cancelled,
}

/// Session facts exposed to the outside (UIs, diagnostics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub base_dir: PathBuf,
    pub work_dir: PathBuf,
    pub language: String,
    pub toolchain: String,
    pub vcs_name: String,
    pub vcs_session: String,
    pub auto_push: bool,
    pub commit_on_fail: bool,
    pub message_suffix: String,
}

pub struct Engine {
    base_dir: PathBuf,
    work_dir: PathBuf,
    language: Language,
    toolchain: Toolchain,
    vcs: Box<dyn Vcs>,
    variant: Variant,
    commit_on_fail: bool,
    message_suffix: String,
    polling_period: Duration,
    mob_turn_duration: Duration,
    rearm_delay: Duration,
    state: EngineState,
}

impl Engine {
    /// Build an engine from resolved parameters: registries loaded with
    /// built-ins plus the user's config dir, language resolved or
    /// detected, toolchain checked for compatibility, VCS selected by
    /// name.
    pub fn new(params: &Params) -> Result<Self, EngineError> {
        let base_dir = checked_dir(&params.base_dir)?;

        let mut languages = LanguageRegistry::with_built_ins();
        let mut toolchains = ToolchainRegistry::with_built_ins();
        config::load_config_dir(&params.config_dir, &mut languages, &mut toolchains);

        let language = languages.get_or_detect(&params.language, &base_dir)?.clone();
        let toolchain_name = language.toolchain_name(&params.toolchain)?.to_string();
        let toolchain = toolchains.get(&toolchain_name)?.clone();

        let vcs = factory::init_vcs(&params.vcs, &base_dir)?;
        Self::assemble(params, language, toolchain, vcs)
    }

    /// Build an engine from pre-resolved parts. Used by tests and by
    /// embedders that manage their own registries.
    pub fn with_parts(
        params: &Params,
        language: Language,
        toolchain: Toolchain,
        vcs: Box<dyn Vcs>,
    ) -> Result<Self, EngineError> {
        Self::assemble(params, language, toolchain, vcs)
    }

    fn assemble(
        params: &Params,
        language: Language,
        toolchain: Toolchain,
        mut vcs: Box<dyn Vcs>,
    ) -> Result<Self, EngineError> {
        let base_dir = checked_dir(&params.base_dir)?;
        let work_dir = checked_dir(&params.work_dir)?;
        let variant: Variant = params.variant.parse()?;
        let commit_on_fail = params.commit_failures && variant.allows_commit_on_fail();
        vcs.enable_push(params.auto_push);

        if vcs.is_on_root_branch() {
            warn!(
                session = vcs.session_summary(),
                "running TCR on the root branch is not recommended"
            );
        }

        info!(
            language = language.name(),
            toolchain = toolchain.name(),
            variant = variant.name(),
            session = vcs.session_summary(),
            "engine ready"
        );
        Ok(Self {
            base_dir,
            work_dir,
            language,
            toolchain,
            vcs,
            variant,
            commit_on_fail,
            message_suffix: params.message_suffix.clone(),
            polling_period: params.polling_period,
            mob_turn_duration: params.mob_turn_duration,
            rearm_delay: DEFAULT_REARM_DELAY,
            state: EngineState::Idle,
        })
    }

    /// Shorten the post-cycle re-arm delay. Test hook.
    pub fn with_rearm_delay(mut self, delay: Duration) -> Self {
        self.rearm_delay = delay;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            base_dir: self.base_dir.clone(),
            work_dir: self.work_dir.clone(),
            language: self.language.name().to_string(),
            toolchain: self.toolchain.name().to_string(),
            vcs_name: self.vcs.name().to_string(),
            vcs_session: self.vcs.session_summary(),
            auto_push: self.vcs.is_push_enabled(),
            commit_on_fail: self.commit_on_fail,
            message_suffix: self.message_suffix.clone(),
        }
    }

    /// Run the control loop until cancellation, an infrastructure error,
    /// or an unrecoverable VCS state.
    pub fn run(&mut self, cancel: &Receiver<()>) -> Result<(), EngineError> {
        info!("starting TCR session");
        if let Err(e) = self.vcs.pull() {
            self.report_vcs_error(e)?;
        }
        let _timer = MobTimer::start(self.mob_turn_duration);

        let result = self.watch_loop(cancel);
        self.state = EngineState::Stopped;
        info!("TCR session stopped");
        result
    }

    /// Navigator role: keep the working tree in sync by pulling at the
    /// polling period. Never runs cycles, never commits.
    pub fn run_as_navigator(&mut self, cancel: &Receiver<()>) -> Result<(), EngineError> {
        info!("starting navigator session");
        let period = if self.polling_period.is_zero() {
            DEFAULT_NAVIGATOR_POLLING
        } else {
            self.polling_period
        };
        let ticker = crossbeam_channel::tick(period);
        if let Err(e) = self.vcs.pull() {
            self.report_vcs_error(e)?;
        }
        loop {
            self.state = EngineState::Watching;
            select! {
                recv(ticker) -> _ => {
                    if let Err(e) = self.vcs.pull() {
                        self.report_vcs_error(e)?;
                    }
                }
                recv(cancel) -> _ => break,
            }
        }
        self.state = EngineState::Stopped;
        info!("navigator session stopped");
        Ok(())
    }

    fn watch_loop(&mut self, cancel: &Receiver<()>) -> Result<(), EngineError> {
        loop {
            self.state = EngineState::Watching;
            match self.wait_for_trigger(cancel) {
                Trigger::Cancelled => return Ok(()),
                Trigger::Poll => {
                    if let Err(e) = self.vcs.pull() {
                        self.report_vcs_error(e)?;
                    }
                    self.run_cycle()?;
                }
                Trigger::Change => {
                    self.run_cycle()?;
                }
            }
        }
    }

    /// Block until one of the three trigger sources fires: a relevant
    /// file change, the polling period, or cancellation. First wins.
    fn wait_for_trigger(&self, cancel: &Receiver<()>) -> Trigger {
        // Lets the dust settle after our own commit/revert mutations.
        std::thread::sleep(self.rearm_delay);
        info!("going to sleep until something interesting happens");

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<bool>(1);
        let dirs = self.language.dirs_to_watch(&self.base_dir);
        let language = self.language.clone();
        let base_dir = self.base_dir.clone();
        let watcher = std::thread::spawn(move || {
            let changed = watch_for_change(
                &dirs,
                |path| language.is_language_file(path, &base_dir),
                &stop_rx,
            );
            let _ = done_tx.send(changed);
        });

        let poll = if self.polling_period.is_zero() {
            never()
        } else {
            after(self.polling_period)
        };

        let trigger = select! {
            recv(done_rx) -> msg => match msg {
                Ok(true) => Trigger::Change,
                // Watch error or internal teardown: treat as cancellation.
                _ => Trigger::Cancelled,
            },
            recv(poll) -> _ => Trigger::Poll,
            recv(cancel) -> _ => Trigger::Cancelled,
        };

        // Tear the watcher down before doing anything else; exactly one
        // watcher resource set may be live at a time.
        let _ = stop_tx.send(());
        let _ = watcher.join();
        trigger
    }

    /// Run one test && commit || revert cycle.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, EngineError> {
        self.state = EngineState::Running;
        let outcome = run_build_and_test(&self.toolchain, &self.work_dir);
        match &outcome {
            CycleOutcome::TestsPassed => {
                self.state = EngineState::Committing;
                self.commit()?;
            }
            CycleOutcome::BuildFailed | CycleOutcome::TestsFailed => {
                self.state = EngineState::Reverting;
                self.revert()?;
            }
            CycleOutcome::InfrastructureError(message) => {
                self.state = EngineState::Stopped;
                return Err(EngineError::Infrastructure(message.clone()));
            }
        }
        Ok(outcome)
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        info!(session = self.vcs.session_summary(), "committing changes");
        let messages = self.wrap_commit_messages(COMMIT_MESSAGE_OK);
        let committed = self
            .vcs
            .add()
            .and_then(|()| self.vcs.commit(false, &messages));
        if let Err(e) = committed {
            return self.report_vcs_error(e);
        }
        if self.vcs.is_push_enabled() {
            if let Err(e) = self.vcs.push() {
                return self.report_vcs_error(e);
            }
        }
        Ok(())
    }

    fn revert(&mut self) -> Result<(), EngineError> {
        if self.commit_on_fail {
            match self.commit_failing_changes() {
                Ok(()) => {
                    if self.vcs.is_push_enabled() {
                        if let Err(e) = self.vcs.push() {
                            self.report_vcs_error(e)?;
                        }
                    }
                }
                Err(e) => self.report_vcs_error(e)?,
            }
        }
        self.revert_src_files()
    }

    /// Record the failing state in history before reverting: stash, apply
    /// back, commit with the failure header, revert that commit, reword
    /// the revert commit, then restore the working tree from the stash.
    fn commit_failing_changes(&mut self) -> ratchet_vcs::Result<()> {
        self.vcs.stash(COMMIT_MESSAGE_FAIL)?;
        self.vcs.unstash(true)?;
        self.vcs.add()?;
        let messages = self.wrap_commit_messages(COMMIT_MESSAGE_FAIL);
        self.vcs.commit(false, &messages)?;
        self.vcs.revert_last_commit()?;
        let messages = self.wrap_commit_messages(COMMIT_MESSAGE_REVERT);
        self.vcs.commit(true, &messages)?;
        self.vcs.unstash(false)?;
        Ok(())
    }

    /// Restore source files to the last commit. Test files are kept: the
    /// failing test the developer just wrote stays in place.
    fn revert_src_files(&mut self) -> Result<(), EngineError> {
        let diffs = match self.vcs.diff() {
            Ok(diffs) => diffs,
            Err(e) => return self.report_vcs_error(e),
        };
        let mut reverted = 0usize;
        for diff in &diffs {
            if self.language.is_src_file(&diff.path, &self.base_dir) {
                match self.vcs.restore(&diff.path) {
                    Ok(()) => reverted += 1,
                    Err(e) => self.report_vcs_error(e)?,
                }
            }
        }
        if reverted > 0 {
            warn!(count = reverted, "file(s) reverted");
        } else {
            info!("no file reverted (only test files were updated since last commit)");
        }
        Ok(())
    }

    fn wrap_commit_messages(&self, header: &str) -> Vec<String> {
        let mut messages = vec![header.to_string()];
        if !self.message_suffix.is_empty() {
            messages.push(self.message_suffix.clone());
        }
        messages
    }

    /// VCS operation errors are reported but do not terminate the loop,
    /// except when the repository state is unrecoverable.
    fn report_vcs_error(&mut self, e: VcsError) -> Result<(), EngineError> {
        if e.is_unrecoverable() {
            error!(error = %e, "unrecoverable VCS state, stopping");
            self.state = EngineState::Stopped;
            Err(EngineError::Vcs(e))
        } else {
            warn!(error = %e, "VCS operation failed, continuing");
            Ok(())
        }
    }
}
