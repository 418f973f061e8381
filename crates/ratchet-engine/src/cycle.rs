//! One build-and-test cycle, distilled into a single outcome.

use std::path::Path;

use tracing::{error, info, warn};

use ratchet_core::toolchain::{Toolchain, ToolchainError};

/// Result of one build-and-test cycle. Build and test failures are
/// expected, recoverable-by-design outcomes; an infrastructure error
/// (tool missing, not runnable on this platform) is fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    BuildFailed,
    TestsFailed,
    TestsPassed,
    InfrastructureError(String),
}

impl CycleOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CycleOutcome::TestsPassed)
    }
}

/// Run the toolchain's build command, then (only if the build passed) its
/// test command.
///
/// A command that cannot be started at all is an infrastructure error,
/// never a build/test failure.
pub fn run_build_and_test(toolchain: &Toolchain, work_dir: &Path) -> CycleOutcome {
    info!("launching build");
    match toolchain.run_build(work_dir) {
        Err(e) => return infrastructure(e),
        Ok(result) if result.failed() => {
            warn!("there are build errors, cannot go any further");
            return CycleOutcome::BuildFailed;
        }
        Ok(_) => {}
    }

    info!("running tests");
    match toolchain.run_tests(work_dir) {
        Err(e) => infrastructure(e),
        Ok(result) if result.failed() => {
            error!("some tests are failing");
            CycleOutcome::TestsFailed
        }
        Ok(_) => {
            info!("tests passed");
            CycleOutcome::TestsPassed
        }
    }
}

fn infrastructure(e: ToolchainError) -> CycleOutcome {
    error!(error = %e, "build/test tool cannot run");
    CycleOutcome::InfrastructureError(e.to_string())
}
