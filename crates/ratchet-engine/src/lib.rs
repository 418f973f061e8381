//! The "test && commit || revert" engine: cycle execution, the control
//! loop, the mob timer, and workflow variants.

pub mod cycle;
pub mod engine;
pub mod timer;
pub mod variant;

pub use cycle::{run_build_and_test, CycleOutcome};
pub use engine::{
    Engine, EngineError, EngineState, SessionInfo, COMMIT_MESSAGE_FAIL, COMMIT_MESSAGE_OK,
    COMMIT_MESSAGE_REVERT,
};
pub use timer::MobTimer;
pub use variant::{UnsupportedVariantError, Variant};
