pub mod loop_;

pub use loop_::{is_exit_command, run, run_single, LoopExit, EXIT_COMMAND};
