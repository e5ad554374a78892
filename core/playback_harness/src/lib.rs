pub mod constants;
pub mod error;
pub mod fake_player;
pub mod player;
pub mod recorder;
pub mod runner;
pub mod schedule;
pub mod test_runner;
pub mod track_selector;

/// Installs `env_logger` in test mode. Safe to call more than once.
pub fn init_test_logging() {
    // a second init fails once a logger is installed
    let _ = env_logger::builder().is_test(true).try_init();
}
