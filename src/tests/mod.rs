mod game;
mod manager;

/// Tests share one logger; later initializations are no-ops.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
