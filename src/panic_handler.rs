use std::panic;

/// Install the process panic hook.
///
/// Debug builds get `better_panic` backtraces; release builds get the
/// `human_panic` crash report. Either way the panic is also written to the
/// log file before the previous hook runs.
pub fn initialize_panic_handler() {
    if cfg!(debug_assertions) {
        better_panic::install();
    } else {
        human_panic::setup_panic!();
    }

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        log::error!("panic: {panic_info}");
        log::logger().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
