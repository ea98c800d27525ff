use sysinfo::System;

const BUSY_CPU_PERCENT: f32 = 25.0;

/// Warn when the host is already busy before any build is measured.
///
/// Note that this won't stop the run, it only tells the user that their measurements might be
/// affected by other work on the machine.
pub(crate) fn warn_if_host_busy() {
    let mut sys = System::new();

    sys.refresh_cpu_usage();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();

    let usage = sys.global_cpu_usage();
    if usage > BUSY_CPU_PERCENT {
        log::warn!(
            "High CPU usage detected before measuring. The host is using {:.2}% of the CPU, with {} available cores",
            usage,
            sys.cpus().len()
        );
    } else {
        log::debug!("Host CPU usage before measuring: {usage:.2}%");
    }
}
