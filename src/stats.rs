/// Periodic, cosmetic stats reporting (§4.8). Runs on its own thread so
/// it can never block the ingress or worker paths; only active when
/// `--debug`/`--ddebug` is set.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::dispatch::Dispatcher;

const STATS_INTERVAL: Duration = Duration::from_secs(5);
const WAKE_POLL: Duration = Duration::from_millis(200);

pub fn run(dispatcher: Arc<Dispatcher>, running: Arc<AtomicBool>) {
    let mut last_tick = Instant::now();

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(WAKE_POLL);
        if last_tick.elapsed() < STATS_INTERVAL {
            continue;
        }

        let elapsed = last_tick.elapsed().as_secs_f64();
        last_tick = Instant::now();

        let (received, sent) = dispatcher.take_counters();
        let fps_received = received as f64 / elapsed;
        let fps_sent = sent as f64 / elapsed;

        info!(fps_received, fps_sent, "stats");

        for output in dispatcher.outputs() {
            info!(
                port = %output.config.port,
                drops = output.drops(),
                connected = output.is_connected(),
                "output stats"
            );
        }
    }
}
