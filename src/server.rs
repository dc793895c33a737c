/// Wires together config loading, output bring-up, the OPC listener,
/// and the stats loop; owns the cooperative shutdown flag (§5).
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::opc;
use crate::output::{self, OutputHandle};

pub struct Bridge {
    dispatcher: Arc<Dispatcher>,
    running: Arc<AtomicBool>,
}

impl Bridge {
    /// Open every configured output (excluding any that fail to open),
    /// fatal only if none open at all (§7).
    ///
    /// # Errors
    /// Returns `BridgeError::NoOutputsOpened` if every output failed.
    pub fn setup(config: &BridgeConfig, running: Arc<AtomicBool>) -> Result<Self> {
        let mut outputs = Vec::new();
        for output_config in &config.outputs {
            let port = output_config.port.clone();
            match OutputHandle::open(output_config.clone(), Arc::clone(&running)) {
                Some(handle) => outputs.push(handle),
                None => warn!(port, "output failed to open, excluding from active set"),
            }
        }

        if outputs.is_empty() {
            return Err(BridgeError::NoOutputsOpened);
        }

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(outputs)),
            running,
        })
    }

    /// Run the OPC listener and (if `debug`) the stats loop until the
    /// running flag is cleared. Blocks the calling thread.
    ///
    /// # Errors
    /// Returns an I/O error if the listener can't be bound.
    pub fn run(&self, host: &str, port: u16, debug: bool) -> Result<()> {
        let listener = opc::bind(host, port)?;

        let stats_thread = if debug {
            let dispatcher = Arc::clone(&self.dispatcher);
            let running = Arc::clone(&self.running);
            Some(std::thread::spawn(move || crate::stats::run(dispatcher, running)))
        } else {
            None
        };

        opc::run(&listener, Arc::clone(&self.dispatcher), Arc::clone(&self.running));

        if let Some(thread) = stats_thread {
            let _ = thread.join();
        }

        Ok(())
    }

    /// Blank every LED strip, then join each worker and drop its link
    /// (§3's normal shutdown lifecycle).
    pub fn shutdown(self) {
        self.running.store(false, Ordering::Relaxed);

        // `Dispatcher` only hands out shared references; unwrap it here
        // so outputs can be consumed by value for `close()`.
        let dispatcher = match Arc::try_unwrap(self.dispatcher) {
            Ok(d) => d,
            Err(arc) => {
                // Other threads (stats) may still briefly hold a clone;
                // give them a moment to exit before retrying once.
                std::thread::sleep(std::time::Duration::from_millis(150));
                match Arc::try_unwrap(arc) {
                    Ok(d) => d,
                    Err(_) => {
                        error!("dispatcher still shared at shutdown, skipping clean output close");
                        return;
                    }
                }
            }
        };

        for output in dispatcher.outputs() {
            let blank = output::blank_payload(output.config.led_count);
            output.submit(blank);
        }
        std::thread::sleep(std::time::Duration::from_millis(50));

        for output in dispatcher.into_outputs() {
            output.close();
        }

        info!("server stopped");
    }
}
