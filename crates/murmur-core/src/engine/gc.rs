//! Deferred release of decoded audio
//!
//! Sample buffers are wrapped in `basedrop::Shared`. When the render thread
//! drops the last reference (a layer replaced, the engine halted) the
//! allocation is queued instead of freed, and a background thread reclaims
//! it.
//!
//! ```ignore
//! let shared = basedrop::Shared::new(&gc_handle(), buffer);
//! ```

use std::sync::{mpsc, OnceLock};
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};

/// How often queued buffers are reclaimed
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static COLLECTOR_HANDLE: OnceLock<Handle> = OnceLock::new();

fn spawn_collector() -> Handle {
    let (handle_tx, handle_rx) = mpsc::sync_channel(1);

    // The collector is !Send; it is built on the thread that drives it
    thread::Builder::new()
        .name("murmur-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            if handle_tx.send(collector.handle()).is_err() {
                return;
            }
            log::debug!("Buffer collector running");
            loop {
                thread::sleep(COLLECT_INTERVAL);
                collector.collect();
            }
        })
        .expect("spawn buffer collector thread");

    handle_rx.recv().expect("buffer collector handle")
}

/// Handle for allocating buffers the render thread may drop
pub fn gc_handle() -> Handle {
    COLLECTOR_HANDLE.get_or_init(spawn_collector).clone()
}
