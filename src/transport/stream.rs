use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst},
    sync::{Arc, Mutex},
    thread, time,
};

use crate::{buffer::Buffer, clock::TimeSource, store::Database, Result};

/// Fastest cadence between transport cycles.
pub const MIN_SLEEP_MS: u64 = 5;

/// Slowest cadence between transport cycles.
pub const MAX_SLEEP_MS: u64 = 1000;

/// Cadence step-down applied after a productive cycle.
pub const SLEEP_STEP_MS: u64 = 50;

/// With no transport for this long, the loop parks on the buffer's
/// transportable condition instead of polling.
pub const INACTIVITY_THRESHOLD_MS: u64 = 5_000;

/// How often the hung-detector inspects the main loop.
pub const HUNG_FREQ_MS: u64 = 10_000;

/// A loop neither working, paused, nor woken for this long appears
/// hung.
pub const HUNG_THRESHOLD_MS: u64 = 30_000;

// granularity of interruptible sleeps.
const SLEEP_CHUNK_MS: u64 = 25;

/// Continuous mover from the buffer into the database.
///
/// Each cycle attempts one page transport under the storage latch,
/// speeding up while productive; the buffer's scale-back signal resets
/// the cadence once pressure drops. A side thread watches for a stalled
/// loop and restarts it.
pub struct StreamingTransporter {
    state: Arc<State>,
    threads: Arc<Mutex<Vec<thread::JoinHandle<()>>>>,
}

pub(crate) struct State {
    buffer: Arc<Buffer>,
    database: Arc<Database>,
    time: TimeSource,

    alive: AtomicBool,
    generation: AtomicU64,
    sleep_ms: AtomicU64,

    is_doing_work: AtomicBool,
    is_paused: AtomicBool,
    last_wakeup_us: AtomicU64,

    has_ever_paused: AtomicBool,
    has_ever_restarted: AtomicBool,
    has_ever_appeared_hung: AtomicBool,
}

impl StreamingTransporter {
    /// Start the transporter over `buffer` and `database`.
    pub fn start(
        buffer: Arc<Buffer>,
        database: Arc<Database>,
        time: TimeSource,
    ) -> Result<StreamingTransporter> {
        let state = Arc::new(State {
            buffer,
            database,
            time: time.clone(),
            alive: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            sleep_ms: AtomicU64::new(MAX_SLEEP_MS),
            is_doing_work: AtomicBool::new(false),
            is_paused: AtomicBool::new(false),
            last_wakeup_us: AtomicU64::new(time.epoch_micros()?),
            has_ever_paused: AtomicBool::new(false),
            has_ever_restarted: AtomicBool::new(false),
            has_ever_appeared_hung: AtomicBool::new(false),
        });

        {
            let buffer = Arc::clone(&state.buffer);
            let listener_state = Arc::clone(&state);
            buffer.on_transport_rate_scale_back(Box::new(move || {
                listener_state.sleep_ms.store(MAX_SLEEP_MS, SeqCst);
            }));
        }

        let threads = Arc::new(Mutex::new(vec![]));

        {
            let state = Arc::clone(&state);
            let handle = thread::spawn(move || main_loop(state, 0));
            threads.lock().unwrap().push(handle);
        }
        {
            let state = Arc::clone(&state);
            let threads_for_detector = Arc::clone(&threads);
            let handle = thread::spawn(move || hung_detector(state, threads_for_detector));
            threads.lock().unwrap().push(handle);
        }

        Ok(StreamingTransporter { state, threads })
    }

    /// Signal shutdown and join every thread. The buffer must be closed
    /// first so a parked loop wakes up.
    pub fn close(self) -> Result<()> {
        self.state.alive.store(false, SeqCst);
        let handles: Vec<thread::JoinHandle<()>> =
            self.threads.lock().unwrap().drain(..).collect();
        for handle in handles.into_iter() {
            handle.join().ok();
        }
        Ok(())
    }

    pub fn has_ever_paused(&self) -> bool {
        self.state.has_ever_paused.load(SeqCst)
    }

    pub fn has_ever_restarted(&self) -> bool {
        self.state.has_ever_restarted.load(SeqCst)
    }

    pub fn has_ever_appeared_hung(&self) -> bool {
        self.state.has_ever_appeared_hung.load(SeqCst)
    }

    pub fn to_sleep_ms(&self) -> u64 {
        self.state.sleep_ms.load(SeqCst)
    }
}

fn main_loop(state: Arc<State>, generation: u64) {
    log::debug!("transporter loop generation {} up", generation);

    while state.alive.load(SeqCst) && state.generation.load(SeqCst) == generation {
        let now = match state.time.epoch_micros() {
            Ok(now) => now,
            Err(err) => {
                log::error!("transporter clock: {}", err);
                break;
            }
        };

        // park when nothing has moved for a while; the buffer wakes us
        // at the next page seal.
        let idle_ms = now.saturating_sub(state.buffer.to_last_transport_us()) / 1000;
        if idle_ms > INACTIVITY_THRESHOLD_MS {
            state.is_paused.store(true, SeqCst);
            state.has_ever_paused.store(true, SeqCst);
            state.buffer.wait_until_transportable();
            state.is_paused.store(false, SeqCst);
            if !state.alive.load(SeqCst) {
                break;
            }
        }

        state.is_doing_work.store(true, SeqCst);
        match state.buffer.try_transport(&state.database) {
            Ok(true) => {
                // productive; speed up toward MIN_SLEEP.
                let sleep = state.sleep_ms.load(SeqCst);
                state
                    .sleep_ms
                    .store(sleep.saturating_sub(SLEEP_STEP_MS).max(MIN_SLEEP_MS), SeqCst);
            }
            Ok(false) => (),
            Err(err) => {
                // caught, logged, cycle restarted.
                log::error!("transport cycle: {}", err);
            }
        }
        state.is_doing_work.store(false, SeqCst);

        interruptible_sleep(&state, generation, state.sleep_ms.load(SeqCst));
        if let Ok(now) = state.time.epoch_micros() {
            state.last_wakeup_us.store(now, SeqCst);
        }
    }

    log::debug!("transporter loop generation {} down", generation);
}

fn hung_detector(state: Arc<State>, threads: Arc<Mutex<Vec<thread::JoinHandle<()>>>>) {
    while state.alive.load(SeqCst) {
        interruptible_sleep(&state, state.generation.load(SeqCst), HUNG_FREQ_MS);
        if !state.alive.load(SeqCst) {
            break;
        }

        let now = match state.time.epoch_micros() {
            Ok(now) => now,
            Err(_) => continue,
        };
        let stalled_ms = now.saturating_sub(state.last_wakeup_us.load(SeqCst)) / 1000;

        if !state.is_doing_work.load(SeqCst)
            && !state.is_paused.load(SeqCst)
            && stalled_ms > HUNG_THRESHOLD_MS
        {
            state.has_ever_appeared_hung.store(true, SeqCst);
            let generation = state.generation.fetch_add(1, SeqCst) + 1;
            state.has_ever_restarted.store(true, SeqCst);
            log::error!(
                "transporter appears hung for {}ms, restarting as generation {}",
                stalled_ms,
                generation
            );

            state.last_wakeup_us.store(now, SeqCst);
            let loop_state = Arc::clone(&state);
            let handle = thread::spawn(move || main_loop(loop_state, generation));
            threads.lock().unwrap().push(handle);
        }
    }
}

// sleep in small chunks, re-checking liveness and generation.
fn interruptible_sleep(state: &State, generation: u64, total_ms: u64) {
    let mut slept = 0;
    while slept < total_ms
        && state.alive.load(SeqCst)
        && state.generation.load(SeqCst) == generation
    {
        let chunk = SLEEP_CHUNK_MS.min(total_ms - slept);
        thread::sleep(time::Duration::from_millis(chunk));
        slept += chunk;
    }
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
