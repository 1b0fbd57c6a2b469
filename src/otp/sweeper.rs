//! Background sweep of expired one-time codes

use super::OneTimeCodeService;
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Signal to stop the sweeper
#[derive(Debug, Clone, Copy)]
pub struct StopSweeper;

/// Sweeper handle; stops and joins the worker thread on drop
pub struct OtpSweeper {
    stop_tx: Sender<StopSweeper>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl OtpSweeper {
    pub fn start(service: Arc<OneTimeCodeService>, interval: Duration) -> Result<Self> {
        log::info!("Starting OTP sweeper (every {:?})", interval);

        let (stop_tx, stop_rx) = bounded::<StopSweeper>(1);
        let thread_handle = thread::Builder::new()
            .name("otp-sweeper".into())
            .spawn(move || run_sweeper(service, interval, stop_rx))
            .context("Failed to spawn OTP sweeper thread")?;

        Ok(Self {
            stop_tx,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for OtpSweeper {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(StopSweeper);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("OTP sweeper thread panicked");
            }
        }
        log::info!("OTP sweeper stopped");
    }
}

fn run_sweeper(service: Arc<OneTimeCodeService>, interval: Duration, stop_rx: Receiver<StopSweeper>) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Ok(StopSweeper) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => match service.sweep() {
                Ok(0) => {}
                Ok(removed) => log::info!("OTP sweep removed {} expired codes", removed),
                Err(e) => log::warn!("OTP sweep failed: {}", e),
            },
        }
    }
}
