//! Update sequencing for the panel.
//!
//! One update walks the panel through reset, initialisation, data transfer,
//! refresh, power off and deep sleep. [`Sequencer`] does one state's worth of
//! work per call so nothing blocks the host loop for long; [`Scheduler`] is
//! that host loop, stepping the sequencer on a fixed interval.

use crate::config::Config;
use crate::display::transport::{Clock, Transport};
use crate::display::{DisplayError, Inkplate2};
use std::time::Duration;

/// Where an update currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Reset,
    Initialise,
    WaitInitialise,
    PowerOn,
    TransferData,
    RefreshScreen,
    WaitRefresh,
    PowerOff,
    WaitPowerOff,
    DeepSleep,
}

/// Non-blocking update state machine
#[derive(Debug)]
pub struct Sequencer {
    state: UpdateState,
    busy_timeout_ms: u32,
    wait_started: u32,
    transfer_calls: u32,
}

impl Sequencer {
    pub fn new(busy_timeout_ms: u32) -> Self {
        Self {
            state: UpdateState::Idle,
            busy_timeout_ms,
            wait_started: 0,
            transfer_calls: 0,
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Arm a new update. Ignored while one is already running.
    pub fn start_update(&mut self) -> bool {
        if self.state != UpdateState::Idle {
            tracing::warn!("Update requested while in {:?}, ignoring", self.state);
            return false;
        }
        tracing::info!("Display update starting");
        self.state = UpdateState::Reset;
        true
    }

    /// Do one step of the update. Returns `Ok(true)` once back in idle.
    ///
    /// Any error drops the sequencer back to idle and rewinds the transfer,
    /// so the next update starts from the reset pulse.
    pub fn step<T, C>(&mut self, panel: &mut Inkplate2<T, C>) -> Result<bool, DisplayError>
    where
        T: Transport,
        C: Clock,
    {
        self.advance(panel).inspect_err(|e| {
            tracing::error!("Display update failed in {:?}: {}", self.state, e);
            self.abandon(panel);
        })
    }

    /// Drop an update in progress, if any
    pub fn abandon<T: Transport, C: Clock>(&mut self, panel: &mut Inkplate2<T, C>) {
        self.state = UpdateState::Idle;
        panel.abort_transfer();
    }

    fn advance<T, C>(&mut self, panel: &mut Inkplate2<T, C>) -> Result<bool, DisplayError>
    where
        T: Transport,
        C: Clock,
    {
        match self.state {
            UpdateState::Idle => return Ok(true),
            UpdateState::Reset => {
                panel.reset()?;
                self.state = UpdateState::Initialise;
            }
            UpdateState::Initialise => {
                panel.initialise()?;
                self.begin_wait(panel, UpdateState::WaitInitialise);
            }
            UpdateState::WaitInitialise => {
                if self.idle(panel)? {
                    self.state = UpdateState::PowerOn;
                }
            }
            UpdateState::PowerOn => {
                panel.power_on()?;
                self.transfer_calls = 0;
                self.state = UpdateState::TransferData;
            }
            UpdateState::TransferData => {
                self.transfer_calls += 1;
                if panel.transfer_data()? {
                    tracing::debug!("Transfer finished after {} loop(s)", self.transfer_calls);
                    self.state = UpdateState::RefreshScreen;
                }
            }
            UpdateState::RefreshScreen => {
                panel.refresh_screen()?;
                self.begin_wait(panel, UpdateState::WaitRefresh);
            }
            UpdateState::WaitRefresh => {
                if self.idle(panel)? {
                    self.state = UpdateState::PowerOff;
                }
            }
            UpdateState::PowerOff => {
                panel.power_off()?;
                self.begin_wait(panel, UpdateState::WaitPowerOff);
            }
            UpdateState::WaitPowerOff => {
                if self.idle(panel)? {
                    self.state = UpdateState::DeepSleep;
                }
            }
            UpdateState::DeepSleep => {
                panel.deep_sleep()?;
                self.state = UpdateState::Idle;
                tracing::info!("Display update complete");
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn begin_wait<T: Transport, C: Clock>(&mut self, panel: &Inkplate2<T, C>, next: UpdateState) {
        self.wait_started = panel.now_ms();
        self.state = next;
    }

    /// Poll BUSY once
    fn idle<T: Transport, C: Clock>(&mut self, panel: &mut Inkplate2<T, C>) -> Result<bool, DisplayError> {
        if !panel.is_busy() {
            return Ok(true);
        }

        if panel.now_ms().wrapping_sub(self.wait_started) > self.busy_timeout_ms {
            return Err(DisplayError::BusyTimeout(self.busy_timeout_ms));
        }

        Ok(false)
    }
}

/// Host loop that runs an update to completion
pub struct Scheduler {
    sequencer: Sequencer,
    loop_interval: Duration,
}

impl Scheduler {
    pub fn new(config: &Config) -> Self {
        Self {
            sequencer: Sequencer::new(config.busy_timeout_ms),
            loop_interval: Duration::from_millis(config.loop_interval_ms),
        }
    }

    /// Run one full update, sleeping `loop_interval` between steps.
    ///
    /// Returns the number of loop iterations it took.
    pub async fn run_update<T, C>(&mut self, panel: &mut Inkplate2<T, C>) -> Result<u32, DisplayError>
    where
        T: Transport,
        C: Clock,
    {
        if !self.sequencer.start_update() {
            // Left over from a cycle that never finished
            self.sequencer.abandon(panel);
            self.sequencer.start_update();
        }

        let mut iterations = 0;
        loop {
            iterations += 1;
            if self.sequencer.step(panel)? {
                break;
            }
            tokio::time::sleep(self.loop_interval).await;
        }

        tracing::debug!("Update took {} loop iterations", iterations);
        Ok(iterations)
    }
}
