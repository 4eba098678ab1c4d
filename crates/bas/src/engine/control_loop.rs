//! Periodic control loop service
//!
//! One tick, in order:
//! 1. apply queued commands
//! 2. make sure the relay link is up (subject to its reconnect cooldown)
//! 3. evaluate occupancy from the configured schedule
//! 4. step every unit through the controller
//! 5. write fan, cool and heat relays for hardware-mapped units
//!
//! State is locked only for steps 1, 3 and 4; link I/O happens after the
//! lock is released so readers are never held up by serial writes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bas_runtime::{Service, ServiceContext, ServiceResult, ServiceSpec};
use bas_types::{AuditKind, OutputKey, Unit};
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, trace, warn};

use super::handle::CommandQueue;
use super::state::DEFAULT_SCHEDULE_ID;
use super::{EngineHandle, EngineState};
use crate::clock::Clock;
use crate::controller::{AlarmTransition, TickContext, step_unit};
use crate::link::{LinkStatus, SerialLink};
use crate::schedule;

pub const CONTROL_LOOP_ID: &str = "bas/control-loop";

/// Tuning for the control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOptions {
    pub poll_interval: Duration,
    /// Schedule that decides site occupancy
    pub occupancy_schedule: String,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            occupancy_schedule: DEFAULT_SCHEDULE_ID.to_string(),
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub occupied: bool,
    /// Units stepped
    pub units: usize,
    pub frames_sent: usize,
    pub link: LinkStatus,
    /// A write failed this tick and the link was dropped
    pub link_lost: bool,
}

struct AlarmNotice {
    topic: &'static str,
    payload: serde_json::Value,
}

pub struct ControlLoop {
    options: ControlOptions,
    handle: EngineHandle,
    queue: CommandQueue,
    link: Arc<SerialLink>,
    clock: Arc<dyn Clock>,
}

impl ControlLoop {
    pub fn new(
        state: EngineState,
        link: Arc<SerialLink>,
        clock: Arc<dyn Clock>,
        options: ControlOptions,
    ) -> Self {
        let (handle, queue) = EngineHandle::new(state);
        Self {
            options,
            handle,
            queue,
            link,
            clock,
        }
    }

    /// Handle for readers and for queueing changes
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn link(&self) -> &Arc<SerialLink> {
        &self.link
    }

    /// Run a single tick
    pub async fn tick(&mut self, ctx: &ServiceContext) -> TickSummary {
        let local_now = self.clock.now();
        let now = local_now.with_timezone(&Utc);
        let commands = self.queue.drain();

        let link = self.link.ensure_connected().await;
        if link == LinkStatus::Connected {
            ctx.emit("link/connected", json!({ "port": self.link.settings().port }));
        }

        let (occupied, units, writes, notices) = {
            let mut guard = self.handle.shared().write();
            let state = &mut *guard;

            for command in commands {
                state.apply(command, now);
            }

            let occupied =
                schedule::evaluate(&state.schedules, &self.options.occupancy_schedule, &local_now);
            if occupied != state.occupied {
                info!(occupied, "Occupancy changed");
            }
            state.occupied = occupied;

            let tick = TickContext {
                occupied,
                emergency_stop: state.settings.emergency_stop,
                now,
            };

            let mut writes = Vec::new();
            let mut notices = Vec::new();
            for unit in state.units.values_mut() {
                let previous_mode = unit.mode;
                let outcome = step_unit(unit, &tick);

                if unit.mode != previous_mode {
                    debug!(unit_id = %unit.id, mode = %unit.mode, "Mode changed");
                }

                match outcome.alarm {
                    AlarmTransition::Raised => {
                        warn!(unit_id = %unit.id, temperature = unit.temperature, "High temperature alarm");
                        state.audit.record(AuditKind::Alarm, &unit.name, "High Temp Detected", now);
                        notices.push(alarm_notice("unit/alarm-raised", unit));
                    }
                    AlarmTransition::Cleared => {
                        info!(unit_id = %unit.id, temperature = unit.temperature, "High temperature cleared");
                        state
                            .audit
                            .record(AuditKind::Normal, &unit.name, "High Temp Returned to Normal", now);
                        notices.push(alarm_notice("unit/alarm-cleared", unit));
                    }
                    AlarmTransition::None => {}
                }

                if unit.hardware_mapped {
                    writes.push(relay_writes(unit));
                }
            }

            (occupied, state.units.len(), writes, notices)
        };

        for notice in notices {
            ctx.emit(notice.topic, notice.payload);
        }

        // The link logs its own loss; the tick itself still succeeds
        let mut frames_sent = 0;
        let mut link_lost = false;
        for sequence in writes.iter().filter(|w| !w.is_empty()) {
            match self.link.write_sequence(sequence).await {
                Ok(sent) => frames_sent += sent,
                Err(e) => {
                    debug!(error = %e, "Relay writes abandoned for this tick");
                    ctx.emit("link/lost", json!({ "port": self.link.settings().port }));
                    link_lost = true;
                    break;
                }
            }
        }

        TickSummary {
            occupied,
            units,
            frames_sent,
            link,
            link_lost,
        }
    }
}

/// Relay writes for a unit's switched outputs, in fan, cool, heat order
fn relay_writes(unit: &Unit) -> Vec<(u16, bool)> {
    OutputKey::SWITCHED
        .iter()
        .filter_map(|&key| unit.relays.get(key).map(|relay| (relay, unit.outputs.is_on(key))))
        .collect()
}

fn alarm_notice(topic: &'static str, unit: &Unit) -> AlarmNotice {
    AlarmNotice {
        topic,
        payload: json!({
            "unit_id": unit.id,
            "name": unit.name,
            "key": crate::controller::HIGH_TEMP_ALARM,
            "temperature": unit.temperature,
        }),
    }
}

#[async_trait]
impl Service for ControlLoop {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec::periodic(CONTROL_LOOP_ID, "Control Loop", self.options.poll_interval)
    }

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        info!(
            port = %self.link.settings().port,
            baud_rate = self.link.settings().baud_rate,
            poll_ms = self.options.poll_interval.as_millis() as u64,
            schedule = %self.options.occupancy_schedule,
            "Starting control loop"
        );
        Ok(())
    }

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        self.link.close().await;
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &ServiceContext) -> ServiceResult<()> {
        let summary = self.tick(ctx).await;
        trace!(
            occupied = summary.occupied,
            units = summary.units,
            frames = summary.frames_sent,
            "Tick complete"
        );
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
