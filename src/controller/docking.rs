use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_with::SerializeDisplay;
use tracing::{debug, info, instrument, warn};

use crate::error::ControllerError;
use crate::status::StatusSnapshot;

/// Time the robot gets to settle its telemetry between state checks.
pub const DOCK_SETTLE_INTERVAL: Duration = Duration::from_secs(3);
/// State checks made while waiting for the robot to stop running.
pub const DOCK_MAX_ATTEMPTS: u32 = 10;

/// Step of a power-off sequence.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display, SerializeDisplay)]
pub enum DockingState {
    #[display("requested")]
    Requested,
    #[display("pausing")]
    Pausing,
    #[display("waiting to stop (check {attempt})")]
    WaitingToStop { attempt: u32 },
    #[display("docking")]
    Docking,
    #[display("done")]
    Done,
    #[display("failed")]
    Failed,
}

impl DockingState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Bounds of the wait between `pause` and `dock`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DockingPolicy {
    pub settle_interval: Duration,
    pub max_attempts: u32,
}

impl Default for DockingPolicy {
    fn default() -> Self {
        Self {
            settle_interval: DOCK_SETTLE_INTERVAL,
            max_attempts: DOCK_MAX_ATTEMPTS,
        }
    }
}

/// What a completed power-off sequence went through.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockingReport {
    pub transitions: Vec<DockingState>,
    pub state_queries: u32,
}

/// Robot operations the power-off sequence drives.
#[async_trait]
pub(crate) trait DockingOps: Send {
    async fn pause(&mut self) -> Result<(), ControllerError>;
    async fn request_state(&mut self) -> Result<StatusSnapshot, ControllerError>;
    async fn dock(&mut self) -> Result<(), ControllerError>;
    /// Waits out the telemetry settle time.
    async fn settle(&mut self, interval: Duration);
}

/// Power-off state machine: pause a running robot, wait for it to stop, then dock.
#[derive(Debug)]
pub(crate) struct DockingWait {
    policy: DockingPolicy,
    state: DockingState,
    transitions: Vec<DockingState>,
    state_queries: u32,
}

impl DockingWait {
    /// Starts at `Requested` for a running robot and at `Docking` otherwise.
    pub(crate) fn for_snapshot(snapshot: &StatusSnapshot, policy: DockingPolicy) -> Self {
        let state = if snapshot.is_running() {
            DockingState::Requested
        } else {
            DockingState::Docking
        };
        Self {
            policy,
            state,
            transitions: vec![state],
            state_queries: 0,
        }
    }

    #[instrument(skip_all, level = "debug", fields(start = %self.state))]
    pub(crate) async fn run<O: DockingOps>(
        mut self,
        ops: &mut O,
    ) -> Result<DockingReport, ControllerError> {
        while !self.state.is_terminal() {
            match self.step(ops).await {
                Ok(next) => self.enter(next),
                Err(error) => {
                    self.enter(DockingState::Failed);
                    warn!(transitions = ?self.transitions, %error, "power-off sequence failed");
                    return Err(error);
                }
            }
        }

        info!(state_queries = self.state_queries, "robot sent home");
        Ok(DockingReport {
            transitions: self.transitions,
            state_queries: self.state_queries,
        })
    }

    async fn step<O: DockingOps>(&mut self, ops: &mut O) -> Result<DockingState, ControllerError> {
        match self.state {
            DockingState::Requested => Ok(DockingState::Pausing),
            DockingState::Pausing => {
                ops.pause().await?;
                Ok(DockingState::WaitingToStop { attempt: 1 })
            }
            DockingState::WaitingToStop { attempt } => {
                self.state_queries += 1;
                let snapshot = ops.request_state().await?;
                if !snapshot.is_running() {
                    return Ok(DockingState::Docking);
                }
                if attempt >= self.policy.max_attempts {
                    return Err(ControllerError::DockTimeout { attempts: attempt });
                }
                debug!(attempt, "robot still running");
                ops.settle(self.policy.settle_interval).await;
                Ok(DockingState::WaitingToStop {
                    attempt: attempt + 1,
                })
            }
            DockingState::Docking => {
                ops.dock().await?;
                Ok(DockingState::Done)
            }
            terminal @ (DockingState::Done | DockingState::Failed) => Ok(terminal),
        }
    }

    fn enter(&mut self, next: DockingState) {
        debug!(from = %self.state, to = %next, "power-off transition");
        self.state = next;
        self.transitions.push(next);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::TransportError;
    use crate::hw::DeviceCommand;
    use crate::status::{MissionTelemetry, Telemetry};

    #[derive(Debug, Clone, Eq, PartialEq)]
    enum Op {
        Pause,
        RequestState,
        Dock,
        Settle(Duration),
    }

    #[derive(Default)]
    struct ScriptedOps {
        phases: VecDeque<&'static str>,
        fallback_phase: &'static str,
        failing: Option<DeviceCommand>,
        log: Vec<Op>,
    }

    impl ScriptedOps {
        fn reporting(phases: &[&'static str], fallback_phase: &'static str) -> Self {
            Self {
                phases: phases.iter().copied().collect(),
                fallback_phase,
                ..Self::default()
            }
        }

        fn fail(&self, command: DeviceCommand) -> Result<(), ControllerError> {
            if self.failing == Some(command) {
                return Err(ControllerError::Command {
                    command,
                    source: TransportError::Closed,
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DockingOps for ScriptedOps {
        async fn pause(&mut self) -> Result<(), ControllerError> {
            self.log.push(Op::Pause);
            self.fail(DeviceCommand::Pause)
        }

        async fn request_state(&mut self) -> Result<StatusSnapshot, ControllerError> {
            self.log.push(Op::RequestState);
            let phase = self.phases.pop_front().unwrap_or(self.fallback_phase);
            Ok(StatusSnapshot::default().observe(&Telemetry {
                clean_mission_status: Some(MissionTelemetry {
                    phase: Some(phase.to_string()),
                }),
                ..Telemetry::default()
            }))
        }

        async fn dock(&mut self) -> Result<(), ControllerError> {
            self.log.push(Op::Dock);
            self.fail(DeviceCommand::Dock)
        }

        async fn settle(&mut self, interval: Duration) {
            self.log.push(Op::Settle(interval));
        }
    }

    fn running() -> StatusSnapshot {
        StatusSnapshot::default().observe(&Telemetry {
            clean_mission_status: Some(MissionTelemetry {
                phase: Some("run".to_string()),
            }),
            ..Telemetry::default()
        })
    }

    #[tokio::test]
    async fn running_robot_is_paused_checked_then_docked() {
        let mut ops = ScriptedOps::reporting(&["run", "stop"], "stop");

        let report = DockingWait::for_snapshot(&running(), DockingPolicy::default())
            .run(&mut ops)
            .await
            .expect("sequence should complete");

        assert_eq!(
            vec![
                Op::Pause,
                Op::RequestState,
                Op::Settle(DOCK_SETTLE_INTERVAL),
                Op::RequestState,
                Op::Dock,
            ],
            ops.log
        );
        assert_eq!(
            vec![
                DockingState::Requested,
                DockingState::Pausing,
                DockingState::WaitingToStop { attempt: 1 },
                DockingState::WaitingToStop { attempt: 2 },
                DockingState::Docking,
                DockingState::Done,
            ],
            report.transitions
        );
        assert_eq!(2, report.state_queries);
    }

    #[tokio::test]
    async fn idle_robot_is_docked_without_pausing() {
        let mut ops = ScriptedOps::default();

        let report = DockingWait::for_snapshot(&StatusSnapshot::default(), DockingPolicy::default())
            .run(&mut ops)
            .await
            .expect("sequence should complete");

        assert_eq!(vec![Op::Dock], ops.log);
        assert_eq!(
            vec![DockingState::Docking, DockingState::Done],
            report.transitions
        );
    }

    #[tokio::test]
    async fn robot_that_never_stops_times_out_without_docking() {
        let policy = DockingPolicy {
            settle_interval: Duration::from_millis(5),
            max_attempts: 4,
        };
        let mut ops = ScriptedOps::reporting(&[], "run");

        let result = DockingWait::for_snapshot(&running(), policy)
            .run(&mut ops)
            .await;

        assert_matches!(result, Err(ControllerError::DockTimeout { attempts: 4 }));
        assert!(!ops.log.contains(&Op::Dock));
        assert_eq!(
            4,
            ops.log.iter().filter(|op| **op == Op::RequestState).count()
        );
    }

    #[tokio::test]
    async fn failed_pause_stops_the_sequence() {
        let mut ops = ScriptedOps {
            failing: Some(DeviceCommand::Pause),
            ..ScriptedOps::default()
        };

        let result = DockingWait::for_snapshot(&running(), DockingPolicy::default())
            .run(&mut ops)
            .await;

        assert_matches!(
            result,
            Err(ControllerError::Command {
                command: DeviceCommand::Pause,
                ..
            })
        );
        assert_eq!(vec![Op::Pause], ops.log);
    }

    #[tokio::test]
    async fn failed_dock_is_surfaced() {
        let mut ops = ScriptedOps {
            failing: Some(DeviceCommand::Dock),
            ..ScriptedOps::default()
        };

        let result = DockingWait::for_snapshot(&StatusSnapshot::default(), DockingPolicy::default())
            .run(&mut ops)
            .await;

        assert_matches!(
            result,
            Err(ControllerError::Command {
                command: DeviceCommand::Dock,
                ..
            })
        );
    }
}
