use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ControllerError;

/// Commands issued on behalf of the accessory host or a user.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, derive_more::Display)]
pub enum UserCommand {
    #[display("turn on")]
    TurnOn,
    #[display("turn off")]
    TurnOff,
    #[display("identify")]
    Identify,
}

#[derive(Debug, Default)]
struct Admission {
    user: Option<UserCommand>,
    poll: Option<CancellationToken>,
}

/// Single admission slot in front of the robot session.
///
/// A user command is refused with `Busy` while another user command holds the
/// slot, and pre-empts an in-flight poll. A poll is skipped whenever the slot
/// is taken.
#[derive(Debug, Default)]
pub(crate) struct CommandSerializer {
    admission: Mutex<Admission>,
    session_slot: Arc<tokio::sync::Mutex<()>>,
}

impl CommandSerializer {
    /// Admits a user command, waiting for a pre-empted poll to release its session.
    pub(crate) async fn admit_user(
        self: &Arc<Self>,
        command: UserCommand,
    ) -> Result<UserPermit, ControllerError> {
        {
            let mut admission = self.admission.lock();
            if let Some(in_flight) = admission.user {
                return Err(ControllerError::Busy {
                    requested: command,
                    in_flight,
                });
            }
            admission.user = Some(command);
            if let Some(poll) = admission.poll.take() {
                debug!(%command, "pre-empting in-flight poll");
                poll.cancel();
            }
        }

        let reservation = UserReservation {
            serializer: Arc::clone(self),
        };
        let slot = Arc::clone(&self.session_slot).lock_owned().await;
        Ok(UserPermit {
            _slot: slot,
            _reservation: reservation,
        })
    }

    /// Admits a poll only when nothing else holds or awaits the slot.
    pub(crate) fn admit_poll(self: &Arc<Self>) -> Option<PollPermit> {
        let mut admission = self.admission.lock();
        if admission.user.is_some() || admission.poll.is_some() {
            return None;
        }
        let slot = Arc::clone(&self.session_slot).try_lock_owned().ok()?;
        let cancellation = CancellationToken::new();
        admission.poll = Some(cancellation.clone());
        Some(PollPermit {
            serializer: Arc::clone(self),
            cancellation,
            _slot: slot,
        })
    }

    /// The user command currently holding or awaiting the slot.
    pub(crate) fn user_in_flight(&self) -> Option<UserCommand> {
        self.admission.lock().user
    }
}

#[derive(Debug)]
struct UserReservation {
    serializer: Arc<CommandSerializer>,
}

impl Drop for UserReservation {
    fn drop(&mut self) {
        self.serializer.admission.lock().user = None;
    }
}

/// Held for the duration of a user command.
#[derive(Debug)]
pub(crate) struct UserPermit {
    _slot: OwnedMutexGuard<()>,
    _reservation: UserReservation,
}

/// Held for the duration of a poll.
pub(crate) struct PollPermit {
    serializer: Arc<CommandSerializer>,
    cancellation: CancellationToken,
    _slot: OwnedMutexGuard<()>,
}

impl PollPermit {
    /// Cancelled when a user command pre-empts this poll.
    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl Drop for PollPermit {
    fn drop(&mut self) {
        self.serializer.admission.lock().poll = None;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn second_user_command_is_busy() {
        let serializer = Arc::new(CommandSerializer::default());
        let _first = serializer
            .admit_user(UserCommand::TurnOn)
            .await
            .expect("idle slot should admit");

        let second = serializer.admit_user(UserCommand::Identify).await;

        assert_matches!(
            second,
            Err(ControllerError::Busy {
                requested: UserCommand::Identify,
                in_flight: UserCommand::TurnOn,
            })
        );
    }

    #[tokio::test]
    async fn slot_is_released_when_the_permit_drops() {
        let serializer = Arc::new(CommandSerializer::default());
        let first = serializer
            .admit_user(UserCommand::TurnOff)
            .await
            .expect("idle slot should admit");
        drop(first);

        assert_eq!(None, serializer.user_in_flight());
        assert!(serializer.admit_poll().is_some());
    }

    #[tokio::test]
    async fn poll_is_skipped_while_a_user_command_holds_the_slot() {
        let serializer = Arc::new(CommandSerializer::default());
        let _user = serializer
            .admit_user(UserCommand::TurnOn)
            .await
            .expect("idle slot should admit");

        assert!(serializer.admit_poll().is_none());
    }

    #[tokio::test]
    async fn poll_does_not_overlap_itself() {
        let serializer = Arc::new(CommandSerializer::default());
        let _poll = serializer.admit_poll().expect("idle slot should admit a poll");

        assert!(serializer.admit_poll().is_none());
    }

    #[tokio::test]
    async fn user_command_cancels_poll_and_waits_for_its_release() {
        let serializer = Arc::new(CommandSerializer::default());
        let poll = serializer.admit_poll().expect("idle slot should admit a poll");
        let cancellation = poll.cancellation().clone();

        let waiting = tokio::spawn({
            let serializer = Arc::clone(&serializer);
            async move { serializer.admit_user(UserCommand::Identify).await.is_ok() }
        });
        tokio::task::yield_now().await;

        assert!(cancellation.is_cancelled());
        assert_eq!(Some(UserCommand::Identify), serializer.user_in_flight());
        assert!(!waiting.is_finished());

        drop(poll);
        assert!(waiting.await.expect("admission task should not panic"));
    }
}
