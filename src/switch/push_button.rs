//! Momentary two-position button.

use super::{Position, Switch, SwitchCore, SwitchError};
use crate::controls::ControlsClient;
use crate::pubsub::TransportError;

/// Position of a [`PushButton`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonState {
    /// At rest (0).
    Released,
    /// Held down (1).
    Pressed,
}

impl Position for ButtonState {
    fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(Self::Released),
            1 => Some(Self::Pressed),
            _ => None,
        }
    }

    fn raw(self) -> i16 {
        match self {
            Self::Released => 0,
            Self::Pressed => 1,
        }
    }
}

/// Button that springs back to released.
#[derive(Debug)]
pub struct PushButton {
    name: String,
    core: SwitchCore<ButtonState>,
}

impl PushButton {
    /// Bind to control channel `name`.
    pub fn new(controls: &ControlsClient, name: impl Into<String>) -> Result<Self, TransportError> {
        let name = name.into();
        let core = SwitchCore::new(controls.clone());
        core.watch_position(&name)?;
        Ok(Self { name, core })
    }

    /// Channel this button drives.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Press, wait until the backend reports the button pressed, release.
    ///
    /// # Errors
    ///
    /// Returns [`SwitchError`] if an input cannot be sent or the button is
    /// destroyed while waiting.
    pub async fn click(&self) -> Result<(), SwitchError> {
        self.core
            .actuate(
                &self.name,
                ButtonState::Pressed.raw(),
                ButtonState::Pressed,
                Some(ButtonState::Released.raw()),
            )
            .await
    }
}

impl Switch for PushButton {
    type State = ButtonState;

    fn core(&self) -> &SwitchCore<ButtonState> {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::Notifications;
    use crate::pubsub::Surface;
    use crate::switch::testing::{input, response};
    use crate::switch::WaitError;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_click_releases_only_after_pressed_is_reported() {
        let (controls, mut outbox) = ControlsClient::detached(Notifications::new());
        let surface = controls.surface();
        surface.opened();

        let button = Arc::new(PushButton::new(&controls, "MASTER_CAUTION").unwrap());
        assert_eq!(surface.sync(), vec![r#"{"Subscribe":"MASTER_CAUTION"}"#]);
        surface.received(response("MASTER_CAUTION", 0)).unwrap();
        assert_eq!(button.state(), Some(ButtonState::Released));

        let task = tokio::spawn({
            let button = Arc::clone(&button);
            async move { button.click().await }
        });

        assert_eq!(outbox.recv().await.unwrap(), input("MASTER_CAUTION", 1));
        tokio::task::yield_now().await;
        assert!(outbox.try_recv().is_err());

        surface.received(response("MASTER_CAUTION", 1)).unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(outbox.try_recv().unwrap(), input("MASTER_CAUTION", 0));
        assert_eq!(button.state(), Some(ButtonState::Pressed));
    }

    #[tokio::test]
    async fn test_destroy_ends_pending_click() {
        let (controls, mut outbox) = ControlsClient::detached(Notifications::new());
        let button = Arc::new(PushButton::new(&controls, "MASTER_CAUTION").unwrap());

        let task = tokio::spawn({
            let button = Arc::clone(&button);
            async move { button.click().await }
        });
        assert_eq!(outbox.recv().await.unwrap(), input("MASTER_CAUTION", 1));

        button.destroy();
        assert_eq!(task.await.unwrap(), Err(SwitchError::Wait(WaitError::Closed)));
        assert!(outbox.try_recv().is_err());
        assert_eq!(button.click().await, Err(SwitchError::Wait(WaitError::Closed)));
    }

    #[test]
    fn test_unknown_values_are_ignored() {
        let (controls, _outbox) = ControlsClient::detached(Notifications::new());
        let surface = controls.surface();
        let button = PushButton::new(&controls, "GEAR_HORN").unwrap();

        surface.received(response("GEAR_HORN", 1)).unwrap();
        surface.received(response("GEAR_HORN", 7)).unwrap();
        surface
            .received(crate::ws::WsMessage::Text(
                r#"{"name":"GEAR_HORN","outputs":[{"String":"x"}]}"#.into(),
            ))
            .unwrap();

        assert_eq!(button.state(), Some(ButtonState::Pressed));
    }
}
