//! Three-position controls: a spring-loaded rocker and a latching toggle.

use super::{Position, Switch, SwitchCore, SwitchError};
use crate::controls::ControlsClient;
use crate::pubsub::TransportError;

/// Position of a three-way control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreeWay {
    /// Held or latched down (raw 0).
    Down,
    /// Centered, the rest position of a rocker (raw 1).
    Center,
    /// Held or latched up (raw 2).
    Up,
}

impl Position for ThreeWay {
    fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(Self::Down),
            1 => Some(Self::Center),
            2 => Some(Self::Up),
            _ => None,
        }
    }

    fn raw(self) -> i16 {
        match self {
            Self::Down => 0,
            Self::Center => 1,
            Self::Up => 2,
        }
    }
}

/// Rocker that springs back to center.
#[derive(Debug)]
pub struct Push3WayButton {
    name: String,
    core: SwitchCore<ThreeWay>,
}

impl Push3WayButton {
    /// Bind to control channel `name`.
    pub fn new(controls: &ControlsClient, name: impl Into<String>) -> Result<Self, TransportError> {
        let name = name.into();
        let core = SwitchCore::new(controls.clone());
        core.watch_position(&name)?;
        Ok(Self { name, core })
    }

    /// Channel this rocker drives.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Push up, wait for `Up`, return to center.
    pub async fn up(&self) -> Result<(), SwitchError> {
        self.push(ThreeWay::Up).await
    }

    /// Push down, wait for `Down`, return to center.
    pub async fn down(&self) -> Result<(), SwitchError> {
        self.push(ThreeWay::Down).await
    }

    async fn push(&self, target: ThreeWay) -> Result<(), SwitchError> {
        self.core
            .actuate(&self.name, target.raw(), target, Some(ThreeWay::Center.raw()))
            .await
    }
}

impl Switch for Push3WayButton {
    type State = ThreeWay;

    fn core(&self) -> &SwitchCore<ThreeWay> {
        &self.core
    }
}

/// Three-position toggle that stays where it is put.
#[derive(Debug)]
pub struct Toggle3WaySwitch {
    name: String,
    core: SwitchCore<ThreeWay>,
}

impl Toggle3WaySwitch {
    /// Bind to control channel `name`.
    pub fn new(controls: &ControlsClient, name: impl Into<String>) -> Result<Self, TransportError> {
        let name = name.into();
        let core = SwitchCore::new(controls.clone());
        core.watch_position(&name)?;
        Ok(Self { name, core })
    }

    /// Channel this toggle drives.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Move to `position` and wait until the backend reports it.
    pub async fn set(&self, position: ThreeWay) -> Result<(), SwitchError> {
        self.core
            .actuate(&self.name, position.raw(), position, None)
            .await
    }
}

impl Switch for Toggle3WaySwitch {
    type State = ThreeWay;

    fn core(&self) -> &SwitchCore<ThreeWay> {
        &self.core
    }
}
