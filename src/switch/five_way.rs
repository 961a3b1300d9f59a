//! Five-position hat built from two three-way axes.
//!
//! The backend exposes the hat as two independent channels. Axis A reads
//! left (0), center (1) or right (2); axis B reads down (0), center (1) or
//! up (2). Both axes report center while the other is deflected, so a
//! center reading only counts when the other axis is centered too.

use std::sync::{Arc, Mutex};

use super::{Position, Switch, SwitchCore, SwitchError};
use crate::controls::ControlsClient;
use crate::pubsub::TransportError;

/// F-16C ICP DCS switch, return/sequence axis.
pub const ICP_DATA_RTN_SEQ_SW: &str = "ICP_DATA_RTN_SEQ_SW";
/// F-16C ICP DCS switch, up/down axis.
pub const ICP_DATA_UP_DN_SW: &str = "ICP_DATA_UP_DN_SW";

const AXIS_DOWN: i16 = 0;
const AXIS_CENTER: i16 = 1;
const AXIS_UP: i16 = 2;

/// Position of a [`FiveWaySwitch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiveWay {
    /// Both axes at rest (raw 0).
    Center,
    /// Pushed forward, axis B up (raw 1).
    Up,
    /// Pushed right, axis A up (raw 2).
    Right,
    /// Pulled back, axis B down (raw 3).
    Down,
    /// Pushed left, axis A down (raw 4).
    Left,
}

impl Position for FiveWay {
    fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(Self::Center),
            1 => Some(Self::Up),
            2 => Some(Self::Right),
            3 => Some(Self::Down),
            4 => Some(Self::Left),
            _ => None,
        }
    }

    fn raw(self) -> i16 {
        match self {
            Self::Center => 0,
            Self::Up => 1,
            Self::Right => 2,
            Self::Down => 3,
            Self::Left => 4,
        }
    }
}

/// One of the two channels behind a [`FiveWaySwitch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Left/right axis.
    A,
    /// Down/up axis.
    B,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Derived position for a reading `raw` on `axis`, given the other axis's
/// last reading. `None` means the reading does not change the position.
pub fn reduce(axis: Axis, raw: i16, other_raw: i16) -> Option<FiveWay> {
    match (axis, raw) {
        (Axis::A, AXIS_DOWN) => Some(FiveWay::Left),
        (Axis::A, AXIS_UP) => Some(FiveWay::Right),
        (Axis::B, AXIS_DOWN) => Some(FiveWay::Down),
        (Axis::B, AXIS_UP) => Some(FiveWay::Up),
        (_, AXIS_CENTER) if other_raw == AXIS_CENTER => Some(FiveWay::Center),
        _ => None,
    }
}

/// Hat switch that springs back to center.
#[derive(Debug)]
pub struct FiveWaySwitch {
    axis_a: String,
    axis_b: String,
    core: SwitchCore<FiveWay>,
}

impl FiveWaySwitch {
    /// Bind to the two axis channels. Both axes are assumed centered until
    /// they report otherwise.
    pub fn new(
        controls: &ControlsClient,
        axis_a: impl Into<String>,
        axis_b: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let axis_a = axis_a.into();
        let axis_b = axis_b.into();
        let core = SwitchCore::new(controls.clone());
        let raws = Arc::new(Mutex::new([AXIS_CENTER; 2]));

        for (axis, channel) in [(Axis::A, &axis_a), (Axis::B, &axis_b)] {
            let raws = Arc::clone(&raws);
            core.watch(channel, move |cell, raw| {
                let other_raw = {
                    let mut raws = raws.lock().expect("axis lock poisoned");
                    if (AXIS_DOWN..=AXIS_UP).contains(&raw) {
                        raws[axis.index()] = raw;
                    }
                    raws[axis.other().index()]
                };
                cell.update(reduce(axis, raw, other_raw));
            })?;
        }

        Ok(Self {
            axis_a,
            axis_b,
            core,
        })
    }

    /// The F-16C ICP DCS ("dobber") switch.
    pub fn icp_data_control(controls: &ControlsClient) -> Result<Self, TransportError> {
        Self::new(controls, ICP_DATA_RTN_SEQ_SW, ICP_DATA_UP_DN_SW)
    }

    /// Deflect up, wait for `Up`, recenter.
    pub async fn up(&self) -> Result<(), SwitchError> {
        self.deflect(FiveWay::Up).await
    }

    /// Deflect right, wait for `Right`, recenter.
    pub async fn right(&self) -> Result<(), SwitchError> {
        self.deflect(FiveWay::Right).await
    }

    /// Deflect down, wait for `Down`, recenter.
    pub async fn down(&self) -> Result<(), SwitchError> {
        self.deflect(FiveWay::Down).await
    }

    /// Deflect left, wait for `Left`, recenter.
    pub async fn left(&self) -> Result<(), SwitchError> {
        self.deflect(FiveWay::Left).await
    }

    async fn deflect(&self, target: FiveWay) -> Result<(), SwitchError> {
        let (channel, raw) = match target {
            FiveWay::Right => (&self.axis_a, AXIS_UP),
            FiveWay::Left => (&self.axis_a, AXIS_DOWN),
            FiveWay::Up => (&self.axis_b, AXIS_UP),
            FiveWay::Down => (&self.axis_b, AXIS_DOWN),
            FiveWay::Center => return Ok(()),
        };
        self.core
            .actuate(channel, raw, target, Some(AXIS_CENTER))
            .await
    }
}

impl Switch for FiveWaySwitch {
    type State = FiveWay;

    fn core(&self) -> &SwitchCore<FiveWay> {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ControlsSurface;
    use crate::notifications::Notifications;
    use crate::pubsub::{Subscription, Surface};
    use crate::switch::testing::{input, response};

    #[test]
    fn test_reduce_table() {
        assert_eq!(reduce(Axis::A, 0, 1), Some(FiveWay::Left));
        assert_eq!(reduce(Axis::A, 2, 0), Some(FiveWay::Right));
        assert_eq!(reduce(Axis::B, 0, 1), Some(FiveWay::Down));
        assert_eq!(reduce(Axis::B, 2, 2), Some(FiveWay::Up));
        assert_eq!(reduce(Axis::A, 1, 1), Some(FiveWay::Center));
        assert_eq!(reduce(Axis::B, 1, 1), Some(FiveWay::Center));
    }

    #[test]
    fn test_reduce_center_needs_both_axes() {
        assert_eq!(reduce(Axis::A, 1, 2), None);
        assert_eq!(reduce(Axis::A, 1, 0), None);
        assert_eq!(reduce(Axis::B, 1, 2), None);
        assert_eq!(reduce(Axis::B, 3, 1), None);
    }

    type Seen = Arc<Mutex<Vec<Option<FiveWay>>>>;

    fn icp() -> (FiveWaySwitch, ControlsSurface, Seen, Subscription) {
        let (controls, _outbox) = ControlsClient::detached(Notifications::new());
        let surface = controls.surface();
        let switch = FiveWaySwitch::icp_data_control(&controls).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sub = switch.subscribe(move |v| s.lock().unwrap().push(v));
        seen.lock().unwrap().clear();
        (switch, surface, seen, sub)
    }

    #[test]
    fn test_axis_readings_produce_derived_states() {
        let (_switch, surface, seen, _sub) = icp();

        surface.received(response(ICP_DATA_RTN_SEQ_SW, 2)).unwrap();
        surface.received(response(ICP_DATA_RTN_SEQ_SW, 1)).unwrap();
        surface.received(response(ICP_DATA_UP_DN_SW, 1)).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(FiveWay::Right), Some(FiveWay::Center), Some(FiveWay::Center)]
        );
    }

    #[test]
    fn test_center_on_one_axis_is_suppressed_while_other_deflected() {
        let (switch, surface, seen, _sub) = icp();

        surface.received(response(ICP_DATA_UP_DN_SW, 2)).unwrap();
        surface.received(response(ICP_DATA_RTN_SEQ_SW, 1)).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(FiveWay::Up), Some(FiveWay::Up)]
        );
        assert_eq!(switch.state(), Some(FiveWay::Up));

        surface.received(response(ICP_DATA_UP_DN_SW, 1)).unwrap();
        assert_eq!(switch.state(), Some(FiveWay::Center));
    }

    #[tokio::test]
    async fn test_actions_drive_the_right_axis() {
        let (controls, mut outbox) = ControlsClient::detached(Notifications::new());
        let surface = controls.surface();
        let switch = Arc::new(FiveWaySwitch::icp_data_control(&controls).unwrap());

        let task = tokio::spawn({
            let switch = Arc::clone(&switch);
            async move { switch.left().await }
        });
        assert_eq!(outbox.recv().await.unwrap(), input(ICP_DATA_RTN_SEQ_SW, 0));
        surface.received(response(ICP_DATA_RTN_SEQ_SW, 0)).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(outbox.try_recv().unwrap(), input(ICP_DATA_RTN_SEQ_SW, 1));

        let task = tokio::spawn({
            let switch = Arc::clone(&switch);
            async move { switch.up().await }
        });
        assert_eq!(outbox.recv().await.unwrap(), input(ICP_DATA_UP_DN_SW, 2));
        surface.received(response(ICP_DATA_UP_DN_SW, 2)).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(outbox.try_recv().unwrap(), input(ICP_DATA_UP_DN_SW, 1));
    }
}
