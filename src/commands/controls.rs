//! Controls surface commands.

use anyhow::{Context, Result};

use super::{ended, until_connected, until_terminal};
use crate::config::PanelConfig;
use crate::controls::ControlsClient;
use crate::notifications::Notifications;
use crate::protocol::{Input, InputValue, Output, Response};
use crate::switch::{FiveWaySwitch, Push3WayButton, PushButton, SwitchError};

/// Direction for a spring-loaded rocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Rocker {
    /// Push up.
    Up,
    /// Push down.
    Down,
}

/// Direction for the ICP DCS hat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Hat {
    /// Up.
    Up,
    /// Right.
    Right,
    /// Down.
    Down,
    /// Left.
    Left,
}

/// One line per response: `NAME value [value...]`.
pub fn describe(response: &Response) -> String {
    let mut line = response.name.clone();
    for output in &response.outputs {
        line.push(' ');
        match output {
            Output::Integer(n) => line.push_str(&n.to_string()),
            Output::String(s) => line.push_str(&format!("{s:?}")),
        }
    }
    line
}

fn connect(config: &PanelConfig) -> Result<ControlsClient> {
    ControlsClient::connect(config, Notifications::new()).context("failed to open controls stream")
}

/// Print every response on `names` until Ctrl-C or the stream closes.
pub async fn watch(config: &PanelConfig, names: &[String]) -> Result<()> {
    let controls = connect(config)?;
    let mut subscriptions = Vec::with_capacity(names.len());
    for name in names {
        subscriptions.push(controls.subscribe(name.as_str(), |response| {
            if let Some(response) = response {
                println!("{}", describe(response));
            }
        })?);
    }

    let state = controls.connection_state().context("controls client has no connection")?;
    tokio::select! {
        closed = until_terminal(state) => return Err(ended(closed)),
        result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl-C")?,
    }

    drop(subscriptions);
    controls.shutdown();
    Ok(())
}

/// Send one input and close.
pub async fn send(config: &PanelConfig, name: &str, value: InputValue) -> Result<()> {
    let controls = connect(config)?;
    let mut state = controls.connection_state().context("controls client has no connection")?;
    controls.send(Input::new(name, value))?;
    until_connected(&mut state).await?;
    controls.shutdown();
    until_terminal(state).await;
    Ok(())
}

async fn run_action<F>(controls: &ControlsClient, action: F) -> Result<()>
where
    F: std::future::Future<Output = Result<(), SwitchError>>,
{
    let state = controls.connection_state().context("controls client has no connection")?;
    tokio::select! {
        result = action => result?,
        closed = until_terminal(state.clone()) => return Err(ended(closed)),
    }
    controls.shutdown();
    until_terminal(state).await;
    Ok(())
}

/// Click a push button.
pub async fn click(config: &PanelConfig, name: &str) -> Result<()> {
    let controls = connect(config)?;
    let button = PushButton::new(&controls, name)?;
    run_action(&controls, button.click()).await
}

/// Push a three-way rocker and let it return to center.
pub async fn push3(config: &PanelConfig, name: &str, direction: Rocker) -> Result<()> {
    let controls = connect(config)?;
    let rocker = Push3WayButton::new(&controls, name)?;
    match direction {
        Rocker::Up => run_action(&controls, rocker.up()).await,
        Rocker::Down => run_action(&controls, rocker.down()).await,
    }
}

/// Flick the F-16C ICP DCS switch.
pub async fn icp(config: &PanelConfig, direction: Hat) -> Result<()> {
    let controls = connect(config)?;
    let hat = FiveWaySwitch::icp_data_control(&controls)?;
    match direction {
        Hat::Up => run_action(&controls, hat.up()).await,
        Hat::Right => run_action(&controls, hat.right()).await,
        Hat::Down => run_action(&controls, hat.down()).await,
        Hat::Left => run_action(&controls, hat.left()).await,
    }
}
