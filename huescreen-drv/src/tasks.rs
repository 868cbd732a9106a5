use crate::err::SaverResult;
use crate::hue::HueGateway;
use crate::status::{publish, RWatchReceiver, RWatchSender};
use async_channel::{Receiver, Sender};
use chrono::Local;
use futures::stream;
use huescreen_lib::{Engine, Lang, ScreenCmd, ScreenState, StateReport};
use influxdb2::models::DataPoint;
use rumqttc::{AsyncClient, Publish, QoS};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;

#[derive(Debug)]
pub enum EngineMsg {
    Motion(bool),
    Refresh,
}

/// Polls the bridge once per interval and feeds the result into the
/// engine. One request in flight at a time.
pub async fn poller(
    gateway: HueGateway,
    interval: Duration,
    to_engine: Sender<EngineMsg>,
) -> SaverResult {
    loop {
        sleep(interval).await;
        let motion = gateway.fetch_motion().await;
        tracing::debug!("poll result: motion={}", motion);
        to_engine.send(EngineMsg::Motion(motion)).await?;
    }
}

/// Keeps the countdown label current between polls.
pub async fn countdown(to_engine: Sender<EngineMsg>) -> SaverResult {
    loop {
        sleep(Duration::from_secs(1)).await;
        to_engine.send(EngineMsg::Refresh).await?;
    }
}

/// Exclusive owner of the engine. Every observation and refresh goes
/// through here, so state mutation stays single-threaded.
pub async fn engine_manager(
    mut engine: Engine,
    lang: Lang,
    from_tasks: Receiver<EngineMsg>,
    to_screen: Sender<ScreenCmd>,
    pub_state: RWatchSender,
) -> SaverResult {
    while let Ok(msg) = from_tasks.recv().await {
        let now = Local::now().naive_local();
        if let EngineMsg::Motion(motion) = msg {
            if let Some(cmd) = engine.observe(motion, now) {
                tracing::info!("screen {:?} (state {:?})", cmd, engine.state());
                to_screen.send(cmd).await?;
            }
        }
        publish(&pub_state, engine.report(now, lang));
    }
    Ok(())
}

/// Runs the platform power command. Failures are logged and never fed
/// back into the engine; redundant commands are harmless.
pub async fn screen_toggler(from_engine: Receiver<ScreenCmd>, cmd_on: String, cmd_off: String) {
    let mut current = None;
    while let Ok(cmd) = from_engine.recv().await {
        let shell = match cmd {
            ScreenCmd::On => &cmd_on,
            ScreenCmd::Off => &cmd_off,
        };
        tracing::debug!("running '{}' for {:?}", shell, cmd);
        match Command::new("sh").arg("-c").arg(shell).status().await {
            Ok(status) if status.success() => {
                if current != Some(cmd) {
                    tracing::info!("screen toggled {:?}", cmd);
                    current = Some(cmd);
                }
            }
            Ok(status) => tracing::error!("screen command exited with {}", status),
            Err(e) => tracing::error!("error toggling screen: {:?}", e),
        }
    }
}

/// Narrow host command channel: manual power override and a status
/// query.
pub async fn mqtt_receive(
    from_mqtt: Receiver<Publish>,
    to_screen: Sender<ScreenCmd>,
    state: RWatchReceiver,
    to_mqtt: Sender<StateReport>,
) -> SaverResult {
    while let Ok(msg) = from_mqtt.recv().await {
        tracing::info!("mqtt received {:?}", msg);
        if msg.topic == "/huescreen/cmd" {
            let cmd = msg.payload;
            if cmd == "on" || cmd == "off" {
                to_screen.send(ScreenCmd::from(cmd == "on")).await?;
            } else if cmd == "s" {
                let report = state.borrow().clone();
                to_mqtt.send(report).await?;
            } else {
                tracing::error!("unknown command: {:?}", cmd);
            }
        }
    }
    Ok(())
}

/// Forwards every deduplicated report change to the publisher.
pub async fn state_publisher(
    mut state: RWatchReceiver,
    to_mqtt: Sender<StateReport>,
) -> SaverResult {
    while state.changed().await.is_ok() {
        let report = state.borrow().clone();
        to_mqtt.send(report).await?;
    }
    Ok(())
}

pub async fn mqtt_publish(to_mqtt_receive: Receiver<StateReport>, client: AsyncClient) -> SaverResult {
    while let Ok(report) = to_mqtt_receive.recv().await {
        let msg = serde_json::to_string(&report)?;
        client
            .publish("/huescreen/state", QoS::AtLeastOnce, false, msg)
            .await?;
    }
    Ok(())
}

pub async fn influx(
    client: influxdb2::Client,
    state: RWatchReceiver,
    infl_buck: &str,
) -> SaverResult {
    loop {
        let point = {
            let report = state.borrow();
            DataPoint::builder("huescreen")
                .tag("device", "huescreen")
                .field("screen_on", report.state.lit())
                .field("cooling", report.state == ScreenState::Cooling)
                .field("off_in", report.off_in.unwrap_or(0))
                .build()?
        };
        client.write(infl_buck, stream::iter(vec![point])).await?;
        sleep(Duration::from_secs(300)).await;
    }
}
