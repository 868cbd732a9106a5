use anyhow::Context;
use async_channel::unbounded;
use chrono::Local;
use clap::Parser;
use huescreen_lib::Engine;
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use std::str::FromStr;
use std::time::Duration;
use tokio::task;
use tracing::Level;

mod config;
mod err;
mod hue;
mod status;
mod tasks;

use crate::config::SaverConfig;
use crate::err::SaverResult;
use crate::hue::HueGateway;
use crate::tasks::{
    countdown, engine_manager, influx, mqtt_publish, mqtt_receive, poller, screen_toggler,
    state_publisher,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, env = "HUE_HOST")]
    hue_host: String,

    #[arg(long, env = "HUE_SENSOR_ID")]
    sensor_id: String,

    #[arg(long, env = "HUE_API_KEY")]
    api_key: String,

    #[arg(
        long,
        env = "HUE_CERT",
        default_value = "/etc/huescreen/hue_bridge_cert.pem"
    )]
    cert_path: String,

    #[arg(long, env = "SCREEN_ON_CMD", default_value = "vcgencmd display_power 1")]
    screen_on_cmd: String,

    #[arg(long, env = "SCREEN_OFF_CMD", default_value = "vcgencmd display_power 0")]
    screen_off_cmd: String,

    #[arg(long, env = "MQTT_HOST", default_value = "localhost")]
    mqtt_host: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    #[arg(long, env = "MQTT_USER", default_value = "huescreen")]
    mqtt_user: String,

    #[arg(long, env = "MQTT_PASS")]
    mqtt_pass: String,

    #[arg(long, env = "INFL_BUCK", default_value = "huescreen")]
    infl_buck: String,

    #[arg(long, env = "INFL_ORG", default_value = "huescreen")]
    infl_org: String,

    #[arg(long, env = "INFL_URL", default_value = "http://localhost:8086")]
    infl_url: String,

    #[arg(long, env = "INFL_TOKEN")]
    infl_token: Option<String>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> SaverResult {
    let args = Args::parse();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::from_str(&args.log_level)?)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = SaverConfig::load()?;
    let schedule = config.schedule().context("Invalid schedule in config.toml")?;
    let lang = config.lang();
    let poll_interval = Duration::from_millis(config.poll_interval);
    let engine = Engine::new(config.cool_down, schedule, Local::now().naive_local());

    let gateway = HueGateway::new(&args.hue_host, &args.sensor_id, &args.api_key, &args.cert_path)
        .context("Failed to build the Hue bridge client")?;

    let (state_watch_send, state_watch_receive) =
        tokio::sync::watch::channel(engine.report(Local::now().naive_local(), lang));

    let (to_engine_send, to_engine_receive) = unbounded();
    let (to_screen_send, to_screen_receive) = unbounded();
    let (to_mqtt_send, to_mqtt_receive) = unbounded();
    let (from_mqtt_send, from_mqtt_receive) = unbounded();
    let to_engine_clone = to_engine_send.clone();
    let to_screen_clone = to_screen_send.clone();
    let to_mqtt_clone = to_mqtt_send.clone();

    let lwt = LastWill::new("/huescreen/lwt", "Offline", QoS::AtLeastOnce, false);

    let mut mqttoptions = MqttOptions::new("huescreen", args.mqtt_host, args.mqtt_port);
    mqttoptions.set_keep_alive(Duration::from_secs(5));
    mqttoptions.set_last_will(lwt);
    mqttoptions.set_credentials(args.mqtt_user, args.mqtt_pass);

    let (client, mut connection) = AsyncClient::new(mqttoptions, 10);

    task::spawn(async move { poller(gateway, poll_interval, to_engine_send).await });
    task::spawn(async move { countdown(to_engine_clone).await });
    task::spawn(async move {
        engine_manager(engine, lang, to_engine_receive, to_screen_send, state_watch_send).await
    });

    let screen_on_cmd = args.screen_on_cmd;
    let screen_off_cmd = args.screen_off_cmd;
    task::spawn(async move { screen_toggler(to_screen_receive, screen_on_cmd, screen_off_cmd).await });

    client.subscribe("/huescreen/cmd", QoS::AtMostOnce).await?;
    // counterpart of the "Offline" last will
    client
        .publish("/huescreen/lwt", QoS::AtLeastOnce, false, "Online")
        .await?;

    let state_clone = state_watch_receive.clone();
    task::spawn(async move {
        mqtt_receive(from_mqtt_receive, to_screen_clone, state_clone, to_mqtt_clone).await
    });

    let state_clone = state_watch_receive.clone();
    task::spawn(async move { state_publisher(state_clone, to_mqtt_send).await });

    task::spawn(async move { mqtt_publish(to_mqtt_receive, client).await });

    if let Some(token) = args.infl_token {
        let client = influxdb2::Client::new(args.infl_url, args.infl_org, token);
        let state_clone = state_watch_receive.clone();
        let infl_buck = args.infl_buck;
        task::spawn(async move { influx(client, state_clone, &infl_buck).await });
    }

    loop {
        match connection.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => from_mqtt_send.send(p).await?,
            Err(n) => tracing::error!("incoming mqtt packet Err:  {:?}", n),
            Ok(_) => {}
        }
    }
}
