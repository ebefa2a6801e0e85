//! Headless client binary.
//!
//! Usage:
//!   cargo run -p kitchen_client --bin client -- [--config client.json]
//!       [--server http://127.0.0.1:8080] [--participant ID] [--players N] [--frame-hz HZ]
//!
//! The client runs the handshake, then pumps the channel, applies snapshots
//! to a headless scene, and interpolates once per frame until the session
//! ends or the channel closes.
//!
//! Console commands (first local player):
//!   move <x> <y>  - Hold a movement direction
//!   stop          - Release movement
//!   pickup        - Pick up or drop
//!   interact      - Press interact; again to release
//!   status        - Show client status
//!   quit          - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use kitchen_client::{
    connection::ConnectionManager,
    input::{InputSampler, InputState},
    session::HttpSessionApi,
    KitchenClient,
};
use kitchen_shared::{
    config::ClientConfig,
    math::Vec2,
    net::DefaultConnector,
    scene::{HeadlessScene, HudSlot},
};
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
            ClientConfig::from_json_str(&text).with_context(|| format!("parse {path}"))?
        }
        _ => ClientConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--server" if i + 1 < args.len() => {
                cfg.server_url = args[i + 1].clone();
                i += 2;
            }
            "--participant" if i + 1 < args.len() => {
                cfg.participant_id = args[i + 1].clone();
                i += 2;
            }
            "--players" if i + 1 < args.len() => {
                cfg.player_count = args[i + 1].parse().context("parse --players")?;
                i += 2;
            }
            "--frame-hz" if i + 1 < args.len() => {
                cfg.frame_hz = args[i + 1].parse().context("parse --frame-hz")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[derive(Debug, PartialEq)]
enum Command {
    Move(Vec2),
    Stop,
    PickUp,
    Interact,
    Status,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["move", x, y] => match (x.parse(), y.parse()) {
            (Ok(x), Ok(y)) => Command::Move(Vec2::new(x, y)),
            _ => Command::Unknown(line.to_string()),
        },
        ["stop"] => Command::Stop,
        ["pickup"] => Command::PickUp,
        ["interact"] => Command::Interact,
        ["status"] => Command::Status,
        ["quit"] | ["exit"] => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_url, participant = %cfg.participant_id, players = cfg.player_count, "Starting client");

    let session = HttpSessionApi::new(&cfg.server_url, Duration::from_millis(cfg.request_timeout_ms))?;
    let conn = ConnectionManager::new(cfg.clone(), Box::new(session), Box::new(DefaultConnector));
    let (mut client, intents) = KitchenClient::new(&cfg, conn, HeadlessScene::new());
    client.start().await.context("handshake")?;

    let player = client
        .connection()
        .local_players()
        .first()
        .map(|p| p.id.clone())
        .context("no local player")?;
    let mut sampler = InputSampler::new(player);

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Client connected as {}. Type 'status' for info, 'quit' to exit.", sampler.player());
    println!();

    let frame_hz = cfg.frame_hz.max(1);
    let dt = 1.0 / frame_hz as f32;
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(dt));
    let mut input = InputState::default();

    'frames: loop {
        ticker.tick().await;

        while let Ok(line) = console_rx.try_recv() {
            match parse_command(&line) {
                Command::Move(dir) => input.movement = dir,
                Command::Stop => input.movement = Vec2::ZERO,
                Command::PickUp => input.pick_up = true,
                Command::Interact => input.interact = !input.interact,
                Command::Status => {
                    for line in client.status() {
                        println!("{line}");
                    }
                }
                Command::Quit => break 'frames,
                Command::Unknown(line) => println!("Unknown command: {line}"),
            }
        }

        intents
            .send_all(sampler.sample(input, dt))
            .context("submit intents")?;
        // Pick-up is a button press, not a hold.
        input.pick_up = false;

        client.frame(dt, Duration::ZERO).await;

        if !client.is_running() {
            break;
        }
    }

    if client.applier().session_ended() {
        let score = client.scene().text(HudSlot::Score).unwrap_or("Score: 0");
        info!(final_score = %score, frames = client.frames(), "Session over");
        println!("Session over. {score}");
    } else if !client.connection_state().is_open() {
        println!("Disconnected from server.");
    }
    client.shutdown().await;

    Ok(())
}
