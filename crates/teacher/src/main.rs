use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use shared::protocol::{DEFAULT_HOST, DEFAULT_PORT};
use teacher::{LoggingViewer, NetworkManager, TeacherCommand, TeacherEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "teacher", about = "Teacher console for classroom monitoring")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let mut manager = NetworkManager::new(cmd_rx, event_tx, Arc::new(LoggingViewer));
    tokio::spawn(async move { manager.run().await });

    cmd_tx
        .send(TeacherCommand::Connect {
            host: args.host,
            port: args.port,
            username: args.username,
            password: args.password,
        })
        .await?;

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(event);
        }
    });

    println!(
        "commands: create <room> | refresh <room> | notify <room> <msg> | \
         chat <room> <msg> | apps <student> | view <student> | quit"
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        match parse_command(line) {
            Some(cmd) => cmd_tx.send(cmd).await?,
            None => println!("unrecognized command: {line}"),
        }
    }

    cmd_tx.send(TeacherCommand::Disconnect).await?;
    Ok(())
}

fn parse_command(line: &str) -> Option<TeacherCommand> {
    let mut parts = line.splitn(3, char::is_whitespace);
    let verb = parts.next()?;
    let arg = parts.next()?.to_string();
    match verb {
        "create" => Some(TeacherCommand::CreateRoom { room_id: arg }),
        "refresh" => Some(TeacherCommand::Refresh { room_id: arg }),
        "notify" => Some(TeacherCommand::Notify {
            room_id: arg,
            message: parts.next()?.to_string(),
        }),
        "chat" => Some(TeacherCommand::Broadcast {
            room_id: arg,
            message: parts.next()?.to_string(),
        }),
        "apps" => Some(TeacherCommand::RequestApps { target: arg }),
        "view" => Some(TeacherCommand::ViewScreen { target: arg }),
        _ => None,
    }
}

fn print_event(event: TeacherEvent) {
    match event {
        TeacherEvent::Connected => println!("connected"),
        TeacherEvent::Disconnected => println!("disconnected"),
        TeacherEvent::RoomCreated { room_id } => println!("room '{room_id}' ready"),
        TeacherEvent::Participants {
            room_id,
            participants,
        } => {
            println!("room '{room_id}': {} participant(s)", participants.len());
            for p in participants {
                println!("  {} ({}, mssv {})", p.username, p.student_name, p.mssv);
            }
        }
        TeacherEvent::NoticeDelivered { room_id, detail } => {
            println!("notice to '{room_id}': {detail}");
        }
        TeacherEvent::Notice {
            room_id,
            sender_username,
            message,
        } => println!("[{room_id}] {sender_username} says: {message}"),
        TeacherEvent::RunningApps { username, apps } => {
            println!("{username} is running {} app(s):", apps.len());
            for app in apps {
                println!("  {} - {}", app.process_name, app.main_window_title);
            }
        }
        TeacherEvent::ScreenReady { username, token } => {
            println!("viewing {username} ({}-byte invitation token)", token.len());
        }
        TeacherEvent::HandshakeTimedOut { username } => {
            println!("{username} did not produce a token in time");
        }
        TeacherEvent::Error(message) => println!("error: {message}"),
    }
}
