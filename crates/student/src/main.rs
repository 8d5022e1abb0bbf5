use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use shared::protocol::{DEFAULT_HOST, DEFAULT_PORT};
use student::{LocalScreenShare, StaticApps, StudentAgent, StudentConfig, StudentEvent};

#[derive(Parser)]
#[command(name = "student", about = "Student agent for classroom monitoring")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    room: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    mssv: String,
    /// Report this app as running, PROCESS:TITLE. Repeatable.
    #[arg(long = "app", value_name = "PROCESS:TITLE")]
    apps: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let pairs: Vec<(&str, &str)> = args
        .apps
        .iter()
        .map(|spec| spec.split_once(':').unwrap_or((spec.as_str(), "")))
        .collect();
    let apps = if pairs.is_empty() {
        StaticApps::from_pairs(&[("editor", "Untitled - Editor"), ("browser", "Course portal")])
    } else {
        StaticApps::from_pairs(&pairs)
    };

    let cfg = StudentConfig {
        host: args.host,
        port: args.port,
        username: args.username,
        password: args.password,
        room_id: args.room,
        student_name: args.name,
        mssv: args.mssv,
    };
    let (agent, mut events) =
        StudentAgent::connect(cfg, Arc::new(LocalScreenShare), Arc::new(apps)).await?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                StudentEvent::Notice {
                    sender_username,
                    message,
                } => println!("{sender_username} says: {message}"),
                StudentEvent::AppsReported => println!("application list reported"),
                StudentEvent::SharePrepared => println!("screen share session prepared"),
                StudentEvent::ShareFailed(reason) => println!("screen share failed: {reason}"),
                StudentEvent::Disconnected => println!("disconnected"),
            }
        }
    });

    agent.run().await;
    Ok(())
}
