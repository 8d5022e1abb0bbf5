use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use shared::protocol::Role;
use tracing::info;
use tracing_subscriber::EnvFilter;

use room_server::Server;
use room_server::auth::HashedStore;
use room_server::config::ServerConfig;

#[derive(Parser)]
#[command(name = "room-server", about = "Classroom monitoring server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value_t = ServerConfig::default().listen_addr)]
    listen: SocketAddr,
    /// Seed an account, USER:PASS:ROLE with ROLE teacher|student.
    /// Repeatable.
    #[arg(long = "account", value_name = "USER:PASS:ROLE")]
    accounts: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut store = HashedStore::new();
    if args.accounts.is_empty() {
        store.add_account("teacher1", "teacher1", Role::Teacher);
        store.add_account("student1", "student1", Role::Student);
        info!("no --account given; seeded demo accounts teacher1/student1");
    }
    for spec in &args.accounts {
        add_account(&mut store, spec)?;
    }

    let cfg = ServerConfig {
        listen_addr: args.listen,
    };
    let server = Server::bind(&cfg, Arc::new(store)).await?;
    server.run().await
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .try_init();
}

fn add_account(store: &mut HashedStore, spec: &str) -> Result<()> {
    let mut parts = spec.splitn(3, ':');
    let (Some(user), Some(pass), Some(role)) = (parts.next(), parts.next(), parts.next()) else {
        anyhow::bail!("invalid --account '{spec}', expected USER:PASS:ROLE");
    };
    let role = match role {
        "teacher" => Role::Teacher,
        "student" => Role::Student,
        other => anyhow::bail!("unknown role '{other}' in --account '{spec}'"),
    };
    store.add_account(user, pass, role);
    Ok(())
}
