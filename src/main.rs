use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use leadbox_store::{Database, InquiryStore, NewInquiry};
use leadbox_sync::{InboxSynchronizer, SyncConfig, UnseenWatcher};

#[derive(Parser)]
#[command(name = "leadbox", about = "Lead inbox store, realtime feed and tools")]
struct Cli {
    /// Path to the SQLite database (defaults to ~/.leadbox/database/leadbox.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the inquiry store with its REST and WebSocket feed surface.
    Serve {
        #[arg(long, default_value_t = 8090)]
        port: u16,
    },
    /// Populate the database with demo inquiries.
    Seed {
        #[arg(long, default_value_t = 25)]
        count: usize,
    },
    /// Follow the live inbox from the terminal.
    Tail,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(default_db_path);
    let db = Database::open(&db_path).expect("Failed to open database");
    tracing::info!(path = %db_path.display(), "Database opened");
    let store = InquiryStore::new(db);

    match cli.command {
        Command::Serve { port } => serve(store, port).await,
        Command::Seed { count } => seed(&store, count),
        Command::Tail => tail(store).await,
    }
}

async fn serve(store: InquiryStore, port: u16) {
    let config = leadbox_server::ServerConfig {
        port,
        ..Default::default()
    };
    let handle = leadbox_server::start(config, store)
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "leadbox ready");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}

fn seed(store: &InquiryStore, count: usize) {
    const NAMES: [&str; 8] = [
        "Ada Lovelace",
        "Grace Hopper",
        "Alan Turing",
        "Katherine Johnson",
        "Edsger Dijkstra",
        "Barbara Liskov",
        "Donald Knuth",
        "Margaret Hamilton",
    ];
    const TYPES: [&str; 4] = ["wedding", "portrait", "event", "commercial"];

    let now = chrono::Utc::now();
    for i in 0..count {
        let name = NAMES[i % NAMES.len()];
        let row = store
            .insert_at(
                NewInquiry {
                    name: name.to_string(),
                    email: Some(format!(
                        "{}@example.com",
                        name.to_lowercase().replace(' ', ".")
                    )),
                    selected_types: vec![TYPES[i % TYPES.len()].to_string()],
                    selected_package: (i % 3 == 0).then(|| "premium".to_string()),
                    budget: Some(500 + (i as i64 % 7) * 250),
                    message: Some(format!("Looking for availability, inquiry #{i}")),
                    source_page: Some("/booking".to_string()),
                    ..Default::default()
                },
                now - chrono::Duration::minutes(i as i64 * 17),
            )
            .expect("Failed to insert inquiry");
        tracing::debug!(id = %row.id, name = %row.name, "seeded inquiry");
    }

    tracing::info!(count, "seeded inquiries");
}

async fn tail(store: InquiryStore) {
    let backend = Arc::new(store);

    let sync = InboxSynchronizer::new(Arc::clone(&backend), SyncConfig::default());
    sync.start().await;

    let watcher = UnseenWatcher::new(backend);
    watcher.start().await;

    let mut rx = sync.watch();
    println!("following inbox (ctrl+c to stop)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = rx.borrow_and_update().clone();
                println!(
                    "{:?} | {} rows | total {} new {} contacted {} qualified {} won {} | unseen {}",
                    snap.connection,
                    snap.rows.len(),
                    snap.counts.total,
                    snap.counts.new,
                    snap.counts.contacted,
                    snap.counts.qualified,
                    snap.counts.won,
                    watcher.count(),
                );
            }
        }
    }

    sync.shutdown();
    watcher.shutdown();
}

fn default_db_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".leadbox")
        .join("database")
        .join("leadbox.db")
}
