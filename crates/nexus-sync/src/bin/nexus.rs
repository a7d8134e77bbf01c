//! nexus: command-line client for notenexus.
//!
//! Talks to the REST store when `NEXUS_STORE_URL` is set. Otherwise it runs
//! against an in-memory store seeded with a few demo notes, which lives only
//! for the duration of one command.

use std::collections::BTreeSet;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use nexus_assist::OpenAIAssistant;
use nexus_core::{Note, NoteDraft, RemoteStore, View};
use nexus_store::{MemoryStore, RestStore};
use nexus_sync::{NoteSync, SyncConfig};

/// Owner of the in-memory demo data.
const DEMO_OWNER: Uuid = Uuid::from_u128(0x6e65_7875_735f_6465_6d6f_0000_0000_0001);

#[derive(Parser)]
#[command(name = "nexus")]
#[command(author, version, about = "Note client for notenexus")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List notes in a view
    List {
        /// notes, archive, trash, reminders
        #[arg(short, long, default_value = "notes")]
        view: View,

        /// Restrict to one workspace
        #[arg(short, long)]
        workspace: Option<Uuid>,

        /// Label names to filter by (any match)
        #[arg(short, long)]
        label: Vec<String>,

        /// Case-insensitive text search
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Create a text note
    Create {
        #[arg(short, long, default_value = "")]
        title: String,

        #[arg(short, long, default_value = "")]
        content: String,

        #[arg(short, long)]
        workspace: Option<Uuid>,
    },

    /// Replace a note's title and content
    Edit {
        id: Uuid,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        content: Option<String>,
    },

    /// Pin or unpin a note
    Pin { id: Uuid },

    /// Archive or unarchive a note
    Archive { id: Uuid },

    /// Move a note to or from the trash
    Trash { id: Uuid },

    /// Permanently delete a trashed note
    Delete { id: Uuid },

    /// Show a note's version history
    History { id: Uuid },

    /// Restore an earlier version as a new version
    Restore { id: Uuid, version: i64 },

    /// Ask the assistant to analyze a note
    Analyze { id: Uuid },

    /// Print the usage summary as JSON
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the tracing subscriber.
///
///   LOG_FORMAT - "json" or "text" (default: "text")
///   LOG_FILE   - path to a log file (daily rotation); stderr otherwise
///   RUST_LOG   - env filter (default: "nexus_sync=info,nexus_store=info")
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json");
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nexus_sync=info,nexus_store=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    match std::env::var("LOG_FILE").ok() {
        Some(path) => {
            let path = std::path::Path::new(&path);
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("nexus.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
            if json {
                registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(false)
                            .with_writer(writer),
                    )
                    .init();
            }
            Some(guard)
        }
        None => {
            if json {
                registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            } else {
                registry
                    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                    .init();
            }
            None
        }
    }
}

async fn connect() -> Result<NoteSync> {
    let config = SyncConfig::from_env();

    let sync = if std::env::var("NEXUS_STORE_URL").is_ok() {
        let store: Arc<dyn RemoteStore> = Arc::new(RestStore::from_env()?);
        let owner = std::env::var("NEXUS_OWNER_ID")
            .ok()
            .map(|v| v.parse::<Uuid>())
            .transpose()
            .context("NEXUS_OWNER_ID is not a valid UUID")?;
        info!(owner_id = ?owner, "Using REST store");
        NoteSync::new(store, owner, config)
    } else {
        info!("NEXUS_STORE_URL not set, using in-memory demo store");
        let sync = NoteSync::new(Arc::new(MemoryStore::new()), Some(DEMO_OWNER), config);
        seed_demo(&sync).await?;
        sync
    };

    Ok(sync.with_assistant(Arc::new(OpenAIAssistant::from_env()?)))
}

async fn seed_demo(sync: &NoteSync) -> Result<()> {
    sync.load().await?;
    sync.create_workspace("Personal", None, None, true).await?;
    let groceries = sync.create_label("groceries", None).await?;

    let shopping = sync
        .create_note(NoteDraft {
            labels: BTreeSet::from([groceries.id]),
            ..NoteDraft::text("Shopping", "milk, eggs, bread")
        })
        .await?;
    sync.toggle_pin(shopping.id).await?;

    sync.create_note(NoteDraft::text("Ideas", "A note app that syncs"))
        .await?;
    let old = sync
        .create_note(NoteDraft::text("Old plans", "Moved elsewhere"))
        .await?;
    sync.toggle_archive(old.id).await?;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let sync = connect().await?;

    match cli.command {
        Commands::List {
            view,
            workspace,
            label,
            search,
        } => {
            sync.navigate(|s| s.with_workspace(workspace));
            sync.load().await?;

            let mut selected = BTreeSet::new();
            for name in &label {
                let found = sync
                    .find_label_by_name(name)?
                    .with_context(|| format!("no label named '{}'", name))?;
                selected.insert(found.id);
            }
            sync.navigate(|s| {
                let s = s.with_view(view).with_search(search.unwrap_or_default());
                selected.into_iter().fold(s, |s, id| s.toggle_label(id))
            });

            let projection = sync.visible_notes()?;
            if projection.is_empty() {
                println!("No notes.");
            }
            for note in projection.notes() {
                print_note(note);
            }
        }
        Commands::Create {
            title,
            content,
            workspace,
        } => {
            sync.navigate(|s| s.with_workspace(workspace));
            sync.load().await?;
            let note = sync.create_note(NoteDraft::text(title, content)).await?;
            print_note(&note);
        }
        Commands::Edit { id, title, content } => {
            sync.load().await?;
            let current = sync.cache().notes.find(id).context("note not found")?;
            let note = sync
                .edit(
                    id,
                    title.as_deref().unwrap_or(&current.title),
                    content.as_deref().unwrap_or(&current.content),
                )
                .await?;
            print_note(&note);
        }
        Commands::Pin { id } => {
            sync.load().await?;
            print_note(&sync.toggle_pin(id).await?);
        }
        Commands::Archive { id } => {
            sync.load().await?;
            print_note(&sync.toggle_archive(id).await?);
        }
        Commands::Trash { id } => {
            sync.load().await?;
            print_note(&sync.toggle_trash(id).await?);
        }
        Commands::Delete { id } => {
            sync.load().await?;
            sync.delete(id).await?;
            println!("Deleted {}", id);
        }
        Commands::History { id } => {
            for version in sync.history(id).await? {
                println!(
                    "v{:<4} {}  {}",
                    version.version,
                    version.created_at.format("%Y-%m-%d %H:%M"),
                    version.title
                );
            }
        }
        Commands::Restore { id, version } => {
            sync.load().await?;
            print_note(&sync.restore(id, version).await?);
        }
        Commands::Analyze { id } => {
            sync.load().await?;
            let analysis = sync.analyze(id).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Stats => {
            let summary = sync.analytics().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn print_note(note: &Note) {
    let mut flags = String::new();
    if note.is_pinned {
        flags.push('P');
    }
    if note.is_archived {
        flags.push('A');
    }
    if note.is_trashed {
        flags.push('T');
    }
    println!(
        "{}  [{:<2}] v{:<3} {}",
        note.id,
        flags,
        note.version,
        if note.title.is_empty() {
            "(untitled)"
        } else {
            &note.title
        }
    );
}
