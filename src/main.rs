use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use log::{debug, warn};
use tokio::signal;

use whatsmeow_cli::{
    ClientConfig, ConnectError, ConnectionManager, CredentialStore, PairingError, PairingEvent,
    PairingSession, SqliteStore, StoreError, Transport, WsTransport, LOG_TARGETS,
};

mod render;

use render::Output;

/// Listen for WhatsApp messages from the terminal.
#[derive(Parser, Debug)]
#[command(name = "whatsmeow-cli", version, about, disable_help_subcommand = true)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite credential database, overrides config.
    #[arg(long, global = true)]
    db: Option<String>,

    /// WebSocket endpoint, overrides config.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Display name advertised to WhatsApp.
    #[arg(long, global = true)]
    push_name: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Listen for incoming WhatsApp messages.
    Message,
    /// Generate a QR code for a new WhatsApp login.
    Qr,
    /// Show this help message.
    Help,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = match cli.command {
        Some(Commands::Message) => Commands::Message,
        Some(Commands::Qr) => Commands::Qr,
        Some(Commands::Help) | None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Failed to print help: {e}");
            }
            return ExitCode::SUCCESS;
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Database path: {}", config.database_path);
    let db_path = config.database_path.clone();
    let opened = tokio::task::spawn_blocking(move || SqliteStore::open_or_recreate(db_path))
        .await
        .unwrap_or_else(|e| Err(StoreError::Io(e.to_string())));
    let store: Arc<dyn CredentialStore> = match opened {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Failed to open database: {e}");
            return ExitCode::FAILURE;
        }
    };
    let transport: Arc<dyn Transport> = Arc::new(WsTransport::new(&config));
    let manager = ConnectionManager::new(config.clone(), Arc::clone(&transport), Arc::clone(&store));

    match command {
        Commands::Qr => pair_then_listen(&config, transport.as_ref(), &store, &manager).await,
        _ => listen(&manager, &store, false).await,
    }
}

/// Default directives: the binary's own module plus every library target.
fn default_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    std::iter::once("whatsmeow_cli")
        .chain(LOG_TARGETS.iter().copied())
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(verbose).into()),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<ClientConfig, whatsmeow_cli::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    // CLI overrides
    if let Some(db) = &cli.db {
        config = config.with_database_path(db);
    }
    if let Some(endpoint) = &cli.endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let Some(name) = &cli.push_name {
        config = config.with_push_name(name);
    }
    Ok(config)
}

/// Run a store operation off the async runtime.
async fn with_store<T, F>(store: &Arc<dyn CredentialStore>, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn CredentialStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .unwrap_or_else(|e| Err(StoreError::Io(e.to_string())))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn pair_then_listen(
    config: &ClientConfig,
    transport: &dyn Transport,
    store: &Arc<dyn CredentialStore>,
    manager: &ConnectionManager,
) -> ExitCode {
    match with_store(store, |store| store.load()).await {
        Ok(Some(record)) if record.is_paired() => {
            println!("Already logged in as {}", record.identity);
            return listen(manager, store, true).await;
        }
        Ok(_) => {}
        Err(e) => warn!("Could not read stored credentials, pairing a new device: {e}"),
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    println!("Waiting for QR code...");
    let begun = tokio::select! {
        _ = &mut shutdown => return ExitCode::SUCCESS,
        begun = PairingSession::begin(transport, Arc::clone(store), config) => begun,
    };
    let mut session = match begun {
        Ok(session) => session,
        Err(e) => {
            println!("Failed to connect: {e}");
            return ExitCode::FAILURE;
        }
    };

    loop {
        let event = tokio::select! {
            _ = &mut shutdown => {
                session.cancel().await;
                return ExitCode::SUCCESS;
            }
            event = session.next_event() => event,
        };
        match event {
            Some(PairingEvent::Ticket(ticket)) => match render::qr_ascii(&ticket.code) {
                Ok(art) => {
                    println!("Scan this QR code in WhatsApp:");
                    println!("{art}");
                }
                Err(e) => {
                    println!("Failed to generate QR code: {e}");
                    session.cancel().await;
                    return ExitCode::FAILURE;
                }
            },
            Some(PairingEvent::Paired(identity)) => {
                println!("Successfully logged in as {identity}");
                break;
            }
            Some(PairingEvent::Expired(reason)) => {
                println!(
                    "QR code scanning was not completed successfully: {}",
                    PairingError::from(reason)
                );
                return ExitCode::FAILURE;
            }
            None => return ExitCode::FAILURE,
        }
    }

    println!("\nStarting initial sync...");
    println!("Please wait for the sync to complete (this may take a few minutes)");
    println!("Press Ctrl+C when the sync is complete");
    listen(manager, store, true).await
}

/// Report a failed first connection attempt. Returns an exit code when
/// listening makes no sense.
async fn first_attempt_failed(err: ConnectError, store: &Arc<dyn CredentialStore>) -> Option<ExitCode> {
    match err {
        ConnectError::NotPaired => {
            println!("{}", render::NOT_PAIRED);
            Some(ExitCode::FAILURE)
        }
        ConnectError::Store(e) if e.is_corrupt() => {
            warn!(target: "Store", "Stored credentials are corrupt, discarding them: {e}");
            if let Err(e) = with_store(store, |store| store.clear()).await {
                println!("Failed to reset credentials: {e}");
                return Some(ExitCode::FAILURE);
            }
            println!("{}", render::NOT_PAIRED);
            Some(ExitCode::FAILURE)
        }
        ConnectError::Store(e) => {
            println!("Failed to read credentials: {e}");
            Some(ExitCode::FAILURE)
        }
        other => {
            println!("Failed to connect: {other}. Retrying in the background...");
            None
        }
    }
}

async fn listen(manager: &ConnectionManager, store: &Arc<dyn CredentialStore>, after_pairing: bool) -> ExitCode {
    let mut events = manager.dispatcher().subscribe();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let interrupted = tokio::select! {
        _ = &mut shutdown => true,
        result = manager.connect_stored() => {
            match result {
                Ok(()) => println!("Connected successfully!"),
                Err(e) => {
                    if let Some(code) = first_attempt_failed(e, store).await {
                        return code;
                    }
                }
            }
            false
        }
    };

    let exit = if interrupted {
        ExitCode::SUCCESS
    } else {
        println!("Listening for messages... (Press Ctrl+C to exit)");
        loop {
            let event = tokio::select! {
                _ = &mut shutdown => break ExitCode::SUCCESS,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                break ExitCode::SUCCESS;
            };
            match render::event_output(&event, after_pairing) {
                Output::Print(text) => println!("{text}"),
                Output::Fatal(text) => {
                    println!("{text}");
                    break ExitCode::FAILURE;
                }
                Output::Quiet(text) => debug!("{text}"),
            }
        }
    };

    println!("\nDisconnecting safely...");
    manager.disconnect().await;
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_filter_directives() {
        assert_eq!(
            default_filter(false),
            "whatsmeow_cli=info,Client=info,Pairing=info,Store=info,Dispatch=info"
        );
        assert!(default_filter(true).split(',').all(|d| d.ends_with("=debug")));
    }

    #[test]
    fn test_default_filter_passes_library_targets() {
        let captured = Captured::default();
        let writer = captured.clone();
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(default_filter(false)))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .try_init()
            .unwrap();

        for &target in LOG_TARGETS {
            log::warn!(target: target, "line from {target}");
        }
        log::debug!(target: "Client", "debug line");

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        for target in LOG_TARGETS {
            assert!(output.contains(&format!("line from {target}")), "{output}");
        }
        assert!(!output.contains("debug line"));
    }

    #[tokio::test]
    async fn test_with_store_runs_blocking_operations() {
        use whatsmeow_cli::store::DeviceKeys;
        use whatsmeow_cli::{DeviceIdentity, MemoryStore, SessionRecord, JID};

        let record = SessionRecord::new(DeviceIdentity::new(JID::new_device("123", 1)), DeviceKeys::generate());
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::with_record(record.clone()));

        let loaded = with_store(&store, |store| store.load()).await.unwrap();
        assert_eq!(loaded, Some(record));

        with_store(&store, |store| store.clear()).await.unwrap();
        assert_eq!(with_store(&store, |store| store.load()).await.unwrap(), None);
    }
}
