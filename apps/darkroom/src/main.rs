//! Darkroom: command-line client for resumable gallery uploads.
//!
//! Reads `~/.config/darkroom/client.toml`, joins the gallery's live
//! channel and drives the uploader. Uploads that do not finish stay in
//! the on-disk queue and are picked up by `darkroom resume`.

mod adapter;
mod config;
mod reporter;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use darkroom_live::{LinkState, LiveConfig, LiveEvent, LiveManager};
use darkroom_protocol::constants::EventType;
use darkroom_protocol::messages::UploadPhotos;
use darkroom_queue::{FileCache, FileQueue, LocalCache};
use darkroom_transfer::ResumableHttpTransport;
use darkroom_uploader::{
    Backends, Connectivity, ConnectivityMachine, DeleteScope, DrainSummary, SelectedFile,
    Transition, UploadReport, UploadSession, delete_pending, handle_push, queued, resume,
    select_folder, start_upload, upload_photos,
};

use crate::adapter::LiveAdapter;
use crate::config::ClientConfig;
use crate::reporter::{Reporter, Totals};

/// How long a folder upload waits for the server's album mapping.
const ALBUM_WAIT: Duration = Duration::from_secs(30);

/// Grace period for the reporter to flush after shutdown.
const REPORTER_FLUSH: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "darkroom", about = "Resumable gallery upload client")]
struct Cli {
    /// Gallery to upload into
    #[arg(long)]
    group: String,

    /// Album for files that do not belong to a sub-folder
    #[arg(long)]
    album: Option<String>,

    /// Configuration file (defaults to ~/.config/darkroom/client.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured server URL
    #[arg(long)]
    server: Option<String>,

    /// Override the configured number of parallel uploads
    #[arg(long)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one or more files
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Upload a folder, one album per sub-folder
    Folder {
        /// Folder to scan
        dir: PathBuf,
        /// Also upload files one level down
        #[arg(long)]
        include_subfolders: bool,
    },
    /// Resume uploads left in the queue
    Resume,
    /// List queued and rejected uploads
    Pending,
    /// Drop rejected uploads from the queue
    Discard {
        /// Upload id to drop
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        id: Option<String>,
        /// Drop every rejected upload of the gallery
        #[arg(long)]
        all: bool,
    },
}

impl Commands {
    fn needs_link(&self) -> bool {
        matches!(
            self,
            Commands::Upload { .. } | Commands::Folder { .. } | Commands::Resume
        )
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

struct Client {
    session: UploadSession,
    live: Arc<LiveManager>,
    /// Signalled after a `folder_albums` push is stored.
    albums_ready: Arc<Notify>,
    /// Link restorations reported by the pump.
    resumes: Mutex<mpsc::UnboundedReceiver<()>>,
    resumes_tx: mpsc::UnboundedSender<()>,
    stop: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
    reporter: Option<JoinHandle<Totals>>,
}

impl Client {
    async fn open(config: &ClientConfig, group: String, album: Option<String>) -> anyhow::Result<Self> {
        let queue = FileQueue::open(config.queue_dir.clone())
            .await
            .with_context(|| format!("opening queue at {}", config.queue_dir.display()))?;
        let cache: Arc<dyn LocalCache> = Arc::new(
            FileCache::open(config.cache_path.clone())
                .with_context(|| format!("opening cache at {}", config.cache_path.display()))?,
        );
        let transport = ResumableHttpTransport::new(cache.clone()).context("building HTTP client")?;

        let live = Arc::new(LiveManager::new(LiveConfig {
            url: config.server_url.clone(),
            group_id: group.clone(),
            token: config.token.clone(),
        }));

        let backends = Backends {
            queue: Arc::new(queue),
            cache,
            channel: Arc::new(LiveAdapter::new(live.clone())),
            transport: Arc::new(transport),
        };
        let session = UploadSession::new(group, album, backends, config.upload_config());
        let reporter = session
            .take_events()
            .map(|rx| tokio::spawn(Reporter::default().run(rx)));

        let (resumes_tx, resumes_rx) = mpsc::unbounded_channel();
        Ok(Self {
            session,
            live,
            albums_ready: Arc::new(Notify::new()),
            resumes: Mutex::new(resumes_rx),
            resumes_tx,
            stop: CancellationToken::new(),
            pump: Mutex::new(None),
            reporter,
        })
    }

    /// Joins the gallery and starts handling its pushes.
    async fn connect(&self) -> anyhow::Result<()> {
        let joined = self.live.connect().await.context("joining gallery")?;
        info!(group = %joined.group_id, "connected");

        if let Some(rx) = self.live.take_events().await {
            let handle = tokio::spawn(pump(
                self.session.clone(),
                rx,
                self.albums_ready.clone(),
                self.resumes_tx.clone(),
                self.stop.clone(),
            ));
            *self.pump.lock().await = Some(handle);
        }
        Ok(())
    }

    async fn execute(&self, command: Commands) -> anyhow::Result<()> {
        if command.needs_link() {
            self.connect().await?;
        }

        match command {
            Commands::Upload { files } => {
                let mut selected = Vec::with_capacity(files.len());
                for path in &files {
                    let file = SelectedFile::from_path(path)
                        .await
                        .with_context(|| format!("reading {}", path.display()))?;
                    selected.push(file);
                }
                let mut report = start_upload(&self.session, selected).await?;
                report.drain = self.settle(report.drain).await?;
                print_report(&report);
            }
            Commands::Folder {
                dir,
                include_subfolders,
            } => {
                let info = select_folder(&self.session, &dir).await?;
                info!(folder = %info.folder, sub_folders = info.sub_folders.len(), "folder announced");

                if include_subfolders
                    && !info.sub_folders.is_empty()
                    && tokio::time::timeout(ALBUM_WAIT, self.albums_ready.notified())
                        .await
                        .is_err()
                {
                    warn!("no album mapping from the server; sub-folder files go to the default album");
                }

                let mut report = upload_photos(&self.session, UploadPhotos { include_subfolders }).await?;
                report.drain = self.settle(report.drain).await?;
                print_report(&report);
            }
            Commands::Resume => {
                let summary = resume(&self.session).await?;
                println!("resumed {}, still rejected {}", summary.resumed, summary.pending);
                let drain = self.settle(summary.drain).await?;
                print_drain(&drain);
            }
            Commands::Pending => {
                let (valid, invalid) = queued(&self.session).await?;
                for record in &valid {
                    println!("queued    {}  {}", record.id, record.file.name);
                }
                for record in &invalid {
                    println!(
                        "rejected  {}  {}: {}",
                        record.id,
                        record.file.name,
                        record.error().unwrap_or("unknown reason")
                    );
                }
                println!("{} queued, {} rejected", valid.len(), invalid.len());
            }
            Commands::Discard { id, all } => {
                let scope = match id {
                    Some(id) if !all => DeleteScope::One(id),
                    _ => DeleteScope::All,
                };
                let removed = delete_pending(&self.session, scope).await?;
                println!("discarded {} upload(s)", removed.len());
            }
        }
        Ok(())
    }

    /// Waits out a paused drain: each time the link comes back the queue
    /// is resumed, until a drain runs to the end.
    async fn settle(&self, mut drain: DrainSummary) -> anyhow::Result<DrainSummary> {
        let mut resumes = self.resumes.lock().await;
        while drain.paused && !self.session.is_closed() {
            info!("uploads paused; waiting for the gallery link");
            if resumes.recv().await.is_none() {
                break;
            }
            let resumed = resume(&self.session).await?;
            drain = DrainSummary {
                batches: drain.batches + resumed.drain.batches,
                completed: drain.completed + resumed.drain.completed,
                failed: drain.failed + resumed.drain.failed,
                cancelled: drain.cancelled + resumed.drain.cancelled,
                paused: resumed.drain.paused,
            };
        }
        Ok(drain)
    }

    /// Lets in-flight push handlers finish, then tears everything down.
    async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(pump) = self.pump.lock().await.take() {
            let _ = pump.await;
        }
        self.session.close();
        self.live.shutdown().await;

        let reporter = self.reporter.take();
        drop(self);
        if let Some(handle) = reporter {
            match tokio::time::timeout(REPORTER_FLUSH, handle).await {
                Ok(Ok(totals)) => info!(
                    completed = totals.completed,
                    failed = totals.failed,
                    bytes = totals.bytes,
                    "done"
                ),
                _ => debug!("reporter did not finish"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Live event pump
// ---------------------------------------------------------------------------

/// Routes live events: pushes to the uploader, link changes through the
/// connectivity machine.
async fn pump(
    session: UploadSession,
    mut rx: mpsc::Receiver<LiveEvent>,
    albums_ready: Arc<Notify>,
    resumes: mpsc::UnboundedSender<()>,
    stop: CancellationToken,
) {
    let mut machine = ConnectivityMachine::new(Connectivity::Online);
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "push handler panicked");
                }
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    LiveEvent::Push { event, message } => {
                        debug!(event = ?event, "push received");
                        let session = session.clone();
                        let albums_ready = albums_ready.clone();
                        // Mapping and deletions are applied in arrival order;
                        // anything that drains runs alongside.
                        let starts_drain = matches!(
                            event,
                            EventType::UploadPhotos | EventType::ResumePendingPhotos
                        );
                        let work = async move {
                            let stored_albums = event == EventType::FolderAlbums;
                            match handle_push(&session, event, &message).await {
                                Ok(()) if stored_albums => albums_ready.notify_one(),
                                Ok(()) => {}
                                Err(e) => warn!(error = %e, "push handling failed"),
                            }
                        };
                        if starts_drain {
                            handlers.spawn(work);
                        } else {
                            work.await;
                        }
                    }
                    LiveEvent::StateChanged(state) => {
                        let signal = match state {
                            LinkState::Online => Connectivity::Online,
                            LinkState::Offline | LinkState::Reconnecting { .. } => Connectivity::Offline,
                            LinkState::Connecting => continue,
                        };
                        match machine.apply(signal) {
                            Some(Transition::Pause) => {
                                info!("gallery link lost");
                                darkroom_uploader::pause(&session);
                            }
                            Some(Transition::Resume) => {
                                info!("gallery link restored");
                                let _ = resumes.send(());
                            }
                            None => {}
                        }
                    }
                    LiveEvent::Reconnecting { attempt, next_retry_secs } => {
                        debug!(attempt, next_retry_secs, "reconnect scheduled");
                    }
                }
            }
        }
    }

    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "push handler panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_report(report: &UploadReport) {
    println!("accepted {}, rejected {}", report.accepted.len(), report.rejected.len());
    for file in &report.rejected {
        println!(
            "  rejected {} ({}): {}",
            file.name,
            file.id,
            file.error.as_deref().unwrap_or("unknown reason")
        );
    }
    for upload in &report.unresolved {
        println!("  no answer for {}", upload.file.name);
    }
    if !report.unpersisted.is_empty() {
        println!(
            "  {} upload(s) could not be queued and will not resume after a restart",
            report.unpersisted.len()
        );
    }
    print_drain(&report.drain);
}

fn print_drain(drain: &DrainSummary) {
    println!(
        "completed {}, failed {}, cancelled {}{}",
        drain.completed,
        drain.failed,
        drain.cancelled,
        if drain.paused { " (paused)" } else { "" }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,darkroom=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(url) = cli.server {
        config.server_url = url;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }

    let client = Client::open(&config, cli.group, cli.album).await?;
    let outcome = tokio::select! {
        result = client.execute(cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; queued uploads resume on the next run");
            client.session.close();
            Ok(())
        }
    };
    client.shutdown().await;
    outcome
}
