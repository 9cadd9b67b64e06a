use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use brousla_adapters::{await_checkout, CheckoutEvent};
use brousla_app::{AppConfig, AppContext, JsonFileSettingsStore};
use brousla_client::messages::{GenerationKind, GenerationRequest, Plan, UploadFile};
use brousla_core::operation::{Operation, OperationStatus};
use brousla_events::event::OperationEventKind;
use brousla_events::TrackerEvent;
use brousla_tracker::OperationHandle;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "brousla")]
#[command(about = "Track ComfyUI generations, scheduled workflows, sign-in and checkout")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an image from a text prompt
    GenerateImage(GenerateArgs),
    /// Generate a video from a text prompt
    GenerateVideo(GenerateArgs),
    /// Animate a source image
    ImageToVideo {
        #[command(flatten)]
        args: GenerateArgs,
        /// Source image
        #[arg(long)]
        image: PathBuf,
    },
    /// Resume tracking a job submitted earlier
    Resume {
        prompt_id: String,
        #[arg(long, value_enum, default_value = "text-to-image")]
        kind: KindArg,
    },
    /// Print scheduled workflow states as they change
    WatchWorkflows,
    /// Activate a scheduled workflow and follow it until it stops
    Activate { workflow_id: String },
    /// Sign in with Google
    SignIn,
    /// Upgrade the subscription
    Checkout { plan: Plan },
}

#[derive(Args)]
struct GenerateArgs {
    /// ComfyUI workflow JSON exported in API format
    workflow: PathBuf,
    #[arg(short, long)]
    prompt: String,
    #[arg(long)]
    negative_prompt: Option<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    steps: Option<u32>,
    #[arg(long)]
    cfg_scale: Option<f32>,
    #[arg(long)]
    seed: Option<i64>,
    #[arg(long)]
    fps: Option<u32>,
    /// Video length in frames
    #[arg(long)]
    length: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    TextToImage,
    TextToVideo,
    ImageToVideo,
}

impl From<KindArg> for GenerationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::TextToImage => Self::TextToImage,
            KindArg::TextToVideo => Self::TextToVideo,
            KindArg::ImageToVideo => Self::ImageToVideo,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let store = Arc::new(JsonFileSettingsStore::new(&config.settings_path));
    let ctx = Arc::new(AppContext::new(config, store).await?);

    let outcome = run(&ctx, cli.command).await;
    ctx.shutdown().await;
    outcome
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "brousla=info,brousla_tracker=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run(ctx: &AppContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::GenerateImage(args) => {
            generate(ctx, GenerationKind::TextToImage, args, None).await
        }
        Command::GenerateVideo(args) => {
            generate(ctx, GenerationKind::TextToVideo, args, None).await
        }
        Command::ImageToVideo { args, image } => {
            let image = read_upload(&image).await?;
            generate(ctx, GenerationKind::ImageToVideo, args, Some(image)).await
        }
        Command::Resume { prompt_id, kind } => {
            let handle = ctx.resume_generation(prompt_id, kind.into()).await?;
            report(follow(&handle).await)
        }
        Command::WatchWorkflows => watch_workflows(ctx).await,
        Command::Activate { workflow_id } => {
            let handle = ctx.activate_workflow(workflow_id).await?;
            report(follow(&handle).await)
        }
        Command::SignIn => sign_in(ctx).await,
        Command::Checkout { plan } => checkout(ctx, plan).await,
    }
}

async fn generate(
    ctx: &AppContext,
    kind: GenerationKind,
    args: GenerateArgs,
    image: Option<UploadFile>,
) -> anyhow::Result<()> {
    let workflow = read_upload(&args.workflow).await?;
    let mut request = GenerationRequest::new(kind, workflow, args.prompt, ctx.comfyui_url());
    request.negative_prompt = args.negative_prompt;
    request.width = args.width;
    request.height = args.height;
    request.steps = args.steps;
    request.cfg_scale = args.cfg_scale;
    request.seed = args.seed;
    request.fps = args.fps;
    request.length = args.length;
    request.image = image;
    request.comfyui_path = ctx.comfyui_path();

    let handle = ctx.start_generation(request).await?;
    tracing::info!(prompt_id = %handle.id(), "Generation submitted");
    report(follow(&handle).await)
}

async fn watch_workflows(ctx: &AppContext) -> anyhow::Result<()> {
    let mut events = ctx.bus().subscribe();
    let task = ctx.spawn_reconciler();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(TrackerEvent::Workflows(event)) => {
                    let states = ctx.reconciler().states();
                    for id in &event.changed {
                        match states.get(id) {
                            Some(state) => println!(
                                "{id}: active={} running={} progress={}",
                                state.is_active,
                                state.is_running,
                                state.execution_progress.map_or("-".to_string(), |p| format!("{p}%")),
                            ),
                            None => println!("{id}: removed"),
                        }
                    }
                }
                Ok(TrackerEvent::Operation(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Workflow watcher lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    ctx.shutdown().await;
    task.await.context("Reconciler task panicked")?;
    Ok(())
}

async fn sign_in(ctx: &AppContext) -> anyhow::Result<()> {
    let handle = ctx.start_sign_in().await?;
    if let Some(url) = handle.detail().and_then(|d| d["auth_url"].as_str()) {
        println!("Open this URL to sign in:\n{url}");
    }
    let operation = follow(&handle).await;
    if ctx.complete_sign_in(&operation).await? {
        println!("Signed in.");
        Ok(())
    } else {
        report(operation)
    }
}

async fn checkout(ctx: &AppContext, plan: Plan) -> anyhow::Result<()> {
    let Some(adapter) = ctx.checkout_adapter() else {
        bail!("Sign in before upgrading the subscription");
    };
    let session = adapter.create_session(plan).await?;
    println!("Complete the payment at:\n{}", session.checkout_url);
    println!("Then type 'done', 'cancel', or press Enter once the window is closed.");

    let (tx, mut rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        let event = match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "done" => CheckoutEvent::Success,
                "cancel" => CheckoutEvent::Cancelled,
                _ => CheckoutEvent::Closed,
            },
            _ => CheckoutEvent::Closed,
        };
        let _ = tx.send(event).await;
    });

    match await_checkout(ctx.registry(), adapter, &session, &mut rx).await? {
        Some(handle) => report(follow(&handle).await),
        None => {
            println!("Checkout cancelled.");
            Ok(())
        }
    }
}

// ---- private helpers ----

/// Log progress until the operation terminates. Ctrl-C cancels it.
async fn follow(handle: &OperationHandle) -> Operation {
    let mut events = handle.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => match event.kind {
                    OperationEventKind::Progress { percent, message } => {
                        tracing::info!(
                            operation_id = %event.operation_id,
                            percent = ?percent,
                            message = message.as_deref().unwrap_or(""),
                            "Progress"
                        );
                    }
                    OperationEventKind::Transition { from, to, .. } => {
                        tracing::info!(operation_id = %event.operation_id, %from, %to, "Status changed");
                    }
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(operation_id = %handle.id(), "Cancelling");
                handle.cancel();
            }
        }
    }
    handle.wait().await
}

fn report(operation: Operation) -> anyhow::Result<()> {
    match operation.status() {
        OperationStatus::Completed => {
            let result = operation.result().cloned().unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        OperationStatus::Cancelled => {
            println!("Cancelled.");
            Ok(())
        }
        status => {
            let message = operation
                .error()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| status.to_string());
            bail!("{} {}: {message}", operation.domain, operation.id)
        }
    }
}

async fn read_upload(path: &Path) -> anyhow::Result<UploadFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(UploadFile::new(filename, bytes))
}
