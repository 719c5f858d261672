use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use birthday_greeting_core::{
    render::{Balloon, CardMessage},
    timeline, AppConfig, Collaborators, FaultView, GeminiClient, GreetingError, RenderDescriptor,
    Scene, Stage, TracingEmitter, TracingOutput, WishPrompt, WishService,
};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

type Input = Lines<BufReader<Stdin>>;

fn main() -> birthday_greeting_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Play { config, auto } => runtime.block_on(run_play(config.as_deref(), auto)),
        Commands::Wish { config } => runtime.block_on(run_wish(config.as_deref())),
        Commands::Timeline { config } => run_timeline(config.as_deref()),
    }
}

async fn run_play(path: Option<&Path>, auto: bool) -> birthday_greeting_core::Result<()> {
    let config = AppConfig::load(path)?;
    tracing::info!(recipient = %config.greeting.recipient, auto, "starting greeting");

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match run_session(&config, &mut input, auto).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::error!(error = %err, "session crashed");
                show_fault(&FaultView::from_error(&err));
                if auto || input.next_line().await?.is_none() {
                    return Err(err);
                }
                tracing::info!("reloading");
            }
        }
    }
}

async fn run_session(
    config: &AppConfig,
    input: &mut Input,
    auto: bool,
) -> birthday_greeting_core::Result<()> {
    let (handle, task) = Stage::spawn(config, collaborators(config)?);
    let mut scenes = handle.subscribe_scene();
    let mut cards = handle.subscribe_card();
    let mut terminal = TerminalRenderer::new();

    terminal.draw(&handle.view())?;
    if auto {
        handle.start();
    }

    loop {
        tokio::select! {
            changed = scenes.changed() => {
                if changed.is_err() {
                    break;
                }
                let scene = *scenes.borrow_and_update();
                terminal.draw(&handle.view())?;
                if auto && scene == Scene::CardReveal {
                    handle.open_card();
                }
            }
            changed = cards.changed() => {
                if changed.is_err() {
                    break;
                }
                let ready = cards.borrow_and_update().wish().is_some();
                terminal.draw(&handle.view())?;
                if ready {
                    break;
                }
            }
            line = input.next_line(), if !auto => {
                if line?.is_none() {
                    break;
                }
                match handle.scene() {
                    Scene::Intro => handle.start(),
                    Scene::CardReveal => handle.open_card(),
                    _ => {}
                }
            }
        }
    }

    drop(handle);
    task.await
        .map_err(|err| GreetingError::msg(format!("stage task failed: {err}")))
}

async fn run_wish(path: Option<&Path>) -> birthday_greeting_core::Result<()> {
    let config = AppConfig::load(path)?;
    let wish = wish_service(&config)?.generate().await;
    println!("{wish}");
    Ok(())
}

fn run_timeline(path: Option<&Path>) -> birthday_greeting_core::Result<()> {
    let config = AppConfig::load(path)?;
    println!("{}", serde_json::to_string_pretty(&timeline(&config))?);
    Ok(())
}

fn wish_service(config: &AppConfig) -> birthday_greeting_core::Result<WishService> {
    let client = GeminiClient::new(&config.generation)?;
    Ok(WishService::new(
        Arc::new(client),
        WishPrompt::for_greeting(&config.greeting),
    ))
}

fn collaborators(config: &AppConfig) -> birthday_greeting_core::Result<Collaborators> {
    Ok(Collaborators {
        audio: Arc::new(TracingOutput),
        particles: Arc::new(TracingEmitter),
        wishes: wish_service(config)?,
    })
}

/// Draws render descriptors as plain text frames.
struct TerminalRenderer {
    out: io::Stdout,
}

const SKY_WIDTH: usize = 60;

impl TerminalRenderer {
    fn new() -> Self {
        Self { out: io::stdout() }
    }

    fn draw(&mut self, view: &RenderDescriptor) -> birthday_greeting_core::Result<()> {
        let frame = self.frame(view);
        let mut out = self.out.lock();
        writeln!(out, "\n{frame}")
            .and_then(|_| out.flush())
            .map_err(|err| GreetingError::Render(err.to_string()))
    }

    fn frame(&self, view: &RenderDescriptor) -> String {
        match view {
            RenderDescriptor::Intro {
                title,
                tagline,
                start_label,
                sound_hint,
            } => format!("*** {title} ***\n{tagline}\n[ {start_label} ] (press Enter)\n{sound_hint}"),
            RenderDescriptor::Balloons { letters, background } => {
                let name: String = letters.iter().map(|b| format!("({})", b.letter)).collect();
                format!("{}\n{name}", sky(background))
            }
            RenderDescriptor::Cake {
                candles,
                light_delays,
                overlay,
                ..
            } => {
                let flames = if light_delays.is_empty() {
                    " ".repeat(usize::from(*candles) * 2)
                } else {
                    "i ".repeat(usize::from(*candles))
                };
                let mut frame = format!("  {flames}\n [==========]\n[============]");
                if let Some(overlay) = overlay {
                    frame = format!("{overlay}\n{frame}");
                }
                frame
            }
            RenderDescriptor::Card {
                open,
                cover,
                heading,
                message,
                signature,
            } => {
                if !open {
                    let hint = match message {
                        CardMessage::ClickHint(hint) => *hint,
                        _ => "",
                    };
                    return format!("+--------------+\n|  {cover}\n+--------------+\n{hint} (press Enter)");
                }
                let body = match message {
                    CardMessage::Wish(text) => text.as_str(),
                    CardMessage::Loading(text) | CardMessage::ClickHint(text) => *text,
                };
                format!("{heading}\n\n{body}\n\n{signature}")
            }
        }
    }
}

/// One row of `o` glyphs, each balloon placed by its horizontal position.
fn sky(background: &[Balloon]) -> String {
    let mut row = vec![' '; SKY_WIDTH];
    for balloon in background {
        let column = (balloon.x_vw / 100.0 * SKY_WIDTH as f32) as usize;
        row[column.min(SKY_WIDTH - 1)] = 'o';
    }
    row.into_iter().collect::<String>().trim_end().to_string()
}

fn show_fault(view: &FaultView) {
    eprintln!(
        "\n!! {}\n{}\n{}\n[ {} ] (press Enter)",
        view.title, view.detail, view.error, view.action
    );
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Animated birthday greeting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play the greeting in the terminal.
    Play {
        /// Optional TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Press start and open the card automatically.
        #[arg(long)]
        auto: bool,
    },
    /// Only request the birthday message and print it.
    Wish {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print every scene's timers and effects as JSON.
    Timeline {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
