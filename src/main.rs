use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chess_capture::analysis::AnalysisClient;
use chess_capture::capture::load_captured;
use chess_capture::config::{self, DEFAULT_CONFIG_PATH};
use chess_capture::fen::validate_fen;
use chess_capture::raster::{png_bytes, rasterize_svg, system_fonts};
use chess_capture::render::{BoardGeometry, render_board};
use chess_capture::store::JsonFileStore;
use chess_capture::tab::{SnapshotDir, TabId, TabSource};
use chess_capture::{CaptureConfig, CaptureSession, Capturer, Orientation};

const TOKEN_ENV: &str = "CHESS_CAPTURE_TOKEN";

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .value_name("FILE")
        .help("Config file (defaults apply when it does not exist)")
        .default_value(DEFAULT_CONFIG_PATH)
        .global(true);

    Command::new("chess-capture")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Captures chess positions (image, FEN, PGN) from Lichess and Chess.com tabs")
        .subcommand_required(true)
        .arg(config_arg)
        .subcommand(
            Command::new("capture")
                .about("Capture one tab and store the result")
                .arg(Arg::new("tab").long("tab").value_name("ID").help("Tab to capture"))
                .arg(
                    Arg::new("snapshots")
                        .long("snapshots")
                        .value_name("DIR")
                        .help("Directory of <tab-id>.json page captures"),
                )
                .arg(
                    Arg::new("chrome")
                        .long("chrome")
                        .value_name("WS_URL")
                        .help("DevTools websocket of a running Chrome (feature \"chrome\")")
                        .conflicts_with("snapshots"),
                )
                .arg(
                    Arg::new("list")
                        .long("list")
                        .action(ArgAction::SetTrue)
                        .help("List available tabs instead of capturing"),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Render a FEN to a board image")
                .arg(Arg::new("fen").required(true).help("Position in FEN"))
                .arg(
                    Arg::new("orientation")
                        .long("orientation")
                        .value_name("SIDE")
                        .default_value("white")
                        .value_parser(["white", "black"]),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_name("FILE")
                        .required(true)
                        .help("Output file; .svg writes markup, anything else PNG"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check FEN syntax")
                .arg(Arg::new("fen").required(true)),
        )
        .subcommand(Command::new("show").about("Print the stored capture"))
        .subcommand(
            Command::new("analyze")
                .about("Ask the analysis API about the stored capture")
                .arg(Arg::new("question").required(true))
                .arg(
                    Arg::new("token")
                        .long("token")
                        .value_name("TOKEN")
                        .help("Bearer token (falls back to CHESS_CAPTURE_TOKEN)"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chess_capture=info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let config_path = matches.get_one::<String>("config").map(PathBuf::from).unwrap_or_default();
    let config = config::load_config(&config_path)?;

    match matches.subcommand() {
        Some(("capture", sub)) => capture(sub, &config).await,
        Some(("render", sub)) => render(sub, &config).await,
        Some(("validate", sub)) => validate(sub),
        Some(("show", _)) => show(&config).await,
        Some(("analyze", sub)) => analyze(sub, &config).await,
        _ => Ok(()),
    }
}

// *************** Subcommands ***************

async fn capture(matches: &ArgMatches, config: &CaptureConfig) -> Result<()> {
    let list = matches.get_flag("list");
    let tab = matches.get_one::<String>("tab").map(|id| TabId::new(id.as_str()));

    if let Some(ws_url) = matches.get_one::<String>("chrome") {
        return capture_chrome(ws_url, list, tab, config).await;
    }

    let dir = matches.get_one::<String>("snapshots").context("Pass --snapshots DIR or --chrome WS_URL")?;
    let tabs = SnapshotDir::new(dir);
    if list {
        for id in tabs.list().with_context(|| format!("Failed to list snapshots in {}", dir))? {
            println!("{}", id);
        }
        return Ok(());
    }
    let tab = tab.context("--tab is required")?;
    run_capture(tabs, &tab, config).await
}

#[cfg(feature = "chrome")]
async fn capture_chrome(ws_url: &str, list: bool, tab: Option<TabId>, config: &CaptureConfig) -> Result<()> {
    use chess_capture::tab::ChromeTabs;

    let tabs = ChromeTabs::connect(ws_url).await.context("Failed to connect to Chrome")?;
    if list {
        for (id, url) in tabs.list().await? {
            println!("{}\t{}", id, url);
        }
        return Ok(());
    }
    let tab = tab.context("--tab is required")?;
    run_capture(tabs, &tab, config).await
}

#[cfg(not(feature = "chrome"))]
async fn capture_chrome(_ws_url: &str, _list: bool, _tab: Option<TabId>, _config: &CaptureConfig) -> Result<()> {
    anyhow::bail!("--chrome needs a build with the \"chrome\" feature")
}

async fn run_capture<S: TabSource>(tabs: S, tab: &TabId, config: &CaptureConfig) -> Result<()> {
    let store = JsonFileStore::new(&config.store_path);
    let capturer = Capturer::new(tabs, store, config);
    let mut session = CaptureSession::new();

    let response = capturer.capture(&mut session, tab).await;
    info!(stages = ?session.history(), "capture finished");
    println!("{}", serde_json::to_string_pretty(&response).context("Failed to serialize response")?);
    Ok(())
}

async fn render(matches: &ArgMatches, config: &CaptureConfig) -> Result<()> {
    let fen = matches.get_one::<String>("fen").context("missing FEN")?;
    let orientation: Orientation = matches
        .get_one::<String>("orientation")
        .map(|s| s.parse::<Orientation>())
        .transpose()?
        .unwrap_or_default();
    let out = Path::new(matches.get_one::<String>("out").context("missing --out")?);

    validate_fen(fen).with_context(|| format!("Cannot render '{}'", fen))?;
    let svg = render_board(fen, orientation, BoardGeometry::from(config)).to_svg();

    if out.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("svg")) {
        std::fs::write(out, svg).with_context(|| format!("Failed to write {}", out.display()))?;
    } else {
        let (size, scale) = (config.board_size, config.raster_scale);
        let data_url = tokio::task::spawn_blocking(move || rasterize_svg(&svg, size, scale, system_fonts()))
            .await
            .context("Rasterizer task failed")??;
        let png = png_bytes(&data_url).context("Rasterizer produced no PNG")?;
        std::fs::write(out, png).with_context(|| format!("Failed to write {}", out.display()))?;
    }
    println!("Wrote {}", out.display());
    Ok(())
}

fn validate(matches: &ArgMatches) -> Result<()> {
    let fen = matches.get_one::<String>("fen").context("missing FEN")?;
    match validate_fen(fen) {
        Ok(()) => {
            println!("valid");
            Ok(())
        }
        Err(e) => anyhow::bail!("invalid FEN: {}", e),
    }
}

async fn show(config: &CaptureConfig) -> Result<()> {
    let store = JsonFileStore::new(&config.store_path);
    match load_captured(&store).await.context("Failed to read capture store")? {
        Some(result) => {
            println!("Site:        {}", result.site);
            println!("Orientation: {}", result.orientation);
            println!("FEN:         {}", result.fen);
            println!("PGN:         {}", if result.pgn.is_empty() { "(none)" } else { &result.pgn });
            println!("Image:       {} bytes of data URL", result.image_data.len());
            println!("Captured at: {} ms", result.timestamp);
        }
        None => println!("No capture stored in {}", config.store_path.display()),
    }
    Ok(())
}

async fn analyze(matches: &ArgMatches, config: &CaptureConfig) -> Result<()> {
    let question = matches.get_one::<String>("question").context("missing question")?;
    let token = match matches.get_one::<String>("token") {
        Some(token) => token.clone(),
        None => std::env::var(TOKEN_ENV).with_context(|| format!("Pass --token or set {}", TOKEN_ENV))?,
    };

    let store = JsonFileStore::new(&config.store_path);
    let capture = load_captured(&store)
        .await
        .context("Failed to read capture store")?
        .context("No capture stored; run `chess-capture capture` first")?;

    let client = AnalysisClient::new(config)?;
    let answer = client.analyze(&token, question, &capture, &[]).await?;
    println!("{}", answer);
    Ok(())
}
