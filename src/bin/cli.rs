//! browser-dom CLI
//!
//! Rebuilds the DOM tree either from a captured extraction payload or from a
//! live page, and prints the tree and its interactive elements.

use anyhow::Context;
use browser_dom::dom::{AssemblerConfig, Instrumentation, PhaseTimings};
use browser_dom::{
    BrowserSession, BuildParams, DomService, DomServiceConfig, DomState, ExtractionBridge, LaunchOptions,
    StaticBridge,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "browser-dom", version, about = "Rebuild DOM trees from page snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild from a payload captured earlier (JSON file)
    Replay {
        /// Path to the payload
        path: PathBuf,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// Open a page in Chrome and rebuild its DOM
    Capture {
        /// URL to open
        url: String,

        /// Extraction function source (JavaScript)
        #[arg(long)]
        script: PathBuf,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Chrome binary to use
        #[arg(long)]
        chrome: Option<PathBuf>,

        #[command(flatten)]
        build: BuildArgs,
    },
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Do not draw highlight overlays
    #[arg(long)]
    no_highlight: bool,

    /// Highlight only this index (-1 for all)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    focus: i64,

    /// Pixels beyond the viewport still treated as visible (-1 for the whole page)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    viewport_expansion: i64,

    /// Node count above which large-snapshot pruning applies
    #[arg(long, default_value_t = 10_000)]
    large_threshold: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Outline)]
    format: OutputFormat,

    /// Print phase timings to stderr
    #[arg(long)]
    timings: bool,
}

impl BuildArgs {
    fn params(&self) -> BuildParams {
        BuildParams::new()
            .highlight(!self.no_highlight)
            .focus(self.focus)
            .viewport_expansion(self.viewport_expansion)
    }

    fn config(&self) -> DomServiceConfig {
        DomServiceConfig::new()
            .without_cache()
            .assembler(AssemblerConfig::new().large_snapshot_threshold(self.large_threshold))
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Indented tag outline
    Outline,
    /// Nested JSON tree
    Json,
    /// Interactive elements only
    Clickable,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Replay { path, build } => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            run(StaticBridge::from_text(text), &build).await
        }
        Command::Capture {
            url,
            script,
            headed,
            chrome,
            build,
        } => {
            let source =
                std::fs::read_to_string(&script).with_context(|| format!("Failed to read {}", script.display()))?;

            let mut options = LaunchOptions::new().headless(!headed);
            if let Some(chrome) = chrome {
                options = options.chrome_path(chrome);
            }

            let session = BrowserSession::launch(options)?;
            session.navigate(&url)?;
            let bridge = browser_dom::TabBridge::new(session.tab()?, source);
            run(bridge, &build).await
        }
    }
}

async fn run<B: ExtractionBridge>(bridge: B, build: &BuildArgs) -> anyhow::Result<()> {
    let timings = Arc::new(PhaseTimings::new());
    let service = DomService::with_config(bridge, build.config())
        .with_instrumentation(Arc::clone(&timings) as Arc<dyn Instrumentation>);

    let dom = service.clickable_elements(build.params()).await?;
    print_state(&dom, build.format)?;

    if build.timings {
        eprintln!("{}", timings.summary());
    }

    Ok(())
}

fn print_state(dom: &DomState, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Outline => print!("{}", dom.outline()),
        OutputFormat::Json => println!("{}", dom.to_json()?),
        OutputFormat::Clickable => {
            for (index, element) in dom.clickable_elements() {
                println!("[{}] {} {}", index, element.to_simple_string(), element.xpath);
            }
        }
    }

    eprintln!(
        "{} nodes, {} elements, {} interactive",
        dom.len(),
        dom.count_elements(),
        dom.count_interactive()
    );
    Ok(())
}
