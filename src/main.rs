use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use printbridge::config::{JsonSettingsStore, Margins, SettingsStore};
use printbridge::{
    BridgeOptions, BridgeParts, Completion, DialogRequest, HostUi, InterceptorOptions,
    JobOutcome, MessageTransport, PaperFormat, PrintBridge, SettingsPatch,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "printbridge", version, about = "Silent printing bridge for embedded web apps")]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Render timeout in milliseconds
    #[arg(long, global = true, default_value_t = 30000)]
    timeout_ms: u64,

    /// Do not escalate failed silent prints
    #[arg(long, global = true)]
    no_fallback: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed printers
    Printers,
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print the diagnostic test page
    TestPrint,
    /// Print an HTML file ("-" reads stdin)
    Print { file: PathBuf },
    /// Handle a message as posted by the interception script
    Message { json: String },
    /// Write a print preview page for an HTML file
    Preview {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Emit the interception script for injection into a webview
    Script {
        /// ipc, webview2, webkit[:handler] or binding:<name>
        #[arg(long, default_value = "ipc")]
        transport: MessageTransport,
        /// Leave out the legacy flutter_inappwebview handler
        #[arg(long)]
        no_legacy: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        printer: Option<String>,
        #[arg(long)]
        paper: Option<PaperFormat>,
        #[arg(long)]
        silent: Option<bool>,
        #[arg(long)]
        scale: Option<u32>,
        #[arg(long)]
        font_size: Option<u32>,
        /// "top,right,bottom,left" in millimetres, or a single value
        #[arg(long)]
        margins: Option<Margins>,
        #[arg(long)]
        home_url: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
}

/// Console host: the "dialog" is a saved document the user prints by hand.
struct ConsoleUi;

impl HostUi for ConsoleUi {
    fn present_dialog(&self, request: &DialogRequest) -> printbridge::Result<()> {
        let Some(document) = &request.document else {
            return Err(printbridge::Error::Other(
                "no primary view to show a dialog for".into(),
            ));
        };
        let file = tempfile::Builder::new()
            .prefix("printbridge-dialog-")
            .suffix(".html")
            .tempfile()?;
        std::fs::write(file.path(), document)?;
        let (_, path) = file
            .keep()
            .map_err(|e| printbridge::Error::Io(e.error))?;
        eprintln!(
            "{}: silent printing unavailable; open {} and print it manually",
            request.job,
            path.display()
        );
        Ok(())
    }

    fn notify(&self, message: &str) {
        eprintln!("{}", message);
    }
}

fn open_store(cli: &Cli) -> anyhow::Result<JsonSettingsStore> {
    match &cli.config {
        Some(path) => Ok(JsonSettingsStore::new(path)),
        None => JsonSettingsStore::open_default().context("no settings location"),
    }
}

fn read_input(file: &PathBuf) -> anyhow::Result<String> {
    if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))
    }
}

fn report(outcome: &JobOutcome) -> anyhow::Result<()> {
    match &outcome.completion {
        Completion::Silent { printer } => {
            println!("{}: printed on {}", outcome.id, printer);
            Ok(())
        }
        Completion::Dialog => {
            println!("{}: handed to the print dialog", outcome.id);
            Ok(())
        }
        Completion::Failed { message } => bail!("{}: {}", outcome.id, message),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let store = Arc::new(open_store(&cli)?);

    // Commands that need no print pipeline
    match &cli.command {
        Command::Settings { action: SettingsAction::Show } => {
            let settings = store.load()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            return Ok(());
        }
        Command::Settings {
            action:
                SettingsAction::Set {
                    printer,
                    paper,
                    silent,
                    scale,
                    font_size,
                    margins,
                    home_url,
                    language,
                },
        } => {
            let patch = SettingsPatch {
                home_url: home_url.clone(),
                language: language.clone(),
                printer_name: printer.clone(),
                paper_format: *paper,
                silent: *silent,
                margins: *margins,
                scale: *scale,
                font_size: *font_size,
                ..Default::default()
            };
            let settings = store.update(patch)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            return Ok(());
        }
        Command::Script {
            transport,
            no_legacy,
        } => {
            let options = InterceptorOptions {
                transport: transport.clone(),
                legacy_handler: !no_legacy,
            };
            println!("{}", printbridge::interceptor::script(&options));
            return Ok(());
        }
        _ => {}
    }

    let options = BridgeOptions {
        render_timeout_ms: cli.timeout_ms,
        fallback_enabled: !cli.no_fallback,
        ..Default::default()
    };
    let bridge = PrintBridge::new(BridgeParts {
        settings: store,
        spooler: printbridge::spooler::system_spooler(),
        surfaces: printbridge::default_surfaces(&options)?,
        ui: Arc::new(ConsoleUi),
        options,
        observer: None,
    });

    let result = match &cli.command {
        Command::Printers => {
            let printers = bridge.list_printers()?;
            if printers.is_empty() {
                println!("no printers installed");
            }
            for device in printers {
                let marker = if device.is_default { " (default)" } else { "" };
                println!("{}{}", device.name, marker);
            }
            Ok(())
        }
        Command::TestPrint => report(&bridge.test_print().await?),
        Command::Print { file } => {
            let html = read_input(file)?;
            if html.trim().is_empty() {
                bail!("{} is empty", file.display());
            }
            report(&bridge.print(Some(html)).await?)
        }
        Command::Message { json } => report(&bridge.handle_message(json)?.outcome().await?),
        Command::Preview { file, output } => {
            let page = bridge.preview(&read_input(file)?)?;
            match output {
                Some(path) => std::fs::write(path, page)
                    .with_context(|| format!("writing {}", path.display())),
                None => {
                    println!("{}", page);
                    Ok(())
                }
            }
        }
        Command::Settings { .. } | Command::Script { .. } => Ok(()),
    };

    bridge.shutdown().await?;
    result
}
