// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use payment_dispatch::{
    build_sender, AppConfig, Category, Delivery, Session, TransportKind, WorkdirCleanup,
};
use tempfile::TempDir;

#[derive(Parser)]
#[command(name = "payment-dispatch", version, about = "Envío de comprobantes de pago a proveedores")]
struct Cli {
    /// Configuration file (default: ./payment-dispatch.toml if present)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (shows dropped/unmatched files)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify an archive against a roster and print the results
    Classify {
        roster: PathBuf,
        archive: PathBuf,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify, then ask yes/no per supplier before sending
    Send {
        roster: PathBuf,
        archive: PathBuf,

        /// Only ask about these suppliers (canonical names)
        #[arg(long = "supplier", value_name = "NAME")]
        suppliers: Vec<String>,
    },

    /// Interactive terminal UI
    #[cfg(feature = "tui")]
    Ui { roster: PathBuf, archive: PathBuf },

    /// Write the effective configuration (defaults if none loaded)
    InitConfig { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stderr en modo TUI rompe la pantalla alternativa
    #[cfg(feature = "tui")]
    let fullscreen = matches!(cli.command, Command::Ui { .. });
    #[cfg(not(feature = "tui"))]
    let fullscreen = false;

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else if fullscreen {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config = AppConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Command::Classify {
            roster,
            archive,
            json,
        } => run_classify(&config, &roster, &archive, json),
        Command::Send {
            roster,
            archive,
            suppliers,
        } => run_send(&config, &roster, &archive, &suppliers),
        #[cfg(feature = "tui")]
        Command::Ui { roster, archive } => run_ui_mode(&config, &roster, &archive),
        Command::InitConfig { path } => run_init_config(&config, &path),
    }
}

fn run_init_config(config: &AppConfig, path: &Path) -> Result<()> {
    anyhow::ensure!(
        !path.exists(),
        "Refusing to overwrite existing file: {}",
        path.display()
    );

    config.save(path)?;
    println!("✓ Configuration written to {}", path.display());
    Ok(())
}

/// Ctrl+C / SIGTERM mata el proceso sin drop: borrar los PDFs extraídos antes
fn install_interrupt_cleanup(cleanup: WorkdirCleanup) -> Result<()> {
    ctrlc::set_handler(move || {
        #[cfg(feature = "tui")]
        {
            let _ = crossterm::terminal::disable_raw_mode();
            let _ = crossterm::execute!(io::stdout(), crossterm::terminal::LeaveAlternateScreen);
        }

        match cleanup.run() {
            Ok(()) => log::info!("Interrupted; removed {}", cleanup.path().display()),
            Err(e) => eprintln!("Failed to remove {}: {}", cleanup.path().display(), e),
        }
        std::process::exit(130);
    })
    .context("Failed to install interrupt handler")
}

/// Session whose work dir is removed on normal exit (drop) and on signals
fn start_session(config: &AppConfig, roster: &Path, archive: &Path) -> Result<Session> {
    let workdir = TempDir::new().context("Failed to create session directory")?;
    install_interrupt_cleanup(WorkdirCleanup::new(workdir.path()))?;
    Session::open_in(workdir, roster, archive, &config.roster)
}

fn open_session(config: &AppConfig, roster: &Path, archive: &Path) -> Result<Session> {
    println!("📂 Loading roster and archive...");
    let session = start_session(config, roster, archive)?;
    println!(
        "✓ Se procesaron {} proveedores con archivos asociados.",
        session.bundles().len()
    );
    Ok(session)
}

/// Results view: emails, counts and filenames per supplier and category
fn print_results(session: &Session) {
    for (name, bundle) in session.bundles() {
        println!("\n━━━ {} ━━━", name);
        println!("Emails: {}", bundle.email.join(", "));

        for category in Category::BUNDLED {
            println!(
                "- {}: {} archivo(s)",
                category.name(),
                bundle.files(category).len()
            );
        }

        for category in Category::BUNDLED {
            for file in bundle.files(category) {
                let file_name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                println!("    [{}] {}", category.tag(), file_name);
            }
        }
    }
}

fn run_classify(config: &AppConfig, roster: &Path, archive: &Path, json: bool) -> Result<()> {
    if json {
        let session = start_session(config, roster, archive)?;
        let output = serde_json::to_string_pretty(&session.summary())?;
        println!("{}", output);
        return Ok(());
    }

    let session = open_session(config, roster, archive)?;
    print_results(&session);
    Ok(())
}

fn run_send(config: &AppConfig, roster: &Path, archive: &Path, only: &[String]) -> Result<()> {
    let sender = build_sender(&config.mail)?;
    warn_if_outbox(config);
    let mut session = open_session(config, roster, archive)?;
    print_results(&session);

    let wanted: Vec<String> = only.iter().map(payment_dispatch::normalize).collect();
    let stdin = io::stdin();
    let mut input = stdin.lock();

    let mut sent = 0;
    let mut saved = 0;
    let mut failed = 0;

    for name in session.suppliers() {
        if !wanted.is_empty() && !wanted.contains(&name) {
            continue;
        }

        if !ask_yes_no(&mut input, &format!("¿Querés enviar el mail ahora a {}?", name))? {
            session.decline(&name)?;
            continue;
        }

        // Un fallo no frena al siguiente proveedor
        match session.send(&name, sender.as_ref()) {
            Ok(dispatched) => {
                let icon = match dispatched.delivery {
                    Delivery::Sent(_) => {
                        sent += 1;
                        "✅"
                    }
                    Delivery::Saved(_) => {
                        saved += 1;
                        "📁"
                    }
                };
                println!("{} {}", icon, dispatched.delivery.report(&name));
            }
            Err(err) => {
                failed += 1;
                eprintln!("❌ Error al enviar el mail: {:#}", err);
            }
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✓ Enviados: {}  📁 En outbox (sin enviar): {}  ✗ Con error: {}",
        sent, saved, failed
    );
    Ok(())
}

fn warn_if_outbox(config: &AppConfig) {
    if matches!(config.mail.transport, TransportKind::Outbox) {
        println!(
            "⚠️  Transporte outbox: los mails se guardan en {} y NO se envían",
            config.mail.outbox_dir.display()
        );
    }
}

/// Ask once; anything but an explicit yes is "no"
fn ask_yes_no<R: BufRead>(input: &mut R, question: &str) -> Result<bool> {
    print!("{} [s/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("Failed to read confirmation from stdin")?;

    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "s" | "si" | "sí" | "y" | "yes"
    ))
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig, roster: &Path, archive: &Path) -> Result<()> {
    let sender = build_sender(&config.mail)?;
    warn_if_outbox(config);
    let session = open_session(config, roster, archive)?;

    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(session, sender);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}
