use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vttedit_core::{
    time, Command, CueAddress, CueField, DocumentSource, DurationExt, Editor, Outcome,
    PersistenceGateway, VttEditConfig,
};

#[derive(Parser)]
#[command(name = "vttedit", version, about = "Edit WebVTT subtitle cues with autosave")]
struct Cli {
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "The .vtt file to edit. A saved version of the same file name is restored instead of re-reading it."
    )]
    file: Option<PathBuf>,
    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// List the cues of the document
    Show,
    /// Print the start position of a cue for the player to seek to
    Play { index: usize },
    /// Append a new cue starting at a media position
    Add {
        #[arg(long, value_parser = parse_position, help = "HH:MM:SS.mmm or seconds")]
        at: Duration,
    },
    /// Overwrite one field of a cue (id, start, end or text)
    Set {
        index: usize,
        field: CueField,
        value: String,
    },
    /// Set a cue's start time to a media position
    SetStart {
        index: usize,
        #[arg(long, value_parser = parse_position, help = "HH:MM:SS.mmm or seconds")]
        at: Duration,
    },
    /// Set a cue's end time to a media position
    SetEnd {
        index: usize,
        #[arg(long, value_parser = parse_position, help = "HH:MM:SS.mmm or seconds")]
        at: Duration,
    },
    /// Remove a cue
    Delete { index: usize },
    /// List cues active at a media position
    Active {
        #[arg(long, value_parser = parse_position, help = "HH:MM:SS.mmm or seconds")]
        at: Duration,
    },
    /// Write the document as WebVTT
    Export {
        #[arg(
            short,
            long,
            value_name = "PATH",
            help = "File or directory to write to. If not supplied, the document is written to standard output."
        )]
        output: Option<PathBuf>,
    },
    /// Show which document is open and when it was last saved
    Info,
    /// Delete the saved copy of the document, or of every document when no file is given
    Clear,
}

impl Action {
    const fn needs_document(&self) -> bool {
        !matches!(self, Self::Info | Self::Clear | Self::Export { .. })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Check config for logging.enabled before full config load
    init_tracing(check_file_logging_enabled());

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("An error occurred: {err}");
            for cause in err.chain().skip(1) {
                eprintln!("    {cause}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = VttEditConfig::load_or_create().with_context(|| {
        format!(
            "Failed to load config file: '{}'",
            VttEditConfig::config_path().display()
        )
    })?;

    let gateway = Arc::new(PersistenceGateway::open(&config.storage).await);
    let mut editor = Editor::new(gateway, config.editor);
    let mut events = editor.subscribe();

    if let Some(path) = &cli.file {
        open(&mut editor, path).await?;
    } else if cli.command.needs_document() {
        return Err(anyhow!("This command needs a document, pass one with --file"));
    }

    let result = execute(&mut editor, cli.command).await;

    while let Ok(event) = events.try_recv() {
        debug!("Editor event: {:?}", event);
    }
    editor.shutdown().await;
    result
}

async fn open(editor: &mut Editor, path: &Path) -> Result<()> {
    let name = document_name(path)?;
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to open input file: '{}'", path.display()))?;

    match editor.open_document(&name, &contents).await {
        DocumentSource::Restored { last_modified } => {
            info!("Restored saved edits of {} from {}", name, last_modified);
        }
        DocumentSource::Parsed => {
            if editor.cues().is_empty() {
                info!("No cues found in {}", path.display());
            }
        }
    }
    Ok(())
}

async fn execute(editor: &mut Editor, action: Action) -> Result<()> {
    match action {
        Action::Show => {
            for (index, _, cue) in editor.cues().entries() {
                println!(
                    "[{index}] {} {} --> {}",
                    cue.id, cue.start_time, cue.end_time
                );
                println!("    {}", cue.text);
            }
        }
        Action::Play { index } => {
            let position = apply(editor, Command::Play(CueAddress::at(index)))?;
            if let Outcome::Seek(position) = position {
                println!("{}", position.to_timecode());
            }
        }
        Action::Add { at } => {
            if let Outcome::Added { index, .. } = apply(editor, Command::Add { reference: at })? {
                println!("Added cue {index}");
            }
        }
        Action::Set {
            index,
            field,
            value,
        } => {
            apply(
                editor,
                Command::Update {
                    address: CueAddress::at(index),
                    field,
                    value,
                },
            )?;
        }
        Action::SetStart { index, at } => {
            apply(
                editor,
                Command::SetStart {
                    address: CueAddress::at(index),
                    position: at,
                },
            )?;
        }
        Action::SetEnd { index, at } => {
            apply(
                editor,
                Command::SetEnd {
                    address: CueAddress::at(index),
                    position: at,
                },
            )?;
        }
        Action::Delete { index } => {
            if let Outcome::Removed { cue, .. } =
                apply(editor, Command::Delete(CueAddress::at(index)))?
            {
                println!("Deleted cue {index}: {}", cue.text);
            }
        }
        Action::Active { at } => {
            for index in editor.active_cues(at) {
                if let Ok(cue) = editor.cues().get(index) {
                    println!("[{index}] {}", cue.text);
                }
            }
        }
        Action::Export { output } => export(editor, output.as_deref()).await?,
        Action::Info => println!("{}", editor.storage_info().await),
        Action::Clear => {
            editor.clear_storage().await;
            println!("Storage cleared");
        }
    }

    editor.flush().await;
    Ok(())
}

fn apply(editor: &mut Editor, command: Command) -> Result<Outcome> {
    editor
        .apply(command)
        .context("Failed to apply edit")
}

async fn export(editor: &Editor, output: Option<&Path>) -> Result<()> {
    let rendered = editor.export().context("Failed to export document")?;

    let Some(output) = output else {
        print!("{rendered}");
        return Ok(());
    };

    let target = if output.is_dir() {
        output.join(editor.export_file_name())
    } else {
        output.to_path_buf()
    };
    tokio::fs::write(&target, rendered)
        .await
        .with_context(|| format!("Failed to write output file: '{}'", target.display()))?;
    info!("Exported {} cue(s) to {}", editor.cues().len(), target.display());
    Ok(())
}

/// Documents are keyed by file name, not by full path
fn document_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("'{}' is not a file name", path.display()))
}

/// Accept a timestamp or a plain number of seconds
fn parse_position(value: &str) -> std::result::Result<Duration, String> {
    if let Ok(position) = time::parse(value) {
        return Ok(position);
    }
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is neither HH:MM:SS.mmm nor a number of seconds"))?;
    time::duration_from_secs(seconds).map_err(|e| e.to_string())
}

fn check_file_logging_enabled() -> bool {
    // Minimal structs to parse just the logging.enabled field
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(VttEditConfig::config_path()) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing with stderr output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Keep stdout for command output
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path = vttedit_core::paths::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position() {
        assert_eq!(
            parse_position("00:01:02.500").unwrap(),
            Duration::from_millis(62_500)
        );
        assert_eq!(parse_position("2.25").unwrap(), Duration::from_millis(2_250));
        assert!(parse_position("-1").is_err());
        assert!(parse_position("soon").is_err());
    }

    #[test]
    fn test_document_name_ignores_directories() {
        assert_eq!(
            document_name(Path::new("/media/talks/intro.vtt")).unwrap(),
            "intro.vtt"
        );
        assert!(document_name(Path::new("/")).is_err());
    }

    #[test]
    fn test_cli_arguments() {
        let cli = Cli::try_parse_from([
            "vttedit", "set", "2", "start", "00:00:01.000", "--file", "a.vtt",
        ])
        .unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("a.vtt")));
        assert!(matches!(
            cli.command,
            Action::Set {
                index: 2,
                field: CueField::StartTime,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["vttedit", "add", "--at", "4"]).unwrap();
        assert!(cli.command.needs_document());
        assert!(!Cli::try_parse_from(["vttedit", "clear"])
            .unwrap()
            .command
            .needs_document());

        assert!(Cli::try_parse_from(["vttedit", "set", "0", "colour", "red"]).is_err());
    }
}
