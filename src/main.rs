mod frame;
mod icon;
mod viewer;
mod window;

#[cfg(target_os = "macos")]
mod macos;

use std::io;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::info;

use viewer::{Mirror, ViewerConfig};

#[derive(Parser, Debug)]
#[command(name = "window-mirror", version, about = "Mirror a window")]
struct Args {
    /// Name of app to mirror
    #[arg(short = 'a', long = "app-name", value_name = "NAME")]
    app_name: String,
}

/// Parses the command line. Usage errors print the help text and exit 1.
fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            eprintln!();
            let _ = Args::command().print_help();
            std::process::exit(1);
        }
    }
}

/// Let Ctrl+C in the terminal end the process even while the GUI loop runs.
#[cfg(unix)]
fn restore_default_sigint() {
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}

#[cfg(not(unix))]
fn restore_default_sigint() {}

fn main() -> anyhow::Result<()> {
    restore_default_sigint();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let args = parse_args();

    let backend = window::platform_backend();
    let window_id = window::resolve(
        backend.as_ref(),
        &args.app_name,
        io::stdin().lock(),
        io::stdout().lock(),
    )
    .with_context(|| format!("Cannot mirror \"{}\"", args.app_name))?;

    let config = ViewerConfig::default();
    let mirror = Mirror::new(backend, window_id);
    viewer::run(config, mirror).map_err(|e| anyhow::anyhow!("eframe error: {}", e))?;

    info!("Viewer closed");
    Ok(())
}
