//! PDF Toolbox - launcher bar process
//!
//! Usage: pdf_toolbox [--root DIR] [--display WIDTHxHEIGHT] [--list] [--status]

use anyhow::Context;
use pdf_toolbox::config::ProcessEnv;
use pdf_toolbox::discovery::group_by_category;
use pdf_toolbox::launcher::LauncherState;
use pdf_toolbox::{dialogs, gui, StartupFlags};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let flags = StartupFlags::parse(std::env::args().skip(1))?;
    let options = flags.launcher_options()?;
    tracing::info!("PDF Toolbox starting in {}", options.root_dir.display());

    let mut state = LauncherState::new(options, &ProcessEnv);

    if flags.status {
        println!("Config: {}", state.config_store().path().display());
        println!("{}", state.config().status_text());
        println!(
            "Timeout: {}s, max retries: {}",
            state.config().timeout().as_secs(),
            state.config().max_retries()
        );
        let geometry = state.tool_geometry();
        println!("Tool area: {}", geometry.placement_string());
        if !flags.list {
            return Ok(());
        }
    }

    if let Err(e) = state.start() {
        dialogs::show_error(&e);
        return Err(e.into());
    }

    if flags.list {
        for (category, tools) in group_by_category(state.tools()) {
            println!("{}", category);
            for tool in tools {
                println!("  {}  {}", tool.button_label(), tool.launch_command.display());
            }
        }
        return Ok(());
    }

    gui::run(state).context("Failed to open the launcher window")?;

    tracing::info!("PDF Toolbox exited");
    Ok(())
}
