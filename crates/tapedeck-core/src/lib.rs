pub mod actions;
pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod console;
pub mod datetime;
pub mod navigation;
pub mod project;
pub mod render;
pub mod store;
pub mod tape;
pub mod view;

use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::actions::Confirm;
use crate::app::{
  App,
  Flow
};
use crate::cli::CliCommand;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tapedeck"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );
  if let Some(server) = cli.server {
    cfg.apply_overrides([(
      "server.url".to_string(),
      server
    )]);
  }

  let backend = api::HttpBackend::new(
    &cfg.server_url(),
    cfg.request_timeout()?
  )
  .context(
    "failed to build machine client"
  )?;
  let renderer =
    render::Renderer::new(&cfg)?;
  let view = view::ViewState::new(
    cfg.default_sort()?
  );

  let mut app = App::new(
    io::stdout(),
    renderer,
    Arc::new(backend),
    cfg.settle()?,
    view
  );

  let command = cli
    .command
    .unwrap_or(CliCommand::Console);

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  runtime.block_on(execute(
    &mut app, command
  ))?;

  info!("done");
  Ok(())
}

async fn execute<W: io::Write>(
  app: &mut App<W>,
  command: CliCommand
) -> anyhow::Result<()> {
  if command == CliCommand::Console {
    let stdin = io::stdin();
    let interactive =
      stdin.is_terminal();
    return console::run(
      app,
      stdin.lock(),
      interactive
    )
    .await;
  }

  let assume_yes =
    command.assumes_yes();
  let mut ask_stdin = |prompt: &str| {
    console::ask(
      &mut io::stdin().lock(),
      prompt
    )
  };
  let mut yes = |_: &str| true;
  let confirm: &mut dyn Confirm =
    if assume_yes {
      &mut yes
    } else {
      &mut ask_stdin
    };

  for step in command.into_commands()? {
    if app.dispatch(step, confirm).await?
      == Flow::Quit
    {
      break;
    }
  }
  Ok(())
}
