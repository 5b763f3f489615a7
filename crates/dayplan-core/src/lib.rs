pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod messages;
pub mod pages;
pub mod render;
pub mod selected_date;
pub mod session;
pub mod storage;
pub mod store;
pub mod task;

use std::ffi::OsString;
use std::io::{
  self,
  Write
};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

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
    "starting dayplan"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir = cfg
    .data_dir(cli.data.as_deref())
    .context(
      "failed to resolve data \
       directory"
    )?;

  let kv = storage::FileKv::open(
    &data_dir
  )
  .with_context(|| {
    format!(
      "failed to open storage at {}",
      data_dir.display()
    )
  })?;

  let zone = datetime::Zone::resolve(
    cfg.timezone()
  );
  let renderer =
    render::Renderer::new(&cfg)?;

  // Stdin stays unlocked so `watch` can
  // read it from its own thread.
  let stdout = io::stdout();
  let mut out = stdout.lock();
  let mut input =
    io::BufReader::new(io::stdin());

  let mut env = commands::CommandEnv {
    storage: storage::Storage::new(
      Arc::new(kv)
    ),
    cfg: &cfg,
    renderer: &renderer,
    zone,
    now: Utc::now(),
    out: &mut out,
    input: &mut input
  };

  commands::dispatch(
    &mut env,
    cli.command
  )?;
  out.flush()?;

  info!("done");
  Ok(())
}
