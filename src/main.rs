use std::path::PathBuf;
use std::process;

use clap::Parser;
use futures::future::join_all;
use log::{error, info, warn};
use scrunner::{Config, Project, Services};

#[derive(Parser, Debug)]
#[command(name = "scrunner")]
#[command(about = "Run the green-flag scripts of an extracted Scratch project")]
struct Args {
  /// Path to the project.json
  #[arg(default_value = "project.json")]
  project: PathBuf,

  /// Largest number of items a list may hold
  #[arg(long)]
  list_item_limit: Option<usize>,
}

#[tokio::main]
async fn main() {
  pretty_env_logger::init();
  let args = Args::parse();
  let mut config = Config::default();
  if let Some(limit) = args.list_item_limit {
    config.list_item_limit = limit;
  }
  let project = match Project::load(&args.project, config) {
    Ok(project) => project,
    Err(err) => {
      error!("cannot run `{}`: {err}", args.project.display());
      process::exit(1);
    }
  };
  let services = Services::new(&project.config);
  let handles = project.green_flag(&services);
  info!("running {} scripts", handles.len());
  let mut scripts = join_all(handles);
  let finished = tokio::select! {
    finished = &mut scripts => finished,
    _ = tokio::signal::ctrl_c() => {
      warn!("interrupted, stopping all scripts");
      project.stop_all();
      scripts.await
    }
  };
  for result in finished {
    if let Err(err) = result {
      error!("script task failed: {err}");
    }
  }
}
