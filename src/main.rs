use archivist::archive_fs::LiveArchiveFs;
use archivist::config::RuntimeConfig;
use archivist::context::RuntimeContext;
use archivist::logging::init_tracing;
use archivist::types::UserSettings;
use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::PathBuf;
use tracing::info;

fn cli() -> Command {
	Command::new("archivist")
		.version("0.1.0")
		.about("Peer-to-peer content-addressed archive runtime")
		.subcommand_required(true)
		.arg(
			Arg::new("dat-path")
				.long("dat-path")
				.value_name("DIR")
				.help("Overrides the on-disk state root (default: ~/.archivist)"),
		)
		.subcommand(
			Command::new("open")
				.about("Loads an archive, creating a fresh owned one if no URL is given")
				.arg(Arg::new("url").help("dat:// URL or bare key; omit to create a new owned archive")),
		)
		.subcommand(
			Command::new("configure")
				.about("Updates an archive's user settings")
				.arg(Arg::new("url").required(true))
				.arg(Arg::new("networked").long("networked").action(ArgAction::SetTrue))
				.arg(Arg::new("no-networked").long("no-networked").action(ArgAction::SetTrue))
				.arg(Arg::new("auto-download").long("auto-download").action(ArgAction::SetTrue))
				.arg(Arg::new("sync-path").long("sync-path").value_name("DIR"))
				.arg(Arg::new("preview").long("preview").action(ArgAction::SetTrue)),
		)
		.subcommand(
			Command::new("crawl")
				.about("Runs one crawl pass over an already-loaded archive")
				.arg(Arg::new("url").required(true)),
		)
		.subcommand(Command::new("serve").about("Runs the swarm listener and GC loop until interrupted"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	init_tracing();
	let matches = cli().get_matches();

	let dat_path_override = matches.get_one::<String>("dat-path").map(PathBuf::from);
	let config = RuntimeConfig::load(dat_path_override)?;
	let ctx = RuntimeContext::new(config)?;

	match matches.subcommand() {
		Some(("open", sub)) => {
			let url = sub.get_one::<String>("url").map(|s| s.as_str());
			let archive = ctx.registry.load_archive(url, None).await?;
			println!("{}", archive.key);
		}
		Some(("configure", sub)) => {
			let url = sub.get_one::<String>("url").expect("required");
			let archive = ctx.registry.load_archive(Some(url), None).await?;

			let mut settings = UserSettings { is_saved: true, ..UserSettings::default() };
			settings.networked = !sub.get_flag("no-networked");
			settings.auto_download = sub.get_flag("auto-download");
			if let Some(path) = sub.get_one::<String>("sync-path") {
				settings.local_sync_path = Some(PathBuf::from(path));
			}
			settings.preview_mode = sub.get_flag("preview");

			ctx.registry.configure_archive(&archive, settings).await?;
			info!(key = %archive.key, "archive configured");
		}
		Some(("crawl", sub)) => {
			let url = sub.get_one::<String>("url").expect("required");
			let archive = ctx.registry.load_archive(Some(url), None).await?;
			let log = ctx.registry.get_archive_log(archive.key).ok_or_else(|| {
				archivist::error::ArchiveError::Other { message: "archive log not resident".to_string() }
			})?;
			let fs = LiveArchiveFs::head(log.clone());
			ctx.crawler.crawl_site(url, &fs, log.as_ref(), false).await?;
			println!("crawled {}", url);
		}
		Some(("serve", _)) => {
			ctx.spawn_background_tasks().await;
			info!(port = ctx.config.swarm_port, "archivist runtime serving, press Ctrl-C to stop");
			tokio::signal::ctrl_c().await?;
		}
		_ => unreachable!("subcommand_required"),
	}

	Ok(())
}

// vim: ts=4
