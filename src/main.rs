use clap::{Arg, Command};
use std::error::Error;
use std::path::{Path, PathBuf};

use teamsync::exclusion::PatternMatcher;
use teamsync::logging::*;
use teamsync::{document, manifest, Config, SyncService};

///////////////////////
// Utility functions //
///////////////////////

fn load_config(matches: &clap::ArgMatches) -> Result<Config, Box<dyn Error>> {
	let file = matches.get_one::<String>("config").map(PathBuf::from);
	let mut config = Config::load(file.as_deref())?;

	// CLI flags win over file and environment
	if let Some(dir) = matches.get_one::<String>("data-dir") {
		config.data_dir = PathBuf::from(dir);
	}
	Ok(config)
}

async fn serve(doc_path: &Path, config: Config) -> Result<(), Box<dyn Error>> {
	let doc = document::load_or_create(doc_path)?;
	info!("Device {} using {}", doc.user.device_id, config.data_dir.display());

	let service = SyncService::start(doc, config).await?;

	let persist_to = doc_path.to_path_buf();
	service.set_on_merged(move |doc| {
		if let Err(e) = document::save(&persist_to, doc) {
			error!("Cannot save merged document to {}: {}", persist_to.display(), e);
		}
	});

	tokio::signal::ctrl_c().await?;
	info!("Shutting down");
	service.close();
	Ok(())
}

fn print_manifest(dir: &Path, config: &Config) -> Result<(), Box<dyn Error>> {
	let team_id = dir
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.ok_or("manifest: directory has no name")?;
	let matcher = PatternMatcher::new(&config.exclude_patterns)?;
	let manifest = manifest::build_manifest(dir, &team_id, &matcher)?;
	println!("{}", serde_json::to_string_pretty(&manifest)?);
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("teamsync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("LAN peer-to-peer sync of team configuration and files")
		.subcommand_required(true)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.help("Engine settings file (.toml or .json5)"),
		)
		.arg(
			Arg::new("data-dir")
				.long("data-dir")
				.value_name("DIR")
				.global(true)
				.help("Root of per-team file storage"),
		)
		.subcommand(
			Command::new("serve").about("Run the sync service").arg(
				Arg::new("document")
					.short('d')
					.long("document")
					.value_name("FILE")
					.required(true)
					.help("Configuration document to replicate"),
			),
		)
		.subcommand(
			Command::new("manifest")
				.about("Print the manifest of a team directory")
				.arg(Arg::new("dir").required(true)),
		)
		.get_matches();

	teamsync::logging::init_tracing();

	if let Some(sub) = matches.subcommand_matches("serve") {
		let config = load_config(sub)?;
		let doc_path = sub.get_one::<String>("document").ok_or("serve: --document required")?;
		serve(Path::new(doc_path), config).await?;
	} else if let Some(sub) = matches.subcommand_matches("manifest") {
		let config = load_config(sub)?;
		let dir = sub.get_one::<String>("dir").ok_or("manifest: directory argument required")?;
		print_manifest(Path::new(dir), &config)?;
	}

	Ok(())
}

// vim: ts=4
