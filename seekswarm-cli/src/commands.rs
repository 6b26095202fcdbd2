//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Subcommand;
use seekswarm_core::config::SeekswarmConfig;
use seekswarm_core::streaming::validate_request;
use seekswarm_core::swarm::{
    InMemorySwarmRecordStore, JsonFileSwarmRecordStore, PersistenceOutcome, SchemeScraper,
    SwarmHealthReconciler, SwarmRecordStore, SwarmStats, SwarmTarget,
};
use seekswarm_core::torrent::{InfoHash, map_range_signed};
use seekswarm_core::SeekswarmError;
use tracing::{debug, info};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Map a byte window of the torrent onto piece indices
    MapRange {
        /// Byte offset from the start of the torrent
        #[arg(long, allow_negative_numbers = true)]
        offset: i64,
        /// Number of bytes in the window
        #[arg(long, allow_negative_numbers = true)]
        length: i64,
        /// Torrent piece length in bytes
        #[arg(long, default_value = "262144", allow_negative_numbers = true)]
        piece_length: i64,
    },
    /// Check a stream request the way the session manager would
    Validate {
        /// Catalog identifier of the torrent
        torrent_id: String,
        /// Path of the file inside the torrent
        file_path: String,
    },
    /// Refresh seeder/leecher counts for a torrent
    Health {
        /// Magnet link, 40-char hex or 32-char base32 info hash
        torrent: String,
        /// Extra tracker announce URL (repeatable)
        #[arg(short, long = "tracker")]
        trackers: Vec<String>,
        /// JSON file keeping best-known counts between runs
        #[arg(long)]
        store: Option<PathBuf>,
        /// Skip the built-in fallback tracker list
        #[arg(long)]
        no_fallback: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::MapRange {
            offset,
            length,
            piece_length,
        } => map_range_command(offset, length, piece_length),
        Commands::Validate {
            torrent_id,
            file_path,
        } => validate_command(&torrent_id, &file_path),
        Commands::Health {
            torrent,
            trackers,
            store,
            no_fallback,
            json,
        } => health_command(&torrent, trackers, store, no_fallback, json).await,
    }
}

/// Print the piece range backing a byte window.
///
/// # Errors
/// - `MappingError::InvalidArgument` - Negative input, zero piece length or overflow
pub fn map_range_command(offset: i64, length: i64, piece_length: i64) -> anyhow::Result<()> {
    debug!("Mapping offset={offset} length={length} piece_length={piece_length}");
    let range = map_range_signed(offset, length, piece_length)
        .map_err(|e| anyhow::anyhow!(SeekswarmError::from(e).user_message()))?;

    println!(
        "Pieces {}..={} ({} pieces), first byte at offset {} of piece {}",
        range.start_piece,
        range.end_piece,
        range.piece_count(),
        range.offset_in_first_piece,
        range.start_piece
    );
    Ok(())
}

/// Validate a torrent id and file path.
///
/// # Errors
/// - `ValidationError` - Request would be rejected by the session manager
pub fn validate_command(torrent_id: &str, file_path: &str) -> anyhow::Result<()> {
    validate_request(torrent_id, file_path)
        .with_context(|| format!("Request for {file_path:?} rejected"))?;
    println!("Request for {file_path:?} in torrent {torrent_id} is valid");
    Ok(())
}

/// Run one swarm health refresh and print the merged counts.
///
/// # Errors
/// - Invalid magnet link or info hash
/// - HTTP client could not be created
pub async fn health_command(
    torrent: &str,
    extra_trackers: Vec<String>,
    store_path: Option<PathBuf>,
    no_fallback: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = SeekswarmConfig::from_env();
    if no_fallback {
        config.swarm.fallback_trackers.clear();
    }

    let mut target = parse_target(torrent)?;
    target.trackers.extend(extra_trackers);
    info!(
        "Refreshing swarm health for {} ({} announced trackers, {} fallbacks)",
        target.info_hash,
        target.trackers.len(),
        config.swarm.fallback_trackers.len()
    );

    let store: Arc<dyn SwarmRecordStore> = match store_path {
        Some(path) => {
            debug!("Using swarm record file {}", path.display());
            Arc::new(JsonFileSwarmRecordStore::new(path))
        }
        None => {
            debug!("No swarm record file given, counts will not persist");
            Arc::new(InMemorySwarmRecordStore::new())
        }
    };
    let scraper = SchemeScraper::new(&config.swarm).context("Failed to create tracker client")?;
    let reconciler = SwarmHealthReconciler::new(Arc::new(scraper), store, config.swarm);

    let stats = reconciler.refresh(&target).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(())
}

fn print_stats(stats: &SwarmStats) {
    let show = |count: Option<u32>| count.map_or_else(|| "unknown".to_string(), |c| c.to_string());

    println!("Swarm health for {}", stats.info_hash);
    println!("{:-<60}", "");
    println!("  Seeders:  {}", show(stats.seeders));
    println!("  Leechers: {}", show(stats.leechers));
    println!(
        "  Trackers: {}/{} responded",
        stats.endpoints_responded, stats.endpoints_queried
    );
    match &stats.persistence {
        PersistenceOutcome::Unchanged => println!("  Stored record unchanged"),
        PersistenceOutcome::Written => println!("  Stored record updated"),
        PersistenceOutcome::WriteFailed { reason } => {
            println!("  Warning: could not save record: {reason}")
        }
        PersistenceOutcome::SkippedUnreadable => {
            println!("  Warning: stored record unreadable, not overwritten")
        }
    }
    if let Some(reason) = &stats.load_error {
        println!("  Warning: stored record unreadable: {reason}");
    }
}

/// Builds a refresh target from a magnet link or bare info hash.
///
/// # Errors
/// - Magnet link cannot be parsed or carries no BitTorrent info hash
/// - Bare value is not a valid info hash
fn parse_target(torrent: &str) -> anyhow::Result<SwarmTarget> {
    let torrent = torrent.trim();
    if !torrent.starts_with("magnet:") {
        let info_hash = InfoHash::parse(torrent)
            .with_context(|| format!("Invalid info hash: {torrent}"))?;
        return Ok(SwarmTarget::new(info_hash, Vec::new()));
    }

    let magnet = magnet_url::Magnet::new(torrent)
        .map_err(|e| anyhow::anyhow!("Invalid magnet link: {e}"))?;
    let Some(hash) = magnet.hash() else {
        bail!("Magnet link has no info hash");
    };
    let info_hash =
        InfoHash::parse(hash).with_context(|| format!("Invalid info hash in magnet: {hash}"))?;

    Ok(SwarmTarget::new(info_hash, magnet.trackers().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_from_hex() {
        let target = parse_target("0123456789ABCDEF0123456789abcdef01234567").unwrap();
        assert_eq!(
            target.info_hash.to_hex(),
            "0123456789abcdef0123456789abcdef01234567"
        );
        assert!(target.trackers.is_empty());
    }

    #[test]
    fn test_parse_target_trims_pasted_input() {
        let target = parse_target(" 0123456789abcdef0123456789abcdef01234567\n").unwrap();
        assert_eq!(
            target.info_hash.to_hex(),
            "0123456789abcdef0123456789abcdef01234567"
        );
    }

    #[test]
    fn test_parse_target_rejects_garbage() {
        assert!(parse_target("not-a-hash").is_err());
    }

    #[test]
    fn test_map_range_command_rejects_negative_input() {
        assert!(map_range_command(-1, 10, 262144).is_err());
        assert!(map_range_command(500000, 1000000, 0).is_err());
        assert!(map_range_command(500000, 1000000, 262144).is_ok());
    }

    #[test]
    fn test_validate_command() {
        assert!(validate_command("42", "Music/Artist/song.mp3").is_ok());
        assert!(validate_command("42", "../../etc/passwd").is_err());
    }
}
