use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use history_sqlite::HistoryDb;
use jstrack_core::ScriptSource;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

mod config;
mod scan;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "jstrack", version, about = "Tracks the JavaScript assets a web target serves over time")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./jstrack.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Data directory holding the history database and version bodies
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Record one scan of a target from extracted scripts (JSON lines of {url, content, size})
    Scan {
        /// Target domain the scripts belong to
        domain: String,
        /// JSONL file from the extraction step, or - for stdin
        #[arg(long, value_name = "FILE")]
        from: PathBuf,
        /// Page URL the scripts were extracted from (default: https://<domain>/)
        #[arg(long)]
        url: Option<String>,
        /// Cap on diff lines printed per changed script in text mode
        #[arg(long)]
        max_diff_lines: Option<usize>,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// List tracked targets
    Targets {
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// List the scripts tracked for a target
    Scripts {
        domain: String,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// Output file (overwrites)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of text/json when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
    },
    /// List recent scans of a target, newest first
    Scans {
        domain: String,
        /// Maximum number of scans (0 = all)
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Version history of a script, newest first
    History {
        /// Script id (see the scripts command)
        #[arg(long)]
        script: i64,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Diff two stored versions of a script
    Diff {
        /// Older version id
        #[arg(long)]
        old: i64,
        /// Newer version id
        #[arg(long)]
        new: i64,
        /// Cap on emitted diff lines (0 = unlimited)
        #[arg(long)]
        max_lines: Option<usize>,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Remove a target and its entire history
    Remove { domain: String },
}

fn fmt_ms(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

fn read_scripts(path: &Path) -> Result<Vec<ScriptSource>> {
    let raw = if path.as_os_str() == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        s
    } else {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    let mut out = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let script: ScriptSource = serde_json::from_str(line)
            .with_context(|| format!("bad script record on line {}", i + 1))?;
        out.push(script);
    }
    Ok(out)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let loaded_cfg = config::load_config(cli.config.as_deref());

    let data_dir = config::resolve(
        cli.data_dir.clone(),
        loaded_cfg.as_ref().and_then(|c| c.data_dir.clone()),
        PathBuf::from("jstrack-data"),
    );
    let cfg_format = loaded_cfg.as_ref().and_then(|c| c.format.as_deref()).map(|f| match f {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Text,
    });
    let cfg_max_lines = loaded_cfg.as_ref().and_then(|c| c.diff.as_ref()).and_then(|d| d.max_lines);
    let resolve_format = |flag: Option<OutputFormat>| config::resolve(flag, cfg_format, OutputFormat::Text);

    match cli.command {
        Commands::Version => {
            println!("jstrack {} (core {})", env!("CARGO_PKG_VERSION"), jstrack_core::version());
        }
        Commands::Scan { domain, from, url, max_diff_lines, format } => {
            let scripts = read_scripts(&from)?;
            let source_url = url.unwrap_or_else(|| format!("https://{}/", domain));
            let mut db = HistoryDb::open_or_create(&data_dir)?;
            let report = scan::record_scan(&mut db, &domain, &source_url, &scripts, None)?;
            match resolve_format(format) {
                OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
                OutputFormat::Text => {
                    let new_scripts = report.scripts.iter().filter(|s| s.is_new_script).count();
                    println!(
                        "{}: scan #{} recorded, {} scripts ({} bytes), {} new, {} updated",
                        report.domain,
                        report.scan_id,
                        report.script_count,
                        report.total_bytes,
                        new_scripts,
                        report.changed.len(),
                    );
                    for s in &report.scripts {
                        let marker = if s.is_new_script {
                            "new"
                        } else if s.is_new_version {
                            "updated"
                        } else {
                            "unchanged"
                        };
                        println!("  [{}] {} (script {}, version {})", marker, s.base_name, s.script_id, s.version_id);
                    }
                    let max_lines = config::resolve(max_diff_lines, cfg_max_lines, 50);
                    for c in &report.changed {
                        println!(
                            "\n{} changed: +{} -{} ({}%) versions {} -> {}",
                            c.base_name,
                            c.stats.additions,
                            c.stats.deletions,
                            c.stats.change_percent,
                            c.old_version_id,
                            c.new_version_id,
                        );
                        if let Some(s) =
                            report.scripts.iter().find(|s| s.version_id == c.new_version_id)
                        {
                            if let Some(diff) = &s.diff {
                                println!("{}", script_diff::format_for_terminal(diff, max_lines));
                            }
                        }
                    }
                }
            }
        }
        Commands::Targets { format } => {
            let db = HistoryDb::open_or_create(&data_dir)?;
            let targets = db.get_all_targets()?;
            match resolve_format(format) {
                OutputFormat::Json => println!("{}", serde_json::to_string(&targets)?),
                OutputFormat::Text => {
                    for t in targets {
                        let last = t.last_scan_ms.map(fmt_ms).unwrap_or_else(|| "never".into());
                        println!(
                            "{} (id {}): {} scripts, {} scans, last scan {}",
                            t.domain, t.target_id, t.script_count, t.scan_count, last
                        );
                    }
                }
            }
        }
        Commands::Scripts { domain, format, out, csv } => {
            let db = HistoryDb::open_or_create(&data_dir)?;
            let target =
                db.get_target(&domain)?.ok_or_else(|| anyhow!("unknown target: {}", domain))?;
            let scripts = db.get_target_scripts(target.target_id)?;
            if let Some(path) = out {
                if csv {
                    let mut wtr = csv::Writer::from_writer(fs::File::create(&path)?);
                    wtr.write_record([
                        "script_id",
                        "base_name",
                        "url",
                        "normalized_url",
                        "stable_key",
                        "first_seen",
                        "last_seen",
                        "version_count",
                    ])?;
                    for s in &scripts {
                        wtr.write_record([
                            s.script_id.to_string(),
                            s.base_name.clone(),
                            s.url.clone(),
                            s.normalized_url.clone(),
                            s.stable_key.clone(),
                            fmt_ms(s.first_seen_ms),
                            fmt_ms(s.last_seen_ms),
                            s.version_count.to_string(),
                        ])?;
                    }
                    wtr.flush()?;
                } else {
                    fs::write(&path, serde_json::to_string(&scripts)?)?;
                }
                return Ok(());
            }
            match resolve_format(format) {
                OutputFormat::Json => println!("{}", serde_json::to_string(&scripts)?),
                OutputFormat::Text => {
                    for s in scripts {
                        println!(
                            "{} (id {}): {} versions, first seen {}, last seen {}\n    {}",
                            s.base_name,
                            s.script_id,
                            s.version_count,
                            fmt_ms(s.first_seen_ms),
                            fmt_ms(s.last_seen_ms),
                            s.url,
                        );
                    }
                }
            }
        }
        Commands::Scans { domain, limit, format } => {
            let db = HistoryDb::open_or_create(&data_dir)?;
            let target =
                db.get_target(&domain)?.ok_or_else(|| anyhow!("unknown target: {}", domain))?;
            let scans = db.get_target_scans(target.target_id, limit)?;
            match resolve_format(format) {
                OutputFormat::Json => println!("{}", serde_json::to_string(&scans)?),
                OutputFormat::Text => {
                    for s in scans {
                        println!(
                            "scan {} at {}: {} scripts, {} bytes ({})",
                            s.scan_id,
                            fmt_ms(s.created_ms),
                            s.script_count,
                            s.total_bytes,
                            s.url
                        );
                    }
                }
            }
        }
        Commands::History { script, format } => {
            let db = HistoryDb::open_or_create(&data_dir)?;
            let info =
                db.get_script(script)?.ok_or_else(|| anyhow!("unknown script id: {}", script))?;
            let versions = db.get_script_versions(script)?;
            match resolve_format(format) {
                OutputFormat::Json => println!("{}", serde_json::to_string(&versions)?),
                OutputFormat::Text => {
                    println!("{} ({})", info.base_name, info.url);
                    for v in versions {
                        println!(
                            "  version {} from scan {} at {}: {} bytes, sha256 {}",
                            v.version_id,
                            v.scan_id,
                            fmt_ms(v.created_ms),
                            v.size,
                            &v.content_hash[..12.min(v.content_hash.len())],
                        );
                    }
                }
            }
        }
        Commands::Diff { old, new, max_lines, format } => {
            let db = HistoryDb::open_or_create(&data_dir)?;
            let old_content = db
                .version_content(old)
                .ok_or_else(|| anyhow!("content for version {} is not available", old))?;
            let new_content = db
                .version_content(new)
                .ok_or_else(|| anyhow!("content for version {} is not available", new))?;
            let result = script_diff::diff(&old_content, &new_content);
            match resolve_format(format) {
                OutputFormat::Json => println!("{}", serde_json::to_string(&result)?),
                OutputFormat::Text => {
                    println!(
                        "+{} -{} ({}% changed, {} lines unchanged)",
                        result.stats.additions,
                        result.stats.deletions,
                        result.stats.change_percent,
                        result.stats.unchanged,
                    );
                    let max_lines = config::resolve(max_lines, cfg_max_lines, 50);
                    println!("{}", script_diff::format_for_terminal(&result, max_lines));
                }
            }
        }
        Commands::Remove { domain } => {
            let mut db = HistoryDb::open_or_create(&data_dir)?;
            if db.remove_target(&domain)? {
                println!("removed {} and its history", domain);
            } else {
                println!("no such target: {}", domain);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_jsonl_and_skips_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripts.jsonl");
        fs::write(
            &path,
            "# extracted 2026-08-29\n\n{\"url\":\"https://a.com/m.js\",\"content\":\"X\",\"size\":1}\n",
        )
        .unwrap();
        let scripts = read_scripts(&path).unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].url, "https://a.com/m.js");
        assert_eq!(scripts[0].size, 1);
    }

    #[test]
    fn bad_record_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripts.jsonl");
        fs::write(&path, "{\"url\":\"https://a.com/m.js\",\"content\":\"X\",\"size\":1}\nnot json\n")
            .unwrap();
        let err = read_scripts(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
