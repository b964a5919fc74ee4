//! Repair common packaging mistakes in a `.tar.gz` app package.
//!
//! - PAX headers are dropped (the output is plain ustar)
//! - macOS `._` files are removed
//! - a leading `./` is stripped from member names
//! - owner and group are forced to 0
//! - directories and `bin/` files (except `README`) get 0755, the rest 0644
//!
//! Packages carrying `<app>/local` or `<app>/meta/local.meta` are refused.

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::ui;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// What the sanitizer did.
#[derive(Debug, Default)]
pub struct SanitizeReport {
    /// Members written to the output
    pub kept: usize,
    /// Human readable fixes, in archive order
    pub fixes: Vec<String>,
    /// Output file, `None` on a dry run
    pub output: Option<PathBuf>,
}

pub fn run(file: &Path, dry_run: bool) -> Result<()> {
    ui::header(&format!("Sanitize {}", file.display()));

    let report = sanitize(file, dry_run)?;
    for fix in &report.fixes {
        println!("  {} {}", "→".cyan(), fix);
        log::info!("{fix}");
    }

    println!();
    match &report.output {
        Some(output) => ui::success(&format!(
            "{} members written to {}",
            report.kept,
            output.display()
        )),
        None => ui::info(&format!(
            "Dry run: {} members checked, {} fixes, nothing written",
            report.kept,
            report.fixes.len()
        )),
    }
    Ok(())
}

/// `<base>-fixed.<ext>`, splitting on the last dot.
pub fn fixed_path(file: &Path) -> PathBuf {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let fixed = match name.rsplit_once('.') {
        Some((base, ext)) => format!("{base}-fixed.{ext}"),
        None => format!("{name}-fixed"),
    };
    file.with_file_name(fixed)
}

/// Rewrite the package. Writes nothing on a dry run.
pub fn sanitize(file: &Path, dry_run: bool) -> Result<SanitizeReport> {
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }
    let mut magic = [0u8; 2];
    File::open(file)
        .and_then(|mut f| f.read_exact(&mut magic))
        .with_context(|| format!("Failed to read {}", file.display()))?;
    if magic != GZIP_MAGIC {
        bail!("{} is not a gzip file", file.display());
    }

    let input = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(input));
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut report = SanitizeReport::default();
    let mut app_dir: Option<String> = None;

    for entry in archive.entries().context("Failed to read archive")? {
        let mut entry = entry.context("Failed to read archive member")?;
        let raw_name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        if entry.pax_extensions().ok().flatten().is_some() {
            report.fixes.push(format!("Removing PAX headers for {raw_name}"));
        }

        let basename = raw_name.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        if basename.starts_with("._") {
            report.fixes.push(format!("Removing macOS ._ file {raw_name}"));
            continue;
        }

        let name = raw_name.strip_prefix("./").unwrap_or(&raw_name).to_string();
        if name.is_empty() {
            continue;
        }

        let app = app_dir.get_or_insert_with(|| {
            name.split_once('/')
                .map_or(name.as_str(), |(dir, _)| dir)
                .to_string()
        });
        if name.starts_with(&format!("{app}/local")) || name == format!("{app}/meta/local.meta") {
            bail!("local path ({name}) found. Unable to correct this.");
        }

        let source = entry.header();
        let entry_type = source.entry_type();
        let mode = source.mode().unwrap_or(0);
        let wanted = if entry_type.is_dir()
            || (name.starts_with(&format!("{app}/bin")) && !name.ends_with("/README"))
        {
            0o755
        } else {
            0o644
        };
        if mode & 0o7777 != wanted {
            report.fixes.push(format!(
                "Fixing perms on {name} to {wanted:o} (was {:o})",
                mode & 0o7777
            ));
        }

        let mut header = tar::Header::new_ustar();
        header.set_entry_type(entry_type);
        header.set_size(source.size().unwrap_or(0));
        header.set_mtime(source.mtime().unwrap_or(0));
        header.set_mode(wanted);
        header.set_uid(0);
        header.set_gid(0);
        if let Some(link) = entry.link_name().ok().flatten() {
            header
                .set_link_name(&link)
                .with_context(|| format!("Invalid link target for {name}"))?;
        }

        builder
            .append_data(&mut header, &name, &mut entry)
            .with_context(|| format!("Failed to write {name}"))?;
        report.kept += 1;
    }

    let compressed = builder
        .into_inner()
        .context("Failed to finish archive")?
        .finish()
        .context("Failed to compress archive")?;

    if !dry_run {
        let output = fixed_path(file);
        fs::write(&output, compressed)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        report.output = Some(output);
    }
    Ok(report)
}
