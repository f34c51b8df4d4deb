//! Media privacy verifier.
//!
//! Assets are decoded and re-encoded so that no EXIF, XMP, IPTC or ICC block
//! is carried over, then the written file is read back and checked for GPS
//! metadata without trusting the encoder.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use lifegraph_schemas::CanonicalRecord;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::AssetError;
use crate::report::RunReport;

/// Directory (under the output directory) that receives stripped assets
pub const MEDIA_DIR: &str = "media";

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const GPS_IFD_TAG: u16 = 0x8825;
const XMP_GPS_MARKERS: [&str; 4] = ["exif:GPS", "GPSLatitude", "GPSLongitude", "GPSPosition"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    Written(PathBuf),
    Skipped(String),
}

/// Re-encode `input` to `output` without metadata and verify the result.
///
/// A missing or undecodable input is not an error: it yields
/// [`MediaOutcome::Skipped`]. Any GPS data found in the written file removes
/// it again and returns [`AssetError::GpsSurvived`].
pub fn strip_and_verify(input: &Path, output: &Path) -> Result<MediaOutcome, AssetError> {
    let format = ImageFormat::from_path(output)
        .map_err(|_| AssetError::UnsupportedFormat(output.to_path_buf()))?;

    let decoded = match ImageReader::open(input).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => reader.decode(),
        Err(e) => return Ok(MediaOutcome::Skipped(format!("unreadable input: {}", e))),
    };
    let image = match decoded {
        Ok(image) => image,
        Err(e) => return Ok(MediaOutcome::Skipped(format!("undecodable input: {}", e))),
    };

    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };
    image
        .save_with_format(output, format)
        .map_err(|source| AssetError::Encode {
            path: output.to_path_buf(),
            source,
        })?;

    let markers = match read_gps_markers(output) {
        Ok(markers) => markers,
        Err(source) => {
            let _ = std::fs::remove_file(output);
            return Err(AssetError::Verify {
                path: output.to_path_buf(),
                source,
            });
        }
    };

    if !markers.is_empty() {
        let _ = std::fs::remove_file(output);
        return Err(AssetError::GpsSurvived {
            path: output.to_path_buf(),
            markers: markers.join(", "),
        });
    }

    debug!("Stripped {} -> {}", input.display(), output.display());
    Ok(MediaOutcome::Written(output.to_path_buf()))
}

/// Independently re-parse a written file and list every GPS indicator found
pub fn read_gps_markers(path: &Path) -> std::io::Result<Vec<String>> {
    let bytes = std::fs::read(path)?;

    let exif = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .and_then(|mut decoder| decoder.exif_metadata())
        .map_err(std::io::Error::other)?;

    Ok(scan_for_gps(&bytes, exif.as_deref()))
}

/// Look for a GPS IFD in the EXIF block and for XMP GPS properties or a stray
/// EXIF header in the raw bytes.
pub fn scan_for_gps(bytes: &[u8], exif: Option<&[u8]>) -> Vec<String> {
    let mut markers = Vec::new();

    if let Some(exif) = exif {
        if tiff_has_gps_ifd(exif) {
            markers.push("EXIF GPS IFD".to_string());
        }
    }

    if let Some(pos) = find(bytes, EXIF_HEADER) {
        if tiff_has_gps_ifd(&bytes[pos + EXIF_HEADER.len()..]) {
            markers.push("embedded EXIF GPS IFD".to_string());
        }
    }

    for marker in XMP_GPS_MARKERS {
        if find(bytes, marker.as_bytes()).is_some() {
            markers.push(format!("XMP {}", marker));
        }
    }

    markers.dedup();
    markers
}

/// Walk the IFD chain of a TIFF-structured EXIF block looking for tag 0x8825
fn tiff_has_gps_ifd(data: &[u8]) -> bool {
    let data = data.strip_prefix(EXIF_HEADER).unwrap_or(data);
    if data.len() < 8 {
        return false;
    }

    let little_endian = match &data[0..2] {
        b"II" => true,
        b"MM" => false,
        _ => return false,
    };
    let read_u16 = |at: usize| -> Option<u16> {
        let b = data.get(at..at + 2)?;
        Some(if little_endian {
            u16::from_le_bytes([b[0], b[1]])
        } else {
            u16::from_be_bytes([b[0], b[1]])
        })
    };
    let read_u32 = |at: usize| -> Option<u32> {
        let b = data.get(at..at + 4)?;
        Some(if little_endian {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        })
    };

    let mut offset = match read_u32(4) {
        Some(o) => o as usize,
        None => return false,
    };

    // Bounded walk: IFD0 and IFD1 are all a well-formed block carries
    for _ in 0..4 {
        if offset == 0 {
            return false;
        }
        let Some(count) = read_u16(offset) else {
            return false;
        };
        for i in 0..count as usize {
            match read_u16(offset + 2 + i * 12) {
                Some(GPS_IFD_TAG) => return true,
                Some(_) => {}
                None => return false,
            }
        }
        offset = match read_u32(offset + 2 + count as usize * 12) {
            Some(next) => next as usize,
            None => return false,
        };
    }
    false
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn is_remote(item: &str) -> bool {
    item.starts_with("http://") || item.starts_with("https://")
}

fn is_safe_relative(item: &str) -> bool {
    let path = Path::new(item);
    !path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// File name for the `index`th asset of `node`.
///
/// ASCII letters, digits and `-` pass through and every other byte becomes
/// `_xx` (lowercase hex), so distinct node ids never share a file name.
fn output_name(node: &str, index: usize, input: &Path) -> Option<String> {
    let ext = input.extension()?.to_str()?.to_lowercase();
    let mut stem = String::with_capacity(node.len());
    for byte in node.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{:02x}", byte));
        }
    }
    Some(format!("{}-{}.{}", stem, index, ext))
}

/// File name of a published local asset (`media/<name>`), `None` for
/// remote URLs and anything outside the media directory
pub fn published_file_name(item: &str) -> Option<&str> {
    item.strip_prefix(MEDIA_DIR)?
        .strip_prefix('/')
        .filter(|name| !name.is_empty() && !name.contains('/'))
}

struct MediaJob {
    record: usize,
    index: usize,
    node: String,
    item: String,
    input: PathBuf,
    output: PathBuf,
    published: String,
}

/// Strip and verify every local media asset on the given records.
///
/// Clean copies are written flat into `stage_dir`; nodes reference them as
/// `media/<name>` and moving them into the published media directory is the
/// caller's job. Assets are processed in parallel on the blocking pool; all
/// work is joined and re-sorted by (record, media index) before the records
/// are rebuilt, so completion order never shows up in the output. Only
/// written-and-verified assets stay on a node. Remote URLs are kept and
/// reported as unverified.
pub async fn process_media(
    records: Vec<CanonicalRecord>,
    media_root: Option<&Path>,
    stage_dir: &Path,
    report: &mut RunReport,
) -> Result<Vec<CanonicalRecord>> {
    let mut jobs = Vec::new();

    for (r, record) in records.iter().enumerate() {
        for (m, item) in record.media.iter().enumerate() {
            if is_remote(item) {
                report.warn(format!("Remote media on {} left unverified: {}", record.id, item));
                continue;
            }
            let Some(root) = media_root else {
                report.skip_asset(record.id.as_str(), item, "no media root configured");
                continue;
            };
            if !is_safe_relative(item) {
                report.skip_asset(record.id.as_str(), item, "path escapes the media root");
                continue;
            }
            let input = root.join(item);
            let Some(name) = output_name(record.id.as_str(), m, &input) else {
                report.skip_asset(record.id.as_str(), item, "no file extension");
                continue;
            };
            jobs.push(MediaJob {
                record: r,
                index: m,
                node: record.id.0.clone(),
                item: item.clone(),
                input,
                output: stage_dir.join(&name),
                published: format!("{}/{}", MEDIA_DIR, name),
            });
        }
    }

    if !jobs.is_empty() {
        tokio::fs::create_dir_all(stage_dir)
            .await
            .with_context(|| format!("Failed to create {}", stage_dir.display()))?;
        info!("Processing {} media assets", jobs.len());
    }

    let mut tasks = JoinSet::new();
    for job in jobs {
        tasks.spawn_blocking(move || {
            let outcome = strip_and_verify(&job.input, &job.output);
            (job, outcome)
        });
    }

    let mut finished = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        finished.push(joined.context("Media worker task failed")?);
    }
    finished.sort_by_key(|(job, _)| (job.record, job.index));

    let mut published: HashMap<(usize, usize), String> = HashMap::new();
    for (job, outcome) in finished {
        match outcome {
            Ok(MediaOutcome::Written(_)) => {
                report.media_written += 1;
                published.insert((job.record, job.index), job.published);
            }
            Ok(MediaOutcome::Skipped(reason)) => report.skip_asset(&job.node, &job.item, reason),
            Err(e) => report.skip_asset_error(&job.node, &job.item, &e),
        }
    }

    Ok(records
        .into_iter()
        .enumerate()
        .map(|(r, mut record)| {
            record.media = record
                .media
                .iter()
                .enumerate()
                .filter_map(|(m, item)| {
                    if is_remote(item) {
                        Some(item.clone())
                    } else {
                        published.get(&(r, m)).cloned()
                    }
                })
                .collect();
            record
        })
        .collect())
}
