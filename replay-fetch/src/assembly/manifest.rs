//! HLS media playlist referencing the remuxed segments.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::Result;
use crate::utils::fs::io_error;

/// One playlist entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Path as written into the playlist.
    pub uri: String,
    pub duration: Duration,
}

/// `#EXT-X-TARGETDURATION` for the given segment durations.
///
/// The longest duration rounded to whole seconds plus one, which is never
/// below its ceiling.
pub fn target_duration(durations: impl IntoIterator<Item = Duration>) -> u64 {
    let longest = durations
        .into_iter()
        .map(|d| d.as_secs_f64())
        .fold(0.0, f64::max);
    longest.round() as u64 + 1
}

/// Render a VOD playlist for `entries`, in order.
pub fn render_manifest(entries: &[ManifestEntry]) -> String {
    let mut out = String::new();
    let target = target_duration(entries.iter().map(|e| e.duration));

    // Writing into a String cannot fail.
    let _ = writeln!(out, "#EXTM3U");
    let _ = writeln!(out, "#EXT-X-VERSION:7");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{target}");
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:0");
    for entry in entries {
        let _ = writeln!(out, "#EXTINF:{:.3},", entry.duration.as_secs_f64());
        let _ = writeln!(out, "{}", entry.uri);
    }
    let _ = writeln!(out, "#EXT-X-ENDLIST");
    out
}

/// Path of `file` as referenced from a playlist stored in `dir`.
///
/// Files outside `dir` keep their full path. Separators are always `/`.
pub fn relative_uri(dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(dir).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write the playlist to `dir/name`, replacing any existing file.
pub async fn write_manifest(dir: &Path, name: &str, files: &[(PathBuf, Duration)]) -> Result<PathBuf> {
    let entries: Vec<ManifestEntry> = files
        .iter()
        .map(|(path, duration)| ManifestEntry {
            uri: relative_uri(dir, path),
            duration: *duration,
        })
        .collect();

    let path = dir.join(name);
    tokio::fs::write(&path, render_manifest(&entries))
        .await
        .map_err(|e| io_error("writing manifest", &path, e))?;

    info!(path = %path.display(), entries = entries.len(), "Manifest written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(uri: &str, millis: u64) -> ManifestEntry {
        ManifestEntry {
            uri: uri.to_string(),
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_target_duration() {
        let durations = [4_100, 9_400, 2_000].map(Duration::from_millis);
        assert_eq!(target_duration(durations), 10);
        assert_eq!(target_duration([Duration::from_millis(9_600)]), 11);
        assert_eq!(target_duration([Duration::from_secs(10)]), 11);
        assert_eq!(target_duration([]), 1);
    }

    #[test]
    fn test_render_manifest() {
        let rendered = render_manifest(&[entry("1.ts", 4_100), entry("2.ts", 9_400), entry("3.ts", 2_000)]);
        assert_eq!(
            rendered,
            "#EXTM3U\n\
             #EXT-X-VERSION:7\n\
             #EXT-X-TARGETDURATION:10\n\
             #EXT-X-MEDIA-SEQUENCE:0\n\
             #EXTINF:4.100,\n1.ts\n\
             #EXTINF:9.400,\n2.ts\n\
             #EXTINF:2.000,\n3.ts\n\
             #EXT-X-ENDLIST\n"
        );
    }

    #[test]
    fn test_relative_uri() {
        let dir = Path::new("/out/rec");
        assert_eq!(relative_uri(dir, Path::new("/out/rec/1.ts")), "1.ts");
        assert_eq!(relative_uri(dir, Path::new("/out/rec/parts/2.ts")), "parts/2.ts");
    }

    #[tokio::test]
    async fn test_write_manifest_parses_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("playlist.m3u8");
        tokio::fs::write(&manifest, "stale").await.unwrap();

        let files = vec![
            (dir.path().join("1.ts"), Duration::from_millis(4_100)),
            (dir.path().join("2.ts"), Duration::from_millis(9_400)),
        ];
        let path = write_manifest(dir.path(), "playlist.m3u8", &files).await.unwrap();
        assert_eq!(path, manifest);

        let content = tokio::fs::read(&path).await.unwrap();
        let playlist = match m3u8_rs::parse_playlist_res(&content) {
            Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) => pl,
            other => panic!("expected a media playlist, got {other:?}"),
        };
        assert_eq!(playlist.target_duration, 10);
        assert_eq!(playlist.media_sequence, 0);
        assert!(playlist.end_list);
        let uris: Vec<&str> = playlist.segments.iter().map(|s| s.uri.as_str()).collect();
        assert_eq!(uris, vec!["1.ts", "2.ts"]);
    }
}
