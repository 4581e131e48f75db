//! File I/O: delimiter-aware reads, safe saves, and script path search.
//!
//! Line delimiters are auto-detected on first read (`\n`, `\r`, or
//! `\r\n`) and stored on the buffer so writes reproduce the original
//! style. Safe saving writes a sibling temporary file first and renames
//! it over the target; with backup mode the previous file survives as
//! `name.bak`. Any partially-failed save reports where the surviving
//! file is.

use core_buffer::{BufFlags, Buffer, Point};
use core_status::{EdResult, Status};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Default extension tried by the script path search.
pub const SCRIPT_EXT: &str = ".mx";
/// Environment variable holding the script search path.
pub const PATH_VAR: &str = "MXPATH";

/// A detected or configured line delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineDelim {
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl LineDelim {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            LineDelim::Lf => b"\n",
            LineDelim::Cr => b"\r",
            LineDelim::CrLf => b"\r\n",
        }
    }

    /// Detect from the first terminator in the content.
    pub fn detect(content: &[u8]) -> Option<Self> {
        for (i, &b) in content.iter().enumerate() {
            match b {
                b'\n' => return Some(LineDelim::Lf),
                b'\r' => {
                    return Some(if content.get(i + 1) == Some(&b'\n') {
                        LineDelim::CrLf
                    } else {
                        LineDelim::Cr
                    });
                }
                _ => {}
            }
        }
        None
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"\n" => Some(LineDelim::Lf),
            b"\r" => Some(LineDelim::Cr),
            b"\r\n" => Some(LineDelim::CrLf),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOptions {
    /// Fail if the file does not exist (otherwise it is a "new file").
    pub must_exist: bool,
    /// Delimiter override; skips detection.
    pub delim: Option<LineDelim>,
}

#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub lines: usize,
    pub delim: Option<LineDelim>,
    /// The file did not exist; the buffer is empty.
    pub created: bool,
}

/// Read a file into a buffer, replacing its contents. Point and marks are
/// re-initialized; the detected delimiter is stored on the buffer.
pub fn read_into(buf: &mut Buffer, path: &Path, opts: ReadOptions) -> EdResult<ReadOutcome> {
    buf.clear()?;
    let content = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if opts.must_exist {
                return Err(Status::failure(format!(
                    "File '{}' does not exist",
                    path.display()
                )));
            }
            buf.filename = Some(path.to_path_buf());
            buf.flags |= BufFlags::ACTIVE;
            info!(target: "io", path = %path.display(), "new file");
            return Ok(ReadOutcome {
                lines: 0,
                delim: opts.delim,
                created: true,
            });
        }
        Err(e) => {
            return Err(Status::os_error(format!(
                "Cannot read '{}': {e}",
                path.display()
            )));
        }
    };
    let delim = opts.delim.or_else(|| LineDelim::detect(&content));
    let mut count = 0usize;
    if !content.is_empty() {
        let sep = delim.unwrap_or_default().bytes();
        let mut first = true;
        let mut rest: &[u8] = &content;
        loop {
            let (line, more) = match find_sub(rest, sep) {
                Some(idx) => (&rest[..idx], Some(&rest[idx + sep.len()..])),
                None => (rest, None),
            };
            if first {
                buf.insert(Point::new(buf.first_line(), 0), line)?;
                first = false;
            } else {
                buf.append_line(line);
            }
            count += 1;
            match more {
                Some(r) => rest = r,
                None => break,
            }
        }
    }
    buf.input_delim = delim.map(|d| d.bytes().to_vec());
    buf.filename = Some(path.to_path_buf());
    buf.flags |= BufFlags::ACTIVE;
    buf.flags -= BufFlags::CHANGED;
    buf.point = Point::new(buf.first_line(), 0);
    debug!(target: "io", path = %path.display(), lines = count, "read file");
    Ok(ReadOutcome {
        lines: count,
        delim,
        created: false,
    })
}

fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() == 1 {
        return haystack.iter().position(|&b| b == needle[0]);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SaveOptions {
    /// Write via temporary file + rename.
    pub safe: bool,
    /// Keep the previous file as `name.bak`.
    pub backup: bool,
    /// Append a final delimiter when the last line is non-empty (ATerm).
    pub append_final_delim: bool,
    /// Delimiter override (defaults to the buffer's input delimiter).
    pub delim: Option<LineDelim>,
}

/// Serialize the buffer with the chosen delimiter.
fn serialize(buf: &Buffer, delim: LineDelim, aterm: bool) -> Vec<u8> {
    let sep = delim.bytes();
    let mut out = Vec::new();
    let mut first = true;
    for id in buf.lines() {
        if !first {
            out.extend_from_slice(sep);
        }
        first = false;
        out.extend_from_slice(buf.line_text(id));
    }
    if aterm && buf.line_len(buf.last_line()) > 0 {
        out.extend_from_slice(sep);
    }
    out
}

/// Pseudo-random suffix for temporary save files.
fn temp_suffix() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    nanos ^ (std::process::id() << 8)
}

/// Write a buffer to `path`. With `safe`/`backup` set and an existing
/// target, the write goes to a sibling temp file which is renamed into
/// place after the original is preserved or removed. Failure part-way
/// names the surviving file.
pub fn write_buffer(buf: &mut Buffer, path: &Path, opts: SaveOptions) -> EdResult<usize> {
    let delim = opts
        .delim
        .or_else(|| buf.input_delim.as_deref().and_then(LineDelim::from_bytes))
        .unwrap_or_default();
    let data = serialize(buf, delim, opts.append_final_delim);
    let exists = path.exists();

    if (opts.safe || opts.backup) && exists {
        let perms = std::fs::metadata(path)
            .map(|m| m.permissions())
            .map_err(|e| Status::os_error(format!("Cannot stat '{}': {e}", path.display())))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let lead = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.chars().next())
            .unwrap_or('t');
        let temp = dir.join(format!("{lead}{:08x}", temp_suffix()));
        std::fs::write(&temp, &data).map_err(|e| {
            Status::os_error(format!("Cannot write '{}': {e}", temp.display()))
        })?;
        if opts.backup {
            let bak = path.with_extension(match path.extension() {
                Some(ext) => format!("{}.bak", ext.to_string_lossy()),
                None => "bak".to_string(),
            });
            if !bak.exists() {
                std::fs::rename(path, &bak).map_err(|e| {
                    Status::os_error(format!(
                        "Cannot rename '{}' to '{}': {e}; new text saved in '{}'",
                        path.display(),
                        bak.display(),
                        temp.display()
                    ))
                })?;
            } else {
                std::fs::remove_file(path).map_err(|e| {
                    Status::os_error(format!(
                        "Cannot remove '{}': {e}; new text saved in '{}'",
                        path.display(),
                        temp.display()
                    ))
                })?;
            }
        } else {
            std::fs::remove_file(path).map_err(|e| {
                Status::os_error(format!(
                    "Cannot remove '{}': {e}; new text saved in '{}'",
                    path.display(),
                    temp.display()
                ))
            })?;
        }
        std::fs::rename(&temp, path).map_err(|e| {
            Status::os_error(format!(
                "Cannot rename '{}' to '{}': {e}; file saved as '{}'",
                temp.display(),
                path.display(),
                temp.display()
            ))
        })?;
        let _ = std::fs::set_permissions(path, perms);
    } else {
        std::fs::write(path, &data).map_err(|e| {
            Status::os_error(format!("Cannot write '{}': {e}", path.display()))
        })?;
    }
    buf.flags -= BufFlags::CHANGED;
    buf.input_delim = Some(delim.bytes().to_vec());
    info!(target: "io", path = %path.display(), bytes = data.len(), "wrote file");
    Ok(data.len())
}

/// Build the script search path: an explicit override, else `MXPATH`,
/// else the current directory.
pub fn script_path(override_path: Option<&str>) -> Vec<PathBuf> {
    let raw = override_path
        .map(str::to_string)
        .or_else(|| std::env::var(PATH_VAR).ok())
        .unwrap_or_else(|| ".".to_string());
    raw.split(':')
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Locate a script file: absolute or slash-qualified names resolve
/// directly; bare names are tried in each path directory, with and
/// without the script extension.
pub fn find_script(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.is_absolute() || name.contains('/') {
        if direct.exists() {
            return Some(direct.to_path_buf());
        }
        let with_ext = PathBuf::from(format!("{name}{SCRIPT_EXT}"));
        return with_ext.exists().then_some(with_ext);
    }
    for dir in dirs {
        let cand = dir.join(name);
        if cand.exists() {
            return Some(cand);
        }
        let cand = dir.join(format!("{name}{SCRIPT_EXT}"));
        if cand.exists() {
            return Some(cand);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_delimiters() {
        assert_eq!(LineDelim::detect(b"a\nb"), Some(LineDelim::Lf));
        assert_eq!(LineDelim::detect(b"a\r\nb"), Some(LineDelim::CrLf));
        assert_eq!(LineDelim::detect(b"a\rb"), Some(LineDelim::Cr));
        assert_eq!(LineDelim::detect(b"ab"), None);
    }

    #[test]
    fn read_write_round_trip_preserves_delims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crlf.txt");
        std::fs::write(&path, b"one\r\ntwo\r\n").unwrap();
        let mut buf = Buffer::new("t");
        let out = read_into(&mut buf, &path, ReadOptions::default()).unwrap();
        assert_eq!(out.delim, Some(LineDelim::CrLf));
        assert_eq!(buf.contents(), "one\ntwo\n");
        assert!(!buf.flags.contains(BufFlags::CHANGED));

        write_buffer(&mut buf, &path, SaveOptions::default()).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, b"one\r\ntwo\r\n");
    }

    #[test]
    fn missing_file_is_new_unless_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt");
        let mut buf = Buffer::new("t");
        let out = read_into(&mut buf, &path, ReadOptions::default()).unwrap();
        assert!(out.created);
        assert!(buf.is_empty());
        let err = read_into(
            &mut buf,
            &path,
            ReadOptions {
                must_exist: true,
                delim: None,
            },
        )
        .unwrap_err();
        assert!(err.message().unwrap().contains("does not exist"));
    }

    #[test]
    fn aterm_appends_final_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let mut buf = Buffer::from_text("t", "no newline at end");
        write_buffer(
            &mut buf,
            &path,
            SaveOptions {
                append_final_delim: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"no newline at end\n");
    }

    #[test]
    fn safe_save_with_backup_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.txt");
        std::fs::write(&path, b"old contents\n").unwrap();
        let mut buf = Buffer::from_text("t", "new contents\n");
        write_buffer(
            &mut buf,
            &path,
            SaveOptions {
                safe: true,
                backup: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new contents\n");
        assert_eq!(
            std::fs::read(dir.path().join("foo.txt.bak")).unwrap(),
            b"old contents\n"
        );
        // No stray temp files left behind.
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "{names:?}");
    }

    #[test]
    fn existing_bak_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.txt");
        std::fs::write(&path, b"current\n").unwrap();
        std::fs::write(dir.path().join("foo.txt.bak"), b"precious backup\n").unwrap();
        let mut buf = Buffer::from_text("t", "newer\n");
        write_buffer(
            &mut buf,
            &path,
            SaveOptions {
                safe: true,
                backup: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("foo.txt.bak")).unwrap(),
            b"precious backup\n"
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"newer\n");
    }

    #[test]
    fn write_failure_reports_os_error() {
        let mut buf = Buffer::from_text("t", "data");
        let err = write_buffer(
            &mut buf,
            Path::new("/nonexistent-dir-zz/file.txt"),
            SaveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.severity, core_status::Severity::OsError);
    }

    #[test]
    fn script_path_and_search() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("setup.mx"), "# script\n").unwrap();
        std::fs::write(dir.path().join("plain"), "# script\n").unwrap();
        let dirs = vec![dir.path().to_path_buf()];
        assert!(find_script("setup", &dirs).is_some());
        assert!(find_script("plain", &dirs).is_some());
        assert!(find_script("missing", &dirs).is_none());
        let abs = dir.path().join("setup.mx");
        assert_eq!(
            find_script(abs.to_str().unwrap(), &[]),
            Some(abs.clone())
        );
    }
}
