//! Command-line surface.
//!
//! The historical switch style is single-dash (`-no-startup`, `-exec`);
//! argv is normalized to the double-dash form before clap sees it, and
//! the `+N`/`-N` go-to-line forms are extracted here since they are not
//! ordinary switches.

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments (after normalization).
#[derive(Parser, Debug, Default)]
#[command(name = "mx", version, about = "memax editor")] // minimal metadata
pub struct Args {
    /// Print the copyright notice and exit.
    #[arg(long)]
    pub copyright: bool,
    /// Skip site and user startup files.
    #[arg(long = "no-startup")]
    pub no_startup: bool,
    /// Do not auto-read the first file on the command line.
    #[arg(long = "no-read")]
    pub no_read: bool,
    /// Change to this directory at startup.
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Execute a script line at startup (repeatable).
    #[arg(long = "exec")]
    pub exec: Vec<String>,
    /// Comma-separated global mode list; `^` prefix clears (repeatable).
    #[arg(long = "global-mode")]
    pub global_mode: Vec<String>,
    /// Same, applied to the corresponding file buffer (repeatable).
    #[arg(long = "buf-mode")]
    pub buf_mode: Vec<String>,
    /// Input line delimiter bytes.
    #[arg(long = "inp-delim")]
    pub inp_delim: Option<String>,
    /// Output line delimiter bytes.
    #[arg(long = "otp-delim")]
    pub otp_delim: Option<String>,
    /// Prepend to the script search path.
    #[arg(long)]
    pub path: Option<String>,
    /// Mark file buffers read-only.
    #[arg(short = 'r')]
    pub read_only: bool,
    /// Mark file buffers read-write.
    #[arg(long)]
    pub rw: bool,
    /// Initial search pattern.
    #[arg(long)]
    pub search: Option<String>,
    /// Run as a `#!` interpreter: first file is the script, the rest are
    /// its arguments.
    #[arg(long)]
    pub shell: bool,
    /// Files to visit.
    pub files: Vec<String>,
}

/// A `+N` / `-N` go-to-line request for the first file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoSpec {
    /// 1-based; negative counts from the end.
    Line(i64),
}

/// Rewrite historical single-dash switches to clap's double-dash form
/// and pull out the `+N`/`-N` line switches.
pub fn normalize_argv(argv: impl Iterator<Item = String>) -> (Vec<String>, Vec<GotoSpec>) {
    const LONG_SWITCHES: &[&str] = &[
        "copyright",
        "version",
        "usage",
        "help",
        "no-startup",
        "no-read",
        "dir",
        "exec",
        "global-mode",
        "buf-mode",
        "inp-delim",
        "otp-delim",
        "path",
        "rw",
        "search",
        "shell",
    ];
    let mut out = Vec::new();
    let mut gotos = Vec::new();
    for arg in argv {
        if let Some(num) = arg.strip_prefix('+')
            && num.chars().all(|c| c.is_ascii_digit())
            && !num.is_empty()
        {
            if let Ok(n) = num.parse::<i64>() {
                gotos.push(GotoSpec::Line(n));
            }
            continue;
        }
        if let Some(body) = arg.strip_prefix('-')
            && !body.is_empty()
            && !body.starts_with('-')
        {
            if body.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(n) = body.parse::<i64>() {
                    gotos.push(GotoSpec::Line(-n));
                }
                continue;
            }
            // `-usage` behaves as help.
            let (name, value) = match body.split_once('=') {
                Some((n, v)) => (n, Some(v)),
                None => (body, None),
            };
            if LONG_SWITCHES.contains(&name) {
                let mapped = if name == "usage" { "help" } else { name };
                match value {
                    Some(v) => out.push(format!("--{mapped}={v}")),
                    None => out.push(format!("--{mapped}")),
                }
                continue;
            }
        }
        out.push(arg);
    }
    (out, gotos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(args: &[&str]) -> (Vec<String>, Vec<GotoSpec>) {
        normalize_argv(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn single_dash_switches_normalize() {
        let (out, gotos) = norm(&["-no-startup", "-exec", "x = 1", "file.txt"]);
        assert_eq!(out, vec!["--no-startup", "--exec", "x = 1", "file.txt"]);
        assert!(gotos.is_empty());
    }

    #[test]
    fn goto_line_switches_extracted() {
        let (out, gotos) = norm(&["+10", "file.txt", "-3"]);
        assert_eq!(out, vec!["file.txt"]);
        assert_eq!(gotos, vec![GotoSpec::Line(10), GotoSpec::Line(-3)]);
    }

    #[test]
    fn short_and_unknown_args_pass_through() {
        let (out, _) = norm(&["-r", "--already-long", "plain"]);
        assert_eq!(out, vec!["-r", "--already-long", "plain"]);
    }

    #[test]
    fn usage_maps_to_help() {
        let (out, _) = norm(&["-usage"]);
        assert_eq!(out, vec!["--help"]);
    }

    #[test]
    fn parses_full_surface() {
        let (out, gotos) = norm(&[
            "-dir",
            "/tmp",
            "-global-mode",
            "Exact,^Regexp",
            "-exec",
            "message \"hi\"",
            "+5",
            "notes.txt",
        ]);
        let args =
            Args::try_parse_from(std::iter::once("mx".to_string()).chain(out)).unwrap();
        assert_eq!(args.dir.as_deref(), Some(std::path::Path::new("/tmp")));
        assert_eq!(args.global_mode, vec!["Exact,^Regexp"]);
        assert_eq!(args.exec.len(), 1);
        assert_eq!(args.files, vec!["notes.txt"]);
        assert_eq!(gotos, vec![GotoSpec::Line(5)]);
    }
}
