//! memax entrypoint: switch parsing, logging, startup files, and the
//! interactive stub loop.

use anyhow::Result;
use clap::Parser;
use core_buffer::BufFlags;
use core_config::load_from;
use core_editor::Editor;
use core_file::LineDelim;
use core_script::Interp;
use core_status::{Severity, Status};
use core_value::Value;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

mod cli;
mod term;

use cli::{Args, GotoSpec, normalize_argv};

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = Path::new(".");
        let log_path = log_dir.join("memax.log");
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, "memax.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        match tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .try_init()
        {
            Ok(_) => {
                self.log_guard = Some(guard);
            }
            Err(_err) => {
                // Global tracing subscriber already installed; drop guard
                // so the writer shuts down.
            }
        }
        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

fn main() {
    let code = run();
    std::process::exit(code);
}

fn run() -> i32 {
    let mut startup = AppStartup::new();
    if startup.configure_logging().is_err() {
        // Logging is best-effort; continue without it.
    }
    AppStartup::install_panic_hook();
    info!(target: "runtime", "startup");

    let (argv, gotos) = normalize_argv(std::env::args().skip(1));
    let args = match Args::try_parse_from(std::iter::once("mx".to_string()).chain(argv)) {
        Ok(a) => a,
        Err(e) => {
            // clap renders help/version itself; exit code 0 for those,
            // 1 for usage errors.
            let is_help = matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            );
            let _ = e.print();
            return if is_help { 0 } else { 1 };
        }
    };

    if args.copyright {
        println!("memax {}", env!("CARGO_PKG_VERSION"));
        println!("A scriptable modal text editor.");
        return 0;
    }

    match boot(args, gotos) {
        Ok(code) => code,
        Err(st) => {
            error!(target: "runtime", msg = ?st.message(), "fatal");
            eprintln!("mx: {st}");
            st.severity.exit_code()
        }
    }
}

/// Comma-separated mode list with optional `^` prefixes to clear.
fn apply_mode_list(interp: &mut Interp, list: &str, buffer: Option<&str>) -> Result<(), Status> {
    for entry in list.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, on) = match entry.strip_prefix('^') {
            Some(rest) => (rest, false),
            None => (entry, true),
        };
        match buffer {
            None => {
                interp.ed.set_global_mode(name, on)?;
            }
            Some(buf) => {
                interp.ed.set_buffer_mode(buf, name, on)?;
            }
        }
    }
    Ok(())
}

fn parse_delim(s: &str) -> Result<LineDelim, Status> {
    let unescaped = s.replace("\\r", "\r").replace("\\n", "\n");
    LineDelim::from_bytes(unescaped.as_bytes())
        .ok_or_else(|| Status::failure(format!("Unknown line delimiter '{s}'")))
}

fn run_startup_files(interp: &mut Interp) {
    // Site startup, then the user's, each optional. A broken startup
    // file must not prevent the editor from starting.
    if let Some(site) = core_file::find_script("site", &interp.ed.script_dirs)
        && let Err(st) = interp.exec_file(&site, None)
    {
        error!(target: "runtime.startup", msg = ?st.message(), "site startup failed");
        eprintln!("mx: {st}");
    }
    if let Some(home) = std::env::var_os("HOME") {
        let user = PathBuf::from(home).join(".memax.mx");
        if user.exists()
            && let Err(st) = interp.exec_file(&user, None)
        {
            error!(target: "runtime.startup", msg = ?st.message(), "user startup failed");
            eprintln!("mx: {st}");
        }
    }
}

fn boot(args: Args, gotos: Vec<GotoSpec>) -> Result<i32, Status> {
    // Conflicting switches.
    if args.search.is_some() && (args.no_read || !gotos.is_empty()) {
        return Err(Status::new(
            Severity::HelpExit,
            "-search conflicts with -no-read and +N/-N line switches",
        ));
    }

    let config = load_from(None).unwrap_or_default();
    let mut interp = Interp::new(Editor::new(&config));
    if let Ok((cols, _rows)) = crossterm::terminal::size() {
        interp.term_cols = cols as usize;
    }

    if let Some(dir) = &args.dir {
        interp.ed.change_dir(dir)?;
    }
    if let Some(prefix) = &args.path {
        let mut dirs: Vec<PathBuf> = prefix
            .split(':')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        dirs.append(&mut interp.ed.script_dirs);
        interp.ed.script_dirs = dirs;
    }
    if let Some(d) = &args.inp_delim {
        interp.ed.input_delim = Some(parse_delim(d)?);
    }
    if let Some(d) = &args.otp_delim {
        interp.ed.output_delim = Some(parse_delim(d)?);
    }
    for list in &args.global_mode {
        apply_mode_list(&mut interp, list, None)?;
    }

    if !args.no_startup {
        run_startup_files(&mut interp);
    }

    // `-shell`: the first file is a script; the rest are its arguments.
    if args.shell {
        let mut files = args.files.iter();
        let Some(script) = files.next() else {
            return Err(Status::new(Severity::HelpExit, "-shell requires a script file"));
        };
        let argv: Vec<Value> = files.map(Value::str).collect();
        let script_path = PathBuf::from(script);
        let name = format!(
            "{}shell-{}",
            core_buffer::MACRO_SIGIL,
            core_buffer::name_from_filename(&script_path)
        );
        let idx = interp.ed.buffers.create_unique(&name)?;
        let buf_name = interp.ed.buffers.get(idx).name().to_string();
        {
            let buf = interp.ed.buffers.get_mut(idx);
            core_file::read_into(
                buf,
                &script_path,
                core_file::ReadOptions {
                    must_exist: true,
                    delim: None,
                },
            )?;
            buf.flags |= BufFlags::HIDDEN;
        }
        // A leading `#!` line is a comment to the interpreter.
        core_script::exec::exec_buffer(
            &mut interp,
            &buf_name,
            None,
            argv,
            Some(script_path),
        )?;
        return Ok(0);
    }

    // Visit the command-line files in order.
    let mut first_buffer: Option<String> = None;
    let mut buf_modes = args.buf_mode.iter();
    for (i, file) in args.files.iter().enumerate() {
        let path = PathBuf::from(file);
        let name = if args.no_read && i == 0 {
            // Create the buffer but defer the read.
            let base = core_buffer::name_from_filename(&path);
            let idx = interp.ed.buffers.create_unique(&base)?;
            let name = interp.ed.buffers.get(idx).name().to_string();
            interp.ed.buffers.get_mut(idx).filename = Some(path);
            core_script::exec::switch_buffer(&mut interp, &name, false)?;
            name
        } else {
            match interp.exec_line(&format!("findFile {}", quoted(file))) {
                Ok(Value::Str(name)) => name,
                Ok(_) => interp.ed.current_name().to_string(),
                Err(st) => return Err(st),
            }
        };
        if let Some(list) = buf_modes.next() {
            apply_mode_list(&mut interp, list, Some(&name))?;
        }
        if args.read_only && !args.rw {
            if let Some(buf) = interp.ed.buffers.by_name_mut(&name) {
                buf.flags |= BufFlags::READ_ONLY;
            }
        }
        if first_buffer.is_none() {
            first_buffer = Some(name);
        }
    }
    if let Some(first) = &first_buffer {
        core_script::exec::switch_buffer(&mut interp, first, true)?;
        for goto in &gotos {
            let GotoSpec::Line(n) = goto;
            interp.exec_line(&format!("gotoLine {n}"))?;
        }
    }

    // Startup script lines.
    for line in &args.exec {
        interp.exec_line(line)?;
    }

    if let Some(pat) = &args.search {
        interp.ed.install_search_pattern(pat)?;
        interp.exec_line("huntForw")?;
    }

    // Batch mode when there is no terminal to talk to.
    if !crossterm::tty::IsTty::is_tty(&std::io::stdin()) {
        if let Some(msg) = &interp.last_message {
            println!("{msg}");
        }
        return Ok(0);
    }

    match term::interact(&mut interp) {
        Ok(()) => Ok(0),
        Err(st) if st.severity == Severity::UserExit => Ok(0),
        Err(st) => Err(st),
    }
}

/// Quote a path for safe embedding in a script command line.
fn quoted(s: &str) -> String {
    core_value::quote(&Value::str(s)).unwrap_or_else(|_| format!("\"{s}\""))
}
