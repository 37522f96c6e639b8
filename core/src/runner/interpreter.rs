use std::path::Path;

use super::args::{quote_arg, split_args};

/// Concrete program and argument vector for a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ResolvedCommand {
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_arg)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Pick an interpreter from the script's extension and build the command.
///
/// | ext | program |
/// |---|---|
/// | `.ps1` | `pwsh` (`powershell.exe` on Windows) `-File` |
/// | `.py` | `python3` (`python` on Windows) `-u` |
/// | `.sh` | `bash` |
/// | `.cmd` / `.bat` | `cmd.exe /d /c` |
/// | other | the script itself |
pub fn resolve_command(script: &Path, args: &str) -> ResolvedCommand {
    let script_str = script.to_string_lossy().to_string();
    let ext = script
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let (program, mut prefix): (String, Vec<String>) = match ext.as_str() {
        "ps1" => (
            powershell_host().to_string(),
            vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-ExecutionPolicy".into(),
                "Bypass".into(),
                "-File".into(),
                script_str,
            ],
        ),
        "py" => (python_interpreter().to_string(), vec!["-u".into(), script_str]),
        "sh" => ("bash".to_string(), vec![script_str]),
        "cmd" | "bat" => (
            "cmd.exe".to_string(),
            vec!["/d".into(), "/c".into(), script_str],
        ),
        _ => (script_str, Vec::new()),
    };

    prefix.extend(split_args(args));
    ResolvedCommand {
        program,
        args: prefix,
    }
}

fn powershell_host() -> &'static str {
    if cfg!(windows) {
        "powershell.exe"
    } else {
        "pwsh"
    }
}

fn python_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}
