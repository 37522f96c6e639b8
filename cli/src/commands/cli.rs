use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "opsbook",
    version,
    about = "Run operational runbooks as dependency graphs of scripts"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of ~/.opsbook/config.toml / ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a runbook document and wait for it to finish.
    Run(RunArgs),
    /// Check a runbook document without running it.
    Validate(ValidateArgs),
    /// Print a stored execution as JSON.
    Show(ShowArgs),
    /// Compute the failure fingerprint of captured stderr.
    Fingerprint(FingerprintArgs),
    /// List runs that failed with the given fingerprint.
    Failures(FailuresArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Runbook document (TOML).
    pub file: PathBuf,

    /// Free-form note stored with the execution.
    #[arg(long)]
    pub trigger: Option<String>,

    /// Cap on concurrently running steps; overrides `engine.max_parallel_steps`.
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Show per-step progress bars on stderr.
    #[arg(long)]
    pub progress: bool,

    /// Read `p` (pause), `r` (resume) and `c` (cancel) commands from stdin.
    #[arg(long)]
    pub interactive: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    pub file: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ShowArgs {
    pub execution_id: String,

    /// Also print the run summary recorded for each step.
    #[arg(long)]
    pub runs: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct FingerprintArgs {
    /// Exit code of the failed run; omitted means "no exit code".
    #[arg(long, allow_hyphen_values = true)]
    pub exit_code: Option<i32>,

    /// Read stderr from this file instead of stdin.
    #[arg(long)]
    pub stderr_file: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct FailuresArgs {
    pub fingerprint: String,

    /// Emit JSON lines instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let args = Args::try_parse_from([
            "opsbook",
            "run",
            "deploy.toml",
            "--trigger",
            "nightly",
            "--max-parallel",
            "2",
            "--progress",
        ])
        .unwrap();
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.file, PathBuf::from("deploy.toml"));
        assert_eq!(run.trigger.as_deref(), Some("nightly"));
        assert_eq!(run.max_parallel, Some(2));
        assert!(run.progress);
        assert!(!run.interactive);
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let args =
            Args::try_parse_from(["opsbook", "validate", "rb.toml", "--config", "alt.toml"])
                .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(args.command, Commands::Validate(_)));
    }

    #[test]
    fn fingerprint_accepts_negative_exit_code() {
        let args =
            Args::try_parse_from(["opsbook", "fingerprint", "--exit-code", "-1"]).unwrap();
        let Commands::Fingerprint(fp) = args.command else {
            panic!("expected fingerprint");
        };
        assert_eq!(fp.exit_code, Some(-1));
        assert!(fp.stderr_file.is_none());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Args::try_parse_from(["opsbook"]).is_err());
    }
}
