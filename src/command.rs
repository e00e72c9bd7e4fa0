//! Invocation of an external command-line tool with captured output.

use std::collections::BTreeMap;
use std::process::{Command, Stdio};

use log::{debug, info};
use thiserror::Error;

/// External command-line tool, such as `sfdx`, that commands are run through.
#[derive(Debug, Clone)]
pub struct CliTool {
    program: String,
}

impl CliTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Start building an invocation of `<program> <command>`.
    ///
    /// The command text is passed to the shell as written, so any user input that
    /// is part of it must be quoted with [shell_quote] first.
    pub fn command(&self, command: impl Into<String>) -> ToolCommand {
        ToolCommand {
            program: self.program.clone(),
            command: command.into(),
            username: None,
            log_note: None,
            access_token: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            capture_output: true,
            check_return: false,
        }
    }
}

/// One invocation of a [CliTool], configured through builder methods.
#[derive(Clone)]
pub struct ToolCommand {
    program: String,
    command: String,
    username: Option<String>,
    log_note: Option<String>,
    access_token: Option<String>,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    capture_output: bool,
    check_return: bool,
}

impl ToolCommand {
    /// Target the command at this user (`-u <username>`).
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Log the command line at info level, prefixed with this note.
    pub fn log_note(mut self, note: impl Into<String>) -> Self {
        self.log_note = Some(note.into());
        self
    }

    /// Authenticate with this token. It is added after logging and never written to the log.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Extra environment variable, on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Capture stdout and stderr (the default). When off, the child writes to ours.
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Fail with [CommandError::NonZeroExit] when the command exits unsuccessfully.
    pub fn check_return(mut self, check: bool) -> Self {
        self.check_return = check;
        self
    }

    /// Command line without the access token. This is the text that gets logged.
    pub fn command_line(&self) -> String {
        let mut line = format!("{} {}", self.program, self.command);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        if let Some(username) = &self.username {
            line.push_str(" -u ");
            line.push_str(&shell_quote(username));
        }
        line
    }

    /// Run the command through `sh -c` and wait for it to finish.
    pub fn run(self) -> Result<CommandOutput, CommandError> {
        let mut line = self.command_line();
        if let Some(note) = &self.log_note {
            info!("{note} with command: {line}");
        }
        if let Some(token) = &self.access_token {
            line.push_str(" -u ");
            line.push_str(&shell_quote(token));
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&line).envs(&self.env).stdin(Stdio::null());
        if self.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        let output = cmd.output().map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let output = CommandOutput {
            return_code: output.status.code().unwrap_or(-1),
            stdout: self
                .capture_output
                .then(|| String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: self
                .capture_output
                .then(|| String::from_utf8_lossy(&output.stderr).into_owned()),
        };
        debug!("`{}` exited with {}", self.program, output.return_code);

        if self.check_return && !output.success() {
            return Err(CommandError::NonZeroExit(output));
        }
        Ok(output)
    }
}

impl std::fmt::Debug for ToolCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCommand")
            .field("command_line", &self.command_line())
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("capture_output", &self.capture_output)
            .field("check_return", &self.check_return)
            .finish()
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` if the process was killed by a signal.
    pub return_code: i32,

    /// Captured standard output, `None` when output was not captured.
    pub stdout: Option<String>,

    /// Captured standard error, `None` when output was not captured.
    pub stderr: Option<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.return_code == 0
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The captured output is kept for inspection.
    #[error("Command exited with return code {}", .0.return_code)]
    NonZeroExit(CommandOutput),
}

/// Quote `s` for a POSIX shell, leaving it bare when that is safe.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty() && lazy_regex::regex_is_match!(r"^[A-Za-z0-9_@%+=:,./-]+$", s) {
        return s.to_owned();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("plain-arg"), "plain-arg");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn command_line_without_token() {
        let cmd = CliTool::new("sfdx")
            .command("force:org:display")
            .arg("--json")
            .arg("two words")
            .username("me@example.com")
            .access_token("secret-token");
        let line = cmd.command_line();
        assert_eq!(
            line,
            "sfdx force:org:display --json 'two words' -u me@example.com"
        );
        assert!(!format!("{cmd:?}").contains("secret-token"));
    }

    #[test]
    fn token_absent_from_log_record() {
        crate::init_log();
        let out = CliTool::new("echo")
            .command("logged")
            .log_note("Token check")
            .access_token("s3cr3t-token")
            .run()
            .unwrap();
        // the token does reach the command
        assert_eq!(out.stdout.as_deref(), Some("logged -u s3cr3t-token\n"));

        let log = crate::captured_log();
        let noted: Vec<_> = log.iter().filter(|l| l.contains("Token check")).collect();
        assert_eq!(noted.len(), 1, "{log:?}");
        assert!(noted[0].contains("Token check with command: echo logged"), "{noted:?}");
        assert!(log.iter().all(|l| !l.contains("s3cr3t-token")), "{log:?}");
    }

    #[test]
    fn captures_output() {
        crate::init_log();
        let out = CliTool::new("echo")
            .command("hello")
            .arg("world")
            .log_note("Greeting")
            .run()
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.as_deref(), Some("hello world\n"));
        assert_eq!(out.stderr.as_deref(), Some(""));
    }

    #[test]
    fn env_is_added() {
        let out = CliTool::new("printenv")
            .command("FACTORY_YAML_TEST")
            .env("FACTORY_YAML_TEST", "yes")
            .run()
            .unwrap();
        assert_eq!(out.stdout.as_deref(), Some("yes\n"));
    }

    #[test]
    fn non_zero_exit_without_check() {
        let out = CliTool::new("sh")
            .command(r#"-c "echo oops >&2; exit 3""#)
            .run()
            .unwrap();
        assert_eq!(out.return_code, 3);
        assert_eq!(out.stderr.as_deref(), Some("oops\n"));
    }

    #[test]
    fn non_zero_exit_with_check_keeps_output() {
        let err = CliTool::new("sh")
            .command(r#"-c "echo partial; exit 2""#)
            .check_return(true)
            .run()
            .unwrap_err();
        let out = match err {
            CommandError::NonZeroExit(out) => out,
            other => panic!("expected NonZeroExit, got {other:?}"),
        };
        assert_eq!(out.return_code, 2);
        assert_eq!(out.stdout.as_deref(), Some("partial\n"));
        assert!(err_message(2).contains("return code 2"));
    }

    fn err_message(code: i32) -> String {
        CommandError::NonZeroExit(CommandOutput {
            return_code: code,
            stdout: None,
            stderr: None,
        })
        .to_string()
    }

    #[test]
    fn uncaptured_output() {
        let out = CliTool::new("true")
            .command("")
            .capture_output(false)
            .run()
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.is_none());
    }
}
