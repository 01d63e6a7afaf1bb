use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};

use log::{debug, trace};
use thiserror::Error;

const DEFAULT_PROGRAM: &str = "pijul";

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Could not launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Program `{program}` failed with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("Output of `{program}` is not valid UTF-8")]
    Utf8 { program: String },
}

/// Runs the external `pijul` executable.
///
/// Kept behind a trait so that fetches can be exercised without spawning
/// processes.
pub trait PijulTool {
    /// Runs the tool with `args`, optionally inside `cwd` and with `input`
    /// piped to its stdin, and returns the captured stdout.
    fn run(&self, args: &[String], cwd: Option<&Path>, input: Option<&str>)
        -> Result<String, ToolError>;
}

impl<T: PijulTool + ?Sized> PijulTool for &T {
    fn run(
        &self,
        args: &[String],
        cwd: Option<&Path>,
        input: Option<&str>,
    ) -> Result<String, ToolError> {
        (**self).run(args, cwd, input)
    }
}

#[derive(Debug, Clone)]
pub struct PijulCli {
    program: PathBuf,
}

impl Default for PijulCli {
    fn default() -> Self {
        PijulCli::new(DEFAULT_PROGRAM)
    }
}

impl PijulCli {
    /// `program` is looked up in `PATH` unless it contains a path separator.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        PijulCli {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl PijulTool for PijulCli {
    fn run(
        &self,
        args: &[String],
        cwd: Option<&Path>,
        input: Option<&str>,
    ) -> Result<String, ToolError> {
        let program = self.program.display().to_string();
        let spawn_error = |source| ToolError::Spawn {
            program: program.clone(),
            source,
        };

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        debug!("Running {} {}", program, args.join(" "));
        let mut child = command.spawn().map_err(spawn_error)?;

        // stdin is fed from its own thread while stdout and stderr are drained,
        // otherwise both sides can block on full pipes.
        let (output, written) = thread::scope(|scope| {
            let writer = child
                .stdin
                .take()
                .zip(input)
                .map(|(mut stdin, input)| {
                    scope.spawn(move || stdin.write_all(input.as_bytes()))
                });
            let output = child.wait_with_output();
            let written = match writer {
                Some(writer) => writer
                    .join()
                    .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
                None => Ok(()),
            };
            (output, written)
        });
        let output = output.map_err(spawn_error)?;
        match written {
            Err(error) if error.kind() != io::ErrorKind::BrokenPipe => {
                return Err(spawn_error(error))
            }
            _ => {}
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::Exit {
                program,
                status: output.status.to_string(),
                stderr: stderr.trim().to_owned(),
            });
        }

        trace!("{} finished with {}", program, output.status);
        String::from_utf8(output.stdout).map_err(|_| ToolError::Utf8 { program })
    }
}
