//! Byte channels at the ends of the pipe: a file path, or `-` for the
//! process's stdin/stdout.

use std::{
    fmt::{Display, Formatter},
    fs::File,
    io::{self, Read, Stdin, Stdout, Write},
    path::PathBuf,
};

pub const STDIO: &str = "-";

pub enum InputChannel {
    Stdin(Stdin),
    File { file: File, path: PathBuf },
}

impl InputChannel {
    pub fn open(target: &str) -> io::Result<Self> {
        if target == STDIO {
            return Ok(InputChannel::Stdin(io::stdin()));
        }
        let path = PathBuf::from(target);
        let file = File::open(&path)
            .map_err(|e| io::Error::new(e.kind(), format!("open {}: {}", path.display(), e)))?;
        Ok(InputChannel::File { file, path })
    }
}

impl Read for InputChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputChannel::Stdin(stdin) => stdin.read(buf),
            InputChannel::File { file, .. } => file.read(buf),
        }
    }
}

impl Display for InputChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InputChannel::Stdin(_) => write!(f, "stdin"),
            InputChannel::File { path, .. } => write!(f, "{}", path.display()),
        }
    }
}

/// Output end of the pipe. A file output that is dropped without
/// [`commit`](OutputChannel::commit) is removed, so a failed run leaves no
/// partial output behind. Stdout is never touched.
pub enum OutputChannel {
    Stdout(Stdout),
    File {
        file: Option<File>,
        path: PathBuf,
        committed: bool,
    },
}

impl OutputChannel {
    pub fn create(target: &str) -> io::Result<Self> {
        if target == STDIO {
            return Ok(OutputChannel::Stdout(io::stdout()));
        }
        let path = PathBuf::from(target);
        let file = File::create(&path)
            .map_err(|e| io::Error::new(e.kind(), format!("create {}: {}", path.display(), e)))?;
        Ok(OutputChannel::File {
            file: Some(file),
            path,
            committed: false,
        })
    }

    /// Flushes everything and keeps the output.
    pub fn commit(mut self) -> io::Result<()> {
        match &mut self {
            OutputChannel::Stdout(stdout) => stdout.flush(),
            OutputChannel::File {
                file, committed, ..
            } => {
                if let Some(file) = file {
                    file.flush()?;
                    file.sync_all()?;
                }
                *committed = true;
                Ok(())
            }
        }
    }
}

impl Write for OutputChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputChannel::Stdout(stdout) => stdout.write(buf),
            OutputChannel::File { file: Some(file), .. } => file.write(buf),
            OutputChannel::File { file: None, .. } => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            OutputChannel::Stdout(stdout) => {
                // one lock for the whole unit
                let mut lock = stdout.lock();
                lock.write_all(buf)
            }
            OutputChannel::File { file: Some(file), .. } => file.write_all(buf),
            OutputChannel::File { file: None, .. } => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputChannel::Stdout(stdout) => stdout.flush(),
            OutputChannel::File { file: Some(file), .. } => file.flush(),
            OutputChannel::File { file: None, .. } => Ok(()),
        }
    }
}

impl Drop for OutputChannel {
    fn drop(&mut self) {
        if let OutputChannel::File {
            file,
            path,
            committed: false,
        } = self
        {
            drop(file.take());
            match std::fs::remove_file(&*path) {
                Ok(()) => log::warn!("removed partial output {}", path.display()),
                Err(e) => log::warn!("failed to remove partial output {}: {}", path.display(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncommitted_output_removed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("partial.h264");
        let target = path.to_string_lossy().into_owned();

        let mut output = OutputChannel::create(&target)?;
        output.write_all(b"partial")?;
        assert!(path.exists());
        drop(output);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_committed_output_kept() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.h264");
        let target = path.to_string_lossy().into_owned();

        let mut output = OutputChannel::create(&target)?;
        output.write_all(b"complete")?;
        output.commit()?;
        assert_eq!(std::fs::read(&path)?, b"complete");
        Ok(())
    }

    #[test]
    fn test_open_input() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("in.nv12");
        std::fs::write(&path, [1u8, 2, 3])?;

        let mut input = InputChannel::open(&path.to_string_lossy())?;
        let mut buf = Vec::new();
        input.read_to_end(&mut buf)?;
        assert_eq!(buf, vec![1, 2, 3]);
        assert!(matches!(InputChannel::open(STDIO)?, InputChannel::Stdin(_)));
        assert!(InputChannel::open(&dir.path().join("missing").to_string_lossy()).is_err());
        Ok(())
    }
}
