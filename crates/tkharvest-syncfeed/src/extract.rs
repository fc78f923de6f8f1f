//! PDF text extraction via an external converter process

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval while waiting for the converter
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Turns PDF bytes into text.
///
/// Production uses [`PdfToText`]; tests substitute canned output.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, pdf: &[u8]) -> Result<String, ConversionFailure>;
}

/// External conversion did not produce text
#[derive(Debug)]
pub enum ConversionFailure {
    /// Converter could not be started (not installed, not executable)
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    /// Converter exited non-zero
    Exit { code: Option<i32>, stderr: String },
    /// Converter ran past its deadline and was killed
    Timeout(Duration),
    /// Staging the input or collecting output failed
    Io(std::io::Error),
}

impl std::fmt::Display for ConversionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn { program, source } => {
                write!(f, "failed to start {}: {source}", program.display())
            }
            Self::Exit {
                code: Some(code),
                stderr,
            } => write!(f, "converter exited with {code}: {}", stderr.trim()),
            Self::Exit { code: None, stderr } => {
                write!(f, "converter killed by signal: {}", stderr.trim())
            }
            Self::Timeout(after) => write!(f, "converter timed out after {}s", after.as_secs()),
            Self::Io(e) => write!(f, "converter I/O: {e}"),
        }
    }
}

impl std::error::Error for ConversionFailure {}

impl From<std::io::Error> for ConversionFailure {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// `pdftotext` (poppler) runner.
///
/// The PDF is staged in a temp file and text is read from stdout
/// (`pdftotext -q -enc UTF-8 <file> -`).
#[derive(Debug, Clone)]
pub struct PdfToText {
    program: PathBuf,
    timeout: Duration,
}

impl Default for PdfToText {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pdftotext"),
            timeout: Duration::from_secs(60),
        }
    }
}

impl PdfToText {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl TextExtractor for PdfToText {
    fn extract(&self, pdf: &[u8]) -> Result<String, ConversionFailure> {
        let mut input = tempfile::Builder::new()
            .prefix("tkharvest-")
            .suffix(".pdf")
            .tempfile()?;
        input.write_all(pdf)?;
        input.flush()?;

        let mut child = Command::new(&self.program)
            .args(["-q", "-enc", "UTF-8"])
            .arg(input.path())
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ConversionFailure::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Drain both pipes concurrently so a chatty converter cannot block on a full pipe
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ConversionFailure::Timeout(self.timeout));
            }
            thread::sleep(WAIT_POLL);
        };

        let stdout = join_drain(stdout)?;
        let stderr = join_drain(stderr)?;

        if !status.success() {
            return Err(ConversionFailure::Exit {
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_drain(
    handle: Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>,
) -> Result<Vec<u8>, ConversionFailure> {
    match handle {
        None => Ok(Vec::new()),
        Some(h) => h
            .join()
            .map_err(|_| ConversionFailure::Io(std::io::Error::other("output reader panicked")))?
            .map_err(ConversionFailure::Io),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_spawn_failure() {
        let extractor = PdfToText::new("/nonexistent/pdftotext", Duration::from_secs(5));
        let err = extractor.extract(b"%PDF-1.4").unwrap_err();
        assert!(matches!(err, ConversionFailure::Spawn { .. }));
        assert!(format!("{err}").contains("/nonexistent/pdftotext"));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_reported() {
        // `false` ignores its arguments and exits 1
        let extractor = PdfToText::new("false", Duration::from_secs(5));
        let err = extractor.extract(b"%PDF-1.4").unwrap_err();
        assert!(matches!(err, ConversionFailure::Exit { code: Some(1), .. }));
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_without_output_is_empty_text() {
        let extractor = PdfToText::new("true", Duration::from_secs(5));
        assert_eq!(extractor.extract(b"%PDF-1.4").unwrap(), "");
    }

    #[test]
    fn display_exit() {
        let err = ConversionFailure::Exit {
            code: Some(3),
            stderr: "Syntax Error: broken xref\n".to_string(),
        };
        assert_eq!(format!("{err}"), "converter exited with 3: Syntax Error: broken xref");
    }
}
