use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

/// Single designated writer for user-facing progress lines.
///
/// Flashing fans out across tasks; every line goes through one locked write
/// so interleaved device output stays line-atomic. Cloning shares the
/// underlying writer.
#[derive(Clone)]
pub struct OutputSink {
    writer: Arc<Mutex<dyn Write + Send>>,
}

impl OutputSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        OutputSink {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        OutputSink::new(io::stdout())
    }

    /// Write one line. Output failures are swallowed: a broken console must
    /// not take a flashing task down with it.
    pub fn line(&self, message: impl AsRef<str>) {
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        let _ = writeln!(writer, "{}", message.as_ref());
        let _ = writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    pub(crate) struct SharedBuf(pub(crate) Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_lines_are_terminated_and_shared() {
        let buf = SharedBuf::default();
        let sink = OutputSink::new(buf.clone());
        let other = sink.clone();
        sink.line("first");
        other.line("second");
        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "first\nsecond\n");
    }
}
