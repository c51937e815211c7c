//! Build-log output for resolution runs

use std::io::Write;

/// Receives the human-readable lines a run reports to its build log.
///
/// Lines never contain secret values.
pub trait LogSink {
    fn write_line(&mut self, line: &str);
}

impl LogSink for Vec<String> {
    fn write_line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Writes each line to an [`std::io::Write`] target such as stderr.
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> LogSink for WriterSink<W> {
    fn write_line(&mut self, line: &str) {
        // A broken log pipe must not fail the run.
        if writeln!(self.writer, "{}", line).is_err() {
            tracing::debug!("dropped build log line");
        }
    }
}

/// Forwards lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&mut self, line: &str) {
        tracing::info!(target: "vaultenv::build_log", "{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_collects_lines() {
        let mut sink: Vec<String> = Vec::new();
        sink.write_line("first");
        sink.write_line("second");
        assert_eq!(sink, vec!["first", "second"]);
    }

    #[test]
    fn test_writer_sink_appends_newlines() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_line("Vault credentials not found for 'not/existing'");
        let written = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(written, "Vault credentials not found for 'not/existing'\n");
    }
}
