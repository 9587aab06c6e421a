//! Structured logging setup
//!
//! Installs a `tracing-subscriber` fmt layer once per page. On wasm the
//! formatted lines are forwarded to the browser console.

use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_LEVEL;

/// Install the global subscriber. Later calls are ignored.
pub fn init(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .without_time();

    #[cfg(target_arch = "wasm32")]
    let result = builder.with_writer(console::MakeConsoleWriter).try_init();
    #[cfg(not(target_arch = "wasm32"))]
    let result = builder.try_init();

    // Already installed by an earlier sphere on the same page
    let _ = result;
}

/// Turn a buffered fmt record into a single console line
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn console_line(buf: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(buf);
    let line = line.trim_end();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

#[cfg(target_arch = "wasm32")]
mod console {
    use std::io;

    use tracing::{Level, Metadata};
    use tracing_subscriber::fmt::MakeWriter;
    use wasm_bindgen::JsValue;

    use super::console_line;

    /// Hands out one [`ConsoleWriter`] per record
    pub struct MakeConsoleWriter;

    impl<'a> MakeWriter<'a> for MakeConsoleWriter {
        type Writer = ConsoleWriter;

        fn make_writer(&'a self) -> Self::Writer {
            ConsoleWriter::new(Level::INFO)
        }

        fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
            ConsoleWriter::new(*meta.level())
        }
    }

    /// Buffers one formatted record and emits it on drop
    pub struct ConsoleWriter {
        level: Level,
        buf: Vec<u8>,
    }

    impl ConsoleWriter {
        fn new(level: Level) -> Self {
            Self {
                level,
                buf: Vec::with_capacity(128),
            }
        }
    }

    impl io::Write for ConsoleWriter {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.buf.extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for ConsoleWriter {
        fn drop(&mut self) {
            let Some(line) = console_line(&self.buf) else {
                return;
            };
            let line = JsValue::from_str(&line);
            match self.level {
                Level::ERROR => web_sys::console::error_1(&line),
                Level::WARN => web_sys::console::warn_1(&line),
                Level::INFO => web_sys::console::info_1(&line),
                _ => web_sys::console::debug_1(&line),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_line_strips_trailing_newline() {
        assert_eq!(
            console_line(b" WARN webgpu unavailable\n"),
            Some(" WARN webgpu unavailable".to_string())
        );
    }

    #[test]
    fn console_line_skips_blank_records() {
        assert_eq!(console_line(b"\n"), None);
        assert_eq!(console_line(b""), None);
    }

    #[test]
    fn init_is_idempotent() {
        init("debug");
        init("not a [valid directive");
        tracing::debug!("logging initialized twice without panicking");
    }
}
