//! Formatted log lines forwarded to the browser console.

use tracing::Level;

/// Console method a record of the given level is written with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConsoleLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl ConsoleLevel {
    pub fn of(level: &Level) -> Self {
        if *level == Level::ERROR {
            ConsoleLevel::Error
        } else if *level == Level::WARN {
            ConsoleLevel::Warn
        } else if *level == Level::INFO {
            ConsoleLevel::Info
        } else {
            ConsoleLevel::Debug
        }
    }
}

/// One formatted record without its trailing newline; `None` when blank.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn console_line(buffer: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(buffer);
    let line = text.trim_end();
    (!line.is_empty()).then(|| line.to_string())
}

#[cfg(target_arch = "wasm32")]
pub use self::wasm::{ConsoleMakeWriter, ConsoleWriter};

#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::io;

    use tracing::{Level, Metadata};
    use tracing_subscriber::fmt::MakeWriter;
    use wasm_bindgen::JsValue;
    use web_sys::console;

    use super::{console_line, ConsoleLevel};

    /// Buffers one record and emits it on drop.
    pub struct ConsoleWriter {
        level: ConsoleLevel,
        buffer: Vec<u8>,
    }

    impl io::Write for ConsoleWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Drop for ConsoleWriter {
        fn drop(&mut self) {
            let Some(line) = console_line(&self.buffer) else {
                return;
            };
            let line = JsValue::from_str(&line);
            match self.level {
                ConsoleLevel::Error => console::error_1(&line),
                ConsoleLevel::Warn => console::warn_1(&line),
                ConsoleLevel::Info => console::info_1(&line),
                ConsoleLevel::Debug => console::debug_1(&line),
            }
        }
    }

    #[derive(Clone, Copy, Debug, Default)]
    pub struct ConsoleMakeWriter;

    impl ConsoleMakeWriter {
        fn writer(level: ConsoleLevel) -> ConsoleWriter {
            ConsoleWriter {
                level,
                buffer: Vec::new(),
            }
        }
    }

    impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
        type Writer = ConsoleWriter;

        fn make_writer(&'a self) -> Self::Writer {
            Self::writer(ConsoleLevel::of(&Level::INFO))
        }

        fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
            Self::writer(ConsoleLevel::of(meta.level()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_console_methods() {
        assert_eq!(ConsoleLevel::of(&Level::ERROR), ConsoleLevel::Error);
        assert_eq!(ConsoleLevel::of(&Level::WARN), ConsoleLevel::Warn);
        assert_eq!(ConsoleLevel::of(&Level::INFO), ConsoleLevel::Info);
        assert_eq!(ConsoleLevel::of(&Level::DEBUG), ConsoleLevel::Debug);
        assert_eq!(ConsoleLevel::of(&Level::TRACE), ConsoleLevel::Debug);
    }

    #[test]
    fn console_line_drops_trailing_newline_and_blank_records() {
        assert_eq!(
            console_line(b" WARN stonks_tracker: fetch() failed\n").as_deref(),
            Some(" WARN stonks_tracker: fetch() failed")
        );
        assert_eq!(console_line(b"\n"), None);
    }
}
